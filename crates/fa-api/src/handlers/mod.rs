pub mod attendance;
pub mod health;
pub mod identities;
pub mod lookalikes;
pub mod organizations;
