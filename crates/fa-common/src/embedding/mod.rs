pub mod config;
pub mod store;
pub mod vector;

pub use config::{RecognitionConfig, DEFAULT_LOOKALIKE_K, DEFAULT_MATCH_THRESHOLD};
pub use store::{EmbeddingStore, IdentityRecord, PopulateReport, StoreSnapshot};
pub use vector::{cosine_similarity, l2_norm, normalize, EmbeddingVector, VectorError};

/// 環境変数から照合設定を読み込み
pub fn load_config_from_env() -> RecognitionConfig {
    RecognitionConfig::from_lookup(|key| std::env::var(key).ok())
}
