//! ULID helpers.
//!
//! The process run id is logged once at startup and attached to panic reports, so log
//! lines from one process lifetime can be grouped. `generate` hands out fresh ULIDs
//! for identity keys and per-request ids.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Process-level run id, fixed on first access.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// A fresh, time-ordered ULID (26 chars, URL-safe).
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

pub fn is_valid(value: &str) -> bool {
    Ulid::from_string(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_stable_for_the_process() {
        assert_eq!(get(), get());
        assert_eq!(get().len(), 26);
    }

    #[test]
    fn generated_ids_are_unique_and_parse_back() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert!(is_valid(&a));
        assert!(!is_valid("not-a-ulid"));
    }
}
