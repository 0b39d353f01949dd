#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    /// 埋め込み次元数（外部の埋め込みモデルで固定。buffalo_l 系は 512）
    pub dimension: usize,
    /// 出退勤照合で一致とみなすコサイン類似度の下限
    pub match_threshold: f32,
    /// そっくりさん検索で返す件数
    pub lookalike_k: usize,
    /// 本人とみなす類似度の上限（cutoff = min(ceiling, max_sim * ratio)）
    pub self_exclusion_ceiling: f32,
    pub self_exclusion_ratio: f32,
}

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;
pub const DEFAULT_LOOKALIKE_K: usize = 2;

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            lookalike_k: DEFAULT_LOOKALIKE_K,
            self_exclusion_ceiling: 0.98,
            self_exclusion_ratio: 0.999,
        }
    }
}

impl RecognitionConfig {
    /// キー → 値の参照関数から設定を組み立てる。解釈できない値はデフォルトのまま。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_f32 = |key: &str| lookup(key).and_then(|s| s.trim().parse::<f32>().ok());
        let parse_usize = |key: &str| lookup(key).and_then(|s| s.trim().parse::<usize>().ok());

        Self {
            dimension: parse_usize("FA_EMBEDDING_DIMENSION")
                .filter(|d| *d > 0)
                .unwrap_or(defaults.dimension),
            match_threshold: parse_f32("FA_MATCH_THRESHOLD")
                .filter(|t| (-1.0..=1.0).contains(t))
                .unwrap_or(defaults.match_threshold),
            lookalike_k: parse_usize("FA_LOOKALIKE_K")
                .filter(|k| *k > 0)
                .unwrap_or(defaults.lookalike_k),
            self_exclusion_ceiling: parse_f32("FA_SELF_EXCLUSION_CEILING")
                .filter(|c| (0.0..=1.0).contains(c))
                .unwrap_or(defaults.self_exclusion_ceiling),
            self_exclusion_ratio: parse_f32("FA_SELF_EXCLUSION_RATIO")
                .filter(|r| *r > 0.0 && *r <= 1.0)
                .unwrap_or(defaults.self_exclusion_ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = RecognitionConfig::from_lookup(|_| None);
        assert_eq!(config, RecognitionConfig::default());
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.lookalike_k, 2);
    }

    #[test]
    fn respects_overrides_and_ignores_garbage() {
        let config = RecognitionConfig::from_lookup(lookup_from(&[
            ("FA_EMBEDDING_DIMENSION", "128"),
            ("FA_MATCH_THRESHOLD", "0.45"),
            ("FA_LOOKALIKE_K", "zero"),
            ("FA_SELF_EXCLUSION_CEILING", "1.5"),
            ("FA_SELF_EXCLUSION_RATIO", " 0.995 "),
        ]));

        assert_eq!(config.dimension, 128);
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.lookalike_k, 2);
        assert_eq!(config.self_exclusion_ceiling, 0.98);
        assert_eq!(config.self_exclusion_ratio, 0.995);
    }
}
