use std::sync::Arc;

use serde::Serialize;

use crate::embedding::{cosine_similarity, EmbeddingStore, EmbeddingVector, StoreSnapshot, VectorError};

/// キャッシュが空でスコアが無い場合に報告する値（コサイン類似度の下限）
pub const NO_SCORE: f32 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// 閾値を超えた人物が居ない場合は None
    pub identity_key: Option<String>,
    /// 最良候補のスコア。不一致でも観測用に残す
    pub score: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity_key.is_some()
    }

    fn absent(score: f32) -> Self {
        Self {
            identity_key: None,
            score,
        }
    }
}

/// スナップショットに対する最近傍探索（1 件）
///
/// 同点の場合はスナップショット順（identity_key 昇順）で先に出たものを返す。
pub fn find_best_match(
    snapshot: &StoreSnapshot,
    probe: &EmbeddingVector,
    threshold: f32,
) -> Result<MatchResult, VectorError> {
    let mut best: Option<(&str, f32)> = None;

    for record in snapshot.iter() {
        let score = cosine_similarity(probe, &record.embedding)?;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((&record.identity_key, score));
        }
    }

    Ok(match best {
        Some((identity_key, score)) if score >= threshold => MatchResult {
            identity_key: Some(identity_key.to_string()),
            score,
        },
        Some((_, score)) => MatchResult::absent(score),
        None => MatchResult::absent(NO_SCORE),
    })
}

#[derive(Debug, Clone)]
pub struct Matcher {
    store: Arc<EmbeddingStore>,
    threshold: f32,
}

impl Matcher {
    pub fn new(store: Arc<EmbeddingStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// キャッシュの埋め込み次元（プローブの検証に使う）
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// probe は正規化済みであること（呼び出し側の責務）
    pub fn match_probe(&self, probe: &EmbeddingVector) -> Result<MatchResult, VectorError> {
        self.match_probe_with_threshold(probe, self.threshold)
    }

    pub fn match_probe_with_threshold(
        &self,
        probe: &EmbeddingVector,
        threshold: f32,
    ) -> Result<MatchResult, VectorError> {
        // ロックはスナップショット取得の間だけ。走査はロック外
        let snapshot = self.store.snapshot();
        find_best_match(&snapshot, probe, threshold)
    }
}
