//! そっくりさん検索（find-my-twin）
//!
//! プローブは通常、登録済み本人の撮り直し写真なので、最も近い 1 件は本人になる。
//! 本人らしきものを除いたうえで、次に近い他人を上位 k 件返す。
//!
//! 本人判定は `cutoff = min(ceiling, max_sim * ratio)` 以上を本人とみなすヒューリスティック。
//! 本人の写真が 2 枚登録されているような近似重複もまとめて除外される反面、
//! 非常によく似た他人と本人を区別できない。呼び出し側が本人の identity_key を
//! 知っている場合は `exclude_identity` で明示的に除外できる（ヒューリスティックは併用）。

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::embedding::{
    cosine_similarity, EmbeddingStore, EmbeddingVector, IdentityRecord, RecognitionConfig,
    StoreSnapshot, VectorError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookalike {
    pub identity_key: String,
    pub display_name: String,
    /// 類似度（%、小数第 2 位で丸め）
    pub similarity_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookalikeOutcome {
    Found { matches: Vec<Lookalike> },
    /// キャッシュが空
    NoIdentities,
    /// 本人除外後に候補が残らなかった
    NoCloseMatch { max_similarity: f32 },
}

impl LookalikeOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            LookalikeOutcome::Found { .. } => "found",
            LookalikeOutcome::NoIdentities => "no_identities",
            LookalikeOutcome::NoCloseMatch { .. } => "no_close_match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfExclusion {
    pub ceiling: f32,
    pub ratio: f32,
}

impl Default for SelfExclusion {
    fn default() -> Self {
        Self {
            ceiling: 0.98,
            ratio: 0.999,
        }
    }
}

impl SelfExclusion {
    pub fn cutoff(&self, max_similarity: f32) -> f32 {
        self.ceiling.min(max_similarity * self.ratio)
    }
}

pub fn similarity_percentage(score: f32) -> f64 {
    (score as f64 * 100.0 * 100.0).round() / 100.0
}

fn to_lookalike(record: &IdentityRecord, score: f32) -> Lookalike {
    Lookalike {
        identity_key: record.identity_key.clone(),
        display_name: record.display_name.clone(),
        similarity_percentage: similarity_percentage(score),
    }
}

/// スナップショット全件をスコアリングして上位 k 件（k = 0 は 1 として扱う）を返す
pub fn rank_lookalikes(
    snapshot: &StoreSnapshot,
    probe: &EmbeddingVector,
    k: usize,
    exclusion: SelfExclusion,
    exclude_identity: Option<&str>,
) -> Result<LookalikeOutcome, VectorError> {
    if snapshot.is_empty() {
        return Ok(LookalikeOutcome::NoIdentities);
    }

    let mut scored = Vec::with_capacity(snapshot.len());
    for record in snapshot.iter() {
        scored.push((record, cosine_similarity(probe, &record.embedding)?));
    }

    let max_similarity = scored
        .iter()
        .map(|(_, score)| *score)
        .fold(f32::NEG_INFINITY, f32::max);
    let cutoff = exclusion.cutoff(max_similarity);
    let is_explicit_self =
        |record: &IdentityRecord| exclude_identity == Some(record.identity_key.as_str());

    let mut candidates: Vec<(&IdentityRecord, f32)> = scored
        .iter()
        .filter(|(record, score)| *score < cutoff && !is_explicit_self(*record))
        .copied()
        .collect();

    if candidates.is_empty() {
        return Ok(LookalikeOutcome::NoCloseMatch { max_similarity });
    }

    // スナップショット順（key 昇順）を保った安定ソート
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let matches: Vec<Lookalike> = candidates
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .take(k.max(1))
        .map(|(record, score)| to_lookalike(record, score))
        .collect();

    if !matches.is_empty() {
        return Ok(LookalikeOutcome::Found { matches });
    }

    // 候補が全て非正なら、除外分も含めた最高スコアを 1 件だけ返す
    let fallback = scored
        .iter()
        .filter(|(record, score)| *score > 0.0 && !is_explicit_self(*record))
        .fold(None::<(&IdentityRecord, f32)>, |best, &(record, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((record, score)),
        });

    Ok(match fallback {
        Some((record, score)) => LookalikeOutcome::Found {
            matches: vec![to_lookalike(record, score)],
        },
        None => LookalikeOutcome::NoCloseMatch { max_similarity },
    })
}

#[derive(Debug, Clone)]
pub struct TopKRanker {
    store: Arc<EmbeddingStore>,
    exclusion: SelfExclusion,
}

impl TopKRanker {
    pub fn new(store: Arc<EmbeddingStore>, exclusion: SelfExclusion) -> Self {
        Self { store, exclusion }
    }

    pub fn from_config(store: Arc<EmbeddingStore>, config: &RecognitionConfig) -> Self {
        Self::new(
            store,
            SelfExclusion {
                ceiling: config.self_exclusion_ceiling,
                ratio: config.self_exclusion_ratio,
            },
        )
    }

    pub fn top_lookalikes(
        &self,
        probe: &EmbeddingVector,
        k: usize,
    ) -> Result<LookalikeOutcome, VectorError> {
        self.top_lookalikes_excluding(probe, k, None)
    }

    pub fn top_lookalikes_excluding(
        &self,
        probe: &EmbeddingVector,
        k: usize,
        exclude_identity: Option<&str>,
    ) -> Result<LookalikeOutcome, VectorError> {
        let snapshot = self.store.snapshot();
        rank_lookalikes(&snapshot, probe, k, self.exclusion, exclude_identity)
    }
}
