//! 認識リクエスト 1 件分の処理（照合 → 表示情報の解決 → 打刻）
//!
//! 未認識の顔やディレクトリに居ない人物はスキップして残りのプローブを続行する。
//! 失敗として扱うのは次元違いと永続ストアの障害だけ。

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::ledger::{AttendanceLedger, Direction};
use crate::directory::{AttendanceHistory, BackendError, IdentityDirectory};
use crate::embedding::{normalize, EmbeddingVector, VectorError};
use crate::matching::Matcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// 先頭の顔だけを見る（協力的な被写体 1 名）
    Single,
    /// フレーム内の全ての顔をそれぞれ打刻する
    #[default]
    Multi,
}

impl RecognitionMode {
    pub fn select<T>(self, items: &[T]) -> &[T] {
        match self {
            RecognitionMode::Single => &items[..items.len().min(1)],
            RecognitionMode::Multi => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedAttendance {
    pub identity_key: String,
    pub display_name: String,
    pub direction: Direction,
    pub score: f32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    NoFacesDetected,
    NotRecognized {
        probes: usize,
        /// 照合できたプローブの中での最高スコア
        best_score: Option<f32>,
    },
    Recognized {
        entries: Vec<RecognizedAttendance>,
    },
}

impl RecognitionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionOutcome::NoFacesDetected => "no_faces_detected",
            RecognitionOutcome::NotRecognized { .. } => "not_recognized",
            RecognitionOutcome::Recognized { .. } => "recognized",
        }
    }

    /// "Attendance marked for: A (Check-In), B (Check-Out)"
    pub fn summary(&self) -> String {
        match self {
            RecognitionOutcome::NoFacesDetected => "No face detected".to_string(),
            RecognitionOutcome::NotRecognized { .. } => "Face not recognized".to_string(),
            RecognitionOutcome::Recognized { entries } => {
                let marked: Vec<String> = entries
                    .iter()
                    .map(|entry| format!("{} ({})", entry.display_name, entry.direction.label()))
                    .collect();
                format!("Attendance marked for: {}", marked.join(", "))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct AttendanceCoordinator<B, C = SystemClock> {
    matcher: Matcher,
    ledger: AttendanceLedger<B, C>,
    directory: Arc<B>,
}

impl<B, C> AttendanceCoordinator<B, C>
where
    B: AttendanceHistory + IdentityDirectory,
    C: Clock,
{
    pub fn new(matcher: Matcher, backend: Arc<B>, clock: C, offset: FixedOffset) -> Self {
        Self {
            matcher,
            ledger: AttendanceLedger::new(Arc::clone(&backend), clock, offset),
            directory: backend,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// 正規化済みプローブを照合し、認識できた人物ごとに打刻する
    #[instrument(skip_all, fields(probes = probes.len(), mode = ?mode))]
    pub async fn process_recognition(
        &self,
        probes: &[EmbeddingVector],
        mode: RecognitionMode,
    ) -> Result<RecognitionOutcome, RecognitionError> {
        if probes.is_empty() {
            return Ok(RecognitionOutcome::NoFacesDetected);
        }
        let considered = mode.select(probes);
        self.recognize(considered, considered.len()).await
    }

    /// 未正規化の埋め込みを受け付ける入口
    ///
    /// 次元違いはエラー。ゼロノルムや非有限値を含むプローブは警告を出してスキップする。
    #[instrument(skip_all, fields(faces = faces.len(), mode = ?mode))]
    pub async fn process_raw(
        &self,
        faces: &[Vec<f32>],
        mode: RecognitionMode,
    ) -> Result<RecognitionOutcome, RecognitionError> {
        if faces.is_empty() {
            return Ok(RecognitionOutcome::NoFacesDetected);
        }

        let considered = mode.select(faces);
        let dimension = self.matcher.dimension();
        let mut probes = Vec::with_capacity(considered.len());

        for (index, raw) in considered.iter().enumerate() {
            if raw.len() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    got: raw.len(),
                }
                .into());
            }
            match normalize(raw) {
                Ok(probe) => probes.push(probe),
                Err(err) => warn!(index, error = %err, "skipping unusable probe"),
            }
        }

        self.recognize(&probes, considered.len()).await
    }

    async fn recognize(
        &self,
        probes: &[EmbeddingVector],
        considered: usize,
    ) -> Result<RecognitionOutcome, RecognitionError> {
        let mut entries = Vec::new();
        let mut best_score: Option<f32> = None;

        for (index, probe) in probes.iter().enumerate() {
            let result = self.matcher.match_probe(probe)?;
            best_score = Some(best_score.map_or(result.score, |best| best.max(result.score)));

            let Some(identity_key) = result.identity_key else {
                debug!(index, score = result.score, "probe not recognized");
                continue;
            };

            let Some(profile) = self.directory.lookup_identity(&identity_key).await? else {
                warn!(%identity_key, "matched identity missing from directory; skipping");
                continue;
            };

            let event = self.ledger.record_event(&identity_key).await?;
            entries.push(RecognizedAttendance {
                identity_key,
                display_name: profile.display_name,
                direction: event.direction,
                score: result.score,
                recorded_at: event.recorded_at,
            });
        }

        if entries.is_empty() {
            return Ok(RecognitionOutcome::NotRecognized {
                probes: considered,
                best_score,
            });
        }
        Ok(RecognitionOutcome::Recognized { entries })
    }
}
