use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attendance::{Direction, RecognitionMode, RecognitionOutcome, RecognizedAttendance};

/// 打刻リクエスト。埋め込みは上流の顔検出で計算済みのもの（未正規化でよい）
#[derive(Debug, Clone, Deserialize)]
pub struct MarkAttendanceRequest {
    #[serde(default)]
    pub faces: Vec<Vec<f32>>,
    #[serde(default)]
    pub mode: Option<RecognitionMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedEntry {
    pub identity_key: String,
    pub display_name: String,
    pub direction: Direction,
    pub score: f32,
    pub recorded_at: DateTime<Utc>,
}

impl From<&RecognizedAttendance> for RecognizedEntry {
    fn from(entry: &RecognizedAttendance) -> Self {
        Self {
            identity_key: entry.identity_key.clone(),
            display_name: entry.display_name.clone(),
            direction: entry.direction,
            score: entry.score,
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkAttendanceResponse {
    pub success: bool,
    pub request_id: String,
    pub status: String,
    pub message: String,
    pub recognized: Vec<RecognizedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f32>,
}

impl MarkAttendanceResponse {
    pub fn from_outcome(request_id: impl Into<String>, outcome: &RecognitionOutcome) -> Self {
        let (recognized, best_score) = match outcome {
            RecognitionOutcome::Recognized { entries } => {
                (entries.iter().map(RecognizedEntry::from).collect(), None)
            }
            RecognitionOutcome::NotRecognized { best_score, .. } => (Vec::new(), *best_score),
            RecognitionOutcome::NoFacesDetected => (Vec::new(), None),
        };

        Self {
            success: matches!(outcome, RecognitionOutcome::Recognized { .. }),
            request_id: request_id.into(),
            status: outcome.label().to_string(),
            message: outcome.summary(),
            recognized,
            best_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_optional_and_snake_case() {
        let req: MarkAttendanceRequest =
            serde_json::from_str(r#"{"faces": [[0.1, 0.2]], "mode": "single"}"#).unwrap();
        assert_eq!(req.mode, Some(RecognitionMode::Single));

        let req: MarkAttendanceRequest = serde_json::from_str(r#"{"faces": []}"#).unwrap();
        assert_eq!(req.mode, None);
        assert!(req.faces.is_empty());
    }

    #[test]
    fn not_recognized_response_keeps_best_score() {
        let outcome = RecognitionOutcome::NotRecognized {
            probes: 2,
            best_score: Some(0.42),
        };

        let response = MarkAttendanceResponse::from_outcome("req-1", &outcome);

        assert!(!response.success);
        assert_eq!(response.status, "not_recognized");
        assert_eq!(response.message, "Face not recognized");
        assert_eq!(response.best_score, Some(0.42));
    }
}
