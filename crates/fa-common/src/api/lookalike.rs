use serde::{Deserialize, Serialize};

use crate::matching::{Lookalike, LookalikeOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct LookalikeRequest {
    pub face: Vec<f32>,
    #[serde(default)]
    pub k: Option<usize>,
    /// 呼び出し側が本人の key を知っている場合に指定する
    #[serde(default)]
    pub exclude_identity_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookalikeMatch {
    pub identity_key: String,
    pub display_name: String,
    pub similarity_percentage: f64,
}

impl From<Lookalike> for LookalikeMatch {
    fn from(value: Lookalike) -> Self {
        Self {
            identity_key: value.identity_key,
            display_name: value.display_name,
            similarity_percentage: value.similarity_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookalikeResponse {
    pub status: String,
    pub matches: Vec<LookalikeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_similarity: Option<f32>,
}

impl From<LookalikeOutcome> for LookalikeResponse {
    fn from(outcome: LookalikeOutcome) -> Self {
        let status = outcome.status().to_string();
        match outcome {
            LookalikeOutcome::Found { matches } => Self {
                status,
                matches: matches.into_iter().map(LookalikeMatch::from).collect(),
                max_similarity: None,
            },
            LookalikeOutcome::NoIdentities => Self {
                status,
                matches: Vec::new(),
                max_similarity: None,
            },
            LookalikeOutcome::NoCloseMatch { max_similarity } => Self {
                status,
                matches: Vec::new(),
                max_similarity: Some(max_similarity),
            },
        }
    }
}
