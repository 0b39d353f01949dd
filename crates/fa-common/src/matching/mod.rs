pub mod lookalike;
pub mod matcher;

pub use lookalike::{
    rank_lookalikes, similarity_percentage, Lookalike, LookalikeOutcome, SelfExclusion, TopKRanker,
};
pub use matcher::{find_best_match, MatchResult, Matcher, NO_SCORE};
