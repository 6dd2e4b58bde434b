pub mod engine;
pub mod scorer;

pub use engine::{MatchEngine, MatchOutcome, Query, Strategy, StrategyFn, STRATEGIES};
pub use scorer::{Scorer, SearchResult};
