mod extract;
mod outcome;

pub use extract::{SummaryExtractor, parse_outcome};
pub use outcome::TestOutcome;
