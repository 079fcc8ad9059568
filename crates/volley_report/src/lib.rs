mod events;
mod render;
mod reporter;
mod result;
mod summary;

pub use events::{EventRecord, EventSink, TracingEventSink};
pub use render::format_duration;
pub use reporter::{DummyReporter, IssueClient, ProgressReporter};
pub use result::{ExecutionStatus, RawExecutionResult};
pub use summary::{OutcomeTotals, RunSummary, TargetReport};
