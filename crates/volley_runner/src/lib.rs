mod engine;
mod orchestration;
mod shutdown;

pub use engine::{EngineOutput, ExecutionEngine};
pub use orchestration::run_suite;
pub use shutdown::shutdown_receiver;
