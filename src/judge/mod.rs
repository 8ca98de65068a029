pub mod comparator;
pub mod grading;
pub mod harness;
pub mod judge_python;
pub mod judge_remote;
pub mod judge_utils;
pub mod protocol;
pub mod sandbox;
#[cfg(not(target_arch = "wasm32"))]
pub mod sandbox_server;

pub use comparator::compare;
pub use grading::{GradeOutcome, format_grade_message, grade};
pub use harness::generate;
pub use protocol::parse;
pub use sandbox::{Sandbox, SandboxOutput};
