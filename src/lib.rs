pub mod app;
pub mod completion;
pub mod config;
pub mod coverage;
pub mod data;
pub mod error;
pub mod judge;
pub mod logger;
pub mod matching;
pub mod model;
pub mod progress;
pub mod quiz;

pub use app::LessonApp;
pub use judge::{GradeOutcome, grade};
pub use progress::{ProgressStore, SectionTracker};
