pub mod generation;
pub mod grading;

pub use generation::{GenerationService, ProviderGenerator};
pub use grading::{GradeVerdict, GradingService, ProviderGrader};
