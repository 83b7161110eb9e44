pub mod cleanup;
pub mod detector;

pub use cleanup::{run_garbage_cleanup, CleanupResult};
pub use detector::{GarbageAnalysis, GarbageCategory, GarbageDetector, Recommendation, SafetyCheck};
