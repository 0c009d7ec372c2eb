pub mod fakes;
pub mod fixtures;
pub mod harness;

// Re-export commonly used test utilities
pub use fakes::{RunBehavior, ScriptedCompletion, ScriptedRunner};
pub use harness::TestHarness;
