//! Run identifier generation.

use uuid::Uuid;

/// Generates correlation identifiers for runs.
///
/// Run ids are opaque to the scheduler; they exist for log correlation and
/// for callers that persist reports. Replay pins the id via
/// [`crate::scheduler::RunOptions::with_run_id`] instead of generating one.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!("run-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_prefixed() {
        let generator = IdGenerator::new();
        let a = generator.generate_run_id();
        let b = generator.generate_run_id();
        assert!(a.starts_with("run-"));
        assert_ne!(a, b);
    }
}
