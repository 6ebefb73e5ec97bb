//! The unit of work handed to the sandbox.

use std::time::SystemTime;

/// One learner-provided snippet plus language and optional stdin.
#[derive(Debug, Clone)]
pub struct Submission {
    pub source_text: String,
    pub language_id: String,
    pub stdin_text: String,
    pub created_at: SystemTime,
}

impl Submission {
    pub fn new(
        source_text: impl Into<String>,
        language_id: impl Into<String>,
        stdin_text: impl Into<String>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            language_id: language_id.into(),
            stdin_text: stdin_text.into(),
            created_at: SystemTime::now(),
        }
    }
}
