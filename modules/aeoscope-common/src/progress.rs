use serde::Serialize;

/// Progress notification emitted while a pipeline run advances.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A pipeline stage started.
    Stage {
        stage: u8,
        total_stages: u8,
        message: String,
    },
    /// One question's fetch finished (success or error).
    QuestionFetched {
        completed: usize,
        total: usize,
        question: String,
    },
    /// One model review batch was dispatched.
    ClassificationBatch {
        batch: usize,
        total_batches: usize,
        urls: usize,
    },
}

/// Pluggable sink for progress events.
///
/// Purely observational: the pipeline produces the same output whether or
/// not anyone listens, and implementations must not block or fail the run.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Sink for callers that don't observe progress.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ProgressEvent::QuestionFetched {
            completed: 3,
            total: 10,
            question: "what is acme".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"question_fetched\""));
        assert!(json.contains("\"completed\":3"));
    }
}
