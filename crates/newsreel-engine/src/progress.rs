//! Progress emission.
//!
//! The pipeline reports stage and item-level progress through a sink
//! supplied by the caller; the desktop shell renders these in its
//! progress indicator. A closure works directly as a sink.

use newsreel_models::ProgressUpdate;

/// Receives progress updates from a pipeline run.
pub trait ProgressSink: Send + Sync {
    fn update(&self, update: ProgressUpdate);
}

/// Sink that drops everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _update: ProgressUpdate) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn update(&self, update: ProgressUpdate) {
        self(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsreel_models::PipelineStage;
    use std::sync::Mutex;

    #[test]
    fn test_closure_is_a_sink() {
        let seen: Mutex<Vec<ProgressUpdate>> = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| {
            seen.lock().unwrap().push(update);
        };

        let as_dyn: &dyn ProgressSink = &sink;
        as_dyn.update(ProgressUpdate::stage(PipelineStage::Searching, "go"));
        as_dyn.update(ProgressUpdate::log("done"));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
