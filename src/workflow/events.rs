use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::StageError;
use crate::workflow::types::{OutcomeStatus, Stage};

/// A stage transition inside one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    /// Sequence number of the run, unique per orchestrator.
    pub run: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    StageStarted {
        stage: Stage,
    },
    StageSucceeded {
        stage: Stage,
        elapsed: Duration,
    },
    StageFailed {
        stage: Stage,
        error: StageError,
        elapsed: Duration,
    },
    Finished {
        status: OutcomeStatus,
    },
}

/// Receives stage transitions as they happen.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Emits every transition as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match &event.kind {
            EventKind::StageStarted { stage } => {
                tracing::info!(run = event.run, stage = stage.as_str(), "Stage started");
            }
            EventKind::StageSucceeded { stage, elapsed } => {
                tracing::info!(
                    run = event.run,
                    stage = stage.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage succeeded"
                );
            }
            EventKind::StageFailed {
                stage,
                error,
                elapsed,
            } => {
                tracing::warn!(
                    run = event.run,
                    stage = stage.as_str(),
                    kind = error.kind(),
                    cause = %error.cause(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage failed"
                );
            }
            EventKind::Finished { status } => {
                tracing::info!(run = event.run, status = status.as_str(), "Pipeline finished");
            }
        }
    }
}
