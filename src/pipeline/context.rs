use super::{ShrinkOptions, Stage};
use crate::error::{Result, ShrinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared flag that stops a run at the next checkpoint
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`ShrinkError::Cancelled`] if the token has been tripped
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            Err(ShrinkError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Callback notified on every stage transition
pub type StageObserver = Arc<dyn Fn(Stage) + Send + Sync>;

/// State of a single pipeline run
///
/// Created at the start of a run and dropped at its end; nothing in it
/// outlives the run.
pub struct RunContext {
    pub options: ShrinkOptions,
    pub cancel: CancellationToken,
    observer: Option<StageObserver>,
    stage: Stage,
    warnings: Vec<String>,
}

impl RunContext {
    pub fn new(options: ShrinkOptions, cancel: CancellationToken, observer: Option<StageObserver>) -> Self {
        Self {
            options,
            cancel,
            observer,
            stage: Stage::Idle,
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to the next stage; stages only ever advance
    pub fn enter(&mut self, stage: Stage) -> Result<()> {
        debug_assert!(stage > self.stage, "stage {} after {}", stage, self.stage);
        self.cancel.check(stage)?;

        self.stage = stage;
        info!("Stage: {}", stage);
        if let Some(observer) = &self.observer {
            observer(stage);
        }
        Ok(())
    }

    /// Mark the run complete; a finished run is never reported as cancelled
    pub fn finish(&mut self) {
        self.stage = Stage::Done;
        info!("Stage: {}", Stage::Done);
        if let Some(observer) = &self.observer {
            observer(Stage::Done);
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Record warnings that were already logged where they arose
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = String>) {
        self.warnings.extend(warnings);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
