use log::warn;

use crate::logctx::LogContext;

pub type ProgressError = Box<dyn std::error::Error + Send + Sync>;

// Advisory progress sink. Called on the pipeline's own thread so it must
// return promptly; an Err is logged and otherwise ignored.
pub trait Progress {
    fn update(&mut self, done: u64, total: u64, message: &str) -> Result<(), ProgressError>;
}

impl<F> Progress for F
where
    F: FnMut(u64, u64, &str) -> Result<(), ProgressError>,
{
    fn update(&mut self, done: u64, total: u64, message: &str) -> Result<(), ProgressError> {
        self(done, total, message)
    }
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _done: u64, _total: u64, _message: &str) -> Result<(), ProgressError> {
        Ok(())
    }
}

// Forwards to the caller's sink only when the whole percentage moves, the
// stage changes or the work completes
pub(crate) struct Throttle<'a> {
    inner: &'a mut dyn Progress,
    log: &'a LogContext,
    last_pct: Option<u64>,
    last_stage: String,
}

impl<'a> Throttle<'a> {
    pub(crate) fn new(inner: &'a mut dyn Progress, log: &'a LogContext) -> Self {
        Throttle {
            inner,
            log,
            last_pct: None,
            last_stage: String::new(),
        }
    }

    pub(crate) fn report(&mut self, stage: &str, done: u64, total: u64, message: &str) {
        let pct = if total == 0 { 100 } else { done.min(total) * 100 / total };
        let moved = self.last_pct != Some(pct);
        let new_stage = self.last_stage != stage;

        if !(moved || new_stage || done >= total) {
            return;
        }
        self.last_pct = Some(pct);
        if new_stage {
            self.last_stage = stage.to_string();
        }

        if let Err(e) = self.inner.update(done, total, message) {
            warn!(target: self.log.target(), "progress callback failed: {}", e);
        }
    }
}
