// Logging context handed to the builder, verifier and extractor. Records are
// emitted through the `log` facade under `target`, whoever owns the process
// decides where they end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    target: String,
}

impl LogContext {
    pub fn new<S: Into<String>>(target: S) -> Self {
        LogContext {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    // Narrower context, ie "aipkg" -> "aipkg::verify"
    pub fn child(&self, name: &str) -> Self {
        LogContext {
            target: format!("{}::{}", self.target, name),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        LogContext::new("aipkg")
    }
}
