/// How loudly a notification is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Periodic healthy report; delivered silently.
    Routine,
    /// Non-fatal problem, e.g. a failed cleanup.
    Warning,
    /// Unreachable host or a workload that is down. Never suppressed.
    Critical,
}

/// A rendered message ready for delivery. `text` is Telegram HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub text: String,
}

impl Notification {
    pub fn routine(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Routine,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            text: text.into(),
        }
    }

    pub fn critical(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            text: text.into(),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.severity == Severity::Routine
    }
}
