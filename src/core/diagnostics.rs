use std::path::PathBuf;

/// Severity level of a diagnostic emitted by kbox operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational note; nothing needs attention.
    Info,
    /// Something went wrong but the operation carried on.
    Warning,
    /// A failure the caller should surface.
    Error,
}

/// Structured note surfaced alongside an operation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How loudly the note should be rendered.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// File the diagnostic refers to (configuration file, identity record, ...).
    pub path: Option<PathBuf>,
    /// Remediation hint.
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic with no path or help attached.
    pub fn new<S: Into<String>>(severity: Severity, message: S) -> Self {
        Self {
            severity,
            message: message.into(),
            path: None,
            help: None,
        }
    }

    /// Shorthand for a [`Severity::Warning`] diagnostic.
    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Attach the file the diagnostic refers to.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Attach a remediation hint.
    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }
}
