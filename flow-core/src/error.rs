use std::error::Error as StdError;
use std::fmt;

/// The fixed set of failure classes a flow can report through [`FlowError`].
///
/// This mirrors the stable category list every `flow` consumer matches on —
/// adding a variant is a breaking change, so the set is closed and ordered
/// the same way across the whole workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// `Flow::run` was called a second time on an already-started flow.
    AlreadyRunning,
    /// An endpoint's `activate` returned an error.
    Activate,
    /// A source's `next` returned an error.
    Source,
    /// A message's `accept` returned an error.
    Accept,
    /// A sink's `drain` returned an error.
    Drain,
    /// The parent context was cancelled and no internal error had latched.
    Cancelled,
    /// A user callback (source/accept/drain/activate) panicked.
    Panic,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::AlreadyRunning => "already_running",
            ErrorCategory::Activate => "activate",
            ErrorCategory::Source => "source",
            ErrorCategory::Accept => "accept",
            ErrorCategory::Drain => "drain",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Panic => "panic",
        };
        f.write_str(name)
    }
}

/// The engine's single error type: a stable [`ErrorCategory`], a
/// human-readable message, and an optional underlying cause.
///
/// Every fallible path in `flow-engine` ultimately produces one of these —
/// user callback failures, activation failures, and the `Cancelled`
/// wrapper around an external context cancellation all flow through the
/// same shape, so callers can match on `category()` once instead of
/// threading several error enums through their code.
pub struct FlowError {
    category: ErrorCategory,
    message: String,
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl FlowError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Clones the category and message but drops the cause, which may not
    /// itself be `Clone`. Used where the same failure must be reported
    /// through two independent channels — for instance, returned
    /// synchronously from `Flow::run` and also recorded for a later
    /// `Flow::wait` — and only one of them can own the original cause.
    pub fn shallow_clone(&self) -> Self {
        Self::new(self.category, self.message.clone())
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

impl fmt::Debug for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowError")
            .field("category", &self.category)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl StdError for FlowError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
