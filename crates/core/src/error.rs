/// Result alias that carries the custom [`OverlapError`] type.
pub type Result<T> = std::result::Result<T, OverlapError>;

/// Common error type for the core crate.
///
/// Buffer overflow and underflow are deliberately absent: the engine degrades
/// by dropping input or returning short reads and only logs those conditions.
#[derive(Debug, thiserror::Error)]
pub enum OverlapError {
    /// Free-form message, mostly surfaced by the command line front end.
    #[error("{0}")]
    Message(String),
    /// The engine or accumulator was constructed with unusable parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A call received arguments that cannot be honoured.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A slot was committed or released out of reservation order.
    #[error("slot {got} handed back out of order (expected {expected})")]
    OutOfOrder { expected: usize, got: usize },
    /// Streaming reads on a record queue or record reads on a stream.
    #[error("operation requires {expected} output mode")]
    WrongMode { expected: &'static str },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration files that fail to parse.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl OverlapError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for OverlapError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for OverlapError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
