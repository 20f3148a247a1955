use proprio::ReflexError;
use thiserror::Error;

/// Everything that can stop a simulation run.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Reflex(#[from] ReflexError),

    /// A setting that parses but cannot be simulated.
    #[error("invalid setting `{field}`: {reason}")]
    Config { field: &'static str, reason: String },

    #[error("integration failed at t = {time}: {reason}")]
    Integration { time: f64, reason: String },

    #[error("usage: {0}")]
    Usage(String),
}

impl SimError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
