use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures raised at the slot/export boundary. Nothing here is fatal to
/// the enclosing command loop; callers surface the message and move on.
#[derive(Debug, Error)]
pub enum Error {
    /// The picker produced a window with `from` after `to`. Never reaches
    /// the network; the active window is left unchanged.
    #[error("invalid window: 'from' ({from}) is after 'to' ({to})")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// Network failure or non-2xx from the analytics backend. Scoped to
    /// the slot that issued the request.
    #[error("request failed ({status}): {message}")]
    Fetch { status: u16, message: String },

    /// An export for this disposition label is already in flight.
    #[error("export already running for \"{0}\"")]
    ExportInProgress(String),

    /// Export fetch, render, or file write failed. The in-flight guard is
    /// cleared before this surfaces so retry is immediate.
    #[error("export failed: {0}")]
    Export(String),

    /// Quick-filter presets are rejected while auto-refresh owns the window.
    #[error("auto-refresh is active; stop it before changing the window preset")]
    AutoRefreshActive,

    /// Admin-gated data requested without the admin role.
    #[error("\"{0}\" requires the admin role")]
    AdminRequired(String),
}

impl Error {
    /// Wrap a reqwest transport error (no HTTP status available).
    pub fn transport(err: reqwest::Error) -> Self {
        Error::Fetch {
            status: 0,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
