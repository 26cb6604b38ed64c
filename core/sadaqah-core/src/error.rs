//! Error types for sadaqah-core operations.
//!
//! Background paths (poll ticks, push-triggered refreshes, reminder ticks)
//! log these and move on. Only the loud refresh path and explicit user
//! actions turn them into the inline message returned by
//! [`LiveError::user_message`].

/// All errors that can occur in sadaqah-core operations.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    // ─────────────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Request timed out: {endpoint}")]
    Timeout { endpoint: String },

    #[error("Network error: {endpoint}: {details}")]
    Network { endpoint: String, details: String },

    #[error("Server rejected request: {endpoint}: HTTP {status}")]
    Api {
        endpoint: String,
        status: u16,
        detail: Option<String>,
    },

    #[error("Response decode failed: {endpoint}: {details}")]
    Decode { endpoint: String, details: String },

    #[error("Invalid URL: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Live connection failed: {0}")]
    Connect(String),

    // ─────────────────────────────────────────────────────────────────────
    // Participant Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Participant name is required")]
    MissingParticipantName,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ─────────────────────────────────────────────────────────────────────
    // Notification Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Notifications are not supported on this host")]
    NotificationsUnsupported,

    #[error("Notification permission was not granted")]
    NotificationPermissionDenied,

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Controller has been disposed")]
    Disposed,
}

/// Convenience type alias for Results using LiveError.
pub type Result<T> = std::result::Result<T, LiveError>;

impl LiveError {
    /// True for failures that clear up by themselves on the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            LiveError::Timeout { .. } | LiveError::Network { .. } | LiveError::Connect(_) => true,
            LiveError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Single inline message shown next to the interactive controls.
    pub fn user_message(&self) -> String {
        match self {
            LiveError::Timeout { .. } => {
                "The server took too long to respond. Please try again.".to_string()
            }
            LiveError::Network { .. } | LiveError::Connect(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            LiveError::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            LiveError::MissingParticipantName => {
                "Please enter your name before reserving or completing a juz.".to_string()
            }
            LiveError::InvalidInput(reason) => reason.clone(),
            LiveError::NotificationsUnsupported => {
                "This device does not support notifications.".to_string()
            }
            LiveError::NotificationPermissionDenied => {
                "Please allow notifications to enable reading reminders.".to_string()
            }
            _ => "Something unexpected happened. Please try again.".to_string(),
        }
    }
}
