use thiserror::Error;

/// Validation errors raised by the calendar engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid time zone id: {0}")]
    InvalidTimeZone(String),

    #[error("invalid event {id}: {reason}")]
    InvalidEvent { id: i64, reason: String },
}

impl CalendarError {
    pub(crate) fn invalid_event(id: i64, reason: impl Into<String>) -> Self {
        CalendarError::InvalidEvent {
            id,
            reason: reason.into(),
        }
    }
}

pub type CalendarResult<T> = Result<T, CalendarError>;
