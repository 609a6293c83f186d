use ulid::Ulid;

use crate::model::{BookingStatus, Minutes, fmt_hhmm};

/// Why a request was refused outright. Each variant names the specific cause
/// so callers can present an actionable message; a refused request is never
/// coerced into a different slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    PastDate,
    DateTooFarAhead,
    DurationOutOfRange { got: u8, min: u8, max: u8 },
    UnalignedStart { start: Minutes },
    OutsideHours { start: Minutes },
    CrossesMidnight { start: Minutes, duration_hours: u8 },
    SlotConflict { other: Ulid },
    DateBlocked { block: Ulid },
    WindowBlocked { block: Ulid },
    EmptyField(&'static str),
    FieldTooLong(&'static str),
    BadEmail,
    BadMembersCount { got: u32 },
    BadDateRange,
    BadWindow,
    BadMonth { year: i32, month: u32 },
    MonthNotBrowsable { year: i32, month: u32 },
}

impl std::fmt::Display for Reject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reject::PastDate => write!(f, "date is not bookable: earliest bookable date is tomorrow"),
            Reject::DateTooFarAhead => write!(f, "date is beyond the booking horizon"),
            Reject::DurationOutOfRange { got, min, max } => {
                write!(f, "duration {got}h out of range [{min}h, {max}h]")
            }
            Reject::UnalignedStart { start } => {
                write!(f, "start {} is not on the slot grid", fmt_hhmm(*start))
            }
            Reject::OutsideHours { start } => {
                write!(f, "start {} is outside operating hours", fmt_hhmm(*start))
            }
            Reject::CrossesMidnight { start, duration_hours } => write!(
                f,
                "{} + {duration_hours}h crosses midnight",
                fmt_hhmm(*start)
            ),
            Reject::SlotConflict { other } => {
                write!(f, "slot overlaps active booking {other}")
            }
            Reject::DateBlocked { block } => write!(f, "date is blocked by {block}"),
            Reject::WindowBlocked { block } => {
                write!(f, "time window is blocked by {block}")
            }
            Reject::EmptyField(name) => write!(f, "{name} must not be empty"),
            Reject::FieldTooLong(name) => write!(f, "{name} too long"),
            Reject::BadEmail => write!(f, "contact email is not plausible"),
            Reject::BadMembersCount { got } => write!(f, "members_count {got} out of range"),
            Reject::BadDateRange => write!(f, "start_date must not be after end_date"),
            Reject::BadWindow => write!(f, "block window must satisfy start < end within the day"),
            Reject::BadMonth { year, month } => write!(f, "no such month: {year}-{month:02}"),
            Reject::MonthNotBrowsable { year, month } => {
                write!(f, "month {year}-{month:02} is behind the browsing horizon")
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// Out-of-policy request. Synchronous, final; retrying verbatim is useless.
    Validation(Reject),
    /// State-machine contract violation: transition attempted from a terminal
    /// state. Stale-client error; callers must not retry.
    InvalidTransition { id: Ulid, from: BookingStatus },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    /// The journal could not commit. The caller may retry with backoff; the
    /// engine itself never retries.
    Store(String),
}

impl EngineError {
    pub fn conflict(other: Ulid) -> Self {
        EngineError::Validation(Reject::SlotConflict { other })
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(reject) => write!(f, "validation failed: {reject}"),
            EngineError::InvalidTransition { id, from } => {
                write!(f, "booking {id} cannot leave status '{}'", from.as_str())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_messages_name_the_cause() {
        let msg = Reject::CrossesMidnight {
            start: 22 * 60 + 30,
            duration_hours: 2,
        }
        .to_string();
        assert!(msg.contains("22:30"));
        assert!(msg.contains("midnight"));

        let other = Ulid::new();
        let msg = EngineError::conflict(other).to_string();
        assert!(msg.contains(&other.to_string()));
    }

    #[test]
    fn invalid_transition_names_current_status() {
        let err = EngineError::InvalidTransition {
            id: Ulid::new(),
            from: BookingStatus::Cancelled,
        };
        assert!(err.to_string().contains("cancelled"));
    }
}
