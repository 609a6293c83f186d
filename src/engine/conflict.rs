use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use ulid::Ulid;

use crate::config::ScheduleConfig;
use crate::limits::*;
use crate::model::*;

use super::error::{EngineError, Reject};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_millis() as Ms
}

/// Venue-local calendar date.
pub(crate) fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// First active booking whose window overlaps `window`, skipping `exclude`.
/// Rejected/cancelled bookings never conflict — the slot frees immediately.
pub(crate) fn has_conflict(day: &DayState, window: &Window, exclude: Option<Ulid>) -> Option<Ulid> {
    day.active()
        .filter(|b| exclude != Some(b.id))
        .find(|b| b.window().overlaps(window))
        .map(|b| b.id)
}

/// Duration of the single active booking covering `start`, else 0. Lets a
/// grid render "booked, 2h" rather than just "unavailable".
pub(crate) fn duration_booked_at(day: &DayState, start: Minutes) -> u8 {
    day.active()
        .find(|b| b.window().contains_minute(start))
        .map_or(0, |b| b.duration_hours)
}

/// Slot-level policy checks for a booking request: duration bounds, grid
/// alignment, operating hours, the midnight bound, and the booking horizon.
/// Conflict and block checks happen separately, under the date's lock.
pub(crate) fn validate_slot(
    cfg: &ScheduleConfig,
    date: NaiveDate,
    start: Minutes,
    duration_hours: u8,
    today: NaiveDate,
) -> Result<(), EngineError> {
    if duration_hours < cfg.min_duration_hours || duration_hours > cfg.max_duration_hours {
        return Err(EngineError::Validation(Reject::DurationOutOfRange {
            got: duration_hours,
            min: cfg.min_duration_hours,
            max: cfg.max_duration_hours,
        }));
    }
    if date <= today {
        return Err(EngineError::Validation(Reject::PastDate));
    }
    if (date - today).num_days() > MAX_ADVANCE_DAYS {
        return Err(EngineError::Validation(Reject::DateTooFarAhead));
    }
    if start < cfg.open || start >= cfg.close {
        return Err(EngineError::Validation(Reject::OutsideHours { start }));
    }
    if (start - cfg.open) % cfg.slot_minutes != 0 {
        return Err(EngineError::Validation(Reject::UnalignedStart { start }));
    }
    if !fits(start, duration_hours) {
        return Err(EngineError::Validation(Reject::CrossesMidnight {
            start,
            duration_hours,
        }));
    }
    Ok(())
}

/// Field-level checks for the request payload.
pub(crate) fn validate_payload(
    band_name: &str,
    email: &str,
    phone: Option<&str>,
    members_count: u32,
    notes: Option<&str>,
) -> Result<(), EngineError> {
    if band_name.trim().is_empty() {
        return Err(EngineError::Validation(Reject::EmptyField("band_name")));
    }
    if band_name.len() > MAX_BAND_NAME_LEN {
        return Err(EngineError::Validation(Reject::FieldTooLong("band_name")));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::Validation(Reject::FieldTooLong("email")));
    }
    // Containment check only; deliverability is the mailer's problem.
    let plausible = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !plausible {
        return Err(EngineError::Validation(Reject::BadEmail));
    }
    if let Some(p) = phone
        && p.len() > MAX_PHONE_LEN {
            return Err(EngineError::Validation(Reject::FieldTooLong("phone")));
        }
    if members_count == 0 || members_count > MAX_MEMBERS_COUNT {
        return Err(EngineError::Validation(Reject::BadMembersCount {
            got: members_count,
        }));
    }
    if let Some(n) = notes
        && n.len() > MAX_NOTES_LEN {
            return Err(EngineError::Validation(Reject::FieldTooLong("notes")));
        }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn booking(start: Minutes, duration_hours: u8, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            date: date("2026-09-10"),
            start,
            duration_hours,
            band_name: "Static Bloom".into(),
            email: "sb@example.org".into(),
            phone: None,
            members_count: 4,
            notes: None,
            status,
            cancel_reason: None,
            created_at: 0,
        }
    }

    fn day_with(bookings: Vec<Booking>) -> DayState {
        let mut day = DayState::new(date("2026-09-10"));
        for b in bookings {
            day.insert_booking(b);
        }
        day
    }

    #[test]
    fn overlap_detected_inside_existing_booking() {
        // 14:00/3h holds the room; 15:00/1h sits fully inside it
        let day = day_with(vec![booking(14 * 60, 3, BookingStatus::Pending)]);
        let w = Window::new(15 * 60, 16 * 60);
        assert!(has_conflict(&day, &w, None).is_some());
    }

    #[test]
    fn adjacent_bookings_do_not_conflict() {
        let day = day_with(vec![booking(10 * 60, 1, BookingStatus::Approved)]);
        let w = Window::new(11 * 60, 12 * 60);
        assert!(has_conflict(&day, &w, None).is_none());
        let before = Window::new(9 * 60, 10 * 60);
        assert!(has_conflict(&day, &before, None).is_none());
    }

    #[test]
    fn terminal_statuses_never_conflict() {
        let day = day_with(vec![
            booking(14 * 60, 2, BookingStatus::Cancelled),
            booking(16 * 60, 2, BookingStatus::Rejected),
        ]);
        assert!(has_conflict(&day, &Window::new(14 * 60, 18 * 60), None).is_none());
    }

    #[test]
    fn exclude_skips_own_id() {
        let b = booking(14 * 60, 2, BookingStatus::Pending);
        let id = b.id;
        let day = day_with(vec![b]);
        assert!(has_conflict(&day, &Window::new(14 * 60, 16 * 60), Some(id)).is_none());
        assert!(has_conflict(&day, &Window::new(14 * 60, 16 * 60), None).is_some());
    }

    #[test]
    fn duration_booked_at_covering_booking() {
        let day = day_with(vec![booking(14 * 60, 2, BookingStatus::Approved)]);
        assert_eq!(duration_booked_at(&day, 14 * 60), 2);
        assert_eq!(duration_booked_at(&day, 15 * 60 + 30), 2);
        assert_eq!(duration_booked_at(&day, 16 * 60), 0); // half-open end
        assert_eq!(duration_booked_at(&day, 13 * 60), 0);
    }

    #[test]
    fn slot_validation_rejects_past_and_same_day() {
        let cfg = ScheduleConfig::default();
        let today = date("2026-09-10");
        let err = validate_slot(&cfg, today, 540, 1, today).unwrap_err();
        assert!(matches!(err, EngineError::Validation(Reject::PastDate)));
        let err = validate_slot(&cfg, date("2026-09-01"), 540, 1, today).unwrap_err();
        assert!(matches!(err, EngineError::Validation(Reject::PastDate)));
        assert!(validate_slot(&cfg, date("2026-09-11"), 540, 1, today).is_ok());
    }

    #[test]
    fn slot_validation_rejects_bad_duration_and_alignment() {
        let cfg = ScheduleConfig::default();
        let today = date("2026-09-10");
        let d = date("2026-09-11");
        assert!(matches!(
            validate_slot(&cfg, d, 540, 0, today),
            Err(EngineError::Validation(Reject::DurationOutOfRange { .. }))
        ));
        assert!(matches!(
            validate_slot(&cfg, d, 540, 5, today),
            Err(EngineError::Validation(Reject::DurationOutOfRange { .. }))
        ));
        assert!(matches!(
            validate_slot(&cfg, d, 540 + 15, 1, today),
            Err(EngineError::Validation(Reject::UnalignedStart { .. }))
        ));
        assert!(matches!(
            validate_slot(&cfg, d, 8 * 60, 1, today),
            Err(EngineError::Validation(Reject::OutsideHours { .. }))
        ));
        assert!(matches!(
            validate_slot(&cfg, d, 23 * 60, 2, today),
            Err(EngineError::Validation(Reject::CrossesMidnight { .. }))
        ));
    }

    #[test]
    fn slot_validation_respects_booking_horizon() {
        let cfg = ScheduleConfig::default();
        let today = date("2026-09-10");
        let too_far = today + chrono::Days::new(MAX_ADVANCE_DAYS as u64 + 1);
        assert!(matches!(
            validate_slot(&cfg, too_far, 540, 1, today),
            Err(EngineError::Validation(Reject::DateTooFarAhead))
        ));
    }

    #[test]
    fn payload_validation() {
        assert!(validate_payload("The Offcuts", "a@b.example", None, 4, None).is_ok());
        assert!(matches!(
            validate_payload("  ", "a@b.example", None, 4, None),
            Err(EngineError::Validation(Reject::EmptyField("band_name")))
        ));
        assert!(matches!(
            validate_payload("X", "not-an-email", None, 4, None),
            Err(EngineError::Validation(Reject::BadEmail))
        ));
        assert!(matches!(
            validate_payload("X", "a@b", None, 4, None),
            Err(EngineError::Validation(Reject::BadEmail))
        ));
        assert!(matches!(
            validate_payload("X", "a@b.example", None, 0, None),
            Err(EngineError::Validation(Reject::BadMembersCount { got: 0 }))
        ));
        let long_notes = "x".repeat(MAX_NOTES_LEN + 1);
        assert!(matches!(
            validate_payload("X", "a@b.example", None, 4, Some(&long_notes)),
            Err(EngineError::Validation(Reject::FieldTooLong("notes")))
        ));
    }
}
