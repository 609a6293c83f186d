//! Scheduling policy. Everything the engine needs to know about business
//! hours, durations, and venue identity is carried here explicitly — never
//! read from globals — so engines stay testable and venues can differ.

use chrono_tz::Tz;

use crate::model::{DAY_END_MIN, Minutes, parse_hhmm};

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// First bookable start minute of the day.
    pub open: Minutes,
    /// Exclusive bound for start minutes: the slot universe stops below this.
    pub close: Minutes,
    /// Step between candidate starts.
    pub slot_minutes: Minutes,
    pub min_duration_hours: u8,
    pub max_duration_hours: u8,
    /// A day counts as fully booked once active bookings reach this many
    /// hours. Deliberately below the startable span — a saturation margin,
    /// not exact occupancy.
    pub full_day_threshold_hours: i64,
    /// How many calendar months before the current one stay browsable.
    pub browse_back_months: u32,
    /// Venue-local timezone; "today" and artifact DTSTART/DTEND use it.
    pub timezone: Tz,
    pub venue_name: String,
    pub organizer_email: String,
    /// Right-hand side of artifact UIDs.
    pub uid_domain: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            open: 9 * 60,
            close: DAY_END_MIN,
            slot_minutes: 30,
            min_duration_hours: 1,
            max_duration_hours: 4,
            full_day_threshold_hours: 13,
            browse_back_months: 1,
            timezone: chrono_tz::Europe::Berlin,
            venue_name: "Greenroom".into(),
            organizer_email: "bookings@greenroom.example".into(),
            uid_domain: "greenroom.example".into(),
        }
    }
}

impl ScheduleConfig {
    /// Build from `GREENROOM_*` environment variables, falling back to
    /// defaults field by field. Returns an error string for unparseable
    /// values rather than silently ignoring them.
    pub fn from_env() -> Result<Self, String> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("GREENROOM_OPEN") {
            cfg.open = parse_bound(&v).ok_or_else(|| format!("bad GREENROOM_OPEN: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_CLOSE") {
            cfg.close = parse_bound(&v).ok_or_else(|| format!("bad GREENROOM_CLOSE: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_SLOT_MINUTES") {
            cfg.slot_minutes = v
                .parse()
                .map_err(|_| format!("bad GREENROOM_SLOT_MINUTES: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_MIN_DURATION_HOURS") {
            cfg.min_duration_hours = v
                .parse()
                .map_err(|_| format!("bad GREENROOM_MIN_DURATION_HOURS: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_MAX_DURATION_HOURS") {
            cfg.max_duration_hours = v
                .parse()
                .map_err(|_| format!("bad GREENROOM_MAX_DURATION_HOURS: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_FULL_DAY_HOURS") {
            cfg.full_day_threshold_hours = v
                .parse()
                .map_err(|_| format!("bad GREENROOM_FULL_DAY_HOURS: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_TZ") {
            cfg.timezone = v.parse().map_err(|_| format!("bad GREENROOM_TZ: {v}"))?;
        }
        if let Ok(v) = std::env::var("GREENROOM_VENUE_NAME") {
            cfg.venue_name = v;
        }
        if let Ok(v) = std::env::var("GREENROOM_ORGANIZER_EMAIL") {
            cfg.organizer_email = v;
        }
        if let Ok(v) = std::env::var("GREENROOM_UID_DOMAIN") {
            cfg.uid_domain = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.slot_minutes <= 0 {
            return Err("slot_minutes must be positive".into());
        }
        if !(0..DAY_END_MIN).contains(&self.open) {
            return Err("open must be within the day".into());
        }
        if self.close <= self.open || self.close > DAY_END_MIN {
            return Err("close must be after open and at most 24:00".into());
        }
        if self.min_duration_hours == 0 || self.min_duration_hours > self.max_duration_hours {
            return Err("duration bounds must satisfy 0 < min <= max".into());
        }
        if self.full_day_threshold_hours <= 0 {
            return Err("full_day_threshold_hours must be positive".into());
        }
        Ok(())
    }
}

/// Parse an `HH:MM` bound, additionally accepting `24:00` as end-of-day.
fn parse_bound(s: &str) -> Option<Minutes> {
    if s == "24:00" {
        return Some(DAY_END_MIN);
    }
    parse_hhmm(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ScheduleConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.open, 540);
        assert_eq!(cfg.close, 1440);
        assert_eq!(cfg.slot_minutes, 30);
    }

    #[test]
    fn bound_parsing() {
        assert_eq!(parse_bound("09:00"), Some(540));
        assert_eq!(parse_bound("24:00"), Some(1440));
        assert_eq!(parse_bound("25:00"), None);
    }

    #[test]
    fn validate_rejects_inverted_hours() {
        let cfg = ScheduleConfig {
            open: 1200,
            close: 600,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_min_duration() {
        let cfg = ScheduleConfig {
            min_duration_hours: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
