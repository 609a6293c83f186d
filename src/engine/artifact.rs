//! Calendar-interchange records (RFC 5545 subset). One artifact is produced
//! per lifecycle transition that notifies the client; the record is derived
//! state, fully regenerable from the booking plus the method.

use chrono::{DateTime, NaiveDate};

use crate::config::ScheduleConfig;
use crate::model::{Booking, Minutes, Ms, Window, fmt_hhmm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMethod {
    Publish,
    Cancel,
}

impl ArtifactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactMethod::Publish => "PUBLISH",
            ArtifactMethod::Cancel => "CANCEL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarArtifact {
    pub method: ArtifactMethod,
    /// Stable per booking: regenerating (or cancelling) reproduces the same
    /// UID, so calendar clients correlate PUBLISH/CANCEL pairs.
    pub uid: String,
    /// Generation timestamp — the only non-deterministic field.
    pub dtstamp: Ms,
    pub date: NaiveDate,
    pub window: Window,
    pub summary: String,
    pub organizer_name: String,
    pub organizer_email: String,
    pub attendee_email: String,
    pub tzid: String,
}

impl CalendarArtifact {
    pub fn for_booking(
        cfg: &ScheduleConfig,
        booking: &Booking,
        method: ArtifactMethod,
        stamp: Ms,
    ) -> Self {
        Self {
            method,
            uid: format!("{}@{}", booking.id, cfg.uid_domain),
            dtstamp: stamp,
            date: booking.date,
            window: booking.window(),
            summary: format!("{} — {}", cfg.venue_name, booking.band_name),
            organizer_name: cfg.venue_name.clone(),
            organizer_email: cfg.organizer_email.clone(),
            attendee_email: booking.email.clone(),
            tzid: cfg.timezone.name().to_string(),
        }
    }

    /// Render the iCalendar text, CRLF line endings throughout.
    pub fn to_ics(&self) -> String {
        let status = match self.method {
            ArtifactMethod::Publish => "CONFIRMED",
            ArtifactMethod::Cancel => "CANCELLED",
        };
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//greenroom//booking//EN".to_string(),
            format!("METHOD:{}", self.method.as_str()),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", self.uid),
            format!("DTSTAMP:{}", fmt_utc_stamp(self.dtstamp)),
            format!(
                "DTSTART;TZID={}:{}",
                self.tzid,
                fmt_local(self.date, self.window.start)
            ),
            format!(
                "DTEND;TZID={}:{}",
                self.tzid,
                fmt_local(self.date, self.window.end)
            ),
            format!("SUMMARY:{}", escape_text(&self.summary)),
            format!(
                "ORGANIZER;CN={}:mailto:{}",
                escape_text(&self.organizer_name),
                self.organizer_email
            ),
            format!("ATTENDEE:mailto:{}", self.attendee_email),
            format!("STATUS:{status}"),
            "END:VEVENT".to_string(),
            "END:VCALENDAR".to_string(),
        ];
        lines.push(String::new()); // trailing CRLF
        lines.join("\r\n")
    }

    /// Human-readable one-liner for logs.
    pub fn describe(&self) -> String {
        format!(
            "{} {} {} {}-{}",
            self.method.as_str(),
            self.uid,
            self.date,
            fmt_hhmm(self.window.start),
            fmt_hhmm(self.window.end)
        )
    }
}

/// `YYYYMMDDTHHMMSS` in venue-local time. `end == 1440` renders as the next
/// day's midnight.
fn fmt_local(date: NaiveDate, minute: Minutes) -> String {
    if minute >= crate::model::DAY_END_MIN {
        let next = date.succ_opt().expect("date overflow");
        return format!("{}T000000", next.format("%Y%m%d"));
    }
    format!("{}T{:02}{:02}00", date.format("%Y%m%d"), minute / 60, minute % 60)
}

fn fmt_utc_stamp(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .expect("timestamp out of range")
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}

/// RFC 5545 §3.3.11 TEXT escaping.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
