use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — wall-clock timestamps (created_at, DTSTAMP).
pub type Ms = i64;

/// Minutes since local midnight — the only time-of-day type.
pub type Minutes = i32;

/// Exclusive upper bound of a day: bookings must end by 24:00.
pub const DAY_END_MIN: Minutes = 24 * 60;

/// Format minutes-since-midnight as `HH:MM`.
pub fn fmt_hhmm(min: Minutes) -> String {
    format!("{:02}:{:02}", min / 60, min % 60)
}

/// Parse `HH:MM` into minutes-since-midnight. Rejects `24:00` and beyond.
pub fn parse_hhmm(s: &str) -> Option<Minutes> {
    let (h, m) = s.split_once(':')?;
    let h: Minutes = h.parse().ok()?;
    let m: Minutes = m.parse().ok()?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    Some(h * 60 + m)
}

/// Half-open minute window `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Minutes,
    pub end: Minutes,
}

impl Window {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn duration_min(&self) -> Minutes {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_minute(&self, t: Minutes) -> bool {
        self.start <= t && t < self.end
    }
}

/// True iff a booking starting at `start` for `duration_hours` ends by 24:00.
pub fn fits(start: Minutes, duration_hours: u8) -> bool {
    start + Minutes::from(duration_hours) * 60 <= DAY_END_MIN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their slot; rejected/cancelled free it.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "approved" => Some(BookingStatus::Approved),
            "rejected" => Some(BookingStatus::Rejected),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// A reservation. Created once, mutated only through lifecycle transitions,
/// never physically deleted — cancellation/rejection is a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub date: NaiveDate,
    /// Start minute, aligned to the slot grid.
    pub start: Minutes,
    pub duration_hours: u8,
    pub band_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub members_count: u32,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub cancel_reason: Option<String>,
    pub created_at: Ms,
}

impl Booking {
    pub fn window(&self) -> Window {
        Window::new(self.start, self.start + Minutes::from(self.duration_hours) * 60)
    }
}

/// A maintenance/closure block. No window ⇒ whole days in the range are
/// blocked; with a window ⇒ only that minute range on each day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window: Option<Window>,
    pub reason: String,
    pub created_by: String,
}

impl Block {
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn is_full_day(&self) -> bool {
        self.window.is_none()
    }

    /// The minute window this block occupies on `date`, if any.
    pub fn window_on(&self, date: NaiveDate) -> Option<Window> {
        if !self.covers_date(date) {
            return None;
        }
        Some(self.window.unwrap_or(Window::new(0, DAY_END_MIN)))
    }
}

/// All bookings for one calendar date, sorted by start minute.
/// History (rejected/cancelled) stays in the list; only active entries count
/// for conflicts.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start minute. Equal starts are legal:
    /// a freed slot can be re-requested while the old booking stays as history.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start, |b| b.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Active bookings only (pending or approved).
    pub fn active(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.status.is_active())
    }

    /// Sum of active booking durations, in whole hours.
    pub fn booked_hours(&self) -> i64 {
        self.active().map(|b| i64::from(b.duration_hours)).sum()
    }
}

/// The event types — flat, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingRequested {
        id: Ulid,
        date: NaiveDate,
        start: Minutes,
        duration_hours: u8,
        band_name: String,
        email: String,
        phone: Option<String>,
        members_count: u32,
        notes: Option<String>,
        created_at: Ms,
    },
    BookingApproved {
        id: Ulid,
        date: NaiveDate,
    },
    BookingRejected {
        id: Ulid,
        date: NaiveDate,
    },
    BookingCancelled {
        id: Ulid,
        date: NaiveDate,
        reason: String,
    },
    BlockCreated {
        id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        window: Option<Window>,
        reason: String,
        created_by: String,
    },
    BlockUpdated {
        id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        window: Option<Window>,
        reason: String,
    },
    BlockDeleted {
        id: Ulid,
    },
}

impl Event {
    /// The date whose shard this event mutates, if any. Block events touch the
    /// venue-wide block list instead.
    pub fn booking_date(&self) -> Option<NaiveDate> {
        match self {
            Event::BookingRequested { date, .. }
            | Event::BookingApproved { date, .. }
            | Event::BookingRejected { date, .. }
            | Event::BookingCancelled { date, .. } => Some(*date),
            Event::BlockCreated { .. } | Event::BlockUpdated { .. } | Event::BlockDeleted { .. } => {
                None
            }
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Per-day flags for calendar rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayFlags {
    pub date: NaiveDate,
    pub is_past: bool,
    pub is_blocked: bool,
    pub is_fully_booked: bool,
    pub is_selectable: bool,
    pub booked_hours: i64,
}

/// One cell of the fixed 42-cell month grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub flags: DayFlags,
}

/// What a universe slot holds on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    /// Covered by an active booking of the given duration.
    Booked { duration_hours: u8 },
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRow {
    pub start: Minutes,
    pub state: SlotState,
}
