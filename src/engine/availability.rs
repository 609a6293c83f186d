use chrono::{Datelike, Days, NaiveDate};

use crate::config::ScheduleConfig;
use crate::model::*;

use super::conflict::has_conflict;

// ── Slot universe ────────────────────────────────────────────────

/// The ordered catalog of candidate start minutes for any day:
/// `open, open+step, …` strictly below `close`.
pub fn slot_universe(cfg: &ScheduleConfig) -> Vec<Minutes> {
    let mut slots = Vec::new();
    let mut s = cfg.open;
    while s < cfg.close {
        slots.push(s);
        s += cfg.slot_minutes;
    }
    slots
}

// ── Blocks ───────────────────────────────────────────────────────

/// The full-day block covering `date`, if any. Partial-day blocks are not
/// folded into this day-level predicate; they act at slot granularity.
pub fn full_day_block_on(blocks: &[Block], date: NaiveDate) -> Option<&Block> {
    blocks.iter().find(|b| b.is_full_day() && b.covers_date(date))
}

/// All minute windows blocked on `date`, full-day blocks included.
pub fn blocked_windows_on(blocks: &[Block], date: NaiveDate) -> Vec<(ulid::Ulid, Window)> {
    blocks
        .iter()
        .filter_map(|b| b.window_on(date).map(|w| (b.id, w)))
        .collect()
}

// ── Availability ─────────────────────────────────────────────────

/// Legal start minutes for a `(date, duration)` pair: the slot universe
/// filtered by the midnight bound, by conflicts with active bookings, and by
/// block windows effective on the date. Ascending; empty is a valid result
/// (fully booked or blocked day).
pub fn available_starts(
    cfg: &ScheduleConfig,
    day: Option<&DayState>,
    blocks: &[Block],
    date: NaiveDate,
    duration_hours: u8,
) -> Vec<Minutes> {
    let blocked = blocked_windows_on(blocks, date);
    slot_universe(cfg)
        .into_iter()
        .filter(|&s| fits(s, duration_hours))
        .filter(|&s| {
            let w = Window::new(s, s + Minutes::from(duration_hours) * 60);
            if blocked.iter().any(|(_, bw)| bw.overlaps(&w)) {
                return false;
            }
            match day {
                Some(day) => has_conflict(day, &w, None).is_none(),
                None => true,
            }
        })
        .collect()
}

/// Per-day flags for calendar rendering.
///
/// `is_fully_booked` trips once active hours reach the configured threshold —
/// below the 14.5 startable hours on purpose, so a day can read as saturated
/// before every minute is literally booked.
pub fn day_flags(
    cfg: &ScheduleConfig,
    day: Option<&DayState>,
    blocks: &[Block],
    date: NaiveDate,
    today: NaiveDate,
) -> DayFlags {
    let booked_hours = day.map_or(0, DayState::booked_hours);
    let is_past = date <= today;
    let is_blocked = full_day_block_on(blocks, date).is_some();
    let is_fully_booked = booked_hours >= cfg.full_day_threshold_hours;
    DayFlags {
        date,
        is_past,
        is_blocked,
        is_fully_booked,
        is_selectable: !(is_past || is_blocked || is_fully_booked),
        booked_hours,
    }
}

// ── Month grid ───────────────────────────────────────────────────

/// The 42 consecutive dates of a month's 6×7 grid, weeks starting Monday.
/// Cells carry `true` iff they belong to the requested month. `None` for an
/// invalid year/month.
pub fn month_cells(year: i32, month: u32) -> Option<Vec<(NaiveDate, bool)>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let pad = u64::from(first.weekday().num_days_from_monday());
    let grid_start = first.checked_sub_days(Days::new(pad))?;
    let mut cells = Vec::with_capacity(42);
    for i in 0..42u64 {
        let date = grid_start.checked_add_days(Days::new(i))?;
        cells.push((date, date.month() == month && date.year() == year));
    }
    Some(cells)
}

/// Back-navigation rule: a month is browsable iff it is not earlier than
/// `browse_back_months` calendar months before today's month. Future months
/// are always browsable.
pub fn month_browsable(year: i32, month: u32, today: NaiveDate, browse_back_months: u32) -> bool {
    let requested = year * 12 + month as i32 - 1;
    let current = today.year() * 12 + today.month() as i32 - 1;
    requested >= current - browse_back_months as i32
}
