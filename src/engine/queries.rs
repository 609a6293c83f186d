use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::artifact::{ArtifactMethod, CalendarArtifact};
use super::availability::{
    available_starts, blocked_windows_on, day_flags, month_browsable, month_cells, slot_universe,
};
use super::conflict::{duration_booked_at, now_ms, today_in};
use super::error::Reject;
use super::{Engine, EngineError};

impl Engine {
    /// Venue-local calendar date.
    pub fn today(&self) -> NaiveDate {
        today_in(self.cfg.timezone)
    }

    /// Legal start minutes for `(date, duration)`. An empty result is a valid
    /// answer (fully booked or blocked day). Advisory: re-validated under the
    /// write lock when a booking is actually created.
    pub async fn list_available_starts(
        &self,
        date: NaiveDate,
        duration_hours: u8,
    ) -> Result<Vec<Minutes>, EngineError> {
        if duration_hours < self.cfg.min_duration_hours
            || duration_hours > self.cfg.max_duration_hours
        {
            return Err(EngineError::Validation(Reject::DurationOutOfRange {
                got: duration_hours,
                min: self.cfg.min_duration_hours,
                max: self.cfg.max_duration_hours,
            }));
        }

        let day = self.get_day(date);
        let guard = match &day {
            Some(d) => Some(d.read().await),
            None => None,
        };
        let blocks = self.blocks.read().await;
        Ok(available_starts(
            &self.cfg,
            guard.as_deref(),
            &blocks,
            date,
            duration_hours,
        ))
    }

    pub async fn get_day_flags(&self, date: NaiveDate) -> DayFlags {
        let today = today_in(self.cfg.timezone);
        let day = self.get_day(date);
        let guard = match &day {
            Some(d) => Some(d.read().await),
            None => None,
        };
        let blocks = self.blocks.read().await;
        day_flags(&self.cfg, guard.as_deref(), &blocks, date, today)
    }

    /// The fixed 42-cell grid for a month, each cell carrying its flags.
    /// Months behind the browsing horizon are refused.
    pub async fn calendar_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<DayCell>, EngineError> {
        let today = today_in(self.cfg.timezone);
        if !month_browsable(year, month, today, self.cfg.browse_back_months) {
            return Err(EngineError::Validation(Reject::MonthNotBrowsable {
                year,
                month,
            }));
        }
        let cells = month_cells(year, month)
            .ok_or(EngineError::Validation(Reject::BadMonth { year, month }))?;

        // Snapshot the block list up front: day shards are always locked
        // before the block lock, never under it.
        let blocks = self.list_blocks().await;
        let mut out = Vec::with_capacity(cells.len());
        for (date, in_month) in cells {
            let day = self.get_day(date);
            let guard = match &day {
                Some(d) => Some(d.read().await),
                None => None,
            };
            out.push(DayCell {
                date,
                in_month,
                flags: day_flags(&self.cfg, guard.as_deref(), &blocks, date, today),
            });
        }
        Ok(out)
    }

    /// Per-slot schedule of a date for grid rendering: each universe slot is
    /// free, booked (with the covering booking's duration), or blocked.
    pub async fn day_schedule(&self, date: NaiveDate) -> Vec<SlotRow> {
        let day = self.get_day(date);
        let guard = match &day {
            Some(d) => Some(d.read().await),
            None => None,
        };
        let blocks = self.blocks.read().await;
        let blocked = blocked_windows_on(&blocks, date);

        slot_universe(&self.cfg)
            .into_iter()
            .map(|start| {
                let slot = Window::new(start, start + self.cfg.slot_minutes);
                let state = if blocked.iter().any(|(_, w)| w.overlaps(&slot)) {
                    SlotState::Blocked
                } else {
                    match guard.as_deref().map(|d| duration_booked_at(d, start)) {
                        Some(h) if h > 0 => SlotState::Booked { duration_hours: h },
                        _ => SlotState::Free,
                    }
                };
                SlotRow { start, state }
            })
            .collect()
    }

    /// Duration of the active booking covering `start` on `date`, else 0.
    pub async fn booked_duration_at(&self, date: NaiveDate, start: Minutes) -> u8 {
        match self.get_day(date) {
            Some(day) => duration_booked_at(&*day.read().await, start),
            None => 0,
        }
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let date = self.date_of_booking(&id)?;
        let day = self.get_day(date)?;
        let guard = day.read().await;
        guard.booking(id).cloned()
    }

    /// All bookings on one date (any status), sorted by start minute.
    pub async fn list_bookings(&self, date: NaiveDate) -> Vec<Booking> {
        match self.get_day(date) {
            Some(day) => day.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    /// Bookings across an inclusive date range, ordered by (date, start).
    pub async fn list_bookings_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        if from > to {
            return Err(EngineError::Validation(Reject::BadDateRange));
        }
        if (to - from).num_days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }

        let mut dates: Vec<NaiveDate> = self
            .days
            .iter()
            .map(|e| *e.key())
            .filter(|d| (from..=to).contains(d))
            .collect();
        dates.sort();

        let mut out = Vec::new();
        for date in dates {
            if let Some(day) = self.get_day(date) {
                out.extend(day.read().await.bookings.iter().cloned());
            }
        }
        Ok(out)
    }

    /// Every booking the store holds, ordered by (date, start).
    pub async fn list_all_bookings(&self) -> Vec<Booking> {
        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        let mut out = Vec::new();
        for date in dates {
            if let Some(day) = self.get_day(date) {
                out.extend(day.read().await.bookings.iter().cloned());
            }
        }
        out
    }

    pub async fn list_blocks(&self) -> Vec<Block> {
        self.blocks.read().await.clone()
    }

    /// Regenerate the artifact a booking's current status implies: approved ⇒
    /// PUBLISH, cancelled ⇒ CANCEL, otherwise none. Unknown ids are an error.
    pub async fn artifact_for(&self, id: Ulid) -> Result<Option<CalendarArtifact>, EngineError> {
        let booking = self.get_booking(id).await.ok_or(EngineError::NotFound(id))?;
        let method = match booking.status {
            BookingStatus::Approved => ArtifactMethod::Publish,
            BookingStatus::Cancelled => ArtifactMethod::Cancel,
            BookingStatus::Pending | BookingStatus::Rejected => return Ok(None),
        };
        Ok(Some(CalendarArtifact::for_booking(
            &self.cfg, &booking, method, now_ms(),
        )))
    }
}
