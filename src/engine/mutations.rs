use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::artifact::{ArtifactMethod, CalendarArtifact};
use super::availability::{blocked_windows_on, full_day_block_on};
use super::conflict::{has_conflict, now_ms, today_in, validate_payload, validate_slot};
use super::error::Reject;
use super::{CHANNEL_ARTIFACTS, Engine, EngineError, WalCommand};

/// A reservation request as submitted by a band.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start: Minutes,
    pub duration_hours: u8,
    pub band_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub members_count: u32,
    pub notes: Option<String>,
}

/// A staff request to create or reshape a block.
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window: Option<Window>,
    pub reason: String,
    pub created_by: String,
}

fn validate_block_shape(req: &BlockRequest) -> Result<(), EngineError> {
    if req.start_date > req.end_date {
        return Err(EngineError::Validation(Reject::BadDateRange));
    }
    if let Some(w) = req.window
        && !(0 <= w.start && w.start < w.end && w.end <= DAY_END_MIN) {
            return Err(EngineError::Validation(Reject::BadWindow));
        }
    if req.reason.trim().is_empty() {
        return Err(EngineError::Validation(Reject::EmptyField("reason")));
    }
    if req.reason.len() > MAX_REASON_LEN {
        return Err(EngineError::Validation(Reject::FieldTooLong("reason")));
    }
    if req.created_by.len() > MAX_CREATED_BY_LEN {
        return Err(EngineError::Validation(Reject::FieldTooLong("created_by")));
    }
    Ok(())
}

impl Engine {
    /// `create(payload) → pending`. Every precondition failure is a
    /// `Validation` error naming the reason; nothing is created on failure.
    /// The conflict check and the insert run under the date's write lock —
    /// one atomic unit, so concurrent requests for the same slot serialize.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        validate_payload(
            &req.band_name,
            &req.email,
            req.phone.as_deref(),
            req.members_count,
            req.notes.as_deref(),
        )?;
        let today = today_in(self.cfg.timezone);
        validate_slot(&self.cfg, req.date, req.start, req.duration_hours, today)?;
        if self.booking_dates.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }

        let day = self.day_shard(req.date);
        let mut guard = day.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this date"));
        }

        let window = Window::new(
            req.start,
            req.start + Minutes::from(req.duration_hours) * 60,
        );
        self.check_not_blocked(req.date, &window).await?;
        if let Some(other) = has_conflict(&guard, &window, None) {
            return Err(EngineError::conflict(other));
        }

        let created_at = now_ms();
        let event = Event::BookingRequested {
            id: req.id,
            date: req.date,
            start: req.start,
            duration_hours: req.duration_hours,
            band_name: req.band_name,
            email: req.email,
            phone: req.phone,
            members_count: req.members_count,
            notes: req.notes,
            created_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let booking = guard
            .booking(req.id)
            .cloned()
            .expect("just-applied booking present");
        Ok(booking)
    }

    /// `pending → approved`. Re-validates conflicts and blocks defensively —
    /// a block may have been created after submission — then emits the
    /// PUBLISH artifact.
    pub async fn approve_booking(&self, id: Ulid) -> Result<CalendarArtifact, EngineError> {
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?.clone();
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
            });
        }

        let window = booking.window();
        self.check_not_blocked(date, &window).await?;
        if let Some(other) = has_conflict(&guard, &window, Some(id)) {
            return Err(EngineError::conflict(other));
        }

        let event = Event::BookingApproved { id, date };
        self.persist_and_apply(&mut guard, &event).await?;

        let artifact =
            CalendarArtifact::for_booking(&self.cfg, &booking, ArtifactMethod::Publish, now_ms());
        self.publish_artifact(id, &artifact);
        Ok(artifact)
    }

    /// `pending → rejected`. No re-validation needed; the slot frees
    /// immediately and no artifact is produced.
    pub async fn reject_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
            });
        }

        let event = Event::BookingRejected { id, date };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// `pending|approved → cancelled`. Records the reason, frees the slot,
    /// emits the CANCEL artifact (same UID as the PUBLISH one).
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        reason: String,
    ) -> Result<CalendarArtifact, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::Validation(Reject::FieldTooLong("cancel_reason")));
        }
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?.clone();
        if !booking.status.is_active() {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
            });
        }

        let event = Event::BookingCancelled { id, date, reason };
        self.persist_and_apply(&mut guard, &event).await?;

        let artifact =
            CalendarArtifact::for_booking(&self.cfg, &booking, ArtifactMethod::Cancel, now_ms());
        self.publish_artifact(id, &artifact);
        Ok(artifact)
    }

    async fn check_not_blocked(&self, date: NaiveDate, window: &Window) -> Result<(), EngineError> {
        let blocks = self.blocks.read().await;
        if let Some(b) = full_day_block_on(&blocks, date) {
            return Err(EngineError::Validation(Reject::DateBlocked { block: b.id }));
        }
        for (block_id, bw) in blocked_windows_on(&blocks, date) {
            if bw.overlaps(window) {
                return Err(EngineError::Validation(Reject::WindowBlocked {
                    block: block_id,
                }));
            }
        }
        Ok(())
    }

    fn publish_artifact(&self, booking_id: Ulid, artifact: &CalendarArtifact) {
        let envelope = serde_json::json!({
            "booking_id": booking_id.to_string(),
            "method": artifact.method.as_str(),
            "uid": artifact.uid,
            "attendee": artifact.attendee_email,
            "ics": artifact.to_ics(),
        });
        self.notify.send(CHANNEL_ARTIFACTS, &envelope.to_string());
        metrics::counter!(
            crate::observability::ARTIFACTS_EMITTED_TOTAL,
            "method" => artifact.method.as_str()
        )
        .increment(1);
        tracing::info!("artifact {}", artifact.describe());
    }

    // ── Blocks ───────────────────────────────────────────

    pub async fn create_block(&self, req: BlockRequest) -> Result<Block, EngineError> {
        validate_block_shape(&req)?;
        if req.created_by.trim().is_empty() {
            return Err(EngineError::Validation(Reject::EmptyField("created_by")));
        }

        let mut blocks = self.blocks.write().await;
        if blocks.len() >= MAX_BLOCKS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many blocks"));
        }
        if blocks.iter().any(|b| b.id == req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }

        let event = Event::BlockCreated {
            id: req.id,
            start_date: req.start_date,
            end_date: req.end_date,
            window: req.window,
            reason: req.reason,
            created_by: req.created_by,
        };
        self.persist_and_apply_block(&mut blocks, &event).await?;

        let block = blocks
            .iter()
            .find(|b| b.id == req.id)
            .cloned()
            .expect("just-applied block present");
        Ok(block)
    }

    pub async fn update_block(&self, req: BlockRequest) -> Result<(), EngineError> {
        validate_block_shape(&req)?;

        let mut blocks = self.blocks.write().await;
        if !blocks.iter().any(|b| b.id == req.id) {
            return Err(EngineError::NotFound(req.id));
        }

        let event = Event::BlockUpdated {
            id: req.id,
            start_date: req.start_date,
            end_date: req.end_date,
            window: req.window,
            reason: req.reason,
        };
        self.persist_and_apply_block(&mut blocks, &event).await
    }

    pub async fn delete_block(&self, id: Ulid) -> Result<(), EngineError> {
        let mut blocks = self.blocks.write().await;
        if !blocks.iter().any(|b| b.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BlockDeleted { id };
        self.persist_and_apply_block(&mut blocks, &event).await
    }

    // ── Maintenance ──────────────────────────────────────

    /// Drop day shards older than `cutoff` (exclusive) from memory and from
    /// the id→date index. The next compaction drops them from the journal.
    pub async fn prune_days_before(&self, cutoff: NaiveDate) -> usize {
        let old: Vec<NaiveDate> = self
            .days
            .iter()
            .filter(|e| *e.key() < cutoff)
            .map(|e| *e.key())
            .collect();
        let mut dropped = 0usize;
        for date in old {
            if let Some((_, day)) = self.days.remove(&date) {
                let guard = day.read().await;
                for b in &guard.bookings {
                    self.booking_dates.remove(&b.id);
                }
                dropped += 1;
            }
        }
        dropped
    }

    /// Compact the journal by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        {
            let blocks = self.blocks.read().await;
            for b in blocks.iter() {
                events.push(Event::BlockCreated {
                    id: b.id,
                    start_date: b.start_date,
                    end_date: b.end_date,
                    window: b.window,
                    reason: b.reason.clone(),
                    created_by: b.created_by.clone(),
                });
            }
        }

        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        for date in dates {
            let Some(day) = self.get_day(date) else { continue };
            let guard = day.read().await;
            for b in &guard.bookings {
                events.push(Event::BookingRequested {
                    id: b.id,
                    date: b.date,
                    start: b.start,
                    duration_hours: b.duration_hours,
                    band_name: b.band_name.clone(),
                    email: b.email.clone(),
                    phone: b.phone.clone(),
                    members_count: b.members_count,
                    notes: b.notes.clone(),
                    created_at: b.created_at,
                });
                match b.status {
                    BookingStatus::Pending => {}
                    BookingStatus::Approved => {
                        events.push(Event::BookingApproved { id: b.id, date: b.date });
                    }
                    BookingStatus::Rejected => {
                        events.push(Event::BookingRejected { id: b.id, date: b.date });
                    }
                    BookingStatus::Cancelled => {
                        events.push(Event::BookingCancelled {
                            id: b.id,
                            date: b.date,
                            reason: b.cancel_reason.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
