mod artifact;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use artifact::{ArtifactMethod, CalendarArtifact};
pub use availability::{
    available_starts, day_flags, full_day_block_on, month_browsable, month_cells, slot_universe,
};
pub use error::{EngineError, Reject};
pub use mutations::{BlockRequest, BookingRequest};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::ScheduleConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

/// Notification channel for committed booking/block events.
pub const CHANNEL_BOOKINGS: &str = "bookings";
/// Notification channel for calendar artifacts (the mailer's feed).
pub const CHANNEL_ARTIFACTS: &str = "artifacts";

// ── Group-commit journal channel ─────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// One rehearsal room's scheduling state: bookings sharded per calendar date,
/// a venue-wide block list, and the journal that makes both durable.
pub struct Engine {
    pub cfg: ScheduleConfig,
    pub(super) days: DashMap<NaiveDate, SharedDayState>,
    /// Reverse lookup: booking id → date shard.
    pub(super) booking_dates: DashMap<Ulid, NaiveDate>,
    pub(super) blocks: RwLock<Vec<Block>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a booking event directly to a DayState (no locking — caller holds
/// the lock). The journal is the source of truth: no re-validation here.
fn apply_to_day(day: &mut DayState, event: &Event, index: &DashMap<Ulid, NaiveDate>) {
    match event {
        Event::BookingRequested {
            id,
            date,
            start,
            duration_hours,
            band_name,
            email,
            phone,
            members_count,
            notes,
            created_at,
        } => {
            day.insert_booking(Booking {
                id: *id,
                date: *date,
                start: *start,
                duration_hours: *duration_hours,
                band_name: band_name.clone(),
                email: email.clone(),
                phone: phone.clone(),
                members_count: *members_count,
                notes: notes.clone(),
                status: BookingStatus::Pending,
                cancel_reason: None,
                created_at: *created_at,
            });
            index.insert(*id, *date);
        }
        Event::BookingApproved { id, .. } => {
            if let Some(b) = day.booking_mut(*id) {
                b.status = BookingStatus::Approved;
            }
        }
        Event::BookingRejected { id, .. } => {
            if let Some(b) = day.booking_mut(*id) {
                b.status = BookingStatus::Rejected;
            }
        }
        Event::BookingCancelled { id, reason, .. } => {
            if let Some(b) = day.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
                b.cancel_reason = Some(reason.clone());
            }
        }
        Event::BlockCreated { .. } | Event::BlockUpdated { .. } | Event::BlockDeleted { .. } => {}
    }
}

/// Apply a block event to the venue-wide block list.
fn apply_to_blocks(blocks: &mut Vec<Block>, event: &Event) {
    match event {
        Event::BlockCreated {
            id,
            start_date,
            end_date,
            window,
            reason,
            created_by,
        } => {
            blocks.push(Block {
                id: *id,
                start_date: *start_date,
                end_date: *end_date,
                window: *window,
                reason: reason.clone(),
                created_by: created_by.clone(),
            });
        }
        Event::BlockUpdated {
            id,
            start_date,
            end_date,
            window,
            reason,
        } => {
            if let Some(b) = blocks.iter_mut().find(|b| b.id == *id) {
                b.start_date = *start_date;
                b.end_date = *end_date;
                b.window = *window;
                b.reason = reason.clone();
            }
        }
        Event::BlockDeleted { id } => {
            blocks.retain(|b| b.id != *id);
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(cfg: ScheduleConfig, wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            cfg,
            days: DashMap::new(),
            booking_dates: DashMap::new(),
            blocks: RwLock::new(Vec::new()),
            wal_tx,
            notify,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this may run inside an async context (lazy venue creation).
        for event in &events {
            match event.booking_date() {
                Some(date) => {
                    let day = engine.day_shard(date);
                    let mut guard = day.try_write().expect("replay: uncontended write");
                    apply_to_day(&mut guard, event, &engine.booking_dates);
                }
                None => {
                    let mut blocks =
                        engine.blocks.try_write().expect("replay: uncontended write");
                    apply_to_blocks(&mut blocks, event);
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the journal via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    /// Get-or-create the shard for a date. The entry guard drops before any
    /// await, so shards are safe to lock afterwards.
    pub(super) fn day_shard(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .value()
            .clone()
    }

    /// The shard for a date, without creating one.
    pub fn get_day(&self, date: NaiveDate) -> Option<SharedDayState> {
        self.days.get(&date).map(|e| e.value().clone())
    }

    pub fn date_of_booking(&self, id: &Ulid) -> Option<NaiveDate> {
        self.booking_dates.get(id).map(|e| *e.value())
    }

    /// Journal-append + apply + notify in one call, with the day lock held.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DayState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.booking_dates);
        self.publish_event(event);
        Ok(())
    }

    /// Journal-append + apply + notify for block events.
    pub(super) async fn persist_and_apply_block(
        &self,
        blocks: &mut Vec<Block>,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_blocks(blocks, event);
        self.publish_event(event);
        Ok(())
    }

    fn publish_event(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(payload) => self.notify.send(CHANNEL_BOOKINGS, &payload),
            Err(e) => tracing::error!("failed to encode event payload: {e}"),
        }
    }

    /// Lookup booking id → date shard, acquire the shard's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        id: &Ulid,
    ) -> Result<(NaiveDate, tokio::sync::OwnedRwLockWriteGuard<DayState>), EngineError> {
        let date = self.date_of_booking(id).ok_or(EngineError::NotFound(*id))?;
        let day = self.get_day(date).ok_or(EngineError::NotFound(*id))?;
        let guard = day.write_owned().await;
        Ok((date, guard))
    }
}
