mod error;
mod queries;
mod reconcile;
pub mod status;

pub use error::{EngineError, Feed, MalformedRecord, StoreError};
pub use reconcile::{PassReport, TickReport, TickTrigger};
pub use status::{compute_room_status, precedence, strongest, StatusDecision};

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::*;
use crate::repository::{BookingRepository, RoomRepository, Snapshot};

#[derive(Default)]
struct SnapshotState {
    rooms: Option<Snapshot<Room>>,
    bookings: Option<Snapshot<Booking>>,
}

/// Both feeds as they stood at one instant.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    pub rooms: Snapshot<Room>,
    pub bookings: Snapshot<Booking>,
}

/// Exclusive right to write one record's status. Released on drop.
pub(super) struct Claim<'a> {
    held: &'a DashSet<String>,
    id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.held.remove(&self.id);
    }
}

/// Room availability engine. Owns the in-memory snapshot of rooms and bookings
/// and converges stored room status toward the computed one.
pub struct Engine {
    snapshot: RwLock<SnapshotState>,
    rooms_repo: Arc<dyn RoomRepository>,
    bookings_repo: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    // Records with a write outstanding, shared by every concurrent tick.
    rooms_in_flight: DashSet<String>,
    bookings_in_flight: DashSet<String>,
}

impl Engine {
    pub fn new(
        rooms_repo: Arc<dyn RoomRepository>,
        bookings_repo: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            snapshot: RwLock::new(SnapshotState::default()),
            rooms_repo,
            bookings_repo,
            clock,
            config,
            rooms_in_flight: DashSet::new(),
            bookings_in_flight: DashSet::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Ms {
        self.clock.now()
    }

    pub fn room_repository(&self) -> &Arc<dyn RoomRepository> {
        &self.rooms_repo
    }

    pub fn booking_repository(&self) -> &Arc<dyn BookingRepository> {
        &self.bookings_repo
    }

    // ── Snapshot ─────────────────────────────────────────────

    /// Replace the room list wholesale.
    pub async fn replace_rooms(&self, rooms: Snapshot<Room>) {
        let malformed = rooms.iter().filter(|r| r.validate().is_err()).count();
        if malformed > 0 {
            warn!("room snapshot contains {malformed} malformed record(s); they will be skipped");
            metrics::counter!(crate::observability::MALFORMED_RECORDS_TOTAL, "feed" => "rooms")
                .increment(malformed as u64);
        }
        debug!("loaded {} rooms", rooms.len());
        self.snapshot.write().await.rooms = Some(rooms);
    }

    /// Replace the booking list wholesale.
    pub async fn replace_bookings(&self, bookings: Snapshot<Booking>) {
        let malformed = bookings.iter().filter(|b| b.validate().is_err()).count();
        if malformed > 0 {
            warn!("booking snapshot contains {malformed} malformed record(s); they will be skipped");
            metrics::counter!(crate::observability::MALFORMED_RECORDS_TOTAL, "feed" => "bookings")
                .increment(malformed as u64);
        }
        debug!("loaded {} bookings", bookings.len());
        self.snapshot.write().await.bookings = Some(bookings);
    }

    /// Forget both feeds. Ticks decline to run until new snapshots arrive.
    pub async fn clear_snapshot(&self) {
        *self.snapshot.write().await = SnapshotState::default();
    }

    /// Read both feeds together. Fails until each has delivered at least once.
    pub async fn snapshot(&self) -> Result<SnapshotView, EngineError> {
        let state = self.snapshot.read().await;
        let rooms = state
            .rooms
            .clone()
            .ok_or(EngineError::SnapshotUnavailable(Feed::Rooms))?;
        let bookings = state
            .bookings
            .clone()
            .ok_or(EngineError::SnapshotUnavailable(Feed::Bookings))?;
        Ok(SnapshotView { rooms, bookings })
    }

    /// Record a successful write in the snapshot so the next pass sees it
    /// even if the repository never redelivers.
    async fn patch_room_status(&self, room_id: &str, status: RoomStatus) {
        let mut state = self.snapshot.write().await;
        let Some(rooms) = state.rooms.as_mut() else { return };
        let Some(pos) = rooms.iter().position(|r| r.id == room_id) else { return };
        if rooms[pos].status != status {
            Arc::make_mut(rooms)[pos].status = status;
        }
    }

    async fn patch_booking_status(&self, booking_id: &str, status: BookingStatus) {
        let mut state = self.snapshot.write().await;
        let Some(bookings) = state.bookings.as_mut() else { return };
        let Some(pos) = bookings.iter().position(|b| b.id == booking_id) else { return };
        if bookings[pos].status != status {
            Arc::make_mut(bookings)[pos].status = status;
        }
    }

    /// Current status of a room as the engine last saw it, including writes
    /// made by other ticks since this one read its snapshot.
    pub(super) async fn live_room_status(&self, room_id: &str) -> Option<RoomStatus> {
        let state = self.snapshot.read().await;
        state.rooms.as_ref()?.iter().find(|r| r.id == room_id).map(|r| r.status)
    }

    pub(super) async fn live_booking_status(&self, booking_id: &str) -> Option<BookingStatus> {
        let state = self.snapshot.read().await;
        state.bookings.as_ref()?.iter().find(|b| b.id == booking_id).map(|b| b.status)
    }

    // ── Writes ───────────────────────────────────────────────

    /// `None` while another tick is writing this room.
    pub(super) fn claim_room(&self, room_id: &str) -> Option<Claim<'_>> {
        claim(&self.rooms_in_flight, room_id)
    }

    pub(super) fn claim_booking(&self, booking_id: &str) -> Option<Claim<'_>> {
        claim(&self.bookings_in_flight, booking_id)
    }

    /// Write a room's status. Failures are logged and reported, never retried here.
    pub(super) async fn write_room_status(&self, room: &Room, status: RoomStatus) -> bool {
        match self.rooms_repo.write_room_status(&room.id, status).await {
            Ok(()) => {
                info!("room {}: {} -> {status}", room.number, room.status);
                metrics::counter!(crate::observability::WRITES_TOTAL, "target" => "room", "outcome" => "ok")
                    .increment(1);
                self.patch_room_status(&room.id, status).await;
                true
            }
            Err(e) => {
                warn!("failed to set room {} to {status}: {e}", room.number);
                metrics::counter!(crate::observability::WRITES_TOTAL, "target" => "room", "outcome" => "error")
                    .increment(1);
                false
            }
        }
    }

    pub(super) async fn write_booking_status(&self, booking: &Booking, status: BookingStatus) -> bool {
        match self.bookings_repo.write_booking_status(&booking.id, status).await {
            Ok(()) => {
                info!("booking {} marked {status}", booking.id);
                metrics::counter!(crate::observability::WRITES_TOTAL, "target" => "booking", "outcome" => "ok")
                    .increment(1);
                self.patch_booking_status(&booking.id, status).await;
                true
            }
            Err(e) => {
                warn!("failed to mark booking {} {status}: {e}", booking.id);
                metrics::counter!(crate::observability::WRITES_TOTAL, "target" => "booking", "outcome" => "error")
                    .increment(1);
                false
            }
        }
    }

    // ── Status ───────────────────────────────────────────────

    /// Status the room with this number should have at `now`.
    pub async fn compute_room_status(&self, room_number: &str, now: Ms) -> Result<StatusDecision, EngineError> {
        let view = self.snapshot().await?;
        let room = view
            .rooms
            .iter()
            .find(|r| r.number == room_number && r.validate().is_ok())
            .ok_or_else(|| EngineError::UnknownRoom(room_number.to_string()))?;
        Ok(status::compute_room_status(
            room,
            view.bookings.iter(),
            now,
            self.config.reserved_lookahead_ms,
        ))
    }
}

fn claim<'a>(held: &'a DashSet<String>, id: &str) -> Option<Claim<'a>> {
    held.insert(id.to_string()).then(|| Claim {
        held,
        id: id.to_string(),
    })
}
