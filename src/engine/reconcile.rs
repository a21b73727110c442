use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info};

use crate::model::*;

use super::status::{compute_room_status, confirmed_by_room};
use super::{Engine, EngineError};

/// What caused a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    Startup,
    Interval,
    BookingsChanged,
    RoomsChanged,
    Manual,
}

/// Counts from one expiry or reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub expired_slots: usize,
    pub room_writes: usize,
    pub booking_writes: usize,
    pub failed_writes: usize,
    pub skipped_malformed: usize,
    /// Writes left to a concurrent tick that already had them in flight.
    pub deferred: usize,
}

impl PassReport {
    pub fn writes(&self) -> usize {
        self.room_writes + self.booking_writes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub trigger: TickTrigger,
    pub now: Ms,
    pub expiry: PassReport,
    pub reconcile: PassReport,
    /// Room statuses once both passes are done.
    pub rooms: StatusSummary,
}

impl TickReport {
    /// Successful writes issued by the whole tick.
    pub fn writes(&self) -> usize {
        self.expiry.writes() + self.reconcile.writes()
    }

    pub fn failed_writes(&self) -> usize {
        self.expiry.failed_writes + self.reconcile.failed_writes
    }
}

enum RoomWrite {
    Written,
    Failed,
    /// Another tick changed the room first; holds what it found.
    Superseded(RoomStatus),
}

impl Engine {
    /// Complete every confirmed slot booking whose checkout has passed, freeing
    /// its room if that room is still marked occupied.
    pub async fn expire_slot_bookings(&self, now: Ms) -> Result<PassReport, EngineError> {
        let view = self.snapshot().await?;
        let mut rooms = view.rooms.to_vec();
        Ok(self.run_expiry(&mut rooms, &view.bookings, now).await)
    }

    /// Write the computed status of every room whose stored status differs.
    pub async fn reconcile(&self, now: Ms) -> Result<PassReport, EngineError> {
        let view = self.snapshot().await?;
        let mut rooms = view.rooms.to_vec();
        Ok(self.run_reconcile(&mut rooms, &view.bookings, now).await)
    }

    /// One full pass at the clock's current instant: expiry, then reconcile.
    pub async fn tick(&self, trigger: TickTrigger) -> Result<TickReport, EngineError> {
        self.tick_at(trigger, self.now()).await
    }

    pub async fn tick_at(&self, trigger: TickTrigger, now: Ms) -> Result<TickReport, EngineError> {
        let trigger_label = crate::observability::trigger_label(trigger);
        let view = match self.snapshot().await {
            Ok(view) => view,
            Err(e) => {
                metrics::counter!(crate::observability::TICKS_TOTAL, "trigger" => trigger_label, "outcome" => "skipped")
                    .increment(1);
                return Err(e);
            }
        };
        let started = Instant::now();
        debug!("checking room statuses at {now} ({trigger_label})");

        // Working copy: expiry results must be visible to the reconcile pass.
        let mut rooms = view.rooms.to_vec();
        let expiry = self.run_expiry(&mut rooms, &view.bookings, now).await;
        let reconcile = self.run_reconcile(&mut rooms, &view.bookings, now).await;

        metrics::counter!(crate::observability::TICKS_TOTAL, "trigger" => trigger_label, "outcome" => "ran")
            .increment(1);
        metrics::histogram!(crate::observability::TICK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let summary = StatusSummary::from_rooms(rooms.iter());
        for status in RoomStatus::ALL {
            metrics::gauge!(crate::observability::ROOMS, "status" => status.as_str())
                .set(summary.count(status) as f64);
        }

        Ok(TickReport {
            trigger,
            now,
            expiry,
            reconcile,
            rooms: summary,
        })
    }

    /// Bookings are handled one at a time so a room shared by two expired slots
    /// is released once. The room is claimed before the booking write so a
    /// tick started by that write's change event cannot free it as well.
    async fn run_expiry(&self, rooms: &mut [Room], bookings: &[Booking], now: Ms) -> PassReport {
        let mut report = PassReport::default();

        for booking in bookings.iter().filter(|b| b.is_expired_slot(now)) {
            if booking.validate().is_err() {
                report.skipped_malformed += 1;
                continue;
            }
            let Some(_booking_claim) = self.claim_booking(&booking.id) else {
                report.deferred += 1;
                continue;
            };
            if self.live_booking_status(&booking.id).await.unwrap_or(booking.status) != BookingStatus::Confirmed {
                continue;
            }
            let room_pos = rooms.iter().position(|r| r.number == booking.room_number);
            let room_claim = room_pos.and_then(|pos| self.claim_room(&rooms[pos].id));

            info!(
                "slot for room {} expired at {}",
                booking.room_number, booking.check_out
            );
            report.expired_slots += 1;
            metrics::counter!(crate::observability::SLOT_EXPIRATIONS_TOTAL).increment(1);

            if !self.write_booking_status(booking, BookingStatus::Completed).await {
                // Reconcile still frees the room; the next tick retries the booking.
                report.failed_writes += 1;
                continue;
            }
            report.booking_writes += 1;

            let Some(pos) = room_pos else {
                debug!("expired slot {} references unknown room {}", booking.id, booking.room_number);
                continue;
            };
            let Some(_room_claim) = room_claim else {
                report.deferred += 1;
                continue;
            };
            let room = &mut rooms[pos];
            room.status = self.live_room_status(&room.id).await.unwrap_or(room.status);
            if room.status != RoomStatus::Occupied {
                continue;
            }
            if self.write_room_status(room, RoomStatus::Available).await {
                room.status = RoomStatus::Available;
                report.room_writes += 1;
            } else {
                report.failed_writes += 1;
            }
        }

        report
    }

    async fn run_reconcile(&self, rooms: &mut [Room], bookings: &[Booking], now: Ms) -> PassReport {
        let mut report = PassReport::default();
        let (by_room, malformed) = confirmed_by_room(bookings);
        report.skipped_malformed = malformed;
        let lookahead = self.config.reserved_lookahead_ms;

        let mut pending = Vec::new();
        for (pos, room) in rooms.iter().enumerate() {
            if room.validate().is_err() {
                report.skipped_malformed += 1;
                continue;
            }
            let relevant = by_room.get(room.number.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let decision = compute_room_status(room, relevant.iter().copied(), now, lookahead);
            let Some(next) = decision.write_needed(room.status) else { continue };
            match self.claim_room(&room.id) {
                Some(claim) => pending.push((pos, next, claim)),
                None => {
                    debug!("room {} already being written, leaving it to that tick", room.number);
                    report.deferred += 1;
                }
            }
        }

        // Rooms are independent: one failed write never holds up the others.
        let view: &[Room] = rooms;
        let outcomes = join_all(pending.into_iter().map(move |(pos, next, claim)| async move {
            let _claim = claim;
            (pos, next, self.settle_room(&view[pos], next).await)
        }))
        .await;

        for (pos, next, outcome) in outcomes {
            match outcome {
                RoomWrite::Written => {
                    rooms[pos].status = next;
                    report.room_writes += 1;
                }
                RoomWrite::Failed => report.failed_writes += 1,
                RoomWrite::Superseded(found) => rooms[pos].status = found,
            }
        }

        report
    }

    /// Write `next` unless the room moved on since this tick read it.
    async fn settle_room(&self, room: &Room, next: RoomStatus) -> RoomWrite {
        let live = self.live_room_status(&room.id).await.unwrap_or(room.status);
        if live != room.status {
            debug!("room {} changed to {live} during the tick, skipping", room.number);
            return RoomWrite::Superseded(live);
        }
        if self.write_room_status(room, next).await {
            RoomWrite::Written
        } else {
            RoomWrite::Failed
        }
    }
}
