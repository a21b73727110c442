use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::MalformedRecord;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Fixed length of a walk-in slot booking.
pub const SLOT_DURATION_MS: Ms = 3 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// True when the span starts strictly after `t` but no later than `t + lookahead`.
    pub fn starts_within(&self, t: Ms, lookahead: Ms) -> bool {
        self.start > t && self.start <= t + lookahead
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Occupied,
    Reserved,
    Maintenance,
}

impl RoomStatus {
    pub const ALL: [RoomStatus; 4] = [
        RoomStatus::Available,
        RoomStatus::Occupied,
        RoomStatus::Reserved,
        RoomStatus::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Reserved => "reserved",
            RoomStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Pending => "pending",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records written before booking types existed count as `Hourly`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    #[default]
    Hourly,
    Daily,
    /// Fixed 3-hour walk-in booking, auto-expired when its window elapses.
    Slot,
}

/// A room as stored by the room repository. `number` is the join key for bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub number: String,
    pub status: RoomStatus,
}

impl Room {
    pub fn new(id: impl Into<String>, number: impl Into<String>, status: RoomStatus) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            status,
        }
    }

    pub fn validate(&self) -> Result<(), MalformedRecord> {
        if self.id.is_empty() {
            return Err(MalformedRecord::EmptyId);
        }
        if self.number.is_empty() {
            return Err(MalformedRecord::EmptyRoomNumber { id: self.id.clone() });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub room_number: String,
    pub check_in: Ms,
    pub check_out: Ms,
    pub booking_type: BookingType,
    pub status: BookingStatus,
}

impl Booking {
    pub fn new(
        id: impl Into<String>,
        room_number: impl Into<String>,
        check_in: Ms,
        check_out: Ms,
        booking_type: BookingType,
        status: BookingStatus,
    ) -> Self {
        Self {
            id: id.into(),
            room_number: room_number.into(),
            check_in,
            check_out,
            booking_type,
            status,
        }
    }

    /// A confirmed walk-in slot starting at `check_in`.
    pub fn slot(id: impl Into<String>, room_number: impl Into<String>, check_in: Ms) -> Self {
        Self::new(
            id,
            room_number,
            check_in,
            check_in + SLOT_DURATION_MS,
            BookingType::Slot,
            BookingStatus::Confirmed,
        )
    }

    pub fn validate(&self) -> Result<(), MalformedRecord> {
        if self.id.is_empty() {
            return Err(MalformedRecord::EmptyId);
        }
        if self.room_number.is_empty() {
            return Err(MalformedRecord::EmptyRoomNumber { id: self.id.clone() });
        }
        if self.check_out <= self.check_in {
            return Err(MalformedRecord::InvertedWindow {
                id: self.id.clone(),
                check_in: self.check_in,
                check_out: self.check_out,
            });
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Stay window. Only meaningful for well-formed bookings.
    pub fn span(&self) -> Span {
        Span::new(self.check_in, self.check_out)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    /// Confirmed slot whose window has elapsed at `now`.
    pub fn is_expired_slot(&self, now: Ms) -> bool {
        self.booking_type == BookingType::Slot && self.is_confirmed() && self.check_out <= now
    }
}

/// Room counts by stored status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub available: usize,
    pub occupied: usize,
    pub reserved: usize,
    pub maintenance: usize,
    pub total: usize,
}

impl StatusSummary {
    pub fn from_rooms<'a>(rooms: impl IntoIterator<Item = &'a Room>) -> Self {
        let mut summary = Self::default();
        for room in rooms {
            summary.total += 1;
            match room.status {
                RoomStatus::Available => summary.available += 1,
                RoomStatus::Occupied => summary.occupied += 1,
                RoomStatus::Reserved => summary.reserved += 1,
                RoomStatus::Maintenance => summary.maintenance += 1,
            }
        }
        summary
    }

    pub fn count(&self, status: RoomStatus) -> usize {
        match status {
            RoomStatus::Available => self.available,
            RoomStatus::Occupied => self.occupied,
            RoomStatus::Reserved => self.reserved,
            RoomStatus::Maintenance => self.maintenance,
        }
    }
}
