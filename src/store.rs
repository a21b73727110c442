use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::engine::{MalformedRecord, StoreError};
use crate::model::*;
use crate::repository::{BookingRepository, RoomRepository, SnapshotFeed, SnapshotReceiver};

/// One field patch accepted by the store, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    Room { id: String, status: RoomStatus },
    Booking { id: String, status: BookingStatus },
}

/// On-disk layout: records keyed by id, the id itself not repeated inside.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Fixture {
    #[serde(default)]
    rooms: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    bookings: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct RoomFields {
    number: String,
    status: RoomStatus,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingFields {
    room_number: String,
    #[serde(deserialize_with = "instant::deserialize")]
    check_in: Ms,
    #[serde(deserialize_with = "instant::deserialize")]
    check_out: Ms,
    #[serde(default)]
    booking_type: BookingType,
    status: BookingStatus,
}

/// Booking instants as the booking screens write them: Unix milliseconds,
/// RFC 3339, or a `datetime-local` value (`2030-01-01T10:00`) in local time.
mod instant {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    use crate::model::Ms;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ms, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(ms),
            Raw::Text(text) => parse(&text).ok_or_else(|| de::Error::custom(format!("unrecognised instant {text:?}"))),
        }
    }

    pub fn parse(text: &str) -> Option<Ms> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.timestamp_millis());
        }
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
            .ok()?;
        Local.from_local_datetime(&naive).earliest().map(|dt| dt.timestamp_millis())
    }
}

/// In-process room and booking store. Every mutation republishes the affected
/// collection to subscribers, like a hosted real-time database would.
pub struct InMemoryStore {
    rooms: DashMap<String, Room>,
    bookings: DashMap<String, Booking>,
    room_feed: SnapshotFeed<Room>,
    booking_feed: SnapshotFeed<Booking>,
    failing: DashSet<String>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store that has not published anything yet.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            room_feed: SnapshotFeed::new(),
            booking_feed: SnapshotFeed::new(),
            failing: DashSet::new(),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Store seeded with both collections, published immediately.
    pub fn with_records(rooms: Vec<Room>, bookings: Vec<Booking>) -> Self {
        let store = Self::new();
        for room in rooms {
            store.rooms.insert(room.id.clone(), room);
        }
        for booking in bookings {
            store.bookings.insert(booking.id.clone(), booking);
        }
        store.publish_rooms();
        store.publish_bookings();
        store
    }

    // ── Publication ──────────────────────────────────────────

    pub fn publish_rooms(&self) {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        self.room_feed.publish(rooms);
    }

    pub fn publish_bookings(&self) {
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by(|a, b| a.id.cmp(&b.id));
        self.booking_feed.publish(bookings);
    }

    pub fn subscriber_count(&self) -> usize {
        self.room_feed.subscriber_count() + self.booking_feed.subscriber_count()
    }

    // ── Record CRUD (the surrounding application's side) ────

    pub fn room(&self, id: &str) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn room_by_number(&self, number: &str) -> Option<Room> {
        self.rooms
            .iter()
            .find(|e| e.value().number == number)
            .map(|e| e.value().clone())
    }

    pub fn upsert_room(&self, room: Room) {
        self.rooms.insert(room.id.clone(), room);
        self.publish_rooms();
    }

    pub fn upsert_booking(&self, booking: Booking) {
        self.bookings.insert(booking.id.clone(), booking);
        self.publish_bookings();
    }

    /// Insert a booking under a freshly minted id.
    pub fn add_booking(
        &self,
        room_number: &str,
        check_in: Ms,
        check_out: Ms,
        booking_type: BookingType,
    ) -> String {
        let id = Ulid::new().to_string();
        self.upsert_booking(Booking::new(
            id.clone(),
            room_number,
            check_in,
            check_out,
            booking_type,
            BookingStatus::Confirmed,
        ));
        id
    }

    pub fn remove_booking(&self, id: &str) -> Option<Booking> {
        let removed = self.bookings.remove(id).map(|(_, b)| b);
        if removed.is_some() {
            self.publish_bookings();
        }
        removed
    }

    // ── Fault injection and write log ───────────────────────

    /// Reject every subsequent write addressed to this room or booking id.
    pub fn fail_writes_for(&self, id: &str) {
        self.failing.insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn take_writes(&self) -> Vec<WriteRecord> {
        self.writes
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }

    fn record_write(&self, record: WriteRecord) {
        if let Ok(mut w) = self.writes.lock() {
            w.push(record);
        }
    }

    // ── JSON fixtures ────────────────────────────────────────

    /// Load a fixture file. Records that fail to decode or validate are skipped
    /// with a warning; the rest are published.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, StoreError> {
        let fixture: Fixture = serde_json::from_str(text)?;
        let mut rooms = Vec::new();
        for (id, value) in fixture.rooms {
            match decode_room(&id, value) {
                Ok(room) => rooms.push(room),
                Err(e) => warn!("skipping room: {e}"),
            }
        }
        let mut bookings = Vec::new();
        for (id, value) in fixture.bookings {
            match decode_booking(&id, value) {
                Ok(booking) => bookings.push(booking),
                Err(e) => warn!("skipping booking: {e}"),
            }
        }
        Ok(Self::with_records(rooms, bookings))
    }

    pub fn to_json_string(&self) -> Result<String, StoreError> {
        let mut fixture = Fixture::default();
        for entry in self.rooms.iter() {
            let room = entry.value();
            let fields = RoomFields {
                number: room.number.clone(),
                status: room.status,
            };
            fixture.rooms.insert(room.id.clone(), serde_json::to_value(fields)?);
        }
        for entry in self.bookings.iter() {
            let b = entry.value();
            let fields = BookingFields {
                room_number: b.room_number.clone(),
                check_in: b.check_in,
                check_out: b.check_out,
                booking_type: b.booking_type,
                status: b.status,
            };
            fixture.bookings.insert(b.id.clone(), serde_json::to_value(fields)?);
        }
        Ok(serde_json::to_string_pretty(&fixture)?)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

fn decode_room(id: &str, value: serde_json::Value) -> Result<Room, MalformedRecord> {
    let fields: RoomFields = serde_json::from_value(value).map_err(|e| MalformedRecord::Decode {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    let room = Room::new(id, fields.number, fields.status);
    room.validate()?;
    Ok(room)
}

/// Inverted windows are kept: the engine skips them itself.
fn decode_booking(id: &str, value: serde_json::Value) -> Result<Booking, MalformedRecord> {
    let fields: BookingFields = serde_json::from_value(value).map_err(|e| MalformedRecord::Decode {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    let booking = Booking::new(
        id,
        fields.room_number,
        fields.check_in,
        fields.check_out,
        fields.booking_type,
        fields.status,
    );
    match booking.validate() {
        Err(e @ (MalformedRecord::EmptyId | MalformedRecord::EmptyRoomNumber { .. })) => Err(e),
        _ => Ok(booking),
    }
}

#[async_trait]
impl RoomRepository for InMemoryStore {
    fn subscribe_rooms(&self) -> SnapshotReceiver<Room> {
        self.room_feed.subscribe()
    }

    async fn write_room_status(&self, room_id: &str, status: RoomStatus) -> Result<(), StoreError> {
        if self.failing.contains(room_id) {
            return Err(StoreError::Rejected(room_id.to_string()));
        }
        {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;
            room.status = status;
        }
        self.record_write(WriteRecord::Room {
            id: room_id.to_string(),
            status,
        });
        self.publish_rooms();
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    fn subscribe_bookings(&self) -> SnapshotReceiver<Booking> {
        self.booking_feed.subscribe()
    }

    async fn write_booking_status(&self, booking_id: &str, status: BookingStatus) -> Result<(), StoreError> {
        if self.failing.contains(booking_id) {
            return Err(StoreError::Rejected(booking_id.to_string()));
        }
        {
            let mut booking = self
                .bookings
                .get_mut(booking_id)
                .ok_or_else(|| StoreError::NotFound(booking_id.to_string()))?;
            booking.status = status;
        }
        self.record_write(WriteRecord::Booking {
            id: booking_id.to_string(),
            status,
        });
        self.publish_bookings();
        Ok(())
    }
}
