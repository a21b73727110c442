use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::engine::StoreError;
use crate::model::{Booking, BookingStatus, Room, RoomStatus};

/// Full collection as delivered by a repository. Replaced wholesale, never merged.
pub type Snapshot<T> = Arc<Vec<T>>;

/// Latest-value subscription. `None` until the first snapshot arrives.
/// Dropping the receiver unsubscribes.
pub type SnapshotReceiver<T> = watch::Receiver<Option<Snapshot<T>>>;

#[async_trait]
pub trait RoomRepository: Send + Sync {
    fn subscribe_rooms(&self) -> SnapshotReceiver<Room>;

    /// Patch only the `status` field of one room.
    async fn write_room_status(&self, room_id: &str, status: RoomStatus) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    fn subscribe_bookings(&self) -> SnapshotReceiver<Booking>;

    /// Patch only the `status` field of one booking.
    async fn write_booking_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<(), StoreError>;
}

/// Publisher side of a snapshot subscription. Late subscribers see the latest value.
pub struct SnapshotFeed<T> {
    tx: watch::Sender<Option<Snapshot<T>>>,
}

impl<T> Default for SnapshotFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotFeed<T> {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    /// Replace the current snapshot. Works with or without subscribers.
    pub fn publish(&self, records: Vec<T>) {
        self.tx.send_replace(Some(Arc::new(records)));
    }

    pub fn subscribe(&self) -> SnapshotReceiver<T> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Snapshot<T>> {
        self.tx.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed: SnapshotFeed<u32> = SnapshotFeed::new();
        let mut rx = feed.subscribe();
        assert!(rx.borrow().is_none());

        feed.publish(vec![1, 2, 3]);
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone().unwrap();
        assert_eq!(*snap, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_kept() {
        let feed: SnapshotFeed<u32> = SnapshotFeed::new();
        // No subscriber — should not panic and should not lose the value
        feed.publish(vec![7]);
        let rx = feed.subscribe();
        assert_eq!(rx.borrow().as_deref(), Some(&vec![7]));
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn only_latest_snapshot_is_observed() {
        let feed: SnapshotFeed<u32> = SnapshotFeed::new();
        let mut rx = feed.subscribe();
        feed.publish(vec![1]);
        feed.publish(vec![2]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some(&vec![2]));
        assert!(!rx.has_changed().unwrap());
    }
}
