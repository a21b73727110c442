use crate::model::*;

use super::status::compute_room_status;
use super::{Engine, EngineError, StatusDecision};

impl Engine {
    /// Room counts by stored status.
    pub async fn status_summary(&self) -> Result<StatusSummary, EngineError> {
        let view = self.snapshot().await?;
        Ok(StatusSummary::from_rooms(view.rooms.iter()))
    }

    /// Confirmed bookings checking in within the lookahead window, earliest first.
    pub async fn upcoming_check_ins(&self, now: Ms) -> Result<Vec<Booking>, EngineError> {
        let lookahead = self.config.reserved_lookahead_ms;
        self.upcoming(|b| b.check_in > now && b.check_in <= now + lookahead, |b| b.check_in)
            .await
    }

    /// Confirmed bookings checking out within the lookahead window, earliest first.
    pub async fn upcoming_check_outs(&self, now: Ms) -> Result<Vec<Booking>, EngineError> {
        let lookahead = self.config.reserved_lookahead_ms;
        self.upcoming(|b| b.check_out > now && b.check_out <= now + lookahead, |b| b.check_out)
            .await
    }

    async fn upcoming(
        &self,
        within: impl Fn(&Booking) -> bool,
        key: impl Fn(&Booking) -> Ms,
    ) -> Result<Vec<Booking>, EngineError> {
        let view = self.snapshot().await?;
        let mut hits: Vec<Booking> = view
            .bookings
            .iter()
            .filter(|b| b.is_confirmed() && b.is_well_formed() && within(*b))
            .cloned()
            .collect();
        hits.sort_by_key(|b| key(b));
        Ok(hits)
    }

    /// Every room with the decision a reconcile pass would make at `now`. Writes nothing.
    pub async fn computed_statuses(&self, now: Ms) -> Result<Vec<(Room, StatusDecision)>, EngineError> {
        let view = self.snapshot().await?;
        let lookahead = self.config.reserved_lookahead_ms;
        Ok(view
            .rooms
            .iter()
            .filter(|r| r.validate().is_ok())
            .map(|room| {
                let decision = compute_room_status(room, view.bookings.iter(), now, lookahead);
                (room.clone(), decision)
            })
            .collect())
    }
}
