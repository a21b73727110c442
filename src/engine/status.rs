use std::collections::HashMap;

use crate::model::*;

// ── Status Algorithm ──────────────────────────────────────────────

/// Outcome of evaluating one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    /// The room should carry this status (it may already).
    Set(RoomStatus),
    /// Operator-controlled room; the engine must not touch it.
    NoChange,
}

impl StatusDecision {
    /// The status to write, if it differs from `stored`.
    pub fn write_needed(&self, stored: RoomStatus) -> Option<RoomStatus> {
        match *self {
            StatusDecision::Set(status) if status != stored => Some(status),
            _ => None,
        }
    }
}

/// Precedence rank. Higher wins: maintenance > occupied > reserved > available.
pub fn precedence(status: RoomStatus) -> u8 {
    match status {
        RoomStatus::Available => 0,
        RoomStatus::Reserved => 1,
        RoomStatus::Occupied => 2,
        RoomStatus::Maintenance => 3,
    }
}

pub fn strongest(a: RoomStatus, b: RoomStatus) -> RoomStatus {
    if precedence(b) > precedence(a) { b } else { a }
}

/// Status a single booking imposes on its room at `now`, if any.
/// Only confirmed, well-formed bookings count.
pub fn booking_pressure(booking: &Booking, now: Ms, lookahead: Ms) -> Option<RoomStatus> {
    if !booking.is_confirmed() || !booking.is_well_formed() {
        return None;
    }
    let span = booking.span();
    if span.contains_instant(now) {
        Some(RoomStatus::Occupied)
    } else if span.starts_within(now, lookahead) {
        Some(RoomStatus::Reserved)
    } else {
        None
    }
}

/// Compute the status `room` should have from the bookings referencing it.
///
/// Bookings for other rooms are ignored, so callers may pass the full list or a
/// pre-grouped slice. An occupied determination is final for the pass.
pub fn compute_room_status<'a>(
    room: &Room,
    bookings: impl IntoIterator<Item = &'a Booking>,
    now: Ms,
    lookahead: Ms,
) -> StatusDecision {
    if room.status == RoomStatus::Maintenance {
        return StatusDecision::NoChange;
    }

    let mut result = RoomStatus::Available;
    for booking in bookings {
        if booking.room_number != room.number {
            continue;
        }
        if let Some(pressure) = booking_pressure(booking, now, lookahead) {
            result = strongest(result, pressure);
            if result == RoomStatus::Occupied {
                break;
            }
        }
    }
    StatusDecision::Set(result)
}

/// Confirmed bookings grouped by room number, plus the count of malformed
/// confirmed bookings that were left out.
pub fn confirmed_by_room(bookings: &[Booking]) -> (HashMap<&str, Vec<&Booking>>, usize) {
    let mut grouped: HashMap<&str, Vec<&Booking>> = HashMap::new();
    let mut malformed = 0;
    for booking in bookings.iter().filter(|b| b.is_confirmed()) {
        if booking.is_well_formed() {
            grouped.entry(booking.room_number.as_str()).or_default().push(booking);
        } else {
            malformed += 1;
        }
    }
    (grouped, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = HOUR_MS;
    const M: Ms = MINUTE_MS;
    const NOW: Ms = 1_000 * H;
    const LOOKAHEAD: Ms = 2 * H;

    fn room(status: RoomStatus) -> Room {
        Room::new("r101", "101", status)
    }

    fn confirmed(id: &str, number: &str, check_in: Ms, check_out: Ms) -> Booking {
        Booking::new(id, number, check_in, check_out, BookingType::Hourly, BookingStatus::Confirmed)
    }

    fn decide(room: &Room, bookings: &[Booking]) -> StatusDecision {
        compute_room_status(room, bookings, NOW, LOOKAHEAD)
    }

    // ── precedence ───────────────────────────────────────

    #[test]
    fn precedence_orders_statuses() {
        use RoomStatus::*;
        assert!(precedence(Maintenance) > precedence(Occupied));
        assert!(precedence(Occupied) > precedence(Reserved));
        assert!(precedence(Reserved) > precedence(Available));
    }

    #[test]
    fn strongest_is_symmetric() {
        use RoomStatus::*;
        for a in RoomStatus::ALL {
            for b in RoomStatus::ALL {
                assert_eq!(strongest(a, b), strongest(b, a));
            }
        }
        assert_eq!(strongest(Reserved, Occupied), Occupied);
        assert_eq!(strongest(Available, Reserved), Reserved);
    }

    // ── compute_room_status ──────────────────────────────

    #[test]
    fn no_bookings_is_available() {
        assert_eq!(decide(&room(RoomStatus::Occupied), &[]), StatusDecision::Set(RoomStatus::Available));
    }

    #[test]
    fn active_booking_is_occupied() {
        let b = confirmed("a", "101", NOW - H, NOW + 2 * H);
        assert_eq!(decide(&room(RoomStatus::Available), &[b]), StatusDecision::Set(RoomStatus::Occupied));
    }

    #[test]
    fn imminent_booking_is_reserved() {
        let b = confirmed("b", "101", NOW + 30 * M, NOW + 3 * H + 30 * M);
        assert_eq!(decide(&room(RoomStatus::Available), &[b]), StatusDecision::Set(RoomStatus::Reserved));
    }

    #[test]
    fn lookahead_edge_is_inclusive() {
        let at_edge = confirmed("b", "101", NOW + LOOKAHEAD, NOW + LOOKAHEAD + H);
        assert_eq!(decide(&room(RoomStatus::Available), &[at_edge]), StatusDecision::Set(RoomStatus::Reserved));
        let past_edge = confirmed("c", "101", NOW + LOOKAHEAD + 1, NOW + LOOKAHEAD + H);
        assert_eq!(decide(&room(RoomStatus::Available), &[past_edge]), StatusDecision::Set(RoomStatus::Available));
    }

    #[test]
    fn checkout_instant_is_not_occupied() {
        let b = confirmed("a", "101", NOW - H, NOW);
        assert_eq!(decide(&room(RoomStatus::Occupied), &[b]), StatusDecision::Set(RoomStatus::Available));
    }

    #[test]
    fn occupied_beats_reserved_in_any_order() {
        let active = confirmed("a", "101", NOW - H, NOW + H);
        let soon = confirmed("b", "101", NOW + 30 * M, NOW + 2 * H);
        let r = room(RoomStatus::Available);
        assert_eq!(decide(&r, &[soon.clone(), active.clone()]), StatusDecision::Set(RoomStatus::Occupied));
        assert_eq!(decide(&r, &[active, soon]), StatusDecision::Set(RoomStatus::Occupied));
    }

    #[test]
    fn maintenance_is_never_changed() {
        let active = confirmed("a", "101", NOW - H, NOW + H);
        assert_eq!(decide(&room(RoomStatus::Maintenance), &[active]), StatusDecision::NoChange);
        assert_eq!(decide(&room(RoomStatus::Maintenance), &[]), StatusDecision::NoChange);
    }

    #[test]
    fn unconfirmed_bookings_are_ignored() {
        let r = room(RoomStatus::Available);
        for status in [BookingStatus::Pending, BookingStatus::Cancelled, BookingStatus::Completed] {
            let mut b = confirmed("a", "101", NOW - H, NOW + H);
            b.status = status;
            assert_eq!(decide(&r, &[b]), StatusDecision::Set(RoomStatus::Available));
        }
    }

    #[test]
    fn other_rooms_bookings_are_ignored() {
        let b = confirmed("a", "102", NOW - H, NOW + H);
        assert_eq!(decide(&room(RoomStatus::Available), &[b]), StatusDecision::Set(RoomStatus::Available));
    }

    #[test]
    fn malformed_booking_is_skipped() {
        let inverted = confirmed("bad", "101", NOW + H, NOW - H);
        let soon = confirmed("b", "101", NOW + 30 * M, NOW + 2 * H);
        assert_eq!(decide(&room(RoomStatus::Available), &[inverted, soon]), StatusDecision::Set(RoomStatus::Reserved));
    }

    #[test]
    fn write_needed_only_on_difference() {
        let d = StatusDecision::Set(RoomStatus::Occupied);
        assert_eq!(d.write_needed(RoomStatus::Available), Some(RoomStatus::Occupied));
        assert_eq!(d.write_needed(RoomStatus::Occupied), None);
        assert_eq!(StatusDecision::NoChange.write_needed(RoomStatus::Maintenance), None);
    }

    // ── confirmed_by_room ────────────────────────────────

    #[test]
    fn grouping_filters_and_counts_malformed() {
        let mut cancelled = confirmed("c", "101", 0, 10);
        cancelled.status = BookingStatus::Cancelled;
        let bookings = vec![
            confirmed("a", "101", 0, 10),
            confirmed("b", "102", 0, 10),
            confirmed("bad", "102", 10, 0),
            cancelled,
        ];
        let (grouped, malformed) = confirmed_by_room(&bookings);
        assert_eq!(malformed, 1);
        assert_eq!(grouped["101"].len(), 1);
        assert_eq!(grouped["102"].len(), 1);
        assert_eq!(grouped["102"][0].id, "b");
    }
}
