use crate::reservation::ReservationView;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How much of a resource's schedule an availability view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWindow {
    /// Maximum number of upcoming reservations, `None` for all of them.
    pub future_limit: Option<usize>,
    /// How far back finished reservations are reported.
    pub past_window: Duration,
}

impl AvailabilityWindow {
    /// Earliest end time a reservation may have and still be reported.
    pub fn earliest_end(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        as_of - self.past_window
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_available: bool,
    pub current_reservation: Option<ReservationView>,
    pub future_reservations: Vec<ReservationView>,
    pub past_reservations: Vec<ReservationView>,
}

impl Availability {
    /// Splits a resource's reservations around `as_of`.
    ///
    /// Only approved reservations count. A reservation occupies the resource
    /// when `start <= as_of < end`; upcoming ones are sorted by start time,
    /// finished ones (within the window) by end time, most recent first.
    pub fn partition(reservations: Vec<ReservationView>, as_of: DateTime<Utc>, window: &AvailabilityWindow) -> Self {
        let earliest_end = window.earliest_end(as_of);
        let mut current: Option<ReservationView> = None;
        let mut future = Vec::new();
        let mut past = Vec::new();

        for view in reservations.into_iter().filter(|v| v.reservation.is_approved()) {
            let range = view.reservation.range();
            if range.contains(as_of) {
                let replace = current
                    .as_ref()
                    .map_or(true, |c| view.reservation.start_time < c.reservation.start_time);
                if replace {
                    current = Some(view);
                }
            } else if range.start() > as_of {
                future.push(view);
            } else if range.end() >= earliest_end {
                past.push(view);
            }
        }

        future.sort_by_key(|v| v.reservation.start_time);
        if let Some(limit) = window.future_limit {
            future.truncate(limit);
        }
        past.sort_by(|a, b| b.reservation.end_time.cmp(&a.reservation.end_time));

        Self {
            is_available: current.is_none(),
            current_reservation: current,
            future_reservations: future,
            past_reservations: past,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{Priority, Reservation, ReservationStatus, ResourceSummary, UserSummary};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn view(start: DateTime<Utc>, end: DateTime<Utc>, status: ReservationStatus) -> ReservationView {
        let reservation = Reservation {
            id: Uuid::new_v4(),
            resource_id: Uuid::nil(),
            user_id: Uuid::nil(),
            start_time: start,
            end_time: end,
            status,
            priority: Priority::Normal,
            reason: "run".to_string(),
            created_at: start,
            updated_at: start,
        };
        ReservationView {
            requester: UserSummary {
                id: Uuid::nil(),
                name: "tester".to_string(),
                email: "tester@lab.test".to_string(),
            },
            resource: ResourceSummary {
                id: Uuid::nil(),
                name: "microscope".to_string(),
            },
            reservation,
        }
    }

    fn window(future_limit: Option<usize>) -> AvailabilityWindow {
        AvailabilityWindow {
            future_limit,
            past_window: Duration::days(365),
        }
    }

    #[test]
    fn occupied_only_inside_half_open_range() {
        let booking = view(at(10, 10), at(10, 11), ReservationStatus::Approved);

        let during = Availability::partition(vec![booking.clone()], at(10, 10), &window(None));
        assert!(!during.is_available);
        assert_eq!(during.current_reservation.as_ref().unwrap().reservation.id, booking.reservation.id);

        let at_end = Availability::partition(vec![booking.clone()], at(10, 11), &window(None));
        assert!(at_end.is_available);
        assert_eq!(at_end.past_reservations.len(), 1);

        let before = Availability::partition(vec![booking], at(10, 9), &window(None));
        assert!(before.is_available);
        assert_eq!(before.future_reservations.len(), 1);
    }

    #[test]
    fn pending_reservations_never_occupy() {
        let pending = view(at(10, 10), at(10, 11), ReservationStatus::Pending);
        let result = Availability::partition(vec![pending], at(10, 10), &window(None));
        assert!(result.is_available);
        assert!(result.future_reservations.is_empty());
        assert!(result.past_reservations.is_empty());
    }

    #[test]
    fn future_sorted_ascending_and_limited() {
        let late = view(at(12, 10), at(12, 11), ReservationStatus::Approved);
        let early = view(at(11, 10), at(11, 11), ReservationStatus::Approved);
        let latest = view(at(13, 10), at(13, 11), ReservationStatus::Approved);

        let result = Availability::partition(vec![late.clone(), latest, early.clone()], at(10, 0), &window(Some(2)));
        let ids: Vec<Uuid> = result.future_reservations.iter().map(|v| v.reservation.id).collect();
        assert_eq!(ids, vec![early.reservation.id, late.reservation.id]);
    }

    #[test]
    fn past_sorted_descending_within_window() {
        let recent = view(at(9, 10), at(9, 11), ReservationStatus::Approved);
        let older = view(at(5, 10), at(5, 11), ReservationStatus::Approved);
        let ancient = view(
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap(),
            ReservationStatus::Approved,
        );

        let result = Availability::partition(vec![older.clone(), ancient, recent.clone()], at(10, 0), &window(None));
        let ids: Vec<Uuid> = result.past_reservations.iter().map(|v| v.reservation.id).collect();
        assert_eq!(ids, vec![recent.reservation.id, older.reservation.id]);
    }
}
