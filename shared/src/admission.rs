//! Rules deciding which reservations may hold a resource.
//!
//! The invariant: for any resource, approved reservations never overlap
//! under the half-open rule. Pending requests may overlap freely; contention
//! is resolved when an admin approves one of them.

use crate::reservation::{Reservation, ReservationStatus, TimeRange, UnknownVariant};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Who is acting on a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Actor {
    pub fn can_view(&self, reservation: &Reservation) -> bool {
        self.is_admin || reservation.user_id == self.user_id
    }
}

/// An admin's verdict on a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> ReservationStatus {
        match self {
            Decision::Approved => ReservationStatus::Approved,
            Decision::Rejected => ReservationStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(UnknownVariant {
                kind: "decision",
                value: other.to_string(),
            }),
        }
    }
}

/// First approved reservation that would collide with `candidate` on the same
/// resource. `candidate` itself is skipped by id.
pub fn find_conflict<'a, I>(candidate: &Reservation, others: I) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    find_conflict_in_range(candidate.resource_id, &candidate.range(), Some(candidate.id), others)
}

/// Same as [`find_conflict`] for a range that has no reservation yet.
pub fn find_conflict_in_range<'a, I>(
    resource_id: Uuid,
    range: &TimeRange,
    exclude: Option<Uuid>,
    others: I,
) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    others.into_iter().find(|other| {
        Some(other.id) != exclude
            && other.resource_id == resource_id
            && other.is_approved()
            && other.range().overlaps(range)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelDenied {
    #[error("only the requester or an admin can cancel this reservation")]
    NotOwner,
    #[error("only pending reservations can be cancelled, this one is {0}")]
    NotPending(ReservationStatus),
}

/// Admins may delete any reservation. Everyone else may only withdraw their
/// own request while it is still pending.
pub fn check_cancellation(reservation: &Reservation, actor: &Actor) -> Result<(), CancelDenied> {
    if actor.is_admin {
        return Ok(());
    }
    if reservation.user_id != actor.user_id {
        return Err(CancelDenied::NotOwner);
    }
    if reservation.status != ReservationStatus::Pending {
        return Err(CancelDenied::NotPending(reservation.status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::Priority;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    fn reservation(resource_id: Uuid, start: u32, end: u32, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            resource_id,
            user_id: Uuid::new_v4(),
            start_time: at(start),
            end_time: at(end),
            status,
            priority: Priority::Normal,
            reason: "experiment".to_string(),
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[test]
    fn touching_approved_reservation_is_not_a_conflict() {
        let resource = Uuid::new_v4();
        let existing = reservation(resource, 10, 11, ReservationStatus::Approved);
        let candidate = reservation(resource, 11, 12, ReservationStatus::Pending);

        assert!(find_conflict(&candidate, [&existing]).is_none());
    }

    #[test]
    fn overlapping_approved_reservation_conflicts() {
        let resource = Uuid::new_v4();
        let existing = reservation(resource, 10, 12, ReservationStatus::Approved);
        let candidate = reservation(resource, 11, 13, ReservationStatus::Pending);

        let conflict = find_conflict(&candidate, [&existing]).unwrap();
        assert_eq!(conflict.id, existing.id);
    }

    #[test]
    fn pending_and_rejected_neighbours_are_ignored() {
        let resource = Uuid::new_v4();
        let pending = reservation(resource, 10, 12, ReservationStatus::Pending);
        let rejected = reservation(resource, 10, 12, ReservationStatus::Rejected);
        let candidate = reservation(resource, 11, 13, ReservationStatus::Pending);

        assert!(find_conflict(&candidate, [&pending, &rejected]).is_none());
    }

    #[test]
    fn other_resources_and_self_are_ignored() {
        let resource = Uuid::new_v4();
        let elsewhere = reservation(Uuid::new_v4(), 10, 12, ReservationStatus::Approved);
        let candidate = reservation(resource, 10, 12, ReservationStatus::Approved);

        assert!(find_conflict(&candidate, [&elsewhere, &candidate]).is_none());
    }

    #[test]
    fn owner_can_only_cancel_while_pending() {
        let resource = Uuid::new_v4();
        let mut mine = reservation(resource, 10, 11, ReservationStatus::Pending);
        let owner = Actor {
            user_id: mine.user_id,
            is_admin: false,
        };
        assert_eq!(check_cancellation(&mine, &owner), Ok(()));

        mine.status = ReservationStatus::Approved;
        assert_eq!(
            check_cancellation(&mine, &owner),
            Err(CancelDenied::NotPending(ReservationStatus::Approved))
        );
    }

    #[test]
    fn strangers_cannot_cancel_but_admins_always_can() {
        let mut theirs = reservation(Uuid::new_v4(), 10, 11, ReservationStatus::Pending);
        let stranger = Actor {
            user_id: Uuid::new_v4(),
            is_admin: false,
        };
        let admin = Actor {
            user_id: Uuid::new_v4(),
            is_admin: true,
        };

        assert_eq!(check_cancellation(&theirs, &stranger), Err(CancelDenied::NotOwner));
        for status in [ReservationStatus::Approved, ReservationStatus::Rejected] {
            theirs.status = status;
            assert_eq!(check_cancellation(&theirs, &admin), Ok(()));
        }
    }

    #[test]
    fn decision_only_accepts_terminal_statuses() {
        assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approved);
        assert_eq!("rejected".parse::<Decision>().unwrap(), Decision::Rejected);
        assert!("pending".parse::<Decision>().is_err());
    }
}
