//! Runs the reservation rules from `shared` against the store.

use chrono::{DateTime, Duration, Utc};
use shared::*;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::notifications::NotificationDispatcher;
use crate::store::{ApprovalOutcome, Store};

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSettings {
    /// Refuse proposals that overlap an approved reservation instead of
    /// leaving the contention to the approving admin.
    pub reject_conflicting_requests: bool,
    /// Preview used by the resource list.
    pub list_window: AvailabilityWindow,
    /// Full view used for a single resource.
    pub detail_window: AvailabilityWindow,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            reject_conflicting_requests: false,
            list_window: AvailabilityWindow {
                future_limit: Some(3),
                past_window: Duration::days(365),
            },
            detail_window: AvailabilityWindow {
                future_limit: None,
                past_window: Duration::days(365),
            },
        }
    }
}

#[derive(Clone)]
pub struct AdmissionEngine {
    store: Arc<dyn Store>,
    notifications: NotificationDispatcher,
    settings: BookingSettings,
}

impl AdmissionEngine {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationDispatcher, settings: BookingSettings) -> Self {
        Self {
            store,
            notifications,
            settings,
        }
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    /// Records a new pending request and tells the admins about it.
    ///
    /// Other pending requests for the same slot are allowed to exist; the
    /// overlap rule is only enforced when an admin approves.
    pub async fn propose(&self, proposal: Proposal) -> Result<ReservationView> {
        if proposal.reason.trim().is_empty() {
            return Err(Error::validation("reason", "reason is required"));
        }

        let resource = self
            .store
            .find_resource(proposal.resource_id)
            .await?
            .ok_or(Error::NotFound {
                entity: "Resource",
                id: proposal.resource_id,
            })?;
        let requester = self
            .store
            .find_user(proposal.requester_id)
            .await?
            .ok_or(Error::NotFound {
                entity: "User",
                id: proposal.requester_id,
            })?;

        if self.settings.reject_conflicting_requests {
            let existing = self
                .store
                .find_approved_overlap(proposal.resource_id, &proposal.range)
                .await?;
            if let Some(existing) = existing {
                warn!(
                    resource_id = %resource.id,
                    conflicting_id = %existing.id,
                    "Refusing request that overlaps an approved reservation"
                );
                return Err(conflict_with(&existing));
            }
        }

        let reservation = Reservation::from_proposal(proposal, Utc::now());
        self.store.insert_reservation(&reservation).await?;
        info!(
            reservation_id = %reservation.id,
            resource_id = %reservation.resource_id,
            "Reservation requested"
        );

        let view = ReservationView {
            reservation,
            requester: UserSummary {
                id: requester.id,
                name: requester.name,
                email: requester.email,
            },
            resource: ResourceSummary {
                id: resource.id,
                name: resource.name,
            },
        };
        self.notifications.dispatch(Notification::reservation_requested(&view));

        Ok(view)
    }

    /// Applies an admin's decision.
    ///
    /// Any current status may be re-decided. Approval succeeds only when no
    /// other approved reservation on the resource overlaps; on conflict the
    /// status is left as it was. Repeating the current status is a no-op.
    pub async fn decide(&self, id: Uuid, decision: Decision, actor: &Actor) -> Result<ReservationView> {
        if !actor.is_admin {
            return Err(Error::Forbidden("Only admins can decide reservations".to_string()));
        }

        let current = self.find_view(id).await?;
        if current.reservation.status == decision.status() {
            return Ok(current);
        }

        match decision {
            Decision::Approved => match self.store.approve_reservation(id).await? {
                ApprovalOutcome::Approved(_) => {}
                ApprovalOutcome::Conflict { conflicting } => {
                    warn!(
                        reservation_id = %id,
                        resource_id = %current.reservation.resource_id,
                        conflicting_id = %conflicting.id,
                        "Approval refused"
                    );
                    return Err(conflict_with(&conflicting));
                }
                ApprovalOutcome::NotFound => return Err(not_found(id)),
            },
            Decision::Rejected => {
                self.store
                    .set_reservation_status(id, ReservationStatus::Rejected)
                    .await?
                    .ok_or_else(|| not_found(id))?;
            }
        }

        let view = self.find_view(id).await?;
        info!(
            reservation_id = %id,
            resource_id = %view.reservation.resource_id,
            status = %view.reservation.status,
            "Reservation decided"
        );
        self.notifications.dispatch(Notification::reservation_decided(&view));

        Ok(view)
    }

    /// Admins delete anything; requesters only their own pending requests.
    pub async fn cancel(&self, id: Uuid, actor: &Actor) -> Result<()> {
        let reservation = self.store.find_reservation(id).await?.ok_or_else(|| not_found(id))?;
        check_cancellation(&reservation, actor)?;

        if !self.store.delete_reservation(id).await? {
            return Err(not_found(id));
        }
        info!(
            reservation_id = %id,
            resource_id = %reservation.resource_id,
            by_admin = actor.is_admin,
            "Reservation cancelled"
        );
        Ok(())
    }

    pub async fn availability_of(
        &self,
        resource_id: Uuid,
        as_of: DateTime<Utc>,
        window: &AvailabilityWindow,
    ) -> Result<Availability> {
        let views = self
            .store
            .approved_ending_after(resource_id, window.earliest_end(as_of))
            .await?;
        Ok(Availability::partition(views, as_of, window))
    }

    async fn find_view(&self, id: Uuid) -> Result<ReservationView> {
        self.store.find_reservation_view(id).await?.ok_or_else(|| not_found(id))
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound {
        entity: "Reservation",
        id,
    }
}

fn conflict_with(existing: &Reservation) -> Error {
    Error::Conflict {
        message: format!(
            "Time slot conflicts with approved reservation {} ({} to {})",
            existing.id,
            existing.start_time.to_rfc3339(),
            existing.end_time.to_rfc3339()
        ),
        conflicting_id: Some(existing.id),
    }
}
