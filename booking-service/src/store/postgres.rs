use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::debug;
use uuid::Uuid;

use super::{ApprovalOutcome, ReservationFilter, Store, StoreError, StoreResult};
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

const APPROVED: &str = "approved";
const PENDING: &str = "pending";

/// Reservations joined with the display columns a [`ReservationView`] needs.
macro_rules! reservation_views {
    () => {
        reservations::table
            .inner_join(users::table)
            .inner_join(resources::table)
            .select((reservations::all_columns, users::name, users::email, resources::name))
    };
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder().build(config).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let row = DbReservation::from(reservation);

        diesel::insert_into(reservations::table)
            .values(&row)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn find_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let mut conn = self.pool.get().await?;

        let row = reservations::table
            .find(id)
            .first::<DbReservation>(&mut conn)
            .await
            .optional()?;

        row.map(Reservation::try_from).transpose()
    }

    async fn find_reservation_view(&self, id: Uuid) -> StoreResult<Option<ReservationView>> {
        let mut conn = self.pool.get().await?;

        let row = reservation_views!()
            .filter(reservations::id.eq(id))
            .first::<DbReservationRow>(&mut conn)
            .await
            .optional()?;

        row.map(reservation_view).transpose()
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<ReservationView>> {
        let mut conn = self.pool.get().await?;

        let mut query = reservation_views!().into_boxed();
        if let Some(user_id) = filter.user_id {
            query = query.filter(reservations::user_id.eq(user_id));
        }
        if let Some(resource_id) = filter.resource_id {
            query = query.filter(reservations::resource_id.eq(resource_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(reservations::status.eq(status.as_str()));
        }

        let rows = query
            .order(reservations::created_at.desc())
            .load::<DbReservationRow>(&mut conn)
            .await?;

        rows.into_iter().map(reservation_view).collect()
    }

    async fn find_approved_overlap(&self, resource_id: Uuid, range: &TimeRange) -> StoreResult<Option<Reservation>> {
        let mut conn = self.pool.get().await?;

        let row = reservations::table
            .filter(reservations::resource_id.eq(resource_id))
            .filter(reservations::status.eq(APPROVED))
            .filter(reservations::start_time.lt(range.end()))
            .filter(reservations::end_time.gt(range.start()))
            .first::<DbReservation>(&mut conn)
            .await
            .optional()?;

        row.map(Reservation::try_from).transpose()
    }

    async fn approve_reservation(&self, id: Uuid) -> StoreResult<ApprovalOutcome> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let resource_id = reservations::table
                    .find(id)
                    .select(reservations::resource_id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                let Some(resource_id) = resource_id else {
                    return Ok(ApprovalOutcome::NotFound);
                };

                // Row lock on the parent resource serialises approvals for it.
                // Lock order is resource, then reservation, as in cascade deletes.
                let locked = resources::table
                    .find(resource_id)
                    .select(resources::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                if locked.is_none() {
                    return Ok(ApprovalOutcome::NotFound);
                }

                let target = reservations::table
                    .find(id)
                    .for_update()
                    .first::<DbReservation>(conn)
                    .await
                    .optional()?;
                let Some(target) = target else {
                    return Ok(ApprovalOutcome::NotFound);
                };

                let conflicting = reservations::table
                    .filter(reservations::resource_id.eq(target.resource_id))
                    .filter(reservations::id.ne(target.id))
                    .filter(reservations::status.eq(APPROVED))
                    .filter(reservations::start_time.lt(target.end_time))
                    .filter(reservations::end_time.gt(target.start_time))
                    .first::<DbReservation>(conn)
                    .await
                    .optional()?;
                if let Some(conflicting) = conflicting {
                    debug!("Reservation {} overlaps approved reservation {}", id, conflicting.id);
                    return Ok(ApprovalOutcome::Conflict {
                        conflicting: conflicting.try_into()?,
                    });
                }

                let updated = diesel::update(reservations::table.find(id))
                    .set((
                        reservations::status.eq(APPROVED),
                        reservations::updated_at.eq(Utc::now()),
                    ))
                    .get_result::<DbReservation>(conn)
                    .await?;

                Ok(ApprovalOutcome::Approved(updated.try_into()?))
            }
            .scope_boxed()
        })
        .await
    }

    async fn set_reservation_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>> {
        let mut conn = self.pool.get().await?;

        let row = diesel::update(reservations::table.find(id))
            .set((
                reservations::status.eq(status.as_str()),
                reservations::updated_at.eq(Utc::now()),
            ))
            .get_result::<DbReservation>(&mut conn)
            .await
            .optional()?;

        row.map(Reservation::try_from).transpose()
    }

    async fn delete_reservation(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(reservations::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        let mut conn = self.pool.get().await?;

        let count = reservations::table
            .filter(reservations::status.eq(PENDING))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn approved_ending_after(
        &self,
        resource_id: Uuid,
        earliest_end: DateTime<Utc>,
    ) -> StoreResult<Vec<ReservationView>> {
        let mut conn = self.pool.get().await?;

        let rows = reservation_views!()
            .filter(reservations::resource_id.eq(resource_id))
            .filter(reservations::status.eq(APPROVED))
            .filter(reservations::end_time.ge(earliest_end))
            .order(reservations::start_time.asc())
            .load::<DbReservationRow>(&mut conn)
            .await?;

        rows.into_iter().map(reservation_view).collect()
    }

    async fn usage_spans(&self) -> StoreResult<Vec<UsageSpan>> {
        let mut conn = self.pool.get().await?;

        let rows = reservations::table
            .inner_join(users::table)
            .inner_join(resources::table)
            .filter(reservations::status.eq(APPROVED))
            .select((
                reservations::user_id,
                users::name,
                users::email,
                reservations::resource_id,
                resources::name,
                reservations::start_time,
                reservations::end_time,
            ))
            .load::<(Uuid, String, String, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(user_id, user_name, user_email, resource_id, resource_name, start_time, end_time)| UsageSpan {
                    user_id,
                    user_name,
                    user_email,
                    resource_id,
                    resource_name,
                    start_time,
                    end_time,
                },
            )
            .collect())
    }

    async fn insert_resource(&self, resource: NewResource) -> StoreResult<Resource> {
        let mut conn = self.pool.get().await?;
        let row = DbResource::from(resource.into_resource(Utc::now()));

        let inserted = diesel::insert_into(resources::table)
            .values(&row)
            .get_result::<DbResource>(&mut conn)
            .await?;

        Ok(inserted.into())
    }

    async fn find_resource(&self, id: Uuid) -> StoreResult<Option<Resource>> {
        let mut conn = self.pool.get().await?;

        let row = resources::table
            .find(id)
            .first::<DbResource>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(Resource::from))
    }

    async fn list_resources(&self) -> StoreResult<Vec<Resource>> {
        let mut conn = self.pool.get().await?;

        let rows = resources::table
            .order(resources::created_at.desc())
            .load::<DbResource>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn update_resource(&self, id: Uuid, changes: ResourceChanges) -> StoreResult<Option<Resource>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let current = resources::table
                    .find(id)
                    .for_update()
                    .first::<DbResource>(conn)
                    .await
                    .optional()?;
                let Some(current) = current else {
                    return Ok(None);
                };

                let mut resource = Resource::from(current);
                changes.apply(&mut resource);
                resource.updated_at = Utc::now();
                let row = DbResource::from(resource);

                let updated = diesel::update(resources::table.find(id))
                    .set(&row)
                    .get_result::<DbResource>(conn)
                    .await?;

                Ok(Some(updated.into()))
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_resource(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        // Reservations go with it through ON DELETE CASCADE, in the same statement.
        let deleted = diesel::delete(resources::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut conn = self.pool.get().await?;
        let row = DbUser::from(user.into_user(Utc::now()));

        let inserted = diesel::insert_into(users::table)
            .values(&row)
            .get_result::<DbUser>(&mut conn)
            .await?;

        Ok(inserted.into())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;

        let row = users::table
            .find(id)
            .first::<DbUser>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;

        let row = users::table
            .filter(users::email.eq(email))
            .first::<DbUser>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut conn = self.pool.get().await?;

        let rows = users::table
            .order(users::created_at.desc())
            .load::<DbUser>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let current = users::table
                    .find(id)
                    .for_update()
                    .first::<DbUser>(conn)
                    .await
                    .optional()?;
                let Some(current) = current else {
                    return Ok(None);
                };

                let mut user = User::from(current);
                changes.apply(&mut user);
                user.updated_at = Utc::now();
                let row = DbUser::from(user);

                let updated = diesel::update(users::table.find(id))
                    .set(&row)
                    .get_result::<DbUser>(conn)
                    .await?;

                Ok(Some(updated.into()))
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(users::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn set_push_enabled(&self, user_id: Uuid, enabled: bool) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(users::table.find(user_id))
            .set((users::push_enabled.eq(enabled), users::updated_at.eq(Utc::now())))
            .execute(&mut conn)
            .await?;

        Ok(updated > 0)
    }

    async fn add_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(push_tokens::table)
            .values(&NewPushToken { user_id, token })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        diesel::delete(
            push_tokens::table
                .filter(push_tokens::user_id.eq(user_id))
                .filter(push_tokens::token.eq(token)),
        )
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    async fn push_tokens_for(&self, target: &NotificationTarget) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;

        let mut query = push_tokens::table
            .inner_join(users::table)
            .filter(users::push_enabled.eq(true))
            .select(push_tokens::token)
            .into_boxed();
        query = match target {
            NotificationTarget::AllAdmins => query.filter(users::is_admin.eq(true)),
            NotificationTarget::Users(ids) => query.filter(users::id.eq_any(ids.clone())),
        };

        let tokens = query
            .order(push_tokens::created_at.asc())
            .load::<String>(&mut conn)
            .await?;

        Ok(tokens)
    }
}
