use async_trait::async_trait;
use chrono::Utc;
use common::{GenreId, Money, ReservationId, StallId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Genre, GenreStore, NewReservation, Reservation, ReservationQuery, ReservationStatistics, ReservationStatus,
    ReservationStore, Result, Stall, StallFilter, StallStatistics, StallStatus, StallStore,
    StoreError,
    store::{BookingStore, UnitOfWork},
};

const STALL_COLUMNS: &str =
    "id, code, size, price, location, dimensions, status, created_at, updated_at";
const RESERVATION_COLUMNS: &str =
    "id, user_id, stall_id, total_amount, status, created_at, updated_at";
const GENRE_COLUMNS: &str = "id, name, description, created_at, updated_at";

/// PostgreSQL-backed booking store.
///
/// Each unit of work is one database transaction. Stall locks are row
/// locks (`SELECT ... FOR UPDATE`), user locks are transaction-scoped
/// advisory locks keyed by the user ID.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("booking store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    type Unit = PostgresUnit;

    async fn begin(&self) -> Result<PostgresUnit> {
        Ok(PostgresUnit {
            tx: self.pool.begin().await?,
        })
    }
}

/// Unit of work backed by a PostgreSQL transaction.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

fn row_to_stall(row: PgRow) -> Result<Stall> {
    Ok(Stall {
        id: StallId::from_uuid(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        size: row.try_get::<String, _>("size")?.parse()?,
        price: Money::from_minor(row.try_get("price")?),
        location: row.try_get("location")?,
        dimensions: row.try_get("dimensions")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_reservation(row: PgRow) -> Result<Reservation> {
    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        stall_id: StallId::from_uuid(row.try_get::<Uuid, _>("stall_id")?),
        total_amount: Money::from_minor(row.try_get("total_amount")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_genre(row: PgRow) -> Result<Genre> {
    Ok(Genre {
        id: GenreId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_genre_write_error(e: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("unique_genre_name")
    {
        return StoreError::DuplicateGenreName(name.to_string());
    }
    StoreError::Database(e)
}

/// Maps a unique-code violation to `DuplicateStallCode`.
fn map_stall_write_error(e: sqlx::Error, code: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("unique_stall_code")
    {
        return StoreError::DuplicateStallCode(code.to_string());
    }
    StoreError::Database(e)
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl StallStore for PostgresUnit {
    async fn get_stall(&mut self, id: StallId) -> Result<Option<Stall>> {
        let row = sqlx::query(&format!("SELECT {STALL_COLUMNS} FROM stalls WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_stall).transpose()
    }

    async fn find_stall_by_code(&mut self, code: &str) -> Result<Option<Stall>> {
        let row = sqlx::query(&format!(
            "SELECT {STALL_COLUMNS} FROM stalls WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_stall).transpose()
    }

    async fn list_stalls(&mut self, filter: &StallFilter) -> Result<Vec<Stall>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {STALL_COLUMNS}
            FROM stalls
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR size = $2)
            ORDER BY code ASC
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.size.map(|s| s.as_str()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_stall).collect()
    }

    async fn insert_stall(&mut self, stall: Stall) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stalls (id, code, size, price, location, dimensions, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stall.id.as_uuid())
        .bind(&stall.code)
        .bind(stall.size.as_str())
        .bind(stall.price.minor())
        .bind(&stall.location)
        .bind(&stall.dimensions)
        .bind(stall.status.as_str())
        .bind(stall.created_at)
        .bind(stall.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_stall_write_error(e, &stall.code))?;
        Ok(())
    }

    async fn update_stall(&mut self, stall: &Stall) -> Result<Stall> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stalls
            SET code = $2, size = $3, price = $4, location = $5, dimensions = $6, updated_at = $7
            WHERE id = $1
            RETURNING {STALL_COLUMNS}
            "#
        ))
        .bind(stall.id.as_uuid())
        .bind(&stall.code)
        .bind(stall.size.as_str())
        .bind(stall.price.minor())
        .bind(&stall.location)
        .bind(&stall.dimensions)
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_stall_write_error(e, &stall.code))?;

        match row {
            Some(row) => row_to_stall(row),
            None => Err(StoreError::StallNotFound(stall.id)),
        }
    }

    async fn try_transition(
        &mut self,
        id: StallId,
        from: StallStatus,
        to: StallStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE stalls SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_maintenance(&mut self, id: StallId, on: bool) -> Result<Stall> {
        let status = if on {
            StallStatus::Maintenance
        } else {
            StallStatus::Available
        };
        let row = sqlx::query(&format!(
            "UPDATE stalls SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {STALL_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => row_to_stall(row),
            None => Err(StoreError::StallNotFound(id)),
        }
    }

    async fn delete_stall(&mut self, id: StallId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stalls WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stall_statistics(&mut self) -> Result<StallStatistics> {
        let rows =
            sqlx::query("SELECT status, size, COUNT(*) AS n FROM stalls GROUP BY status, size")
                .fetch_all(&mut *self.tx)
                .await?;

        let mut stats = StallStatistics::default();
        for row in rows {
            let status: StallStatus = row.try_get::<String, _>("status")?.parse()?;
            let size = row.try_get::<String, _>("size")?.parse()?;
            let n: i64 = row.try_get("n")?;
            stats.record(status, size, u64::try_from(n).unwrap_or_default());
        }
        Ok(stats)
    }
}

#[async_trait]
impl ReservationStore for PostgresUnit {
    async fn insert_active(&mut self, new: NewReservation) -> Result<Reservation> {
        let stall_id = new.stall_id;
        let reservation = new.into_reservation()?;

        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, stall_id, total_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_str())
        .bind(reservation.stall_id.as_uuid())
        .bind(reservation.total_amount.minor())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                // Partial unique index backs up the exclusivity check
                if db_err.constraint() == Some("one_active_reservation_per_stall") {
                    metrics::counter!("store_transition_conflicts_total").increment(1);
                    return StoreError::TransitionConflict { stall_id };
                }
                if db_err.is_foreign_key_violation() {
                    return StoreError::StallNotFound(stall_id);
                }
            }
            StoreError::Database(e)
        })?;

        Ok(reservation)
    }

    async fn count_active(&mut self, user_id: &UserId) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND status IN ('PENDING', 'CONFIRMED')",
        )
        .bind(user_id.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn has_active(&mut self, user_id: &UserId, stall_id: StallId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND stall_id = $2 AND status IN ('PENDING', 'CONFIRMED')
            )
            "#,
        )
        .bind(user_id.as_str())
        .bind(stall_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn get_reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_reservation).transpose()
    }

    async fn cancel_reservation(&mut self, id: ReservationId) -> Result<Reservation> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET status = 'CANCELLED', updated_at = $2
            WHERE id = $1 AND status <> 'CANCELLED'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => row_to_reservation(row),
            None => match self.get_reservation(id).await? {
                Some(_) => Err(StoreError::AlreadyCancelled(id)),
                None => Err(StoreError::ReservationNotFound(id)),
            },
        }
    }

    async fn list_active_for_stall(&mut self, stall_id: StallId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM reservations
            WHERE stall_id = $1 AND status IN ('PENDING', 'CONFIRMED')
            "#
        ))
        .bind(stall_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_reservation).collect()
    }

    async fn list_reservations(&mut self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM reservations
            WHERE ($1::TEXT IS NULL OR user_id = $1)
              AND ($2::UUID IS NULL OR stall_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY created_at DESC, id ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(query.user_id.as_ref().map(|u| u.as_str()))
        .bind(query.stall_id.map(|s| s.as_uuid()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.limit.map(to_i64))
        .bind(to_i64(query.offset.unwrap_or(0)))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_reservation).collect()
    }

    async fn reservation_statistics(&mut self) -> Result<ReservationStatistics> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n,
                   LEAST(COALESCE(SUM(total_amount), 0), 9223372036854775807)::BIGINT AS amount
            FROM reservations
            GROUP BY status
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        let mut stats = ReservationStatistics::default();
        for row in rows {
            let status: ReservationStatus = row.try_get::<String, _>("status")?.parse()?;
            let n: i64 = row.try_get("n")?;
            let amount: i64 = row.try_get("amount")?;
            stats.record(
                status,
                u64::try_from(n).unwrap_or_default(),
                Money::from_minor(amount),
            );
        }
        Ok(stats)
    }
}

#[async_trait]
impl GenreStore for PostgresUnit {
    async fn get_genre(&mut self, id: GenreId) -> Result<Option<Genre>> {
        let row = sqlx::query(&format!("SELECT {GENRE_COLUMNS} FROM genres WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_genre).transpose()
    }

    async fn find_genre_by_name(&mut self, name: &str) -> Result<Option<Genre>> {
        let row = sqlx::query(&format!("SELECT {GENRE_COLUMNS} FROM genres WHERE name = $1"))
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_genre).transpose()
    }

    async fn list_genres(&mut self) -> Result<Vec<Genre>> {
        let rows = sqlx::query(&format!(
            "SELECT {GENRE_COLUMNS} FROM genres ORDER BY name ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_genre).collect()
    }

    async fn insert_genre(&mut self, genre: Genre) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO genres (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(genre.id.as_uuid())
        .bind(&genre.name)
        .bind(genre.description.as_deref())
        .bind(genre.created_at)
        .bind(genre.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_genre_write_error(e, &genre.name))?;
        Ok(())
    }

    async fn update_genre(&mut self, genre: &Genre) -> Result<Genre> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE genres
            SET name = $2, description = $3, updated_at = $4
            WHERE id = $1
            RETURNING {GENRE_COLUMNS}
            "#
        ))
        .bind(genre.id.as_uuid())
        .bind(&genre.name)
        .bind(genre.description.as_deref())
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_genre_write_error(e, &genre.name))?;

        match row {
            Some(row) => row_to_genre(row),
            None => Err(StoreError::GenreNotFound(genre.id)),
        }
    }

    async fn delete_genre(&mut self, id: GenreId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM genres WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn lock_stall(&mut self, id: StallId) -> Result<()> {
        sqlx::query("SELECT 1 FROM stalls WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_user(&mut self, user_id: &UserId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
