use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use crate::backend::db::DbPool;
use crate::backend::error::AppError;
use crate::backend::lock_registry::{EventLockKey, KeyedLockRegistry};
use crate::backend::models::{Event, Floor};
use crate::common::domain::{Direction, VehicleType};

pub struct RecordEventRequest {
    pub camera_id: String,
    pub floor_id: i64,
    pub track_id: String,
    pub vehicle_type: String,
    pub direction: String,
    pub confidence: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accepts a crossing event, deduplicates it within the idempotency window, and
/// atomically updates the owning floor's vehicle count.
pub struct IngestionService {
    pool: DbPool,
    locks: KeyedLockRegistry<EventLockKey>,
    idempotency_window_seconds: i64,
}

fn row_to_floor(row: sqlx::sqlite::SqliteRow) -> Floor {
    Floor {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        total_slots: row.get("total_slots"),
        current_vehicles: row.get("current_vehicles"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<Event, AppError> {
    let vehicle_type: String = row.get("vehicle_type");
    let direction: String = row.get("direction");
    Ok(Event {
        id: row.get("id"),
        camera_id: row.get("camera_id"),
        floor_id: row.get("floor_id"),
        track_id: row.get("track_id"),
        vehicle_type: VehicleType::from_str(&vehicle_type)
            .map_err(|err| AppError::Internal(err))?,
        direction: Direction::from_str(&direction).map_err(|err| AppError::Internal(err))?,
        confidence: row.get("confidence"),
        timestamp: row.get("timestamp"),
        created_at: row.get("created_at"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

impl IngestionService {
    pub fn new(pool: DbPool, idempotency_window_seconds: i64) -> Self {
        IngestionService {
            pool,
            locks: KeyedLockRegistry::new(),
            idempotency_window_seconds,
        }
    }

    async fn find_existing<'e, E>(
        executor: E,
        camera_id: &str,
        track_id: &str,
        floor_id: i64,
        direction: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Option<Event>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query(
            "SELECT * FROM events WHERE camera_id = ? AND track_id = ? AND floor_id = ? \
             AND direction = ? AND timestamp >= ? AND timestamp <= ? LIMIT 1",
        )
        .bind(camera_id)
        .bind(track_id)
        .bind(floor_id)
        .bind(direction)
        .bind(window_start)
        .bind(window_end)
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_event(row).map_err(|_| {
                sqlx::Error::Decode("invalid stored vehicle_type/direction".into())
            })?)),
            None => Ok(None),
        }
    }

    async fn fetch_floor<'e, E>(executor: E, floor_id: i64) -> Result<Option<Floor>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query("SELECT * FROM floors WHERE id = ?")
            .bind(floor_id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(row_to_floor))
    }

    pub async fn record_event(
        &self,
        request: RecordEventRequest,
    ) -> Result<(Event, Floor, bool), AppError> {
        let vehicle_type = VehicleType::from_str(&request.vehicle_type)
            .map_err(AppError::Validation)?;
        let direction =
            Direction::from_str(&request.direction).map_err(AppError::Validation)?;
        let timestamp = request.timestamp.unwrap_or_else(Utc::now);

        let lock_key: EventLockKey = (
            request.camera_id.clone(),
            request.track_id.clone(),
            request.floor_id,
            direction.as_str().to_string(),
        );
        let lock = self.locks.get_lock(&lock_key);
        let _guard = lock.lock().await;

        let window = Duration::seconds(self.idempotency_window_seconds.max(0));
        let window_start = timestamp - window;
        let window_end = timestamp + window;

        let mut tx = self.pool.begin().await.map_err(|_| AppError::DbUnavailable)?;

        let floor = Self::fetch_floor(&mut *tx, request.floor_id)
            .await?
            .ok_or(AppError::FloorNotFound)?;

        if let Some(existing) = Self::find_existing(
            &mut *tx,
            &request.camera_id,
            &request.track_id,
            request.floor_id,
            direction.as_str(),
            window_start,
            window_end,
        )
        .await?
        {
            tx.commit().await?;
            let refreshed = Self::fetch_floor(&self.pool, request.floor_id)
                .await?
                .unwrap_or(floor);
            return Ok((existing, refreshed, true));
        }

        let update_sql = match direction {
            Direction::Entry => {
                "UPDATE floors SET current_vehicles = current_vehicles + 1, updated_at = ? \
                 WHERE id = ? AND current_vehicles < total_slots"
            }
            Direction::Exit => {
                "UPDATE floors SET current_vehicles = current_vehicles - 1, updated_at = ? \
                 WHERE id = ? AND current_vehicles > 0"
            }
        };
        let now = Utc::now();
        let update_result = sqlx::query(update_sql)
            .bind(now)
            .bind(request.floor_id)
            .execute(&mut *tx)
            .await?;

        if update_result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(if direction == Direction::Entry {
                AppError::CapacityExceeded
            } else {
                AppError::CapacityUnderflow
            });
        }

        let insert_result = sqlx::query(
            "INSERT INTO events (camera_id, floor_id, track_id, vehicle_type, direction, \
             confidence, timestamp, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.camera_id)
        .bind(request.floor_id)
        .bind(&request.track_id)
        .bind(vehicle_type.as_str())
        .bind(direction.as_str())
        .bind(request.confidence)
        .bind(timestamp)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let inserted_id = match insert_result {
            Ok(result) => result.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await.ok();
                let conflicting = Self::find_existing(
                    &self.pool,
                    &request.camera_id,
                    &request.track_id,
                    request.floor_id,
                    direction.as_str(),
                    window_start,
                    window_end,
                )
                .await?;
                return match conflicting {
                    Some(existing) => {
                        let refreshed = Self::fetch_floor(&self.pool, request.floor_id)
                            .await?
                            .unwrap_or(floor);
                        Ok((existing, refreshed, true))
                    }
                    None => Err(AppError::IntegrityConflict),
                };
            }
            Err(err) => {
                tx.rollback().await.ok();
                return Err(err.into());
            }
        };

        let event_row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(inserted_id)
            .fetch_one(&mut *tx)
            .await?;
        let event = row_to_event(event_row)?;

        let floor_after = Self::fetch_floor(&mut *tx, request.floor_id)
            .await?
            .ok_or(AppError::FloorNotFound)?;

        tx.commit().await?;

        Ok((event, floor_after, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::db::{init_pool, run_migrations};

    async fn seeded_pool() -> DbPool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO floors (name, description, total_slots, current_vehicles, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind("Ground Floor")
        .bind(Option::<String>::None)
        .bind(20_i64)
        .bind(5_i64)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn request(timestamp: DateTime<Utc>) -> RecordEventRequest {
        RecordEventRequest {
            camera_id: "cam-1".to_string(),
            floor_id: 1,
            track_id: "t1".to_string(),
            vehicle_type: "car".to_string(),
            direction: "entry".to_string(),
            confidence: 0.95,
            timestamp: Some(timestamp),
        }
    }

    #[tokio::test]
    async fn single_entry_increments_current_vehicles() {
        let pool = seeded_pool().await;
        let service = IngestionService::new(pool, 5);
        let (_, floor, is_duplicate) = service.record_event(request(Utc::now())).await.unwrap();
        assert!(!is_duplicate);
        assert_eq!(floor.current_vehicles, 6);
        assert_eq!(floor.available_slots(), 14);
    }

    #[tokio::test]
    async fn duplicate_within_window_does_not_mutate_count_again() {
        let pool = seeded_pool().await;
        let service = IngestionService::new(pool, 5);
        let now = Utc::now();
        let (_, first_floor, first_dup) = service.record_event(request(now)).await.unwrap();
        assert!(!first_dup);
        assert_eq!(first_floor.current_vehicles, 6);

        let (_, second_floor, second_dup) = service.record_event(request(now)).await.unwrap();
        assert!(second_dup);
        assert_eq!(second_floor.current_vehicles, 6);
    }

    #[tokio::test]
    async fn capacity_boundary_rejects_entry_without_mutating() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO floors (name, description, total_slots, current_vehicles, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind("Full Floor")
        .bind(Option::<String>::None)
        .bind(10_i64)
        .bind(10_i64)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let service = IngestionService::new(pool, 5);
        let result = service.record_event(request(Utc::now())).await;
        assert!(matches!(result, Err(AppError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_mutate_count_exactly_once() {
        use std::sync::Arc;

        let pool = seeded_pool().await;
        let service = Arc::new(IngestionService::new(pool, 5));
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.record_event(request(now)).await
            }));
        }

        let mut duplicates = 0;
        for handle in handles {
            let (_, _, is_duplicate) = handle.await.unwrap().unwrap();
            if is_duplicate {
                duplicates += 1;
            }
        }

        assert!(duplicates >= 19);
        let floor = IngestionService::fetch_floor(&service.pool, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(floor.current_vehicles, 6);
    }

    #[tokio::test]
    async fn unknown_floor_is_rejected() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let service = IngestionService::new(pool, 5);
        let result = service.record_event(request(Utc::now())).await;
        assert!(matches!(result, Err(AppError::FloorNotFound)));
    }
}
