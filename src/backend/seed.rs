use chrono::{Duration, Utc};

use crate::backend::db::DbPool;

const FLOOR_SEEDS: &[(&str, i64, i64)] = &[
    ("Ground Floor", 40, 12),
    ("Level 1", 40, 28),
    ("Level 2", 40, 5),
    ("Level 3", 40, 0),
    ("Rooftop", 20, 18),
];

/// Populates the fixed floor set and a handful of historical events if the
/// database is empty. Safe to call on every startup: it only inserts floors
/// that don't already exist by name.
pub async fn seed_if_empty(pool: &DbPool) -> Result<(), sqlx::Error> {
    let (floor_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM floors")
        .fetch_one(pool)
        .await?;
    if floor_count > 0 {
        return Ok(());
    }

    let now = Utc::now();
    for (name, total_slots, current_vehicles) in FLOOR_SEEDS {
        let floor_id: (i64,) = sqlx::query_as(
            "INSERT INTO floors (name, description, total_slots, current_vehicles, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(Option::<String>::None)
        .bind(total_slots)
        .bind(current_vehicles)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        for i in 0..*current_vehicles {
            let camera_id = format!("seed-cam-{name}", name = name.to_ascii_lowercase().replace(' ', "-"));
            let track_id = format!("seed-track-{i}");
            let timestamp = now - Duration::minutes(30 * (i + 1));
            sqlx::query(
                "INSERT INTO events (camera_id, floor_id, track_id, vehicle_type, direction, confidence, timestamp, created_at) \
                 VALUES (?, ?, ?, 'car', 'entry', 0.97, ?, ?)",
            )
            .bind(&camera_id)
            .bind(floor_id.0)
            .bind(&track_id)
            .bind(timestamp)
            .bind(timestamp)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::db::{init_pool, run_migrations};

    #[tokio::test]
    async fn seeding_populates_the_fixed_floor_set() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_if_empty(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM floors")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 5);

        let (name,): (String,) = sqlx::query_as("SELECT name FROM floors WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Ground Floor");
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_if_empty(&pool).await.unwrap();
        seed_if_empty(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM floors")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn seeded_event_count_matches_seeded_current_vehicles() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_if_empty(&pool).await.unwrap();

        let (events_for_level1,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM events WHERE floor_id = 2")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(events_for_level1, 28);
    }
}
