use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub type DbPool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let path = database_url
        .strip_prefix("sqlite://")
        .unwrap_or(database_url);
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS floors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            total_slots INTEGER NOT NULL,
            current_vehicles INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            camera_id TEXT NOT NULL,
            floor_id INTEGER NOT NULL REFERENCES floors(id),
            track_id TEXT NOT NULL,
            vehicle_type TEXT NOT NULL,
            direction TEXT NOT NULL,
            confidence REAL NOT NULL,
            timestamp TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(camera_id, track_id, direction, timestamp)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_camera_floor_ts ON events(camera_id, floor_id, timestamp)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_track_direction ON events(track_id, direction)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn check_tables_exist(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1 FROM floors LIMIT 1")
        .fetch_optional(pool)
        .await
        .is_ok()
}

pub struct DatabaseStats {
    pub floors_count: i64,
    pub events_count: i64,
}

pub async fn get_database_stats(pool: &DbPool) -> Result<DatabaseStats, sqlx::Error> {
    let floors_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM floors")
        .fetch_one(pool)
        .await?;
    let events_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;
    Ok(DatabaseStats {
        floors_count: floors_count.0,
        events_count: events_count.0,
    })
}
