use std::path::PathBuf;
use std::str::FromStr;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::config::BackendSettings;
use crate::backend::db::{get_database_stats, DbPool};
use crate::backend::error::AppError;
use crate::backend::ingestion::{IngestionService, RecordEventRequest};
use crate::backend::models::{Event, Floor};
use crate::backend::monitoring::MonitoringState;
use crate::common::domain::{Direction, VehicleType};

fn default_confidence() -> f64 {
    0.95
}

#[derive(Debug, Deserialize)]
pub struct EventCreateRequest {
    pub camera_id: String,
    pub floor_id: i64,
    pub track_id: String,
    pub vehicle_type: String,
    pub direction: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl EventCreateRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.camera_id.is_empty() || self.camera_id.chars().count() > 50 {
            return Err(AppError::Validation(
                "camera_id must be 1-50 characters".to_string(),
            ));
        }
        if self.floor_id <= 0 {
            return Err(AppError::Validation("floor_id must be positive".to_string()));
        }
        if self.track_id.is_empty() || self.track_id.chars().count() > 100 {
            return Err(AppError::Validation(
                "track_id must be 1-100 characters".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AppError::Validation(
                "confidence must be within [0, 1]".to_string(),
            ));
        }
        VehicleType::from_str(&self.vehicle_type).map_err(AppError::Validation)?;
        Direction::from_str(&self.direction).map_err(AppError::Validation)?;
        Ok(())
    }
}

#[derive(Serialize)]
pub struct EventCreateResponse {
    pub success: bool,
    pub message: String,
    pub event_id: i64,
    pub floor_id: i64,
    pub current_vehicles: i64,
    pub available_slots: i64,
    pub occupancy_percentage: f64,
}

pub async fn create_event(
    ingestion: web::Data<IngestionService>,
    body: web::Json<EventCreateRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let (event, floor, is_duplicate) = ingestion
        .record_event(RecordEventRequest {
            camera_id: body.camera_id.clone(),
            floor_id: body.floor_id,
            track_id: body.track_id.clone(),
            vehicle_type: body.vehicle_type.clone(),
            direction: body.direction.clone(),
            confidence: body.confidence,
            timestamp: None,
        })
        .await?;

    let message = if is_duplicate {
        "duplicate event within idempotency window, ignored".to_string()
    } else {
        "recorded".to_string()
    };

    Ok(HttpResponse::Ok().json(EventCreateResponse {
        success: true,
        message,
        event_id: event.id,
        floor_id: floor.id,
        current_vehicles: floor.current_vehicles,
        available_slots: floor.available_slots(),
        occupancy_percentage: floor.occupancy_percentage(),
    }))
}

#[derive(Serialize)]
pub struct FloorResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub total_slots: i64,
    pub current_vehicles: i64,
    pub available_slots: i64,
    pub occupancy_percentage: f64,
    pub is_active: bool,
}

impl From<&Floor> for FloorResponse {
    fn from(floor: &Floor) -> Self {
        FloorResponse {
            id: floor.id,
            name: floor.name.clone(),
            description: floor.description.clone(),
            total_slots: floor.total_slots,
            current_vehicles: floor.current_vehicles,
            available_slots: floor.available_slots(),
            occupancy_percentage: floor.occupancy_percentage(),
            is_active: floor.is_active,
        }
    }
}

#[derive(Serialize)]
pub struct FloorsListResponse {
    pub floors: Vec<FloorResponse>,
}

async fn fetch_active_floors(pool: &DbPool) -> Result<Vec<Floor>, AppError> {
    let rows = sqlx::query("SELECT * FROM floors WHERE is_active = 1 ORDER BY id")
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(row_to_floor).collect()
}

fn row_to_floor(row: sqlx::sqlite::SqliteRow) -> Result<Floor, AppError> {
    use sqlx::Row;
    Ok(Floor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        total_slots: row.try_get("total_slots")?,
        current_vehicles: row.try_get("current_vehicles")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn list_floors(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let floors = fetch_active_floors(&pool).await?;
    Ok(HttpResponse::Ok().json(FloorsListResponse {
        floors: floors.iter().map(FloorResponse::from).collect(),
    }))
}

pub async fn get_floor(
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let floor_id = path.into_inner();
    if floor_id <= 0 {
        return Err(AppError::Validation("id must be positive".to_string()));
    }
    let row = sqlx::query("SELECT * FROM floors WHERE id = ?")
        .bind(floor_id)
        .fetch_optional(pool.get_ref())
        .await?;
    let floor = row.map(row_to_floor).transpose()?.ok_or(AppError::FloorNotFound)?;
    Ok(HttpResponse::Ok().json(FloorResponse::from(&floor)))
}

#[derive(Serialize)]
pub struct RecommendedFloor {
    #[serde(flatten)]
    pub floor: FloorResponse,
    pub reason: String,
}

#[derive(Serialize)]
pub struct RecommendationResponse {
    pub recommended: Option<RecommendedFloor>,
    pub alternatives: Vec<FloorResponse>,
}

fn occupancy_reason(occupancy_percentage: f64) -> String {
    if occupancy_percentage < 30.0 {
        "plenty of space available".to_string()
    } else if occupancy_percentage < 50.0 {
        "moderate availability".to_string()
    } else if occupancy_percentage < 70.0 {
        "filling up, act soon".to_string()
    } else {
        "nearly full".to_string()
    }
}

pub async fn recommend(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let floors = fetch_active_floors(&pool).await?;
    if floors.is_empty() {
        return Ok(HttpResponse::Ok().json(RecommendationResponse {
            recommended: None,
            alternatives: Vec::new(),
        }));
    }

    let best = floors
        .iter()
        .max_by_key(|f| f.available_slots())
        .expect("floors is non-empty");

    let mut others: Vec<&Floor> = floors.iter().filter(|f| f.id != best.id).collect();
    others.sort_by(|a, b| {
        a.occupancy_percentage()
            .partial_cmp(&b.occupancy_percentage())
            .unwrap()
    });
    let alternatives = others
        .into_iter()
        .take(3)
        .map(FloorResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(RecommendationResponse {
        recommended: Some(RecommendedFloor {
            floor: FloorResponse::from(best),
            reason: occupancy_reason(best.occupancy_percentage()),
        }),
        alternatives,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub floor_id: Option<i64>,
    pub vehicle_type: Option<String>,
    pub direction: Option<String>,
    pub hours: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct EventResponse {
    pub id: i64,
    pub camera_id: String,
    pub floor_id: i64,
    pub track_id: String,
    pub vehicle_type: VehicleType,
    pub direction: Direction,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Event> for EventResponse {
    fn from(event: &Event) -> Self {
        EventResponse {
            id: event.id,
            camera_id: event.camera_id.clone(),
            floor_id: event.floor_id,
            track_id: event.track_id.clone(),
            vehicle_type: event.vehicle_type,
            direction: event.direction,
            confidence: event.confidence,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Serialize)]
pub struct EventsListResponse {
    pub events: Vec<EventResponse>,
    pub total: i64,
}

pub async fn list_events(
    pool: web::Data<DbPool>,
    query: web::Query<EventsQuery>,
) -> Result<HttpResponse, AppError> {
    let hours = query.hours.unwrap_or(24);
    if !(1..=8760).contains(&hours) {
        return Err(AppError::Validation("hours must be within [1, 8760]".to_string()));
    }
    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(AppError::Validation("limit must be within [1, 1000]".to_string()));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::Validation("offset must be >= 0".to_string()));
    }

    let vehicle_type = query
        .vehicle_type
        .as_deref()
        .map(VehicleType::from_str)
        .transpose()
        .map_err(AppError::Validation)?;
    let direction = query
        .direction
        .as_deref()
        .map(Direction::from_str)
        .transpose()
        .map_err(AppError::Validation)?;

    let since = Utc::now() - Duration::hours(hours);

    let mut sql = String::from("SELECT * FROM events WHERE timestamp >= ?");
    if query.floor_id.is_some() {
        sql.push_str(" AND floor_id = ?");
    }
    if vehicle_type.is_some() {
        sql.push_str(" AND vehicle_type = ?");
    }
    if direction.is_some() {
        sql.push_str(" AND direction = ?");
    }
    sql.push_str(" ORDER BY timestamp DESC LIMIT ? OFFSET ?");

    let mut query_builder = sqlx::query(&sql).bind(since);
    if let Some(floor_id) = query.floor_id {
        query_builder = query_builder.bind(floor_id);
    }
    if let Some(vt) = vehicle_type {
        query_builder = query_builder.bind(vt.as_str());
    }
    if let Some(dir) = direction {
        query_builder = query_builder.bind(dir.as_str());
    }
    query_builder = query_builder.bind(limit).bind(offset);

    let rows = query_builder.fetch_all(pool.get_ref()).await?;
    let events: Vec<Event> = rows
        .into_iter()
        .map(row_to_event)
        .collect::<Result<_, AppError>>()?;

    let total = events.len() as i64;
    Ok(HttpResponse::Ok().json(EventsListResponse {
        events: events.iter().map(EventResponse::from).collect(),
        total,
    }))
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<Event, AppError> {
    use sqlx::Row;
    let vehicle_type: String = row.try_get("vehicle_type")?;
    let direction: String = row.try_get("direction")?;
    Ok(Event {
        id: row.try_get("id")?,
        camera_id: row.try_get("camera_id")?,
        floor_id: row.try_get("floor_id")?,
        track_id: row.try_get("track_id")?,
        vehicle_type: VehicleType::from_str(&vehicle_type).map_err(AppError::Internal)?,
        direction: Direction::from_str(&direction).map_err(AppError::Internal)?,
        confidence: row.try_get("confidence")?,
        timestamp: row.try_get("timestamp")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
    pub docs: String,
    pub openapi: String,
}

pub async fn root(settings: web::Data<BackendSettings>) -> HttpResponse {
    HttpResponse::Ok().json(RootResponse {
        message: format!("{} is running", settings.project_name),
        docs: "/rapidoc".to_string(),
        openapi: "/api-docs/openapi.json".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub tables_exist: bool,
    pub floors_count: Option<i64>,
    pub events_count: Option<i64>,
}

pub async fn health(pool: web::Data<DbPool>) -> HttpResponse {
    match get_database_stats(&pool).await {
        Ok(stats) => HttpResponse::Ok().json(HealthCheckResponse {
            status: "ok".to_string(),
            tables_exist: true,
            floors_count: Some(stats.floors_count),
            events_count: Some(stats.events_count),
        }),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not read database stats");
            HttpResponse::Ok().json(HealthCheckResponse {
                status: "degraded".to_string(),
                tables_exist: false,
                floors_count: None,
                events_count: None,
            })
        }
    }
}

#[derive(Serialize)]
struct LiveResponse {
    status: &'static str,
}

pub async fn health_live() -> HttpResponse {
    HttpResponse::Ok().json(LiveResponse { status: "alive" })
}

pub async fn health_ready(pool: web::Data<DbPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(LiveResponse { status: "ready" }),
        Err(err) => {
            tracing::warn!(error = %err, "readiness probe failed");
            HttpResponse::ServiceUnavailable().json(LiveResponse { status: "not ready" })
        }
    }
}

pub async fn monitoring_metrics(monitoring: web::Data<MonitoringState>) -> HttpResponse {
    HttpResponse::Ok().json(monitoring.snapshot())
}

pub async fn monitoring_alerts(
    pool: web::Data<DbPool>,
    monitoring: web::Data<MonitoringState>,
) -> Result<HttpResponse, AppError> {
    let floors = fetch_active_floors(&pool).await?;
    let alerts = monitoring.evaluate_alerts(&floors);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "alerts": alerts })))
}

pub async fn latest_camera_frame(settings: web::Data<BackendSettings>) -> Result<HttpResponse, AppError> {
    let dir = PathBuf::from(&settings.vision_frame_dir);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Err(AppError::Validation("no frames available".to_string())),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                    newest = Some((modified, path));
                }
            }
        }
    }

    match newest {
        Some((_, path)) => {
            let bytes = std::fs::read(&path).map_err(|e| AppError::Internal(e.to_string()))?;
            let content_type = if path.extension().and_then(|e| e.to_str()) == Some("png") {
                "image/png"
            } else {
                "image/jpeg"
            };
            Ok(HttpResponse::Ok().content_type(content_type).body(bytes))
        }
        None => Err(AppError::Validation("no frames available".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_create_request_rejects_out_of_range_confidence() {
        let request = EventCreateRequest {
            camera_id: "cam-1".to_string(),
            floor_id: 1,
            track_id: "t1".to_string(),
            vehicle_type: "car".to_string(),
            direction: "entry".to_string(),
            confidence: 1.5,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn event_create_request_rejects_empty_track_id() {
        let request = EventCreateRequest {
            camera_id: "cam-1".to_string(),
            floor_id: 1,
            track_id: "".to_string(),
            vehicle_type: "car".to_string(),
            direction: "entry".to_string(),
            confidence: 0.9,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn event_create_request_accepts_well_formed_body() {
        let request = EventCreateRequest {
            camera_id: "cam-1".to_string(),
            floor_id: 1,
            track_id: "t1".to_string(),
            vehicle_type: "car".to_string(),
            direction: "entry".to_string(),
            confidence: 0.95,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn occupancy_reason_is_bucketed() {
        assert_eq!(occupancy_reason(10.0), "plenty of space available");
        assert_eq!(occupancy_reason(40.0), "moderate availability");
        assert_eq!(occupancy_reason(60.0), "filling up, act soon");
        assert_eq!(occupancy_reason(90.0), "nearly full");
    }
}
