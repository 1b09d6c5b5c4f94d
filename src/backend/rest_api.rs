use std::time::Instant;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{http, web, App, HttpServer};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::backend::config::BackendSettings;
use crate::backend::db::DbPool;
use crate::backend::error::AppError;
use crate::backend::handlers;
use crate::backend::ingestion::IngestionService;
use crate::backend::monitoring::MonitoringState;
use crate::backend::security::InMemoryRateLimiter;

#[derive(OpenApi)]
#[openapi(tags(
    (name = "Ledger", description = "Vehicle occupancy ledger: events, floors, recommendations, monitoring")
))]
struct ApiDoc;

fn build_cors(settings: &BackendSettings) -> Cors {
    let wildcard_origins = settings.cors_allow_origins.iter().any(|o| o == "*");
    let mut cors = Cors::default();

    cors = if wildcard_origins {
        cors.allow_any_origin()
    } else {
        settings
            .cors_allow_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    };

    cors = if settings.cors_allow_methods.iter().any(|m| m == "*") {
        cors.allow_any_method()
    } else {
        cors.allowed_methods(settings.cors_allow_methods.iter().map(String::as_str))
    };

    cors = if settings.cors_allow_headers.iter().any(|h| h == "*") {
        cors.allow_any_header()
    } else {
        cors.allowed_headers(
            settings
                .cors_allow_headers
                .iter()
                .filter_map(|h| http::header::HeaderName::try_from(h.as_str()).ok()),
        )
    };

    if !wildcard_origins {
        cors = cors.supports_credentials();
    }

    cors.max_age(3600)
}

pub async fn start_rest_api(
    bind_address: String,
    bind_port: u16,
    settings: BackendSettings,
    pool: DbPool,
    ingestion: IngestionService,
    monitoring: MonitoringState,
) -> std::io::Result<()> {
    let addr = format!("{bind_address}:{bind_port}");
    tracing::info!(addr = %addr, "backend REST API starting");

    let settings_data = web::Data::new(settings.clone());
    let pool_data = web::Data::new(pool);
    let ingestion_data = web::Data::new(ingestion);
    let monitoring_data = web::Data::new(monitoring);
    let rate_limiter_data = web::Data::new(InMemoryRateLimiter::new(
        settings.api_rate_limit,
        settings.api_rate_limit_window_seconds,
    ));

    HttpServer::new(move || {
        let cors = build_cors(&settings_data);

        App::new()
            .wrap(cors)
            .wrap(actix_web::middleware::from_fn(security_and_tracing_fn))
            .app_data(settings_data.clone())
            .app_data(pool_data.clone())
            .app_data(ingestion_data.clone())
            .app_data(monitoring_data.clone())
            .app_data(rate_limiter_data.clone())
            .route("/", web::get().to(handlers::root))
            .route("/health", web::get().to(handlers::health))
            .route("/health/live", web::get().to(handlers::health_live))
            .route("/health/ready", web::get().to(handlers::health_ready))
            .route("/event", web::post().to(handlers::create_event))
            .route("/floors", web::get().to(handlers::list_floors))
            .route("/floors/{id}", web::get().to(handlers::get_floor))
            .route("/recommend", web::get().to(handlers::recommend))
            .route("/events", web::get().to(handlers::list_events))
            .route("/monitoring/metrics", web::get().to(handlers::monitoring_metrics))
            .route("/monitoring/alerts", web::get().to(handlers::monitoring_alerts))
            .route("/camera/latest-frame", web::get().to(handlers::latest_camera_frame))
            .service(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()))
            .service(RapiDoc::new("/api-docs/openapi.json").path("/rapidoc"))
    })
    .bind(&addr)?
    .run()
    .await
}

async fn security_and_tracing_fn(
    req: ServiceRequest,
    next: actix_web::middleware::Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let path = req.path().to_string();
    let method = req.method().to_string();

    if method != "OPTIONS" {
        let settings = req
            .app_data::<web::Data<BackendSettings>>()
            .expect("BackendSettings must be registered")
            .clone();

        if !settings.is_public_path(&path) {
            let presented = req
                .headers()
                .get("X-API-Key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Err(err) = crate::backend::security::check_api_key(
                &settings.api_keys,
                presented.as_deref(),
            ) {
                return Ok(req.into_response(err.error_response()).map_into_boxed_body());
            }

            let limiter = req
                .app_data::<web::Data<InMemoryRateLimiter>>()
                .expect("InMemoryRateLimiter must be registered")
                .clone();
            let client = presented.unwrap_or_else(|| {
                req.connection_info()
                    .realip_remote_addr()
                    .unwrap_or("unknown")
                    .to_string()
            });
            let (allowed, retry_after_seconds) = limiter.check(&client);
            if !allowed {
                let err = AppError::RateLimited { retry_after_seconds };
                return Ok(req.into_response(err.error_response()).map_into_boxed_body());
            }
        }
    }

    let monitoring = req
        .app_data::<web::Data<MonitoringState>>()
        .expect("MonitoringState must be registered")
        .clone();

    let start = Instant::now();
    let response = next.call(req).await?;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    monitoring.record_request(&method, &path, response.status().as_u16(), duration_ms);

    Ok(response.map_into_boxed_body())
}
