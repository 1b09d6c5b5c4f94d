use std::process::exit;

use parking_ledger::backend::config::BackendSettings;
use parking_ledger::backend::db::{init_pool, run_migrations};
use parking_ledger::backend::ingestion::IngestionService;
use parking_ledger::backend::monitoring::{MonitoringState, MonitoringThresholds};
use parking_ledger::backend::rest_api::start_rest_api;
use parking_ledger::backend::seed::seed_if_empty;
use parking_ledger::common::logging;
use parking_ledger::common::telemetry;

#[actix_web::main]
async fn main() {
    let settings = BackendSettings::from_env();
    logging::init(
        &settings.log_level,
        logging::LogFormat::from_env_value(&settings.log_format),
    );
    let _sentry_guard = telemetry::init_sentry(
        settings.sentry_dsn.as_deref(),
        &settings.sentry_environment,
        settings.sentry_traces_sample_rate,
    );
    tracing::info!(?settings, "backend configuration resolved");

    let pool = match init_pool(&settings.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to open database");
            exit(1);
        }
    };

    if let Err(err) = run_migrations(&pool).await {
        tracing::error!(error = %err, "failed to run migrations");
        exit(1);
    }

    if let Err(err) = seed_if_empty(&pool).await {
        tracing::warn!(error = %err, "seeding failed, continuing with existing data");
    }

    let ingestion = IngestionService::new(pool.clone(), settings.event_idempotency_window_seconds);
    let monitoring = MonitoringState::new(
        settings.monitoring_history_size,
        MonitoringThresholds {
            error_rate_threshold: settings.monitoring_error_rate_threshold,
            latency_ms_threshold: settings.monitoring_latency_ms_threshold,
            low_availability_threshold: settings.monitoring_low_availability_threshold,
        },
    );

    let result = start_rest_api(
        settings.bind_address.clone(),
        settings.bind_port,
        settings.clone(),
        pool,
        ingestion,
        monitoring,
    )
    .await;

    match result {
        Ok(()) => exit(0),
        Err(err) => {
            tracing::error!(error = %err, "REST API server exited with error");
            exit(1);
        }
    }
}
