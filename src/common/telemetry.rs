use std::str::FromStr;

use sentry::types::Dsn;

/// Best-effort Sentry initialization, mirroring the guarded/warn-on-failure pattern
/// used at both binaries' startup: a missing or unparseable DSN never blocks startup.
/// The returned guard must be kept alive for the life of the process.
pub fn init_sentry(
    dsn: Option<&str>,
    environment: &str,
    traces_sample_rate: f32,
) -> Option<sentry::ClientInitGuard> {
    let dsn = dsn?;
    match Dsn::from_str(dsn) {
        Ok(parsed) => {
            let guard = sentry::init((
                parsed,
                sentry::ClientOptions {
                    environment: Some(environment.to_string().into()),
                    traces_sample_rate,
                    ..Default::default()
                },
            ));
            tracing::info!("Sentry error tracking initialized");
            Some(guard)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Sentry initialization skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dsn_is_a_no_op() {
        assert!(init_sentry(None, "development", 0.0).is_none());
    }

    #[test]
    fn malformed_dsn_is_skipped_without_panicking() {
        assert!(init_sentry(Some("not-a-dsn"), "development", 0.0).is_none());
    }
}
