pub mod domain;
pub mod logging;
pub mod telemetry;
