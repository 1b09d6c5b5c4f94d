pub mod cameras_config;
pub mod config;
pub mod crossing;
pub mod detector;
pub mod frame_source;
pub mod monitoring;
pub mod pipeline;
pub mod tracker;
pub mod transmit;
