// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod frame_codec;
pub mod realtime_client;
pub mod rest_client;
