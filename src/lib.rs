// Library exports for the binary and integration tests

pub mod config;
pub mod content_store;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod service;
pub mod shutdown;
pub mod upload_queue;
