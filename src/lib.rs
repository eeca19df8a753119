// Library crate for integration tests and the binary.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod log_capture;
pub mod report;
pub mod routes;
pub mod server;
pub mod service;
pub mod settings;
pub mod state;
pub mod submission;
