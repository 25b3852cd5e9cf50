//! Infrastructure adapters and runtime bootstrap.

pub mod converter;
pub mod db;
pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
