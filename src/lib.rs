//! Asynchronous web page to PDF/image conversion service.
//!
//! The HTTP API (`serve`) records conversion jobs and enqueues them; the worker
//! process (`worker`) runs `wkhtmltopdf`/`wkhtmltoimage`, uploads the artifact to
//! blob storage and records the outcome.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
