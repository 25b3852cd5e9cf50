pub mod conversions;
pub mod converter;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod status;
pub mod storage;
