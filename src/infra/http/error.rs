use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pressroom_api_types::ErrorResponse;

use crate::application::error::ErrorReport;

/// JSON error reply carrying the job identifier (or request id) it concerns.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    uuid: String,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            status,
            uuid: uuid.into(),
            report: ErrorReport::from_message(source, message.clone()),
            message,
        }
    }

    pub fn bad_request(
        source: &'static str,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, uuid, message)
    }

    pub fn not_found(
        source: &'static str,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, uuid, message)
    }

    pub fn internal(
        source: &'static str,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(source, StatusCode::INTERNAL_SERVER_ERROR, uuid, message)
    }

    /// Report `error` and its source chain to the logging middleware instead of the public message.
    pub fn caused_by(mut self, error: &dyn StdError) -> Self {
        self.report = ErrorReport::from_error(self.report.source, error);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            uuid: self.uuid,
            message: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
