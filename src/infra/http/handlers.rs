use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pressroom_api_types::RenderResponse;
use tracing::info;

use crate::{
    application::{
        conversions::{StatusError, SubmitError},
        error::ErrorReport,
        repos::RepoError,
    },
    domain::{
        render::{RenderRequest, RequestError},
        types::RenderTarget,
    },
};

use super::{error::ApiError, middleware::RequestContext, state::ApiState};

const SUBMIT_SOURCE: &str = "infra::http::submit_render";
const STATUS_SOURCE: &str = "infra::http::job_status";

/// `POST /render/{target}`: validate, persist and enqueue a conversion.
pub async fn submit_render(
    State(state): State<ApiState>,
    Extension(ctx): Extension<RequestContext>,
    Path(target): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<RenderResponse>), ApiError> {
    let identifier = ctx.request_id;
    let uuid = identifier.to_string();

    let render_target: RenderTarget = target.parse().map_err(|_| {
        ApiError::bad_request(
            SUBMIT_SOURCE,
            uuid.as_str(),
            format!("Invalid {target} render request"),
        )
    })?;

    let request = RenderRequest::parse(render_target, &body).map_err(|err| {
        let message = match &err {
            RequestError::Malformed { target, .. } => {
                format!("Unable to unmarshal json to {target} type")
            }
            other => other.to_string(),
        };
        ApiError::bad_request(SUBMIT_SOURCE, uuid.as_str(), message).caused_by(&err)
    })?;

    let response = state
        .conversions
        .submit(identifier, &request)
        .await
        .map_err(|err| {
            let message = match &err {
                SubmitError::Enqueue(_) => format!("Unable to enqueue {render_target} job"),
                _ => format!("Unable to create {render_target} job"),
            };
            ApiError::internal(SUBMIT_SOURCE, uuid.as_str(), message).caused_by(&err)
        })?;

    info!(
        target = "infra::http::submit_render",
        uuid = uuid.as_str(),
        request_type = render_target.as_str(),
        "Accepted render request"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /status/{identifier}`: report the job's current snapshot.
pub async fn job_status(
    State(state): State<ApiState>,
    Path(identifier): Path<String>,
) -> Result<Json<RenderResponse>, ApiError> {
    match state.conversions.status(&identifier).await {
        Ok(response) => Ok(Json(response)),
        Err(StatusError::InvalidIdentifier(_))
        | Err(StatusError::Repo(RepoError::InvalidInput { .. })) => Err(ApiError::bad_request(
            STATUS_SOURCE,
            identifier,
            "Invalid job identifier",
        )),
        Err(StatusError::NotFound) => Err(ApiError::not_found(
            STATUS_SOURCE,
            identifier,
            "Request not found on conversion queue",
        )),
        Err(err @ StatusError::Compose(_)) => Err(ApiError::internal(
            STATUS_SOURCE,
            identifier,
            "Unable to generate download url",
        )
        .caused_by(&err)),
        Err(err) => Err(ApiError::internal(
            STATUS_SOURCE,
            identifier,
            "Unable to fetch conversion job",
        )
        .caused_by(&err)),
    }
}

/// `GET /healthz`: 204 while the store answers, 503 otherwise.
pub async fn healthz(State(state): State<ApiState>) -> Response {
    match state.conversions.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error("infra::http::healthz", &err).attach(&mut response);
            response
        }
    }
}
