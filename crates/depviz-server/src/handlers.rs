//! Request handlers for the depviz server

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use depviz_core::{Error, PackageId, RenderRequest, Variant, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};

use crate::ServerState;

/// Query string of a render request. Values are parsed leniently.
#[derive(Debug, Default, Deserialize)]
pub struct RenderParams {
    pub leaf: Option<String>,
    pub depth: Option<String>,
    pub reversed: Option<String>,
}

impl RenderParams {
    /// `leaf=true` only. A missing or empty depth is the default; an unparsable one is 0.
    pub fn variant(&self) -> Variant {
        Variant {
            leaf: self.leaf.as_deref() == Some("true"),
            depth: match self.depth.as_deref() {
                None | Some("") => DEFAULT_MAX_DEPTH,
                Some(d) => d.parse().unwrap_or(0),
            },
            reversed: self
                .reversed
                .as_deref()
                .map(|r| r.trim().trim_matches('/'))
                .filter(|r| !r.is_empty())
                .map(PackageId::new),
        }
    }
}

/// Failure body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub kind: String,
}

/// An error on its way to the client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                message: message.into(),
                kind: "bad_request".to_string(),
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let status = if kind.is_client_error() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError {
            status,
            body: ErrorResponse {
                message: err.to_string(),
                kind: kind.as_str().to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Render the dependency graph of the import path in the URL
pub async fn render_package(
    State(state): State<Arc<ServerState>>,
    Path(path): Path<String>,
    Query(params): Query<RenderParams>,
) -> Result<Response, ApiError> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(ApiError::bad_request("please provide a valid package path"));
    }

    let request = RenderRequest::new(path, params.variant());
    match state.service.render(&request).await {
        Ok(output) => Ok(([(header::CONTENT_TYPE, state.content_type)], output.image).into_response()),
        Err(e) => {
            tracing::error!("render {}: {}", request.id, error_chain(&e));
            Err(e.into())
        }
    }
}

/// `GET /` names no package
pub async fn missing_package() -> ApiError {
    ApiError::bad_request("please provide a valid package path")
}

pub async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(health)
}

/// `outer: inner: innermost`, for logging.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(leaf: Option<&str>, depth: Option<&str>, reversed: Option<&str>) -> RenderParams {
        RenderParams {
            leaf: leaf.map(str::to_string),
            depth: depth.map(str::to_string),
            reversed: reversed.map(str::to_string),
        }
    }

    #[test]
    fn test_default_variant_is_canonical() {
        assert_eq!(RenderParams::default().variant(), Variant::default());
        assert!(params(None, Some("128"), Some("")).variant().is_canonical());
    }

    #[test]
    fn test_query_parsing() {
        let variant = params(Some("true"), Some("3"), Some("github.com/u/lib")).variant();
        assert!(variant.leaf);
        assert_eq!(variant.depth, 3);
        assert_eq!(variant.reversed, Some(PackageId::new("github.com/u/lib")));

        assert!(!params(Some("1"), None, None).variant().leaf);
        assert_eq!(params(None, Some(""), None).variant().depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_unparsable_depth_is_root_only() {
        let variant = params(None, Some("deep"), None).variant();
        assert_eq!(variant.depth, 0);
        assert!(!variant.is_canonical());
    }

    #[test]
    fn test_error_status_mapping() {
        let not_found: ApiError = Error::NotFound("x".into()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.kind, "not_found");

        let render: ApiError = Error::Render("dot failed".into()).into();
        assert_eq!(render.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(render.body.kind, "render");

        let cycle: ApiError = Error::Cycle(vec!["a".into(), "a".into()]).into();
        assert_eq!(cycle.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(cycle.body.kind, "internal");
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
