use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pedimentos_core::error::PedimentoError;

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(PedimentoError::InvalidRequest(msg.into()).into())
    }
}

fn status_for(e: &PedimentoError) -> StatusCode {
    match e {
        PedimentoError::InvalidRequest(_)
        | PedimentoError::InvalidServiceKind(_)
        | PedimentoError::InvalidStateCode(_) => StatusCode::BAD_REQUEST,
        PedimentoError::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
        PedimentoError::ServiceExists { .. } => StatusCode::CONFLICT,
        PedimentoError::Registry(_) | PedimentoError::Processor(_) => StatusCode::BAD_GATEWAY,
        PedimentoError::LocalStore(_)
        | PedimentoError::InvalidConfig(_)
        | PedimentoError::Io(_)
        | PedimentoError::Yaml(_)
        | PedimentoError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<PedimentoError>()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, status_for);

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: PedimentoError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            status_of(PedimentoError::InvalidRequest("pedimento".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::bad_request("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_service_maps_to_404() {
        assert_eq!(
            status_of(PedimentoError::ServiceNotFound {
                kind: "acuse".into(),
                pedimento: "p".into()
            }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn duplicate_record_maps_to_409() {
        assert_eq!(
            status_of(PedimentoError::ServiceExists {
                kind: "acuse".into(),
                pedimento: "p".into(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn upstream_failures_map_to_502() {
        assert_eq!(
            status_of(PedimentoError::Registry("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(PedimentoError::Processor("soap".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn foreign_errors_map_to_500() {
        let err = AppError(anyhow::anyhow!("boom"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
