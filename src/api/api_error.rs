use crate::error::Error;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Wraps [`Error`] for the HTTP layer. Every failure renders as a JSON body
/// `{"code": ..., "msg": ...}`; the status follows the error family —
/// naming and validation errors are the client's fault (400), a missing
/// JSON content type is 415, everything touching DNS or crypto is 500.
pub(crate) struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::WrongPort(_)
            | Error::WrongSrvName(_)
            | Error::WrongSrvType(_)
            | Error::WrongServer(_)
            | Error::WrongTxtString(_)
            | Error::SrvNotFound(_)
            | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::JsonExtractorRejection(rejection) => match rejection {
                JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::BAD_REQUEST,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "code": self.0.code(),
            "msg": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
