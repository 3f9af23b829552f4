use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;

#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    IoError(std::io::Error),
    ParseError(String),
    FileProcessingError(String),
    NoDataset,
    UnknownColumn(String),
    Classification(String),
    Cancelled,
    Export(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::IoError(err) => write!(f, "IO error: {}", err),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::FileProcessingError(msg) => write!(f, "File processing error: {}", msg),
            AppError::NoDataset => write!(f, "No dataset has been uploaded"),
            AppError::UnknownColumn(name) => write!(f, "Unknown column: {}", name),
            AppError::Classification(msg) => write!(f, "Classification error: {}", msg),
            AppError::Cancelled => write!(f, "Classification was cancelled"),
            AppError::Export(msg) => write!(f, "Export error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<calamine::XlsxError> for AppError {
    fn from(err: calamine::XlsxError) -> Self {
        AppError::FileProcessingError(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Export(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::IoError(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::ParseError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::FileProcessingError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NoDataset => {
                (StatusCode::CONFLICT, "No dataset has been uploaded".to_string())
            }
            AppError::UnknownColumn(name) => {
                (StatusCode::BAD_REQUEST, format!("Unknown column: {}", name))
            }
            AppError::Classification(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Cancelled => {
                (StatusCode::CONFLICT, "Classification was cancelled".to_string())
            }
            AppError::Export(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_failure_kind() {
        let status = |err: AppError| err.into_response().status();
        assert_eq!(status(AppError::NoDataset), StatusCode::CONFLICT);
        assert_eq!(status(AppError::Cancelled), StatusCode::CONFLICT);
        assert_eq!(status(AppError::UnknownColumn("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AppError::Classification("classification failed".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(AppError::FileProcessingError("bad zip".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
