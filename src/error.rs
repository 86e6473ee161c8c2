use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::core::observation::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("wrong query parameters")]
    BadRequest,
    #[error("no price recorded for {instrument}/{quoted_instrument}")]
    NoData {
        instrument: String,
        quoted_instrument: String,
    },
    #[error("{0}")]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            // Missing data is a server-side condition, the client asked correctly
            ApiError::NoData { .. } | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
