use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Uniform response envelope: `{ result, message, data? }`.
/// Successful responses always set `result: true`; failures are produced by
/// `ApiError` and never carry `data`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub data: Option<T>,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK with payload
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            status_code: None,
        }
    }

    /// 201 Created with payload
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            status_code: Some(StatusCode::CREATED),
        }
    }

    /// 200 OK, message only
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            status_code: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        let data_value = match self.data {
            None => None,
            Some(data) => match serde_json::to_value(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!("Failed to serialize response data: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "result": false,
                            "message": "Failed to format response",
                        })),
                    )
                        .into_response();
                }
            },
        };

        let envelope = match data_value {
            Some(data) => json!({
                "result": true,
                "message": self.message,
                "data": data,
            }),
            None => json!({
                "result": true,
                "message": self.message,
            }),
        };

        (status, Json(envelope)).into_response()
    }
}

/// Convenience alias for handler return types
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_carries_data() {
        let res = ApiResponse::ok("Fetched", json!({"id": 1}));
        assert!(res.data.is_some());
        assert_eq!(res.message, "Fetched");
        assert!(res.status_code.is_none());
    }

    #[test]
    fn created_sets_201() {
        let res = ApiResponse::created("Organization created", json!({}));
        assert_eq!(res.status_code, Some(StatusCode::CREATED));
    }
}
