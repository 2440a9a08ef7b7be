use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{
        permission::PermissionError, task::TaskError, team::TeamError,
        team_member::TeamMemberError, user::UserError,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize, TS)]
pub struct ErrorBody {
    pub error: String,
}

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error, TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error(transparent)]
    TeamMember(#[from] TeamMemberError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
}

impl From<&'static str> for ApiError {
    fn from(msg: &'static str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::User(err) => match err {
                UserError::NotFound => StatusCode::NOT_FOUND,
                UserError::UsernameTaken | UserError::EmailTaken => StatusCode::BAD_REQUEST,
                UserError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Team(err) => match err {
                TeamError::NotFound | TeamError::CreatorNotFound => StatusCode::NOT_FOUND,
                TeamError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::TeamMember(err) => match err {
                TeamMemberError::NotFound
                | TeamMemberError::TeamNotFound
                | TeamMemberError::UserNotFound => StatusCode::NOT_FOUND,
                TeamMemberError::AlreadyMember | TeamMemberError::Permission(_) => {
                    StatusCode::BAD_REQUEST
                }
                TeamMemberError::NotPermitted => StatusCode::FORBIDDEN,
                TeamMemberError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Task(err) => match err {
                TaskError::NotFound
                | TaskError::TeamNotFound
                | TaskError::CreatorNotFound
                | TaskError::AssigneeNotFound(_) => StatusCode::NOT_FOUND,
                TaskError::InvalidPriority(_) | TaskError::PriorityExhausted => {
                    StatusCode::BAD_REQUEST
                }
                TaskError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Permission(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(DbErr::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let error_message = if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error = %self,
                "API request failed"
            );
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            tracing::debug!(status = %status_code, error = %self, "API request rejected");
            self.to_string()
        };

        let body = ErrorBody {
            error: error_message,
        };
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(UserError::UsernameTaken).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TeamMemberError::NotPermitted).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(TeamMemberError::AlreadyMember).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TaskError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(TaskError::InvalidPriority(0)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TaskError::PriorityExhausted).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PermissionError::Empty).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DbErr::RecordNotFound("gone".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn server_errors_hide_their_cause() {
        let response = ApiError::from(DbErr::Custom("disk on fire".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn client_errors_carry_their_message() {
        let response = ApiError::from(UserError::EmailTaken).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Email is already in use");
    }
}
