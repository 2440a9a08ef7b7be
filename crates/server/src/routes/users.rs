use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::{User, UserWithCounts};

use crate::{
    DeploymentImpl, deployment::Deployment, error::ApiError, extract::ApiJson,
    routes::auth::RegisterRequest,
};

pub async fn get_users(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<Vec<UserWithCounts>>, ApiError> {
    let users = User::find_all_with_counts(&deployment.db().pool).await?;
    Ok(ResponseJson(users))
}

pub async fn create_user(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, ResponseJson<User>), ApiError> {
    let data = payload.validate()?;
    let user = User::create(&deployment.db().pool, &data).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Created user");
    Ok((StatusCode::CREATED, ResponseJson(user)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/users", get(get_users).post(create_user))
}
