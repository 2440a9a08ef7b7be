use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use db::models::{
    team_member::{TeamMember, UserTeam},
    user::{CreateUser, User, UserError},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    DeploymentImpl,
    deployment::Deployment,
    error::ApiError,
    extract::{ApiJson, non_empty},
};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl RegisterRequest {
    /// Shared by registration and `POST /api/users`.
    pub fn validate(self) -> Result<CreateUser, ApiError> {
        let username = non_empty(self.username).ok_or("Username is required")?;
        let email = non_empty(self.email).ok_or("Email is required")?;
        Ok(CreateUser {
            username,
            email,
            name: non_empty(self.name),
        })
    }
}

#[derive(Debug, Deserialize, TS)]
pub struct LoginRequest {
    pub username: Option<String>,
}

/// The signed-in user together with the teams they belong to.
#[derive(Debug, Serialize, TS)]
pub struct AuthResponse {
    #[serde(flatten)]
    #[ts(flatten)]
    pub user: User,
    pub teams: Vec<UserTeam>,
}

pub async fn register(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<ResponseJson<AuthResponse>, ApiError> {
    let data = payload.validate()?;
    let user = User::create(&deployment.db().pool, &data).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Registered user");
    Ok(ResponseJson(AuthResponse {
        user,
        teams: Vec::new(),
    }))
}

pub async fn login(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<ResponseJson<AuthResponse>, ApiError> {
    let username = non_empty(payload.username).ok_or("Username is required")?;
    let pool = &deployment.db().pool;

    let user = User::find_by_username(pool, &username)
        .await?
        .ok_or(UserError::NotFound)?;
    let teams = TeamMember::find_teams_for_user(pool, user.id).await?;

    tracing::debug!(user_id = %user.id, teams = teams.len(), "User logged in");
    Ok(ResponseJson(AuthResponse { user, teams }))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}
