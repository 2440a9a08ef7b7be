use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    team::{CreateTeam, Team, TeamWithMembers},
    team_member::{MembershipDetails, TeamMember, TeamMemberError},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    access::{self, Requirement},
    deployment::Deployment,
    error::ApiError,
    extract::{ApiJson, non_empty, parse_path_id},
    middleware::load_team_middleware,
};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub creator_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub team_id: Option<Uuid>,
    pub username: Option<String>,
    pub inviter_id: Option<Uuid>,
}

#[derive(Debug, Serialize, TS)]
pub struct InviteResponse {
    pub message: String,
    pub membership: MembershipDetails,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct MemberPermissionsRequest {
    /// Required on `PUT /teams/{teamId}/members`; taken from the path otherwise.
    pub user_id: Option<Uuid>,
    pub permissions: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize, TS)]
pub struct MemberUpdateResponse {
    pub message: String,
    pub member: MembershipDetails,
}

pub async fn get_teams(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<Vec<TeamWithMembers>>, ApiError> {
    let teams = Team::find_all_with_members(&deployment.db().pool).await?;
    Ok(ResponseJson(teams))
}

pub async fn get_team(
    Extension(team): Extension<TeamWithMembers>,
) -> Result<ResponseJson<TeamWithMembers>, ApiError> {
    Ok(ResponseJson(team))
}

pub async fn create_team(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreateTeamRequest>,
) -> Result<(StatusCode, ResponseJson<TeamWithMembers>), ApiError> {
    let name = non_empty(payload.name).ok_or("Team name is required")?;
    let creator_id = payload.creator_id.ok_or("Creator is required")?;
    let data = CreateTeam {
        name,
        description: non_empty(payload.description),
        creator_id,
    };

    let team = Team::create(&deployment.db().pool, &data).await?;
    Ok((StatusCode::CREATED, ResponseJson(team)))
}

pub async fn invite_member(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<InviteRequest>,
) -> Result<ResponseJson<InviteResponse>, ApiError> {
    let team_id = payload.team_id.ok_or("teamId is required")?;
    let username = non_empty(payload.username).ok_or("Username is required")?;
    let inviter_id = payload.inviter_id.ok_or("inviterId is required")?;

    let membership =
        TeamMember::invite(&deployment.db().pool, team_id, inviter_id, &username).await?;
    Ok(ResponseJson(InviteResponse {
        message: format!("User {username} added to the team"),
        membership,
    }))
}

async fn set_member_permissions(
    deployment: &DeploymentImpl,
    team_id: Uuid,
    user_id: Uuid,
    permissions: Option<String>,
    actor_id: Option<Uuid>,
) -> Result<ResponseJson<MemberUpdateResponse>, ApiError> {
    let permissions = non_empty(permissions).ok_or("Permissions are required")?;
    access::ensure(deployment, team_id, actor_id, Requirement::ManageMembers).await?;

    let member =
        TeamMember::update_permissions(&deployment.db().pool, team_id, user_id, &permissions)
            .await?;
    Ok(ResponseJson(MemberUpdateResponse {
        message: "Permissions updated successfully".to_string(),
        member,
    }))
}

pub async fn update_member(
    Extension(team): Extension<TeamWithMembers>,
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<MemberPermissionsRequest>,
) -> Result<ResponseJson<MemberUpdateResponse>, ApiError> {
    let user_id = payload.user_id.ok_or("userId is required")?;
    set_member_permissions(
        &deployment,
        team.id,
        user_id,
        payload.permissions,
        payload.actor_id,
    )
    .await
}

pub async fn get_member(
    State(deployment): State<DeploymentImpl>,
    Path((team_id, user_id)): Path<(String, String)>,
) -> Result<ResponseJson<MembershipDetails>, ApiError> {
    let team_id = parse_path_id(&team_id, "Team member")?;
    let user_id = parse_path_id(&user_id, "Team member")?;

    let member = TeamMember::find_details(&deployment.db().pool, team_id, user_id)
        .await?
        .ok_or(TeamMemberError::NotFound)?;
    Ok(ResponseJson(member))
}

pub async fn update_member_by_path(
    State(deployment): State<DeploymentImpl>,
    Path((team_id, user_id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<MemberPermissionsRequest>,
) -> Result<ResponseJson<MemberUpdateResponse>, ApiError> {
    let team_id = parse_path_id(&team_id, "Team member")?;
    let user_id = parse_path_id(&user_id, "Team member")?;
    set_member_permissions(
        &deployment,
        team_id,
        user_id,
        payload.permissions,
        payload.actor_id,
    )
    .await
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let team_router = Router::new()
        .route("/", get(get_team))
        .route("/members", put(update_member))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_team_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", get(get_teams).post(create_team))
        .route("/invite", post(invite_member))
        .route(
            "/{team_id}/members/{user_id}",
            get(get_member).put(update_member_by_path),
        )
        .nest("/{team_id}", team_router);

    Router::new().nest("/teams", inner)
}
