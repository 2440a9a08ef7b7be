//! Team permission checks applied when `access_control.mode` is `ENFORCE`.

use db::models::{
    permission::{Permission, TeamAccess},
    team_member::TeamMember,
};
use uuid::Uuid;

use crate::{DeploymentImpl, deployment::Deployment, error::ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Permission(Permission),
    ManageMembers,
}

impl Requirement {
    fn allows(self, access: &TeamAccess) -> bool {
        match self {
            Requirement::Permission(permission) => access.can(permission),
            Requirement::ManageMembers => access.can_manage_members(),
        }
    }

    fn denial(self) -> &'static str {
        match self {
            Requirement::Permission(Permission::Edit) => {
                "You do not have permission to edit tasks in this team"
            }
            Requirement::Permission(Permission::View) => {
                "You do not have permission to view this team"
            }
            Requirement::Permission(Permission::Comment) => {
                "You do not have permission to comment in this team"
            }
            Requirement::ManageMembers => "Only team administrators can manage members",
        }
    }
}

pub async fn enforced(deployment: &DeploymentImpl) -> bool {
    deployment.config().read().await.access_control.enforced()
}

/// Rejects `actor_id` unless it meets `requirement` in `team_id`. Does nothing
/// unless enforcement is switched on.
pub async fn ensure(
    deployment: &DeploymentImpl,
    team_id: Uuid,
    actor_id: Option<Uuid>,
    requirement: Requirement,
) -> Result<(), ApiError> {
    if !enforced(deployment).await {
        return Ok(());
    }
    let actor_id = actor_id.ok_or(ApiError::BadRequest("actorId is required".to_string()))?;
    let access = TeamMember::access(&deployment.db().pool, team_id, actor_id).await?;
    if requirement.allows(&access) {
        Ok(())
    } else {
        tracing::debug!(%team_id, %actor_id, ?requirement, "Access denied");
        Err(ApiError::Forbidden(requirement.denial().to_string()))
    }
}
