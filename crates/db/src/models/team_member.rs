use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ids,
    permission::{DEFAULT_MEMBER_PERMISSIONS, PermissionError, PermissionSet, TeamAccess},
    user::{User, UserSummary},
};
use crate::{
    entities::{team, team_member},
    types::MemberRole,
};

#[derive(Debug, Error)]
pub enum TeamMemberError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("Team member not found")]
    NotFound,
    #[error("Team not found")]
    TeamNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("User is already a member of this team")]
    AlreadyMember,
    #[error("Only team administrators can manage members")]
    NotPermitted,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub permissions: String,
    #[ts(type = "Date")]
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberWithUser {
    #[serde(flatten)]
    #[ts(flatten)]
    pub member: TeamMember,
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TeamRef {
    pub id: Uuid,
    pub name: String,
}

/// A membership with both sides resolved, as returned by invite and member endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDetails {
    #[serde(flatten)]
    #[ts(flatten)]
    pub member: TeamMember,
    pub user: UserSummary,
    pub team: TeamRef,
}

/// One entry of the team list returned on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct UserTeam {
    pub id: Uuid,
    pub name: String,
    pub role: MemberRole,
}

impl TeamMember {
    fn from_model(model: team_member::Model, team_id: Uuid, user_id: Uuid) -> Self {
        Self {
            team_id,
            user_id,
            role: model.role,
            permissions: model.permissions,
            joined_at: model.joined_at.into(),
        }
    }

    pub fn to_access(&self, is_creator: bool) -> TeamAccess {
        TeamAccess::new(is_creator, Some(self.role), &self.permissions)
    }

    async fn model<C: ConnectionTrait>(
        db: &C,
        team_row_id: i64,
        user_row_id: i64,
    ) -> Result<Option<team_member::Model>, DbErr> {
        team_member::Entity::find_by_id((team_row_id, user_row_id))
            .one(db)
            .await
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let (Some(team_row_id), Some(user_row_id)) = (
            ids::team_id_by_uuid(db, team_id).await?,
            ids::user_id_by_uuid(db, user_id).await?,
        ) else {
            return Ok(None);
        };
        let record = Self::model(db, team_row_id, user_row_id).await?;
        Ok(record.map(|model| Self::from_model(model, team_id, user_id)))
    }

    pub async fn find_details<C: ConnectionTrait>(
        db: &C,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MembershipDetails>, DbErr> {
        let Some(team_model) = team::Entity::find()
            .filter(team::Column::Uuid.eq(team_id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(None);
        };
        let Some(model) = Self::model(db, team_model.id, user_row_id).await? else {
            return Ok(None);
        };
        Self::details(db, model, &team_model).await.map(Some)
    }

    async fn details<C: ConnectionTrait>(
        db: &C,
        model: team_member::Model,
        team_model: &team::Model,
    ) -> Result<MembershipDetails, DbErr> {
        let user = User::summaries_for(db, &[model.user_id])
            .await?
            .remove(&model.user_id)
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(MembershipDetails {
            member: Self::from_model(model, team_model.uuid, user.id),
            user,
            team: TeamRef {
                id: team_model.uuid,
                name: team_model.name.clone(),
            },
        })
    }

    /// Members of one team with their user summaries, oldest membership first.
    pub async fn find_by_team_row_id<C: ConnectionTrait>(
        db: &C,
        team_row_id: i64,
        team_id: Uuid,
    ) -> Result<Vec<TeamMemberWithUser>, DbErr> {
        let models = team_member::Entity::find()
            .filter(team_member::Column::TeamId.eq(team_row_id))
            .order_by_asc(team_member::Column::JoinedAt)
            .all(db)
            .await?;
        let user_row_ids: Vec<i64> = models.iter().map(|model| model.user_id).collect();
        let mut users = User::summaries_for(db, &user_row_ids).await?;

        let mut members = Vec::with_capacity(models.len());
        for model in models {
            let Some(user) = users.remove(&model.user_id) else {
                continue;
            };
            members.push(TeamMemberWithUser {
                member: Self::from_model(model, team_id, user.id),
                user,
            });
        }
        Ok(members)
    }

    pub async fn find_teams_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<Vec<UserTeam>, DbErr> {
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(Vec::new());
        };
        let memberships = team_member::Entity::find()
            .filter(team_member::Column::UserId.eq(user_row_id))
            .order_by_asc(team_member::Column::JoinedAt)
            .all(db)
            .await?;
        let team_row_ids: Vec<i64> = memberships.iter().map(|model| model.team_id).collect();
        let teams: HashMap<i64, team::Model> = team::Entity::find()
            .filter(team::Column::Id.is_in(team_row_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model))
            .collect();

        Ok(memberships
            .into_iter()
            .filter_map(|membership| {
                teams.get(&membership.team_id).map(|team| UserTeam {
                    id: team.uuid,
                    name: team.name.clone(),
                    role: membership.role,
                })
            })
            .collect())
    }

    /// Resolves what `user_id` may do in `team_id`; unknown teams or users yield an outsider.
    pub async fn access<C: ConnectionTrait>(
        db: &C,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<TeamAccess, DbErr> {
        let Some(team_model) = team::Entity::find()
            .filter(team::Column::Uuid.eq(team_id))
            .one(db)
            .await?
        else {
            return Ok(TeamAccess::outsider());
        };
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(TeamAccess::outsider());
        };
        let is_creator = team_model.creator_id == user_row_id;
        let access = match Self::model(db, team_model.id, user_row_id).await? {
            Some(model) => TeamAccess::new(is_creator, Some(model.role), &model.permissions),
            None => TeamAccess::new(is_creator, None, ""),
        };
        Ok(access)
    }

    pub(crate) async fn insert<C: ConnectionTrait>(
        db: &C,
        team_row_id: i64,
        user_row_id: i64,
        role: MemberRole,
        permissions: &str,
    ) -> Result<team_member::Model, DbErr> {
        let active = team_member::ActiveModel {
            team_id: Set(team_row_id),
            user_id: Set(user_row_id),
            role: Set(role),
            permissions: Set(permissions.to_string()),
            joined_at: Set(Utc::now().into()),
        };
        active.insert(db).await
    }

    /// Adds `username` to the team as a plain member. Only the creator or an admin may invite.
    pub async fn invite<C: ConnectionTrait>(
        db: &C,
        team_id: Uuid,
        inviter_id: Uuid,
        username: &str,
    ) -> Result<MembershipDetails, TeamMemberError> {
        let team_model = team::Entity::find()
            .filter(team::Column::Uuid.eq(team_id))
            .one(db)
            .await?
            .ok_or(TeamMemberError::TeamNotFound)?;
        let inviter = Self::access(db, team_id, inviter_id).await?;
        if !inviter.can_manage_members() {
            return Err(TeamMemberError::NotPermitted);
        }
        let invitee = User::find_by_username(db, username)
            .await?
            .ok_or(TeamMemberError::UserNotFound)?;
        let invitee_row_id = ids::user_id_by_uuid(db, invitee.id)
            .await?
            .ok_or(TeamMemberError::UserNotFound)?;

        if Self::model(db, team_model.id, invitee_row_id).await?.is_some() {
            return Err(TeamMemberError::AlreadyMember);
        }

        let model = Self::insert(
            db,
            team_model.id,
            invitee_row_id,
            MemberRole::Member,
            DEFAULT_MEMBER_PERMISSIONS,
        )
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => TeamMemberError::AlreadyMember,
            _ => TeamMemberError::Database(err),
        })?;

        tracing::info!(
            team_id = %team_id,
            user_id = %invitee.id,
            inviter_id = %inviter_id,
            "Added team member"
        );
        Ok(Self::details(db, model, &team_model).await?)
    }

    /// Replaces the permission list of one membership after validating every token.
    pub async fn update_permissions<C: ConnectionTrait>(
        db: &C,
        team_id: Uuid,
        user_id: Uuid,
        permissions: &str,
    ) -> Result<MembershipDetails, TeamMemberError> {
        PermissionSet::parse(permissions)?;

        let team_model = team::Entity::find()
            .filter(team::Column::Uuid.eq(team_id))
            .one(db)
            .await?
            .ok_or(TeamMemberError::NotFound)?;
        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(TeamMemberError::NotFound)?;
        let record = Self::model(db, team_model.id, user_row_id)
            .await?
            .ok_or(TeamMemberError::NotFound)?;

        let mut active: team_member::ActiveModel = record.into();
        active.permissions = Set(permissions.trim().to_string());
        let updated = active.update(db).await?;

        tracing::debug!(team_id = %team_id, user_id = %user_id, "Updated member permissions");
        Ok(Self::details(db, updated, &team_model).await?)
    }
}
