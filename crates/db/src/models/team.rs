use chrono::{DateTime, Utc};
use sea_orm::{
    TransactionSession,
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ids,
    permission::ADMIN_PERMISSIONS,
    team_member::{TeamMember, TeamMemberWithUser},
    user::{User, UserSummary},
};
use crate::{
    entities::{task, team},
    types::MemberRole,
};

#[derive(Debug, Error)]
pub enum TeamError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Team not found")]
    NotFound,
    #[error("Creator not found")]
    CreatorNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithMembers {
    #[serde(flatten)]
    #[ts(flatten)]
    pub team: Team,
    pub creator: Option<UserSummary>,
    pub members: Vec<TeamMemberWithUser>,
    #[serde(rename = "_count")]
    pub counts: TeamCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TeamCounts {
    pub tasks: u64,
}

impl std::ops::Deref for TeamWithMembers {
    type Target = Team;
    fn deref(&self) -> &Self::Target {
        &self.team
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTeam {
    pub name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
}

impl Team {
    pub(crate) async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: team::Model,
    ) -> Result<Self, DbErr> {
        let creator_id = ids::user_uuid_by_id(db, model.creator_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(Self::from_parts(model, creator_id))
    }

    pub(crate) fn from_parts(model: team::Model, creator_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            name: model.name,
            description: model.description,
            creator_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn with_members<C: ConnectionTrait>(
        db: &C,
        model: team::Model,
    ) -> Result<TeamWithMembers, DbErr> {
        let row_id = model.id;
        let creator = User::summaries_for(db, &[model.creator_id])
            .await?
            .remove(&model.creator_id);
        let team = Self::from_model(db, model).await?;
        let members = TeamMember::find_by_team_row_id(db, row_id, team.id).await?;
        let tasks = task::Entity::find()
            .filter(task::Column::TeamId.eq(row_id))
            .count(db)
            .await?;
        Ok(TeamWithMembers {
            team,
            creator,
            members,
            counts: TeamCounts { tasks },
        })
    }

    pub async fn find_all_with_members<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<TeamWithMembers>, DbErr> {
        let models = team::Entity::find()
            .order_by_desc(team::Column::CreatedAt)
            .order_by_desc(team::Column::Id)
            .all(db)
            .await?;

        let mut teams = Vec::with_capacity(models.len());
        for model in models {
            teams.push(Self::with_members(db, model).await?);
        }
        Ok(teams)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = team::Entity::find()
            .filter(team::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_with_members<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<TeamWithMembers>, DbErr> {
        let record = team::Entity::find()
            .filter(team::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::with_members(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Creates the team and makes its creator the first admin member in one transaction.
    pub async fn create<C>(db: &C, data: &CreateTeam) -> Result<TeamWithMembers, TeamError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let tx = db.begin().await?;

        let creator_row_id = ids::user_id_by_uuid(&tx, data.creator_id)
            .await?
            .ok_or(TeamError::CreatorNotFound)?;

        let now = Utc::now();
        let active = team::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            name: Set(data.name.clone()),
            description: Set(data.description.clone()),
            creator_id: Set(creator_row_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(&tx).await?;

        TeamMember::insert(
            &tx,
            model.id,
            creator_row_id,
            MemberRole::Admin,
            ADMIN_PERMISSIONS,
        )
        .await?;

        let team = Self::with_members(&tx, model).await?;
        tx.commit().await?;

        tracing::info!(team_id = %team.id, creator_id = %data.creator_id, "Created team");
        Ok(team)
    }
}
