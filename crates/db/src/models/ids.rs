use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{task, team, user};

pub async fn user_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Uuid)
        .filter(user::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn team_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    team::Entity::find()
        .select_only()
        .column(team::Column::Id)
        .filter(team::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn team_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    team::Entity::find()
        .select_only()
        .column(team::Column::Uuid)
        .filter(team::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn task_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    task::Entity::find()
        .select_only()
        .column(task::Column::Id)
        .filter(task::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

/// Resolves a batch of user uuids, failing on the first one that is unknown.
pub async fn user_ids_by_uuids<C: ConnectionTrait>(
    db: &C,
    uuids: &[Uuid],
) -> Result<Result<Vec<i64>, Uuid>, DbErr> {
    let mut ids = Vec::with_capacity(uuids.len());
    for uuid in uuids {
        match user_id_by_uuid(db, *uuid).await? {
            Some(id) => ids.push(id),
            None => return Ok(Err(*uuid)),
        }
    }
    Ok(Ok(ids))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::{
        task::{CreateTask, Task},
        team::{CreateTeam, Team},
        test_util::setup_db,
        user::{CreateUser, User},
    };

    #[tokio::test]
    async fn ids_roundtrip_and_uuid_resolution() {
        let db = setup_db().await;

        let user = User::create(
            &db,
            &CreateUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                name: Some("Alice".to_string()),
            },
        )
        .await
        .unwrap();
        let user_row_id = user_id_by_uuid(&db, user.id)
            .await
            .unwrap()
            .expect("user row id");
        assert_eq!(
            user_uuid_by_id(&db, user_row_id).await.unwrap(),
            Some(user.id)
        );

        let team = Team::create(
            &db,
            &CreateTeam {
                name: "Core".to_string(),
                description: None,
                creator_id: user.id,
            },
        )
        .await
        .unwrap();
        let team_row_id = team_id_by_uuid(&db, team.id)
            .await
            .unwrap()
            .expect("team row id");
        assert_eq!(
            team_uuid_by_id(&db, team_row_id).await.unwrap(),
            Some(team.id)
        );

        let task = Task::create(
            &db,
            &CreateTask::new(
                team.id,
                user.id,
                "Ship it".to_string(),
                Utc::now() + Duration::days(2),
            ),
        )
        .await
        .unwrap();
        assert!(task_id_by_uuid(&db, task.id).await.unwrap().is_some());

        assert_eq!(task_id_by_uuid(&db, Uuid::new_v4()).await.unwrap(), None);

        let missing = Uuid::new_v4();
        assert_eq!(
            user_ids_by_uuids(&db, &[user.id, missing]).await.unwrap(),
            Err(missing)
        );
        assert_eq!(
            user_ids_by_uuids(&db, &[user.id]).await.unwrap(),
            Ok(vec![user_row_id])
        );
    }
}
