//! Demo dataset for local development.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, TransactionSession, TransactionTrait};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::user,
    models::{
        ids,
        permission::ADMIN_PERMISSIONS,
        task::{CreateTask, Task, TaskError},
        team::{CreateTeam, Team, TeamError},
        team_member::TeamMember,
        user::{CreateUser, User, UserError},
    },
    types::{MemberRole, TaskStatus},
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("Invalid seed date {0}")]
    InvalidDate(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub teams: usize,
    pub tasks: usize,
}

struct SeedUser {
    username: &'static str,
    email: &'static str,
    name: &'static str,
}

const USERS: [SeedUser; 4] = [
    SeedUser {
        username: "admin",
        email: "admin@example.com",
        name: "Администратор",
    },
    SeedUser {
        username: "developer1",
        email: "dev1@example.com",
        name: "Разработчик 1",
    },
    SeedUser {
        username: "developer2",
        email: "dev2@example.com",
        name: "Разработчик 2",
    },
    SeedUser {
        username: "designer1",
        email: "designer1@example.com",
        name: "Дизайнер 1",
    },
];

struct SeedTask {
    title: &'static str,
    description: &'static str,
    priority: i32,
    status: TaskStatus,
    deadline: &'static str,
    assignee: usize,
}

const DEV_TASKS: [SeedTask; 3] = [
    SeedTask {
        title: "Критический баг в системе аутентификации",
        description: "Пользователи не могут войти в систему при определенных условиях",
        priority: 1,
        status: TaskStatus::InProgress,
        deadline: "2024-12-20",
        assignee: 1,
    },
    SeedTask {
        title: "Оптимизация базы данных",
        description: "Улучшить производительность запросов к базе данных",
        priority: 2,
        status: TaskStatus::Pending,
        deadline: "2024-12-25",
        assignee: 2,
    },
    SeedTask {
        title: "Рефакторинг компонента авторизации",
        description: "Переписать компонент авторизации с использованием новых практик",
        priority: 3,
        status: TaskStatus::Pending,
        deadline: "2024-12-30",
        assignee: 1,
    },
];

const DESIGN_TASKS: [SeedTask; 2] = [
    SeedTask {
        title: "Дизайн новой страницы настроек",
        description: "Создать макет страницы настроек пользователя",
        priority: 1,
        status: TaskStatus::Pending,
        deadline: "2024-12-22",
        assignee: 3,
    },
    SeedTask {
        title: "Обновление гайдлайнов дизайна",
        description: "Актуализировать дизайн-систему и гайдлайны",
        priority: 2,
        status: TaskStatus::Pending,
        deadline: "2025-01-15",
        assignee: 3,
    },
];

fn midnight_utc(date: &'static str) -> Result<DateTime<Utc>, SeedError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or(SeedError::InvalidDate(date))
}

/// Inserts the demo users, teams and tasks unless the store already has users.
///
/// Returns `None` when seeding was skipped.
pub async fn seed<C>(db: &C) -> Result<Option<SeedReport>, SeedError>
where
    C: ConnectionTrait + TransactionTrait,
{
    if user::Entity::find().count(db).await? > 0 {
        tracing::info!("Store already has users, skipping seed");
        return Ok(None);
    }

    let tx = db.begin().await?;

    let mut users = Vec::with_capacity(USERS.len());
    for seed_user in &USERS {
        let created = User::create(
            &tx,
            &CreateUser {
                username: seed_user.username.to_string(),
                email: seed_user.email.to_string(),
                name: Some(seed_user.name.to_string()),
            },
        )
        .await?;
        users.push(created);
    }

    let dev_team = Team::create(
        &tx,
        &CreateTeam {
            name: "Команда разработки".to_string(),
            description: Some("Основная команда разработки продукта".to_string()),
            creator_id: users[0].id,
        },
    )
    .await?;
    add_member(&tx, dev_team.id, users[1].id, "view,edit").await?;
    add_member(&tx, dev_team.id, users[2].id, "view").await?;

    let design_team = Team::create(
        &tx,
        &CreateTeam {
            name: "Команда дизайна".to_string(),
            description: Some("Команда UI/UX дизайна".to_string()),
            creator_id: users[3].id,
        },
    )
    .await?;

    let mut tasks = 0;
    for (team_id, creator, seed_tasks) in [
        (dev_team.id, &users[0], &DEV_TASKS[..]),
        (design_team.id, &users[3], &DESIGN_TASKS[..]),
    ] {
        for seed_task in seed_tasks {
            let mut data = CreateTask::new(
                team_id,
                creator.id,
                seed_task.title.to_string(),
                midnight_utc(seed_task.deadline)?,
            );
            data.description = Some(seed_task.description.to_string());
            data.priority = Some(seed_task.priority);
            data.status = Some(seed_task.status);
            data.assignee_ids = vec![users[seed_task.assignee].id];
            Task::create(&tx, &data).await?;
            tasks += 1;
        }
    }

    tx.commit().await?;

    let report = SeedReport {
        users: users.len(),
        teams: 2,
        tasks,
    };
    tracing::info!(
        users = report.users,
        teams = report.teams,
        tasks = report.tasks,
        "Seeded demo data"
    );
    Ok(Some(report))
}

async fn add_member<C: ConnectionTrait>(
    db: &C,
    team_id: Uuid,
    user_id: Uuid,
    permissions: &str,
) -> Result<(), DbErr> {
    let team_row_id = ids::team_id_by_uuid(db, team_id)
        .await?
        .ok_or(DbErr::RecordNotFound("Team not found".to_string()))?;
    let user_row_id = ids::user_id_by_uuid(db, user_id)
        .await?
        .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
    let role = if permissions == ADMIN_PERMISSIONS {
        MemberRole::Admin
    } else {
        MemberRole::Member
    };
    TeamMember::insert(db, team_row_id, user_row_id, role, permissions).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        permission::Permission,
        task::{DeadlineState, TaskFilter},
        test_util::setup_db,
    };

    #[tokio::test]
    async fn seed_populates_once() {
        let db = setup_db().await;

        let report = seed(&db).await.unwrap().unwrap();
        assert_eq!(
            report,
            SeedReport {
                users: 4,
                teams: 2,
                tasks: 5
            }
        );
        assert_eq!(seed(&db).await.unwrap(), None);

        let teams = Team::find_all_with_members(&db).await.unwrap();
        assert_eq!(teams.len(), 2);
        let dev_team = teams
            .iter()
            .find(|team| team.name == "Команда разработки")
            .unwrap();
        assert_eq!(dev_team.members.len(), 3);
        assert_eq!(dev_team.counts.tasks, 3);

        let developer1 = User::find_by_username(&db, "developer1")
            .await
            .unwrap()
            .unwrap();
        let access = TeamMember::access(&db, dev_team.id, developer1.id)
            .await
            .unwrap();
        assert!(access.can(Permission::Edit));
        assert!(!access.can_manage_members());

        let tasks = Task::find_all(
            &db,
            &TaskFilter {
                team_id: Some(dev_team.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let priorities: Vec<_> = tasks.iter().map(|task| task.priority).collect();
        assert_eq!(priorities, [1, 2, 3]);
        assert_eq!(tasks[0].assignments[0].user.username, "developer1");

        let deadline = midnight_utc("2024-12-20").unwrap();
        assert_eq!(tasks[0].deadline, deadline);
        assert_eq!(
            DeadlineState::classify(deadline, midnight_utc("2024-12-18").unwrap()),
            DeadlineState::DueSoon
        );
    }
}
