use std::str::FromStr;

use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use chrono::Utc;
use db::{
    models::{
        permission::Permission,
        task::{CreateTask, DeadlineSummary, Task, TaskFilter, TaskWithDetails, UpdateTask},
    },
    types::TaskStatus,
};
use serde::Deserialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    access::{self, Requirement},
    deployment::Deployment,
    error::ApiError,
    extract::{ApiJson, ApiQuery, non_empty, nullable, parse_datetime, required_datetime},
    middleware::load_task_middleware,
    routes::MessageResponse,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub team_id: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub assignee_id: Option<String>,
}

impl TaskQuery {
    /// `None` when an id in the query cannot match anything.
    fn into_filter(self) -> Result<Option<TaskFilter>, ApiError> {
        let status = match non_empty(self.status) {
            Some(raw) => Some(
                TaskStatus::from_str(&raw)
                    .map_err(|_| ApiError::BadRequest(format!("Invalid status '{raw}'")))?,
            ),
            None => None,
        };
        let (Some(team_id), Some(assignee_id)) =
            (query_id(self.team_id), query_id(self.assignee_id))
        else {
            return Ok(None);
        };
        Ok(Some(TaskFilter {
            team_id,
            status,
            search: non_empty(self.search),
            assignee_id,
        }))
    }
}

/// Outer `None` for an unparseable id, inner `None` when the parameter is absent.
fn query_id(raw: Option<String>) -> Option<Option<Uuid>> {
    match non_empty(raw) {
        Some(raw) => Uuid::parse_str(&raw).ok().map(Some),
        None => Some(None),
    }
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<String>,
    pub start_date: Option<String>,
    pub team_id: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub assignee_ids: Option<Vec<Uuid>>,
}

impl CreateTaskRequest {
    fn validate(self) -> Result<CreateTask, ApiError> {
        let title = non_empty(self.title).ok_or("Title is required")?;
        let deadline = non_empty(self.deadline).ok_or("Deadline is required")?;
        let deadline = required_datetime(&deadline, "deadline")?;
        let team_id = self.team_id.ok_or("Team is required")?;
        let creator_id = self.creator_id.ok_or("Creator is required")?;
        let start_date = match non_empty(self.start_date) {
            Some(raw) => Some(required_datetime(&raw, "startDate")?),
            None => None,
        };

        let mut data = CreateTask::new(team_id, creator_id, title, deadline);
        data.description = non_empty(self.description);
        data.priority = self.priority;
        data.status = self.status;
        data.start_date = start_date;
        data.assignee_ids = self.assignee_ids.unwrap_or_default();
        Ok(data)
    }
}

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(optional)]
    pub description: Option<Option<String>>,
    pub priority: Option<i32>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[ts(optional)]
    pub start_date: Option<Option<String>>,
    pub team_id: Option<Uuid>,
    pub assignee_ids: Option<Vec<Uuid>>,
    pub shift_priorities: Option<bool>,
    pub actor_id: Option<Uuid>,
}

impl UpdateTaskRequest {
    fn validate(self) -> Result<UpdateTask, ApiError> {
        let title = match self.title {
            Some(title) => Some(non_empty(Some(title)).ok_or("Title cannot be empty")?),
            None => None,
        };
        let deadline = match non_empty(self.deadline) {
            Some(raw) => Some(required_datetime(&raw, "deadline")?),
            None => None,
        };
        // Empty strings clear the nullable fields, same as null.
        let start_date = match self.start_date {
            Some(raw) => match non_empty(raw) {
                Some(raw) => Some(Some(
                    parse_datetime(&raw).ok_or("Invalid startDate")?,
                )),
                None => Some(None),
            },
            None => None,
        };

        Ok(UpdateTask {
            title,
            description: self.description.map(non_empty),
            priority: self.priority,
            status: self.status,
            deadline,
            start_date,
            team_id: self.team_id,
            assignee_ids: self.assignee_ids,
            shift_priorities: self.shift_priorities.unwrap_or(false),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorQuery {
    pub actor_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineQuery {
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
}

pub async fn get_tasks(
    State(deployment): State<DeploymentImpl>,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> Result<ResponseJson<Vec<TaskWithDetails>>, ApiError> {
    let Some(filter) = query.into_filter()? else {
        return Ok(ResponseJson(Vec::new()));
    };
    let tasks = Task::find_all(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(tasks))
}

pub async fn get_deadlines(
    State(deployment): State<DeploymentImpl>,
    ApiQuery(query): ApiQuery<DeadlineQuery>,
) -> Result<ResponseJson<DeadlineSummary>, ApiError> {
    let (Some(team_id), Some(assignee_id)) =
        (query_id(query.team_id), query_id(query.assignee_id))
    else {
        return Ok(ResponseJson(DeadlineSummary::default()));
    };
    let filter = TaskFilter {
        team_id,
        assignee_id,
        ..Default::default()
    };
    let summary = Task::deadline_summary(&deployment.db().pool, &filter, Utc::now()).await?;
    Ok(ResponseJson(summary))
}

pub async fn get_task(
    Extension(task): Extension<TaskWithDetails>,
) -> Result<ResponseJson<TaskWithDetails>, ApiError> {
    Ok(ResponseJson(task))
}

pub async fn create_task(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, ResponseJson<TaskWithDetails>), ApiError> {
    let data = payload.validate()?;
    access::ensure(
        &deployment,
        data.team_id,
        Some(data.creator_id),
        Requirement::Permission(Permission::Edit),
    )
    .await?;

    let task = Task::create(&deployment.db().pool, &data).await?;
    Ok((StatusCode::CREATED, ResponseJson(task)))
}

pub async fn update_task(
    Extension(existing): Extension<TaskWithDetails>,
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> Result<ResponseJson<TaskWithDetails>, ApiError> {
    let actor_id = payload.actor_id;
    let data = payload.validate()?;
    access::ensure(
        &deployment,
        existing.team_id,
        actor_id,
        Requirement::Permission(Permission::Edit),
    )
    .await?;
    if let Some(target_team_id) = data.team_id.filter(|team_id| *team_id != existing.team_id) {
        access::ensure(
            &deployment,
            target_team_id,
            actor_id,
            Requirement::Permission(Permission::Edit),
        )
        .await?;
    }

    let task = Task::update(&deployment.db().pool, existing.id, &data).await?;
    Ok(ResponseJson(task))
}

pub async fn delete_task(
    Extension(existing): Extension<TaskWithDetails>,
    State(deployment): State<DeploymentImpl>,
    ApiQuery(query): ApiQuery<ActorQuery>,
) -> Result<ResponseJson<MessageResponse>, ApiError> {
    let actor_id = non_empty(query.actor_id).and_then(|raw| Uuid::parse_str(&raw).ok());
    access::ensure(
        &deployment,
        existing.team_id,
        actor_id,
        Requirement::Permission(Permission::Edit),
    )
    .await?;

    let deleted = Task::delete(&deployment.db().pool, existing.id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    tracing::info!(task_id = %existing.id, team_id = %existing.team_id, "Deleted task");
    Ok(ResponseJson(MessageResponse::new("Task deleted successfully")))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let task_router = Router::new()
        .route("/", get(get_task).put(update_task).delete(delete_task))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_task_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", get(get_tasks).post(create_task))
        .route("/deadlines", get(get_deadlines))
        .nest("/{task_id}", task_router);

    Router::new().nest("/tasks", inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_with_unparseable_id_matches_nothing() {
        let query = TaskQuery {
            team_id: Some("7".to_string()),
            ..Default::default()
        };
        assert!(query.into_filter().unwrap().is_none());
    }

    #[test]
    fn query_rejects_unknown_status() {
        let query = TaskQuery {
            status: Some("DONE".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.into_filter().unwrap_err().status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn query_parses_filters() {
        let team_id = Uuid::new_v4();
        let filter = TaskQuery {
            team_id: Some(team_id.to_string()),
            status: Some("IN_PROGRESS".to_string()),
            search: Some("  ".to_string()),
            assignee_id: None,
        }
        .into_filter()
        .unwrap()
        .unwrap();
        assert_eq!(filter.team_id, Some(team_id));
        assert_eq!(filter.status, Some(TaskStatus::InProgress));
        assert_eq!(filter.search, None);
        assert_eq!(filter.assignee_id, None);
    }

    #[test]
    fn create_requires_each_field() {
        let err = CreateTaskRequest {
            title: Some("Ship".to_string()),
            description: None,
            priority: None,
            status: None,
            deadline: None,
            start_date: None,
            team_id: Some(Uuid::new_v4()),
            creator_id: Some(Uuid::new_v4()),
            assignee_ids: None,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Deadline is required"));
    }

    #[test]
    fn update_treats_empty_strings_as_clears() {
        let data: UpdateTaskRequest = serde_json::from_str(
            r#"{"description":"","startDate":"","deadline":"","shiftPriorities":true}"#,
        )
        .unwrap();
        let data = data.validate().unwrap();
        assert_eq!(data.description, Some(None));
        assert_eq!(data.start_date, Some(None));
        assert_eq!(data.deadline, None);
        assert!(data.shift_priorities);
    }

    #[test]
    fn update_leaves_absent_fields_alone() {
        let data: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        let data = data.validate().unwrap();
        assert_eq!(data.description, None);
        assert_eq!(data.start_date, None);
        assert!(!data.shift_priorities);
    }

    #[test]
    fn update_rejects_blank_title() {
        let data: UpdateTaskRequest = serde_json::from_str(r#"{"title":"  "}"#).unwrap();
        assert!(matches!(
            data.validate().unwrap_err(),
            ApiError::BadRequest(msg) if msg == "Title cannot be empty"
        ));
    }
}
