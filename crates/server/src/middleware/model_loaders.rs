use std::{fmt::Display, future::Future};

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use db::{
    DBService,
    models::{task::Task, team::Team},
};
use uuid::Uuid;

use crate::{deployment::Deployment, error::ApiError, extract::parse_path_id};

pub trait ModelLoaderDeps {
    fn db_service(&self) -> &DBService;
}

impl<D> ModelLoaderDeps for D
where
    D: Deployment,
{
    fn db_service(&self) -> &DBService {
        self.db()
    }
}

async fn fetch_model_or_error<M, E, Fut>(
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<M, ApiError>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::debug!("{model_name} {model_id} not found");
            Err(ApiError::NotFound(format!("{model_name} not found")))
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(ApiError::Internal(format!(
                "Failed to fetch {model_name} {model_id}"
            )))
        }
    }
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<Response, ApiError>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_error(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

/// Loads the task named by the path into a `TaskWithDetails` extension.
pub async fn load_task_middleware<S>(
    State(deployment): State<S>,
    Path(task_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    let task_id = parse_path_id(&task_id, "Task")?;
    load_request_extension(
        request,
        next,
        "Task",
        task_id,
        Task::find_with_details(&deployment.db_service().pool, task_id),
    )
    .await
}

/// Loads the team named by the path into a `TeamWithMembers` extension.
pub async fn load_team_middleware<S>(
    State(deployment): State<S>,
    Path(team_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    let team_id = parse_path_id(&team_id, "Team")?;
    load_request_extension(
        request,
        next,
        "Team",
        team_id,
        Team::find_with_members(&deployment.db_service().pool, team_id),
    )
    .await
}
