use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{DeploymentImpl, error::ApiError, routes};

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::tasks::router(&deployment))
        .merge(routes::teams::router(&deployment));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use config::{AccessControlMode, Config};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{deployment::Deployment, test_support::test_deployment};

    async fn setup(config: Config) -> (TempDir, Router) {
        let (temp_root, deployment) = test_deployment(config).await;
        (temp_root, super::router(deployment))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(app: &Router, username: &str) -> String {
        let (status, user) = send(
            app,
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "name": username,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        user["id"].as_str().unwrap().to_string()
    }

    async fn create_team(app: &Router, creator_id: &str) -> String {
        let (status, team) = send(
            app,
            Method::POST,
            "/api/teams",
            Some(json!({ "name": "Разработка", "creatorId": creator_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        team["id"].as_str().unwrap().to_string()
    }

    async fn create_task(app: &Router, team_id: &str, creator_id: &str, title: &str) -> Value {
        let (status, task) = send(
            app,
            Method::POST,
            "/api/tasks",
            Some(json!({
                "title": title,
                "deadline": "2030-01-15",
                "teamId": team_id,
                "creatorId": creator_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        task
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_temp_root, app) = setup(Config::default()).await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn unknown_routes_return_json_not_found() {
        let (_temp_root, app) = setup(Config::default()).await;
        let (status, body) = send(&app, Method::GET, "/api/nothing-here", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn register_then_login_lists_teams() {
        let (_temp_root, app) = setup(Config::default()).await;
        let user_id = register(&app, "ivan").await;
        let team_id = create_team(&app, &user_id).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "ivan" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user_id.as_str());
        assert_eq!(body["teams"][0]["id"], team_id.as_str());
        assert_eq!(body["teams"][0]["role"], "admin");
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_missing_fields() {
        let (_temp_root, app) = setup(Config::default()).await;
        register(&app, "ivan").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "ivan", "email": "other@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username is already taken");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "maria" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email is required");
    }

    #[tokio::test]
    async fn login_with_unknown_username_is_not_found() {
        let (_temp_root, app) = setup(Config::default()).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "ghost" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (_temp_root, app) = setup(Config::default()).await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn users_endpoint_creates_and_counts() {
        let (_temp_root, app) = setup(Config::default()).await;
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "username": "olga", "email": "olga@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = created["id"].as_str().unwrap().to_string();

        let team_id = create_team(&app, &user_id).await;
        create_task(&app, &team_id, &user_id, "Отчёт").await;

        let (status, users) = send(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users[0]["_count"]["createdTasks"], 1);
        assert_eq!(users[0]["_count"]["assignedTasks"], 0);
    }

    #[tokio::test]
    async fn tasks_get_default_priorities_and_shift_on_completion() {
        let (_temp_root, app) = setup(Config::default()).await;
        let user_id = register(&app, "ivan").await;
        let team_id = create_team(&app, &user_id).await;

        let first = create_task(&app, &team_id, &user_id, "Первая").await;
        let second = create_task(&app, &team_id, &user_id, "Вторая").await;
        let third = create_task(&app, &team_id, &user_id, "Третья").await;
        assert_eq!(first["priority"], 1);
        assert_eq!(second["priority"], 2);
        assert_eq!(third["priority"], 3);
        assert_eq!(first["status"], "PENDING");
        assert_eq!(first["creator"]["username"], "ivan");

        let uri = format!("/api/tasks/{}", first["id"].as_str().unwrap());
        let (status, completed) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({ "status": "COMPLETED", "shiftPriorities": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(completed["status"], "COMPLETED");

        let (status, tasks) = send(
            &app,
            Method::GET,
            &format!("/api/tasks?teamId={team_id}&status=PENDING"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let priorities: Vec<i64> = tasks
            .as_array()
            .unwrap()
            .iter()
            .map(|task| task["priority"].as_i64().unwrap())
            .collect();
        assert_eq!(priorities, vec![1, 2]);
        assert_eq!(tasks[0]["id"], second["id"]);
    }

    #[tokio::test]
    async fn task_create_validates_fields() {
        let (_temp_root, app) = setup(Config::default()).await;
        let user_id = register(&app, "ivan").await;
        let team_id = create_team(&app, &user_id).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(json!({ "deadline": "2030-01-15", "teamId": team_id, "creatorId": user_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title is required");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(json!({
                "title": "Zero",
                "deadline": "2030-01-15",
                "priority": 0,
                "teamId": team_id,
                "creatorId": user_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(json!({
                "title": "Nowhere",
                "deadline": "2030-01-15",
                "teamId": Uuid::new_v4(),
                "creatorId": user_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_task_ids_are_not_found() {
        let (_temp_root, app) = setup(Config::default()).await;

        let (status, body) = send(&app, Method::GET, "/api/tasks/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Task not found");

        let uri = format!("/api/tasks/{}", Uuid::new_v4());
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_task_confirms_and_removes() {
        let (_temp_root, app) = setup(Config::default()).await;
        let user_id = register(&app, "ivan").await;
        let team_id = create_team(&app, &user_id).await;
        let task = create_task(&app, &team_id, &user_id, "Удалить").await;
        let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Task deleted successfully" }));

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deadlines_split_overdue_and_due_soon() {
        let (_temp_root, app) = setup(Config::default()).await;
        let user_id = register(&app, "ivan").await;
        let team_id = create_team(&app, &user_id).await;
        for (title, deadline) in [("Просрочена", "2001-01-01"), ("Позже", "2999-01-01")] {
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/tasks",
                Some(json!({
                    "title": title,
                    "deadline": deadline,
                    "teamId": team_id,
                    "creatorId": user_id,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/tasks/deadlines?teamId={team_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overdue"].as_array().unwrap().len(), 1);
        assert_eq!(body["overdue"][0]["title"], "Просрочена");
        assert!(body["dueSoon"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invite_requires_team_admin() {
        let (_temp_root, app) = setup(Config::default()).await;
        let owner_id = register(&app, "ivan").await;
        let outsider_id = register(&app, "maria").await;
        register(&app, "petr").await;
        let team_id = create_team(&app, &owner_id).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "petr", "inviterId": outsider_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "petr", "inviterId": owner_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["membership"]["user"]["username"], "petr");
        assert_eq!(body["membership"]["role"], "member");
        assert_eq!(body["membership"]["permissions"], "view");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "petr", "inviterId": owner_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User is already a member of this team");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "ghost", "inviterId": owner_id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn member_permissions_are_validated() {
        let (_temp_root, app) = setup(Config::default()).await;
        let owner_id = register(&app, "ivan").await;
        let member_id = register(&app, "petr").await;
        let team_id = create_team(&app, &owner_id).await;
        send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "petr", "inviterId": owner_id })),
        )
        .await;

        let uri = format!("/api/teams/{team_id}/members/{member_id}");
        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({ "permissions": "fly" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/teams/{team_id}/members"),
            Some(json!({ "userId": member_id, "permissions": "view,edit" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member"]["permissions"], "view,edit");
        assert!(body["message"].is_string());

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permissions"], "view,edit");
        assert_eq!(body["team"]["id"], team_id.as_str());

        let stranger = format!("/api/teams/{team_id}/members/{}", Uuid::new_v4());
        let (status, _) = send(&app, Method::GET, &stranger, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enforce_mode_checks_actor_permissions() {
        let mut config = Config::default();
        config.access_control.mode = AccessControlMode::Enforce;
        let (_temp_root, deployment) = test_deployment(config).await;
        assert!(deployment.config().read().await.access_control.enforced());
        let app = super::router(deployment);

        let owner_id = register(&app, "ivan").await;
        let viewer_id = register(&app, "petr").await;
        let team_id = create_team(&app, &owner_id).await;
        send(
            &app,
            Method::POST,
            "/api/teams/invite",
            Some(json!({ "teamId": team_id, "username": "petr", "inviterId": owner_id })),
        )
        .await;
        let task = create_task(&app, &team_id, &owner_id, "Закрыть релиз").await;
        let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "title": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "actorId is required");

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({ "title": "x", "actorId": viewer_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(json!({
                "title": "Чужая",
                "deadline": "2030-01-15",
                "teamId": team_id,
                "creatorId": viewer_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({ "title": "Закрыть релиз 1.0", "actorId": owner_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Закрыть релиз 1.0");

        // Moving a task needs edit in the target team as well.
        let outsider_id = register(&app, "olga").await;
        let foreign_team_id = create_team(&app, &outsider_id).await;
        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({ "teamId": foreign_team_id, "actorId": owner_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(body["teamId"], team_id.as_str());

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("{uri}?actorId={viewer_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/teams/{team_id}/members/{viewer_id}"),
            Some(json!({ "permissions": "view,edit", "actorId": viewer_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
