use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{self, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
};
use platform_authz::AuthorizationResolver;
use platform_db::{DbPool, SeaOrmMembershipLookup};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    auth::{AuthConfig, authenticate},
    config::AppConfig,
    gate::guarded,
    routes::{members, projects, tasks},
};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub resolver: Arc<AuthorizationResolver>,
    pub auth: Arc<AuthConfig>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<AppConfig>) -> Self {
        let lookup = SeaOrmMembershipLookup::new(db.clone());
        Self {
            resolver: Arc::new(AuthorizationResolver::new(Arc::new(lookup))),
            auth: Arc::new(AuthConfig::new(
                &config.token_secret,
                config.token_ttl_minutes,
            )),
            db,
            config,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "tracker server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(allow_origin)
}

/// Every project-scoped route group sits behind its own permission key.
fn project_routes(state: &AppState) -> Router<AppState> {
    let resolver = &state.resolver;
    let project = guarded(
        Router::new().route(
            "/projects/{project_id}",
            get(projects::show)
                .put(projects::update)
                .delete(projects::destroy),
        ),
        resolver,
        "project.id",
    );
    let member_list = guarded(
        Router::new().route(
            "/projects/{project_id}/members",
            get(members::index).post(members::create),
        ),
        resolver,
        "project.member.all",
    );
    let member = guarded(
        Router::new().route(
            "/projects/{project_id}/members/{user_id}",
            get(members::show)
                .put(members::update)
                .delete(members::destroy),
        ),
        resolver,
        "project.member.id",
    );
    let task_list = guarded(
        Router::new().route(
            "/projects/{project_id}/tasks",
            get(tasks::index).post(tasks::create),
        ),
        resolver,
        "project.task.all",
    );
    let task = guarded(
        Router::new().route(
            "/projects/{project_id}/tasks/{task_id}",
            get(tasks::show).put(tasks::update).delete(tasks::destroy),
        ),
        resolver,
        "project.task.id",
    );
    project
        .merge(member_list)
        .merge(member)
        .merge(task_list)
        .merge(task)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/projects", get(projects::index).post(projects::create))
        .merge(project_routes(&state))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authenticate,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = match state.db.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "database ping failed");
            false
        }
    };
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            ok: db_ok,
            db_ok,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use platform_db::DatabaseSettings;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::issue_token;

    struct TestApp {
        router: Router,
        state: AppState,
    }

    impl TestApp {
        async fn new() -> Self {
            let settings = DatabaseSettings::with_url("sqlite::memory:");
            let db = platform_db::connect(&settings).await.unwrap();
            Migrator::up(&db, None).await.unwrap();
            let config = Arc::new(AppConfig {
                database: settings,
                token_secret: vec![7u8; 32],
                token_ttl_minutes: 5,
                cors_allowed_origins: Vec::new(),
            });
            let state = AppState::new(db, config);
            Self {
                router: build_router(state.clone()),
                state,
            }
        }

        async fn user(&self, email: &str) -> (Uuid, String) {
            let user = platform_db::upsert_user(&self.state.db, email, None)
                .await
                .unwrap();
            let token = issue_token(user.id, &self.state.auth).unwrap();
            (user.id, token)
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn project_owned_by(&self, token: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/projects",
                    Some(token),
                    Some(json!({ "name": "Launch" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn health_reports_database() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_ok"], json!(true));
    }

    #[tokio::test]
    async fn creator_administers_the_project() {
        let app = TestApp::new().await;
        let (_, token) = app.user("owner@example.com").await;
        let project = app.project_owned_by(&token).await;
        let uri = format!("/projects/{project}");

        let (status, body) = app.call("GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("Launch"));

        let (status, body) = app
            .call("PUT", &uri, Some(&token), Some(json!({ "name": "Relaunch" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("Relaunch"));

        let (status, body) = app.call("GET", "/projects", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = app.call("DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        // Membership went with the project, so the owner is now a stranger.
        let (status, _) = app.call("GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn template_member_gets_exactly_the_template() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (member_id, member) = app.user("member@example.com").await;
        let project = app.project_owned_by(&owner).await;

        let (status, body) = app
            .call(
                "POST",
                &format!("/projects/{project}/members"),
                Some(&owner),
                Some(json!({ "user_id": member_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["is_admin"], json!(false));

        let uri = format!("/projects/{project}");
        assert_eq!(
            app.call("GET", &uri, Some(&member), None).await.0,
            StatusCode::OK
        );
        assert_eq!(
            app.call("DELETE", &uri, Some(&member), None).await.0,
            StatusCode::FORBIDDEN
        );

        let (status, task) = app
            .call(
                "POST",
                &format!("/projects/{project}/tasks"),
                Some(&member),
                Some(json!({ "title": "Write docs", "assignee_id": member_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["status"], json!("OPEN"));

        let (status, page) = app
            .call(
                "GET",
                &format!("/projects/{project}/tasks?per_page=500"),
                Some(&member),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], json!(1));
        assert_eq!(page["per_page"], json!(100));

        let (status, _) = app
            .call(
                "POST",
                &format!("/projects/{project}/members"),
                Some(&member),
                Some(json!({ "user_id": Uuid::new_v4() })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn anonymous_and_outsiders_are_refused() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (_, outsider) = app.user("outsider@example.com").await;
        let project = app.project_owned_by(&owner).await;
        let uri = format!("/projects/{project}/tasks");

        let (status, body) = app.call("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], json!("FORBIDDEN"));

        let (status, _) = app
            .call("POST", "/projects", None, Some(json!({ "name": "x" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(
            app.call("GET", &uri, Some(&outsider), None).await.0,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn malformed_member_documents_are_rejected() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (member_id, _) = app.user("member@example.com").await;
        let project = app.project_owned_by(&owner).await;

        let (status, body) = app
            .call(
                "POST",
                &format!("/projects/{project}/members"),
                Some(&owner),
                Some(json!({
                    "user_id": member_id,
                    "permissions": { "project": { "id": { "GET": "yes" } } }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn only_admins_change_admin_status() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (manager_id, manager) = app.user("manager@example.com").await;
        let (guest_id, _) = app.user("guest@example.com").await;
        let project = app.project_owned_by(&owner).await;
        let members = format!("/projects/{project}/members");

        let (status, _) = app
            .call(
                "POST",
                &members,
                Some(&owner),
                Some(json!({
                    "user_id": manager_id,
                    "permissions": { "project": { "member": {
                        "all": { "GET": true, "POST": true },
                        "id": { "GET": true, "PUT": true }
                    } } }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app
            .call(
                "POST",
                &members,
                Some(&manager),
                Some(json!({ "user_id": guest_id, "is_admin": true })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call(
                "POST",
                &members,
                Some(&manager),
                Some(json!({ "user_id": guest_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let manager_uri = format!("{members}/{manager_id}");
        let (status, _) = app
            .call(
                "PUT",
                &manager_uri,
                Some(&manager),
                Some(json!({ "is_admin": true })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = app
            .call(
                "PUT",
                &manager_uri,
                Some(&owner),
                Some(json!({ "is_admin": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_admin"], json!(true));
    }

    #[tokio::test]
    async fn task_fields_can_be_cleared() {
        let app = TestApp::new().await;
        let (owner_id, owner) = app.user("owner@example.com").await;
        let project = app.project_owned_by(&owner).await;

        let (_, task) = app
            .call(
                "POST",
                &format!("/projects/{project}/tasks"),
                Some(&owner),
                Some(json!({
                    "title": "Ship",
                    "description": "first cut",
                    "assignee_id": owner_id
                })),
            )
            .await;
        let uri = format!("/projects/{project}/tasks/{}", task["id"].as_str().unwrap());

        let (status, body) = app
            .call("PUT", &uri, Some(&owner), Some(json!({ "status": "DONE" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assignee_id"], json!(owner_id));
        assert_eq!(body["description"], json!("first cut"));

        let (status, body) = app
            .call(
                "PUT",
                &uri,
                Some(&owner),
                Some(json!({ "assignee_id": null, "description": null })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assignee_id"], Value::Null);
        assert_eq!(body["description"], Value::Null);
        assert_eq!(body["status"], json!("DONE"));
    }

    #[tokio::test]
    async fn adding_a_member_twice_conflicts() {
        let app = TestApp::new().await;
        let (owner_id, owner) = app.user("owner@example.com").await;
        let project = app.project_owned_by(&owner).await;

        let (status, _) = app
            .call(
                "POST",
                &format!("/projects/{project}/members"),
                Some(&owner),
                Some(json!({ "user_id": owner_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
