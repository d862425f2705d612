//! Route-level permission gate.
//!
//! Each guarded route group carries a static permission key. The gate takes
//! the project from the `project_id` path parameter, the verb from the
//! request method and the principal from the authentication layer, and
//! answers 403 unless the resolver allows the request.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    extract::{Path, Request, State, rejection::PathRejection},
    middleware::{self, Next},
    response::Response,
};
use platform_api::ApiError;
use platform_authz::{AuthorizationRequest, AuthorizationResolver, Verb};
use tracing::debug;
use uuid::Uuid;

use crate::auth::Principal;

#[derive(Clone)]
pub struct PermissionGate {
    resolver: Arc<AuthorizationResolver>,
    key: &'static str,
}

/// Put every route of `router` behind the permission `key`.
pub fn guarded<S>(
    router: Router<S>,
    resolver: &Arc<AuthorizationResolver>,
    key: &'static str,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let gate = PermissionGate {
        resolver: resolver.clone(),
        key,
    };
    router.route_layer(middleware::from_fn_with_state(gate, enforce))
}

async fn enforce(
    State(gate): State<PermissionGate>,
    params: Result<Path<HashMap<String, String>>, PathRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Path(params) = params.map_err(|rejection| {
        debug!(error = %rejection, key = gate.key, "deny: unreadable path");
        ApiError::Forbidden
    })?;
    let Ok(verb) = request.method().as_str().parse::<Verb>() else {
        debug!(method = %request.method(), key = gate.key, "deny: unsupported method");
        return Err(ApiError::Forbidden);
    };
    let project = params
        .get("project_id")
        .and_then(|raw| Uuid::parse_str(raw).ok());
    let principal = request.extensions().get::<Principal>().map(|p| p.id);

    let decision = gate
        .resolver
        .resolve(&AuthorizationRequest::new(principal, project, gate.key, verb))
        .await;
    if decision.is_allowed() {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode, header},
        routing::get,
    };
    use http_body_util::BodyExt;
    use platform_authz::{PermissionDocument, memory::InMemoryMembership};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthConfig, authenticate, issue_token};

    struct Fixture {
        router: Router,
        store: InMemoryMembership,
        auth: Arc<AuthConfig>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryMembership::new();
        let resolver = Arc::new(AuthorizationResolver::new(Arc::new(store.clone())));
        let auth = Arc::new(AuthConfig::new(&[9u8; 32], 5));
        let things = guarded(
            Router::new().route(
                "/projects/{project_id}/things",
                get(|| async { "listed" }).post(|| async { "created" }),
            ),
            &resolver,
            "project.thing.all",
        );
        let router = Router::new()
            .merge(things)
            .layer(middleware::from_fn_with_state(auth.clone(), authenticate));
        Fixture {
            router,
            store,
            auth,
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn status(router: &Router, req: HttpRequest<Body>) -> StatusCode {
        router.clone().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn member_document_decides_per_verb() {
        let fx = fixture();
        let (project, user) = (Uuid::new_v4(), Uuid::new_v4());
        let doc = PermissionDocument::try_from(json!({
            "project": { "thing": { "all": { "GET": true, "POST": false } } }
        }))
        .unwrap();
        fx.store.grant(project, user, doc).await;
        let token = issue_token(user, &fx.auth).unwrap();
        let uri = format!("/projects/{project}/things");

        assert_eq!(
            status(&fx.router, request("GET", &uri, Some(&token))).await,
            StatusCode::OK
        );
        assert_eq!(
            status(&fx.router, request("POST", &uri, Some(&token))).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn admins_pass_and_strangers_do_not() {
        let fx = fixture();
        let (project, admin, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        fx.store.grant_admin(project, admin).await;
        let uri = format!("/projects/{project}/things");

        let admin_token = issue_token(admin, &fx.auth).unwrap();
        assert_eq!(
            status(&fx.router, request("POST", &uri, Some(&admin_token))).await,
            StatusCode::OK
        );
        let stranger_token = issue_token(stranger, &fx.auth).unwrap();
        assert_eq!(
            status(&fx.router, request("GET", &uri, Some(&stranger_token))).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn missing_or_bad_context_is_forbidden() {
        let fx = fixture();
        let (project, admin) = (Uuid::new_v4(), Uuid::new_v4());
        fx.store.grant_admin(project, admin).await;
        let uri = format!("/projects/{project}/things");
        let token = issue_token(admin, &fx.auth).unwrap();

        assert_eq!(
            status(&fx.router, request("GET", &uri, None)).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(&fx.router, request("GET", &uri, Some("garbage"))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(
                &fx.router,
                request("GET", "/projects/not-a-uuid/things", Some(&token))
            )
            .await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn undecodable_path_is_a_json_forbidden() {
        let fx = fixture();
        let (project, admin) = (Uuid::new_v4(), Uuid::new_v4());
        fx.store.grant_admin(project, admin).await;
        let token = issue_token(admin, &fx.auth).unwrap();

        let response = fx
            .router
            .clone()
            .oneshot(request("GET", "/projects/%FF/things", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }
}
