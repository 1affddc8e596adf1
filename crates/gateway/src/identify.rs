//! Project identification middleware.
//!
//! Extraction priority: `X-Project-ID` header → API-key prefix (`X-API-Key`
//! header, then `api_key` cookie) → `project_id` query parameter → the
//! `default` project when fallback is allowed. The identified project must
//! exist and be active; the result lands in request extensions as
//! [`ProjectContext`].

use std::sync::Arc;

use {
    axum::{
        extract::{Request, State},
        http::StatusCode,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    axum_extra::extract::cookie::CookieJar,
    tracing::{debug, warn},
};

use conclave_projects::ProjectDefinition;

use crate::state::AppState;

/// Paths served without project identification.
pub const PUBLIC_PATHS: &[&str] = &["/", "/health", "/docs", "/openapi.json"];

/// What the middleware learned about the request.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub project_id: String,
    /// Key id when identification came from an API-key prefix.
    pub key_id: Option<String>,
    pub project: Option<ProjectDefinition>,
}

pub async fn identify_project(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) || path.starts_with("/ws/") {
        return next.run(request).await;
    }

    let (project_id, key_id) = match extract_project_id(&request, &jar) {
        Some(found) => found,
        None => {
            if state.config.identification.allow_default_fallback {
                debug!("no project identification, using 'default'");
                ("default".to_string(), None)
            } else {
                warn!(path, "request without project identification");
                return (
                    StatusCode::UNAUTHORIZED,
                    "Project identification required. Provide X-Project-ID header or API key with project prefix.",
                )
                    .into_response();
            }
        },
    };

    let project = state.projects.get_project(&project_id).await;
    match &project {
        None => {
            warn!(project_id, "identified project not found");
            if state.config.identification.require_identification {
                return (
                    StatusCode::FORBIDDEN,
                    format!("Project '{project_id}' not found or access denied."),
                )
                    .into_response();
            }
        },
        Some(project) if !project.is_active() => {
            warn!(project_id, "identified project not active");
            return (
                StatusCode::FORBIDDEN,
                format!("Project '{project_id}' is not active."),
            )
                .into_response();
        },
        Some(_) => {},
    }

    debug!(project_id, path, "project identified");
    request.extensions_mut().insert(ProjectContext {
        project_id,
        key_id,
        project,
    });
    next.run(request).await
}

/// Walk the extraction priority list. Returns `(project_id, key_id)`.
fn extract_project_id(request: &Request, jar: &CookieJar) -> Option<(String, Option<String>)> {
    // 1. Explicit header.
    if let Some(header) = header_str(request, "x-project-id") {
        return Some((header.to_string(), None));
    }

    // 2. API-key prefix, header then cookie.
    let api_key = header_str(request, "x-api-key")
        .map(str::to_string)
        .or_else(|| jar.get("api_key").map(|c| c.value().to_string()));
    if let Some(api_key) = api_key
        && let Some((project_id, key_id)) = conclave_protocol::parse_key_prefix(&api_key)
    {
        return Some((project_id.to_string(), Some(key_id.to_string())));
    }

    // 3. Query parameter.
    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("project_id=")
                && !value.is_empty()
            {
                return Some((value.to_string(), None));
            }
        }
    }

    None
}

fn header_str<'r>(request: &'r Request, name: &str) -> Option<&'r str> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
