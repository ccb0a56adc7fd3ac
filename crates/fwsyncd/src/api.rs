//! JSON control API
//!
//! Thin HTTP surface over the core: every handler reads or writes through
//! the same stores the engine uses and never makes reconciliation decisions
//! itself.
//!
//! | Route | Method | Behavior |
//! |---|---|---|
//! | `/api/status` | GET | schedule, effective ports, run state |
//! | `/api/logs?page=N` | GET | newest-first page of audit entries |
//! | `/api/logs/recent` | GET | newest 50 entries |
//! | `/api/logs/clear` | POST | delete every audit entry |
//! | `/api/settings` | GET, POST | settings with secrets withheld / update |
//! | `/api/run_now` | POST | start a run (202) or 409 while one is running |

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fwsync_core::normalize::{first_non_empty, normalize_providers, providers_from_form};
use fwsync_core::traits::audit_log::RECENT_LIMIT;
use fwsync_core::traits::{AuditLog, SettingsStore};
use fwsync_core::{ProviderKind, Reconciler, RunOutcome, Scheduler, Settings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared handles for every handler
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub scheduler: Arc<Scheduler>,
    pub settings: Arc<dyn SettingsStore>,
    pub audit: Arc<dyn AuditLog>,
}

/// Build the control API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/logs", get(logs_page))
        .route("/api/logs/recent", get(logs_recent))
        .route("/api/logs/clear", post(logs_clear))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/run_now", post(run_now))
        .with_state(state)
}

/// Store failure surfaced as a 500 with a JSON body
struct ApiError(fwsync_core::Error);

impl From<fwsync_core::Error> for ApiError {
    fn from(err: fwsync_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("control API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    next_run: Option<DateTime<Utc>>,
    /// `YYYY-MM-DD HH:MM:SS` (UTC), `running` or `not scheduled`
    next_run_display: String,
    check_interval: u64,
    ssh_port: String,
    provider: String,
    providers: Vec<ProviderKind>,
    volcengine_ports: String,
    aws_ports: String,
    running: bool,
    last_run: Option<RunOutcome>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusView>, ApiError> {
    let settings = state.settings.load().await?;
    let next_run = state.scheduler.next_run().await;
    let running = state.reconciler.is_running();

    let next_run_display = match next_run {
        _ if running => "running".to_string(),
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "not scheduled".to_string(),
    };

    Ok(Json(StatusView {
        next_run,
        next_run_display,
        check_interval: settings.check_interval,
        providers: normalize_providers(&settings.providers, &settings.provider),
        volcengine_ports: first_non_empty(&[
            settings.volcengine_ports.as_str(),
            settings.ssh_port.as_str(),
        ])
        .to_string(),
        aws_ports: first_non_empty(&[settings.aws_ports.as_str(), settings.ssh_port.as_str()])
            .to_string(),
        ssh_port: settings.ssh_port,
        provider: settings.provider,
        running,
        last_run: state.reconciler.last_outcome().await,
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

async fn logs_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    // Anything unparseable is page 1
    let page = query
        .page
        .and_then(|p| p.trim().parse::<usize>().ok())
        .unwrap_or(1);
    Ok(Json(state.audit.page(page).await?).into_response())
}

async fn logs_recent(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.audit.recent(RECENT_LIMIT).await?).into_response())
}

async fn logs_clear(State(state): State<AppState>) -> Result<Response, ApiError> {
    let removed = state.audit.clear().await?;
    info!("Audit log cleared ({} entries)", removed);
    Ok(Json(json!({ "removed": removed })).into_response())
}

/// Settings as shown to the operator: secrets are replaced by flags
#[derive(Debug, Serialize)]
struct SettingsView {
    provider: String,
    providers: String,
    volcengine_access_key: String,
    volcengine_secret_key_configured: bool,
    volcengine_region: String,
    volcengine_security_group_id: String,
    aws_access_key: String,
    aws_secret_key_configured: bool,
    aws_region: String,
    aws_instance_name: String,
    volcengine_ports: String,
    aws_ports: String,
    ssh_port: String,
    check_interval: u64,
    ip_services: String,
}

impl From<Settings> for SettingsView {
    fn from(s: Settings) -> Self {
        // Display defaults mirror what a run would use
        let provider = first_non_empty(&[s.provider.as_str(), "volcengine"]).to_string();
        let providers = first_non_empty(&[s.providers.as_str(), provider.as_str()]).to_string();
        let volcengine_ports =
            first_non_empty(&[s.volcengine_ports.as_str(), s.ssh_port.as_str()]).to_string();
        let aws_ports = first_non_empty(&[s.aws_ports.as_str(), s.ssh_port.as_str()]).to_string();

        Self {
            provider,
            providers,
            volcengine_access_key: s.access_key,
            volcengine_secret_key_configured: !s.secret_key.trim().is_empty(),
            volcengine_region: s.region,
            volcengine_security_group_id: s.security_group_id,
            aws_access_key: s.aws_access_key,
            aws_secret_key_configured: !s.aws_secret_key.trim().is_empty(),
            aws_region: s.aws_region,
            aws_instance_name: s.aws_instance_name,
            volcengine_ports,
            aws_ports,
            ssh_port: s.ssh_port,
            check_interval: s.check_interval,
            ip_services: s.ip_services,
        }
    }
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsView>, ApiError> {
    Ok(Json(state.settings.load().await?.into()))
}

/// Settings update; absent fields keep their stored value
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsForm {
    providers: Option<Vec<String>>,
    volcengine_access_key: Option<String>,
    /// Blank keeps the stored secret
    volcengine_secret_key: Option<String>,
    volcengine_region: Option<String>,
    volcengine_security_group_id: Option<String>,
    aws_access_key: Option<String>,
    /// Blank keeps the stored secret
    aws_secret_key: Option<String>,
    aws_region: Option<String>,
    aws_instance_name: Option<String>,
    volcengine_ports: Option<String>,
    aws_ports: Option<String>,
    check_interval: Option<u64>,
    ip_services: Option<String>,
}

impl SettingsForm {
    fn apply(self, settings: &mut Settings) {
        if let Some(values) = self.providers {
            settings.providers = providers_from_form(&values);
            settings.provider = match settings.providers.as_str() {
                "" => String::new(),
                "aws" => ProviderKind::Aws.as_str().to_string(),
                _ => ProviderKind::Volcengine.as_str().to_string(),
            };
        }

        let replace = |field: &mut String, value: Option<String>| {
            if let Some(value) = value {
                *field = value;
            }
        };
        let replace_secret = |field: &mut String, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        };

        replace(&mut settings.access_key, self.volcengine_access_key);
        replace_secret(&mut settings.secret_key, self.volcengine_secret_key);
        replace(&mut settings.region, self.volcengine_region);
        replace(&mut settings.security_group_id, self.volcengine_security_group_id);
        replace(&mut settings.aws_access_key, self.aws_access_key);
        replace_secret(&mut settings.aws_secret_key, self.aws_secret_key);
        replace(&mut settings.aws_region, self.aws_region);
        replace(&mut settings.aws_instance_name, self.aws_instance_name);
        replace(&mut settings.volcengine_ports, self.volcengine_ports);
        replace(&mut settings.aws_ports, self.aws_ports);
        replace(&mut settings.ip_services, self.ip_services);
        if let Some(interval) = self.check_interval {
            settings.check_interval = interval;
        }

        settings.ssh_port = first_non_empty(&[
            settings.volcengine_ports.as_str(),
            settings.aws_ports.as_str(),
        ])
        .to_string();
    }
}

async fn update_settings(
    State(state): State<AppState>,
    Json(form): Json<SettingsForm>,
) -> Result<Json<SettingsView>, ApiError> {
    let mut settings = state.settings.load().await?;
    form.apply(&mut settings);
    state.settings.save(&settings).await?;
    state.scheduler.reschedule();

    info!(
        "Settings saved (providers={}, interval={}s)",
        settings.providers, settings.check_interval
    );
    Ok(Json(settings.into()))
}

async fn run_now(State(state): State<AppState>) -> Response {
    if state.reconciler.is_running() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "already_running" })),
        )
            .into_response();
    }

    let reconciler = Arc::clone(&state.reconciler);
    tokio::spawn(async move {
        reconciler.reconcile().await;
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
}
