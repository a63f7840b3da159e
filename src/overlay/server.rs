use crate::overlay::commands::{DispatchError, OverlayCallbacks, OverlayCommand};
use crate::overlay::error::RequestError;
use crate::overlay::model::{InfoCard, ScheduleEntry};
use crate::overlay::render::{
    render, OverlayTheme, RenderOptions, DEFAULT_DELAY_SECONDS, DEFAULT_SNOOZE_MINUTES,
};
use crate::overlay::state::OverlayStateManager;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tower_http::catch_panic::CatchPanicLayer;

const SERVER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const SERVER_WORKER_THREADS: usize = 2;
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const ALLOW_METHODS: &str = "GET, HEAD, OPTIONS, POST";
const ALLOW_HEADERS: &str = "Accept, Content-Type";
const CACHE_CONTROL: &str = "no-store, max-age=0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `["*"]` or empty allows any origin; otherwise exact matches only.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_clock_24h")]
    pub clock_24h: bool,
    #[serde(default = "default_stop_endpoint")]
    pub stop_endpoint: String,
    #[serde(default = "default_info_endpoint")]
    pub info_endpoint: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8765
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_clock_24h() -> bool {
    true
}

fn default_stop_endpoint() -> String {
    "/overlay/stop".into()
}

fn default_info_endpoint() -> String {
    "/overlay/info-card".into()
}

impl Default for OverlayServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            clock_24h: default_clock_24h(),
            stop_endpoint: default_stop_endpoint(),
            info_endpoint: default_info_endpoint(),
        }
    }
}

impl OverlayServerConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            clock_24h: self.clock_24h,
            stop_endpoint: self.stop_endpoint.clone(),
            info_endpoint: self.info_endpoint.clone(),
        }
    }

    fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty()
            || (self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*")
    }

    fn cors_headers(&self, origin: Option<&str>) -> Vec<(HeaderName, String)> {
        let mut headers = Vec::new();
        if self.allows_any_origin() {
            headers.push((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()));
        } else if let Some(origin) = origin.filter(|o| self.allowed_origins.iter().any(|a| a == o))
        {
            headers.push((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.to_string()));
            headers.push((header::VARY, "Origin".to_string()));
        }
        headers.push((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS.to_string()));
        headers.push((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS.to_string()));
        headers.push((header::CACHE_CONTROL, CACHE_CONTROL.to_string()));
        headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct ServerContext {
    config: OverlayServerConfig,
    theme: OverlayTheme,
    render_options: RenderOptions,
    state: Arc<OverlayStateManager>,
    callbacks: OverlayCallbacks,
}

struct RunningServer {
    server_thread: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    local_addr: SocketAddr,
}

/// HTTP front end of the overlay: renders fresh snapshots on GET/HEAD and
/// turns POSTed button presses into collaborator commands.
///
/// The server owns its tokio runtime on a dedicated thread, so callers stay
/// synchronous.
pub struct OverlayHttpServer {
    ctx: Arc<ServerContext>,
    running: Mutex<Option<RunningServer>>,
}

impl OverlayHttpServer {
    pub fn new(
        config: OverlayServerConfig,
        theme: OverlayTheme,
        state: Arc<OverlayStateManager>,
        callbacks: OverlayCallbacks,
    ) -> Self {
        let render_options = config.render_options();
        Self {
            ctx: Arc::new(ServerContext {
                config,
                theme,
                render_options,
                state,
                callbacks,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .ok()
            .and_then(|r| r.as_ref().map(|r| r.local_addr))
    }

    /// Bind and start serving. Bind errors are returned to the caller;
    /// calling this while already running does nothing.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let bind_address = self.ctx.config.bind_address.as_str();
        let port = self.ctx.config.port;
        let listener = TcpListener::bind((bind_address, port))
            .with_context(|| format!("failed to bind overlay server on {bind_address}:{port}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to make overlay listener non-blocking")?;
        let local_addr = listener
            .local_addr()
            .context("failed to read overlay listener address")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(SERVER_WORKER_THREADS)
            .thread_name("overlay-http-worker")
            .enable_all()
            .build()
            .context("failed to build overlay server runtime")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = router(Arc::clone(&self.ctx));
        let server_thread = thread::Builder::new()
            .name("overlay-http".into())
            .spawn(move || serve(runtime, listener, app, shutdown_rx))
            .context("failed to spawn overlay server thread")?;

        tracing::info!(%local_addr, "overlay server listening");
        *running = Some(RunningServer {
            server_thread,
            shutdown: shutdown_tx,
            local_addr,
        });
        Ok(StartOutcome::Started)
    }

    /// Stop serving and wait a bounded time for the server thread. A thread
    /// stuck in collaborator code is abandoned rather than waited on.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(());
        join_with_timeout(running.server_thread, SERVER_JOIN_TIMEOUT);
        tracing::info!(local_addr = %running.local_addr, "overlay server stopped");
    }
}

impl Drop for OverlayHttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => {
            let _ = waiter.join();
        }
        Ok(Err(payload)) => {
            tracing::error!(
                panic_message = %panic_message(payload.as_ref()),
                "overlay server thread panicked"
            );
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::error!(?timeout, "overlay server thread did not stop in time; abandoning it");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            tracing::error!("overlay server join waiter disconnected");
        }
    }
}

fn serve(
    runtime: Runtime,
    listener: TcpListener,
    app: Router,
    shutdown: oneshot::Receiver<()>,
) {
    let result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await
    });
    if let Err(err) = result {
        tracing::error!(error = %err, "overlay server failed");
    }
    // Blocking tasks still inside a collaborator must not hold this thread.
    runtime.shutdown_background();
}

fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&ctx),
            common_headers,
        ))
        .with_state(ctx)
}

/// Every response, including rejections and 500s, carries the CORS and
/// caching headers.
async fn common_headers(
    State(ctx): State<Arc<ServerContext>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|o| o.to_str().ok())
        .map(str::to_string);
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in ctx.config.cors_headers(origin.as_deref()) {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

async fn handle_request(
    State(ctx): State<Arc<ServerContext>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    match method {
        Method::OPTIONS => StatusCode::NO_CONTENT.into_response(),
        // HEAD shares the GET response; the body is dropped on the way out
        // and Content-Length is kept.
        Method::GET | Method::HEAD => {
            let html = render(&ctx.state.snapshot(), &ctx.theme, &ctx.render_options);
            (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                html,
            )
                .into_response()
        }
        Method::POST => {
            let path = uri.path().to_string();
            let result = tokio::task::spawn_blocking({
                let path = path.clone();
                move || handle_post(&ctx, &path, &body)
            })
            .await
            .unwrap_or_else(|err| Err(join_failure(err)));
            match result {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(err) => {
                    if err.is_client_error() {
                        tracing::debug!(%path, error = %err, "rejected overlay request");
                    } else {
                        tracing::error!(%path, error = %err, "overlay request failed");
                    }
                    err.into_response()
                }
            }
        }
        _ => RequestError::NotFound.into_response(),
    }
}

fn join_failure(err: tokio::task::JoinError) -> RequestError {
    if err.is_panic() {
        let payload = err.into_panic();
        tracing::error!(
            panic_message = %panic_message(payload.as_ref()),
            "overlay command handler panicked"
        );
        RequestError::Internal("command handler panicked".into())
    } else {
        RequestError::Internal("command handler was cancelled".into())
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(
        panic_message = %panic_message(payload.as_ref()),
        "overlay request panicked"
    );
    RequestError::Internal("request panicked".into()).into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn handle_post(ctx: &ServerContext, path: &str, body: &[u8]) -> Result<(), RequestError> {
    if path == ctx.config.stop_endpoint {
        handle_stop_action(ctx, &json_body(body)?)
    } else if path == ctx.config.info_endpoint {
        handle_info_action(ctx, &json_body(body)?)
    } else {
        Err(RequestError::NotFound)
    }
}

fn json_body(body: &[u8]) -> Result<Map<String, Value>, RequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RequestError::bad_request("empty request body"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RequestError::bad_request(format!("malformed JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(RequestError::bad_request("expected a JSON object")),
    }
}

fn action(body: &Map<String, Value>) -> Result<&str, RequestError> {
    body.get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| RequestError::bad_request("missing action"))
}

fn event_id(body: &Map<String, Value>) -> Result<String, RequestError> {
    match body.get("event_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RequestError::bad_request("missing event_id")),
    }
}

/// Numbers or numeric strings; anything else is treated as absent.
fn numeric_field(body: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match body.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn snooze_minutes(body: &Map<String, Value>) -> u32 {
    numeric_field(body, "minutes")
        .map(|m| m.clamp(1.0, f64::from(u32::MAX)) as u32)
        .unwrap_or(DEFAULT_SNOOZE_MINUTES)
}

fn delay_seconds(body: &Map<String, Value>) -> u64 {
    numeric_field(body, "seconds")
        .map(|s| s.clamp(1.0, u64::MAX as f64) as u64)
        .unwrap_or(DEFAULT_DELAY_SECONDS)
}

fn dispatch(ctx: &ServerContext, command: OverlayCommand) -> Result<(), RequestError> {
    tracing::debug!(?command, "dispatching overlay command");
    ctx.callbacks.dispatch(&command).map_err(|err| match err {
        DispatchError::Unavailable(kind) => RequestError::Unavailable(kind.to_string()),
        DispatchError::Failed(err) => RequestError::Internal(format!("{err:#}")),
    })
}

fn handle_stop_action(ctx: &ServerContext, body: &Map<String, Value>) -> Result<(), RequestError> {
    let command = match action(body)? {
        "stop" => OverlayCommand::Stop {
            event_id: event_id(body)?,
        },
        "snooze" => OverlayCommand::Snooze {
            event_id: event_id(body)?,
            minutes: snooze_minutes(body),
        },
        other => {
            return Err(RequestError::bad_request(format!("unknown action '{other}'")));
        }
    };
    dispatch(ctx, command)
}

fn listing_items(entries: &[ScheduleEntry]) -> Vec<Value> {
    entries
        .iter()
        .map(|entry| Value::Object(entry.fields().clone()))
        .collect()
}

fn schedule_list(schedule: Option<&Value>, key: &str) -> Vec<Value> {
    schedule
        .and_then(|s| s.get(key))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|i| i.is_object()).cloned().collect())
        .unwrap_or_default()
}

fn handle_info_action(ctx: &ServerContext, body: &Map<String, Value>) -> Result<(), RequestError> {
    let command = match action(body)? {
        "clear" => {
            ctx.state.update_info_card(None);
            return Ok(());
        }
        "show_alarms" => {
            let snapshot = ctx.state.snapshot();
            let card = InfoCard::listing("alarms", "Alarms", listing_items(&snapshot.alarms));
            ctx.state.update_info_card(Some(card));
            return Ok(());
        }
        "show_reminders" => {
            let snapshot = ctx.state.snapshot();
            let items = schedule_list(snapshot.schedule_snapshot.as_ref(), "reminders");
            ctx.state
                .update_info_card(Some(InfoCard::listing("reminders", "Reminders", items)));
            return Ok(());
        }
        "show_calendar" => {
            let snapshot = ctx.state.snapshot();
            let items = schedule_list(snapshot.schedule_snapshot.as_ref(), "events");
            ctx.state
                .update_info_card(Some(InfoCard::listing("calendar", "Calendar", items)));
            return Ok(());
        }
        "delete_alarm" => OverlayCommand::DeleteAlarm {
            event_id: event_id(body)?,
        },
        "pause_alarm" => OverlayCommand::PauseAlarm {
            event_id: event_id(body)?,
        },
        "resume_alarm" => OverlayCommand::ResumeAlarm {
            event_id: event_id(body)?,
        },
        "complete_reminder" => OverlayCommand::CompleteReminder {
            event_id: event_id(body)?,
        },
        "delay_reminder" => OverlayCommand::DelayReminder {
            event_id: event_id(body)?,
            seconds: delay_seconds(body),
        },
        "delete_reminder" => OverlayCommand::DeleteReminder {
            event_id: event_id(body)?,
        },
        "toggle_earmuffs" => OverlayCommand::ToggleEarmuffs,
        "trigger_update" => OverlayCommand::TriggerUpdate,
        other => {
            return Err(RequestError::bad_request(format!("unknown action '{other}'")));
        }
    };
    dispatch(ctx, command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn numeric_fields_accept_strings_and_ignore_garbage() {
        assert_eq!(snooze_minutes(&body(json!({"minutes": "10"}))), 10);
        assert_eq!(snooze_minutes(&body(json!({"minutes": 0}))), 1);
        assert_eq!(snooze_minutes(&body(json!({"minutes": -3}))), 1);
        assert_eq!(snooze_minutes(&body(json!({"minutes": "soon"}))), 5);
        assert_eq!(snooze_minutes(&body(json!({}))), 5);
        assert_eq!(delay_seconds(&body(json!({"seconds": 90.7}))), 90);
        assert_eq!(delay_seconds(&body(json!({"seconds": "bogus"}))), 3600);
        assert_eq!(delay_seconds(&body(json!({"seconds": 0}))), 1);
    }

    #[test]
    fn event_id_accepts_numbers_and_rejects_blank() {
        assert_eq!(event_id(&body(json!({"event_id": 42}))).unwrap(), "42");
        assert!(event_id(&body(json!({"event_id": "  "}))).is_err());
        assert!(event_id(&body(json!({}))).is_err());
    }

    #[test]
    fn wildcard_origin_config() {
        let cfg = OverlayServerConfig::default();
        let headers = cfg.cors_headers(Some("http://elsewhere"));
        assert!(headers
            .iter()
            .any(|(k, v)| *k == header::ACCESS_CONTROL_ALLOW_ORIGIN && v == "*"));
        assert!(!headers.iter().any(|(k, _)| *k == header::VARY));

        let cfg = OverlayServerConfig {
            allowed_origins: Vec::new(),
            ..OverlayServerConfig::default()
        };
        assert!(cfg.allows_any_origin());
    }

    #[test]
    fn explicit_origins_are_echoed_only_on_match() {
        let cfg = OverlayServerConfig {
            allowed_origins: vec!["http://kiosk.local".into()],
            ..OverlayServerConfig::default()
        };
        let matched = cfg.cors_headers(Some("http://kiosk.local"));
        assert!(matched
            .iter()
            .any(|(k, v)| *k == header::ACCESS_CONTROL_ALLOW_ORIGIN && v == "http://kiosk.local"));
        assert!(matched.iter().any(|(k, v)| *k == header::VARY && v == "Origin"));

        let other = cfg.cors_headers(Some("http://evil.example"));
        assert!(!other
            .iter()
            .any(|(k, _)| *k == header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(other.iter().any(|(k, _)| *k == header::CACHE_CONTROL));
    }
}
