//! HTTP client for the farm server's status and pump endpoints.

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::{Mode, PumpRequest, PumpResponse, PumpState, Snapshot};
use crate::config::Config;
use crate::engine::{Command, CommandOutcome};
use crate::error::{CommandError, NetworkError};

const DATA_PATH: &str = "/api/data";
const PUMP_PATH: &str = "/api/pump";
const LOGIN_PATH: &str = "/login";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything the dashboard needs from the farm server. No method retries.
#[async_trait]
pub trait FarmApi: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, CommandError>;

    /// Returns the mode the server applied.
    async fn set_mode(&self, mode: Mode) -> Result<Mode, CommandError>;

    /// Returns the pump state the server reports after toggling.
    async fn toggle(&self) -> Result<PumpState, CommandError>;

    /// Establish a session. A no-op for servers without login.
    async fn login(&self) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Send a cleared command and wrap the reply.
pub async fn execute(api: &dyn FarmApi, command: Command) -> Result<CommandOutcome, CommandError> {
    match command {
        Command::Toggle => api.toggle().await.map(CommandOutcome::Pump),
        Command::SetMode(mode) => api.set_mode(mode).await.map(CommandOutcome::Mode),
    }
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    /// Path of the login page under `base_url`, e.g. `/farm/login`.
    login_path: String,
    credentials: Option<(String, String)>,
}

impl HttpClient {
    pub fn new(config: &Config) -> AnyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .context("failed to build HTTP client")?;

        let credentials = match (&config.username, &config.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base_path = reqwest::Url::parse(&base_url)
            .with_context(|| format!("invalid base_url '{base_url}'"))?
            .path()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            login_path: format!("{base_path}{LOGIN_PATH}"),
            base_url,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The server bounces requests without a session to its login page.
    fn on_login_page(&self, response: &reqwest::Response) -> bool {
        response.url().path() == self.login_path
    }

    /// Map a response to `T`, or to the matching `NetworkError`.
    async fn read_json<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, NetworkError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || self.on_login_page(&response) {
            return Err(NetworkError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(NetworkError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| NetworkError::Transport {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| NetworkError::Malformed {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }

    async fn post_pump(&self, request: &PumpRequest) -> Result<PumpResponse, CommandError> {
        let response = self
            .http
            .post(self.url(PUMP_PATH))
            .json(request)
            .send()
            .await
            .map_err(|e| transport(PUMP_PATH, e))?;
        let reply: PumpResponse = self.read_json(PUMP_PATH, response).await?;

        if !reply.is_ok() {
            return Err(CommandError::Rejected {
                message: reply.rejection_message(),
            });
        }
        Ok(reply)
    }
}

fn transport(path: &str, e: reqwest::Error) -> NetworkError {
    NetworkError::Transport {
        path: path.to_string(),
        detail: e.to_string(),
    }
}

#[async_trait]
impl FarmApi for HttpClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, CommandError> {
        let response = self
            .http
            .get(self.url(DATA_PATH))
            .send()
            .await
            .map_err(|e| transport(DATA_PATH, e))?;
        Ok(self.read_json(DATA_PATH, response).await?)
    }

    async fn set_mode(&self, mode: Mode) -> Result<Mode, CommandError> {
        let reply = self.post_pump(&PumpRequest::SetMode { mode }).await?;
        let applied = reply.mode.unwrap_or(mode);
        debug!(requested = %mode, applied = %applied, "set_mode acknowledged");
        Ok(applied)
    }

    async fn toggle(&self) -> Result<PumpState, CommandError> {
        let reply = self.post_pump(&PumpRequest::Toggle).await?;
        reply.pump.ok_or_else(|| {
            NetworkError::Malformed {
                path: PUMP_PATH.to_string(),
                detail: "toggle reply has no pump state".to_string(),
            }
            .into()
        })
    }

    /// Form login. The server answers a bad password by rendering the
    /// login page again, and a good one by redirecting away from it.
    async fn login(&self) -> Result<(), CommandError> {
        let Some((username, password)) = &self.credentials else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await
            .map_err(|e| transport(LOGIN_PATH, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                path: LOGIN_PATH.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if self.on_login_page(&response) {
            return Err(CommandError::Rejected {
                message: format!("login refused for user '{username}'"),
            });
        }

        info!(user = %username, "logged in");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Form, Json};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{Html, IntoResponse, Redirect, Response};
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> HttpClient {
        HttpClient::new(&Config {
            base_url,
            ..Config::default()
        })
        .unwrap()
    }

    // -- fetch_snapshot -----------------------------------------------------

    #[tokio::test]
    async fn fetch_snapshot_parses_payload() {
        let router = Router::new().route(
            "/api/data",
            get(|| async {
                Json(json!({
                    "temperature": 22,
                    "humidity": null,
                    "soil_percent": 40.5,
                    "mode": "auto",
                    "pump": "on"
                }))
            }),
        );
        let client = client_for(serve(router).await);

        let snap = client.fetch_snapshot().await.unwrap();
        assert_eq!(snap.temperature, Some(22.0));
        assert_eq!(snap.humidity, None);
        assert_eq!(snap.soil_percent, Some(40.5));
        assert_eq!(snap.mode, Mode::Auto);
        assert_eq!(snap.pump, PumpState::On);
    }

    #[tokio::test]
    async fn fetch_snapshot_non_2xx_is_network_error() {
        let router = Router::new().route(
            "/api/data",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = client_for(serve(router).await);

        let err = client.fetch_snapshot().await.unwrap_err();
        assert_eq!(
            err,
            CommandError::Network(NetworkError::Status {
                path: "/api/data".into(),
                status: 500,
            })
        );
    }

    #[tokio::test]
    async fn fetch_snapshot_malformed_is_network_error() {
        let router = Router::new().route("/api/data", get(|| async { Html("<p>oops</p>") }));
        let client = client_for(serve(router).await);

        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(
            matches!(err, CommandError::Network(NetworkError::Malformed { .. })),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{addr}"));
        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(
            matches!(err, CommandError::Network(NetworkError::Transport { .. })),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_ignored() {
        let router = Router::new().route(
            "/api/data",
            get(|| async {
                Json(json!({
                    "temperature": 1, "humidity": 2, "soil_percent": 3,
                    "mode": "manual", "pump": "off"
                }))
            }),
        );
        let base = serve(router).await;
        let client = client_for(format!("{base}/"));
        assert!(client.fetch_snapshot().await.is_ok());
    }

    // -- set_mode -----------------------------------------------------------

    async fn pump_echo(Json(body): Json<Value>) -> Json<Value> {
        match body["action"].as_str() {
            Some("set_mode") => match body["mode"].as_str() {
                Some(m @ ("auto" | "manual")) => Json(json!({"status": "ok", "mode": m})),
                _ => Json(json!({"status": "error", "message": "Invalid action"})),
            },
            Some("toggle") => Json(json!({"status": "ok", "pump": "on", "mode": "manual"})),
            _ => Json(json!({"status": "error", "message": "Invalid action"})),
        }
    }

    #[tokio::test]
    async fn set_mode_sends_wire_body_and_returns_applied() {
        let router = Router::new().route("/api/pump", post(pump_echo));
        let client = client_for(serve(router).await);

        assert_eq!(client.set_mode(Mode::Auto).await.unwrap(), Mode::Auto);
        assert_eq!(client.set_mode(Mode::Manual).await.unwrap(), Mode::Manual);
    }

    #[tokio::test]
    async fn set_mode_without_mode_in_reply_uses_requested() {
        let router = Router::new().route(
            "/api/pump",
            post(|| async { Json(json!({"status": "ok"})) }),
        );
        let client = client_for(serve(router).await);
        assert_eq!(client.set_mode(Mode::Auto).await.unwrap(), Mode::Auto);
    }

    #[tokio::test]
    async fn set_mode_rejection_is_rejected_error() {
        let router = Router::new().route(
            "/api/pump",
            post(|| async { Json(json!({"status": "error", "message": "Invalid action"})) }),
        );
        let client = client_for(serve(router).await);

        let err = client.set_mode(Mode::Auto).await.unwrap_err();
        assert_eq!(
            err,
            CommandError::Rejected {
                message: "error: Invalid action".into(),
            }
        );
    }

    // -- toggle -------------------------------------------------------------

    #[tokio::test]
    async fn toggle_returns_server_state() {
        let router = Router::new().route("/api/pump", post(pump_echo));
        let client = client_for(serve(router).await);
        assert_eq!(client.toggle().await.unwrap(), PumpState::On);
    }

    #[tokio::test]
    async fn toggle_ok_without_pump_is_malformed() {
        let router = Router::new().route(
            "/api/pump",
            post(|| async { Json(json!({"status": "ok"})) }),
        );
        let client = client_for(serve(router).await);
        let err = client.toggle().await.unwrap_err();
        assert!(
            matches!(err, CommandError::Network(NetworkError::Malformed { .. })),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn execute_routes_commands() {
        let router = Router::new().route("/api/pump", post(pump_echo));
        let client = client_for(serve(router).await);

        let out = execute(&client, Command::Toggle).await.unwrap();
        assert_eq!(out, CommandOutcome::Pump(PumpState::On));
        let out = execute(&client, Command::SetMode(Mode::Auto)).await.unwrap();
        assert_eq!(out, CommandOutcome::Mode(Mode::Auto));
    }

    // -- login --------------------------------------------------------------

    const SESSION_COOKIE: &str = "session=ok";

    fn has_session(headers: &HeaderMap) -> bool {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(SESSION_COOKIE))
    }

    async fn guarded_data(headers: HeaderMap) -> Response {
        if !has_session(&headers) {
            return Redirect::to("/login").into_response();
        }
        Json(json!({
            "temperature": 20, "humidity": 50, "soil_percent": 30,
            "mode": "manual", "pump": "off"
        }))
        .into_response()
    }

    async fn login_form(Form(form): Form<HashMap<String, String>>) -> Response {
        let ok = form.get("username").map(String::as_str) == Some("admin")
            && form.get("password").map(String::as_str) == Some("admin");
        if ok {
            (
                [(header::SET_COOKIE, format!("{SESSION_COOKIE}; Path=/"))],
                Redirect::to("/"),
            )
                .into_response()
        } else {
            Html("<form>login</form>").into_response()
        }
    }

    fn login_router() -> Router {
        Router::new()
            .route("/", get(|| async { Html("<h1>dashboard</h1>") }))
            .route("/api/data", get(guarded_data))
            .route(
                "/login",
                get(|| async { Html("<form>login</form>") }).post(login_form),
            )
    }

    #[tokio::test]
    async fn redirect_to_login_is_unauthenticated() {
        let client = client_for(serve(login_router()).await);
        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(err.is_unauthenticated(), "got {err:?}");
    }

    #[tokio::test]
    async fn redirect_to_login_under_base_path_is_unauthenticated() {
        let router = Router::new()
            .route("/farm/api/data", get(|| async { Redirect::to("/farm/login") }))
            .route("/farm/login", get(|| async { Html("<form>login</form>") }));
        let base = serve(router).await;
        let client = client_for(format!("{base}/farm/"));

        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(err.is_unauthenticated(), "got {err:?}");
    }

    #[tokio::test]
    async fn login_then_fetch_succeeds() {
        let base = serve(login_router()).await;
        let client = HttpClient::new(&Config {
            base_url: base,
            username: Some("admin".into()),
            password: Some("admin".into()),
            ..Config::default()
        })
        .unwrap();

        client.login().await.unwrap();
        let snap = client.fetch_snapshot().await.unwrap();
        assert_eq!(snap.soil_percent, Some(30.0));
    }

    #[tokio::test]
    async fn bad_password_is_rejected() {
        let base = serve(login_router()).await;
        let client = HttpClient::new(&Config {
            base_url: base,
            username: Some("admin".into()),
            password: Some("wrong".into()),
            ..Config::default()
        })
        .unwrap();

        let err = client.login().await.unwrap_err();
        assert!(matches!(err, CommandError::Rejected { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn login_without_credentials_is_noop() {
        // nothing is listening; a real request would fail
        let client = client_for("http://127.0.0.1:1".into());
        client.login().await.unwrap();
    }
}
