use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::status::SpaStatus;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SpaError {
    #[error("HTTP request to {0} failed: {1}")]
    Http(String, #[source] reqwest::Error),

    #[error("{0} returned status {1}")]
    Status(String, reqwest::StatusCode),

    #[error("Failed to decode response from {0}: {1}")]
    Decode(String, #[source] reqwest::Error),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
}

/// Trait for spa API operations
///
/// This trait allows for mocking the spa for testing purposes
#[async_trait]
pub trait SpaClient: Send + Sync {
    /// Fetch the current status
    async fn status(&self) -> Result<SpaStatus, SpaError>;

    /// Change the heater setpoint (°C)
    async fn set_target_temperature(&self, celsius: f64) -> Result<(), SpaError>;

    /// Switch pump 1
    async fn set_pump1(&self, on: bool) -> Result<(), SpaError>;

    /// Switch the light
    async fn set_light(&self, on: bool) -> Result<(), SpaError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetpointRequest {
    target_temperature: f64,
}

#[derive(Serialize)]
struct SwitchRequest {
    on: bool,
}

/// Real client talking to the spa's local HTTP API
#[derive(Debug, Clone)]
pub struct HttpSpaClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSpaClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), SpaError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SpaError::Http(url.clone(), e))?;

        if !response.status().is_success() {
            return Err(SpaError::Status(url, response.status()));
        }

        Ok(())
    }
}

#[async_trait]
impl SpaClient for HttpSpaClient {
    async fn status(&self) -> Result<SpaStatus, SpaError> {
        let url = self.url("/api/status");
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SpaError::Http(url.clone(), e))?;

        if !response.status().is_success() {
            return Err(SpaError::Status(url, response.status()));
        }

        response
            .json::<SpaStatus>()
            .await
            .map_err(|e| SpaError::Decode(url, e))
    }

    async fn set_target_temperature(&self, celsius: f64) -> Result<(), SpaError> {
        self.post(
            "/api/setpoint",
            &SetpointRequest {
                target_temperature: celsius,
            },
        )
        .await
    }

    async fn set_pump1(&self, on: bool) -> Result<(), SpaError> {
        self.post("/api/pump1", &SwitchRequest { on }).await
    }

    async fn set_light(&self, on: bool) -> Result<(), SpaError> {
        self.post("/api/light", &SwitchRequest { on }).await
    }
}

/// Commands a `MockSpaClient` received
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Setpoint(f64),
    Pump1(bool),
    Light(bool),
}

/// Mock spa for testing
///
/// Commands are applied to the held status so a following poll sees them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSpaClient {
    pub status: std::sync::Mutex<Option<SpaStatus>>,
    pub commands: std::sync::Mutex<Vec<MockCommand>>,
    pub polls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSpaClient {
    pub fn new(status: SpaStatus) -> Self {
        Self {
            status: std::sync::Mutex::new(Some(status)),
            ..Self::default()
        }
    }

    /// A spa that fails every request
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: Option<SpaStatus>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn apply(&self, command: MockCommand) -> Result<(), SpaError> {
        let mut status = self.status.lock().unwrap();
        let status = status
            .as_mut()
            .ok_or_else(|| SpaError::UnsupportedCommand("spa offline".to_string()))?;
        match command {
            MockCommand::Setpoint(t) => status.target_temperature = t,
            MockCommand::Pump1(on) => status.pump1 = on,
            MockCommand::Light(on) => status.light = on,
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl SpaClient for MockSpaClient {
    async fn status(&self) -> Result<SpaStatus, SpaError> {
        self.polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SpaError::UnsupportedCommand("spa offline".to_string()))
    }

    async fn set_target_temperature(&self, celsius: f64) -> Result<(), SpaError> {
        self.apply(MockCommand::Setpoint(celsius))
    }

    async fn set_pump1(&self, on: bool) -> Result<(), SpaError> {
        self.apply(MockCommand::Pump1(on))
    }

    async fn set_light(&self, on: bool) -> Result<(), SpaError> {
        self.apply(MockCommand::Light(on))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::routing::post;
    use axum::Json;
    use axum::Router;
    use serde_json::Value;

    use super::*;

    type Received = Arc<Mutex<Vec<(String, Value)>>>;
    type FakeState = State<(StatusCode, Received)>;

    /// Serve a fake spa API on an ephemeral port and return its base URL
    async fn fake_spa(status_code: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();

        async fn status(State((code, _)): FakeState) -> (StatusCode, Json<Value>) {
            (
                code,
                Json(serde_json::json!({
                    "waterTemperature": 37.0,
                    "targetTemperature": 38.5,
                    "heating": true,
                    "pump1": false,
                    "light": true
                })),
            )
        }

        async fn record(
            path: &'static str,
            State((code, received)): FakeState,
            Json(body): Json<Value>,
        ) -> StatusCode {
            received.lock().unwrap().push((path.to_string(), body));
            code
        }

        let app = Router::new()
            .route("/api/status", get(status))
            .route(
                "/api/setpoint",
                post(|state: FakeState, body: Json<Value>| record("/api/setpoint", state, body)),
            )
            .route(
                "/api/pump1",
                post(|state: FakeState, body: Json<Value>| record("/api/pump1", state, body)),
            )
            .route(
                "/api/light",
                post(|state: FakeState, body: Json<Value>| record("/api/light", state, body)),
            )
            .with_state((status_code, received.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), received)
    }

    #[tokio::test]
    async fn test_http_status() {
        let (base_url, _) = fake_spa(StatusCode::OK).await;
        let client = HttpSpaClient::new(&base_url).unwrap();

        let status = client.status().await.unwrap();
        assert_eq!(
            status,
            SpaStatus {
                water_temperature: 37.0,
                target_temperature: 38.5,
                heating: true,
                pump1: false,
                light: true,
            }
        );
    }

    #[tokio::test]
    async fn test_http_commands() {
        let (base_url, received) = fake_spa(StatusCode::OK).await;
        let client = HttpSpaClient::new(&base_url).unwrap();

        client.set_target_temperature(37.5).await.unwrap();
        client.set_pump1(true).await.unwrap();
        client.set_light(false).await.unwrap();

        let received = received.lock().unwrap().clone();
        assert_eq!(
            received,
            vec![
                (
                    "/api/setpoint".to_string(),
                    serde_json::json!({"targetTemperature": 37.5})
                ),
                ("/api/pump1".to_string(), serde_json::json!({"on": true})),
                ("/api/light".to_string(), serde_json::json!({"on": false})),
            ]
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (base_url, _) = fake_spa(StatusCode::SERVICE_UNAVAILABLE).await;
        let client = HttpSpaClient::new(&base_url).unwrap();

        let err = client.status().await.unwrap_err();
        assert!(matches!(
            err,
            SpaError::Status(_, code) if code == StatusCode::SERVICE_UNAVAILABLE
        ));

        let err = client.set_light(true).await.unwrap_err();
        assert!(matches!(err, SpaError::Status(..)));
    }

    #[tokio::test]
    async fn test_unreachable_spa() {
        // Nothing listens on the discard port
        let client = HttpSpaClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(client.status().await, Err(SpaError::Http(..))));
    }
}
