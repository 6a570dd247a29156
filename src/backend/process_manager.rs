//! HTTP client for the external process manager

use super::ProcessManager;
use crate::core::{ProcessManagerConfig, ProcessManagerError, ScriptRegistration};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-API-Key";

/// Upper bound for one process-manager call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `POST /api/add-script`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddScriptRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl AddScriptRequest {
    /// Build a registration request, resolving a relative script path
    /// against the repository root.
    pub fn from_registration(script: &ScriptRegistration, repo_root: &Path) -> Self {
        let path = script.path.as_deref().map(|p| {
            let p = Path::new(p);
            if p.is_absolute() {
                p.to_string_lossy().into_owned()
            } else {
                repo_root.join(p).to_string_lossy().into_owned()
            }
        });

        Self {
            name: script.name.clone(),
            path,
            command: script.command.clone(),
            script_type: script.script_type.clone(),
            schedule: script.schedule.clone(),
            args: script.args.clone(),
            env: script.env.clone(),
        }
    }
}

/// A script as listed by `GET /api/scripts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// The `{success, message|error}` envelope every endpoint returns
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    scripts: Option<Vec<ScriptInfo>>,
}

fn default_success() -> bool {
    true
}

/// `GET /api/scripts` may answer with a bare list or the envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptListing {
    Bare(Vec<ScriptInfo>),
    Wrapped(ApiResponse),
}

/// reqwest-backed [`ProcessManager`]
#[derive(Debug, Clone)]
pub struct ProcessManagerClient {
    client: Client,
}

impl ProcessManagerClient {
    /// Client with a [`REQUEST_TIMEOUT`] on every call
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    /// Use a preconfigured HTTP client (timeouts, proxies, TLS)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// `{base}/api/{segments...}`, each segment percent-encoded
    fn url(endpoint: &ProcessManagerConfig, segments: &[&str]) -> Result<Url, ProcessManagerError> {
        let invalid = || ProcessManagerError::InvalidUrl(endpoint.url.clone());
        let mut url = Url::parse(endpoint.url.trim_end_matches('/')).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, endpoint: &ProcessManagerConfig, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match endpoint.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.header(API_KEY_HEADER, key),
            _ => builder,
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProcessManagerError> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiResponse>(&body)
                .ok()
                .and_then(|r| r.error.or(r.message))
                .unwrap_or(body);
            return Err(ProcessManagerError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// POST to a script action endpoint and unwrap the envelope
    async fn script_action(
        &self,
        endpoint: &ProcessManagerConfig,
        action: &str,
        name: &str,
    ) -> Result<String, ProcessManagerError> {
        let url = Self::url(endpoint, &[action, name])?;
        debug!("POST {}", url);
        let response = self.request(Method::POST, endpoint, url).send().await?;
        envelope(Self::handle_response(response).await?)
    }
}

fn envelope(response: ApiResponse) -> Result<String, ProcessManagerError> {
    if response.success {
        Ok(response.message.unwrap_or_default())
    } else {
        Err(ProcessManagerError::Rejected(
            response
                .error
                .or(response.message)
                .unwrap_or_else(|| "request was not successful".to_string()),
        ))
    }
}

impl Default for ProcessManagerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessManager for ProcessManagerClient {
    async fn restart_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.script_action(endpoint, "restart-script", name).await
    }

    async fn stop_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.script_action(endpoint, "stop-script", name).await
    }

    async fn start_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.script_action(endpoint, "start-script", name).await
    }

    async fn add_script(
        &self,
        endpoint: &ProcessManagerConfig,
        script: &AddScriptRequest,
    ) -> Result<String, ProcessManagerError> {
        let url = Self::url(endpoint, &["add-script"])?;
        debug!("POST {} ({})", url, script.name);
        let response = self
            .request(Method::POST, endpoint, url)
            .json(script)
            .send()
            .await?;
        envelope(Self::handle_response(response).await?)
    }

    async fn list_scripts(&self, endpoint: &ProcessManagerConfig) -> Result<Vec<ScriptInfo>, ProcessManagerError> {
        let url = Self::url(endpoint, &["scripts"])?;
        let response = self.request(Method::GET, endpoint, url).send().await?;

        match Self::handle_response::<ScriptListing>(response).await? {
            ScriptListing::Bare(scripts) => Ok(scripts),
            ScriptListing::Wrapped(response) => {
                let scripts = response.scripts.clone().unwrap_or_default();
                envelope(response)?;
                Ok(scripts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint(url: &str) -> ProcessManagerConfig {
        ProcessManagerConfig {
            url: url.to_string(),
            api_key: None,
        }
    }

    #[test]
    fn test_url_building() {
        let url = ProcessManagerClient::url(&endpoint("http://localhost:3000/"), &["restart-script", "api"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/restart-script/api");

        let url = ProcessManagerClient::url(&endpoint("http://pm:3000/base"), &["scripts"]).unwrap();
        assert_eq!(url.as_str(), "http://pm:3000/base/api/scripts");
    }

    #[test]
    fn test_script_names_are_encoded() {
        let url = ProcessManagerClient::url(&endpoint("http://localhost:3000"), &["stop-script", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/stop-script/a%20b%2Fc");
    }

    #[test]
    fn test_invalid_url() {
        let err = ProcessManagerClient::url(&endpoint("not a url"), &["scripts"]).unwrap_err();
        assert!(matches!(err, ProcessManagerError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_custom_client_reports_bad_endpoint() {
        let client = ProcessManagerClient::with_client(Client::new());
        let err = client.restart_script(&endpoint("not a url"), "api").await.unwrap_err();
        assert!(matches!(err, ProcessManagerError::InvalidUrl(u) if u == "not a url"));
    }

    #[test]
    fn test_envelope() {
        let ok: ApiResponse = serde_json::from_value(json!({ "success": true, "message": "restarted" })).unwrap();
        assert_eq!(envelope(ok).unwrap(), "restarted");

        let rejected: ApiResponse = serde_json::from_value(json!({ "success": false, "error": "no such script" })).unwrap();
        assert!(matches!(envelope(rejected), Err(ProcessManagerError::Rejected(m)) if m == "no such script"));
    }

    #[test]
    fn test_add_script_request_resolves_relative_path() {
        let script: ScriptRegistration = serde_yaml::from_str(
            "name: worker\npath: dist/worker.js\ntype: node\nargs: [\"--port\", \"8080\"]\n",
        )
        .unwrap();

        let request = AddScriptRequest::from_registration(&script, Path::new("/srv/app"));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["name"], "worker");
        assert_eq!(body["path"], "/srv/app/dist/worker.js");
        assert_eq!(body["type"], "node");
        assert_eq!(body["args"], json!(["--port", "8080"]));
        assert!(body.get("env").is_none());
        assert!(body.get("schedule").is_none());
    }

    #[test]
    fn test_script_listing_shapes() {
        let bare: ScriptListing = serde_json::from_value(json!([{ "name": "api", "status": "running", "pid": 42 }])).unwrap();
        match bare {
            ScriptListing::Bare(scripts) => {
                assert_eq!(scripts[0].name, "api");
                assert_eq!(scripts[0].extra["pid"], 42);
            }
            other => panic!("unexpected listing: {other:?}"),
        }

        let wrapped: ScriptListing =
            serde_json::from_value(json!({ "success": true, "scripts": [{ "name": "worker" }] })).unwrap();
        assert!(matches!(wrapped, ScriptListing::Wrapped(_)));
    }
}
