//! Hetzner Cloud API client implementation.
//!
//! This module provides the HTTP client for the Hetzner Cloud REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ProviderConfig;
use crate::error::{ApiError, ProviderError, Result};

use super::api::{CloudApi, JobHandle, RescueEnabled, ServerCreated};
use super::types::{
    Action, CreateServerRequest, Datacenter, EnableRescueRequest, Image, Location, Server,
    ServerType, SshKey,
};

/// Hetzner Cloud API base URL.
pub const HCLOUD_API_URL: &str = "https://api.hetzner.cloud/v1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for idempotent reads.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Hetzner Cloud API client.
#[derive(Clone)]
pub struct HcloudClient {
    /// HTTP client.
    client: Client,
    /// API token.
    token: String,
    /// Base URL without trailing slash.
    endpoint: String,
}

/// Error envelope returned for every failed request.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Response carrying a single action.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    action: Action,
}

const NO_BODY: Option<&()> = None;

impl std::fmt::Debug for HcloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HcloudClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HcloudClient {
    /// Creates a client for the public Hetzner Cloud API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str) -> Result<Self> {
        Self::build(token, HCLOUD_API_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client against a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoint(token: &str, endpoint: &str) -> Result<Self> {
        Self::build(token, endpoint, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::build(&config.token, &config.endpoint, config.request_timeout_secs)
    }

    fn build(token: &str, endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("hcloud_provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Performs a GET request, retrying transient failures.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..MAX_RETRIES {
            if let Some(e) = &last_error {
                // rate limits tell us how long to back off
                let delay_ms = e
                    .retry_delay_secs()
                    .map_or(RETRY_DELAY_MS * u64::from(attempt), |secs| secs * 1000);
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for GET {path} in {delay_ms}ms");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let result = match self.request(Method::GET, path, query, NO_BODY).await {
                Ok(response) => Self::parse(response).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Api(ApiError::network("Max retries exceeded"))))
    }

    /// Performs a GET request, mapping 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Performs a mutating request. Never retried.
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, path, &[], body).await?;
        Self::parse(response).await
    }

    /// Posts a server action and returns its handle.
    async fn server_action<B>(&self, id: u64, action: &str, body: Option<&B>) -> Result<JobHandle>
    where
        B: Serialize + Sync + ?Sized,
    {
        let path = format!("/servers/{id}/actions/{action}");
        let response: ActionResponse = self.send(Method::POST, &path, body).await?;
        Ok(response.action.into())
    }

    async fn request<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        trace!("{method} {path}");

        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.endpoint))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));

        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        Self::check_status(path, response).await
    }

    async fn check_status(path: &str, response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (String::from("unknown"), body),
        };

        let error = match status.as_u16() {
            401 | 403 => ApiError::AuthenticationFailed { message },
            404 => {
                let mut segments = path.trim_start_matches('/').split('/');
                let resource = segments.next().unwrap_or_default();
                let id = segments.next().unwrap_or_default();
                ApiError::not_found(resource, id)
            }
            other => ApiError::api_error(other, code, message),
        };

        Err(error.into())
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }
}

#[async_trait]
impl CloudApi for HcloudClient {
    async fn create_server(&self, request: &CreateServerRequest) -> Result<ServerCreated> {
        #[derive(Deserialize)]
        struct Response {
            server: Server,
            action: Action,
            #[serde(default)]
            next_actions: Vec<Action>,
            #[serde(default)]
            root_password: Option<String>,
        }

        debug!("Creating server {}", request.name);
        let response: Response = self
            .send(Method::POST, "/servers", Some(request))
            .await?;

        Ok(ServerCreated {
            server: response.server,
            root_password: response.root_password,
            job: response.action.into(),
            follow_up: response.next_actions.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_server(&self, id: u64) -> Result<Option<Server>> {
        #[derive(Deserialize)]
        struct Response {
            server: Server,
        }

        let response: Option<Response> = self.get_optional(&format!("/servers/{id}")).await?;
        Ok(response.map(|r| r.server))
    }

    async fn rename_server(&self, id: u64, name: &str) -> Result<Server> {
        #[derive(Deserialize)]
        struct Response {
            server: Server,
        }

        let body = serde_json::json!({ "name": name });
        let response: Response = self
            .send(Method::PUT, &format!("/servers/{id}"), Some(&body))
            .await?;
        Ok(response.server)
    }

    async fn delete_server(&self, id: u64) -> Result<JobHandle> {
        let response: ActionResponse = self
            .send(Method::DELETE, &format!("/servers/{id}"), NO_BODY)
            .await?;
        Ok(response.action.into())
    }

    async fn shutdown_server(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "shutdown", NO_BODY).await
    }

    async fn power_off_server(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "poweroff", NO_BODY).await
    }

    async fn power_on_server(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "poweron", NO_BODY).await
    }

    async fn reboot_server(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "reboot", NO_BODY).await
    }

    async fn reset_server(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "reset", NO_BODY).await
    }

    async fn change_server_type(
        &self,
        id: u64,
        server_type: u64,
        upgrade_disk: bool,
    ) -> Result<JobHandle> {
        let body = serde_json::json!({
            "server_type": server_type,
            "upgrade_disk": upgrade_disk,
        });
        self.server_action(id, "change_type", Some(&body)).await
    }

    async fn change_dns_ptr(&self, id: u64, ip: &str, dns_ptr: Option<&str>) -> Result<JobHandle> {
        let body = serde_json::json!({ "ip": ip, "dns_ptr": dns_ptr });
        self.server_action(id, "change_dns_ptr", Some(&body)).await
    }

    async fn enable_backup(&self, id: u64, window: Option<&str>) -> Result<JobHandle> {
        match window.filter(|w| !w.is_empty()) {
            Some(window) => {
                let body = serde_json::json!({ "backup_window": window });
                self.server_action(id, "enable_backup", Some(&body)).await
            }
            None => self.server_action(id, "enable_backup", NO_BODY).await,
        }
    }

    async fn disable_backup(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "disable_backup", NO_BODY).await
    }

    async fn enable_rescue(
        &self,
        id: u64,
        request: &EnableRescueRequest,
    ) -> Result<RescueEnabled> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            root_password: Option<String>,
            action: Action,
        }

        let response: Response = self
            .send(
                Method::POST,
                &format!("/servers/{id}/actions/enable_rescue"),
                Some(request),
            )
            .await?;

        Ok(RescueEnabled {
            root_password: response.root_password,
            job: response.action.into(),
        })
    }

    async fn disable_rescue(&self, id: u64) -> Result<JobHandle> {
        self.server_action(id, "disable_rescue", NO_BODY).await
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        #[derive(Deserialize)]
        struct Response {
            ssh_key: SshKey,
        }

        let body = serde_json::json!({ "name": name, "public_key": public_key });
        let response: Response = self.send(Method::POST, "/ssh_keys", Some(&body)).await?;
        Ok(response.ssh_key)
    }

    async fn get_ssh_key(&self, id: u64) -> Result<Option<SshKey>> {
        #[derive(Deserialize)]
        struct Response {
            ssh_key: SshKey,
        }

        let response: Option<Response> = self.get_optional(&format!("/ssh_keys/{id}")).await?;
        Ok(response.map(|r| r.ssh_key))
    }

    async fn rename_ssh_key(&self, id: u64, name: &str) -> Result<SshKey> {
        #[derive(Deserialize)]
        struct Response {
            ssh_key: SshKey,
        }

        let body = serde_json::json!({ "name": name });
        let response: Response = self
            .send(Method::PUT, &format!("/ssh_keys/{id}"), Some(&body))
            .await?;
        Ok(response.ssh_key)
    }

    async fn delete_ssh_key(&self, id: u64) -> Result<()> {
        self.request(Method::DELETE, &format!("/ssh_keys/{id}"), &[], NO_BODY)
            .await?;
        Ok(())
    }

    async fn get_datacenter(&self, id: u64) -> Result<Option<Datacenter>> {
        #[derive(Deserialize)]
        struct Response {
            datacenter: Datacenter,
        }

        let response: Option<Response> = self.get_optional(&format!("/datacenters/{id}")).await?;
        Ok(response.map(|r| r.datacenter))
    }

    async fn get_datacenter_by_name(&self, name: &str) -> Result<Option<Datacenter>> {
        #[derive(Deserialize)]
        struct Response {
            datacenters: Vec<Datacenter>,
        }

        let response: Response = self.get("/datacenters", &[("name", name)]).await?;
        Ok(response.datacenters.into_iter().next())
    }

    async fn get_image(&self, id: u64) -> Result<Option<Image>> {
        #[derive(Deserialize)]
        struct Response {
            image: Image,
        }

        let response: Option<Response> = self.get_optional(&format!("/images/{id}")).await?;
        Ok(response.map(|r| r.image))
    }

    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>> {
        #[derive(Deserialize)]
        struct Response {
            images: Vec<Image>,
        }

        let response: Response = self.get("/images", &[("name", name)]).await?;
        Ok(response.images.into_iter().next())
    }

    async fn get_location(&self, id: u64) -> Result<Option<Location>> {
        #[derive(Deserialize)]
        struct Response {
            location: Location,
        }

        let response: Option<Response> = self.get_optional(&format!("/locations/{id}")).await?;
        Ok(response.map(|r| r.location))
    }

    async fn get_location_by_name(&self, name: &str) -> Result<Option<Location>> {
        #[derive(Deserialize)]
        struct Response {
            locations: Vec<Location>,
        }

        let response: Response = self.get("/locations", &[("name", name)]).await?;
        Ok(response.locations.into_iter().next())
    }

    async fn get_server_type(&self, id: u64) -> Result<Option<ServerType>> {
        #[derive(Deserialize)]
        struct Response {
            server_type: ServerType,
        }

        let response: Option<Response> = self.get_optional(&format!("/server_types/{id}")).await?;
        Ok(response.map(|r| r.server_type))
    }

    async fn get_server_type_by_name(&self, name: &str) -> Result<Option<ServerType>> {
        #[derive(Deserialize)]
        struct Response {
            server_types: Vec<ServerType>,
        }

        let response: Response = self.get("/server_types", &[("name", name)]).await?;
        Ok(response.server_types.into_iter().next())
    }

    async fn get_action(&self, id: u64) -> Result<Action> {
        let response: ActionResponse = self.get(&format!("/actions/{id}"), &[]).await?;
        Ok(response.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_json(id: u64, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "web-1",
            "status": status,
            "created": "2024-03-01T10:00:00+00:00",
            "public_net": { "ipv4": { "ip": "203.0.113.10", "dns_ptr": "static.example.com" } },
            "server_type": { "id": 1, "name": "cx22" },
            "datacenter": {
                "id": 4,
                "name": "fsn1-dc14",
                "location": { "id": 1, "name": "fsn1" }
            },
            "backup_window": null,
            "rescue_enabled": false
        })
    }

    fn action_json(id: u64, command: &str) -> serde_json::Value {
        json!({ "id": id, "command": command, "status": "running", "progress": 0, "error": null })
    }

    async fn client(server: &MockServer) -> HcloudClient {
        HcloudClient::with_endpoint("secret", &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_get_server_sends_bearer_token() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/42"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "server": server_json(42, "running") })),
            )
            .expect(1)
            .mount(&mock)
            .await;

        let server = client(&mock).await.get_server(42).await.unwrap().unwrap();
        assert_eq!(server.id, 42);
        assert_eq!(server.ipv4_ptr(), Some("static.example.com"));
    }

    #[tokio::test]
    async fn test_missing_server_is_none() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/7"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "not_found", "message": "server with ID '7' not found" }
            })))
            .mount(&mock)
            .await;

        let server = client(&mock).await.get_server(7).await.unwrap();
        assert!(server.is_none());
    }

    #[tokio::test]
    async fn test_error_envelope_is_surfaced() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/42/actions/change_type"))
            .and(body_json(json!({ "server_type": 3, "upgrade_disk": false })))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error": { "code": "invalid_server_type", "message": "server type is deprecated" }
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let err = client(&mock)
            .await
            .change_server_type(42, 3, false)
            .await
            .unwrap_err();

        match err {
            ProviderError::Api(ApiError::ApiRequestFailed {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 422);
                assert_eq!(code, "invalid_server_type");
                assert_eq!(message, "server type is deprecated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ssh_keys/1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "code": "unauthorized", "message": "unable to authenticate" }
            })))
            .mount(&mock)
            .await;

        let err = client(&mock).await.get_ssh_key(1).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Api(ApiError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_read_waits_and_retries() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/42"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "server": server_json(42, "running") })),
            )
            .expect(1)
            .mount(&mock)
            .await;

        let started = std::time::Instant::now();
        let server = client(&mock).await.get_server(42).await.unwrap().unwrap();

        assert_eq!(server.id, 42);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rate_limited_mutation_is_not_retried() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/42/actions/poweron"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .expect(1)
            .mount(&mock)
            .await;

        let err = client(&mock).await.power_on_server(42).await.unwrap_err();
        assert_eq!(err.retry_delay_secs(), Some(5));
    }

    #[tokio::test]
    async fn test_create_server_collects_actions() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .and(body_json(json!({
                "name": "web-1",
                "server_type": 1,
                "image": 114,
                "location": 1
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "server": server_json(42, "initializing"),
                "action": action_json(10, "create_server"),
                "next_actions": [action_json(11, "start_server")],
                "root_password": "hunter2"
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let request = CreateServerRequest {
            name: String::from("web-1"),
            server_type: 1,
            image: 114,
            ssh_keys: vec![],
            location: Some(1),
            datacenter: None,
            user_data: None,
        };

        let created = client(&mock).await.create_server(&request).await.unwrap();
        assert_eq!(created.server.id, 42);
        assert_eq!(created.job.id(), 10);
        assert_eq!(created.follow_up.len(), 1);
        assert_eq!(created.follow_up[0].command(), "start_server");
        assert_eq!(created.root_password.as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_lookup_by_name_uses_query() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images"))
            .and(query_param("name", "ubuntu-24.04"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "images": [{ "id": 114, "name": "ubuntu-24.04", "description": "Ubuntu 24.04", "status": "available" }]
            })))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .and(query_param("name", "atlantis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "locations": [] })))
            .mount(&mock)
            .await;

        let client = client(&mock).await;
        let image = client.get_image_by_name("ubuntu-24.04").await.unwrap().unwrap();
        assert_eq!(image.id, 114);
        assert!(client.get_location_by_name("atlantis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enable_backup_without_window_sends_no_body() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/42/actions/enable_backup"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "action": action_json(5, "enable_backup") })),
            )
            .expect(1)
            .mount(&mock)
            .await;

        let job = client(&mock).await.enable_backup(42, Some("")).await.unwrap();
        assert_eq!(job.id(), 5);

        let requests = mock.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_delete_ssh_key_accepts_empty_response() {
        let mock = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/ssh_keys/9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock)
            .await;

        client(&mock).await.delete_ssh_key(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_endpoint_trailing_slash_is_trimmed() {
        let client = HcloudClient::with_endpoint("t", "http://localhost:1234/v1/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/v1");
    }
}
