//! REST client for the testbed Container Service.
//!
//! ```text
//! POST   /containers                 create           (409 on name conflict)
//! GET    /containers/{id}            inspect
//! GET    /containers?name={name}     find by name
//! DELETE /containers/{id}            destroy          (404 once gone)
//! POST   /containers/{id}/execute    run a command
//! PUT    /containers/{id}/files      write one file
//! POST   /floatingips                allocate + associate (409 when exhausted)
//! DELETE /floatingips/{id}           release
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::ContainerService;
use crate::container::{CommandOutput, Container, ContainerSpec, FloatingIp};
use crate::error::{EdgeError, Result};

/// Body of `POST /containers/{id}/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
}

/// Answer to `POST /containers/{id}/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub exit_code: i32,
}

/// Body of `PUT /containers/{id}/files`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub path: String,
    /// Base64-encoded file content
    pub content: String,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssociateRequest {
    container_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ContainerList {
    containers: Vec<Container>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Configuration for [`HttpContainerService`].
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Base URL, e.g. `https://testbed.example.org/v1`
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9517/v1".into(),
            token: None,
            timeout_ms: 120_000,
        }
    }
}

/// Container Service reached over HTTP.
#[derive(Clone)]
pub struct HttpContainerService {
    config: HttpServiceConfig,
    client: Client,
}

impl HttpContainerService {
    /// Start building a client for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> HttpContainerServiceBuilder {
        HttpContainerServiceBuilder::new(base_url.into())
    }

    /// Create with full config.
    pub fn with_config(config: HttpServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EdgeError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| EdgeError::Connection(e.to_string()))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| EdgeError::Connection(format!("invalid response body: {}", e)))
    }
}

/// Turn an unexpected status into [`EdgeError::Api`], keeping the service's message.
async fn api_error(response: Response) -> EdgeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);
    EdgeError::Api { status, message }
}

impl std::fmt::Debug for HttpContainerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContainerService")
            .field("base_url", &self.config.base_url)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

#[async_trait]
impl ContainerService for HttpContainerService {
    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container> {
        info!("Requesting container");
        let response = self.send(self.client.post(self.url("/containers")).json(spec)).await?;

        match response.status() {
            StatusCode::CONFLICT => Err(EdgeError::Conflict {
                name: spec.name.clone(),
            }),
            s if s.is_success() => Self::decode(response).await,
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn get_container(&self, id: &str) -> Result<Container> {
        let response = self
            .send(self.client.get(self.url(&format!("/containers/{}", id))))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EdgeError::NotFound(format!("container {}", id))),
            s if s.is_success() => Self::decode(response).await,
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn find_container(&self, name: &str) -> Result<Option<Container>> {
        let request = self.client.get(self.url("/containers")).query(&[("name", name)]);
        let response = self.send(request).await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let list: ContainerList = Self::decode(response).await?;
        Ok(list.containers.into_iter().find(|c| c.name == name))
    }

    #[instrument(skip(self))]
    async fn destroy_container(&self, id: &str) -> Result<()> {
        info!("Destroying container");
        let response = self
            .send(self.client.delete(self.url(&format!("/containers/{}", id))))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EdgeError::NotFound(format!("container {}", id))),
            s if s.is_success() => Ok(()),
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self, command))]
    async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput> {
        debug!("Executing: {}", command);
        let body = ExecuteRequest {
            command: command.to_string(),
        };
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/containers/{}/execute", id)))
                    .json(&body),
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EdgeError::NotFound(format!("container {}", id))),
            s if s.is_success() => {
                let exec: ExecuteResponse = Self::decode(response).await?;
                Ok(CommandOutput {
                    output: exec.output,
                    exit_status: exec.exit_code,
                })
            }
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn upload_file(&self, id: &str, remote_path: &str, content: &[u8], mode: u32) -> Result<()> {
        let body = FileUpload {
            path: remote_path.to_string(),
            content: base64::engine::general_purpose::STANDARD.encode(content),
            mode,
        };
        let request = self
            .client
            .put(self.url(&format!("/containers/{}/files", id)))
            .json(&body);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| EdgeError::Transfer(format!("{}: {}", remote_path, e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let err = api_error(response).await;
            Err(EdgeError::Transfer(format!("{}: {}", remote_path, err)))
        }
    }

    #[instrument(skip(self))]
    async fn associate_floating_ip(&self, container_id: &str) -> Result<FloatingIp> {
        info!("Allocating floating IP");
        let body = AssociateRequest {
            container_id: container_id.to_string(),
        };
        let response = self
            .send(self.client.post(self.url("/floatingips")).json(&body))
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Err(EdgeError::AddressPoolExhausted),
            StatusCode::NOT_FOUND => Err(EdgeError::NotFound(format!("container {}", container_id))),
            s if s.is_success() => Self::decode(response).await,
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        info!("Releasing floating IP");
        let response = self
            .send(self.client.delete(self.url(&format!("/floatingips/{}", id))))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EdgeError::NotFound(format!("floating ip {}", id))),
            s if s.is_success() => Ok(()),
            _ => Err(api_error(response).await),
        }
    }
}

/// Builder for [`HttpContainerService`].
pub struct HttpContainerServiceBuilder {
    config: HttpServiceConfig,
}

impl HttpContainerServiceBuilder {
    fn new(base_url: String) -> Self {
        Self {
            config: HttpServiceConfig {
                base_url,
                ..Default::default()
            },
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Set the per-request timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    pub fn build(self) -> Result<HttpContainerService> {
        HttpContainerService::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let service = HttpContainerService::new("http://testbed:9517/v1/")
            .token("secret")
            .timeout_ms(5000)
            .build()
            .unwrap();

        assert_eq!(service.config.token, Some("secret".into()));
        assert_eq!(service.config.timeout_ms, 5000);
        assert_eq!(service.url("/containers"), "http://testbed:9517/v1/containers");
    }

    #[test]
    fn test_default_config() {
        let config = HttpServiceConfig::default();
        assert!(config.token.is_none());
        assert_eq!(config.timeout_ms, 120_000);
    }
}
