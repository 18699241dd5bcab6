// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Control Plane Adapter
//!
//! JSON/REST adapter for the runtime control plane. Implements the
//! [`ControlPlane`] trait as an Anti-Corruption Layer: remote status codes are
//! classified into [`ControlPlaneError`] variants and nothing is retried here.
//!
//! # API Endpoints
//!
//! - `POST /memories`, `GET /memories`, `GET|DELETE /memories/{id}`
//! - `POST /runtimes`, `GET /runtimes`, `GET|PUT|DELETE /runtimes/{id}`
//! - `POST /runtimes/{id}/endpoints`, `GET /runtimes/{id}/endpoints`
//! - `GET|DELETE /runtimes/{id}/endpoints/{name}`
//! - `GET /tags?resourceArn=...`
//!
//! Every request carries `x-aro-region` and `x-aro-account-id` headers.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::domain::control_plane::{
    ControlPlane, ControlPlaneError, CreateEndpointRequest, CreateMemoryRequest,
    CreateRuntimeRequest, EndpointDescription, MemoryDescription, Page, RuntimeDescription,
    RuntimeHandle, RuntimeSpec,
};
use crate::domain::lifecycle_config::ControlPlaneConfig;
use crate::domain::runtime::{MemoryId, RuntimeId};

const REGION_HEADER: &str = "x-aro-region";
const ACCOUNT_HEADER: &str = "x-aro-account-id";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: HashMap<String, String>,
}

pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
    region: String,
    account_id: String,
}

impl HttpControlPlane {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, ControlPlaneError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            ControlPlaneError::Permanent("http control plane requires an endpoint".to_string())
        })?;
        let base_url = Url::parse(endpoint)
            .map_err(|e| ControlPlaneError::Permanent(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ControlPlaneError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            region: config.region.clone(),
            account_id: config.account_id.clone(),
        })
    }

    /// Build a URL from already-validated path segments. Segments are percent
    /// encoded individually.
    fn url(&self, segments: &[&str]) -> Result<Url, ControlPlaneError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ControlPlaneError::Permanent(format!("endpoint {} cannot be a base URL", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(REGION_HEADER, &self.region)
            .header(ACCOUNT_HEADER, &self.account_id)
    }

    fn page_query(next_token: Option<&str>, max_results: u32) -> Vec<(&'static str, String)> {
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(token) = next_token {
            query.push(("nextToken", token.to_string()));
        }
        query
    }

    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response, ControlPlaneError> {
        let response = self.with_headers(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status));
        debug!(target, %status, "Control plane returned an error status");
        Err(classify_status(status, format!("{}: {}", target, body)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        target: &str,
    ) -> Result<T, ControlPlaneError> {
        let response = self.send(request, target).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map a non-success status to an error class
pub fn classify_status(status: StatusCode, message: String) -> ControlPlaneError {
    match status {
        StatusCode::CONFLICT => ControlPlaneError::AlreadyExists(message),
        StatusCode::NOT_FOUND => ControlPlaneError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ControlPlaneError::Throttled(message),
        StatusCode::REQUEST_TIMEOUT => ControlPlaneError::Transient(message),
        s if s.is_server_error() => ControlPlaneError::Transient(message),
        _ => ControlPlaneError::Permanent(message),
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_memory(
        &self,
        request: &CreateMemoryRequest,
    ) -> Result<MemoryDescription, ControlPlaneError> {
        let url = self.url(&["memories"])?;
        self.send_json(self.client.post(url).json(request), &request.name)
            .await
    }

    async fn get_memory(&self, memory_id: &MemoryId) -> Result<MemoryDescription, ControlPlaneError> {
        let url = self.url(&["memories", memory_id.as_str()])?;
        self.send_json(self.client.get(url), memory_id.as_str()).await
    }

    async fn list_memories(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<MemoryDescription>, ControlPlaneError> {
        let url = self.url(&["memories"])?;
        let query = Self::page_query(next_token, max_results);
        self.send_json(self.client.get(url).query(&query), "memories")
            .await
    }

    async fn delete_memory(&self, memory_id: &MemoryId) -> Result<(), ControlPlaneError> {
        let url = self.url(&["memories", memory_id.as_str()])?;
        self.send(self.client.delete(url), memory_id.as_str()).await?;
        Ok(())
    }

    async fn list_runtimes(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<RuntimeDescription>, ControlPlaneError> {
        let url = self.url(&["runtimes"])?;
        let query = Self::page_query(next_token, max_results);
        self.send_json(self.client.get(url).query(&query), "runtimes")
            .await
    }

    async fn create_runtime(
        &self,
        request: &CreateRuntimeRequest,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        let url = self.url(&["runtimes"])?;
        self.send_json(self.client.post(url).json(request), &request.agent_runtime_name)
            .await
    }

    async fn update_runtime(
        &self,
        runtime_id: &RuntimeId,
        spec: &RuntimeSpec,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str()])?;
        self.send_json(self.client.put(url).json(spec), runtime_id.as_str())
            .await
    }

    async fn get_runtime(
        &self,
        runtime_id: &RuntimeId,
        version: Option<&str>,
    ) -> Result<RuntimeDescription, ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str()])?;
        let mut request = self.client.get(url);
        if let Some(version) = version {
            request = request.query(&[("version", version)]);
        }
        self.send_json(request, runtime_id.as_str()).await
    }

    async fn delete_runtime(&self, runtime_id: &RuntimeId) -> Result<(), ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str()])?;
        self.send(self.client.delete(url), runtime_id.as_str()).await?;
        Ok(())
    }

    async fn list_endpoints(
        &self,
        runtime_id: &RuntimeId,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<EndpointDescription>, ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str(), "endpoints"])?;
        let query = Self::page_query(next_token, max_results);
        self.send_json(self.client.get(url).query(&query), runtime_id.as_str())
            .await
    }

    async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<EndpointDescription, ControlPlaneError> {
        let url = self.url(&["runtimes", request.agent_runtime_id.as_str(), "endpoints"])?;
        self.send_json(self.client.post(url).json(request), &request.name)
            .await
    }

    async fn get_endpoint(
        &self,
        runtime_id: &RuntimeId,
        name: &str,
    ) -> Result<EndpointDescription, ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str(), "endpoints", name])?;
        self.send_json(self.client.get(url), name).await
    }

    async fn delete_endpoint(&self, runtime_id: &RuntimeId, name: &str) -> Result<(), ControlPlaneError> {
        let url = self.url(&["runtimes", runtime_id.as_str(), "endpoints", name])?;
        self.send(self.client.delete(url), name).await?;
        Ok(())
    }

    async fn list_tags(&self, resource_arn: &str) -> Result<HashMap<String, String>, ControlPlaneError> {
        let url = self.url(&["tags"])?;
        let response: TagsResponse = self
            .send_json(self.client.get(url).query(&[("resourceArn", resource_arn)]), resource_arn)
            .await?;
        Ok(response.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::control_plane::{MemoryStatus, RuntimeStatus};
    use mockito::{Matcher, Server};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn config(endpoint: String) -> ControlPlaneConfig {
        ControlPlaneConfig {
            endpoint: Some(endpoint),
            region: "eu-west-1".to_string(),
            account_id: "123456789012".to_string(),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_memory_sends_request_and_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/memories")
            .match_header("x-aro-region", "eu-west-1")
            .match_header("x-aro-account-id", "123456789012")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "name": "demoMemory",
                "eventExpiryDuration": 90
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"demoMemory-abc","name":"demoMemory","arn":"arn:memory/demoMemory-abc","status":"CREATING"}"#)
            .create_async()
            .await;

        let control_plane = HttpControlPlane::new(&config(server.url())).unwrap();
        let memory = control_plane
            .create_memory(&CreateMemoryRequest {
                name: "demoMemory".to_string(),
                event_expiry_duration: 90,
                tags: BTreeMap::new(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(memory.id.as_str(), "demoMemory-abc");
        assert_eq!(memory.status, MemoryStatus::Creating);
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let mut server = Server::new_async().await;
        let cases = [
            (409, "conflict"),
            (404, "missing"),
            (429, "throttled"),
            (503, "unavailable"),
            (400, "invalid"),
        ];
        let mut mocks = Vec::new();
        for (status, id) in cases {
            let mock = server
                .mock("GET", format!("/runtimes/{}", id).as_str())
                .with_status(status)
                .with_body("nope")
                .create_async()
                .await;
            mocks.push(mock);
        }

        let control_plane = HttpControlPlane::new(&config(server.url())).unwrap();
        let get = |id: &'static str| {
            let control_plane = &control_plane;
            async move { control_plane.get_runtime(&RuntimeId::new(id), None).await }
        };

        assert!(matches!(get("conflict").await, Err(ControlPlaneError::AlreadyExists(_))));
        assert!(matches!(get("missing").await, Err(ControlPlaneError::NotFound(_))));
        assert!(matches!(get("throttled").await, Err(ControlPlaneError::Throttled(_))));
        assert!(matches!(get("unavailable").await, Err(ControlPlaneError::Transient(_))));
        assert!(matches!(get("invalid").await, Err(ControlPlaneError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_get_runtime_with_version_and_list_endpoints_paging() {
        let mut server = Server::new_async().await;
        let runtime_mock = server
            .mock("GET", "/runtimes/rt-1")
            .match_query(Matcher::UrlEncoded("version".into(), "3".into()))
            .with_status(200)
            .with_body(r#"{"agentRuntimeId":"rt-1","agentRuntimeName":"demo","agentRuntimeArn":"arn:runtime/rt-1","agentRuntimeVersion":"3","status":"READY"}"#)
            .create_async()
            .await;
        let endpoints_mock = server
            .mock("GET", "/runtimes/rt-1/endpoints")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "20".into()),
                Matcher::UrlEncoded("nextToken".into(), "page-2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"items":[{"name":"blue","liveVersion":"3","status":"READY"}]}"#)
            .create_async()
            .await;

        let control_plane = HttpControlPlane::new(&config(server.url())).unwrap();
        let runtime = control_plane
            .get_runtime(&RuntimeId::new("rt-1"), Some("3"))
            .await
            .unwrap();
        assert_eq!(runtime.status, RuntimeStatus::Ready);

        let page = control_plane
            .list_endpoints(&RuntimeId::new("rt-1"), Some("page-2"), 20)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "blue");
        assert!(page.next_token.is_none());

        runtime_mock.assert_async().await;
        endpoints_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_tags() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/tags")
            .match_query(Matcher::UrlEncoded("resourceArn".into(), "arn:runtime/rt-1".into()))
            .with_status(200)
            .with_body(r#"{"tags":{"Stack":"agents","Environment":"dev"}}"#)
            .create_async()
            .await;

        let control_plane = HttpControlPlane::new(&config(server.url())).unwrap();
        let tags = control_plane.list_tags("arn:runtime/rt-1").await.unwrap();
        assert_eq!(tags.get("Stack").map(String::as_str), Some("agents"));
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        let result = HttpControlPlane::new(&ControlPlaneConfig::default());
        assert!(matches!(result, Err(ControlPlaneError::Permanent(_))));
    }
}
