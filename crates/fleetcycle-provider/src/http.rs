//! HTTP/JSON fleet provider client.
//!
//! Talks to a fleet-management REST endpoint over HTTP/1.1 with a
//! fresh connection per request (the controller issues at most one
//! request per poll interval, so connection reuse buys nothing).

use std::time::Duration;

use http_body_util::BodyExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use fleetcycle_core::{
    FleetError, FleetGroup, FleetResult, GroupName, GroupUpdate, HealthStatus, ImageMetadata,
    ImageRef, InstanceId, InstanceRef, LaunchTemplate, LifecycleState, TemplateRef,
};

use crate::provider::FleetProvider;

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fleet provider backed by a fleet-management HTTP API.
#[derive(Debug, Clone)]
pub struct HttpFleet {
    /// API endpoint as "host:port".
    endpoint: String,
    timeout: Duration,
}

impl HttpFleet {
    /// Create a client for the given "host:port" endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue one request and return the status plus collected body.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> FleetResult<(http::StatusCode, bytes::Bytes)> {
        let uri = format!("http://{}{}", self.endpoint, path);

        let result = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(&self.endpoint)
                .await
                .map_err(|e| FleetError::Transport(format!("connect {}: {e}", self.endpoint)))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| FleetError::Transport(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let payload = body.unwrap_or_default();
            let req = http::Request::builder()
                .method(method)
                .uri(&uri)
                .header("host", &self.endpoint)
                .header("content-type", "application/json")
                .header("user-agent", "fleetcycle/0.1")
                .body(http_body_util::Full::new(bytes::Bytes::from(payload)))
                .map_err(|e| FleetError::Transport(format!("build request: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| FleetError::Transport(format!("{method} {path}: {e}")))?;

            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| FleetError::Transport(format!("read body: {e}")))?
                .to_bytes();

            debug!(%method, %path, status = %status, "provider request");
            Ok::<_, FleetError>((status, bytes))
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(FleetError::Transport(format!(
                "{method} {path}: timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> FleetResult<T> {
        let (status, body) = self.request("GET", path, None).await?;
        if !status.is_success() {
            return Err(status_error(status, path, &body));
        }
        serde_json::from_slice(&body).map_err(|e| FleetError::Decode(format!("{path}: {e}")))
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: &B,
    ) -> FleetResult<T> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| FleetError::Decode(format!("encode {path}: {e}")))?;
        let (status, resp) = self.request(method, path, Some(payload)).await?;
        if !status.is_success() {
            return Err(status_error(status, path, &resp));
        }
        serde_json::from_slice(&resp).map_err(|e| FleetError::Decode(format!("{path}: {e}")))
    }
}

/// Map a non-2xx response to the provider error taxonomy.
fn status_error(status: http::StatusCode, path: &str, body: &[u8]) -> FleetError {
    let detail = String::from_utf8_lossy(body);
    let detail = detail.trim();
    match status {
        http::StatusCode::NOT_FOUND => FleetError::NotFound(path.to_string()),
        s if s.is_client_error() => FleetError::Rejected(format!("{path}: {s}: {detail}")),
        s => FleetError::Transport(format!("{path}: {s}: {detail}")),
    }
}

#[derive(serde::Deserialize)]
struct CreateTemplateResponse {
    #[serde(rename = "ref")]
    template_ref: TemplateRef,
}

impl FleetProvider for HttpFleet {
    async fn get_group(&self, name: &GroupName) -> FleetResult<FleetGroup> {
        self.get_json(&format!("/v1/groups/{name}")).await
    }

    async fn get_image(&self, image: &ImageRef) -> FleetResult<ImageMetadata> {
        self.get_json(&format!("/v1/images/{image}")).await
    }

    async fn get_launch_template(&self, tref: &TemplateRef) -> FleetResult<LaunchTemplate> {
        self.get_json(&format!("/v1/launch-templates/{tref}")).await
    }

    async fn create_launch_template(&self, spec: &LaunchTemplate) -> FleetResult<TemplateRef> {
        let resp: CreateTemplateResponse =
            self.send_json("POST", "/v1/launch-templates", spec).await?;
        Ok(resp.template_ref)
    }

    async fn update_group(&self, name: &GroupName, update: &GroupUpdate) -> FleetResult<()> {
        let path = format!("/v1/groups/{name}");
        let payload = serde_json::to_vec(update)
            .map_err(|e| FleetError::Decode(format!("encode {path}: {e}")))?;
        let (status, body) = self.request("PATCH", &path, Some(payload)).await?;
        if !status.is_success() {
            return Err(status_error(status, &path, &body));
        }
        Ok(())
    }

    async fn list_group_instances(&self, name: &GroupName) -> FleetResult<Vec<InstanceRef>> {
        self.get_json(&format!("/v1/groups/{name}/instances")).await
    }

    async fn get_instance_health(&self, id: &InstanceId) -> FleetResult<HealthStatus> {
        self.get_json(&format!("/v1/instances/{id}/health")).await
    }

    async fn get_instance_image(&self, id: &InstanceId) -> FleetResult<ImageRef> {
        self.get_json(&format!("/v1/instances/{id}/image")).await
    }

    async fn get_instance_lifecycle(&self, id: &InstanceId) -> FleetResult<LifecycleState> {
        self.get_json(&format!("/v1/instances/{id}/lifecycle")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_from_404() {
        let err = status_error(http::StatusCode::NOT_FOUND, "/v1/groups/web", b"");
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[test]
    fn client_errors_map_to_rejected() {
        let err = status_error(
            http::StatusCode::BAD_REQUEST,
            "/v1/groups/web",
            b"desired exceeds max",
        );
        match err {
            FleetError::Rejected(msg) => assert!(msg.contains("desired exceeds max")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_map_to_transport() {
        let err = status_error(http::StatusCode::BAD_GATEWAY, "/v1/groups/web", b"");
        assert!(matches!(err, FleetError::Transport(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn connect_failure_is_a_transient_transport_error() {
        // Port 1 won't be listening.
        let client = HttpFleet::new("127.0.0.1:1").with_timeout(Duration::from_millis(100));
        let err = client.get_group(&"web".to_string()).await.unwrap_err();
        assert!(matches!(err, FleetError::Transport(_)));
        assert!(err.is_transient());
    }
}
