//! The infrastructure provisioner contract and its HTTP client.
//!
//! The deployment flow depends on exactly two operations:
//! `create_stack(template, params) → stack id` and
//! `get_stack(id) → {status, outputs}`. Everything else about the
//! orchestration backend is out of scope.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Result type alias for provisioner operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors from the provisioner client.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provisioner returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed provisioner response: {0}")]
    Decode(String),

    #[error("stack {0} could not be found")]
    StackNotFound(String),
}

/// Convergence state of a provisioning stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    InProgress,
    Complete,
    Failed,
}

/// A named output published by a completed stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackOutput {
    pub output_key: String,
    pub output_value: String,
}

/// Point-in-time view of a provisioning stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stack {
    pub id: String,
    pub status: StackStatus,
    pub status_reason: Option<String>,
    pub outputs: Vec<StackOutput>,
}

impl Stack {
    /// The reachable network address of the provisioned node, taken
    /// from the first output whose key mentions "public".
    pub fn public_address(&self) -> Option<&str> {
        self.outputs
            .iter()
            .find(|output| output.output_key.contains("public"))
            .map(|output| output.output_value.as_str())
    }
}

/// Minimal orchestration-API contract the deploy flow consumes.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Request creation of backing infrastructure; returns the stack id.
    async fn create_stack(
        &self,
        name: &str,
        template: serde_json::Value,
        parameters: HashMap<String, String>,
    ) -> ProvisionResult<String>;

    /// Current state of a previously created stack.
    async fn get_stack(&self, stack_id: &str) -> ProvisionResult<Stack>;
}

/// Default single-node serving template used when no template is
/// configured.
pub fn default_template() -> serde_json::Value {
    json!({
        "heat_template_version": "2017-02-24",
        "description": "mlgrid serving node",
        "resources": {
            "serving_node": {
                "type": "OS::Nova::Server",
                "properties": {
                    "flavor": { "get_param": "flavor" },
                    "image": { "get_param": "image" }
                }
            }
        },
        "outputs": {
            "public_address": {
                "value": { "get_attr": ["serving_node", "first_address"] }
            }
        }
    })
}

// ── HTTP client ───────────────────────────────────────────────────

/// Provisioner client speaking a Heat-compatible JSON surface over
/// HTTP/1.1.
pub struct HttpProvisioner {
    authority: String,
    base_path: String,
}

impl HttpProvisioner {
    /// Build a client for `endpoint` (e.g. `http://heat:8004/v1`).
    pub fn new(endpoint: &str) -> ProvisionResult<Self> {
        let uri: http::Uri = endpoint
            .parse()
            .map_err(|e: http::uri::InvalidUri| ProvisionError::Decode(e.to_string()))?;
        let authority = uri
            .authority()
            .ok_or_else(|| ProvisionError::Decode(format!("endpoint {endpoint} has no authority")))?
            .to_string();
        let base_path = uri.path().trim_end_matches('/').to_string();
        Ok(Self {
            authority,
            base_path,
        })
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ProvisionResult<(u16, Bytes)> {
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let uri = format!("{}{}", self.base_path, path);
        let request = http::Request::builder()
            .method(method)
            .uri(&uri)
            .header("host", &self.authority)
            .header("content-type", "application/json")
            .header("user-agent", "mlgrid-deploy/0.1")
            .body(http_body_util::Full::new(Bytes::from(
                body.unwrap_or_default(),
            )))
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProvisionError::Transport(e.to_string()))?
            .to_bytes();
        debug!(%method, %uri, status, "provisioner request");
        Ok((status, body))
    }
}

#[derive(Deserialize)]
struct StackEnvelope {
    stack: StackBody,
}

#[derive(Deserialize)]
struct StackBody {
    id: String,
    #[serde(alias = "status")]
    stack_status: Option<String>,
    stack_status_reason: Option<String>,
    #[serde(default)]
    outputs: Vec<StackOutput>,
}

impl StackBody {
    fn into_stack(self) -> Stack {
        let raw = self.stack_status.unwrap_or_default();
        let status = if raw.contains("FAILED") {
            StackStatus::Failed
        } else if raw.ends_with("COMPLETE") {
            StackStatus::Complete
        } else {
            StackStatus::InProgress
        };
        Stack {
            id: self.id,
            status,
            status_reason: self.stack_status_reason,
            outputs: self.outputs,
        }
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn create_stack(
        &self,
        name: &str,
        template: serde_json::Value,
        parameters: HashMap<String, String>,
    ) -> ProvisionResult<String> {
        let payload = json!({
            "stack_name": name,
            "template": template,
            "parameters": parameters,
            "disable_rollback": true,
            "files": {},
            "environment": {},
        });
        let body = serde_json::to_vec(&payload).map_err(|e| ProvisionError::Decode(e.to_string()))?;
        let (status, response) = self.request("POST", "/stacks", Some(body)).await?;
        if !(200..300).contains(&status) {
            return Err(ProvisionError::Api {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        let envelope: StackEnvelope = serde_json::from_slice(&response)
            .map_err(|e| ProvisionError::Decode(e.to_string()))?;
        Ok(envelope.stack.id)
    }

    async fn get_stack(&self, stack_id: &str) -> ProvisionResult<Stack> {
        let (status, response) = self
            .request("GET", &format!("/stacks/{stack_id}"), None)
            .await?;
        if status == 404 {
            return Err(ProvisionError::StackNotFound(stack_id.to_string()));
        }
        if !(200..300).contains(&status) {
            return Err(ProvisionError::Api {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        let envelope: StackEnvelope = serde_json::from_slice(&response)
            .map_err(|e| ProvisionError::Decode(e.to_string()))?;
        Ok(envelope.stack.into_stack())
    }
}
