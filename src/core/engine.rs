//! Container engine boundary.
//!
//! The orchestrator only ever hands the engine plain option maps; [`DockerEngine`] forwards
//! them to the Docker remote API and shells out to the CLI for image builds.
//!
//! Docker only accepts host-level settings (`Binds`, `PublishAllPorts`, ...) at creation, so
//! the declared start options travel with the create request and `start` posts no body.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{GlobalConfig, OptionMap};
use crate::error::{Error, Result};

/// Image build request derived from a buildable component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Tag the built image receives.
    pub tag: String,
    /// Directory containing the build descriptor.
    pub context: PathBuf,
}

/// A container the engine created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Engine-assigned container identifier.
    pub id: String,
}

/// Container engine operations the lifecycle phases drive.
pub trait Engine: Send + Sync {
    /// Build `request.tag` from the descriptor in `request.context`.
    fn build(&self, request: &BuildRequest) -> Result<()>;
    /// Create a container from `options`. `start` holds the start options known at install
    /// time, for engines that fix host settings at creation.
    fn create(&self, options: &OptionMap, start: &OptionMap) -> Result<ContainerHandle>;
    /// Start a created container with the options computed for this start.
    fn start(&self, container_id: &str, options: &OptionMap) -> Result<()>;
    /// Stop a running container.
    fn stop(&self, container_id: &str) -> Result<()>;
    /// Remove the container together with its anonymous volumes.
    fn remove(&self, container_id: &str) -> Result<()>;
}

/// Docker remote API client.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    endpoint: String,
    docker_binary: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

impl DockerEngine {
    /// Client for the API at `endpoint`; builds run `docker_binary`.
    pub fn new(endpoint: impl Into<String>, docker_binary: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .build();
        Self {
            endpoint: endpoint.into(),
            docker_binary: docker_binary.into(),
            agent,
        }
    }

    /// Client for the engine named in the global config.
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.engine_url.clone(), config.docker_binary.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GET /_ping`
    pub fn ping(&self) -> Result<()> {
        self.agent
            .get(&self.url("/_ping"))
            .call()
            .map(|_| ())
            .map_err(|err| Error::EngineUnavailable {
                endpoint: self.endpoint.clone(),
                message: describe_ureq_error(err),
            })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn post_empty(&self, action: &'static str, container_id: &str, path: &str) -> Result<()> {
        self.agent
            .post(&self.url(path))
            .call()
            .map(|_| ())
            .map_err(|err| container_error(action, container_id, err))
    }
}

impl Engine for DockerEngine {
    fn build(&self, request: &BuildRequest) -> Result<()> {
        info!(
            "building image {} from {}",
            request.tag,
            request.context.display()
        );
        let output = Command::new(&self.docker_binary)
            .arg("build")
            .arg("--tag")
            .arg(&request.tag)
            .arg(&request.context)
            .env("DOCKER_HOST", docker_host(&self.endpoint))
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::Engine {
                action: "build image",
                target: request.tag.clone(),
                message: format!("could not run `{}`: {err}", self.docker_binary),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Engine {
                action: "build image",
                target: request.tag.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn create(&self, options: &OptionMap, start: &OptionMap) -> Result<ContainerHandle> {
        let mut body = create_body(options, start);
        let name = match body.remove("name") {
            Some(Value::String(name)) => Some(name),
            _ => None,
        };
        let target = name.clone().unwrap_or_else(|| "container".to_string());

        let mut request = self.agent.post(&self.url("/containers/create"));
        if let Some(name) = &name {
            request = request.query("name", name);
        }
        debug!("creating container {target}");
        let response: CreateResponse = request
            .send_json(Value::Object(body))
            .map_err(|err| engine_error("create container", &target, err))?
            .into_json()
            .map_err(|err| Error::Engine {
                action: "create container",
                target: target.clone(),
                message: format!("unreadable engine response: {err}"),
            })?;
        Ok(ContainerHandle { id: response.id })
    }

    fn start(&self, container_id: &str, options: &OptionMap) -> Result<()> {
        if !options.is_empty() {
            debug!(
                "starting {container_id}; host options were fixed at creation ({} key(s) not resent)",
                options.len()
            );
        }
        self.post_empty(
            "start container",
            container_id,
            &format!("/containers/{container_id}/start"),
        )
    }

    fn stop(&self, container_id: &str) -> Result<()> {
        self.post_empty(
            "stop container",
            container_id,
            &format!("/containers/{container_id}/stop"),
        )
    }

    fn remove(&self, container_id: &str) -> Result<()> {
        self.agent
            .delete(&self.url(&format!("/containers/{container_id}")))
            .query("v", "true")
            .call()
            .map(|_| ())
            .map_err(|err| container_error("remove container", container_id, err))
    }
}

/// Create body with `start` folded into `HostConfig`. Keys already present in the create
/// options' `HostConfig` win.
fn create_body(options: &OptionMap, start: &OptionMap) -> OptionMap {
    let mut body = options.clone();
    if start.is_empty() {
        return body;
    }
    let host = body
        .entry("HostConfig")
        .or_insert_with(|| Value::Object(OptionMap::new()));
    if let Value::Object(host) = host {
        for (key, value) in start {
            host.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    body
}

fn engine_error(action: &'static str, target: &str, err: ureq::Error) -> Error {
    Error::Engine {
        action,
        target: target.to_string(),
        message: describe_ureq_error(err),
    }
}

/// Like [`engine_error`], but a 404 means the recorded container is gone.
fn container_error(action: &'static str, container_id: &str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(404, _) => Error::ContainerNotFound {
            container_id: container_id.to_string(),
        },
        other => engine_error(action, container_id, other),
    }
}

fn describe_ureq_error(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or(body);
            format!("HTTP {code}: {}", message.trim())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

/// `DOCKER_HOST` value for the CLI, derived from the API endpoint.
fn docker_host(endpoint: &str) -> String {
    match endpoint.strip_prefix("http://") {
        Some(rest) => format!("tcp://{rest}"),
        None => endpoint.to_string(),
    }
}
