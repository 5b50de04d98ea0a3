use crate::{RemoteConfig, RemoteError, RemoteStackState, StackService};
use serde::Deserialize;
use std::time::Duration;
use unstack_schema::{KeyName, StackName};

/// HTTP-based control-plane backend.
///
/// Expects a small REST API:
/// - `GET    /stacks/<name>`: `{"name": ..., "status": ...}`, or 404 once gone
/// - `DELETE /stacks/<name>`: request deletion (202), 404 if already gone
/// - `DELETE /keys/<name>`:   delete a key pair (204), 404 if missing
pub struct HttpStackService {
    config: RemoteConfig,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct StackStatusBody {
    #[serde(default)]
    status: String,
}

/// Outcome of a request, with 4xx/5xx folded into `Status`.
enum Reply {
    Status(u16, String),
    Transport(String),
}

impl HttpStackService {
    pub fn new(config: RemoteConfig) -> Self {
        let agent = match config.timeout_secs {
            Some(secs) => ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(secs)))
                .build()
                .into(),
            None => ureq::Agent::new_with_defaults(),
        };
        Self { config, agent }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn stack_url(&self, stack: &StackName) -> String {
        format!("{}/stacks/{stack}", self.config.url)
    }

    fn key_url(&self, key: &KeyName) -> String {
        format!("{}/keys/{key}", self.config.url)
    }

    fn decorate<B>(&self, mut req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        req = req.header("X-Unstack-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        if let Some(ref region) = self.config.region {
            req = req.header("X-Unstack-Region", region);
        }
        req
    }

    fn do_get(&self, url: &str) -> Reply {
        let req = self.decorate(self.agent.get(url));
        match req.call() {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let mut body = resp.into_body();
                match body.read_to_string() {
                    Ok(text) => Reply::Status(code, text),
                    Err(e) => Reply::Transport(format!("reading body: {e}")),
                }
            }
            Err(ureq::Error::StatusCode(code)) => Reply::Status(code, String::new()),
            Err(e) => Reply::Transport(e.to_string()),
        }
    }

    fn do_delete(&self, url: &str) -> Reply {
        let req = self.decorate(self.agent.delete(url));
        match req.call() {
            Ok(resp) => Reply::Status(resp.status().as_u16(), String::new()),
            Err(ureq::Error::StatusCode(code)) => Reply::Status(code, String::new()),
            Err(e) => Reply::Transport(e.to_string()),
        }
    }
}

impl StackService for HttpStackService {
    fn name(&self) -> &'static str {
        "http"
    }

    fn describe(&self, stack: &StackName) -> Result<RemoteStackState, RemoteError> {
        let url = self.stack_url(stack);
        tracing::trace!("GET {url}");
        match self.do_get(&url) {
            Reply::Status(404, _) => Ok(RemoteStackState::Absent),
            Reply::Status(200, body) => match serde_json::from_str::<StackStatusBody>(&body) {
                Ok(parsed) => Ok(RemoteStackState::from_status(&parsed.status)),
                Err(e) => {
                    tracing::debug!("unreadable status for {stack}: {e}");
                    Ok(RemoteStackState::Unknown)
                }
            },
            Reply::Status(code, _) => Err(RemoteError::Query {
                stack: stack.clone(),
                reason: format!("HTTP {code} for GET {url}"),
            }),
            Reply::Transport(reason) => Err(RemoteError::Query {
                stack: stack.clone(),
                reason,
            }),
        }
    }

    fn request_delete(&self, stack: &StackName) -> Result<(), RemoteError> {
        let url = self.stack_url(stack);
        tracing::debug!("DELETE {url}");
        match self.do_delete(&url) {
            Reply::Status(200 | 202 | 204 | 404, _) => Ok(()),
            Reply::Status(code, _) => Err(RemoteError::Request {
                stack: stack.clone(),
                reason: format!("HTTP {code} for DELETE {url}"),
            }),
            Reply::Transport(reason) => Err(RemoteError::Request {
                stack: stack.clone(),
                reason,
            }),
        }
    }

    fn delete_key_pair(&self, key: &KeyName) -> Result<bool, RemoteError> {
        let url = self.key_url(key);
        tracing::debug!("DELETE {url}");
        match self.do_delete(&url) {
            Reply::Status(200 | 202 | 204, _) => Ok(true),
            Reply::Status(404, _) => Ok(false),
            Reply::Status(code, _) => Err(RemoteError::KeyPair {
                key: key.clone(),
                reason: format!("HTTP {code} for DELETE {url}"),
            }),
            Reply::Transport(reason) => Err(RemoteError::KeyPair {
                key: key.clone(),
                reason,
            }),
        }
    }
}
