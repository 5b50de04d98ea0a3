//! Reference control-plane server for the unstack HTTP protocol v1.
//!
//! Holds stacks and key pairs in memory and serves the routes the
//! `HttpStackService` client talks to:
//!
//! - `GET /stacks/<name>` returns `{"name", "status"}`, or 404 once deleted
//! - `DELETE /stacks/<name>` starts deletion (202), 404 if unknown
//! - `PUT /stacks/<name>` seeds a stack, `GET /stacks/` lists names
//! - `DELETE /keys/<name>` (204 / 404), `PUT /keys/<name>`, `GET /keys/`
//! - `GET /health`
//!
//! A deleting stack reports `DELETE_IN_PROGRESS` for a configurable number of
//! describes before it disappears. The [`TestServer`] helper starts a server on
//! a random port for integration testing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "1";
pub const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";
pub const CREATE_COMPLETE: &str = "CREATE_COMPLETE";

#[derive(Debug, Clone)]
struct StackRecord {
    status: String,
    termination_protection: bool,
    /// Describes left before a deleting stack disappears.
    remaining_polls: u32,
}

/// Body of `PUT /stacks/<name>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedStack {
    #[serde(default = "default_status")]
    pub status: String,
    /// Reject delete requests with 403, the way a protected stack would.
    #[serde(default)]
    pub termination_protection: bool,
}

fn default_status() -> String {
    CREATE_COMPLETE.to_owned()
}

#[derive(Debug, Serialize)]
struct StackBody<'a> {
    name: &'a str,
    status: &'a str,
}

#[derive(Debug, Default)]
struct StoreInner {
    stacks: BTreeMap<String, StackRecord>,
    keys: BTreeSet<String>,
    delete_requests: BTreeMap<String, u32>,
}

/// In-memory control-plane state.
pub struct Store {
    inner: Mutex<StoreInner>,
    delete_polls: u32,
    auth_token: Option<String>,
}

impl Store {
    /// A deleting stack answers `DELETE_IN_PROGRESS` `delete_polls` times, then 404.
    pub fn new(delete_polls: u32) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            delete_polls,
            auth_token: None,
        }
    }

    /// Require `Authorization: Bearer <token>` on every route except `/health`.
    #[must_use]
    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    pub fn seed_stack(&self, name: &str, status: &str) {
        self.seed(
            name,
            SeedStack {
                status: status.to_owned(),
                termination_protection: false,
            },
        );
    }

    pub fn seed(&self, name: &str, seed: SeedStack) {
        let remaining_polls = if seed.status == DELETE_IN_PROGRESS {
            self.delete_polls
        } else {
            0
        };
        self.lock().stacks.insert(
            name.to_owned(),
            StackRecord {
                status: seed.status,
                termination_protection: seed.termination_protection,
                remaining_polls,
            },
        );
    }

    pub fn seed_key(&self, name: &str) {
        self.lock().keys.insert(name.to_owned());
    }

    pub fn stack_status(&self, name: &str) -> Option<String> {
        self.lock().stacks.get(name).map(|s| s.status.clone())
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.lock().stacks.keys().cloned().collect()
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.lock().keys.contains(name)
    }

    pub fn key_names(&self) -> Vec<String> {
        self.lock().keys.iter().cloned().collect()
    }

    /// Delete requests received for `name`, including ones for unknown stacks.
    pub fn delete_requests(&self, name: &str) -> u32 {
        self.lock().delete_requests.get(name).copied().unwrap_or(0)
    }

    /// Current status, advancing a deleting stack one poll towards gone.
    fn describe(&self, name: &str) -> Option<String> {
        let mut inner = self.lock();
        let record = inner.stacks.get_mut(name)?;
        if record.status != DELETE_IN_PROGRESS {
            return Some(record.status.clone());
        }
        if record.remaining_polls == 0 {
            inner.stacks.remove(name);
            info!("stack {name} deleted");
            return None;
        }
        record.remaining_polls -= 1;
        Some(DELETE_IN_PROGRESS.to_owned())
    }

    fn request_delete(&self, name: &str) -> u16 {
        let mut inner = self.lock();
        *inner.delete_requests.entry(name.to_owned()).or_insert(0) += 1;
        let Some(record) = inner.stacks.get_mut(name) else {
            return 404;
        };
        if record.termination_protection {
            warn!("refusing to delete protected stack {name}");
            return 403;
        }
        if record.status != DELETE_IN_PROGRESS {
            info!("deleting stack {name}");
            record.status = DELETE_IN_PROGRESS.to_owned();
            record.remaining_polls = self.delete_polls;
        }
        202
    }

    fn delete_key(&self, name: &str) -> bool {
        self.lock().keys.remove(name)
    }

    // Every critical section is a single map operation.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A parsed request path.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Stacks(Option<&'a str>),
    Keys(Option<&'a str>),
    Health,
}

/// Parse `/stacks/<name>`, `/stacks/`, `/keys/<name>`, `/keys/` and `/health`.
/// Query strings are ignored; names may not contain `/`.
pub fn parse_route(url: &str) -> Option<Route<'_>> {
    let path = url.split('?').next().unwrap_or(url);
    if path == "/health" {
        return Some(Route::Health);
    }
    let trimmed = path.strip_prefix('/')?;
    let (collection, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    let name = match rest {
        "" => None,
        n if n.contains('/') => return None,
        n => Some(n),
    };
    match collection {
        "stacks" => Some(Route::Stacks(name)),
        "keys" => Some(Route::Keys(name)),
        _ => None,
    }
}

fn respond_err(req: Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_json(req: Request, json: impl Into<Vec<u8>>) {
    let response = Response::from_data(json.into());
    let response = match Header::from_bytes("Content-Type", "application/json") {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    };
    let _ = req.respond(response);
}

fn respond_empty(req: Request, code: u16) {
    let _ = req.respond(Response::empty(code));
}

fn read_body(req: &mut Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn header_value<'r>(req: &'r Request, name: &'static str) -> Option<&'r str> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

fn handle_stack(store: &Store, mut req: Request, method: &Method, name: &str) {
    match *method {
        Method::Get => match store.describe(name) {
            Some(status) => {
                let body = StackBody {
                    name,
                    status: &status,
                };
                match serde_json::to_vec(&body) {
                    Ok(json) => respond_json(req, json),
                    Err(e) => respond_err(req, 500, &format!("encode error: {e}")),
                }
            }
            None => respond_err(req, 404, "stack does not exist"),
        },
        Method::Delete => {
            let code = store.request_delete(name);
            respond_empty(req, code);
        }
        Method::Put => {
            let Some(body) = read_body(&mut req) else {
                respond_err(req, 500, "read error");
                return;
            };
            let seed = if body.iter().all(u8::is_ascii_whitespace) {
                SeedStack {
                    status: default_status(),
                    termination_protection: false,
                }
            } else {
                match serde_json::from_slice(&body) {
                    Ok(seed) => seed,
                    Err(e) => {
                        respond_err(req, 400, &format!("invalid stack body: {e}"));
                        return;
                    }
                }
            };
            info!("seeded stack {name} ({})", seed.status);
            store.seed(name, seed);
            respond_empty(req, 201);
        }
        _ => respond_err(req, 405, "method not allowed"),
    }
}

fn handle_key(store: &Store, req: Request, method: &Method, name: &str) {
    match *method {
        Method::Delete => {
            if store.delete_key(name) {
                info!("deleted key pair {name}");
                respond_empty(req, 204);
            } else {
                respond_err(req, 404, "key pair does not exist");
            }
        }
        Method::Put => {
            store.seed_key(name);
            respond_empty(req, 201);
        }
        _ => respond_err(req, 405, "method not allowed"),
    }
}

fn respond_list(req: Request, names: &[String]) {
    let json = serde_json::to_string(names).unwrap_or_else(|_| "[]".to_owned());
    respond_json(req, json.into_bytes());
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(store: &Store, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let Some(route) = parse_route(&url) else {
        respond_err(req, 404, "not found");
        return;
    };
    if route == Route::Health {
        if method == Method::Get {
            let _ = req.respond(Response::from_string(r#"{"status":"ok"}"#));
        } else {
            respond_err(req, 405, "method not allowed");
        }
        return;
    }

    if let Some(version) = header_value(&req, "X-Unstack-Protocol") {
        if version != PROTOCOL_VERSION {
            let msg = format!("unsupported protocol version {version}");
            respond_err(req, 400, &msg);
            return;
        }
    }
    if let Some(expected) = &store.auth_token {
        let presented = header_value(&req, "Authorization").and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            respond_err(req, 401, "unauthorized");
            return;
        }
    }
    if let Some(region) = header_value(&req, "X-Unstack-Region") {
        debug!("region {region}");
    }

    match route {
        Route::Stacks(Some(name)) => handle_stack(store, req, &method, name),
        Route::Keys(Some(name)) => handle_key(store, req, &method, name),
        Route::Stacks(None) if method == Method::Get => respond_list(req, &store.stack_names()),
        Route::Keys(None) if method == Method::Get => respond_list(req, &store.key_names()),
        _ => respond_err(req, 405, "method not allowed"),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(store: &Arc<Store>, addr: &str) -> std::io::Result<()> {
    let server = Server::http(addr).map_err(std::io::Error::other)?;
    for request in server.incoming_requests() {
        handle_request(store, request);
    }
    Ok(())
}

/// A test helper that starts a server on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}`. Drop the `TestServer` to stop it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub store: Arc<Store>,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start with an empty store whose stacks take one in-progress poll to delete.
    pub fn start() -> Self {
        Self::with_store(Store::new(1))
    }

    /// Binds to `127.0.0.1:0` (random port).
    pub fn with_store(store: Store) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let store = Arc::new(store);
        let srv = Arc::clone(&server);
        let srv_store = Arc::clone(&store);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&srv_store, request);
            }
        });

        Self {
            url,
            port,
            store,
            server,
            handle: Some(handle),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
