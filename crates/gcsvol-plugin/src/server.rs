//! HTTP server for the volume plugin protocol.
//!
//! The engine POSTs JSON to `/Plugin.Activate` and `/VolumeDriver.*` over a
//! Unix socket. Supervisor calls block on process I/O, so each one runs on
//! the blocking pool.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use gcsvol_common::error::{Result, VolumeError};
use gcsvol_supervisor::Supervisor;
use serde::Serialize;
use tokio::net::UnixListener;

use crate::protocol::{
    ActivateResponse, CONTENT_TYPE, CapabilitiesResponse, DriverCapabilities, ErrorResponse,
    GetResponse, ListResponse, MountpointResponse, Volume, VolumeRequest,
};

type Shared = State<Arc<Supervisor>>;

/// Serves the plugin protocol on behalf of a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct PluginServer {
    supervisor: Arc<Supervisor>,
}

impl PluginServer {
    /// Creates a server answering with `supervisor`.
    #[must_use]
    pub const fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Builds the protocol router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/Plugin.Activate", post(activate))
            .route("/VolumeDriver.Create", post(create))
            .route("/VolumeDriver.Remove", post(remove))
            .route("/VolumeDriver.Mount", post(mount))
            .route("/VolumeDriver.Unmount", post(unmount))
            .route("/VolumeDriver.Path", post(path))
            .route("/VolumeDriver.Get", post(get))
            .route("/VolumeDriver.List", post(list))
            .route("/VolumeDriver.Capabilities", post(capabilities))
            .with_state(Arc::clone(&self.supervisor))
    }

    /// Binds `socket`, serves until `shutdown` resolves, then removes the
    /// socket file.
    ///
    /// A stale socket left by a previous run is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Io`] if the socket cannot be bound or the
    /// server fails.
    pub async fn run<F>(self, socket: &Path, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = bind(socket)?;
        tracing::info!(socket = %socket.display(), "plugin listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        tracing::info!(socket = %socket.display(), "plugin stopped listening");

        if let Err(e) = std::fs::remove_file(socket) {
            tracing::warn!(socket = %socket.display(), error = %e, "failed to remove socket");
        }
        served.map_err(|e| VolumeError::Io {
            path: socket.to_path_buf(),
            source: e,
        })
    }
}

/// Binds a Unix listener, creating the parent directory and clearing a
/// stale socket first.
///
/// # Errors
///
/// Returns [`VolumeError::Io`] if any step fails.
pub fn bind(socket: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent).map_err(|e| VolumeError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    match std::fs::remove_file(socket) {
        Ok(()) => tracing::debug!(socket = %socket.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(VolumeError::Io {
                path: socket.to_path_buf(),
                source: e,
            });
        }
    }
    UnixListener::bind(socket).map_err(|e| VolumeError::Io {
        path: socket.to_path_buf(),
        source: e,
    })
}

async fn activate() -> Response {
    tracing::info!("plugin activated");
    reply(StatusCode::OK, &ActivateResponse::volume_driver())
}

async fn create(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "create", |s, req| {
        if let Some(opts) = req.opts.as_ref().filter(|o| !o.is_empty()) {
            tracing::debug!(name = %req.name, ?opts, "ignoring volume options");
        }
        s.create(&req.name).map(|()| ErrorResponse::default())
    })
    .await
}

async fn remove(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "remove", |s, req| {
        s.remove(&req.name).map(|()| ErrorResponse::default())
    })
    .await
}

async fn mount(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "mount", |s, req| {
        s.mount(&req.name).map(MountpointResponse::ok)
    })
    .await
}

async fn unmount(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "unmount", |s, req| {
        s.unmount(&req.name).map(|()| ErrorResponse::default())
    })
    .await
}

async fn path(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "path", |s, req| {
        s.path(&req.name).map(MountpointResponse::ok)
    })
    .await
}

async fn get(State(supervisor): Shared, body: Bytes) -> Response {
    with_request(supervisor, body, "get", |s, req| {
        s.get(&req.name).map(|info| GetResponse {
            volume: Volume::from(info),
            err: String::new(),
        })
    })
    .await
}

async fn list(State(supervisor): Shared) -> Response {
    blocking(supervisor, "list", |s| {
        s.list().map(|volumes| ListResponse {
            volumes: volumes.into_iter().map(Volume::from).collect(),
            err: String::new(),
        })
    })
    .await
}

async fn capabilities(State(supervisor): Shared) -> Response {
    let caps = supervisor.capabilities();
    reply(
        StatusCode::OK,
        &CapabilitiesResponse {
            capabilities: DriverCapabilities { scope: caps.scope },
        },
    )
}

/// Decodes the volume request and runs `call` with it on the blocking pool.
async fn with_request<T, F>(
    supervisor: Arc<Supervisor>,
    body: Bytes,
    op: &'static str,
    call: F,
) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Supervisor, VolumeRequest) -> Result<T> + Send + 'static,
{
    let request = match serde_json::from_slice::<VolumeRequest>(&body) {
        Ok(request) => request,
        Err(e) => return failure(op, format!("invalid request body: {e}")),
    };
    tracing::debug!(op, name = %request.name, id = ?request.id, "plugin call");
    blocking(supervisor, op, move |s| call(s, request)).await
}

/// Runs a supervisor call on the blocking pool and renders its outcome.
async fn blocking<T, F>(supervisor: Arc<Supervisor>, op: &'static str, call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Supervisor) -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&supervisor)).await {
        Ok(Ok(payload)) => reply(StatusCode::OK, &payload),
        Ok(Err(e)) => failure(op, e.to_string()),
        Err(e) => failure(op, format!("plugin call aborted: {e}")),
    }
}

fn failure(op: &'static str, message: String) -> Response {
    tracing::warn!(op, error = %message, "plugin call failed");
    reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrorResponse::new(message))
}

fn reply<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    match serde_json::to_vec(payload) {
        Ok(body) => (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("plugins").join("gcs.sock");
        std::fs::create_dir_all(socket.parent().unwrap()).unwrap();
        std::fs::write(&socket, b"stale").unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = bind(&socket).expect("bind over stale file");
            assert_eq!(
                listener.local_addr().unwrap().as_pathname(),
                Some(socket.as_path())
            );
        });
    }

    #[test]
    fn bind_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("a").join("b").join("gcs.sock");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let _listener = bind(&socket).expect("bind");
        });
        assert!(socket.parent().unwrap().is_dir());
    }
}
