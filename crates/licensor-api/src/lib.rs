//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "HTTP surface of the license service."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
//! Routes, authentication middleware and server lifecycle. Handlers only
//! translate; every decision is taken by the entitlement engine.

pub mod auth;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use licensor_common::VersionInfo;
use licensor_engine::EntitlementEngine;
use licensor_security::{AccessGateway, AuditLog, Principal};
use parking_lot::Mutex;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use dto::LicenseView;
pub use error::{ApiError, ErrorBody};

/// Shared state handed to every handler.
pub struct ApiState {
    engine: Arc<EntitlementEngine>,
    gateway: Arc<AccessGateway>,
    audit: Option<Arc<Mutex<AuditLog>>>,
    registry: Option<Arc<Registry>>,
    version: VersionInfo,
}

impl ApiState {
    pub fn new(
        engine: Arc<EntitlementEngine>,
        gateway: Arc<AccessGateway>,
        version: VersionInfo,
    ) -> Self {
        Self {
            engine,
            gateway,
            audit: None,
            registry: None,
            version,
        }
    }

    /// Record accepted mutations in `log`.
    pub fn with_audit(mut self, log: AuditLog) -> Self {
        self.audit = Some(Arc::new(Mutex::new(log)));
        self
    }

    /// Serve `registry` at `/metrics`.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn engine(&self) -> &Arc<EntitlementEngine> {
        &self.engine
    }

    pub fn gateway(&self) -> &AccessGateway {
        &self.gateway
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    /// Append to the audit trail, if configured, on the blocking pool.
    /// Write failures are only logged.
    pub(crate) async fn audit(
        &self,
        principal: &Principal,
        action: &'static str,
        subject: &str,
        metadata: serde_json::Value,
    ) {
        let Some(log) = self.audit.clone() else {
            return;
        };
        let actor = principal.username.clone();
        let target = subject.to_owned();
        let written = tokio::task::spawn_blocking(move || {
            log.lock().record(&actor, action, &target, metadata)
        })
        .await;
        match written {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                error!(action, subject, error = %err, "failed to append audit entry");
            }
            Err(err) => {
                error!(action, subject, error = %err, "audit task failed");
            }
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("version", &self.version)
            .field("audit", &self.audit.is_some())
            .field("metrics", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Full application router.
pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/info", get(handlers::info))
        .route("/create_license", post(handlers::create_license))
        .route("/add_license", post(handlers::add_license))
        .route("/remove_license", post(handlers::remove_license))
        .route("/get_license", get(handlers::get_license))
        .route("/erase_license", post(handlers::erase_license))
        .route("/dump_licenses", get(handlers::dump_licenses))
        .route(
            "/api/licenses",
            get(handlers::dump_licenses).post(handlers::upsert_license),
        )
        .route(
            "/api/licenses/:id",
            get(handlers::get_license_by_serial)
                .put(handlers::update_license)
                .delete(handlers::delete_license),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth));

    let mut public = Router::new()
        .route("/", get(handlers::hello))
        .route("/api/auth/login", post(handlers::login));
    if state.registry().is_some() {
        public = public.route("/metrics", get(handlers::metrics));
    }

    public
        .merge(protected)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(from_fn(error::error_envelope))
        .layer(TraceLayer::new_for_http())
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address actually bound, useful when listening on port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Bind `addr` and serve the license API until [`ApiServer::shutdown`].
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let banner = state.version().banner();
    let app = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, version = %banner, "license api listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "license api exited with error");
            return Err(err.into());
        }
        info!(address = %local_addr, "license api stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}
