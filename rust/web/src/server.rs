use crate::middleware;
use crate::remote::{KvClient, RemoteSeatStore, RemoteStateStore};
use crate::rules::{ChessRules, Rules};
use crate::session::SessionService;
use crate::settings::{AppSettings, StorageBackend};
use crate::store::{MemorySeatStore, MemoryStateStore, SeatRegistry, StateStore};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;

use crate::handlers;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::reply::Reply;
use warp::Filter;

use std::net::ToSocketAddrs;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    sessions: Arc<SessionService>,
}

impl AppContext {
    pub fn new(config: ServerConfig, settings: AppSettings) -> Self {
        // Read these out before the match consumes the backend variant
        let ttl_secs = settings.ttl_secs();
        let session_ttl = settings.session_ttl;

        let (store, seats): (Arc<dyn StateStore>, Arc<dyn SeatRegistry>) = match settings.backend {
            StorageBackend::Memory => {
                info!(backend = "memory", "storage backend selected");
                (
                    Arc::new(MemoryStateStore::new()),
                    Arc::new(MemorySeatStore::new()),
                )
            }
            StorageBackend::RemoteKv { url, token } => {
                info!(backend = "remote_kv", url = %url, "storage backend selected");
                let kv = KvClient::new(url, token, ttl_secs);
                (
                    Arc::new(RemoteStateStore::new(kv.clone())),
                    Arc::new(RemoteSeatStore::new(kv)),
                )
            }
        };

        let rules: Arc<dyn Rules> = Arc::new(ChessRules::new());
        let sessions = Arc::new(SessionService::new(store, seats, rules, session_ttl));

        Self::with_service(config, sessions)
    }

    pub fn with_service(config: ServerConfig, sessions: Arc<SessionService>) -> Self {
        Self { config, sessions }
    }

    pub fn new_for_tests() -> Self {
        Self::new(ServerConfig::for_tests(), AppSettings::default())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[derive(Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig, settings: AppSettings) -> Self {
        Self {
            context: AppContext::new(config, settings),
        }
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let config = context.config().clone();
        let bind_addr = Self::bind_addr(&config)?;

        let preflight = if bind_addr.port() != 0 {
            Some(std::net::TcpListener::bind(bind_addr).map_err(ServerError::BindError)?)
        } else {
            None
        };
        drop(preflight);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        info!(address = %addr, "web server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }

    fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let health = Self::health_route();
        let api_routes = Self::api_routes(context);

        middleware::with_request_logging(health.or(api_routes).unify()).boxed()
    }

    fn health_route() -> BoxedFilter<(warp::reply::Response,)> {
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .map(|| handlers::health::health().into_response())
            .boxed()
    }

    fn api_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let sessions = context.sessions();

        let create = warp::path!("api" / "sessions")
            .and(warp::post())
            .and(Self::with_service(sessions.clone()))
            .and_then(|service: Arc<SessionService>| async move {
                let response = handlers::create_session(service).await;
                Ok::<_, Infallible>(response)
            });

        let moves = warp::path!("api" / "sessions" / String / "moves")
            .and(warp::post())
            .and(Self::with_service(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 service: Arc<SessionService>,
                 request: handlers::MoveRequest| async move {
                    let response = handlers::submit_move(service, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let read = warp::path!("api" / "sessions" / String)
            .and(warp::get())
            .and(warp::query::<handlers::ReadQuery>())
            .and(warp::header::optional::<String>("if-none-match"))
            .and(Self::with_service(sessions))
            .and_then(
                |session_id: String,
                 query: handlers::ReadQuery,
                 if_none_match: Option<String>,
                 service: Arc<SessionService>| async move {
                    let response =
                        handlers::read_session(service, session_id, query, if_none_match).await;
                    Ok::<_, Infallible>(response)
                },
            );

        create
            .or(moves)
            .unify()
            .or(read)
            .unify()
            .boxed()
    }

    fn with_service(
        sessions: Arc<SessionService>,
    ) -> impl Filter<Extract = (Arc<SessionService>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&sessions))
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
