use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{any, get, post},
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
pub mod hasher;
pub mod request_log;
pub mod store;
pub mod validator;

mod openapi;

pub use openapi::openapi;

use self::{
    handlers::{health, root, signup, SignupConfig},
    hasher::{HashConfig, SecretHasher},
    request_log::{LogSink, RequestLog, DEFAULT_BODY_LIMIT},
    store::{AccountStore, PgAccountStore},
};

const REQUEST_ID: &str = "x-request-id";
// Span label for requests served by the fallback, keeps raw paths out of span fields.
const UNMATCHED_ROUTE: &str = "fallback";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    port: u16,
    dsn: SecretString,
    db_max_connections: u32,
    max_body_bytes: usize,
    hash: HashConfig,
    signup: SignupConfig,
}

impl ServerConfig {
    /// Defaults: 5 pooled connections, 2 MiB request bodies, Argon2 recommended work factor, 10s signup deadline.
    #[must_use]
    pub fn new(port: u16, dsn: SecretString) -> Self {
        Self {
            port,
            dsn,
            db_max_connections: 5,
            max_body_bytes: DEFAULT_BODY_LIMIT,
            hash: HashConfig::default(),
            signup: SignupConfig::default(),
        }
    }

    #[must_use]
    pub fn with_db_max_connections(mut self, max: u32) -> Self {
        self.db_max_connections = max;
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }

    #[must_use]
    pub fn with_signup(mut self, signup: SignupConfig) -> Self {
        self.signup = signup;
        self
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    #[must_use]
    pub const fn hash(&self) -> HashConfig {
        self.hash
    }

    #[must_use]
    pub const fn signup(&self) -> SignupConfig {
        self.signup
    }
}

/// Build the application router: `/`, `/health`, `/signup` and a fallback that
/// answers like `/`, all behind the request-log middleware.
pub fn router(
    store: Arc<dyn AccountStore>,
    hasher: SecretHasher,
    signup_config: SignupConfig,
    request_log: RequestLog,
) -> Router {
    let app = Router::new()
        .route("/", any(root))
        .route("/health", get(health))
        .route("/signup", post(signup))
        .fallback(root)
        .layer(Extension(store))
        .layer(Extension(hasher))
        .layer(Extension(signup_config));

    request_log::wrap(app, request_log).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    )
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable, the hash work factor is invalid or
/// the listener cannot be bound
pub async fn new(config: ServerConfig) -> Result<()> {
    let hasher = SecretHasher::new(config.hash()).context("Invalid password hash parameters")?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(config.db_max_connections())
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(config.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let store = PgAccountStore::new(pool.clone());
    store
        .ensure_schema()
        .await
        .context("Failed to prepare accounts schema")?;

    let app = router(
        Arc::new(store),
        hasher,
        config.signup(),
        RequestLog::new(Arc::new(LogSink)).with_body_limit(config.max_body_bytes()),
    );

    let listener = TcpListener::bind(format!("::0:{}", config.port())).await?;

    info!("Listening on [::]:{}", config.port());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    info!("Disconnected from database");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = route_label(request),
        request_id
    )
}

// `MatchedPath` is set by the router before route layers run.
fn route_label(request: &Request<Body>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
}
