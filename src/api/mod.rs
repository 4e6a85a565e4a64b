//! HTTP surface: router construction and server startup.

use crate::{
    cli::globals::GlobalArgs,
    email::{EmailSender, HttpEmailSender, LogEmailSender},
    otp::{
        purge::spawn_purge_worker,
        rate_limit::{RateLimiter, SlidingWindowRateLimiter},
        OtpConfig, OtpEngine, PgOtpStore,
    },
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, options, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{health, otp, root};

/// Build the application router. Extensions (pool, engine, limiter) are
/// layered by the caller.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/v1/otp/request", post(otp::request::request_otp))
        .route("/v1/otp/verify", post(otp::verify::verify_otp))
        .route("/v1/otp/resend", post(otp::resend::resend_otp))
        .route("/health", get(health::health))
        .route("/health", options(health::health))
        .route("/", get(root::root))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Graceful shutdown on ctrl-c or SIGTERM.
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_shutdown_listener(tx);

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let sender: Arc<dyn EmailSender> = match &globals.email_url {
        Some(email_url) => {
            let endpoint = Url::parse(email_url)
                .with_context(|| format!("Invalid email provider URL: {email_url}"))?;
            Arc::new(HttpEmailSender::new(endpoint, globals.email_token.clone())?)
        }
        None => {
            info!("No email provider configured, codes are logged");
            Arc::new(LogEmailSender)
        }
    };

    let store = Arc::new(PgOtpStore::new(pool.clone()));
    let config = OtpConfig::new();
    let engine = Arc::new(OtpEngine::new(
        store.clone(),
        sender,
        globals.hmac_secret.clone(),
        config,
    ));

    // Housekeeping only; newest-record-wins keeps stale rows harmless.
    spawn_purge_worker(store, config.purge_interval_seconds());

    let limiter: Arc<dyn RateLimiter> = Arc::new(SlidingWindowRateLimiter::new(
        Duration::from_secs(60),
        30,
    ));

    let frontend_origin = frontend_origin(&globals.frontend_url)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let app = router()
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(engine))
                .layer(Extension(limiter)),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            rx.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn spawn_shutdown_listener(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(err) => {
                        error!("Failed to install SIGTERM handler: {err}");
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        let _ = tx.send(());
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
