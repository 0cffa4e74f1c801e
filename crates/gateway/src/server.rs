use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    axum::{
        Router,
        extract::{Path, State, WebSocketUpgrade},
        http::StatusCode,
        response::{IntoResponse, Json},
        routing::{get, head},
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use well_pits::{PitRegistry, validate_slug};

use crate::ws::handle_connection;

/// Delay applied to "no such pit" probes so slugs cannot be enumerated
/// quickly.
const MISS_DELAY: Duration = Duration::from_millis(500);

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    registry: Arc<PitRegistry>,
    /// Monotonic connection ids, used to keep a client's own updates from
    /// echoing back to it.
    next_conn_id: Arc<AtomicU64>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(registry: Arc<PitRegistry>) -> Router {
    let state = AppState {
        registry,
        next_conn_id: Arc::new(AtomicU64::new(0)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/pit/{slug}", head(pit_exists_handler))
        .route("/ws/{slug}", get(ws_upgrade_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the gateway until `shutdown` resolves.
///
/// Resolution of `shutdown` stops the accept loop; in-flight attachments
/// are cut when the process exits after the final flush.
pub async fn serve(
    registry: Arc<PitRegistry>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let app = build_app(Arc::clone(&registry));
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    banner(&registry, listener.local_addr()?);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result?,
        () = shutdown => info!("gateway stopped accepting connections"),
    }
    Ok(())
}

fn banner(registry: &PitRegistry, addr: SocketAddr) {
    let lines = [
        format!("welld v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on {addr}"),
        format!("pits dir: {}", registry.pits_dir().display()),
        format!(
            "ttl {}s, sweep every {}s",
            registry.ttl().as_secs(),
            registry.cleanup_interval().as_secs()
        ),
        format!("stats: http://{addr}/stats"),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "welld",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.stats().await)
}

/// HEAD probe used by landing pages to tell "join" from "create". Misses
/// are delayed to blunt slug scraping.
async fn pit_exists_handler(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> StatusCode {
    if state.registry.exists(&slug).await {
        StatusCode::OK
    } else {
        tokio::time::sleep(MISS_DELAY).await;
        StatusCode::NOT_FOUND
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if validate_slug(&slug).is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    ws.on_upgrade(move |socket| handle_connection(socket, state.registry, slug, conn_id))
        .into_response()
}
