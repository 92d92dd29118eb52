mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parlor_api::auth::{AppState, AppStateInner, IdentityResolver, JwtResolver, SessionResolver};
use parlor_api::middleware::require_identity;
use parlor_api::{history, notifications};
use parlor_db::Database;
use parlor_gateway::{Dispatcher, DmPolicy, Hub, connection};

use crate::config::{AuthMode, Config};

#[derive(Clone)]
struct ServerState {
    app: AppState,
    dispatcher: Dispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,parlor_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let db = Arc::new(Database::open(&config.db_path)?);

    let resolver: Arc<dyn IdentityResolver> = match &config.auth {
        AuthMode::Session => {
            info!("Auth mode: session cookie");
            Arc::new(SessionResolver::new(db.clone()))
        }
        AuthMode::Jwt { secret } => {
            info!("Auth mode: bearer JWT");
            Arc::new(JwtResolver::new(secret))
        }
    };

    let state = build_state(db, resolver, config.dm_policy.clone());
    match state.dispatcher.policy() {
        DmPolicy::Closed(raw) => warn!(
            "Unrecognised PARLOR_DM_POLICY {:?}, direct messages are disabled",
            raw
        ),
        policy => info!("DM policy: {}", policy),
    }

    let app = router(state)
        .layer(cors_layer(&config.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parlor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(
    db: Arc<Database>,
    resolver: Arc<dyn IdentityResolver>,
    policy: DmPolicy,
) -> ServerState {
    let dispatcher = Dispatcher::new(Hub::new(), db.clone(), policy);
    let app = Arc::new(AppStateInner {
        db,
        notifier: dispatcher.notifier().clone(),
        resolver,
    });
    ServerState { app, dispatcher }
}

fn router(state: ServerState) -> Router {
    let api_routes = Router::new()
        .route("/api/messages", get(history::get_history))
        .route("/api/group/messages", get(history::get_group_history))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-by-message", post(notifications::read_by_message))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.app.clone(), require_identity))
        .with_state(state.app.clone());

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(api_routes)
        .merge(ws_route)
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = origin.parse()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Origin and identity are both checked before the upgrade completes.
async fn ws_upgrade(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !origin_allowed(&headers) {
        warn!(
            "Rejected WebSocket upgrade from origin {:?}",
            headers.get(header::ORIGIN)
        );
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let user_id = match state.app.resolver.resolve(&headers).await {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, user_id))
}

/// Same-host rule: the Origin hostname must equal the Host header's hostname.
/// Requests without an Origin (non-browser clients) are allowed.
fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };

    let origin_host = origin
        .to_str()
        .ok()
        .and_then(|o| o.parse::<Uri>().ok())
        .and_then(|uri| uri.host().map(normalize_host));
    let request_host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(host_without_port);

    matches!((origin_host, request_host), (Some(o), Some(h)) if o == h)
}

fn host_without_port(host: &str) -> String {
    let host = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => host.rsplit_once(':').map_or(host, |(h, _)| h),
    };
    normalize_host(host)
}

fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase()
}
