//! Router construction and the server loop.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    config::ServerArgs,
    error::ServerError,
    handler::{
        get_presence, get_room_detail, get_rooms, get_users, health_check, login, logout,
        post_notify, presence_websocket_handler, room_websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/rooms", get(get_rooms))
        .route("/api/rooms/{room_id}", get(get_room_detail))
        .route("/api/presence", get(get_presence))
        .route("/api/users", get(get_users))
        .route("/api/notify", post(post_notify))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/ws/room/{room_id}", get(room_websocket_handler))
        .route("/api/ws/presence", get(presence_websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}

/// Run the server described by `args` until a shutdown signal arrives.
pub async fn run(args: ServerArgs) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(args.state_config(), args.reply_generator()?)?);

    let addr = args.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!("WebSocket server listening on ws://{}", addr);

    serve(listener, state, shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}
