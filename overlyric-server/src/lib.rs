pub mod api;
pub mod error;

pub use api::{CommandResponse, ControlApi, LyricResponse, NowPlayingResponse, PositionResponse};
pub use error::{ErrorEnvelope, Result, ServerError};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use overlyric_core::{MediaCommand, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const LOG_TARGET: &str = "overlyric::server";

type SharedApi = Arc<ControlApi>;

async fn now_playing(State(api): State<SharedApi>) -> Json<NowPlayingResponse> {
    Json(api.now_playing())
}

fn command_route(command: MediaCommand) -> MethodRouter<SharedApi> {
    get(move |State(api): State<SharedApi>| async move { api.command(command).await.map(Json) })
}

async fn lyric(State(api): State<SharedApi>) -> Result<Json<LyricResponse>> {
    api.lyric().map(Json)
}

async fn pic(State(api): State<SharedApi>) -> Response {
    match api.cover().await {
        Ok(image) => ([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn current_position(State(api): State<SharedApi>) -> Json<PositionResponse> {
    Json(api.current_position())
}

/// All control endpoints under `/api`.
pub fn router(api: SharedApi) -> Router {
    Router::new()
        .route("/api/now-playing", get(now_playing))
        .route("/api/play-pause", command_route(MediaCommand::PlayPause))
        .route("/api/next-track", command_route(MediaCommand::NextTrack))
        .route("/api/previous-track", command_route(MediaCommand::PreviousTrack))
        .route("/api/volume/up", command_route(MediaCommand::VolumeUp))
        .route("/api/volume/down", command_route(MediaCommand::VolumeDown))
        .route("/api/mute", command_route(MediaCommand::Mute))
        .route("/api/lyric", get(lyric))
        .route("/api/pic", get(pic))
        .route("/api/current-position", get(current_position))
        .with_state(api)
}

/// HTTP control server bound to its listen address.
pub struct ControlServer {
    listener: TcpListener,
    router: Router,
}

impl ControlServer {
    /// Bind the configured address. `host` may be an IP address or a name
    /// such as `localhost`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve or the port is in use.
    pub async fn bind(config: &ServerConfig, api: SharedApi) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{}", config.host, config.port),
                source,
            })?;
        Ok(Self {
            listener,
            router: router(api),
        })
    }

    /// Address actually bound, useful when the configured port is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    /// Serve requests until `cancel` fires, then finish in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops for any other reason.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(target: LOG_TARGET, "Control server listening on http://{}/api", addr);
        }
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(ServerError::Serve)?;
        info!(target: LOG_TARGET, "Control server stopped");
        Ok(())
    }
}
