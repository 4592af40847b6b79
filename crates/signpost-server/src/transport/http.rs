//! HTTP transport: the JSON API the browser map client talks to.
//!
//! Every mutating route answers with the list of map commands the client
//! must replay. Errors answer with a single `show_error` command. Spinner
//! commands are pushed separately on `/api/events` as chains start and end.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};

use signpost::registry::Chooser;
use signpost::{FeatureRef, MapCommand, QueryOptions};

use crate::loading::LoadingIndicator;
use crate::session::SignpostSession;
use crate::types::{ServerError, ServerResult};

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub session: SignpostSession,
    pub loading: Arc<LoadingIndicator>,
}

impl ServerState {
    pub fn new(session: SignpostSession) -> Arc<Self> {
        Arc::new(Self {
            loading: session.loading(),
            session,
        })
    }
}

type Commands = Result<Json<Vec<MapCommand>>, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::warn!("Request failed ({status}): {self}");
        (
            status,
            Json(vec![MapCommand::ShowError {
                message: self.to_string(),
            }]),
        )
            .into_response()
    }
}

/// Build the axum Router with all map client endpoints.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/start", post(handle_start))
        .route("/api/datasets", get(handle_datasets))
        .route("/api/datasets/:key", post(handle_load_dataset))
        .route("/api/clustering", post(handle_clustering))
        .route("/api/choropleths", delete(handle_hide_choropleths))
        .route("/api/choropleths/:name", post(handle_load_choropleth))
        .route(
            "/api/selection",
            post(handle_select).delete(handle_clear_selection),
        )
        .route("/api/isolines", post(handle_add_isoline))
        .route("/api/isolines/:id", delete(handle_delete_isoline))
        .route("/api/geocode", get(handle_geocode))
        .route("/api/events", get(handle_events))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on an already bound listener.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> ServerResult<()> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))
}

/// HTTP transport for the browser map client.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(session: SignpostSession) -> Self {
        Self {
            state: ServerState::new(session),
        }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> ServerResult<()> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Io)?;
        tracing::info!("HTTP transport listening on {addr}");
        serve(listener, self.state.clone()).await
    }
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "session": state.session.id(),
        "loading": state.loading.is_loading(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct DatasetParams {
    dataset: Option<String>,
    cluster: Option<String>,
}

async fn handle_start(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<DatasetParams>,
) -> Json<Vec<MapCommand>> {
    let query = QueryOptions {
        dataset: params.dataset,
        cluster: params.cluster,
    };
    Json(state.session.start(&query).await)
}

async fn handle_datasets(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<DatasetParams>,
) -> Json<Chooser> {
    Json(state.session.chooser(params.dataset.as_deref()))
}

async fn handle_load_dataset(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
    Query(params): Query<DatasetParams>,
) -> Json<Vec<MapCommand>> {
    Json(
        state
            .session
            .load_dataset(&key, params.cluster.as_deref())
            .await,
    )
}

#[derive(Debug, Deserialize)]
struct ClusteringBody {
    enabled: bool,
}

async fn handle_clustering(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ClusteringBody>,
) -> Commands {
    Ok(Json(state.session.toggle_clustering(body.enabled).await?))
}

async fn handle_load_choropleth(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Commands {
    Ok(Json(state.session.load_choropleth(&name).await?))
}

async fn handle_hide_choropleths(State(state): State<Arc<ServerState>>) -> Json<Vec<MapCommand>> {
    Json(state.session.hide_choropleths().await)
}

async fn handle_select(
    State(state): State<Arc<ServerState>>,
    Json(feature): Json<FeatureRef>,
) -> Commands {
    Ok(Json(state.session.select(feature).await?))
}

async fn handle_clear_selection(State(state): State<Arc<ServerState>>) -> Json<Vec<MapCommand>> {
    Json(state.session.clear_selection().await)
}

async fn handle_add_isoline(
    State(state): State<Arc<ServerState>>,
    Json(geojson): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    let (id, commands) = state.session.add_isoline(geojson).await?;
    Ok(Json(serde_json::json!({ "id": id, "commands": commands })))
}

async fn handle_delete_isoline(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Commands {
    Ok(Json(state.session.delete_isoline(&id).await?))
}

#[derive(Debug, Deserialize)]
struct GeocodeParams {
    #[serde(default)]
    q: String,
}

async fn handle_geocode(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<GeocodeParams>,
) -> Commands {
    Ok(Json(state.session.geocode(&params.q).await?))
}

/// Server-sent spinner commands, one `data:` line of JSON per command.
async fn handle_events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.loading.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(command) => match Event::default().json_data(&command) {
                    Ok(event) => yield Ok(event),
                    Err(e) => tracing::warn!("Failed to encode event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged by {skipped}");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
