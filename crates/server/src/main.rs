use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post, put},
    Json, Router,
};
use live_cache::{InMemoryLivePointer, LiveEventPointer, RedisLivePointer};
use server_api::ApiContext;
use shared::{
    domain::{
        AttendeeId, Award, AwardDraft, AwardId, Demo, DemoDraft, DemoId, Event, EventId,
        LiveEvent, PhaseAdvice, Vote,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AwardTally, CastVoteRequest, CreateEventRequest, EventAggregate, MoveItemRequest,
        PhaseUpdate, RenameEventRequest, SetCurrentAwardRequest, SetCurrentDemoRequest,
        SetPhaseRequest, SetWinnerRequest,
    },
};
use storage::Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::{load_settings, normalize_database_url};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    admin_token: String,
}

type Rejection = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, Rejection>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let live: Arc<dyn LiveEventPointer> = match settings.redis_url.as_deref() {
        Some(redis_url) => {
            let pointer = RedisLivePointer::new(redis_url)?;
            pointer.connect().await?;
            Arc::new(pointer)
        }
        None => {
            warn!("no redis url configured; live event pointer is process-local");
            Arc::new(InMemoryLivePointer::new())
        }
    };

    let api = ApiContext { storage, live };
    let live = server_api::refresh_live_pointer(&api)
        .await
        .context("failed to reconcile live event pointer")?;
    let live_event = live.map(|l| l.event_id);
    info!(?live_event, "live pointer reconciled");

    let app = build_router(Arc::new(AppState {
        api,
        admin_token: settings.admin_token,
    }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// `RUST_LOG` when it parses, `info` otherwise.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/live", get(http_get_live))
        .route("/live/stop", post(http_stop_live))
        .route("/events", get(http_list_events).post(http_create_event))
        .route(
            "/events/:event_id",
            get(http_event_aggregate)
                .patch(http_rename_event)
                .delete(http_delete_event),
        )
        .route("/events/:event_id/live", post(http_start_live))
        .route("/events/:event_id/phase", put(http_set_phase))
        .route("/events/:event_id/current_demo", put(http_set_current_demo))
        .route("/events/:event_id/current_award", put(http_set_current_award))
        .route("/events/:event_id/advice", get(http_phase_advice))
        .route(
            "/events/:event_id/demos",
            get(http_list_demos)
                .post(http_create_demo)
                .put(http_replace_demos),
        )
        .route(
            "/events/:event_id/awards",
            get(http_list_awards)
                .post(http_create_award)
                .put(http_replace_awards),
        )
        .route(
            "/demos/:demo_id",
            patch(http_update_demo).delete(http_delete_demo),
        )
        .route("/demos/:demo_id/move", post(http_move_demo))
        .route(
            "/awards/:award_id",
            patch(http_update_award).delete(http_delete_award),
        )
        .route("/awards/:award_id/move", post(http_move_award))
        .route("/awards/:award_id/tally", get(http_tally))
        .route("/awards/:award_id/winner", put(http_set_winner))
        .route("/awards/:award_id/reveal", post(http_reveal_award))
        .route("/awards/:award_id/hide", post(http_hide_award))
        .route("/votes", post(http_cast_vote))
        .route(
            "/events/:event_id/votes/:attendee_id",
            get(http_attendee_votes),
        )
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, Rejection> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_get_live(State(state): State<Arc<AppState>>) -> HttpResult<Option<LiveEvent>> {
    server_api::get_live_event(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_stop_live(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection> {
    require_admin(&state, &headers)?;
    server_api::stop_live_event(&state.api)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_events(State(state): State<Arc<AppState>>) -> HttpResult<Vec<Event>> {
    server_api::list_events(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateEventRequest>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::create_event(&state.api, &req.name)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_event_aggregate(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> HttpResult<EventAggregate> {
    server_api::get_event_aggregate(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_rename_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(req): Json<RenameEventRequest>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::rename_event(&state.api, EventId(event_id), &req.name)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::delete_event(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_start_live(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
) -> HttpResult<LiveEvent> {
    require_admin(&state, &headers)?;
    server_api::start_live_event(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_phase(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(req): Json<SetPhaseRequest>,
) -> HttpResult<PhaseUpdate> {
    require_admin(&state, &headers)?;
    server_api::set_phase(&state.api, EventId(event_id), req.phase)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_current_demo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(req): Json<SetCurrentDemoRequest>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::set_current_demo(&state.api, EventId(event_id), req.demo_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_current_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(req): Json<SetCurrentAwardRequest>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::set_current_award(&state.api, EventId(event_id), req.award_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_phase_advice(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> HttpResult<PhaseAdvice> {
    server_api::phase_advice(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_demos(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> HttpResult<Vec<Demo>> {
    server_api::list_demos(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_demo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(draft): Json<DemoDraft>,
) -> HttpResult<Demo> {
    require_admin(&state, &headers)?;
    server_api::create_demo(&state.api, EventId(event_id), &draft)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_replace_demos(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(drafts): Json<Vec<DemoDraft>>,
) -> HttpResult<Vec<Demo>> {
    require_admin(&state, &headers)?;
    server_api::replace_demos(&state.api, EventId(event_id), &drafts)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_demo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(demo_id): Path<i64>,
    Json(draft): Json<DemoDraft>,
) -> HttpResult<Demo> {
    require_admin(&state, &headers)?;
    server_api::update_demo(&state.api, DemoId(demo_id), &draft)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_demo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(demo_id): Path<i64>,
) -> HttpResult<Demo> {
    require_admin(&state, &headers)?;
    server_api::delete_demo(&state.api, DemoId(demo_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_move_demo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(demo_id): Path<i64>,
    Json(req): Json<MoveItemRequest>,
) -> HttpResult<Demo> {
    require_admin(&state, &headers)?;
    server_api::move_demo(&state.api, DemoId(demo_id), req.index)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_awards(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> HttpResult<Vec<Award>> {
    server_api::list_awards(&state.api, EventId(event_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(draft): Json<AwardDraft>,
) -> HttpResult<Award> {
    require_admin(&state, &headers)?;
    server_api::create_award(&state.api, EventId(event_id), &draft)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_replace_awards(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<i64>,
    Json(drafts): Json<Vec<AwardDraft>>,
) -> HttpResult<Vec<Award>> {
    require_admin(&state, &headers)?;
    server_api::replace_awards(&state.api, EventId(event_id), &drafts)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
    Json(draft): Json<AwardDraft>,
) -> HttpResult<Award> {
    require_admin(&state, &headers)?;
    server_api::update_award(&state.api, AwardId(award_id), &draft)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
) -> HttpResult<Award> {
    require_admin(&state, &headers)?;
    server_api::delete_award(&state.api, AwardId(award_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_move_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
    Json(req): Json<MoveItemRequest>,
) -> HttpResult<Award> {
    require_admin(&state, &headers)?;
    server_api::move_award(&state.api, AwardId(award_id), req.index)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_tally(
    State(state): State<Arc<AppState>>,
    Path(award_id): Path<i64>,
) -> HttpResult<AwardTally> {
    server_api::tally_votes(&state.api, AwardId(award_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_winner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
    Json(req): Json<SetWinnerRequest>,
) -> HttpResult<Award> {
    require_admin(&state, &headers)?;
    server_api::set_winner(&state.api, AwardId(award_id), req.demo_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_reveal_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::reveal_award(&state.api, AwardId(award_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_hide_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(award_id): Path<i64>,
) -> HttpResult<Event> {
    require_admin(&state, &headers)?;
    server_api::hide_award(&state.api, AwardId(award_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_cast_vote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CastVoteRequest>,
) -> HttpResult<Vote> {
    server_api::cast_vote(&state.api, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_attendee_votes(
    State(state): State<Arc<AppState>>,
    Path((event_id, attendee_id)): Path<(i64, Uuid)>,
) -> HttpResult<Vec<Vote>> {
    server_api::attendee_votes(&state.api, EventId(event_id), AttendeeId(attendee_id))
        .await
        .map(Json)
        .map_err(reject)
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Rejection> {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(state.admin_token.as_str()) {
        return Err(reject(ApiError::new(
            ErrorCode::Unauthorized,
            "admin token missing or invalid",
        )));
    }
    Ok(())
}

fn reject(err: ApiError) -> Rejection {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::InvalidState => StatusCode::CONFLICT,
        ErrorCode::ConflictRetry => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(code = ?err.code, message = %err.message, "request failed");
    }
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
