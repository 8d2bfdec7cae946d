use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use serde::de::DeserializeOwned;
use shared::domain::{Phase, RevealState};
use tower::ServiceExt;

const TOKEN: &str = "test-admin";

async fn test_app() -> (Router, ApiContext) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage,
        live: Arc::new(InMemoryLivePointer::new()),
    };
    let app = build_router(Arc::new(AppState {
        api: api.clone(),
        admin_token: TOKEN.to_string(),
    }));
    (app, api)
}

fn admin(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(ADMIN_TOKEN_HEADER, TOKEN)
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn open_get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

async fn json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[test]
fn log_filter_prefers_rust_log_and_defaults_to_info() {
    assert_eq!(log_filter(None).to_string(), "info");
    assert_eq!(log_filter(Some("server=debug")).to_string(), "server=debug");
    assert_eq!(log_filter(Some("server=loud")).to_string(), "info");
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _) = test_app().await;
    let response = app.oneshot(open_get("/healthz")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn admin_routes_require_token() {
    let (app, _) = test_app().await;
    let request = Request::post("/events")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"name":"night"}"#))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let err: ApiError = json(response).await;
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let request = Request::post("/events")
        .header("content-type", "application/json")
        .header(ADMIN_TOKEN_HEADER, "wrong")
        .body(Body::from(r#"{"name":"night"}"#))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(open_get("/events")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let events: Vec<Event> = json(response).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn live_route_returns_null_until_an_event_starts() {
    let (app, _) = test_app().await;
    let response = app.clone().oneshot(open_get("/live")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let live: Option<LiveEvent> = json(response).await;
    assert_eq!(live, None);

    let response = app
        .clone()
        .oneshot(admin("POST", "/events", serde_json::json!({ "name": "night" })))
        .await
        .expect("response");
    let event: Event = json(response).await;

    let response = app
        .clone()
        .oneshot(admin(
            "POST",
            &format!("/events/{}/live", event.id),
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(admin(
            "PUT",
            &format!("/events/{}/phase", event.id),
            serde_json::json!({ "phase": "voting" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(open_get("/live")).await.expect("response");
    let raw: serde_json::Value = json(response).await;
    assert_eq!(raw["eventId"], event.id.0);
    assert_eq!(raw["phase"], "voting");

    let response = app
        .clone()
        .oneshot(admin("POST", "/live/stop", serde_json::json!({})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.oneshot(open_get("/live")).await.expect("response");
    let live: Option<LiveEvent> = json(response).await;
    assert_eq!(live, None);
}

#[tokio::test]
async fn move_route_reorders_demos() {
    let (app, api) = test_app().await;
    let event = api.storage.create_event("night").await.expect("event");

    let response = app
        .clone()
        .oneshot(admin(
            "PUT",
            &format!("/events/{}/demos", event.id),
            serde_json::json!([
                { "name": "A" },
                { "name": "B" },
                { "name": "C" },
                { "name": "D" }
            ]),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let demos: Vec<Demo> = json(response).await;

    let response = app
        .clone()
        .oneshot(admin(
            "POST",
            &format!("/demos/{}/move", demos[3].id),
            serde_json::json!({ "index": 1 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(open_get(&format!("/events/{}/demos", event.id)))
        .await
        .expect("response");
    let names: Vec<String> = json::<Vec<Demo>>(response)
        .await
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["A", "D", "B", "C"]);
}

#[tokio::test]
async fn aggregate_route_carries_reveal_states() {
    let (app, api) = test_app().await;
    let event = api.storage.create_event("night").await.expect("event");
    for name in ["grand", "runner up", "crowd"] {
        let response = app
            .clone()
            .oneshot(admin(
                "POST",
                &format!("/events/{}/awards", event.id),
                serde_json::json!({ "name": name }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(open_get(&format!("/events/{}", event.id)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let aggregate: EventAggregate = json(response).await;
    assert_eq!(aggregate.awards.len(), 3);
    let states: Vec<_> = aggregate.reveal.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![RevealState::Locked, RevealState::Locked, RevealState::Reveal]
    );

    let response = app
        .clone()
        .oneshot(admin(
            "POST",
            &format!("/awards/{}/reveal", aggregate.awards[0].id),
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ApiError = json(response).await;
    assert_eq!(err.code, ErrorCode::InvalidState);

    let response = app
        .oneshot(admin(
            "POST",
            &format!("/awards/{}/reveal", aggregate.awards[2].id),
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let event: Event = json(response).await;
    assert_eq!(event.current_award_id, Some(aggregate.awards[2].id));
}

#[tokio::test]
async fn votes_route_maps_errors_to_statuses() {
    let (app, api) = test_app().await;
    let event = api.storage.create_event("night").await.expect("event");
    let demo = api
        .storage
        .demos()
        .append(
            event.id,
            &DemoDraft {
                name: "A".into(),
                description: String::new(),
                votable: true,
            },
        )
        .await
        .expect("demo");
    let award = api
        .storage
        .awards()
        .append(
            event.id,
            &AwardDraft {
                name: "best".into(),
                description: String::new(),
                votable: true,
            },
        )
        .await
        .expect("award");
    let ballot = serde_json::json!({
        "event_id": event.id,
        "attendee_id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
        "award_id": award.id,
        "demo_id": demo.id,
    });
    let vote = |body: serde_json::Value| {
        Request::post("/votes")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    };

    let response = app
        .clone()
        .oneshot(vote(ballot.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    api.storage
        .set_phase(event.id, Phase::Voting)
        .await
        .expect("phase");
    let response = app
        .clone()
        .oneshot(vote(ballot.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let mut stray = ballot;
    stray["award_id"] = serde_json::json!(999);
    let response = app.clone().oneshot(vote(stray)).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(open_get(&format!("/awards/{}/tally", award.id)))
        .await
        .expect("response");
    let tally: AwardTally = json(response).await;
    assert_eq!(tally.votes_for(demo.id), Some(1));

    let response = app
        .oneshot(open_get(&format!(
            "/events/{}/votes/6f9619ff-8b86-d011-b42d-00cf4fc964ff",
            event.id
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let ballot: Vec<Vote> = json(response).await;
    assert_eq!(ballot.len(), 1);
    assert_eq!(ballot[0].demo_id, Some(demo.id));
}

#[tokio::test]
async fn blank_event_name_is_a_bad_request() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(admin("POST", "/events", serde_json::json!({ "name": " " })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_live_event_clears_live_route() {
    let (app, api) = test_app().await;
    let event = api.storage.create_event("night").await.expect("event");
    server_api::start_live_event(&api, event.id)
        .await
        .expect("live");

    let response = app
        .clone()
        .oneshot(admin(
            "DELETE",
            &format!("/events/{}", event.id),
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(open_get("/live")).await.expect("response");
    let live: Option<LiveEvent> = json(response).await;
    assert_eq!(live, None);
}
