//! Integration tests for the REST API feature.

#![cfg(feature = "api")]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use plant_sim::api::{AppState, router};
use plant_sim::config::SimulatorConfig;
use plant_sim::simulator::Simulator;
use plant_sim::store::{MemoryStore, SharedStore};

use common::t0;

/// Initialized simulator sharing its store with the API state.
fn build() -> (Simulator<SharedStore>, Arc<AppState>) {
    let config = SimulatorConfig::default();
    let store = SharedStore::new(MemoryStore::new());
    let mut sim = Simulator::new(&config, store.clone());
    sim.initialize(t0()).unwrap();
    sim.tick(t0());
    let state = Arc::new(AppState {
        store,
        catalog: sim.scenarios().registry().catalog(&config.scenario),
    });
    (sim, state)
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router(Arc::clone(state)).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or_default())
}

async fn put(state: &Arc<AppState>, uri: &str, body: &str) -> StatusCode {
    let req = Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router(Arc::clone(state)).oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn states_expose_published_telemetry() {
    let (_sim, state) = build();
    let (status, json) = get_json(&state, "/states").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["grid.limitKw"], 80.0);
    assert_eq!(json["evcs.count"], 6.0);
    assert_eq!(json["sim.tick"], 1.0);

    let (status, json) = get_json(&state, "/states/evcs.c04.type").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key"], "evcs.c04.type");
    assert_eq!(json["value"], "dc");
}

#[tokio::test]
async fn put_reaches_the_plant_and_is_acknowledged() {
    let (mut sim, state) = build();
    assert_eq!(put(&state, "/states/grid.limitKw", "5000").await, StatusCode::ACCEPTED);
    assert_eq!(sim.process_commands(t0()), 1);
    assert_eq!(sim.model().unwrap().grid.limit_kw, 2000.0);

    let (_, json) = get_json(&state, "/states/grid.limitKw").await;
    assert_eq!(json["value"], 2000.0);
}

#[tokio::test]
async fn scenario_can_be_started_over_http() {
    let (mut sim, state) = build();
    assert_eq!(
        put(&state, "/states/scenario.start", "\"tariff_spike\"").await,
        StatusCode::ACCEPTED
    );
    sim.process_commands(t0());
    sim.tick(t0());
    let (_, json) = get_json(&state, "/states/scenario.active").await;
    assert_eq!(json["value"], "tariff_spike");
}

#[tokio::test]
async fn measurement_keys_reject_writes() {
    let (_sim, state) = build();
    assert_eq!(put(&state, "/states/grid.powerKw", "1").await, StatusCode::BAD_REQUEST);
    assert!(put(&state, "/states/grid.limitKw", "{").await.is_client_error());
}

#[tokio::test]
async fn catalog_lists_every_scenario() {
    let (_sim, state) = build();
    let (status, json) = get_json(&state, "/scenarios").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 16);
    assert!(ids.contains(&"peak_shaving_staged"));
    assert_eq!(ids.last(), Some(&"suite_all"));
}
