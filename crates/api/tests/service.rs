//! End-to-end tests driving the router with the shipped demo model

use api::config::ArtifactConfig;
use api::{create_router, AppState, ScoringContext, ServiceConfig, SharedState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use risk_enricher::EnricherConfig;
use serde_json::Value;
use std::sync::Arc;
use tabular_input::ReaderConfig;
use tokio::sync::RwLock;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "X-CREDIT-RISK-BOUNDARY";

const APPLICANTS_CSV: &str = "\
PROSPECTID,Tot_Missed_Pmnt,NETMONTHLYINCOME,num_times_60p_dpd,max_recent_level_of_deliq,EDUCATION,GENDER,MARITALSTATUS
101,0,50000,0,0,GRADUATE,F,Married
102,3,10000,2,60,SSC,M,Single
103,2,30000,0,0,12TH,M,Married
104,2,10000,3,0,POST-GRADUATE,F,Single
";

fn models_dir() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../models").to_string()
}

fn seeded_context(seed: u64) -> ScoringContext {
    let enrichment = EnricherConfig {
        cosmetic_seed: Some(seed),
        ..Default::default()
    };
    ScoringContext::load(
        &ArtifactConfig::in_dir(models_dir()),
        enrichment,
        ReaderConfig::default(),
    )
    .unwrap()
}

fn loaded_state() -> SharedState {
    Arc::new(RwLock::new(AppState::new().with_context(seeded_context(7))))
}

fn app(state: SharedState) -> Router {
    create_router(state, &ServiceConfig::default())
}

fn upload(file_name: &str, content_type: &str, body: &str) -> Request<Body> {
    upload_field("file", file_name, content_type, body)
}

fn upload_field(field: &str, file_name: &str, content_type: &str, body: &str) -> Request<Body> {
    let payload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: {content_type}\r\n\r\n{body}\r\n--{b}--\r\n",
        b = BOUNDARY,
    );
    Request::builder()
        .method("POST")
        .uri("/api/v1/process-file")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(payload))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_ready_when_model_loaded() {
    let (status, body) = send(app(loaded_state()), get("/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["model"]["feature_count"], 60);
    assert_eq!(body["model"]["class_count"], 4);
    assert_eq!(body["model"]["format"], "xgboost_json");
}

#[tokio::test]
async fn test_health_not_ready_without_model() {
    let state = Arc::new(RwLock::new(AppState::new()));
    let (status, body) = send(app(state), get("/api/v1/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["model_loaded"], false);
    assert!(body["model"].is_null());
}

#[tokio::test]
async fn test_csv_upload_scores_rows_in_order() {
    let (status, body) = send(app(loaded_state()), upload("applicants.csv", "text/csv", APPLICANTS_CSV)).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_rows"], 4);
    assert_eq!(body["predictions"], serde_json::json!(["P1", "P4", "P2", "P3"]));
    assert_eq!(body["customer_ids"], serde_json::json!(["101", "102", "103", "104"]));

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["customerId"], "101");
    assert_eq!(results[0]["riskLevel"], "P1");
    assert_eq!(results[0]["isEligible"], true);
    assert_eq!(results[1]["isEligible"], false);
    assert_eq!(results[2]["isEligible"], true);
    assert_eq!(results[3]["isEligible"], false);

    for result in results {
        let sum: f64 = result["probabilities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p.as_f64().unwrap())
            .sum();
        assert!((sum - 1.0).abs() <= 1e-6);
        assert!(!result["recommendations"].as_array().unwrap().is_empty());
    }

    assert_eq!(body["summary"]["eligible_count"], 2);
}

#[tokio::test]
async fn test_feature_importance_is_ranked() {
    let response = app(loaded_state())
        .oneshot(upload("applicants.csv", "text/csv", APPLICANTS_CSV))
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    // ranked map keeps its order in the serialized body
    let position = |name: &str| text.find(&format!("\"{}\":", name)).unwrap();
    assert!(position("max_recent_level_of_deliq") < position("Tot_Missed_Pmnt"));
    assert!(position("Tot_Missed_Pmnt") < position("num_times_60p_dpd"));
    assert!(position("num_times_60p_dpd") < position("NETMONTHLYINCOME"));
}

#[tokio::test]
async fn test_json_upload() {
    let rows = r#"[
        {"PROSPECTID": 7, "Tot_Missed_Pmnt": 0, "NETMONTHLYINCOME": 50000, "GENDER": "F"},
        {"PROSPECTID": 8, "Tot_Missed_Pmnt": 3, "max_recent_level_of_deliq": 60, "num_times_60p_dpd": 2}
    ]"#;
    let (status, body) = send(app(loaded_state()), upload("applicants.json", "application/json", rows)).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["predictions"], serde_json::json!(["P1", "P4"]));
    assert_eq!(body["customer_ids"], serde_json::json!(["7", "8"]));
}

#[tokio::test]
async fn test_extra_columns_do_not_change_scores() {
    let with_extra = APPLICANTS_CSV
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("{},favourite_colour", line)
            } else {
                format!("{},blue", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let (_, plain) = send(app(loaded_state()), upload("a.csv", "text/csv", APPLICANTS_CSV)).await;
    let (status, extra) = send(app(loaded_state()), upload("a.csv", "text/csv", &with_extra)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(plain["results"], extra["results"]);
    assert_eq!(
        extra["data_quality"]["dropped_columns"],
        serde_json::json!(["favourite_colour"])
    );
}

#[tokio::test]
async fn test_header_only_csv_is_empty_dataset() {
    let (status, body) = send(
        app(loaded_state()),
        upload("empty.csv", "text/csv", "PROSPECTID,Tot_Missed_Pmnt\n"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_dataset");
}

#[tokio::test]
async fn test_spreadsheet_rejected() {
    let (status, body) = send(
        app(loaded_state()),
        upload(
            "applicants.xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "PK",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_format");
}

#[tokio::test]
async fn test_missing_file_field() {
    let (status, body) = send(
        app(loaded_state()),
        upload_field("attachment", "a.csv", "text/csv", APPLICANTS_CSV),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_file");
}

#[tokio::test]
async fn test_scoring_unavailable_without_model() {
    let state = Arc::new(RwLock::new(AppState::new()));
    let (status, body) = send(app(state), upload("a.csv", "text/csv", APPLICANTS_CSV)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_loaded");
}

#[tokio::test]
async fn test_model_description() {
    let (status, body) = send(app(loaded_state()), get("/api/v1/model")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feature_count"], 60);
    assert_eq!(body["feature_names"].as_array().unwrap().len(), 60);
    assert_eq!(body["class_labels"], serde_json::json!(["P1", "P2", "P3", "P4"]));
    assert_eq!(body["identifier_column"], "PROSPECTID");
    assert_eq!(body["credit_factors"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_metrics_absent_without_recorder() {
    let response = app(loaded_state()).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_swap_context_keeps_in_flight_scoring_on_old_model() {
    let state = loaded_state();
    let in_flight = state.read().await.context.clone().unwrap();

    let previous = state.write().await.swap_context(seeded_context(99));
    assert!(Arc::ptr_eq(&previous.unwrap(), &in_flight));

    // a request holding the old context still completes against it
    let record = tabular_input::RawRecord::new()
        .with("PROSPECTID", 1.0)
        .with("Tot_Missed_Pmnt", 0.0)
        .with("NETMONTHLYINCOME", 50_000.0);
    let old = in_flight.score_records(&[record], Uuid::new_v4()).unwrap();
    assert_eq!(old.predictions, vec!["P1"]);

    let current = state.read().await.context.clone().unwrap();
    assert!(!Arc::ptr_eq(&current, &in_flight));

    let (status, body) = send(app(state), upload("a.csv", "text/csv", APPLICANTS_CSV)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"], serde_json::json!(["P1", "P4", "P2", "P3"]));
}

#[tokio::test]
async fn test_swap_context_makes_service_ready() {
    let state = Arc::new(RwLock::new(AppState::new()));
    let (status, _) = send(app(state.clone()), get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert!(state.write().await.swap_context(seeded_context(1)).is_none());

    let (status, body) = send(app(state), get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
