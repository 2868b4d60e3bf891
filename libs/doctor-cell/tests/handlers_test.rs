use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Timelike};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::TimeOfDay;
use doctor_cell::router::doctor_routes;
use doctor_cell::services::AvailabilityService;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig::with_supabase_url(mock_server.uri());
    (doctor_routes(config.to_arc()), config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn mock_doctor_hours(mock_server: &MockServer, doctor_id: &str, hours: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_with_hours(doctor_id, hours)
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_taken_times(mock_server: &MockServer, doctor_id: &str, date: &str, taken: &[&str]) {
    let rows: Vec<Value> = taken.iter().map(|t| MockSupabaseResponses::taken_time(t)).collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("date", format!("eq.{}", date)))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_available_slots_public() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);
    let doctor_id = Uuid::new_v4().to_string();

    mock_doctor_hours(&mock_server, &doctor_id, json!({
        "monday": { "start": "09:00", "end": "11:00" }
    })).await;
    mock_taken_times(&mock_server, &doctor_id, "2099-06-01", &["09:30"]).await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}/available-slots?date=2099-06-01", doctor_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["available_slots"], json!(["09:00", "10:00", "10:30"]));
    assert_eq!(json_response["total_slots"], 3);
    assert_eq!(json_response["date"], "2099-06-01");
}

#[tokio::test]
async fn test_available_slots_on_day_off() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);
    let doctor_id = Uuid::new_v4().to_string();

    mock_doctor_hours(&mock_server, &doctor_id, MockSupabaseResponses::weekday_hours()).await;
    mock_taken_times(&mock_server, &doctor_id, "2099-06-07", &[]).await;

    let request = Request::builder()
        .uri(format!("/{}/available-slots?date=2099-06-07", doctor_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["available_slots"], json!([]));
    assert_eq!(json_response["total_slots"], 0);
}

#[tokio::test]
async fn test_available_slots_unknown_doctor() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .uri(format!("/{}/available-slots?date=2099-06-01", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_doctor_id_rejected() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);

    let request = Request::builder()
        .uri("/not-a-uuid/working-hours")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_public_working_hours_normalizes_legacy_list() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);
    let doctor_id = Uuid::new_v4().to_string();

    mock_doctor_hours(&mock_server, &doctor_id, json!([
        { "day": "Monday", "start": "08:00", "end": "12:00" },
        { "day": "friday", "start": "13:00", "end": "" }
    ])).await;

    let request = Request::builder()
        .uri(format!("/{}/working-hours", doctor_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "monday": { "start": "08:00", "end": "12:00" } })
    );
}

#[tokio::test]
async fn test_doctor_reads_own_hours() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor.id)))
        .and(header("Authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": doctor.id, "working_hours": null }
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .uri("/me/working-hours")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "working_hours": {} }));
}

#[tokio::test]
async fn test_doctor_saves_own_hours() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);
    let hours = json!({ "tuesday": { "start": "09:00", "end": "12:00" } });

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor.id)))
        .and(body_partial_json(json!({ "working_hours": hours })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_with_hours(&doctor.id, hours.clone())
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/me/working-hours")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "working_hours": hours }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["working_hours"], hours);
}

#[tokio::test]
async fn test_invalid_window_rejected_before_write() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/me/working-hours")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({
            "working_hours": { "monday": { "start": "17:00", "end": "09:00" } }
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patient_cannot_set_doctor_hours() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/working-hours", Uuid::new_v4()))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "working_hours": {} }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_clinic_sets_doctor_hours() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let clinic = TestUser::clinic("clinic@example.com");
    let token = JwtTestUtils::create_test_token(&clinic, &config.jwt_secret, None);
    let doctor_id = Uuid::new_v4().to_string();
    let hours = MockSupabaseResponses::weekday_hours();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_with_hours(&doctor_id, hours.clone())
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/working-hours", doctor_id))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "working_hours": hours }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["doctor_id"], doctor_id);
    assert_eq!(json_response["working_hours"], hours);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);

    let request = Request::builder()
        .uri("/me/working-hours")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slots_before_reference_dropped_on_same_day() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(mock_server.uri());
    let service = AvailabilityService::new(&config.to_app_config());
    let doctor_id = Uuid::new_v4().to_string();

    mock_doctor_hours(&mock_server, &doctor_id, json!({
        "monday": { "start": "09:00", "end": "12:00" }
    })).await;
    mock_taken_times(&mock_server, &doctor_id, "2099-06-01", &["11:00"]).await;

    let monday = NaiveDate::from_ymd_opt(2099, 6, 1).unwrap();
    let slots = service
        .get_available_slots_at(&doctor_id, monday, monday.and_hms_opt(10, 0, 30).unwrap(), None)
        .await
        .unwrap();
    let rendered: Vec<String> = slots.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["10:30", "11:30"]);

    // A reference on another day leaves the whole window open.
    let sunday = NaiveDate::from_ymd_opt(2099, 5, 31).unwrap();
    let slots = service
        .get_available_slots_at(&doctor_id, monday, sunday.and_hms_opt(23, 59, 0).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(slots.len(), 5);
}

#[tokio::test]
async fn test_clinic_clock_decides_today() {
    let mock_server = MockServer::start().await;
    let mut config = TestConfig::with_supabase_url(mock_server.uri()).to_app_config();
    config.clinic_utc_offset_minutes = 5 * 60;
    let service = AvailabilityService::new(&config);
    let doctor_id = Uuid::new_v4().to_string();

    let every_day: serde_json::Map<String, Value> = [
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    ]
    .iter()
    .map(|day| (day.to_string(), json!({ "start": "00:00", "end": "23:59" })))
    .collect();
    mock_doctor_hours(&mock_server, &doctor_id, Value::Object(every_day)).await;

    let before = config.clinic_now();
    let today = before.date();
    mock_taken_times(&mock_server, &doctor_id, &today.to_string(), &[]).await;

    let slots = service.get_available_slots(&doctor_id, today, None).await.unwrap();

    if config.clinic_now().date() != today {
        // Midnight passed mid-test on the clinic clock; nothing left to compare.
        return;
    }

    let now = TimeOfDay::from_hm(before.hour() as u8, before.minute() as u8).unwrap();
    assert!(slots.iter().all(|slot| *slot > now), "{:?} not after {}", slots, now);
    if now.minutes() < 23 * 60 {
        assert_eq!(slots.last(), TimeOfDay::from_hm(23, 30).as_ref());
    }
}
