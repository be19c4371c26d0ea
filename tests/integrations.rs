//! Weather and calendar client contract tests
//!
//! Verify the HTTP requests each client sends and how responses, including
//! error statuses and failure bodies, are mapped.

use hark::integrations::{
    CalendarEntry, CalendarService, EntryUpdate, NewEntry, RestCalendarClient, RestWeatherClient,
    WeatherService,
};
use hark::Error;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::off_runtime;

fn calendar(server: &MockServer) -> impl FnOnce() -> RestCalendarClient + Send + 'static {
    let url = format!("{}/calendar", server.uri());
    move || RestCalendarClient::new(url).unwrap()
}

fn standup() -> NewEntry {
    NewEntry {
        title: "Meeting with team".to_string(),
        description: "Discuss project".to_string(),
        start_time: "2025-11-03T09:00".to_string(),
        end_time: "2025-11-03T10:00".to_string(),
        location: "Room 12".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Weather
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_weather_forecast_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("place", "New York"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "place": "New York",
            "forecast": [
                {"day": "Monday", "weather": "sunny", "temperature": {"min": 12, "max": 21}},
                {"day": "Tuesday", "weather": "rain", "temperature": {"min": 9.5, "max": 14}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/weather", server.uri());
    let report = off_runtime(move || RestWeatherClient::new(url).unwrap().forecast("New York"))
        .unwrap();

    assert_eq!(report.place, "New York");
    assert_eq!(report.forecast.len(), 2);
    assert_eq!(report.forecast[1].weather, "rain");
    assert!((report.forecast[1].temperature.min - 9.5).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_weather_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let url = format!("{}/weather", server.uri());
    let err = off_runtime(move || RestWeatherClient::new(url).unwrap().forecast("Marburg"))
        .unwrap_err();

    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Calendar
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_create_posts_entry() {
    let server = MockServer::start().await;
    let payload = json!({
        "title": "Meeting with team",
        "description": "Discuss project",
        "start_time": "2025-11-03T09:00",
        "end_time": "2025-11-03T10:00",
        "location": "Room 12"
    });
    let mut entry = payload.clone();
    entry["id"] = json!(1);

    Mock::given(method("POST"))
        .and(path("/calendar"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entry": entry })))
        .expect(1)
        .mount(&server)
        .await;

    let client = calendar(&server);
    let created = off_runtime(move || client().create(&standup())).unwrap();

    assert_eq!(created.id, 1);
    assert_eq!(created.title, "Meeting with team");
    assert_eq!(created.location.as_deref(), Some("Room 12"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_create_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad request"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || client().create(&standup())).unwrap_err();
    assert!(err.to_string().contains("API error 400"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_get_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendar"))
        .and(query_param("id", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"entry": {"id": 5, "title": "Standup"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = calendar(&server);
    let entry = off_runtime(move || client().get(5)).unwrap();
    assert_eq!(
        entry,
        CalendarEntry {
            id: 5,
            title: "Standup".to_string(),
            ..CalendarEntry::default()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_get_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendar"))
        .and(query_param("id", "999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || client().get(999)).unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_update_sends_partial_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/calendar"))
        .and(query_param("id", "3"))
        .and(body_json(json!({"title": "Updated title", "location": "Room 15"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": {"id": 3, "title": "Updated title", "location": "Room 15"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = calendar(&server);
    let updated = off_runtime(move || {
        client().update(
            3,
            &EntryUpdate {
                title: Some("Updated title".to_string()),
                location: Some("Room 15".to_string()),
                ..EntryUpdate::default()
            },
        )
    })
    .unwrap();

    assert_eq!(updated.title, "Updated title");
    assert_eq!(updated.location.as_deref(), Some("Room 15"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_update_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "server"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || {
        client().update(
            1,
            &EntryUpdate {
                title: Some("Oops".to_string()),
                ..EntryUpdate::default()
            },
        )
    })
    .unwrap_err();
    assert!(err.to_string().contains("API error 500"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_delete_confirmed() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendar"))
        .and(query_param("id", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "deleted",
            "entry": {"id": 8, "title": "Dentist"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = calendar(&server);
    let deleted = off_runtime(move || client().delete(8)).unwrap();
    assert_eq!(deleted.id, 8);
    assert_eq!(deleted.title, "Dentist");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_delete_without_entry_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let deleted = off_runtime(move || client().delete(4)).unwrap();
    assert_eq!(deleted.id, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_delete_unconfirmed_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendar"))
        .and(query_param("id", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "not-deleted"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || client().delete(8)).unwrap_err();
    assert!(matches!(err, Error::Calendar(_)));
    assert!(err.to_string().contains("Could not delete the event"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_delete_forbidden() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "forbidden"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || client().delete(1)).unwrap_err();
    assert!(err.to_string().contains("API error 403"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_list_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendar"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"entries": [{"id": 1}, {"id": 2}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = calendar(&server);
    let entries = off_runtime(move || client().list()).unwrap();
    let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calendar_list_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendar"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "unavailable"})))
        .mount(&server)
        .await;

    let client = calendar(&server);
    let err = off_runtime(move || client().list()).unwrap_err();
    assert!(err.to_string().contains("API error 503"), "{err}");
}
