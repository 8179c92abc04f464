//! Wiremock tests for the Canvas and term calendar HTTP clients.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rad_aggregator::calendar::TermCalendarClient;
use rad_aggregator::canvas::CanvasClient;

fn client(server: &MockServer) -> CanvasClient {
    CanvasClient::new(server.uri(), "test-token", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn get_course_decodes_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "name": "Intro Biology",
            "course_code": "BIO 101 A",
            "sis_course_id": "2021-spring-BIO-101-A",
            "account_id": 55,
            "enrollment_term_id": 9,
            "workflow_state": "available"
        })))
        .mount(&server)
        .await;

    let course = client(&server).get_course(42).await.unwrap();
    assert_eq!(course.id, 42);
    assert_eq!(course.sis_course_id.as_deref(), Some("2021-spring-BIO-101-A"));
    assert_eq!(course.enrollment_term_id, Some(9));
}

#[tokio::test]
async fn enrollment_listing_follows_pagination() {
    let server = MockServer::start().await;
    let next = format!("{}/api/v1/courses/7/enrollments?page=2", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/enrollments"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", format!("<{}>; rel=\"next\"", next).as_str())
                .set_body_json(json!([
                    {"user_id": 9001},
                    {"user_id": 9002}
                ])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/enrollments"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            // Duplicate enrollment for 9002 in a second section.
            {"user_id": 9002},
            {"user_id": 9003}
        ])))
        .mount(&server)
        .await;

    let ids = client(&server).list_student_ids(7).await.unwrap();
    assert_eq!(ids, vec![9001, 9002, 9003]);
}

#[tokio::test]
async fn assignment_collection_skips_unknown_students() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/enrollments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user_id": 9001},
            {"user_id": 9002}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/analytics/users/9001/assignments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "assignment_id": 501,
            "title": "Problem Set 1",
            "points_possible": 10.0,
            "status": "on_time",
            "submission": {"score": 8.0}
        }])))
        .mount(&server)
        .await;
    // Student withdrew; the analytics API no longer knows them.
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/analytics/users/9002/assignments"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let rows = client(&server).collect_assignment_analytics(7).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].assignment_id, 501);
    assert_eq!(rows[0].canvas_user_id, 9001);
    assert_eq!(rows[0].canvas_course_id, 7);
    assert_eq!(rows[0].submission.as_ref().unwrap().score, Some(8.0));
}

#[tokio::test]
async fn participation_collection_stamps_course_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/analytics/student_summaries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 9001,
            "page_views": 120,
            "participations": 4,
            "tardiness_breakdown": {"on_time": 3.0, "late": 1.0, "missing": 0.0}
        }])))
        .mount(&server)
        .await;

    let rows = client(&server)
        .collect_participation_analytics(7)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].canvas_user_id, 9001);
    assert_eq!(rows[0].canvas_course_id, 7);
    let tardiness = rows[0].tardiness_breakdown.as_ref().unwrap();
    assert_eq!(tardiness.on_time, Some(3.0));
}

#[tokio::test]
async fn analytics_pages_are_served_from_cache_on_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/7/analytics/student_summaries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 9001,
            "participations": 4
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let canvas = client(&server);
    let first = canvas.collect_participation_analytics(7).await.unwrap();
    // Second run hits the in-process cache, not the mock.
    let second = canvas.collect_participation_analytics(7).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].canvas_user_id, 9001);
}

#[tokio::test]
async fn current_term_resolves_from_calendar() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/student/v5/term/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Year": 2021,
            "Quarter": "spring",
            "FirstDayQuarter": "2021-03-29",
            "LastDayInstruction": "2021-06-04"
        })))
        .mount(&server)
        .await;

    let calendar = TermCalendarClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
    let term = calendar.get_current_term().await.unwrap();
    assert_eq!(term.sis_term_id(), "2021-spring");
    assert_eq!(
        term.first_day_quarter,
        chrono::NaiveDate::from_ymd_opt(2021, 3, 29)
    );
}

#[tokio::test]
async fn term_lookup_by_year_and_quarter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/student/v5/term/2021,autumn.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Year": 2021,
            "Quarter": "autumn"
        })))
        .mount(&server)
        .await;

    let calendar = TermCalendarClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
    let term = calendar
        .get_term_by_year_and_quarter(2021, rad_aggregator::calendar::Quarter::Autumn)
        .await
        .unwrap();
    assert_eq!(term.sis_term_id(), "2021-autumn");
}
