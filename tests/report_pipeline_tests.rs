//! End-to-end tests for the weekly view chain and the RAD data file
//! export, running against in-memory SQLite and a filesystem store.

mod test_utils;

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::json;

use rad_aggregator::config::StorageConfig;
use rad_aggregator::dbviews::ViewBuilder;
use rad_aggregator::models::{assignment, job_type, participation};
use rad_aggregator::rad::{IDP_PREFIX, RadError, RadExporter};
use rad_aggregator::repositories::{JobRepository, JobTypeRepository};
use rad_aggregator::storage::{self, ObjectStore};

use test_utils::{seed_course, seed_term, seed_user, seed_week, setup_test_db};

const TERM: &str = "2021-spring";

fn fs_store(root: &std::path::Path) -> ObjectStore {
    let config = StorageConfig {
        backend: "fs".to_string(),
        fs_root: root.to_string_lossy().into_owned(),
        gcs_bucket: None,
        gcs_token: None,
    };
    ObjectStore::from_config(&config).unwrap()
}

/// Seeds a completed collection job so the export guard passes.
async fn seed_completed_job(db: &DatabaseConnection, canvas_course_id: i64, week: u32) -> i32 {
    let jt = JobTypeRepository::new(db.clone())
        .get_or_create(job_type::ASSIGNMENT)
        .await
        .unwrap();
    let repo = JobRepository::new(db.clone());
    let now = Utc::now();
    let (job, _) = repo
        .create_job(
            jt.id,
            json!({
                "canvas_course_id": canvas_course_id,
                "sis_course_id": format!("{}-TEST-101-A", TERM),
                "sis_term_id": TERM,
                "week": week,
            }),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .await
        .unwrap();
    repo.claim_batch(jt.id, 10, now).await.unwrap();
    repo.start_job(job.id).await.unwrap();
    repo.end_job(job.id).await.unwrap();
    job.id
}

#[allow(clippy::too_many_arguments)]
async fn seed_analytics_rows(
    db: &DatabaseConnection,
    job_id: i32,
    week_id: i32,
    course_id: i32,
    user_id: i32,
    score: f64,
    participations: i32,
    time_on_time: i32,
) {
    let due = Utc
        .with_ymd_and_hms(2021, 4, 1, 12, 0, 0)
        .unwrap()
        .fixed_offset();
    assignment::ActiveModel {
        job_id: Set(job_id),
        week_id: Set(week_id),
        course_id: Set(course_id),
        user_id: Set(user_id),
        assignment_id: Set(Some(500 + user_id as i64)),
        title: Set(Some("Problem Set 1".to_string())),
        points_possible: Set(Some(10.0)),
        due_at: Set(Some(due)),
        status: Set(Some("on_time".to_string())),
        score: Set(Some(score)),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    participation::ActiveModel {
        job_id: Set(job_id),
        week_id: Set(week_id),
        course_id: Set(course_id),
        user_id: Set(user_id),
        participations: Set(Some(participations)),
        max_participations: Set(Some(20)),
        page_views: Set(Some(100)),
        time_on_time: Set(Some(time_on_time)),
        time_late: Set(Some(1)),
        time_missing: Set(Some(0)),
        time_floating: Set(Some(0)),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();
}

#[tokio::test]
async fn view_chain_produces_normalized_scores() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, TERM, NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let week = seed_week(&db, term.id, 1).await.unwrap();
    let course = seed_course(&db, term.id, 7001, "2021-spring-TEST-101-A")
        .await
        .unwrap();
    let low = seed_user(&db, 9001, "javerage", "Jamesy McJamesy")
        .await
        .unwrap();
    let high = seed_user(&db, 9002, "sally", "Sally Student").await.unwrap();
    let job_id = seed_completed_job(&db, 7001, 1).await;

    // low: few participations but a strong grade; high: the reverse.
    seed_analytics_rows(&db, job_id, week.id, course.id, low.id, 8.0, 2, 3).await;
    seed_analytics_rows(&db, job_id, week.id, course.id, high.id, 4.0, 10, 5).await;

    let builder = ViewBuilder::new(db.clone());
    builder.create_assignment_view(&term, &week).await.unwrap();
    builder.create_participation_view(&term, &week).await.unwrap();
    let rad_view = builder.create_rad_view(&term, &week).await.unwrap();

    let rows = builder.fetch_rad_rows(&rad_view).await.unwrap();
    assert_eq!(rows.len(), 2);
    let by_user: HashMap<i64, _> = rows.into_iter().map(|r| (r.canvas_user_id, r)).collect();

    let low_row = &by_user[&9001];
    let high_row = &by_user[&9002];
    // Two students per course pin the normalization endpoints at +/-5.
    assert!((low_row.participation_score.unwrap() + 5.0).abs() < 1e-6);
    assert!((high_row.participation_score.unwrap() - 5.0).abs() < 1e-6);
    assert!((low_row.assignment_score.unwrap() + 5.0).abs() < 1e-6);
    assert!((high_row.assignment_score.unwrap() - 5.0).abs() < 1e-6);
    assert!((low_row.grade.unwrap() - 5.0).abs() < 1e-6);
    assert!((high_row.grade.unwrap() + 5.0).abs() < 1e-6);
}

#[tokio::test]
async fn rad_export_joins_store_files() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, TERM, NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let week = seed_week(&db, term.id, 1).await.unwrap();
    let course = seed_course(&db, term.id, 7001, "2021-spring-TEST-101-A")
        .await
        .unwrap();
    let low = seed_user(&db, 9001, "javerage", "Jamesy McJamesy")
        .await
        .unwrap();
    let high = seed_user(&db, 9002, "sally", "Sally Student").await.unwrap();
    let job_id = seed_completed_job(&db, 7001, 1).await;
    seed_analytics_rows(&db, job_id, week.id, course.id, low.id, 8.0, 2, 3).await;
    seed_analytics_rows(&db, job_id, week.id, course.id, high.id, 4.0, 10, 5).await;

    let builder = ViewBuilder::new(db.clone());
    builder.create_assignment_view(&term, &week).await.unwrap();
    builder.create_participation_view(&term, &week).await.unwrap();
    builder.create_rad_view(&term, &week).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path());
    store
        .upload(
            &storage::student_categories_path(TERM),
            b"uw_netid,system_key,stem\njaverage,111,1\nsally,222,0\n",
        )
        .await
        .unwrap();
    store
        .upload(
            &storage::predicted_probabilities_path(TERM),
            b"system_key,pred0\n111,0.9\n222,0.1\n",
        )
        .await
        .unwrap();
    store
        .upload(
            &format!("{}/2021-04-05-signins.csv", IDP_PREFIX),
            b"javerage,10\nsally,3\n",
        )
        .await
        .unwrap();

    let exporter = RadExporter::new(db.clone(), store.clone());
    let path = exporter
        .create_rad_data_file(&term, &week, false)
        .await
        .unwrap();
    assert_eq!(path, storage::rad_data_path(TERM, 1));

    let bytes = store.download(&path).await.unwrap();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec!["uw_netid", "activity", "assignments", "grades", "pred", "sign_in", "stem"]
    );

    let parse = |v: &str| v.parse::<f64>().unwrap();
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    assert_eq!(rows.len(), 2);

    let javerage = rows.iter().find(|r| r[0] == "javerage").unwrap();
    assert!((parse(&javerage[1]) + 5.0).abs() < 1e-6); // activity
    assert!((parse(&javerage[2]) + 5.0).abs() < 1e-6); // assignments
    assert!((parse(&javerage[3]) - 5.0).abs() < 1e-6); // grades
    assert!((parse(&javerage[4]) - 5.0).abs() < 1e-6); // pred
    assert!((parse(&javerage[5]) - 5.0).abs() < 1e-6); // sign_in
    assert_eq!(javerage[6], "1"); // stem category carried through

    let sally = rows.iter().find(|r| r[0] == "sally").unwrap();
    assert!((parse(&sally[3]) + 5.0).abs() < 1e-6);
    assert!((parse(&sally[4]) + 5.0).abs() < 1e-6);
}

#[tokio::test]
async fn rad_export_refuses_while_jobs_run() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, TERM, NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let week = seed_week(&db, term.id, 1).await.unwrap();

    // A pending job for the same term and week blocks the export.
    let jt = JobTypeRepository::new(db.clone())
        .get_or_create(job_type::ASSIGNMENT)
        .await
        .unwrap();
    let now = Utc::now();
    JobRepository::new(db.clone())
        .create_job(
            jt.id,
            json!({
                "canvas_course_id": 7001,
                "sis_term_id": TERM,
                "week": 1,
            }),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let exporter = RadExporter::new(db.clone(), fs_store(dir.path()));
    let err = exporter
        .create_rad_data_file(&term, &week, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RadError::JobsStillRunning { .. }));
}
