//! Repository upsert tests: every batch write is keyed on its unique
//! constraint, so re-running a provisioning sync or a collection job
//! refreshes rows instead of duplicating them.

mod test_utils;

use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{EntityTrait, Set};

use rad_aggregator::models::{assignment, course, user};
use rad_aggregator::repositories::{
    AssignmentRepository, CourseRepository, CourseUpsert, UserRepository, UserUpsert,
    WeekRepository,
};

use test_utils::{seed_course, seed_term, seed_user, seed_week, setup_test_db};

fn course_upsert(canvas_course_id: i64, status: &str) -> CourseUpsert {
    CourseUpsert {
        canvas_course_id,
        sis_course_id: Some(format!("2021-spring-TEST-{}-A", canvas_course_id)),
        short_name: Some("TEST 101 A".to_string()),
        long_name: Some("Intro Testing".to_string()),
        canvas_account_id: Some(55),
        sis_account_id: Some("uwcourse:seattle:test".to_string()),
        status: Some(status.to_string()),
    }
}

fn user_upsert(canvas_user_id: i64, login_id: &str, email: &str) -> UserUpsert {
    UserUpsert {
        canvas_user_id,
        login_id: Some(login_id.to_string()),
        sis_user_id: Some(format!("sis-{}", canvas_user_id)),
        first_name: Some("Jamesy".to_string()),
        last_name: Some("McJamesy".to_string()),
        full_name: Some("Jamesy McJamesy".to_string()),
        sortable_name: Some("McJamesy, Jamesy".to_string()),
        email: Some(email.to_string()),
        status: Some("active".to_string()),
    }
}

#[tokio::test]
async fn course_upsert_refreshes_instead_of_duplicating() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, "2021-spring", NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let repo = CourseRepository::new(db.clone());

    repo.upsert_batch(term.id, vec![course_upsert(7001, "active")])
        .await
        .unwrap();
    // Second provisioning run: the course was deleted upstream.
    repo.upsert_batch(term.id, vec![course_upsert(7001, "deleted")])
        .await
        .unwrap();

    let rows = course::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status.as_deref(), Some("deleted"));

    let active = repo.active_courses_for_term(term.id).await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn user_upsert_is_keyed_on_canvas_user_id() {
    let db = setup_test_db().await.unwrap();
    let repo = UserRepository::new(db.clone());

    repo.upsert_batch(vec![user_upsert(9001, "javerage", "javerage@uw.edu")])
        .await
        .unwrap();
    repo.upsert_batch(vec![user_upsert(9001, "javerage", "james.average@uw.edu")])
        .await
        .unwrap();

    let rows = user::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].email.as_deref(), Some("james.average@uw.edu"));
}

#[tokio::test]
async fn assignment_insert_updates_on_unique_key_conflict() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, "2021-spring", NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let week = seed_week(&db, term.id, 1).await.unwrap();
    let course = seed_course(&db, term.id, 7001, "2021-spring-TEST-101-A")
        .await
        .unwrap();
    let student = seed_user(&db, 9001, "javerage", "Jamesy McJamesy")
        .await
        .unwrap();
    let repo = AssignmentRepository::new(db.clone());

    let row = |job_id: i32, score: f64| assignment::ActiveModel {
        job_id: Set(job_id),
        week_id: Set(week.id),
        course_id: Set(course.id),
        user_id: Set(student.id),
        assignment_id: Set(Some(501)),
        title: Set(Some("Problem Set 1".to_string())),
        points_possible: Set(Some(10.0)),
        due_at: Set(Some(
            Utc.with_ymd_and_hms(2021, 4, 1, 12, 0, 0)
                .unwrap()
                .fixed_offset(),
        )),
        status: Set(Some("on_time".to_string())),
        score: Set(Some(score)),
        ..Default::default()
    };

    // Second run of the same job rewrites the row with a newer score.
    repo.insert_batch(vec![row(1, 6.0)]).await.unwrap();
    repo.insert_batch(vec![row(1, 8.0)]).await.unwrap();

    let rows = assignment::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].score, Some(8.0));
    assert_eq!(repo.count_for_week(week.id).await.unwrap(), 1);
}

#[tokio::test]
async fn week_get_or_create_is_idempotent() {
    let db = setup_test_db().await.unwrap();
    let term = seed_term(&db, "2021-spring", NaiveDate::from_ymd_opt(2021, 3, 29).unwrap())
        .await
        .unwrap();
    let repo = WeekRepository::new(db.clone());

    let first = repo.get_or_create(term.id, 1).await.unwrap();
    let second = repo.get_or_create(term.id, 1).await.unwrap();
    assert_eq!(first.id, second.id);

    let other = repo.get_or_create(term.id, 2).await.unwrap();
    assert_ne!(first.id, other.id);
}
