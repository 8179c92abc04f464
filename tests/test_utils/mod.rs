//! Test utilities for database-backed integration tests.
//!
//! Provides an in-memory SQLite database with all migrations applied,
//! plus fixture helpers for the term/week/course/user tables.

#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};

use rad_aggregator::models::{course, term, user, week};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Inserts a term row. `sis_term_id` must look like `2021-spring`.
pub async fn seed_term(
    db: &DatabaseConnection,
    sis_term_id: &str,
    first_day_quarter: NaiveDate,
) -> Result<term::Model> {
    let (year, quarter) = sis_term_id.split_once('-').unwrap_or(("0", "unknown"));
    let row = term::ActiveModel {
        canvas_term_id: Set(Some(100)),
        sis_term_id: Set(Some(sis_term_id.to_string())),
        year: Set(year.parse().ok()),
        quarter: Set(Some(quarter.to_string())),
        label: Set(Some(format!("{} {}", quarter, year))),
        first_day_quarter: Set(Some(first_day_quarter)),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

pub async fn seed_week(db: &DatabaseConnection, term_id: i32, week: i32) -> Result<week::Model> {
    let row = week::ActiveModel {
        term_id: Set(term_id),
        week: Set(week),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

pub async fn seed_course(
    db: &DatabaseConnection,
    term_id: i32,
    canvas_course_id: i64,
    sis_course_id: &str,
) -> Result<course::Model> {
    let row = course::ActiveModel {
        canvas_course_id: Set(canvas_course_id),
        sis_course_id: Set(Some(sis_course_id.to_string())),
        short_name: Set(Some("TEST 101 A".to_string())),
        long_name: Set(Some("Intro Testing".to_string())),
        canvas_account_id: Set(Some(1)),
        sis_account_id: Set(Some("uwcourse:seattle:test".to_string())),
        status: Set(Some("active".to_string())),
        term_id: Set(term_id),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

pub async fn seed_user(
    db: &DatabaseConnection,
    canvas_user_id: i64,
    login_id: &str,
    full_name: &str,
) -> Result<user::Model> {
    let row = user::ActiveModel {
        canvas_user_id: Set(canvas_user_id),
        login_id: Set(Some(login_id.to_string())),
        full_name: Set(Some(full_name.to_string())),
        status: Set(Some("active".to_string())),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}
