//! # Provisioning Report Parsing
//!
//! Parses the LMS course and user provisioning report CSVs into upsert
//! batches for the domain store. Rows the SIS did not create are
//! skipped; user rows additionally must be active.

use serde::Deserialize;
use thiserror::Error;

use crate::repositories::{CourseUpsert, UserUpsert};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct CourseRow {
    #[serde(default)]
    canvas_course_id: Option<i64>,
    #[serde(rename = "course_id", default)]
    sis_course_id: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    canvas_account_id: Option<i64>,
    #[serde(rename = "account_id", default)]
    sis_account_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_by_sis: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(default)]
    canvas_user_id: Option<i64>,
    #[serde(rename = "user_id", default)]
    sis_user_id: Option<String>,
    #[serde(default)]
    login_id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    sortable_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_by_sis: Option<String>,
}

/// Parses the course provisioning report. Keeps SIS-created rows only.
pub fn parse_course_provisioning_csv(data: &str) -> Result<Vec<CourseUpsert>, ProvisioningError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut courses = Vec::new();
    for row in reader.deserialize::<CourseRow>() {
        let row = row?;
        if row.created_by_sis.as_deref().unwrap_or_default().is_empty() {
            continue;
        }
        let Some(canvas_course_id) = row.canvas_course_id else {
            continue;
        };
        courses.push(CourseUpsert {
            canvas_course_id,
            sis_course_id: row.sis_course_id,
            short_name: row.short_name,
            long_name: row.long_name,
            canvas_account_id: row.canvas_account_id,
            sis_account_id: row.sis_account_id,
            status: row.status,
        });
    }
    Ok(courses)
}

/// Parses the user provisioning report. Keeps active SIS-created rows.
pub fn parse_user_provisioning_csv(data: &str) -> Result<Vec<UserUpsert>, ProvisioningError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut users = Vec::new();
    for row in reader.deserialize::<UserRow>() {
        let row = row?;
        if row.created_by_sis.as_deref() != Some("true")
            || row.status.as_deref() != Some("active")
        {
            continue;
        }
        let Some(canvas_user_id) = row.canvas_user_id else {
            continue;
        };
        users.push(UserUpsert {
            canvas_user_id,
            login_id: row.login_id,
            sis_user_id: row.sis_user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            full_name: row.full_name,
            sortable_name: row.sortable_name,
            email: row.email,
            status: row.status,
        });
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COURSE_CSV: &str = "\
canvas_course_id,course_id,short_name,long_name,canvas_account_id,account_id,status,created_by_sis
1001,2021-spring-BIO-101-A,BIO 101 A,Intro Biology,55,uwcourse:seattle:bio,active,true
1002,,Sandbox,Sandbox Course,55,uwcourse:seattle:bio,active,
1003,2021-spring-CHE-101-A,CHE 101 A,Intro Chemistry,56,uwcourse:seattle:che,deleted,true
";

    const USER_CSV: &str = "\
canvas_user_id,user_id,login_id,first_name,last_name,full_name,sortable_name,email,status,created_by_sis
9001,AAAA1111BBBB2222CCCC3333DDDD4444,javerage,Jamesy,McJamesy,Jamesy McJamesy,\"McJamesy, Jamesy\",javerage@uw.edu,active,true
9002,EEEE1111BBBB2222CCCC3333DDDD4444,inactive1,In,Active,In Active,\"Active, In\",inactive@uw.edu,deleted,true
9003,FFFF1111BBBB2222CCCC3333DDDD4444,manual1,Manual,User,Manual User,\"User, Manual\",manual@uw.edu,active,false
";

    #[test]
    fn courses_skip_non_sis_rows() {
        let courses = parse_course_provisioning_csv(COURSE_CSV).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].canvas_course_id, 1001);
        assert_eq!(
            courses[0].sis_course_id.as_deref(),
            Some("2021-spring-BIO-101-A")
        );
        // Status is preserved; filtering on it happens at query time.
        assert_eq!(courses[1].status.as_deref(), Some("deleted"));
    }

    #[test]
    fn users_require_active_sis_rows() {
        let users = parse_user_provisioning_csv(USER_CSV).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].canvas_user_id, 9001);
        assert_eq!(users[0].login_id.as_deref(), Some("javerage"));
    }
}
