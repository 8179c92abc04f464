//! # Collectors
//!
//! Turn claimed jobs into analytics rows. Each job carries a context
//! naming the course, term, and week to collect; the collectors fetch
//! the LMS payloads, resolve local row ids, and replace the job's
//! previously written rows.

pub mod assignment;
pub mod participation;
pub mod runner;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canvas::GatewayError;
use crate::repositories::JobError;

pub use runner::{CollectorKind, JobRunner, RunSummary};

/// The context stored on every collection job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub canvas_course_id: i64,
    pub sis_term_id: String,
    pub week: u32,
}

impl JobContext {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CollectorError> {
        serde_json::from_value(value.clone()).map_err(|err| CollectorError::BadContext {
            detail: err.to_string(),
        })
    }
}

/// Errors from a single collection run.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("malformed job context: {detail}")]
    BadContext { detail: String },
    #[error("term {sis_term_id} not found")]
    TermNotFound { sis_term_id: String },
    #[error("course {canvas_course_id} not found in term {sis_term_id}")]
    CourseNotFound {
        canvas_course_id: i64,
        sis_term_id: String,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Job(#[from] JobError),
}
