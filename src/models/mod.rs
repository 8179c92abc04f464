//! SeaORM entity models for the RAD aggregator schema.

pub mod assignment;
pub mod course;
pub mod job;
pub mod job_type;
pub mod participation;
pub mod report;
pub mod subaccount_activity;
pub mod term;
pub mod user;
pub mod week;
