//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod assignment;
pub mod course;
pub mod job;
pub mod job_type;
pub mod participation;
pub mod report;
pub mod term;
pub mod user;
pub mod week;

pub use assignment::AssignmentRepository;
pub use course::{CourseRepository, CourseUpsert};
pub use job::{JobError, JobRepository, JobStatus, JobWithStatus};
pub use job_type::JobTypeRepository;
pub use participation::ParticipationRepository;
pub use report::{CourseTotals, ReportRepository};
pub use term::{TermRepository, relative_week};
pub use user::{UserRepository, UserUpsert};
pub use week::WeekRepository;
