//! Database seeding functionality
//!
//! This module provides functionality to seed the database with initial
//! data. Job types are the only seeded entity; the collectors dispatch
//! on them and expect both rows to exist.

pub mod job_type;

pub use job_type::seed_job_types;
