//! # RAD Aggregator Library
//!
//! This library provides the core functionality for the RAD analytics
//! aggregator service, including the Canvas gateway, collectors, job
//! engine, admin handlers, and server configuration.

pub mod auth;
pub mod calendar;
pub mod canvas;
pub mod collectors;
pub mod config;
pub mod db;
pub mod dbviews;
pub mod error;
pub mod handlers;
pub mod models;
pub mod provisioning;
pub mod rad;
pub mod report_builder;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod storage;
pub mod telemetry;
pub use migration;
