//! Tracing setup and request-scoped trace ids.
//!
//! `init_tracing` installs the global subscriber once per process,
//! bridging `log::` macros (sqlx, sea-orm internals) into tracing. The
//! admin API tags every request with a trace id, carried both as a
//! request extension and in task-local storage so error payloads can
//! echo it without threading it through every signature.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{extract::Request, middleware::Next, response::Response};
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Correlation metadata for one admin API request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

impl TraceContext {
    fn generate() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("log bridge already claimed by another logger: {0}")]
    LogBridge(#[from] log::SetLoggerError),
    #[error("a tracing subscriber is already installed: {0}")]
    Subscriber(#[from] TryInitError),
}

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);

fn event_format(config: &AppConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    if config.log_format == "pretty" {
        fmt::layer().pretty().boxed()
    } else {
        fmt::layer().json().boxed()
    }
}

/// Installs the global subscriber once. `RUST_LOG` wins over the
/// configured level; the log bridge is installed first so sqlx query
/// logging lands in the same pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if SUBSCRIBER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = Registry::default()
        .with(event_format(config))
        .with(filter)
        .try_init();
    if installed.is_err() {
        SUBSCRIBER_INSTALLED.store(false, Ordering::SeqCst);
    }
    installed.map_err(Into::into)
}

/// Middleware that stamps each request with a fresh trace id and runs
/// the rest of the stack inside its task-local scope.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::generate();
    request.extensions_mut().insert(context.clone());
    ACTIVE_TRACE_CONTEXT.scope(context, next.run(request)).await
}

/// Trace id of the running request task, if inside one.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT.try_with(|ctx| ctx.trace_id.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_id_is_scoped_to_the_task() {
        assert!(current_trace_id().is_none());

        let context = TraceContext::generate();
        let expected = context.trace_id.clone();
        let observed = ACTIVE_TRACE_CONTEXT
            .scope(context, async { current_trace_id() })
            .await;
        assert_eq!(observed, Some(expected));

        assert!(current_trace_id().is_none());
    }
}
