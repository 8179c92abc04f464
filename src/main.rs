//! # RAD Aggregator Main Entry Point
//!
//! Operator CLI for the weekly analytics pipeline plus the embedded
//! admin API server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;

use rad_aggregator::calendar::{SwsTerm, TermCalendarClient, split_term_id};
use rad_aggregator::canvas::CanvasClient;
use rad_aggregator::collectors::{CollectorKind, JobRunner};
use rad_aggregator::config::{AppConfig, ConfigLoader};
use rad_aggregator::db::init_pool;
use rad_aggregator::dbviews::ViewBuilder;
use rad_aggregator::models::{term, week};
use rad_aggregator::provisioning;
use rad_aggregator::rad::RadExporter;
use rad_aggregator::report_builder::ReportBuilder;
use rad_aggregator::repositories::{
    CourseRepository, JobRepository, JobTypeRepository, TermRepository, UserRepository,
    WeekRepository, relative_week,
};
use rad_aggregator::seeds::seed_job_types;
use rad_aggregator::server::run_server;
use rad_aggregator::storage::ObjectStore;
use rad_aggregator::telemetry;

#[derive(Parser)]
#[command(name = "rad-aggregator", version, about = "Weekly LMS analytics aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Materialize the current term and the terms after it
    CreateTerms {
        /// Starting term, e.g. 2021-spring (default: current)
        #[arg(long)]
        sis_term_id: Option<String>,
    },
    /// Pull the course provisioning report for a term and upsert courses
    CreateOrUpdateCourses {
        #[arg(long)]
        sis_term_id: Option<String>,
    },
    /// Pull the user provisioning report and upsert users
    CreateOrUpdateUsers {
        #[arg(long)]
        sis_term_id: Option<String>,
    },
    /// Create one assignment job per active course, or one for a course
    CreateAssignmentJobs {
        #[arg(long)]
        canvas_course_id: Option<i64>,
        #[arg(long)]
        sis_course_id: Option<String>,
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// Create one participation job per active course, or one for a course
    CreateParticipationJobs {
        #[arg(long)]
        canvas_course_id: Option<i64>,
        #[arg(long)]
        sis_course_id: Option<String>,
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// Claim and run a batch of assignment jobs
    RunAssignmentJobs {
        #[arg(long)]
        job_batch_size: Option<u64>,
    },
    /// Claim and run a batch of participation jobs
    RunParticipationJobs {
        #[arg(long)]
        job_batch_size: Option<u64>,
    },
    /// Create jobs of the given kind and immediately claim and run them
    CreateAndRunJobs {
        /// Job kind: assignment or participation
        job_type: String,
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// (Re)build the weekly assignment view
    CreateAssignmentDbView {
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// (Re)build the weekly participation view
    CreateParticipationDbView {
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// (Re)build the weekly RAD view over the other two
    CreateRadDbView {
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// Export the weekly RAD CSV to the object store
    CreateRadDataFile {
        #[arg(long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
        /// Export even while collection jobs are unfinished
        #[arg(long)]
        force: bool,
    },
    /// Build the per-subaccount activity report for a term
    BuildSubaccountActivityReport {
        /// Root account to walk (default: configured account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[arg(short = 't', long)]
        sis_term_id: Option<String>,
        #[arg(long)]
        week: Option<i32>,
    },
    /// Apply pending database migrations and seed job types
    Migrate,
    /// Run the admin API server
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Arc::new(ConfigLoader::new().load()?);
    telemetry::init_tracing(&config)?;
    tracing::info!(profile = config.profile, "configuration loaded");

    let db = init_pool(&config).await?;

    match cli.command {
        Command::CreateTerms { sis_term_id } => {
            create_terms(&config, &db, sis_term_id.as_deref()).await?;
        }
        Command::CreateOrUpdateCourses { sis_term_id } => {
            create_or_update_courses(&config, &db, sis_term_id.as_deref()).await?;
        }
        Command::CreateOrUpdateUsers { sis_term_id } => {
            create_or_update_users(&config, &db, sis_term_id.as_deref()).await?;
        }
        Command::CreateAssignmentJobs {
            canvas_course_id,
            sis_course_id,
            sis_term_id,
            week,
        } => {
            create_analytic_jobs(
                &config,
                &db,
                CollectorKind::Assignment,
                canvas_course_id,
                sis_course_id.as_deref(),
                sis_term_id.as_deref(),
                week,
            )
            .await?;
        }
        Command::CreateParticipationJobs {
            canvas_course_id,
            sis_course_id,
            sis_term_id,
            week,
        } => {
            create_analytic_jobs(
                &config,
                &db,
                CollectorKind::Participation,
                canvas_course_id,
                sis_course_id.as_deref(),
                sis_term_id.as_deref(),
                week,
            )
            .await?;
        }
        Command::RunAssignmentJobs { job_batch_size } => {
            run_jobs(&config, &db, CollectorKind::Assignment, job_batch_size).await?;
        }
        Command::RunParticipationJobs { job_batch_size } => {
            run_jobs(&config, &db, CollectorKind::Participation, job_batch_size).await?;
        }
        Command::CreateAndRunJobs {
            job_type,
            sis_term_id,
            week,
        } => {
            let kind = parse_collector_kind(&job_type)?;
            create_analytic_jobs(
                &config,
                &db,
                kind,
                None,
                None,
                sis_term_id.as_deref(),
                week,
            )
            .await?;
            run_jobs(&config, &db, kind, None).await?;
        }
        Command::CreateAssignmentDbView { sis_term_id, week } => {
            let (term, week) =
                resolve_term_and_week(&config, &db, sis_term_id.as_deref(), week).await?;
            let name = ViewBuilder::new(db.clone())
                .create_assignment_view(&term, &week)
                .await?;
            tracing::info!(view = name, "created assignment view");
        }
        Command::CreateParticipationDbView { sis_term_id, week } => {
            let (term, week) =
                resolve_term_and_week(&config, &db, sis_term_id.as_deref(), week).await?;
            let name = ViewBuilder::new(db.clone())
                .create_participation_view(&term, &week)
                .await?;
            tracing::info!(view = name, "created participation view");
        }
        Command::CreateRadDbView { sis_term_id, week } => {
            let (term, week) =
                resolve_term_and_week(&config, &db, sis_term_id.as_deref(), week).await?;
            let name = ViewBuilder::new(db.clone())
                .create_rad_view(&term, &week)
                .await?;
            tracing::info!(view = name, "created RAD view");
        }
        Command::CreateRadDataFile {
            sis_term_id,
            week,
            force,
        } => {
            let (term, week) =
                resolve_term_and_week(&config, &db, sis_term_id.as_deref(), week).await?;
            let store = ObjectStore::from_config(&config.storage)?;
            let path = RadExporter::new(db.clone(), store)
                .create_rad_data_file(&term, &week, force)
                .await?;
            tracing::info!(path, "RAD data file written");
        }
        Command::BuildSubaccountActivityReport {
            account,
            sis_term_id,
            week,
        } => {
            let (term, week) =
                resolve_term_and_week(&config, &db, sis_term_id.as_deref(), week).await?;
            let sis_term_id = term
                .sis_term_id
                .clone()
                .ok_or_else(|| anyhow!("term has no sis term id"))?;
            let account = account.unwrap_or_else(|| config.canvas_account_id.clone());
            let report_id = ReportBuilder::new(db.clone(), canvas_client(&config)?)
                .build_subaccount_activity_report(&account, &sis_term_id, week.week as u32)
                .await?;
            tracing::info!(report_id, "subaccount activity report complete");
        }
        Command::Migrate => {
            use migration::MigratorTrait;
            migration::Migrator::up(&db, None).await?;
            seed_job_types(&db).await?;
            tracing::info!("migrations applied");
        }
        Command::Serve => {
            seed_job_types(&db).await?;
            run_server(Arc::clone(&config), db).await?;
        }
    }

    Ok(())
}

fn canvas_client(config: &AppConfig) -> anyhow::Result<CanvasClient> {
    let token = config
        .canvas_api_token
        .clone()
        .context("RAD_CANVAS_API_TOKEN is required for this command")?;
    Ok(CanvasClient::new(
        config.canvas_api_base.clone(),
        token,
        Duration::from_secs(config.collector.request_timeout_seconds),
    )?)
}

fn calendar_client(config: &AppConfig) -> anyhow::Result<TermCalendarClient> {
    Ok(TermCalendarClient::new(
        config.sws_api_base.clone(),
        config.sws_api_token.clone(),
        Duration::from_secs(config.collector.request_timeout_seconds),
    )?)
}

fn parse_collector_kind(value: &str) -> anyhow::Result<CollectorKind> {
    match value {
        "assignment" => Ok(CollectorKind::Assignment),
        "participation" => Ok(CollectorKind::Participation),
        other => bail!(
            "unknown job type '{}'; expected assignment or participation",
            other
        ),
    }
}

/// Fetches the SWS term for a sis term id, or the current term.
async fn fetch_sws_term(config: &AppConfig, sis_term_id: Option<&str>) -> anyhow::Result<SwsTerm> {
    let sws = calendar_client(config)?;
    match sis_term_id {
        Some(id) => {
            let (year, quarter) = split_term_id(id)?;
            Ok(sws.get_term_by_year_and_quarter(year, quarter).await?)
        }
        None => Ok(sws.get_current_term().await?),
    }
}

/// Resolves a term row (creating from SWS when absent) and the week
/// row for it, defaulting to the current week of term.
async fn resolve_term_and_week(
    config: &AppConfig,
    db: &DatabaseConnection,
    sis_term_id: Option<&str>,
    week_num: Option<i32>,
) -> anyhow::Result<(term::Model, week::Model)> {
    let terms = TermRepository::new(db.clone());

    let term = match sis_term_id {
        Some(id) => match terms.find_by_sis_term_id(id).await? {
            Some(existing) => existing,
            None => {
                let sws_term = fetch_sws_term(config, Some(id)).await?;
                terms.get_or_create_from_sws_term(&sws_term).await?.0
            }
        },
        None => match terms.find_current(Utc::now()).await? {
            Some(existing) => existing,
            None => {
                let sws_term = fetch_sws_term(config, None).await?;
                terms.get_or_create_from_sws_term(&sws_term).await?.0
            }
        },
    };

    let week_num = match week_num {
        Some(week) => week,
        None => relative_week(&term, Utc::now()) as i32,
    };
    if week_num < 1 {
        bail!(
            "term {} has not started yet (week {})",
            term.sis_term_id.as_deref().unwrap_or("?"),
            week_num
        );
    }
    let week = WeekRepository::new(db.clone())
        .get_or_create(term.id, week_num)
        .await?;
    Ok((term, week))
}

/// Creates the starting term and any terms defined after it.
async fn create_terms(
    config: &AppConfig,
    db: &DatabaseConnection,
    sis_term_id: Option<&str>,
) -> anyhow::Result<()> {
    let sws = calendar_client(config)?;
    let terms = TermRepository::new(db.clone());

    let mut sws_term = fetch_sws_term(config, sis_term_id).await?;
    loop {
        let (term, created) = terms.get_or_create_from_sws_term(&sws_term).await?;
        if created {
            tracing::info!(sis_term_id = term.sis_term_id, "created term");
        }
        // The calendar only defines a bounded number of future terms;
        // stop at the first gap.
        match sws.get_next_term().await {
            Ok(next) if next.sis_term_id() != sws_term.sis_term_id() => sws_term = next,
            _ => break,
        }
    }
    Ok(())
}

/// Resolves the cached canvas term id for a term, fetching and storing
/// it on first use.
async fn canvas_term_id(
    canvas: &CanvasClient,
    config: &AppConfig,
    db: &DatabaseConnection,
    term: &term::Model,
) -> anyhow::Result<i64> {
    if let Some(id) = term.canvas_term_id {
        return Ok(id);
    }
    let sis_term_id = term
        .sis_term_id
        .as_deref()
        .ok_or_else(|| anyhow!("term has no sis term id"))?;
    let canvas_term = canvas
        .get_enrollment_term(&config.canvas_account_id, sis_term_id)
        .await?;
    TermRepository::new(db.clone())
        .set_canvas_term_id(term.id, canvas_term.id)
        .await?;
    Ok(canvas_term.id)
}

async fn create_or_update_courses(
    config: &AppConfig,
    db: &DatabaseConnection,
    sis_term_id: Option<&str>,
) -> anyhow::Result<()> {
    let (term, _) = resolve_term_and_week(config, db, sis_term_id, Some(1)).await?;
    let canvas = canvas_client(config)?;
    let term_id = canvas_term_id(&canvas, config, db, &term).await?;

    let data = canvas
        .fetch_course_provisioning_report(&config.canvas_account_id, term_id)
        .await?;
    let courses = provisioning::parse_course_provisioning_csv(&data)?;
    let count = CourseRepository::new(db.clone())
        .upsert_batch(term.id, courses)
        .await?;
    tracing::info!(count, "courses upserted");
    Ok(())
}

async fn create_or_update_users(
    config: &AppConfig,
    db: &DatabaseConnection,
    sis_term_id: Option<&str>,
) -> anyhow::Result<()> {
    // The term argument picks the provisioning scope upstream; users
    // land in one shared table either way.
    let _ = resolve_term_and_week(config, db, sis_term_id, Some(1)).await?;
    let canvas = canvas_client(config)?;

    let data = canvas
        .fetch_user_provisioning_report(&config.canvas_account_id)
        .await?;
    let users = provisioning::parse_user_provisioning_csv(&data)?;
    let count = UserRepository::new(db.clone()).upsert_batch(users).await?;
    tracing::info!(count, "users upserted");
    Ok(())
}

/// Creates one job per active course in the term, or a single job for
/// an explicitly named course. The target window is today in UTC.
async fn create_analytic_jobs(
    config: &AppConfig,
    db: &DatabaseConnection,
    kind: CollectorKind,
    canvas_course_id: Option<i64>,
    sis_course_id: Option<&str>,
    sis_term_id: Option<&str>,
    week_num: Option<i32>,
) -> anyhow::Result<()> {
    let (term, week) = resolve_term_and_week(config, db, sis_term_id, week_num).await?;
    let sis_term_id = term
        .sis_term_id
        .clone()
        .ok_or_else(|| anyhow!("term has no sis term id"))?;

    let job_type = JobTypeRepository::new(db.clone())
        .get_or_create(kind.job_type())
        .await?;
    let jobs = JobRepository::new(db.clone());

    let today = Utc::now().date_naive();
    let target_date_start = today
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid day start"))?
        .and_utc();
    let target_date_end = today
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("invalid day end"))?
        .and_utc();

    let mut created = 0usize;
    if let Some(canvas_course_id) = canvas_course_id {
        let context = serde_json::json!({
            "canvas_course_id": canvas_course_id,
            "sis_course_id": sis_course_id,
            "sis_term_id": sis_term_id,
            "week": week.week,
        });
        let (_, was_created) = jobs
            .create_job(job_type.id, context, target_date_start, target_date_end)
            .await?;
        created += usize::from(was_created);
    } else {
        let courses = CourseRepository::new(db.clone())
            .active_courses_for_term(term.id)
            .await?;
        if courses.is_empty() {
            tracing::warn!(
                sis_term_id,
                job_type = kind.job_type(),
                "no active courses to create jobs for"
            );
        }
        for course in courses {
            let context = serde_json::json!({
                "canvas_course_id": course.canvas_course_id,
                "sis_course_id": course.sis_course_id,
                "sis_term_id": sis_term_id,
                "week": week.week,
            });
            let (_, was_created) = jobs
                .create_job(job_type.id, context, target_date_start, target_date_end)
                .await?;
            created += usize::from(was_created);
        }
    }
    tracing::info!(created, job_type = kind.job_type(), "jobs created");
    Ok(())
}

async fn run_jobs(
    config: &AppConfig,
    db: &DatabaseConnection,
    kind: CollectorKind,
    batch_size: Option<u64>,
) -> anyhow::Result<()> {
    let mut collector_config = config.collector.clone();
    if let Some(batch_size) = batch_size {
        collector_config.batch_size = batch_size;
    }
    let runner = JobRunner::new(db.clone(), canvas_client(config)?, &collector_config);
    let summary = runner.run(kind).await?;
    tracing::info!(
        claimed = summary.claimed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        job_type = kind.job_type(),
        "job batch finished"
    );
    Ok(())
}
