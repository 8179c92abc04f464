//! # RAD Export
//!
//! Builds the weekly RAD data file: the RAD view joined with the
//! student categories CSV, the latest IDP sign-in counts, and the
//! predicted probabilities CSV, all numeric columns rescaled onto
//! [-5, 5]. The result is uploaded to the object store.

use std::collections::{HashMap, HashSet};

use sea_orm::{DatabaseConnection, EntityTrait};
use thiserror::Error;

use crate::calendar::CalendarError;
use crate::dbviews::{RadViewRow, ViewBuilder, ViewError};
use crate::models::{term, user, week};
use crate::repositories::{JobError, JobRepository};
use crate::storage::{self, ObjectStore, StorageError};

/// Prefix under which IDP sign-in count exports land in the store.
pub const IDP_PREFIX: &str = "idp";

/// Category columns never carried into the export.
const EXCLUDED_CATEGORY_COLUMNS: &[&str] = &[
    "yrq",
    "enroll_status",
    "dept_abbrev",
    "course_no",
    "section_id",
    "course_id",
];

#[derive(Debug, Error)]
pub enum RadError {
    #[error(
        "jobs for term {sis_term_id} week {week} are still running; \
         pass force to export anyway"
    )]
    JobsStillRunning { sis_term_id: String, week: u32 },
    #[error("column {name} missing from {file}")]
    MissingColumn { name: String, file: String },
    #[error("no IDP files found under {prefix}")]
    NoIdpFile { prefix: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Rescales values onto [lo, hi] in place, NaN-preserving.
///
/// All-NaN input stays NaN; a constant column maps to the midpoint;
/// otherwise values are shifted to zero, scaled, and shifted to `lo`.
pub fn rescale(values: &mut [f64], lo: f64, hi: f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return;
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        for v in values.iter_mut() {
            if !v.is_nan() {
                *v = (lo + hi) / 2.0;
            }
        }
        return;
    }
    for v in values.iter_mut() {
        if !v.is_nan() {
            *v = (*v - min) * (hi - lo) / (max - min) + lo;
        }
    }
}

/// Student category rows with their surviving columns.
struct CategoryTable {
    /// Kept headers, uw_netid first.
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    netid_idx: usize,
    system_key_idx: Option<usize>,
}

impl CategoryTable {
    fn parse(content: &[u8]) -> Result<Self, RadError> {
        let mut reader = csv::Reader::from_reader(content);
        let raw_headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let kept: Vec<usize> = raw_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                !h.starts_with("regis_") && !EXCLUDED_CATEGORY_COLUMNS.contains(&h.as_str())
            })
            .map(|(i, _)| i)
            .collect();
        let headers: Vec<String> = kept.iter().map(|&i| raw_headers[i].clone()).collect();
        let netid_idx = headers
            .iter()
            .position(|h| h == "uw_netid")
            .ok_or_else(|| RadError::MissingColumn {
                name: "uw_netid".to_string(),
                file: "student categories".to_string(),
            })?;
        let system_key_idx = headers.iter().position(|h| h == "system_key");

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = kept
                .iter()
                .map(|&i| record.get(i).unwrap_or_default().to_string())
                .collect();
            row[netid_idx] = row[netid_idx].trim().to_string();
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
        Ok(Self {
            headers,
            rows,
            netid_idx,
            system_key_idx,
        })
    }
}

/// Builds and uploads the weekly RAD data file.
pub struct RadExporter {
    db: DatabaseConnection,
    store: ObjectStore,
}

impl RadExporter {
    pub fn new(db: DatabaseConnection, store: ObjectStore) -> Self {
        Self { db, store }
    }

    /// Exports the RAD file for a (term, week). Refuses while
    /// collection jobs for that week are still in flight unless
    /// `force` is set. Returns the store path written.
    pub async fn create_rad_data_file(
        &self,
        term: &term::Model,
        week: &week::Model,
        force: bool,
    ) -> Result<String, RadError> {
        let sis_term_id = term.sis_term_id.clone().unwrap_or_default();
        let week_num = week.week as u32;

        let unfinished = JobRepository::new(self.db.clone())
            .has_unfinished_jobs(&sis_term_id, week_num, chrono::Utc::now())
            .await?;
        if unfinished && !force {
            return Err(RadError::JobsStillRunning {
                sis_term_id,
                week: week_num,
            });
        }

        let csv_bytes = self.build_rad_csv(term, week).await?;
        let path = storage::rad_data_path(&sis_term_id, week_num);
        self.store.upload(&path, &csv_bytes).await?;
        tracing::info!(path, "uploaded RAD data file");
        Ok(path)
    }

    async fn build_rad_csv(
        &self,
        term: &term::Model,
        week: &week::Model,
    ) -> Result<Vec<u8>, RadError> {
        let sis_term_id = term.sis_term_id.clone().unwrap_or_default();
        let view_name =
            crate::calendar::view_name(&sis_term_id, week.week as u32, "rad")?;
        let rad_rows = ViewBuilder::new(self.db.clone())
            .fetch_rad_rows(&view_name)
            .await?;
        let rad_by_canvas_id: HashMap<i64, &RadViewRow> =
            rad_rows.iter().map(|r| (r.canvas_user_id, r)).collect();

        // login_id joins the categories CSV to the view rows.
        let users = user::Entity::find().all(&self.db).await?;
        let canvas_id_by_netid: HashMap<String, i64> = users
            .into_iter()
            .filter_map(|u| u.login_id.map(|login| (login, u.canvas_user_id)))
            .collect();

        let categories_bytes = self
            .store
            .download(&storage::student_categories_path(&sis_term_id))
            .await?;
        let categories = CategoryTable::parse(&categories_bytes)?;

        let signins = self.load_idp_signins().await?;
        let preds = self.load_predicted_probabilities(&sis_term_id).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header: Vec<String> = vec![
            "uw_netid".to_string(),
            "activity".to_string(),
            "assignments".to_string(),
            "grades".to_string(),
            "pred".to_string(),
            "sign_in".to_string(),
        ];
        for (i, name) in categories.headers.iter().enumerate() {
            if i != categories.netid_idx && Some(i) != categories.system_key_idx {
                header.push(name.clone());
            }
        }
        writer.write_record(&header)?;

        for row in &categories.rows {
            let netid = &row[categories.netid_idx];
            let rad = canvas_id_by_netid
                .get(netid)
                .and_then(|canvas_id| rad_by_canvas_id.get(canvas_id));
            let pred = categories
                .system_key_idx
                .and_then(|i| preds.get(row[i].trim()))
                .copied();
            let sign_in = signins.get(netid).copied();

            let mut record: Vec<String> = vec![
                netid.clone(),
                fmt_score(rad.and_then(|r| r.participation_score)),
                fmt_score(rad.and_then(|r| r.assignment_score)),
                fmt_score(rad.and_then(|r| r.grade)),
                fmt_score(pred),
                fmt_score(sign_in),
            ];
            for (i, value) in row.iter().enumerate() {
                if i != categories.netid_idx && Some(i) != categories.system_key_idx {
                    record.push(value.clone());
                }
            }
            writer.write_record(&record)?;
        }

        Ok(writer
            .into_inner()
            .map_err(|err| RadError::Csv(csv::Error::from(err.into_error())))?)
    }

    /// Latest IDP export: headerless (uw_netid, sign_in) CSV, capped at
    /// 100 sign-ins, log-transformed, rescaled onto [-5, 5].
    async fn load_idp_signins(&self) -> Result<HashMap<String, f64>, RadError> {
        let files = self.store.list(IDP_PREFIX, ".csv").await?;
        let last = files.last().ok_or_else(|| RadError::NoIdpFile {
            prefix: IDP_PREFIX.to_string(),
        })?;
        tracing::info!(file = %last, "using IDP sign-in file");
        let content = self.store.download(last).await?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(content.as_slice());
        let mut netids = Vec::new();
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record?;
            let netid = record.get(0).unwrap_or_default().trim().to_string();
            let sign_in: f64 = record
                .get(1)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(f64::NAN);
            netids.push(netid);
            values.push((sign_in.min(100.0) + 1.0).ln());
        }
        rescale(&mut values, -5.0, 5.0);
        Ok(netids.into_iter().zip(values).collect())
    }

    /// Predicted probabilities keyed by system_key, rescaled onto
    /// [-5, 5].
    async fn load_predicted_probabilities(
        &self,
        sis_term_id: &str,
    ) -> Result<HashMap<String, f64>, RadError> {
        let content = self
            .store
            .download(&storage::predicted_probabilities_path(sis_term_id))
            .await?;
        let mut reader = csv::Reader::from_reader(content.as_slice());
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let key_idx = headers
            .iter()
            .position(|h| h == "system_key")
            .ok_or_else(|| RadError::MissingColumn {
                name: "system_key".to_string(),
                file: "predicted probabilities".to_string(),
            })?;
        let pred_idx = headers
            .iter()
            .position(|h| h == "pred0")
            .ok_or_else(|| RadError::MissingColumn {
                name: "pred0".to_string(),
                file: "predicted probabilities".to_string(),
            })?;

        let mut keys = Vec::new();
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record?;
            keys.push(record.get(key_idx).unwrap_or_default().trim().to_string());
            values.push(
                record
                    .get(pred_idx)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(f64::NAN),
            );
        }
        rescale(&mut values, -5.0, 5.0);
        Ok(keys.into_iter().zip(values).collect())
    }
}

/// NaN and absent scores serialize as empty cells.
fn fmt_score(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{}", v),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_maps_endpoints() {
        let mut values = vec![0.0, 10.0, 20.0];
        rescale(&mut values, -5.0, 5.0);
        assert_eq!(values, vec![-5.0, 0.0, 5.0]);
    }

    #[test]
    fn rescale_constant_input_hits_midpoint() {
        let mut values = vec![7.0, 7.0, 7.0];
        rescale(&mut values, -5.0, 5.0);
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn rescale_all_nan_stays_nan() {
        let mut values = vec![f64::NAN, f64::NAN];
        rescale(&mut values, -5.0, 5.0);
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rescale_preserves_nan_positions() {
        let mut values = vec![0.0, f64::NAN, 20.0];
        rescale(&mut values, -5.0, 5.0);
        assert_eq!(values[0], -5.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 5.0);
    }

    #[test]
    fn rescale_is_idempotent_on_rescaled_support() {
        let mut values = vec![0.0, 10.0, 20.0];
        rescale(&mut values, -5.0, 5.0);
        let mut again = values.clone();
        rescale(&mut again, -5.0, 5.0);
        assert_eq!(values, again);
    }

    #[test]
    fn category_table_drops_excluded_columns_and_dedupes() {
        let csv = "uw_netid,system_key,stem,regis_code,yrq\n\
                   javerage ,123,1,x,20212\n\
                   javerage ,123,1,x,20212\n\
                   sally,456,0,y,20212\n";
        let table = CategoryTable::parse(csv.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["uw_netid", "system_key", "stem"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][table.netid_idx], "javerage");
    }

    #[test]
    fn score_formatting() {
        assert_eq!(fmt_score(Some(1.5)), "1.5");
        assert_eq!(fmt_score(Some(f64::NAN)), "");
        assert_eq!(fmt_score(None), "");
    }
}
