//! Academic calendar primitives.
//!
//! Quarter parsing, week-of-term arithmetic, analytics view naming, and
//! the student web service (SWS) client that supplies term metadata for
//! `create-terms`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::canvas::{GatewayError, RetryPolicy, send_with_retry};

/// Labels of the week-scoped analytics views.
pub const VIEW_LABELS: &[&str] = &["assignments", "participations", "rad"];

/// Errors from calendar parsing and the term calendar service.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Quarter name {name} not found. Options are winter, spring, summer, and autumn.")]
    UnknownQuarter { name: String },
    #[error("Unknown DB view label {label}. Choose from (assignments, participations, or rad).")]
    UnknownViewLabel { label: String },
    #[error("malformed sis term id '{value}', expected YYYY-quarter")]
    MalformedTermId { value: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// An academic quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quarter {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Quarter {
    /// Ordinal used when sorting term ids chronologically (winter first).
    pub fn term_number(self) -> u8 {
        match self {
            Quarter::Winter => 1,
            Quarter::Spring => 2,
            Quarter::Summer => 3,
            Quarter::Autumn => 4,
        }
    }
}

impl FromStr for Quarter {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "winter" => Ok(Quarter::Winter),
            "spring" => Ok(Quarter::Spring),
            "summer" => Ok(Quarter::Summer),
            "autumn" => Ok(Quarter::Autumn),
            _ => Err(CalendarError::UnknownQuarter {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quarter::Winter => "winter",
            Quarter::Spring => "spring",
            Quarter::Summer => "summer",
            Quarter::Autumn => "autumn",
        };
        write!(f, "{}", name)
    }
}

/// Returns the 1-based week number of `cmp_date` relative to the first day
/// of the term. Dates before the first day clamp to week 0.
pub fn get_relative_week(first_day_quarter: NaiveDate, cmp_date: DateTime<Utc>) -> u32 {
    let term_start = Utc.from_utc_datetime(&first_day_quarter.and_time(chrono::NaiveTime::MIN));
    let days = (cmp_date - term_start).num_days();
    let mut week = days.div_euclid(7);
    if days >= 0 {
        week += 1;
    }
    week.max(0) as u32
}

/// Converts a sis term id into a string that sorts chronologically
/// (`2021-spring` becomes `2021-2`).
pub fn sortable_term_id(sis_term_id: &str) -> Result<String, CalendarError> {
    let (year, quarter) = split_term_id(sis_term_id)?;
    Ok(format!("{}-{}", year, quarter.term_number()))
}

/// Splits a `YYYY-quarter` sis term id into its parts.
pub fn split_term_id(sis_term_id: &str) -> Result<(i32, Quarter), CalendarError> {
    let mut parts = sis_term_id.splitn(2, '-');
    let year = parts
        .next()
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(|| CalendarError::MalformedTermId {
            value: sis_term_id.to_string(),
        })?;
    let quarter = parts
        .next()
        .ok_or_else(|| CalendarError::MalformedTermId {
            value: sis_term_id.to_string(),
        })?
        .parse::<Quarter>()?;
    Ok((year, quarter))
}

/// Returns the DB view name for the given sis_term_id, week, and view label.
pub fn view_name(sis_term_id: &str, week: u32, label: &str) -> Result<String, CalendarError> {
    if !VIEW_LABELS.contains(&label) {
        return Err(CalendarError::UnknownViewLabel {
            label: label.to_string(),
        });
    }
    let term = sis_term_id.replace('-', "_");
    Ok(format!("{}_week_{}_{}", term, week, label))
}

/// Term metadata as returned by the student web service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwsTerm {
    pub year: i32,
    pub quarter: String,
    #[serde(default)]
    pub first_day_quarter: Option<NaiveDate>,
    #[serde(default)]
    pub last_day_add: Option<NaiveDate>,
    #[serde(default)]
    pub last_day_drop: Option<NaiveDate>,
    #[serde(default)]
    pub census_day: Option<NaiveDate>,
    #[serde(default)]
    pub last_day_instruction: Option<NaiveDate>,
    #[serde(default)]
    pub grading_period_open: Option<NaiveDateTime>,
    #[serde(default, rename = "ATermGradingPeriodOpen")]
    pub aterm_grading_period_open: Option<NaiveDateTime>,
    #[serde(default)]
    pub grade_submission_deadline: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_final_exam_date: Option<NaiveDateTime>,
}

impl SwsTerm {
    /// `YYYY-quarter` identifier for this term.
    pub fn sis_term_id(&self) -> String {
        format!("{}-{}", self.year, self.quarter.to_lowercase())
    }

    /// Human-readable label, e.g. `Spring 2021`.
    pub fn label(&self) -> String {
        let mut quarter = self.quarter.to_lowercase();
        if let Some(first) = quarter.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        format!("{} {}", quarter, self.year)
    }
}

/// Client for the student web service term calendar.
#[derive(Debug, Clone)]
pub struct TermCalendarClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl TermCalendarClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetches the current term.
    pub async fn get_current_term(&self) -> Result<SwsTerm, CalendarError> {
        self.fetch_term("current").await
    }

    /// Fetches the term following the current one.
    pub async fn get_next_term(&self) -> Result<SwsTerm, CalendarError> {
        self.fetch_term("next").await
    }

    /// Fetches a specific term by year and quarter.
    pub async fn get_term_by_year_and_quarter(
        &self,
        year: i32,
        quarter: Quarter,
    ) -> Result<SwsTerm, CalendarError> {
        self.fetch_term(&format!("{},{}", year, quarter)).await
    }

    async fn fetch_term(&self, selector: &str) -> Result<SwsTerm, CalendarError> {
        let url = format!("{}/student/v5/term/{}.json", self.base_url, selector);
        let policy = RetryPolicy::analytics();
        let response = send_with_retry(&policy, "sws", &url, || {
            let mut request = self.http.get(&url);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            request
        })
        .await?;
        let bytes = response.bytes().await.map_err(GatewayError::Http)?;
        let term = serde_json::from_slice::<SwsTerm>(&bytes).map_err(GatewayError::Decode)?;
        Ok(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn quarter_parsing_is_case_insensitive() {
        assert_eq!("WINTER".parse::<Quarter>().unwrap(), Quarter::Winter);
        assert_eq!("Spring".parse::<Quarter>().unwrap(), Quarter::Spring);
        assert_eq!("summer".parse::<Quarter>().unwrap(), Quarter::Summer);
        assert_eq!("autumn".parse::<Quarter>().unwrap(), Quarter::Autumn);
        assert!("fall".parse::<Quarter>().is_err());
    }

    #[test]
    fn quarter_numbers() {
        assert_eq!(Quarter::Winter.term_number(), 1);
        assert_eq!(Quarter::Spring.term_number(), 2);
        assert_eq!(Quarter::Summer.term_number(), 3);
        assert_eq!(Quarter::Autumn.term_number(), 4);
    }

    #[test]
    fn relative_week_within_term() {
        let first_day = date(2021, 3, 29);
        assert_eq!(get_relative_week(first_day, utc(2021, 3, 29)), 1);
        assert_eq!(get_relative_week(first_day, utc(2021, 4, 4)), 1);
        assert_eq!(get_relative_week(first_day, utc(2021, 4, 5)), 2);
    }

    #[test]
    fn relative_week_before_term_clamps_to_zero() {
        let first_day = date(2021, 3, 29);
        assert_eq!(get_relative_week(first_day, utc(2021, 3, 28)), 0);
        assert_eq!(get_relative_week(first_day, utc(2021, 1, 1)), 0);
    }

    #[test]
    fn view_name_formats_term_and_week() {
        assert_eq!(
            view_name("2021-spring", 3, "rad").unwrap(),
            "2021_spring_week_3_rad"
        );
        assert_eq!(
            view_name("2021-autumn", 10, "assignments").unwrap(),
            "2021_autumn_week_10_assignments"
        );
        assert!(view_name("2021-spring", 3, "grades").is_err());
    }

    #[test]
    fn sortable_term_id_uses_quarter_number() {
        assert_eq!(sortable_term_id("2021-spring").unwrap(), "2021-2");
        assert_eq!(sortable_term_id("2020-autumn").unwrap(), "2020-4");
        assert!(sortable_term_id("spring").is_err());
    }

    #[test]
    fn sws_term_labels() {
        let term = SwsTerm {
            year: 2021,
            quarter: "spring".to_string(),
            first_day_quarter: Some(date(2021, 3, 29)),
            last_day_add: None,
            last_day_drop: None,
            census_day: None,
            last_day_instruction: Some(date(2021, 6, 4)),
            grading_period_open: None,
            aterm_grading_period_open: None,
            grade_submission_deadline: None,
            last_final_exam_date: None,
        };
        assert_eq!(term.sis_term_id(), "2021-spring");
        assert_eq!(term.label(), "Spring 2021");
    }
}
