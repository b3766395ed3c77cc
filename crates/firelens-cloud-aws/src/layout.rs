//! Object layout of the log bucket
//!
//! The delivery stream writes under `<base>/` and appends its own UTC
//! `yyyy/MM/dd/HH/` path; the catalog table projects a `date` partition over
//! `<base>/<date>`. Both sides are configured from one [`LogPathLayout`] so
//! they cannot drift apart.

use crate::error::{AwsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use firelens_cloud::token;
use serde_json::{Value, json};

pub const DEFAULT_BASE: &str = "ecs-logs";
pub const DEFAULT_DATE_PATTERN: &str = "yyyy/MM/dd";

/// Placeholder the catalog substitutes with the projected partition value
pub const DATE_PLACEHOLDER: &str = "${date}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPathLayout {
    base: String,
    date_pattern: String,
    chrono_format: String,
}

impl Default for LogPathLayout {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE.to_string(),
            date_pattern: DEFAULT_DATE_PATTERN.to_string(),
            chrono_format: "%Y/%m/%d".to_string(),
        }
    }
}

impl LogPathLayout {
    /// `base` is a key prefix without slashes at either end; `date_pattern`
    /// is one of [`DELIVERY_DATE_PATTERNS`]
    pub fn new(base: impl Into<String>, date_pattern: impl Into<String>) -> Result<Self> {
        let base = base.into();
        let date_pattern = date_pattern.into();

        if base.is_empty() || base.starts_with('/') || base.ends_with('/') {
            return Err(AwsError::InvalidSetting(format!(
                "log path base must be non-empty without leading or trailing '/': '{}'",
                base
            )));
        }
        let chrono_format = projection_to_chrono(&date_pattern)?;

        Ok(Self {
            base,
            date_pattern,
            chrono_format,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `S3DestinationConfiguration.Prefix` of the delivery stream
    pub fn delivery_prefix(&self) -> String {
        format!("{}/", self.base)
    }

    /// `projection.date.format`
    pub fn date_pattern(&self) -> &str {
        &self.date_pattern
    }

    /// strftime equivalent of the projection pattern
    pub fn chrono_format(&self) -> &str {
        &self.chrono_format
    }

    /// `s3://<bucket>/<base>` for the table's storage location
    pub fn location(&self, bucket_name: Value) -> Value {
        token::join(
            "",
            vec![json!("s3://"), bucket_name, json!(format!("/{}", self.base))],
        )
    }

    /// `s3://<bucket>/<base>/${date}` for `storage.location.template`
    pub fn location_template(&self, bucket_name: Value) -> Value {
        token::join(
            "",
            vec![
                json!("s3://"),
                bucket_name,
                json!(format!("/{}{}", self.delivery_prefix(), DATE_PLACEHOLDER)),
            ],
        )
    }

    fn format_date(&self, date: NaiveDate) -> String {
        date.format(&self.chrono_format).to_string()
    }

    /// Key prefix of one partition, e.g. `ecs-logs/2024/05/01`
    pub fn partition_path(&self, date: NaiveDate) -> String {
        format!("{}{}", self.delivery_prefix(), self.format_date(date))
    }

    /// Key prefix the delivery stream writes an object under at `at`
    pub fn delivered_object_prefix(&self, at: DateTime<Utc>) -> String {
        format!("{}{}", self.delivery_prefix(), at.format("%Y/%m/%d/%H/"))
    }

    /// Projection range starting at `start`, ending `offset_hours` after now
    pub fn projection_range(&self, start: NaiveDate, offset_hours: u32) -> String {
        format!(
            "{},NOW+{}HOUR",
            self.format_date(start),
            offset_hours
        )
    }

    /// Key prefix in front of `${date}` in a location template literal
    ///
    /// `"/ecs-logs/${date}"` yields `Some("ecs-logs/")`.
    pub fn template_key_prefix(literal: &str) -> Option<&str> {
        literal
            .strip_suffix(DATE_PLACEHOLDER)
            .map(|rest| rest.trim_start_matches('/'))
    }
}

/// Projection patterns the delivered key layout can satisfy, with their
/// chrono equivalents
///
/// The delivery stream always writes `<prefix>yyyy/MM/dd/HH/` in UTC, so a
/// `date` partition can only be a leading, day-granular part of that path.
pub const DELIVERY_DATE_PATTERNS: [(&str, &str); 3] = [
    ("yyyy", "%Y"),
    ("yyyy/MM", "%Y/%m"),
    ("yyyy/MM/dd", "%Y/%m/%d"),
];

fn projection_to_chrono(pattern: &str) -> Result<String> {
    DELIVERY_DATE_PATTERNS
        .iter()
        .find(|(projection, _)| *projection == pattern)
        .map(|(_, chrono)| chrono.to_string())
        .ok_or_else(|| {
            let supported: Vec<&str> = DELIVERY_DATE_PATTERNS.iter().map(|(p, _)| *p).collect();
            AwsError::InvalidSetting(format!(
                "date pattern '{}' does not match the delivered key layout (supported: {})",
                pattern,
                supported.join(", ")
            ))
        })
}
