//! CloudWatch Logs resources

use crate::error::{AwsError, Result};
use firelens_cloud::{RemovalPolicy, Resource};
use serde_json::json;

/// Retention periods CloudWatch Logs accepts
const ALLOWED_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDays(u32);

impl RetentionDays {
    pub const ONE_DAY: RetentionDays = RetentionDays(1);
    pub const ONE_WEEK: RetentionDays = RetentionDays(7);
    /// Applied to log groups that do not choose one
    pub const TWO_YEARS: RetentionDays = RetentionDays(731);

    pub fn new(days: u32) -> Result<Self> {
        if ALLOWED_RETENTION_DAYS.contains(&days) {
            Ok(Self(days))
        } else {
            Err(AwsError::InvalidSetting(format!(
                "log retention of {} days is not supported (allowed: {:?})",
                days, ALLOWED_RETENTION_DAYS
            )))
        }
    }

    pub fn days(&self) -> u32 {
        self.0
    }
}

/// Log group destroyed with the stack
pub fn log_group(logical_id: &str, name: &str, retention: RetentionDays) -> Resource {
    Resource::new(logical_id, "AWS::Logs::LogGroup")
        .property("LogGroupName", json!(name))
        .property("RetentionInDays", json!(retention.days()))
        .removal_policy(RemovalPolicy::Destroy)
}
