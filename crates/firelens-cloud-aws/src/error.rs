//! AWS component error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Composition check failed: {0}")]
    CheckFailed(String),

    #[error("Cloud error: {0}")]
    CloudError(#[from] firelens_cloud::CloudError),

    #[error("Settings error: {0}")]
    CoreError(#[from] firelens_core::CoreError),
}

pub type Result<T> = std::result::Result<T, AwsError>;
