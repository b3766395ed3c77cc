//! 設定ローダー
//!
//! ベースファイルとローカルオーバーライドを順に適用する

use crate::error::{CoreError, Result};
use crate::model::StackSettings;
use crate::parser::apply_kdl_string;
use std::path::Path;
use tracing::{debug, info, instrument};

/// 設定ファイルを1つだけ読み込む
#[instrument(fields(path = %path.display()))]
pub fn load_settings(path: &Path) -> Result<StackSettings> {
    load_settings_with_override(path, None)
}

/// ベース設定 → ローカルオーバーライドの順に適用して読み込む
#[instrument(skip(local), fields(path = %path.display()))]
pub fn load_settings_with_override(path: &Path, local: Option<&Path>) -> Result<StackSettings> {
    let mut settings = StackSettings::default();

    for file in std::iter::once(path).chain(local) {
        debug!(file = %file.display(), "Applying settings file");
        let content = std::fs::read_to_string(file).map_err(|e| CoreError::IoError {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;
        apply_kdl_string(&mut settings, &content)?;
    }

    info!(
        prefix = settings.prefix.as_deref().unwrap_or("(unset)"),
        has_override = local.is_some(),
        "Settings loaded"
    );
    Ok(settings)
}
