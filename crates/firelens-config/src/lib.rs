pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// 設定ファイルの候補（優先順）
const CANDIDATES: [&str; 2] = ["firelens.kdl", ".firelens.kdl"];

/// ローカルオーバーライドファイルの候補（優先順）
const LOCAL_CANDIDATES: [&str; 2] = ["firelens.local.kdl", ".firelens.local.kdl"];

/// プロジェクト内の設定ディレクトリ名
pub const PROJECT_DIR: &str = ".firelens";

/// グローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("firelens"))
}

/// プロジェクトの firelens.kdl ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 FIRELENS_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: firelens.kdl, .firelens.kdl
/// 3. ./.firelens/ ディレクトリ内: 同様の順序
/// 4. ~/.config/firelens/firelens.kdl (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定（指定されたのに存在しない場合はエラー）
    if let Ok(config_path) = std::env::var("FIRELENS_CONFIG_PATH") {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using FIRELENS_CONFIG_PATH");
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathMissing(config_path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    if let Some(path) = first_existing(&current_dir, &CANDIDATES) {
        return Ok(path);
    }

    // 3. ./.firelens/ ディレクトリで検索
    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_existing(&project_dir, &CANDIDATES)
    {
        return Ok(path);
    }

    // 4. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("firelens.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// 設定ファイルと同じディレクトリにあるローカルオーバーライドを探す
///
/// firelens.local.kdl は git 管理外でアカウントIDやprefixを上書きする用途
pub fn local_override_for(stack_file: &Path) -> Option<PathBuf> {
    let dir = stack_file.parent()?;
    let found = first_existing(dir, &LOCAL_CANDIDATES)?;
    // 自分自身を指定された場合はオーバーライドとして扱わない
    if found == stack_file {
        return None;
    }
    Some(found)
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}
