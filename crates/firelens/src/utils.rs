use crate::TargetArgs;
use anyhow::Context;
use colored::Colorize;
use firelens_cloud_aws::FirelensStack;
use firelens_config::ConfigError;
use firelens_core::{Deployment, StackSettings};
use std::path::{Path, PathBuf};

/// 読み込んだ設定と、その元になったファイル
pub struct LoadedDeployment {
    pub deployment: Deployment,
    pub files: Vec<PathBuf>,
}

/// 設定ファイルを探して読み込み、prefix を解決する
///
/// 設定ファイルが無くても prefix が指定されていればデフォルト設定で続行する。
pub fn load_deployment(target: &TargetArgs) -> anyhow::Result<LoadedDeployment> {
    let stack_file = match &target.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("設定ファイルが存在しません: {}", path.display());
            }
            Some(path.clone())
        }
        None => match firelens_config::find_stack_file() {
            Ok(path) => Some(path),
            Err(ConfigError::StackFileNotFound) => {
                tracing::debug!("No settings file found, using defaults");
                None
            }
            Err(e) => return Err(e.into()),
        },
    };

    let mut files = Vec::new();
    let settings = match &stack_file {
        Some(path) => {
            let local = firelens_config::local_override_for(path);
            let settings = firelens_core::load_settings_with_override(path, local.as_deref())
                .with_context(|| format!("設定ファイルの読み込みに失敗: {}", path.display()))?;
            files.push(path.clone());
            files.extend(local);
            settings
        }
        None => StackSettings::default(),
    };

    let deployment = settings.resolve(target.prefix.as_deref())?;
    Ok(LoadedDeployment { deployment, files })
}

/// 設定を読み込んでスタックを合成する
pub fn build_stack(target: &TargetArgs) -> anyhow::Result<(LoadedDeployment, FirelensStack)> {
    let loaded = load_deployment(target)?;
    let built = FirelensStack::build(&loaded.deployment)?;
    Ok((loaded, built))
}

/// 読み込んだ設定ファイル情報を表示
pub fn print_loaded_config_files(files: &[PathBuf]) {
    if files.is_empty() {
        eprintln!("📄 設定ファイルなし（デフォルト設定）");
        return;
    }
    eprintln!("📄 読み込んだ設定ファイル:");
    for (i, file) in files.iter().enumerate() {
        let note = if i == 0 { "" } else { " (ローカルオーバーライド)" };
        eprintln!("  • {}{}", file.display().to_string().cyan(), note);
    }
}

/// 状態ファイルを置くディレクトリ（カレントディレクトリ）
pub fn project_root() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("カレントディレクトリを取得できません")
}

/// `<dir>/<stack>.template.<ext>`
pub fn template_path(dir: &Path, stack_name: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.template.{}", stack_name, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_path() {
        let path = template_path(Path::new("firelens.out"), "acme-FirelensStack", "yaml");
        assert_eq!(
            path,
            PathBuf::from("firelens.out/acme-FirelensStack.template.yaml")
        );
    }
}
