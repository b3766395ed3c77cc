use crate::TargetArgs;
use crate::utils;
use colored::Colorize;
use firelens_cloud::{GlobalState, StateManager, Template, TemplateFormat};
use firelens_cloud_aws::ensure_passed;
use std::path::Path;

pub async fn handle(
    target: &TargetArgs,
    output: &Path,
    format: &str,
    to_stdout: bool,
) -> anyhow::Result<()> {
    let format: TemplateFormat = format.parse()?;
    let (loaded, built) = utils::build_stack(target)?;
    utils::print_loaded_config_files(&loaded.files);

    // 不変条件を満たさないテンプレートは書き出さない
    ensure_passed(&built.check())?;

    let template = Template::synthesize(built.stack())?;
    let rendered = template.render(format)?;

    if to_stdout {
        println!("{}", rendered);
    } else {
        tokio::fs::create_dir_all(output).await?;
        let path = utils::template_path(output, built.stack().name(), format.extension());
        tokio::fs::write(&path, &rendered).await?;
        eprintln!(
            "{} {} ({} リソース)",
            "✓ テンプレートを書き出しました:".green().bold(),
            path.display().to_string().cyan(),
            built.stack().resources().len()
        );
    }

    record_state(built.stack()).await?;
    Ok(())
}

async fn record_state(stack: &firelens_cloud::Stack) -> anyhow::Result<()> {
    let manager = StateManager::new(utils::project_root()?);
    let lock = manager.acquire_lock().await?;

    let mut state: GlobalState = manager.load().await?;
    state.record(stack);
    manager.save(&state).await?;

    lock.release().await?;
    tracing::debug!(stack = %stack.name(), "Recorded synthesized state");
    Ok(())
}
