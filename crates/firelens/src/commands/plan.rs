use crate::TargetArgs;
use crate::utils;
use colored::Colorize;
use firelens_cloud::{ActionType, Plan, StateManager};

pub async fn handle(target: &TargetArgs) -> anyhow::Result<()> {
    let (loaded, built) = utils::build_stack(target)?;
    utils::print_loaded_config_files(&loaded.files);

    let manager = StateManager::new(utils::project_root()?);
    let state = manager.load().await?;
    let stack = built.stack();
    let recorded = state.get_stack(stack.name());

    match recorded {
        Some(previous) => println!(
            "{} {} (前回の合成: {})",
            "スタック:".bold(),
            stack.name().cyan(),
            previous.synthesized_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!(
            "{} {} (未合成)",
            "スタック:".bold(),
            stack.name().cyan()
        ),
    }
    println!();

    let plan = Plan::diff(recorded, stack)?;
    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green());
        return Ok(());
    }

    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => continue,
        };
        println!(
            "  {} {} ({})",
            marker,
            action.resource_id.bold(),
            action.resource_type.dimmed()
        );
        if let Some(changed) = action.details.get("changed").and_then(|v| v.as_array()) {
            let fields: Vec<&str> = changed.iter().filter_map(|v| v.as_str()).collect();
            println!("      変更: {}", fields.join(", "));
        }
    }

    println!();
    println!("{}", plan.summary());

    let destructive = plan.destructive_actions();
    if !destructive.is_empty() {
        println!();
        println!(
            "{}",
            "⚠ 以下のリソースのデータは削除されます:".yellow().bold()
        );
        for action in destructive {
            println!("  • {}", action.resource_id.yellow());
        }
    }

    Ok(())
}
