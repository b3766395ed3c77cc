use crate::TargetArgs;
use crate::utils;
use colored::Colorize;
use firelens_cloud_aws::FirelensStack;

pub fn handle(target: &TargetArgs) -> anyhow::Result<()> {
    println!("{}", "スタックを検証中...".blue());

    let loaded = match utils::load_deployment(target) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };
    utils::print_loaded_config_files(&loaded.files);

    let built = match FirelensStack::build(&loaded.deployment) {
        Ok(built) => built,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 合成エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "スタック: {} ({} リソース)",
        built.stack().name().cyan(),
        built.stack().resources().len()
    );
    println!();

    let results = built.check();
    for result in &results {
        if result.passed {
            println!("  {} {} {}", "✓".green(), result.name, result.detail.dimmed());
        } else {
            println!("  {} {} {}", "✗".red(), result.name.bold(), result.detail.red());
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    println!();
    if failed > 0 {
        eprintln!(
            "{}",
            format!("✗ {}件の検証に失敗しました", failed).red().bold()
        );
        std::process::exit(1);
    }

    println!("{}", "✓ スタックは正常です！".green().bold());
    Ok(())
}
