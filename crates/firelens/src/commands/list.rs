use crate::TargetArgs;
use crate::utils;
use colored::Colorize;
use firelens_cloud_aws::checks::physical_name;

pub fn handle(target: &TargetArgs) -> anyhow::Result<()> {
    let (loaded, built) = utils::build_stack(target)?;
    utils::print_loaded_config_files(&loaded.files);

    let stack = built.stack();
    println!("スタック: {}", stack.name().cyan());
    println!();

    for (i, resource) in stack.creation_order()?.into_iter().enumerate() {
        let name = physical_name(resource)
            .map(|n| format!(" {}", n.cyan()))
            .unwrap_or_default();
        println!(
            "{:>3}. {} ({}){}",
            i + 1,
            resource.construct_path.bold(),
            resource.resource_type.dimmed(),
            name
        );
    }

    if !stack.parameters().is_empty() {
        println!();
        println!("パラメータ:");
        for (id, parameter) in stack.parameters() {
            println!("  - {} ({})", id.cyan(), parameter.parameter_type);
        }
    }

    Ok(())
}
