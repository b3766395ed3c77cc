mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "firelens")]
#[command(about = "FireLens ログ基盤のスタックを型付きで合成する", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// 対象デプロイの指定（全コマンド共通）
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// リソース名の prefix（firelens.kdl の prefix より優先）
    #[arg(short, long, env = "FIRELENS_PREFIX")]
    pub prefix: Option<String>,
    /// 設定ファイルのパス（省略時は自動検出）
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// テンプレートを合成して書き出す
    Synth {
        #[command(flatten)]
        target: TargetArgs,
        /// 出力ディレクトリ
        #[arg(short, long, default_value = "firelens.out")]
        output: PathBuf,
        /// 出力形式 (json, yaml)
        #[arg(short, long, default_value = "json")]
        format: String,
        /// ファイルに書かず標準出力に出す
        #[arg(long)]
        stdout: bool,
    },
    /// 前回の合成結果との差分を表示
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// 合成したスタックの不変条件を検証
    Validate {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// リソースを作成順に一覧表示
    List {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout はテンプレート出力に使うので、ログは stderr に出す
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Synth {
            target,
            output,
            format,
            stdout,
        } => {
            commands::synth::handle(&target, &output, &format, stdout).await?;
        }
        Commands::Plan { target } => {
            commands::plan::handle(&target).await?;
        }
        Commands::Validate { target } => {
            commands::validate::handle(&target)?;
        }
        Commands::List { target } => {
            commands::list::handle(&target)?;
        }
        Commands::Version => {
            println!("firelens {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
