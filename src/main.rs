use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trasa_analyzer::config::Config;
use trasa_analyzer::pose::PoseSequence;
use trasa_analyzer::{ExerciseKind, SequenceAnalyzer};

#[derive(Parser)]
#[command(name = "trasa-analyzer", version = env!("GIT_VERSION"), about = "Rep counting and duplicate-frame checks for recorded fitness tests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 記録済みの姿勢列 (JSON) を解析して結果を出力
    Analyze {
        /// PoseSequence の JSON ファイル
        poses: PathBuf,
        /// 申告種目 (situps, pushups, jump)
        #[arg(short, long)]
        exercise: ExerciseKind,
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// 整形して出力
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let cli = Cli::parse();
    tracing::info!("trasa-analyzer ({})", env!("GIT_VERSION"));

    match cli.command {
        Command::Analyze {
            poses,
            exercise,
            config,
            pretty,
        } => {
            let config = Config::load_or_default(&config);
            let analyzer = SequenceAnalyzer::from_config(&config)?;

            let content = fs::read_to_string(&poses)
                .with_context(|| format!("failed to read {}", poses.display()))?;
            let sequence: PoseSequence = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", poses.display()))?;

            let result = analyzer.analyze(&sequence, exercise);
            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                result.to_json()?
            };
            println!("{}", json);
        }
    }

    Ok(())
}
