//! 動画ファイルを MoveNet で解析して結果 JSON を出力する

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trasa_analyzer::camera::OpenCvVideo;
use trasa_analyzer::config::Config;
use trasa_analyzer::job::spawn_analysis;
use trasa_analyzer::pose::{PoseDetector, SharedSource};
use trasa_analyzer::{Analyzer, ExerciseKind};

#[derive(Parser)]
#[command(name = "analyze_video", version = env!("GIT_VERSION"))]
struct Args {
    /// 解析する動画
    video: PathBuf,
    #[arg(short, long)]
    exercise: ExerciseKind,
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let args = Args::parse();
    tracing::info!("Analyze Video ({})", env!("GIT_VERSION"));

    let config = Config::load_or_default(&args.config);
    let detector = config.detector.clone();
    let source = Arc::new(SharedSource::new(move || {
        let detector = detector.clone();
        async move { PoseDetector::from_config(&detector) }
    }));
    let analyzer = Arc::new(Analyzer::from_config(&config, source)?);

    let video = OpenCvVideo::open(&args.video)
        .with_context(|| format!("failed to open {}", args.video.display()))?;
    let job = spawn_analysis(analyzer, video, args.exercise);

    let result = tokio::select! {
        result = job.wait(&config.completion) => result?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        result.to_json()?
    };
    println!("{}", json);
    Ok(())
}
