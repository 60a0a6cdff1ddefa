//! カメラ映像で回数の目安を表示する（録画中プレビュー）

use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trasa_analyzer::camera::ThreadedCamera;
use trasa_analyzer::config::Config;
use trasa_analyzer::pose::{PoseDetector, SharedSource};
use trasa_analyzer::preview::LivePreview;
use trasa_analyzer::{ExerciseKind, SequenceAnalyzer};

#[derive(Parser)]
#[command(name = "live_preview", version = env!("GIT_VERSION"))]
struct Args {
    #[arg(short, long)]
    exercise: ExerciseKind,
    /// カメラ番号
    #[arg(long, default_value_t = 0)]
    camera: i32,
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    tracing::info!("Live Preview ({})", env!("GIT_VERSION"));
    println!("Press Ctrl+C to exit");

    let config = Config::load_or_default(&args.config);
    let analyzer = SequenceAnalyzer::from_config(&config)?;
    let detector = config.detector.clone();
    let source = Arc::new(SharedSource::new(move || {
        let detector = detector.clone();
        async move { PoseDetector::from_config(&detector) }
    }));
    // 録画開始前から読み込んでおく
    source.warm_up();

    let camera = Arc::new(ThreadedCamera::start(args.camera, Some(640), Some(480))?);
    let (width, height) = camera.resolution();
    println!("Camera resolution: {}x{}", width, height);

    let cancel = CancellationToken::new();
    let preview = LivePreview::new(config.preview.interval(), args.exercise, &analyzer);
    let (mut rx, handle) = preview.spawn(camera, source, cancel.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *rx.borrow_and_update();
                print!(
                    "\r{}: {} (max {})  detections {}/{}   ",
                    args.exercise, state.reps, state.max_reps, state.detections, state.ticks
                );
                std::io::stdout().flush()?;
            }
        }
    }

    cancel.cancel();
    let last = handle.await?;
    println!();
    println!("{}: {} reps (preview only)", args.exercise, last.max_reps);
    Ok(())
}
