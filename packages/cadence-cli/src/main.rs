use anyhow::{Context, Result};
use cadence_scheduler::{
    Action, Category, FrameCallback, FrameScheduler, IntervalTickSource, MonotonicClock,
    SchedulerConfig, SchedulerResult,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Level;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence frame scheduler driver", long_about = None)]
struct Cli {
    /// Log scheduler state transitions
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a scheduler from a software refresh signal and report stats
    Run {
        /// Refresh rate of the simulated display
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Number of animation frames to run
        #[arg(long, default_value_t = 120)]
        frames: u32,
        /// JSON scheduler configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default scheduler configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Run {
            fps,
            frames,
            config,
        } => run(fps, frames, config).await,
        Commands::Config => {
            println!("{}", SchedulerConfig::default().to_json_pretty());
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(SchedulerConfig::from_json_str(&json)?)
}

async fn run(fps: u32, frames: u32, config: Option<PathBuf>) -> Result<()> {
    if fps == 0 {
        anyhow::bail!("--fps must be greater than zero");
    }
    let config = load_config(config)?;

    let clock = MonotonicClock::new();
    let period = Duration::from_secs_f64(1.0 / f64::from(fps));
    let source = IntervalTickSource::spawn(period, clock)?;
    let scheduler = FrameScheduler::builder(source)
        .with_clock(clock)
        .with_config(config)
        .build();

    tracing::info!(
        "Running {} frames at {} fps (frame delay {} ns)",
        frames,
        fps,
        scheduler.frame_delay_nanos()
    );

    if frames > 0 {
        let (done, mut finished) = tokio::sync::mpsc::unbounded_channel();
        let actions = FrameActions::new();
        schedule_frame(&scheduler, &actions, frames, done)?;

        let last_frame = finished
            .recv()
            .await
            .context("scheduler stopped before the last frame")?;
        tracing::info!("Last frame dispatched at {} ns", last_frame);
    }

    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    Ok(())
}

/// Per-frame work posted alongside the animation callback.
#[derive(Clone)]
struct FrameActions {
    input: Action,
    traversal: Action,
}

impl FrameActions {
    fn new() -> Self {
        Self {
            input: Action::new(|| tracing::trace!("Sampling input")),
            traversal: Action::new(|| tracing::trace!("Laying out")),
        }
    }
}

fn schedule_frame(
    scheduler: &FrameScheduler,
    actions: &FrameActions,
    remaining: u32,
    done: UnboundedSender<u64>,
) -> SchedulerResult {
    let next = scheduler.clone();
    let next_actions = actions.clone();
    let callback = FrameCallback::new(move |frame_time| {
        if remaining <= 1 {
            let _ = done.send(frame_time);
            return;
        }
        if let Err(e) = schedule_frame(&next, &next_actions, remaining - 1, done.clone()) {
            tracing::error!("Could not schedule frame: {}", e);
        }
    });

    scheduler.post_action(Category::Input, &actions.input, None)?;
    scheduler.post_frame_callback(&callback)?;
    scheduler.post_action(Category::Traversal, &actions.traversal, None)?;
    Ok(())
}
