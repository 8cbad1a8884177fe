use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, Command, value_parser};
use log::{error, info, warn};

use mediabridge::config::BridgeConfig;
use mediabridge::display::FramePoll;
use mediabridge::engine::{Engine, EngineContext};
use mediabridge::session::Session;
use mediabridge::utils::StopSignal;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("uri")
                .short('u')
                .long("uri")
                .value_name("URI")
                .help("Media to play; overrides the configuration."),
        )
        .arg(
            Arg::new("video")
                .long("video")
                .value_name("INDEX")
                .help("Video stream index, negative to disable.")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i32)),
        )
        .arg(
            Arg::new("audio")
                .long("audio")
                .value_name("INDEX")
                .help("Audio stream index, negative to disable.")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i32)),
        )
        .arg(
            Arg::new("ticks")
                .short('n')
                .long("ticks")
                .value_name("COUNT")
                .help("Number of host ticks to run.")
                .default_value("600")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("tick-ms")
                .long("tick-ms")
                .value_name("MILLIS")
                .help("Interval between ticks.")
                .default_value("16")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("loop")
                .short('l')
                .long("loop")
                .help("Restart the media when it finishes.")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(feature = "native")]
fn engine(_tick: Duration) -> Arc<dyn Engine> {
    Arc::new(mediabridge::engine::NativeEngine::new())
}

#[cfg(not(feature = "native"))]
fn engine(tick: Duration) -> Arc<dyn Engine> {
    info!("Running against the simulated engine");
    Arc::new(
        mediabridge::engine::SimulatedEngine::new()
            .with_auto_frames(320, 180, tick.as_secs_f64())
            .with_duration(3.0),
    )
}

fn run() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(uri) = matches.get_one::<String>("uri") {
        config.playback.uri = uri.clone();
    }
    if let Some(&video) = matches.get_one::<i32>("video") {
        config.playback.video_index = video;
    }
    if let Some(&audio) = matches.get_one::<i32>("audio") {
        config.playback.audio_index = audio;
    }
    if matches.get_flag("loop") {
        config.playback.looping = true;
    }
    if config.playback.uri.is_empty() && cfg!(not(feature = "native")) {
        config.playback.uri = "sim://demo".into();
    }

    let ticks = matches.get_one::<u64>("ticks").copied().unwrap_or(600);
    let tick = Duration::from_millis(matches.get_one::<u64>("tick-ms").copied().unwrap_or(16));
    let looping = config.playback.looping;

    let context = EngineContext::new(engine(tick), &config.debug);
    let mut session = Session::new(context.clone(), config);

    let finished = Arc::new(AtomicBool::new(false));
    session.on_start(|| info!("Playback started"));
    session.on_finish({
        let finished = finished.clone();
        move || {
            info!("Playback finished");
            finished.store(true, Ordering::Release);
        }
    });
    session.on_error(|message| warn!("Playback error: {}", message));
    session.on_qos(|qos| info!("QoS: {}", qos));

    let stop = StopSignal::new();
    ctrlc::set_handler({
        let stop = stop.clone();
        move || stop.stop()
    })
    .context("installing Ctrl-C handler")?;

    session.start().context("starting playback")?;
    info!("Engine active: {}", context.is_active());

    for n in 0..ticks {
        let outcome = session.advance()?;
        if let FramePoll::Frame { descriptor, .. } = outcome.frame
            && n % 60 == 0
        {
            info!(
                "Tick {}: frame {} at {:.2}/{:.2}s",
                n,
                descriptor,
                session.position()?,
                session.duration()?
            );
        }

        if finished.swap(false, Ordering::AcqRel) && !looping {
            break;
        }
        if stop.wait_timeout(tick) {
            info!("Interrupted");
            break;
        }
    }

    info!("{}", session.qos_summary());
    session.destroy();
    Ok(())
}
