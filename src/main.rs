use std::path::PathBuf;

use beatline::config;
use beatline::core::clock::GameClock;
use beatline::core::input::{self, Lane, LaneInput};
use beatline::core::network::{self, SaveResultParams, SubmitStatus};
use beatline::game::autoplay::AutoPlayer;
use beatline::game::chart::{self, ChartData};
use beatline::game::gameplay::GameSession;
use beatline::game::scores::ResultState;
use beatline::game::timing_stats::TimingStats;
use clap::Parser;
use log::{info, warn};

/// Tail after the last chart note before the simulated track stops.
const CHART_OUTRO_MS: i64 = 2000;
/// Hard stop for runs that never complete.
const MAX_RUN_MS: i64 = 30 * 60 * 1000;

#[derive(Parser, Debug)]
#[command(name = "beatline", about = "Headless four-lane judgement engine with an autoplay player")]
struct Args {
    /// Chart JSON file to play. Without one, the chart is fetched by
    /// --music-id, or notes are generated.
    chart: Option<PathBuf>,

    /// Music id to fetch from the backend and to report results under.
    #[arg(long)]
    music_id: Option<String>,

    /// Path to the ini file.
    #[arg(long, default_value = config::CONFIG_PATH)]
    config: PathBuf,

    /// Length of a generated run, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    length_ms: i64,

    /// Seed for generated notes and for the autoplay timing error.
    #[arg(long)]
    seed: Option<u64>,

    /// Largest autoplay timing error either side of a note, in milliseconds.
    #[arg(long, default_value_t = 25)]
    jitter_ms: i64,

    /// Simulated frame length in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: i64,

    /// POST the result to the backend when the run completes.
    #[arg(long)]
    submit: bool,
}

fn load_chart(args: &Args, api_base: &str) -> ChartData {
    if let Some(path) = &args.chart {
        match chart::load_chart_file(path) {
            Ok(c) => return c,
            Err(e) => warn!("Could not load chart {}: {e}. Falling back to generated notes.", path.display()),
        }
    } else if let Some(id) = &args.music_id {
        match network::fetch_chart(api_base, id) {
            Ok(c) => return c,
            Err(e) => warn!("Could not fetch chart '{id}': {e}. Falling back to generated notes."),
        }
    }
    ChartData {
        music_id: args.music_id.clone().unwrap_or_default(),
        ..ChartData::default()
    }
}

fn media_length_ms(chart: &ChartData, args: &Args) -> i64 {
    if chart.is_procedural() {
        return args.length_ms.max(0);
    }
    chart
        .notes
        .iter()
        .map(|n| n.end_time_ms())
        .max()
        .unwrap_or(0)
        .saturating_add(CHART_OUTRO_MS)
}

fn print_result(result: &ResultState, stats: &TimingStats) {
    println!("music      : {}", result.music_id);
    println!("score      : {}", result.score);
    println!("accuracy   : {}%", result.accuracy);
    println!("rank       : {}", result.rank.as_str());
    println!(
        "judgements : perfect={} great={} good={} miss={}",
        result.perfect, result.great, result.good, result.miss
    );
    println!("early/late : {}/{}", result.early_count, result.late_count);
    println!("max combo  : {}", result.max_combo);
    println!(
        "flags      : full_combo={} all_perfect={}",
        result.is_full_combo, result.is_all_perfect
    );
    println!(
        "offsets    : mean={:.1}ms mean_abs={:.1}ms stddev={:.1}ms (n={})",
        stats.mean_ms, stats.mean_abs_ms, stats.stddev_ms, stats.count
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let args = Args::parse();
    config::load_from(&args.config);
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let chart = load_chart(&args, &cfg.api_base);
    let media_ms = media_length_ms(&chart, &args);
    let music_id = args.music_id.clone().unwrap_or_else(|| chart.music_id.clone());
    let mut opts = cfg.session_options(music_id, chart.difficulty);
    if let Some(seed) = args.seed {
        opts.generator.seed = Some(seed);
    }

    let mut session = GameSession::from_chart(opts, chart);
    let keymap = input::get_keymap();
    let mut keys = LaneInput::new(keymap.clone());
    let mut bot = AutoPlayer::new(args.jitter_ms, args.seed.unwrap_or(0));
    let mut clock = GameClock::new(cfg.countdown_ms);
    let frame_ms = args.frame_ms.max(1);

    let mut raw_ms = 0;
    let mut last_countdown = -1;
    while !session.is_complete() {
        raw_ms += frame_ms;
        let now = clock.tick_at(raw_ms);
        if !clock.is_running() {
            let left = clock.countdown_seconds_left();
            if left != last_countdown {
                info!("Countdown: {left}");
                last_countdown = left;
            }
            continue;
        }
        if now >= media_ms {
            session.notify_media_end(media_ms);
        }
        if now > media_ms.saturating_add(MAX_RUN_MS) {
            warn!("Run did not complete; tearing down.");
            session.teardown();
            break;
        }

        for key in bot.poll(&session, now) {
            let Some(lane) = Lane::from_index(key.lane) else {
                continue;
            };
            // Feed the bot through the same key path a keyboard would take.
            let edge = match keymap.codes_for(lane).first() {
                Some(code) => keys.key_event(code, key.pressed, false, key.at_ms),
                None => Some(input::LaneEdge {
                    lane,
                    pressed: key.pressed,
                    at_ms: key.at_ms,
                }),
            };
            if let Some(edge) = edge {
                session.queue_input_edge(edge.lane.index(), edge.pressed, edge.at_ms);
            }
        }
        session.advance(now);
    }

    let result = session.result();
    print_result(&result, &session.timing_stats());

    if session.is_complete() && (args.submit || cfg.submit_results) {
        let handle = network::submit_result(&cfg.api_base, SaveResultParams::from_result(&result));
        if handle.join().is_err() {
            warn!("Result submission thread panicked");
        }
        match network::get_submit_status() {
            SubmitStatus::Saved => println!("submitted  : ok"),
            SubmitStatus::Error(e) => println!("submitted  : failed ({e})"),
            other => println!("submitted  : {other:?}"),
        }
    }
    Ok(())
}
