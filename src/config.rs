use crate::core::clock::DEFAULT_COUNTDOWN_MS;
use crate::core::input::{self, Keymap, Lane};
use crate::core::network::DEFAULT_API_BASE;
use crate::game::gameplay::{MEDIA_END_GRACE_MS, SessionOptions};
use crate::game::generator::{GeneratorConfig, NOTE_DISPLAY_TIME_MS};
use crate::game::judgment::ScoreTable;
use crate::game::scores::ScoringPolicy;
use crate::game::timing_windows::TimingWindows;
use ini::Ini;
use log::{info, warn};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

pub const CONFIG_PATH: &str = "beatline.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("'{other}' is not a valid LogLevel")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub api_base: String,
    pub submit_results: bool,
    pub countdown_ms: i64,
    pub lookahead_ms: i64,
    pub wait_for_media_end: bool,
    pub media_grace_ms: i64,
    pub windows: TimingWindows,
    pub score_table: ScoreTable,
    pub scoring: ScoringPolicy,
    pub generator: GeneratorConfig,
    /// Comma separated key codes per lane, as written in `[Keys]`.
    pub lane_keys: [String; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            api_base: DEFAULT_API_BASE.to_string(),
            submit_results: false,
            countdown_ms: DEFAULT_COUNTDOWN_MS,
            lookahead_ms: NOTE_DISPLAY_TIME_MS,
            wait_for_media_end: true,
            media_grace_ms: MEDIA_END_GRACE_MS,
            windows: TimingWindows::default(),
            score_table: ScoreTable::default(),
            scoring: ScoringPolicy::default(),
            generator: GeneratorConfig::default(),
            lane_keys: [
                "KeyD".to_string(),
                "KeyF".to_string(),
                "KeyJ".to_string(),
                "KeyK".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn keymap(&self) -> Keymap {
        let mut km = Keymap::default();
        for lane in Lane::ALL {
            let codes: Vec<&str> = self.lane_keys[lane.index()].split(',').collect();
            km.bind(lane, &codes);
        }
        km
    }

    pub fn session_options(&self, music_id: impl Into<String>, difficulty: u32) -> SessionOptions {
        SessionOptions {
            music_id: music_id.into(),
            difficulty,
            windows: self.windows,
            score_table: self.score_table,
            scoring: self.scoring,
            lookahead_ms: self.lookahead_ms,
            wait_for_media_end: self.wait_for_media_end,
            media_grace_ms: self.media_grace_ms,
            generator: self.generator,
        }
    }
}

static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

#[inline(always)]
const fn flag(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn default_config_text() -> String {
    let d = Config::default();
    let mut content = String::new();

    content.push_str("[Options]\n");
    content.push_str(&format!("ApiBase={}\n", d.api_base));
    content.push_str(&format!("CountdownMs={}\n", d.countdown_ms));
    content.push_str(&format!("LogLevel={}\n", d.log_level.as_str()));
    content.push_str(&format!("LookaheadMs={}\n", d.lookahead_ms));
    content.push_str(&format!("MediaGraceMs={}\n", d.media_grace_ms));
    content.push_str(&format!("SubmitResults={}\n", flag(d.submit_results)));
    content.push_str(&format!("WaitForMediaEnd={}\n", flag(d.wait_for_media_end)));
    content.push('\n');

    let w = d.windows;
    let t = d.score_table;
    content.push_str("[Judgement]\n");
    content.push_str(&format!("ComboMultiplierCap={}\n", t.combo_multiplier_cap));
    content.push_str(&format!("ComboStep={}\n", t.combo_step));
    content.push_str(&format!("ComboStepBonus={}\n", t.combo_step_bonus));
    content.push_str(&format!("GoodMs={}\n", w.good_ms));
    content.push_str(&format!("GoodScore={}\n", t.good));
    content.push_str(&format!("GreatMs={}\n", w.great_ms));
    content.push_str(&format!("GreatScore={}\n", t.great));
    content.push_str(&format!("HoldBonus={}\n", t.hold_completion_bonus));
    content.push_str(&format!("MissMs={}\n", w.miss_ms));
    content.push_str(&format!("PerfectMs={}\n", w.perfect_ms));
    content.push_str(&format!("PerfectScore={}\n", t.perfect));
    content.push('\n');

    let s = d.scoring;
    content.push_str("[Scoring]\n");
    content.push_str(&format!("RankA={}\n", s.rank_a));
    content.push_str(&format!("RankB={}\n", s.rank_b));
    content.push_str(&format!("RankC={}\n", s.rank_c));
    content.push_str(&format!("RankD={}\n", s.rank_d));
    content.push_str(&format!("RankS={}\n", s.rank_s));
    content.push_str(&format!("RankSS={}\n", s.rank_ss));
    content.push_str(&format!("WeightGood={}\n", s.weight_good));
    content.push_str(&format!("WeightGreat={}\n", s.weight_great));
    content.push_str(&format!("WeightPerfect={}\n", s.weight_perfect));
    content.push('\n');

    let g = d.generator;
    content.push_str("[Generator]\n");
    content.push_str(&format!("BatchSize={}\n", g.batch_size));
    content.push_str(&format!("BurstChance={}\n", g.burst_chance));
    content.push_str(&format!("BurstCount={}\n", g.burst_count));
    content.push_str(&format!("DensityMultiplier={}\n", g.density_multiplier));
    content.push_str(&format!("DisplayWindowMs={}\n", g.display_window_ms));
    content.push_str(&format!("HoldChance={}\n", g.hold_chance));
    content.push_str(&format!("InitialDelayMs={}\n", g.initial_delay_ms));
    content.push_str(&format!("MaxHoldMs={}\n", g.max_hold_ms));
    content.push_str(&format!("MaxIntervalMs={}\n", g.max_interval_ms));
    content.push_str(&format!("MinHoldMs={}\n", g.min_hold_ms));
    content.push_str(&format!("MinIntervalMs={}\n", g.min_interval_ms));
    content.push_str(&format!("RenewThreshold={}\n", g.renew_threshold));
    content.push_str("Seed=\n");
    content.push('\n');

    content.push_str("[Keys]\n");
    for (lane, keys) in d.lane_keys.iter().enumerate() {
        content.push_str(&format!("Lane{lane}={keys}\n"));
    }
    content
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    std::fs::write(path, default_config_text())
}

#[inline(always)]
fn parsed<T: FromStr>(conf: &Ini, section: &str, key: &str, default: T) -> T {
    conf.get_from(Some(section), key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[inline(always)]
fn parsed_flag(conf: &Ini, section: &str, key: &str, default: bool) -> bool {
    conf.get_from(Some(section), key)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map_or(default, |v| v != 0)
}

/// Builds a config from an ini document, falling back to the default for
/// every key that is missing or unparsable.
pub fn from_ini(conf: &Ini) -> Config {
    let d = Config::default();

    let windows = TimingWindows {
        perfect_ms: parsed(conf, "Judgement", "PerfectMs", d.windows.perfect_ms),
        great_ms: parsed(conf, "Judgement", "GreatMs", d.windows.great_ms),
        good_ms: parsed(conf, "Judgement", "GoodMs", d.windows.good_ms),
        miss_ms: parsed(conf, "Judgement", "MissMs", d.windows.miss_ms),
    };
    let normalized = windows.normalized();
    if normalized != windows {
        warn!(
            "Judgement windows {:?} are not strictly nested; using {:?}",
            windows.as_array(),
            normalized.as_array()
        );
    }

    let t = d.score_table;
    let score_table = ScoreTable {
        perfect: parsed(conf, "Judgement", "PerfectScore", t.perfect),
        great: parsed(conf, "Judgement", "GreatScore", t.great),
        good: parsed(conf, "Judgement", "GoodScore", t.good),
        hold_completion_bonus: parsed(conf, "Judgement", "HoldBonus", t.hold_completion_bonus),
        combo_step: parsed(conf, "Judgement", "ComboStep", t.combo_step).max(1),
        combo_step_bonus: parsed(conf, "Judgement", "ComboStepBonus", t.combo_step_bonus),
        combo_multiplier_cap: parsed(conf, "Judgement", "ComboMultiplierCap", t.combo_multiplier_cap),
    };

    let s = d.scoring;
    let scoring = ScoringPolicy {
        weight_perfect: parsed(conf, "Scoring", "WeightPerfect", s.weight_perfect),
        weight_great: parsed(conf, "Scoring", "WeightGreat", s.weight_great),
        weight_good: parsed(conf, "Scoring", "WeightGood", s.weight_good),
        rank_ss: parsed(conf, "Scoring", "RankSS", s.rank_ss),
        rank_s: parsed(conf, "Scoring", "RankS", s.rank_s),
        rank_a: parsed(conf, "Scoring", "RankA", s.rank_a),
        rank_b: parsed(conf, "Scoring", "RankB", s.rank_b),
        rank_c: parsed(conf, "Scoring", "RankC", s.rank_c),
        rank_d: parsed(conf, "Scoring", "RankD", s.rank_d),
    };

    let g = d.generator;
    let generator = GeneratorConfig {
        batch_size: parsed(conf, "Generator", "BatchSize", g.batch_size),
        renew_threshold: parsed(conf, "Generator", "RenewThreshold", g.renew_threshold),
        initial_delay_ms: parsed(conf, "Generator", "InitialDelayMs", g.initial_delay_ms),
        min_interval_ms: parsed(conf, "Generator", "MinIntervalMs", g.min_interval_ms),
        max_interval_ms: parsed(conf, "Generator", "MaxIntervalMs", g.max_interval_ms),
        density_multiplier: parsed(conf, "Generator", "DensityMultiplier", g.density_multiplier),
        burst_chance: parsed(conf, "Generator", "BurstChance", g.burst_chance),
        burst_count: parsed(conf, "Generator", "BurstCount", g.burst_count),
        hold_chance: parsed(conf, "Generator", "HoldChance", g.hold_chance),
        min_hold_ms: parsed(conf, "Generator", "MinHoldMs", g.min_hold_ms),
        max_hold_ms: parsed(conf, "Generator", "MaxHoldMs", g.max_hold_ms),
        display_window_ms: parsed(conf, "Generator", "DisplayWindowMs", g.display_window_ms),
        seed: conf
            .get_from(Some("Generator"), "Seed")
            .and_then(|v| v.trim().parse::<u64>().ok()),
    }
    .sanitized();

    let lane_keys = std::array::from_fn(|lane| {
        conf.get_from(Some("Keys"), &format!("Lane{lane}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| d.lane_keys[lane].clone())
    });

    Config {
        log_level: parsed(conf, "Options", "LogLevel", d.log_level),
        api_base: conf
            .get_from(Some("Options"), "ApiBase")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(d.api_base),
        submit_results: parsed_flag(conf, "Options", "SubmitResults", d.submit_results),
        countdown_ms: parsed(conf, "Options", "CountdownMs", d.countdown_ms).max(0),
        lookahead_ms: parsed(conf, "Options", "LookaheadMs", d.lookahead_ms).max(0),
        wait_for_media_end: parsed_flag(conf, "Options", "WaitForMediaEnd", d.wait_for_media_end),
        media_grace_ms: parsed(conf, "Options", "MediaGraceMs", d.media_grace_ms).max(0),
        windows: normalized,
        score_table,
        scoring,
        generator,
        lane_keys,
    }
}

pub fn load_from(path: &Path) {
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(path) {
        Ok(conf) => {
            let cfg = from_ini(&conf);
            input::set_keymap(cfg.keymap());
            *CONFIG.lock().unwrap() = cfg;
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
        }
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_text_round_trips() {
        let conf = Ini::load_from_str(&default_config_text()).unwrap();
        assert_eq!(from_ini(&conf), Config::default());
    }

    #[test]
    fn missing_and_bad_keys_fall_back() {
        let conf = Ini::load_from_str(
            "[Options]\nLogLevel=loud\nSubmitResults=1\n[Judgement]\nPerfectMs=25\nGreatMs=abc\n",
        )
        .unwrap();
        let cfg = from_ini(&conf);
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(cfg.submit_results);
        assert_eq!(cfg.windows.perfect_ms, 25);
        assert_eq!(cfg.windows.great_ms, 60);
        assert_eq!(cfg.generator.seed, None);
    }

    #[test]
    fn keys_section_builds_keymap() {
        let conf = Ini::load_from_str("[Keys]\nLane0=KeyA, ArrowLeft\nLane3=\n").unwrap();
        let km = from_ini(&conf).keymap();
        assert_eq!(km.lane_for("KeyA"), Some(Lane::Left));
        assert_eq!(km.lane_for("ArrowLeft"), Some(Lane::Left));
        assert_eq!(km.lane_for("KeyD"), None);
        assert_eq!(km.lane_for("KeyK"), Some(Lane::Right));
    }

    #[test]
    fn inverted_windows_are_repaired() {
        let conf = Ini::load_from_str("[Judgement]\nGreatMs=20\n").unwrap();
        let w = from_ini(&conf).windows;
        assert!(w.perfect_ms < w.great_ms && w.great_ms < w.good_ms && w.good_ms < w.miss_ms);
    }
}
