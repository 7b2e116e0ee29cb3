use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::game::chart::{self, ChartData, ChartError};
use crate::game::combo::join_segments;
use crate::game::scores::ResultState;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("bad chart payload: {0}")]
    Chart(#[from] ChartError),
}

/// Body of `POST /results/`. Field names follow the backend's camelCase.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveResultParams {
    pub music_id: String,
    pub score: u64,
    pub accuracy: u32,
    pub combo: String,
    pub rank: String,
    pub is_full_combo: bool,
    pub is_all_perfect: bool,
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub miss: u32,
    /// Legacy tier the backend still stores; always zero.
    pub bad: u32,
    pub early_count: u32,
    pub late_count: u32,
    pub played_at: String,
}

impl SaveResultParams {
    pub fn from_result(result: &ResultState) -> Self {
        Self {
            music_id: result.music_id.clone(),
            score: result.score,
            accuracy: result.accuracy,
            combo: join_segments(&result.combo_segments),
            rank: result.rank.as_str().to_string(),
            is_full_combo: result.is_full_combo,
            is_all_perfect: result.is_all_perfect,
            perfect: result.perfect,
            great: result.great,
            good: result.good,
            miss: result.miss,
            bad: 0,
            early_count: result.early_count,
            late_count: result.late_count,
            played_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Idle,
    Pending,
    Saved,
    Error(String),
}

static SUBMIT_STATUS: std::sync::LazyLock<Arc<Mutex<SubmitStatus>>> =
    std::sync::LazyLock::new(|| Arc::new(Mutex::new(SubmitStatus::Idle)));

pub fn get_submit_status() -> SubmitStatus {
    SUBMIT_STATUS.lock().unwrap().clone()
}

fn set_submit_status(new_status: SubmitStatus) {
    *SUBMIT_STATUS.lock().unwrap() = new_status;
}

/// Exposes the globally configured ureq Agent for other network requests.
pub fn get_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build()
        .into()
}

#[inline(always)]
fn endpoint(api_base: &str, path: &str) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Fires the result off on a background thread. One attempt only: a failure
/// is logged and left in the submit status, the in-memory result is kept.
pub fn submit_result(api_base: &str, params: SaveResultParams) -> thread::JoinHandle<()> {
    let url = endpoint(api_base, "results/");
    set_submit_status(SubmitStatus::Pending);
    info!("Submitting result for '{}' to {url}", params.music_id);
    thread::spawn(move || perform_submit(&url, &params))
}

fn perform_submit(url: &str, params: &SaveResultParams) {
    let agent = get_agent();
    match agent.post(url).send_json(params) {
        Ok(_) => {
            info!("Result for '{}' saved.", params.music_id);
            set_submit_status(SubmitStatus::Saved);
        }
        Err(e) => {
            warn!("Failed to save result for '{}': {e}", params.music_id);
            set_submit_status(SubmitStatus::Error(format!("HTTP error: {e}")));
        }
    }
}

/// `GET /charts/{music_id}/`, parsed with the same rules as chart files.
pub fn fetch_chart(api_base: &str, music_id: &str) -> Result<ChartData, NetworkError> {
    let url = endpoint(api_base, &format!("charts/{music_id}/"));
    info!("Fetching chart from {url}");
    let agent = get_agent();
    let body: Value = agent.get(&url).call()?.into_body().read_json()?;
    let mut data = chart::parse_chart_value(body)?;
    if data.music_id.is_empty() {
        data.music_id = music_id.to_string();
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combo::ComboSegment;
    use crate::game::scores::Rank;

    fn sample_result() -> ResultState {
        ResultState {
            music_id: "m7".into(),
            difficulty: 3,
            score: 1234,
            accuracy: 91,
            rank: Rank::A,
            perfect: 10,
            great: 2,
            good: 1,
            miss: 1,
            combo_segments: vec![
                ComboSegment { start_ms: 100, last_hit_ms: 900, count: 8 },
                ComboSegment { start_ms: 1200, last_hit_ms: 2000, count: 5 },
            ],
            current_combo: 5,
            max_combo: 8,
            early_count: 6,
            late_count: 8,
            is_full_combo: false,
            is_all_perfect: false,
            total_resolved: 14,
        }
    }

    #[test]
    fn params_serialize_camel_case() {
        let params = SaveResultParams::from_result(&sample_result());
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["musicId"], "m7");
        assert_eq!(json["combo"], "100-900-8,1200-2000-5");
        assert_eq!(json["rank"], "A");
        assert_eq!(json["isFullCombo"], false);
        assert_eq!(json["bad"], 0);
        assert_eq!(json["earlyCount"], 6);
        assert_eq!(json["lateCount"], 8);
        assert!(json["playedAt"].is_string());
    }

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(endpoint("http://h:8000/", "/results/"), "http://h:8000/results/");
        assert_eq!(endpoint("http://h:8000", "charts/x/"), "http://h:8000/charts/x/");
    }
}
