pub mod autoplay;
pub mod chart;
pub mod combo;
pub mod gameplay;
pub mod generator;
pub mod hold;
pub mod judgment;
pub mod note;
pub mod note_source;
pub mod scores;
pub mod sweep;
pub mod timing_stats;
pub mod timing_windows;
