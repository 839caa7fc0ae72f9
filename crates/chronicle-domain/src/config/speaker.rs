use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerRecognitionConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    /// Minimum buffered audio, in seconds, before a speaker-identification
    /// window is posted for a non-diarizing provider (§4.5).
    #[serde(default = "d_window_secs")]
    pub identification_window_secs: f64,
    /// Timeout floor/slope: `min(max_timeout, base + per_second * duration)`.
    #[serde(default = "d_timeout_base")]
    pub timeout_base_secs: f64,
    #[serde(default = "d_timeout_per_second")]
    pub timeout_per_second: f64,
    #[serde(default = "d_timeout_max")]
    pub timeout_max_secs: f64,
}

impl SpeakerRecognitionConfig {
    pub fn request_timeout_secs(&self, audio_duration_secs: f64) -> f64 {
        (self.timeout_base_secs + self.timeout_per_second * audio_duration_secs)
            .min(self.timeout_max_secs)
    }
}

impl Default for SpeakerRecognitionConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            base_url: String::new(),
            identification_window_secs: d_window_secs(),
            timeout_base_secs: d_timeout_base(),
            timeout_per_second: d_timeout_per_second(),
            timeout_max_secs: d_timeout_max(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_window_secs() -> f64 {
    0.1
}
fn d_timeout_base() -> f64 {
    30.0
}
fn d_timeout_per_second() -> f64 {
    8.0
}
fn d_timeout_max() -> f64 {
    600.0
}
