//! Configuration loading and timing knobs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All tunables of the automaton.
///
/// Every field has a default, so a missing or partial settings file still
/// yields a working configuration. Durations are stored as seconds to keep
/// the JSON readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum classifier confidence to accept a label.
    pub classifier_threshold: f32,
    /// Minimum normalized OCR confidence to accept a cue.
    pub text_threshold: f32,
    /// Minimum gap between classifier polls, seconds.
    pub classifier_interval: f64,
    /// Minimum gap between OCR polls, seconds.
    pub text_interval: f64,
    /// How long to wait for the first cue before giving up, seconds.
    pub initial_timeout: f64,
    /// Silence limit in the hooked phase before the remedial cast, seconds.
    pub state1_timeout: f64,
    /// Fast-click jitter bounds, seconds.
    pub click_delay_min: f64,
    pub click_delay_max: f64,
    /// Click pause when stamina crosses the halfway mark, seconds.
    pub state3_pause_time: f64,
    /// Settle time before confirming a catch, seconds.
    pub success_wait_time: f64,
    /// How long the primary button is held when casting the rod, seconds.
    pub cast_hold_time: f64,
    /// How long a direction key is held, seconds.
    pub key_press_time: f64,
    /// Hotkey chords.
    pub hotkey_start: String,
    pub hotkey_stop: String,
    pub hotkey_emergency: String,
    /// Key held when a "pull left" cue appears.
    pub left_key: String,
    /// Key held when a "pull right" cue appears.
    pub right_key: String,
    /// Key tapped to confirm a successful catch.
    pub confirm_key: String,
    /// Tesseract language for cue recognition.
    pub ocr_lang: String,
    /// Folder with the per-label template images, relative to the data dir.
    pub template_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier_threshold: 0.5,
            text_threshold: 0.60,
            classifier_interval: 0.1,
            text_interval: 0.2,
            initial_timeout: 180.0,
            state1_timeout: 3.0,
            click_delay_min: 0.054,
            click_delay_max: 0.127,
            state3_pause_time: 1.0,
            success_wait_time: 1.5,
            cast_hold_time: 2.0,
            key_press_time: 1.0,
            hotkey_start: "F9".to_string(),
            hotkey_stop: "F10".to_string(),
            hotkey_emergency: "F11".to_string(),
            left_key: "A".to_string(),
            right_key: "D".to_string(),
            confirm_key: "F".to_string(),
            ocr_lang: "eng".to_string(),
            template_dir: "templates".to_string(),
        }
    }
}

impl Config {
    /// Load the settings file, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = settings_path();
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => config.sanitized(),
                Err(e) => {
                    tracing::warn!("[CONFIG] Failed to parse {:?}: {}", path, e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// Save the settings file, pretty-printed.
    pub fn save(&self) {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(content) = serde_json::to_string_pretty(self) {
            let _ = fs::write(&path, content);
        }
    }

    /// Clamp nonsensical values instead of refusing to run.
    fn sanitized(mut self) -> Self {
        if self.click_delay_min > self.click_delay_max {
            tracing::warn!(
                "[CONFIG] click_delay_min {} > click_delay_max {}, swapping",
                self.click_delay_min,
                self.click_delay_max
            );
            std::mem::swap(&mut self.click_delay_min, &mut self.click_delay_max);
        }
        self
    }

    pub fn classifier_poll_gap(&self) -> Duration {
        Duration::from_secs_f64(self.classifier_interval)
    }

    pub fn text_poll_gap(&self) -> Duration {
        Duration::from_secs_f64(self.text_interval)
    }

    pub fn initial_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.initial_timeout)
    }

    pub fn hook_stall_limit(&self) -> Duration {
        Duration::from_secs_f64(self.state1_timeout)
    }

    pub fn click_jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.click_delay_min),
            Duration::from_secs_f64(self.click_delay_max),
        )
    }

    pub fn halfway_pause(&self) -> Duration {
        Duration::from_secs_f64(self.state3_pause_time)
    }

    pub fn success_settle(&self) -> Duration {
        Duration::from_secs_f64(self.success_wait_time)
    }

    pub fn cast_hold(&self) -> Duration {
        Duration::from_secs_f64(self.cast_hold_time)
    }

    pub fn key_hold(&self) -> Duration {
        Duration::from_secs_f64(self.key_press_time)
    }

    /// Absolute folder holding the per-label template images.
    pub fn template_path(&self) -> PathBuf {
        get_data_dir().join(&self.template_dir)
    }
}

/// Returns the folder where data files should be stored.
///
/// Resolution order: the `AUTOREEL_DATA_DIR` override, then a portable
/// install (a `config/` folder sitting next to the executable), then the
/// working directory.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env::var_os("AUTOREEL_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let portable = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .filter(|dir| dir.join("config").is_dir());

    portable.unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn settings_path() -> PathBuf {
    get_data_dir().join("config").join("settings.json")
}
