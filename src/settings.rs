use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coach::{CoachModels, RetryPolicy};
use crate::live::{LiveConfig, CAPTURE_FRAME_SAMPLES, DEFAULT_LIVE_MODEL, DEFAULT_VOICE};
use crate::logging::LogFormat;

const APP_DIR_NAME: &str = "kazilens";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Native-audio model used for interview practice.
    pub live_model: String,

    /// Prebuilt voice of the interviewer.
    pub voice: String,

    /// Microphone samples per outbound chunk.
    pub capture_frame_samples: usize,

    /// Outbound chunks buffered before new ones are dropped.
    pub capture_queue_capacity: usize,

    /// Number of transcript lines kept on screen.
    pub transcript_window: usize,

    pub capture_sample_rate: u32,

    /// Rate assumed for inbound audio whose MIME tag has no `rate=`.
    pub playback_sample_rate: u32,

    pub analysis_model: String,
    pub search_model: String,
    pub insight_model: String,
    pub maps_model: String,
    pub chat_model: String,

    /// Thinking budget (tokens) for resume analysis.
    pub thinking_budget: u32,

    /// Retries after the first attempt when a batch call is rate limited.
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry.
    pub retry_base_delay_ms: u64,

    pub log_format: LogFormat,
}

impl Default for AppSettings {
    fn default() -> Self {
        let models = CoachModels::default();
        let retry = RetryPolicy::default();
        Self {
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            capture_frame_samples: CAPTURE_FRAME_SAMPLES,
            capture_queue_capacity: LiveConfig::default().queue_capacity,
            transcript_window: LiveConfig::default().transcript_window,
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            analysis_model: models.analysis,
            search_model: models.search,
            insight_model: models.insight,
            maps_model: models.maps,
            chat_model: models.chat,
            thinking_budget: 32768,
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            log_format: LogFormat::Text,
        }
    }
}

impl AppSettings {
    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            model: self.live_model.clone(),
            voice: self.voice.clone(),
            capture_sample_rate: self.capture_sample_rate,
            playback_sample_rate: self.playback_sample_rate,
            frame_samples: self.capture_frame_samples,
            queue_capacity: self.capture_queue_capacity,
            transcript_window: self.transcript_window,
        }
    }

    pub fn coach_models(&self) -> CoachModels {
        CoachModels {
            analysis: self.analysis_model.clone(),
            search: self.search_model.clone(),
            insight: self.insight_model.clone(),
            maps: self.maps_model.clone(),
            chat: self.chat_model.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

/// Default location: `<config dir>/kazilens/settings.json`
pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from the default location, falling back to defaults
pub fn load_settings() -> AppSettings {
    match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a temp file in the same directory, then rename over the target
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
