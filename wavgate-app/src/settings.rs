//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wavgate_core::{EncoderConfig, GateConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// Where completed segments are written.
    pub output_dir: PathBuf,
    /// Gate preset; `custom` uses `encoder.gate` untouched.
    pub gate_profile: String,
    /// Prefix segment file names with the local capture time.
    pub timestamp_names: bool,
    /// Append one JSON line per segment to `segments.jsonl`.
    pub write_index: bool,
    pub encoder: EncoderConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            output_dir: PathBuf::from("segments"),
            gate_profile: "custom".into(),
            timestamp_names: false,
            write_index: true,
            encoder: EncoderConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.gate_profile = normalize_gate_profile(&self.gate_profile);
        apply_gate_profile(&mut self.encoder.gate, &self.gate_profile);

        let enc = &mut self.encoder;
        enc.channels = enc.channels.clamp(1, 8);
        enc.precision = enc.precision.clamp(1, 3);
        enc.sample_rate = enc.sample_rate.clamp(1_000, 384_000);
        enc.delivery_capacity = enc.delivery_capacity.clamp(1, 1_024);
        enc.delivery_timeout_ms = enc.delivery_timeout_ms.clamp(10, 60_000);
        enc.capture_stall_timeout_ms = enc.capture_stall_timeout_ms.clamp(100, 60_000);

        let gate = &mut enc.gate;
        gate.on_threshold = clamp_unit(gate.on_threshold);
        gate.off_threshold = clamp_unit(gate.off_threshold);
        gate.wakeup_timeout = gate.wakeup_timeout.min(10_000);
        gate.fake_break_limit = gate.fake_break_limit.min(10_000);

        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

pub fn normalize_gate_profile(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sensitive" | "quiet" | "whisper" => "sensitive".into(),
        "balanced" | "default" => "balanced".into(),
        "strict" | "noisy" => "strict".into(),
        _ => "custom".into(),
    }
}

/// Overwrite thresholds and timing with a named preset.
pub fn apply_gate_profile(gate: &mut GateConfig, profile: &str) {
    match profile {
        "sensitive" => {
            // Quiet rooms: low onset, long tail.
            gate.on_threshold = 0.008;
            gate.off_threshold = 0.02;
            gate.wakeup_timeout = 30;
            gate.fake_break_limit = 2;
        }
        "balanced" => {
            let defaults = GateConfig::default();
            gate.on_threshold = defaults.on_threshold;
            gate.off_threshold = defaults.off_threshold;
            gate.wakeup_timeout = defaults.wakeup_timeout;
            gate.fake_break_limit = defaults.fake_break_limit;
        }
        "strict" => {
            gate.on_threshold = 0.05;
            gate.off_threshold = 0.12;
            gate.wakeup_timeout = 12;
            gate.fake_break_limit = 4;
        }
        _ => {}
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("wavgate")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("wavgate")
            .join("settings.json")
    }
}

/// Read settings; a missing or unreadable file yields defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "ignoring malformed settings: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
