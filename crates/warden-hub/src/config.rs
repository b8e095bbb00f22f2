use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::resilience::MAX_BATTERY_SECS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{key}: cannot parse {value:?}")]
    Env { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Hub configuration.
///
/// Loaded from an optional TOML file, then overridden by `WARDEN_*`
/// environment variables. Secrets have no defaults and must be supplied.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames discarded after opening the camera.
    pub warmup_frames: usize,
    /// External face encoder, as argv. Empty means none configured.
    pub encoder_command: Vec<String>,
    /// Reject encoder output whose embeddings have a different length.
    pub embedding_dim: Option<usize>,
    /// Kill an encoder run that takes longer than this.
    pub encoder_timeout_secs: u64,
    pub store_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Where to write the live preview PNG. Unset disables preview.
    pub preview_path: Option<PathBuf>,
    /// Maximum Euclidean distance accepted as a match.
    pub match_tolerance: f32,
    pub enroll_frame_cap: usize,
    pub enroll_quality_threshold: f32,
    pub auth_frame_cap: usize,
    pub battery_duration_secs: u64,
    pub fault_threshold: u32,
    pub simulation_mode: bool,
    pub admin_password: String,
    /// Six-digit fallback PIN.
    pub pin: String,
    /// RFID card id → user label.
    pub rfid_cards: BTreeMap<String, String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            camera_device: "/dev/video0".to_string(),
            camera_width: 640,
            camera_height: 480,
            warmup_frames: 4,
            encoder_command: Vec::new(),
            embedding_dim: None,
            encoder_timeout_secs: warden_core::DEFAULT_ENCODER_TIMEOUT.as_secs(),
            store_path: data_dir.join("identities.json"),
            ledger_path: data_dir.join("access_log.csv"),
            preview_path: None,
            match_tolerance: warden_core::DEFAULT_TOLERANCE,
            enroll_frame_cap: warden_core::ENROLL_FRAME_CAP,
            enroll_quality_threshold: warden_core::ENROLL_QUALITY_THRESHOLD,
            auth_frame_cap: 30,
            battery_duration_secs: crate::resilience::DEFAULT_BATTERY_SECS,
            fault_threshold: crate::resilience::DEFAULT_FAULT_THRESHOLD,
            simulation_mode: true,
            admin_password: String::new(),
            pin: String::new(),
            rfid_cards: BTreeMap::new(),
        }
    }
}

impl HubConfig {
    /// Load from `WARDEN_CONFIG` (or the default config path), apply
    /// environment overrides, and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("WARDEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Like [`HubConfig::load`] with an explicit file and variable lookup.
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_toml_str(&text)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `WARDEN_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("WARDEN_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("WARDEN_ENCODER_COMMAND") {
            self.encoder_command = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = lookup("WARDEN_STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARDEN_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARDEN_PREVIEW_PATH") {
            self.preview_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = lookup("WARDEN_ADMIN_PASSWORD") {
            self.admin_password = v;
        }
        if let Some(v) = lookup("WARDEN_PIN") {
            self.pin = v;
        }
        env_parse(&lookup, "WARDEN_MATCH_TOLERANCE", &mut self.match_tolerance)?;
        env_parse(&lookup, "WARDEN_ENROLL_FRAMES", &mut self.enroll_frame_cap)?;
        env_parse(&lookup, "WARDEN_AUTH_FRAMES", &mut self.auth_frame_cap)?;
        env_parse(&lookup, "WARDEN_BATTERY_SECS", &mut self.battery_duration_secs)?;
        env_parse(&lookup, "WARDEN_FAULT_THRESHOLD", &mut self.fault_threshold)?;
        env_parse(&lookup, "WARDEN_WARMUP_FRAMES", &mut self.warmup_frames)?;
        env_parse(&lookup, "WARDEN_ENCODER_TIMEOUT_SECS", &mut self.encoder_timeout_secs)?;
        if let Some(v) = lookup("WARDEN_SIMULATION") {
            self.simulation_mode = match v.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        key: "WARDEN_SIMULATION".into(),
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pin.len() != 6 || !self.pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid("pin must be exactly 6 digits".into()));
        }
        if self.admin_password.is_empty() {
            return Err(ConfigError::Invalid("admin_password must be set".into()));
        }
        if !(self.match_tolerance > 0.0) {
            return Err(ConfigError::Invalid("match_tolerance must be positive".into()));
        }
        if self.enroll_frame_cap == 0 || self.auth_frame_cap == 0 {
            return Err(ConfigError::Invalid("frame caps must be positive".into()));
        }
        if self.fault_threshold == 0 {
            return Err(ConfigError::Invalid("fault_threshold must be positive".into()));
        }
        if self.encoder_timeout_secs == 0 {
            return Err(ConfigError::Invalid("encoder_timeout_secs must be positive".into()));
        }
        if self.battery_duration_secs > MAX_BATTERY_SECS {
            return Err(ConfigError::Invalid(format!(
                "battery_duration_secs must be at most {MAX_BATTERY_SECS}"
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse().map_err(|_| ConfigError::Env {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(fallback)
    })
}

/// `$XDG_DATA_HOME/warden`.
pub fn default_data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share").join("warden")
}

/// `$XDG_CONFIG_HOME/warden/warden.toml`.
pub fn default_config_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config").join("warden").join("warden.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const VALID: &str = r#"
        admin_password = "hunter2"
        pin = "135790"
        camera_device = "/dev/video2"
        battery_duration_secs = 60

        [rfid_cards]
        "04A1B2" = "Alice"
    "#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_toml_with_defaults() {
        let c = HubConfig::from_toml_str(VALID).unwrap();
        assert_eq!(c.camera_device, "/dev/video2");
        assert_eq!(c.battery_duration_secs, 60);
        assert_eq!(c.fault_threshold, 3);
        assert_eq!(c.match_tolerance, 0.5);
        assert_eq!(c.rfid_cards.get("04A1B2").map(String::as_str), Some("Alice"));
        assert!(c.simulation_mode);
        c.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_file() {
        let mut c = HubConfig::from_toml_str(VALID).unwrap();
        c.apply_env(env(&[
            ("WARDEN_PIN", "000111"),
            ("WARDEN_MATCH_TOLERANCE", "0.35"),
            ("WARDEN_SIMULATION", "0"),
            ("WARDEN_ENCODER_COMMAND", "python3 encode.py --fast"),
            ("WARDEN_ENCODER_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(c.encoder_timeout_secs, 3);
        assert_eq!(c.pin, "000111");
        assert_eq!(c.match_tolerance, 0.35);
        assert!(!c.simulation_mode);
        assert_eq!(c.encoder_command, vec!["python3", "encode.py", "--fast"]);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut c = HubConfig::default();
        let err = c.apply_env(env(&[("WARDEN_FAULT_THRESHOLD", "three")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key, .. } if key == "WARDEN_FAULT_THRESHOLD"));
    }

    #[test]
    fn test_secrets_required() {
        let c = HubConfig::default();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_pin_must_be_six_digits() {
        let mut c = HubConfig::from_toml_str(VALID).unwrap();
        c.pin = "12345a".into();
        assert!(c.validate().is_err());
        c.pin = "1234567".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_zero_caps_rejected() {
        let mut c = HubConfig::from_toml_str(VALID).unwrap();
        c.auth_frame_cap = 0;
        assert!(c.validate().is_err());

        let mut c = HubConfig::from_toml_str(VALID).unwrap();
        c.encoder_timeout_secs = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_oversized_battery_duration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = HubConfig::load_from(
            &dir.path().join("absent.toml"),
            env(&[
                ("WARDEN_PIN", "222333"),
                ("WARDEN_ADMIN_PASSWORD", "pw"),
                ("WARDEN_BATTERY_SECS", "100000000000000000"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("battery_duration_secs")));

        let mut c = HubConfig::from_toml_str(VALID).unwrap();
        c.battery_duration_secs = MAX_BATTERY_SECS;
        c.validate().unwrap();
    }

    #[test]
    fn test_load_from_missing_file_uses_env() {
        let dir = tempfile::tempdir().unwrap();
        let c = HubConfig::load_from(
            &dir.path().join("absent.toml"),
            env(&[("WARDEN_PIN", "222333"), ("WARDEN_ADMIN_PASSWORD", "pw")]),
        )
        .unwrap();
        assert_eq!(c.pin, "222333");
    }

    #[test]
    fn test_unknown_table_shape_is_parse_error() {
        assert!(matches!(
            HubConfig::from_toml_str("pin = 123456"),
            Err(ConfigError::Parse(_))
        ));
    }
}
