use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::classify::{DEFAULT_MODEL_PATH, DEFAULT_SCALER_PATH};
use crate::dataset::DEFAULT_DATASET_PATH;
use crate::ingest::{SerialConfig, MAX_POLL_TIMEOUT};
use crate::ingest::serial::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PORT};

const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_LABEL_KEYS: &str = "l=limon,p=platano,m=manzana,f=fondo";

#[derive(Debug, Deserialize, Default)]
struct SensorConfigFile {
    serial: Option<SerialConfigFile>,
    dataset_path: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    label_keys: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    port: Option<String>,
    baud_rate: Option<u32>,
    poll_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    model_path: Option<PathBuf>,
    scaler_path: Option<PathBuf>,
}

/// Label bound to a collection key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelKey {
    pub key: char,
    pub label: String,
}

/// Ordered key -> label map used in collection mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelKeys {
    entries: Vec<LabelKey>,
}

impl LabelKeys {
    /// Parse `k=label,k=label` pairs.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut entries: Vec<LabelKey> = Vec::new();
        for pair in split_csv(spec) {
            let (key, label) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("label key entry '{}' must look like k=label", pair))?;
            let mut chars = key.trim().chars();
            let key = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
                _ => {
                    return Err(anyhow!(
                        "label key '{}' must be a single ASCII letter or digit",
                        key.trim()
                    ))
                }
            };
            let label = label.trim().to_string();
            validate_label(&label)?;
            if entries.iter().any(|e| e.key == key) {
                return Err(anyhow!("label key '{}' is bound twice", key));
            }
            entries.push(LabelKey { key, label });
        }
        if entries.is_empty() {
            return Err(anyhow!("at least one label key is required"));
        }
        Ok(Self { entries })
    }

    pub fn label_for(&self, key: char) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.label.as_str())
    }

    pub fn entries(&self) -> &[LabelKey] {
        &self.entries
    }
}

impl Default for LabelKeys {
    fn default() -> Self {
        Self::parse(DEFAULT_LABEL_KEYS).unwrap_or(Self {
            entries: Vec::new(),
        })
    }
}

/// Label names are short lowercase identifiers so they survive the CSV format as-is.
pub fn validate_label(label: &str) -> Result<()> {
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| regex::Regex::new(r"^[a-z][a-z0-9_]{0,31}$").unwrap());
    if !re.is_match(label) {
        return Err(anyhow!(
            "invalid label '{}': expected lowercase letters, digits or '_' (max 32)",
            label
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub serial: SerialConfig,
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub label_keys: LabelKeys,
}

impl SensorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRUIT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SensorConfigFile) -> Result<Self> {
        let serial = SerialConfig {
            path: file
                .serial
                .as_ref()
                .and_then(|serial| serial.port.clone())
                .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
            baud_rate: file
                .serial
                .as_ref()
                .and_then(|serial| serial.baud_rate)
                .unwrap_or(DEFAULT_BAUD_RATE),
            poll_timeout: Duration::from_millis(
                file.serial
                    .as_ref()
                    .and_then(|serial| serial.poll_timeout_ms)
                    .unwrap_or(DEFAULT_POLL_TIMEOUT_MS),
            ),
            ..SerialConfig::default()
        };
        let model_path = file
            .model
            .as_ref()
            .and_then(|model| model.model_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let scaler_path = file
            .model
            .and_then(|model| model.scaler_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCALER_PATH));
        let label_keys = match file.label_keys {
            Some(spec) => LabelKeys::parse(&spec)?,
            None => LabelKeys::default(),
        };
        Ok(Self {
            serial,
            dataset_path: file
                .dataset_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_PATH)),
            model_path,
            scaler_path,
            label_keys,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("SERIAL_PORT") {
            if !port.trim().is_empty() {
                self.serial.path = port;
            }
        }
        if let Ok(baud) = std::env::var("BAUD_RATE") {
            self.serial.baud_rate = baud
                .trim()
                .parse()
                .map_err(|_| anyhow!("BAUD_RATE must be an integer, got '{}'", baud))?;
        }
        if let Ok(path) = std::env::var("CSV_FILE") {
            if !path.trim().is_empty() {
                self.dataset_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("SCALER_PATH") {
            if !path.trim().is_empty() {
                self.scaler_path = PathBuf::from(path);
            }
        }
        if let Ok(timeout) = std::env::var("POLL_TIMEOUT_MS") {
            let ms: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("POLL_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.serial.poll_timeout = Duration::from_millis(ms);
        }
        if let Ok(keys) = std::env::var("LABEL_KEYS") {
            if !keys.trim().is_empty() {
                self.label_keys = LabelKeys::parse(&keys)?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(anyhow!("baud rate must be greater than zero"));
        }
        if self.serial.poll_timeout.is_zero() || self.serial.poll_timeout > MAX_POLL_TIMEOUT {
            return Err(anyhow!(
                "poll timeout must be between 1 and {} ms",
                MAX_POLL_TIMEOUT.as_millis()
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SensorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_label_keys() {
        let keys = LabelKeys::default();
        assert_eq!(keys.label_for('l'), Some("limon"));
        assert_eq!(keys.label_for('p'), Some("platano"));
        assert_eq!(keys.label_for('m'), Some("manzana"));
        assert_eq!(keys.label_for('f'), Some("fondo"));
        assert_eq!(keys.label_for('x'), None);
        assert_eq!(keys.entries().len(), 4);
    }

    #[test]
    fn parses_custom_keys_case_insensitively() {
        let keys = LabelKeys::parse(" K = kiwi , n=naranja").unwrap();
        assert_eq!(keys.label_for('k'), Some("kiwi"));
        assert_eq!(keys.entries()[1].label, "naranja");
    }

    #[test]
    fn rejects_bad_label_keys() {
        assert!(LabelKeys::parse("").is_err());
        assert!(LabelKeys::parse("l").is_err());
        assert!(LabelKeys::parse("ll=limon").is_err());
        assert!(LabelKeys::parse("l=limon,l=lima").is_err());
        assert!(LabelKeys::parse("l=Limon").is_err());
        assert!(LabelKeys::parse("l=li,mon").is_err());
        assert!(LabelKeys::parse("?=limon").is_err());
    }

    #[test]
    fn file_defaults() {
        let cfg = SensorConfig::from_file(SensorConfigFile::default()).unwrap();
        assert_eq!(cfg.serial.path, "/dev/ttyUSB0");
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert_eq!(cfg.serial.poll_timeout, Duration::from_millis(100));
        assert_eq!(cfg.dataset_path, PathBuf::from("datos_colores.csv"));
        assert_eq!(cfg.model_path, PathBuf::from("modelo_red_neuronal.json"));
        assert_eq!(cfg.scaler_path, PathBuf::from("scaler.json"));
        cfg.validate().unwrap();
    }
}
