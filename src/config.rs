use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::classify::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::mapping::MappingRequest;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BATCH_WORKERS: usize = 4;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    mappings: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    confidence_threshold: Option<f32>,
    detect_timeout_ms: Option<u64>,
    batch_workers: Option<usize>,
    keyword_fallback: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub detector: DetectorSettings,
    pub classifier: ClassifierSettings,
    /// Extra class → verdict entries applied on top of the built-in table.
    pub extra_mappings: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Default backend name: `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR.to_string(),
            model_path: None,
            script_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub confidence_threshold: f32,
    /// `None` disables the per-image time budget.
    pub detect_timeout: Option<Duration>,
    pub batch_workers: usize,
    pub keyword_fallback: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            detect_timeout: Some(Duration::from_millis(DEFAULT_DETECT_TIMEOUT_MS)),
            batch_workers: DEFAULT_BATCH_WORKERS,
            keyword_fallback: false,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Load from `WASTE_CONFIG` (if set), then apply `WASTE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WASTE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => ServiceConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();
        let defaults = ClassifierSettings::default();

        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                model_path: detector.model_path,
                script_path: detector.script_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
            classifier: ClassifierSettings {
                confidence_threshold: classifier
                    .confidence_threshold
                    .unwrap_or(defaults.confidence_threshold),
                detect_timeout: match classifier.detect_timeout_ms {
                    Some(ms) => timeout_from_ms(ms),
                    None => defaults.detect_timeout,
                },
                batch_workers: classifier.batch_workers.unwrap_or(defaults.batch_workers),
                keyword_fallback: classifier
                    .keyword_fallback
                    .unwrap_or(defaults.keyword_fallback),
            },
            extra_mappings: file.mappings.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("WASTE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Some(bytes) = env_parse::<usize>("WASTE_MAX_UPLOAD_BYTES")? {
            self.max_upload_bytes = bytes;
        }
        if let Ok(backend) = std::env::var("WASTE_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("WASTE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Some(threshold) = env_parse::<f32>("WASTE_CONFIDENCE")? {
            self.classifier.confidence_threshold = threshold;
        }
        if let Some(ms) = env_parse::<u64>("WASTE_DETECT_TIMEOUT_MS")? {
            self.classifier.detect_timeout = timeout_from_ms(ms);
        }
        if let Some(workers) = env_parse::<usize>("WASTE_BATCH_WORKERS")? {
            self.classifier.batch_workers = workers;
        }
        if let Some(enabled) = env_parse::<bool>("WASTE_KEYWORD_FALLBACK")? {
            self.classifier.keyword_fallback = enabled;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within [0, 1], got {}",
                self.classifier.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!(
                "iou_threshold must be within [0, 1], got {}",
                self.detector.iou_threshold
            ));
        }
        if self.classifier.batch_workers == 0 {
            return Err(anyhow!("batch_workers must be at least 1"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!(
                "detector backend 'tract' requires model_path (or WASTE_MODEL_PATH)"
            ));
        }
        for (class, verdict) in &self.extra_mappings {
            MappingRequest::new(class.as_str(), verdict.as_str())
                .validate()
                .map_err(|e| anyhow!("invalid mapping for '{}': {}", class, e))?;
        }
        Ok(())
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, raw)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = ServiceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.api_addr, "127.0.0.1:5000");
        assert_eq!(cfg.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.classifier.confidence_threshold, 0.25);
        assert_eq!(cfg.classifier.detect_timeout, Some(Duration::from_secs(30)));
        assert!(!cfg.classifier.keyword_fallback);
    }

    #[test]
    fn reads_toml_files() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[api]
addr = "0.0.0.0:8080"

[classifier]
confidence_threshold = 0.4
detect_timeout_ms = 0
keyword_fallback = true

[mappings]
"pizza box" = "Compostable"
"#
        )
        .unwrap();

        let cfg = ServiceConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.api_addr, "0.0.0.0:8080");
        assert_eq!(cfg.classifier.confidence_threshold, 0.4);
        assert_eq!(cfg.classifier.detect_timeout, None);
        assert!(cfg.classifier.keyword_fallback);
        assert_eq!(cfg.extra_mappings["pizza box"], "Compostable");
    }

    #[test]
    fn rejects_invalid_extra_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mappings": {{"widget": "Hazardous"}}}}"#).unwrap();
        let err = ServiceConfig::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"classifier": {{"confidence_threshold": 1.5}}}}"#).unwrap();
        assert!(ServiceConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn tract_requires_model_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"detector": {{"backend": "tract"}}}}"#).unwrap();
        let err = ServiceConfig::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("model_path"));
    }
}
