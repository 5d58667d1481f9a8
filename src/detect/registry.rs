use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Shared handle to a detector backend.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build the registry described by the detector settings.
    ///
    /// The stub backend is always registered; the configured backend becomes
    /// the default.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        let stub = match &settings.script_path {
            Some(path) => StubBackend::from_script_file(path)?,
            None => StubBackend::new(),
        };
        registry.register(stub);

        match settings.backend.as_str() {
            "stub" => {}
            "tract" => registry.register_tract(settings)?,
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        registry.set_default(&settings.backend)?;
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_tract(&mut self, settings: &DetectorSettings) -> Result<()> {
        let model_path = settings
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
        let mut backend = super::backends::TractBackend::new(model_path, settings.input_size)?
            .with_iou_threshold(settings.iou_threshold);
        backend.warm_up()?;
        log::info!("loaded ONNX detector from {}", model_path.display());
        self.register(backend);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_tract(&mut self, _settings: &DetectorSettings) -> Result<()> {
        Err(anyhow!(
            "detector backend 'tract' requires building with --features backend-tract"
        ))
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
