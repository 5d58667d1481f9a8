use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::classify::{BatchClassifier, ClassificationResult, Classifier};
use crate::config::ServiceConfig;
use crate::detect::BackendRegistry;
use crate::mapping::{Mapping, MappingStore, Recyclability};
use crate::ValidationError;

/// Owns the shared mapping store and the classifiers built on it.
///
/// The API server and the CLI only talk to this type.
pub struct ClassificationService {
    mappings: Arc<MappingStore>,
    classifier: Arc<Classifier>,
    batch: BatchClassifier,
}

impl ClassificationService {
    pub fn new(classifier: Classifier, batch_workers: usize) -> Self {
        let classifier = Arc::new(classifier);
        Self {
            mappings: classifier.mappings().clone(),
            batch: BatchClassifier::new(classifier.clone()).with_workers(batch_workers),
            classifier,
        }
    }

    /// Build the store, apply configured extra mappings and wire the default
    /// detector from `registry`.
    pub fn from_config(cfg: &ServiceConfig, registry: &BackendRegistry) -> Result<Self> {
        let store = MappingStore::new().with_keyword_fallback(cfg.classifier.keyword_fallback);
        for (class, verdict) in &cfg.extra_mappings {
            let mapping = store
                .insert(class, verdict)
                .map_err(|e| anyhow!("invalid configured mapping for '{}': {}", class, e))?;
            log::info!(
                "configured mapping: {} -> {}",
                mapping.object_class,
                mapping.recyclability
            );
        }

        let detector = registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let classifier = Classifier::new(Arc::new(store), detector)
            .with_confidence_threshold(cfg.classifier.confidence_threshold)
            .with_detect_timeout(cfg.classifier.detect_timeout);
        Ok(Self::new(classifier, cfg.classifier.batch_workers))
    }

    pub fn mappings(&self) -> &Arc<MappingStore> {
        &self.mappings
    }

    pub fn default_threshold(&self) -> f32 {
        self.classifier.confidence_threshold()
    }

    pub fn classify(&self, image: &[u8], threshold: Option<f32>) -> ClassificationResult {
        let threshold = threshold.unwrap_or_else(|| self.default_threshold());
        self.classifier.classify_with_threshold(image, threshold)
    }

    pub fn classify_batch<I>(&self, images: &[I], threshold: Option<f32>) -> Vec<ClassificationResult>
    where
        I: AsRef<[u8]> + Sync,
    {
        let threshold = threshold.unwrap_or_else(|| self.default_threshold());
        self.batch.classify_batch_with_threshold(images, threshold)
    }

    pub fn categories(&self) -> Vec<Recyclability> {
        self.mappings.categories()
    }

    pub fn supported_objects(&self) -> Vec<String> {
        self.mappings.supported_objects()
    }

    pub fn mapping_table(&self) -> BTreeMap<String, Recyclability> {
        self.mappings.snapshot()
    }

    /// Add or override a mapping. Invalid input leaves the store untouched.
    pub fn add_mapping(&self, class: &str, verdict: &str) -> Result<Mapping, ValidationError> {
        match self.mappings.insert(class, verdict) {
            Ok(mapping) => {
                log::info!(
                    "Added mapping: {} -> {}",
                    mapping.object_class,
                    mapping.recyclability
                );
                Ok(mapping)
            }
            Err(err) => {
                log::warn!("rejected mapping for '{}': {}", class, err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorSettings;

    fn service(cfg: &ServiceConfig) -> ClassificationService {
        let registry = BackendRegistry::from_settings(&DetectorSettings::default()).unwrap();
        ClassificationService::from_config(cfg, &registry).unwrap()
    }

    #[test]
    fn applies_configured_mappings_and_fallback() {
        let mut cfg = ServiceConfig::default();
        cfg.classifier.keyword_fallback = true;
        cfg.extra_mappings
            .insert("Pizza Box".to_string(), "Compostable".to_string());

        let svc = service(&cfg);
        assert_eq!(svc.mappings().lookup("pizza box"), Recyclability::Compostable);
        assert!(svc.mappings().keyword_fallback());
        assert!(svc.supported_objects().contains(&"pizza box".to_string()));
    }

    #[test]
    fn add_mapping_validates_before_committing() {
        let svc = service(&ServiceConfig::default());
        let mapping = svc.add_mapping("test_object", "Recyclable").unwrap();
        assert_eq!(mapping.recyclability, Recyclability::Recyclable);

        assert!(svc.add_mapping("test_object", "InvalidCategory").is_err());
        assert_eq!(
            svc.mapping_table().get("test_object"),
            Some(&Recyclability::Recyclable)
        );
        assert_eq!(svc.categories(), Recyclability::ALL.to_vec());
    }

    #[test]
    fn explicit_threshold_overrides_default() {
        let svc = service(&ServiceConfig::default());
        assert_eq!(svc.default_threshold(), 0.25);
        let result = svc.classify(b"not an image", Some(0.5));
        assert!(!result.is_success());
        let results = svc.classify_batch(&[b"x".as_slice(), b"y".as_slice()], None);
        assert_eq!(results.len(), 2);
    }
}
