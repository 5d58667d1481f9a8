use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use waste_classifier::config::ServiceConfig;
use waste_classifier::{BackendRegistry, ClassificationService, Recyclability};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WASTE_CONFIG",
        "WASTE_API_ADDR",
        "WASTE_MAX_UPLOAD_BYTES",
        "WASTE_DETECTOR",
        "WASTE_MODEL_PATH",
        "WASTE_CONFIDENCE",
        "WASTE_DETECT_TIMEOUT_MS",
        "WASTE_BATCH_WORKERS",
        "WASTE_KEYWORD_FALLBACK",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": {
            "addr": "0.0.0.0:9000",
            "max_upload_bytes": 1048576
        },
        "classifier": {
            "confidence_threshold": 0.3,
            "batch_workers": 2
        },
        "mappings": {
            "Pizza Box": "Compostable",
            "battery": "Non-Recyclable"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WASTE_CONFIG", file.path());
    std::env::set_var("WASTE_CONFIDENCE", "0.5");
    std::env::set_var("WASTE_DETECT_TIMEOUT_MS", "250");
    std::env::set_var("WASTE_KEYWORD_FALLBACK", "true");

    let cfg = ServiceConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.api_addr, "0.0.0.0:9000");
    assert_eq!(cfg.max_upload_bytes, 1024 * 1024);
    assert_eq!(cfg.classifier.confidence_threshold, 0.5);
    assert_eq!(cfg.classifier.batch_workers, 2);
    assert_eq!(
        cfg.classifier.detect_timeout,
        Some(Duration::from_millis(250))
    );
    assert!(cfg.classifier.keyword_fallback);

    let registry = BackendRegistry::from_settings(&cfg.detector).expect("registry");
    let service = ClassificationService::from_config(&cfg, &registry).expect("service");
    assert_eq!(service.default_threshold(), 0.5);
    assert_eq!(
        service.mappings().lookup("pizza   BOX"),
        Recyclability::Compostable
    );
    assert_eq!(
        service.mappings().lookup("battery"),
        Recyclability::NonRecyclable
    );
    // Keyword fallback resolves unmapped plastic items.
    assert_eq!(
        service.mappings().resolve("plastic lid"),
        Recyclability::Recyclable
    );
}

#[test]
fn rejects_malformed_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WASTE_BATCH_WORKERS", "many");
    let err = ServiceConfig::load().unwrap_err();
    clear_env();
    assert!(err.to_string().contains("WASTE_BATCH_WORKERS"));

    std::env::set_var("WASTE_DETECTOR", "quantum");
    let cfg = ServiceConfig::load().expect("unknown backends fail at registry time");
    clear_env();
    assert!(BackendRegistry::from_settings(&cfg.detector).is_err());
}

#[test]
fn defaults_without_environment() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServiceConfig::load().expect("defaults");
    assert_eq!(cfg.api_addr, "127.0.0.1:5000");
    assert_eq!(cfg.detector.backend, "stub");
    assert!(cfg.extra_mappings.is_empty());
}
