//! classifier_api - HTTP service for the recyclable waste classifier
//!
//! This daemon:
//! 1. Loads configuration (`WASTE_CONFIG` file + `WASTE_*` overrides)
//! 2. Builds the detector backend and mapping store
//! 3. Serves the classification API until Ctrl-C

use anyhow::{Context, Result};
use std::sync::{mpsc, Arc};

use waste_classifier::{
    api::{ApiConfig, ApiServer},
    BackendRegistry, ClassificationService, ServiceConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    let registry = BackendRegistry::from_settings(&config.detector)
        .context("failed to initialize detector backend")?;
    log::info!(
        "detector backends: {:?} (default: {})",
        registry.list(),
        registry.default_name().unwrap_or("none")
    );

    let service = Arc::new(ClassificationService::from_config(&config, &registry)?);
    log::info!(
        "loaded {} object mappings (keyword fallback {})",
        service.mappings().len(),
        if config.classifier.keyword_fallback {
            "on"
        } else {
            "off"
        }
    );

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let api_handle = ApiServer::new(api_config, service).spawn()?;
    log::info!("classifier api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("classifier_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
