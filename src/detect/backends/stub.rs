use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Deterministic backend for tests and local runs without a model.
///
/// The image is decoded (undecodable bytes fail like they would with a real
/// model), then the detections scripted for its SHA-256 are returned. Images
/// with no script yield no detections.
#[derive(Default)]
pub struct StubBackend {
    script: HashMap<[u8; 32], Vec<Detection>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the detections reported for `image`.
    pub fn with_script(mut self, image: &[u8], detections: Vec<Detection>) -> Self {
        self.script.insert(image_digest(image), detections);
        self
    }

    /// Load a script file: a JSON object keyed by hex SHA-256 of the image.
    pub fn from_script_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stub script {}", path.display()))?;
        let entries: HashMap<String, Vec<Detection>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid stub script {}", path.display()))?;
        let mut script = HashMap::with_capacity(entries.len());
        for (key, detections) in entries {
            script.insert(parse_digest(&key)?, detections);
        }
        log::info!(
            "stub detector loaded {} scripted images from {}",
            script.len(),
            path.display()
        );
        Ok(Self { script })
    }

    pub fn scripted_images(&self) -> usize {
        self.script.len()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &[u8]) -> Result<Vec<Detection>> {
        if image.is_empty() {
            return Err(anyhow!("image is empty"));
        }
        let decoded = image::load_from_memory(image).context("cannot decode image")?;
        let (width, height) = decoded.dimensions();
        let digest = image_digest(image);
        log::debug!(
            "stub detector: {}x{} image sha256={}",
            width,
            height,
            hex::encode(digest)
        );
        Ok(self.script.get(&digest).cloned().unwrap_or_default())
    }
}

fn image_digest(image: &[u8]) -> [u8; 32] {
    Sha256::digest(image).into()
}

fn parse_digest(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim())
        .with_context(|| format!("stub script key '{}' is not hex", value))?;
    if bytes.len() != 32 {
        return Err(anyhow!("stub script key '{}' must be a sha256 digest", value));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn png(shade: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([shade, shade, shade]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn scripted_image_returns_its_detections() {
        let bottle = png(10);
        let mut backend = StubBackend::new().with_script(
            &bottle,
            vec![Detection::new("bottle", 0.9), Detection::new("battery", 0.8)],
        );

        let found = backend.detect(&bottle).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class, "bottle");

        let unscripted = backend.detect(&png(200)).unwrap();
        assert!(unscripted.is_empty());
    }

    #[test]
    fn undecodable_bytes_fail() {
        let mut backend = StubBackend::new();
        assert!(backend.detect(&[0xFF, 0xD8, 0xFF, 0xE0]).is_err());
        assert!(backend.detect(b"").is_err());
        assert!(backend.detect(b"not an image").is_err());
    }

    #[test]
    fn loads_script_file_keyed_by_digest() {
        let image = png(42);
        let key = hex::encode(image_digest(&image));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"{key}": [{{"class": "cup", "confidence": 0.7}}]}}"#
        )
        .unwrap();

        let mut backend = StubBackend::from_script_file(file.path()).unwrap();
        assert_eq!(backend.scripted_images(), 1);
        assert_eq!(
            backend.detect(&image).unwrap(),
            vec![Detection::new("cup", 0.7)]
        );
    }

    #[test]
    fn rejects_script_keys_that_are_not_digests() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"abcd": []}}"#).unwrap();
        assert!(StubBackend::from_script_file(file.path()).is_err());
    }
}
