use anyhow::Result;

use crate::detect::result::Detection;

/// Object detector backend.
///
/// A backend receives encoded image bytes exactly as uploaded (PNG, JPEG, GIF)
/// and reports the objects it found. Any error returned from `detect` is
/// treated as a failure of that one image, never of the service.
///
/// Backends may keep state between calls (model sessions, scratch buffers),
/// hence `&mut self`; callers serialize access through a `Mutex`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one encoded image.
    ///
    /// The returned order is preserved all the way to the API response.
    fn detect(&mut self, image: &[u8]) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
