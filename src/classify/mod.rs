//! Single-image and batch classification.
//!
//! `Classifier` turns detector output into a `ClassificationResult` for one
//! image; `BatchClassifier` fans a list of images out over worker threads and
//! returns one result per image, in input order.

mod batch;
mod result;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::{Detection, DetectorBackend, SharedBackend};
use crate::mapping::MappingStore;

pub use batch::BatchClassifier;
pub use result::{
    Assessment, ClassificationReport, ClassificationResult, ClassificationSummary, DetectedObject,
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Classifies one image at a time against a shared mapping store.
pub struct Classifier {
    mappings: Arc<MappingStore>,
    detector: SharedBackend,
    confidence_threshold: f32,
    detect_timeout: Option<Duration>,
    /// Set while an abandoned detector call still holds the backend.
    stalled: Arc<AtomicBool>,
}

impl Classifier {
    pub fn new(mappings: Arc<MappingStore>, detector: SharedBackend) -> Self {
        Self {
            mappings,
            detector,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            detect_timeout: None,
            stalled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Default threshold used by `classify`.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Time budget for one detector call. `None` waits indefinitely.
    pub fn with_detect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.detect_timeout = timeout;
        self
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn mappings(&self) -> &Arc<MappingStore> {
        &self.mappings
    }

    pub fn classify(&self, image: &[u8]) -> ClassificationResult {
        self.classify_with_threshold(image, self.confidence_threshold)
    }

    /// Classify one image. Detector failures and a threshold outside [0, 1]
    /// come back as `ClassificationResult::Error`.
    pub fn classify_with_threshold(&self, image: &[u8], threshold: f32) -> ClassificationResult {
        if !(0.0..=1.0).contains(&threshold) {
            return ClassificationResult::error(format!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        let detections = match self.run_detector(image).and_then(check_confidences) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("detection failed: {:#}", err);
                return ClassificationResult::error(format!("{:#}", err));
            }
        };

        let objects: Vec<DetectedObject> = detections
            .into_iter()
            .filter(|detection| detection.confidence >= threshold)
            .map(|detection| {
                let verdict = self.mappings.resolve(&detection.class);
                DetectedObject::new(detection, verdict)
            })
            .collect();

        let report = ClassificationReport::new(objects, threshold);
        log::debug!(
            "classified image: {} objects ({} recyclable, {} unknown)",
            report.summary().total,
            report.summary().recyclable,
            report.summary().unknown
        );
        ClassificationResult::Success(report)
    }

    fn run_detector(&self, image: &[u8]) -> Result<Vec<Detection>> {
        match self.detect_timeout {
            Some(budget) => self.run_detector_timed(image, budget),
            None => {
                let mut backend = lock_detector(&self.detector);
                detect_guarded(&mut *backend, image)
            }
        }
    }

    // The budget starts once the helper holds the detector, so time spent
    // queued behind other images is not charged to this one.
    fn run_detector_timed(&self, image: &[u8], budget: Duration) -> Result<Vec<Detection>> {
        if self.stalled.load(Ordering::SeqCst) {
            return Err(detector_busy());
        }

        let state = Arc::new(Mutex::new(CallState::Queued));
        let (started_tx, started_rx) = mpsc::channel();
        let (finished_tx, finished_rx) = mpsc::channel();
        let call = DetectorCall {
            detector: self.detector.clone(),
            state: state.clone(),
            stalled: self.stalled.clone(),
            image: image.to_vec(),
            started: started_tx,
            finished: finished_tx,
        };
        std::thread::Builder::new()
            .name("detector".to_string())
            .spawn(move || call.run())?;

        loop {
            match started_rx.recv_timeout(QUEUE_POLL) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.stalled.load(Ordering::SeqCst) {
                        let mut state = lock_state(&state);
                        if *state == CallState::Queued {
                            *state = CallState::Abandoned;
                            return Err(detector_busy());
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("detector stopped without producing a result"))
                }
            }
        }

        match finished_rx.recv_timeout(budget) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                let mut current = lock_state(&state);
                if *current == CallState::Done {
                    drop(current);
                    return finished_rx.recv().unwrap_or_else(|_| {
                        Err(anyhow!("detector stopped without producing a result"))
                    });
                }
                *current = CallState::Abandoned;
                self.stalled.store(true, Ordering::SeqCst);
                log::warn!(
                    "detector exceeded {} ms; refusing new images until it returns",
                    budget.as_millis()
                );
                Err(anyhow!(
                    "detection exceeded time budget of {} ms",
                    budget.as_millis()
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("detector stopped without producing a result"))
            }
        }
    }
}

const QUEUE_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallState {
    Queued,
    Running,
    Done,
    Abandoned,
}

/// One timed detector call, run on its own helper thread.
struct DetectorCall {
    detector: SharedBackend,
    state: Arc<Mutex<CallState>>,
    stalled: Arc<AtomicBool>,
    image: Vec<u8>,
    started: Sender<()>,
    finished: Sender<Result<Vec<Detection>>>,
}

impl DetectorCall {
    fn run(self) {
        let mut backend = lock_detector(&self.detector);
        {
            let mut state = lock_state(&self.state);
            if *state == CallState::Abandoned {
                return;
            }
            *state = CallState::Running;
        }
        let _ = self.started.send(());

        let outcome = detect_guarded(&mut *backend, &self.image);
        drop(backend);

        let mut state = lock_state(&self.state);
        if *state == CallState::Abandoned {
            // Stalled is only ever set by the caller that abandoned a running call.
            self.stalled.store(false, Ordering::SeqCst);
            log::info!("overdue detector call finished; accepting images again");
            return;
        }
        *state = CallState::Done;
        drop(state);
        let _ = self.finished.send(outcome);
    }
}

fn detector_busy() -> anyhow::Error {
    anyhow!("detector is busy with an earlier image that exceeded its time budget")
}

// The guard stays outside the unwind boundary, so a panicking backend does
// not poison its mutex.
fn detect_guarded(backend: &mut dyn DetectorBackend, image: &[u8]) -> Result<Vec<Detection>> {
    panic::catch_unwind(AssertUnwindSafe(|| backend.detect(image)))
        .unwrap_or_else(|_| Err(anyhow!("detector panicked while processing the image")))
}

fn lock_state(state: &Mutex<CallState>) -> MutexGuard<'_, CallState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// A poisoned lock still holds a usable backend; the next image gets a fresh
// attempt so one bad input cannot take the detector out.
fn lock_detector(detector: &SharedBackend) -> MutexGuard<'_, dyn DetectorBackend + 'static> {
    detector.lock().unwrap_or_else(|poisoned| {
        log::warn!("detector panicked during an earlier call; continuing");
        poisoned.into_inner()
    })
}

fn check_confidences(detections: Vec<Detection>) -> Result<Vec<Detection>> {
    if let Some(bad) = detections
        .iter()
        .find(|d| !(0.0..=1.0).contains(&d.confidence))
    {
        return Err(anyhow!(
            "detector reported confidence {} for '{}', expected a value in [0, 1]",
            bad.confidence,
            bad.class
        ));
    }
    Ok(detections)
}
