use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use super::{ClassificationResult, Classifier};

pub const DEFAULT_BATCH_WORKERS: usize = 4;

/// Runs a `Classifier` over many images with per-image failure isolation.
///
/// Workers pull the next index from a shared counter, so a slow image only
/// occupies one worker. Results are written back by index, which keeps the
/// output in input order whatever the completion order was.
pub struct BatchClassifier {
    classifier: Arc<Classifier>,
    workers: usize,
}

impl BatchClassifier {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self {
            classifier,
            workers: DEFAULT_BATCH_WORKERS,
        }
    }

    /// Maximum number of images classified at once. Clamped to at least one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn classify_batch<I>(&self, images: &[I]) -> Vec<ClassificationResult>
    where
        I: AsRef<[u8]> + Sync,
    {
        self.classify_batch_with_threshold(images, self.classifier.confidence_threshold())
    }

    /// Classify every image; the output has exactly one entry per input.
    pub fn classify_batch_with_threshold<I>(
        &self,
        images: &[I],
        threshold: f32,
    ) -> Vec<ClassificationResult>
    where
        I: AsRef<[u8]> + Sync,
    {
        let mut slots: Vec<Option<ClassificationResult>> = vec![None; images.len()];
        if images.is_empty() {
            return Vec::new();
        }

        let workers = self.workers.min(images.len());
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        let classifier = self.classifier.as_ref();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(image) = images.get(index) else {
                        break;
                    };
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        classifier.classify_with_threshold(image.as_ref(), threshold)
                    }))
                    .unwrap_or_else(|_| {
                        log::error!("classification of batch image {} panicked", index);
                        ClassificationResult::error("classification failed unexpectedly")
                    });
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);
            for (index, result) in rx {
                slots[index] = Some(result);
            }
        });

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    ClassificationResult::error(format!("image {} produced no result", index))
                })
            })
            .collect()
    }
}
