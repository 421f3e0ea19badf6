//! Adapter around the external face detection / embedding engine
//!
//! The engine itself is a synchronous, CPU-bound black box. [`EmbeddingWorker`]
//! builds it once on first use and runs every inference on the blocking pool,
//! with at most `workers` inferences in flight.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

use crate::error::{BiometricError, BiometricResult, bounded};
use crate::models::BoundingBox;

/// One face found by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub embedding: Vec<f32>,
    pub bbox: BoundingBox,
    pub det_score: f32,
}

/// Face detection and embedding backend
#[cfg_attr(test, mockall::automock)]
pub trait FaceEmbedder: Send + Sync {
    /// Every face in the image; empty when there is none
    fn detect(&self, image: &RgbImage) -> BiometricResult<Vec<DetectedFace>>;
}

/// Builds the engine; called at most once per worker
pub type EmbedderFactory = Arc<dyn Fn() -> BiometricResult<Arc<dyn FaceEmbedder>> + Send + Sync>;

/// Decode PNG/JPEG bytes into an RGB frame
pub fn decode_image(bytes: &[u8]) -> BiometricResult<RgbImage> {
    if bytes.is_empty() {
        return Err(BiometricError::InvalidInput("image is empty".to_string()));
    }

    let image = image::load_from_memory(bytes).map_err(|e| {
        debug!(error = %e, "Image decode failed");
        BiometricError::InvalidInput("failed to decode image".to_string())
    })?;
    Ok(image.to_rgb8())
}

/// Pick the canonical face: the one with the largest box
pub fn largest_face(faces: Vec<DetectedFace>) -> Option<DetectedFace> {
    faces.into_iter().fold(None, |best, face| match best {
        Some(best) if best.bbox.area() >= face.bbox.area() => Some(best),
        _ => Some(face),
    })
}

fn worker_crashed(e: tokio::task::JoinError) -> BiometricError {
    BiometricError::Internal(format!("embedding worker crashed: {}", e))
}

#[derive(Clone)]
pub struct EmbeddingWorker {
    factory: EmbedderFactory,
    engine: Arc<OnceCell<Arc<dyn FaceEmbedder>>>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl EmbeddingWorker {
    pub fn new(factory: EmbedderFactory, workers: usize, timeout: Duration) -> Self {
        Self {
            factory,
            engine: Arc::new(OnceCell::new()),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Wrap an engine that is already constructed
    pub fn from_engine(engine: Arc<dyn FaceEmbedder>, workers: usize, timeout: Duration) -> Self {
        let factory_engine = Arc::clone(&engine);
        let worker = Self::new(
            Arc::new(move || Ok(Arc::clone(&factory_engine))),
            workers,
            timeout,
        );
        // a fresh cell cannot already be set
        let _ = worker.engine.set(engine);
        worker
    }

    /// The engine, built on first use
    ///
    /// Construction runs in its own task and fills the cell even when every
    /// caller waiting on it has timed out, so a slow load is never restarted.
    async fn engine(&self) -> BiometricResult<Arc<dyn FaceEmbedder>> {
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        let cell = Arc::clone(&self.engine);
        let factory = Arc::clone(&self.factory);
        let loading = tokio::spawn(async move {
            cell.get_or_try_init(|| async move {
                info!("Loading face embedding engine");
                tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(worker_crashed)?
            })
            .await
            .map(Arc::clone)
        });

        loading.await.map_err(worker_crashed)?
    }

    /// Decode on the blocking pool
    pub async fn decode(&self, bytes: &[u8]) -> BiometricResult<RgbImage> {
        let bytes = bytes.to_vec();
        bounded("image decode", self.timeout, async move {
            tokio::task::spawn_blocking(move || decode_image(&bytes))
                .await
                .map_err(worker_crashed)?
        })
        .await
    }

    /// Run the engine on a decoded frame
    pub async fn detect(&self, image: Arc<RgbImage>) -> BiometricResult<Vec<DetectedFace>> {
        bounded("embedding engine", self.timeout, async {
            let engine = self.engine().await?;
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| BiometricError::Internal("embedding worker pool closed".to_string()))?;

            // the permit is held until inference finishes, even if the caller gives up
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                engine.detect(&image)
            })
            .await
            .map_err(worker_crashed)?
        })
        .await
    }

    /// Embedding of the largest face in the frame
    ///
    /// Fails with [`BiometricError::DetectionFailure`] when there is no face.
    pub async fn embed(&self, image: Arc<RgbImage>) -> BiometricResult<DetectedFace> {
        let faces = self.detect(image).await?;
        let count = faces.len();
        let face = largest_face(faces)
            .ok_or_else(|| BiometricError::DetectionFailure("no face detected".to_string()))?;

        debug!(faces = count, det_score = face.det_score, "Selected face");
        Ok(face)
    }
}
