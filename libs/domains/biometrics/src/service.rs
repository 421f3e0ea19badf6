use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::BiometricConfig;
use crate::engine::{DetectedFace, EmbeddingWorker};
use crate::enrollment::EnrollmentStore;
use crate::error::{BiometricError, BiometricResult};
use crate::liveness::{self, LivenessFailure, LivenessReport};
use crate::matcher::{self, SearchOutcome};
use crate::models::{
    CompareOutcome, DeleteOutcome, EMBEDDING_DIM, EncodeOutcome, EnrollOutcome, EnrollmentSummary, FaceSummary,
    IdentifyOutcome, TenantId, UserId, VerifyOutcome, VerifyReason,
};
use crate::tenant::TenantRegistry;

/// Per-request overrides of the configured verification thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VerifyOptions {
    pub threshold: Option<f64>,
    pub min_face_ratio: Option<f64>,
    pub min_det_score: Option<f64>,
}

/// Enroll, identify and verify workflows
#[derive(Clone)]
pub struct FaceService {
    registry: TenantRegistry,
    enrollments: EnrollmentStore,
    engine: EmbeddingWorker,
    config: BiometricConfig,
}

impl FaceService {
    pub fn new(
        registry: TenantRegistry,
        enrollments: EnrollmentStore,
        engine: EmbeddingWorker,
        config: BiometricConfig,
    ) -> Self {
        Self {
            registry,
            enrollments,
            engine,
            config,
        }
    }

    async fn embed(&self, image: &[u8]) -> BiometricResult<DetectedFace> {
        let frame = self.engine.decode(image).await?;
        self.engine.embed(Arc::new(frame)).await
    }

    /// Like `embed`, but an embedding of the wrong size is an engine fault
    async fn embed_full(&self, image: &[u8]) -> BiometricResult<DetectedFace> {
        let face = self.embed(image).await?;
        if face.embedding.len() != EMBEDDING_DIM {
            return Err(BiometricError::Internal(format!(
                "engine returned a {}-dimensional embedding, expected {}",
                face.embedding.len(),
                EMBEDDING_DIM
            )));
        }
        Ok(face)
    }

    /// Store a new enrollment for the user, replacing any previous one
    #[instrument(skip(self, image), fields(tenant_id = tenant_id, user_id = user_id))]
    pub async fn enroll(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        label: &str,
        image: &[u8],
    ) -> BiometricResult<EnrollOutcome> {
        self.registry.get_config(tenant_id).await?;

        let label = label.trim();
        if label.is_empty() {
            return Err(BiometricError::InvalidInput("label must not be empty".to_string()));
        }

        let face = self.embed_full(image).await?;

        let record = self
            .enrollments
            .add(tenant_id, user_id, label, &face.embedding)
            .await?;
        let count = self.enrollments.list(tenant_id).await?.len();

        info!(enrollment_id = record.id, count, "Enrolled user");
        Ok(EnrollOutcome {
            tenant_id,
            stored: EnrollmentSummary::from(&record),
            count,
        })
    }

    /// Find the closest enrolled user in the tenant's gallery
    #[instrument(skip(self, image), fields(tenant_id = tenant_id))]
    pub async fn identify(
        &self,
        tenant_id: TenantId,
        image: &[u8],
        threshold: Option<f64>,
    ) -> BiometricResult<IdentifyOutcome> {
        let threshold = threshold.unwrap_or(self.config.match_threshold);
        self.registry.get_config(tenant_id).await?;

        let gallery = self.enrollments.list(tenant_id).await?;
        if gallery.is_empty() {
            return Err(BiometricError::NotFound(format!(
                "gallery empty for tenant {}",
                tenant_id
            )));
        }

        let face = self.embed(image).await?;
        let best = match matcher::search(&face.embedding, &gallery.records) {
            SearchOutcome::Found(best) => best,
            SearchOutcome::Empty => {
                return Err(BiometricError::NotFound(format!(
                    "gallery empty for tenant {}",
                    tenant_id
                )));
            }
            SearchOutcome::AllIncompatible { skipped } => {
                return Err(BiometricError::Incompatible(format!(
                    "none of the {} enrollments match the {}-dimensional probe",
                    skipped,
                    face.embedding.len()
                )));
            }
        };

        let matched = matcher::is_match(best.distance, threshold);
        info!(
            matched,
            user_id = best.record.user_id,
            distance = best.distance,
            "Identification finished"
        );

        Ok(IdentifyOutcome {
            tenant_id,
            matched,
            name: best.record.label.clone(),
            user_id: best.record.user_id,
            enrollment_id: best.record.id,
            distance: best.distance,
            threshold,
            count: gallery.len(),
            skipped: best.skipped,
            bbox: face.bbox,
        })
    }

    /// One-to-one check of a capture against the user's enrollment
    ///
    /// Known negative outcomes come back as `Ok` with `verified = false`;
    /// only an unknown tenant, a malformed image or an infrastructure failure
    /// is an `Err`.
    #[instrument(skip(self, image), fields(tenant_id = tenant_id, user_id = user_id))]
    pub async fn verify(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        image: &[u8],
        options: VerifyOptions,
    ) -> BiometricResult<VerifyOutcome> {
        let threshold = options.threshold.unwrap_or(self.config.match_threshold);
        let min_face_ratio = options.min_face_ratio.unwrap_or(self.config.min_face_ratio);
        let min_det_score = options.min_det_score.unwrap_or(self.config.min_det_score);

        self.registry.get_config(tenant_id).await?;

        let Some(enrollment) = self.enrollments.find_by_user(tenant_id, user_id).await? else {
            return Ok(VerifyOutcome::new(
                VerifyReason::NotEnrolled,
                format!("User {} is not enrolled", user_id),
                tenant_id,
                user_id,
            ));
        };

        let frame = Arc::new(self.engine.decode(image).await?);
        let (frame_width, frame_height) = frame.dimensions();

        let soft = |reason: VerifyReason, message: String| {
            let mut outcome = VerifyOutcome::new(reason, message, tenant_id, user_id);
            outcome.user_name = Some(enrollment.label.clone());
            outcome.enrollment_id = Some(enrollment.id);
            outcome
        };

        let face = match self.engine.embed(frame).await {
            Ok(face) => face,
            Err(BiometricError::DetectionFailure(_)) => {
                let mut outcome = soft(
                    VerifyReason::NoFaceDetected,
                    "No face detected in the image".to_string(),
                );
                outcome.liveness = Some(LivenessReport::no_face());
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let check = liveness::evaluate(
            &face.bbox,
            face.det_score,
            frame_width,
            frame_height,
            min_face_ratio,
            min_det_score,
        );

        if let Some(failure) = check.failure() {
            let reason = match failure {
                LivenessFailure::FaceTooSmall => VerifyReason::FaceTooSmall,
                LivenessFailure::LowDetectionScore => VerifyReason::LowDetectionScore,
            };
            info!(%reason, face_ratio = check.face_ratio, det_score = check.det_score, "Liveness check failed");

            let mut outcome = soft(reason, check.failure_message().unwrap_or_default());
            outcome.bbox = Some(face.bbox);
            outcome.liveness = Some(check.into());
            return Ok(outcome);
        }

        if !enrollment.is_compatible_with(&face.embedding) {
            let mut outcome = soft(
                VerifyReason::IncompatibleEncoding,
                "Stored enrollment is incompatible with the current face model, please re-enroll".to_string(),
            );
            outcome.bbox = Some(face.bbox);
            outcome.liveness = Some(check.into());
            return Ok(outcome);
        }

        let distance = matcher::cosine_distance(&face.embedding, &enrollment.embedding);
        let (reason, message) = if matcher::is_match(distance, threshold) {
            (VerifyReason::Matched, "Face verified")
        } else {
            (VerifyReason::NotMatched, "Face does not match the enrolled user")
        };
        info!(%reason, distance, threshold, "Verification finished");

        let mut outcome = soft(reason, message.to_string());
        outcome.distance = Some(distance);
        outcome.threshold = Some(threshold);
        outcome.bbox = Some(face.bbox);
        outcome.liveness = Some(check.into());
        Ok(outcome)
    }

    #[instrument(skip(self), fields(tenant_id = tenant_id))]
    pub async fn list_enrollments(&self, tenant_id: TenantId) -> BiometricResult<Vec<EnrollmentSummary>> {
        self.registry.get_config(tenant_id).await?;
        let gallery = self.enrollments.list(tenant_id).await?;
        Ok(gallery.records.iter().map(EnrollmentSummary::from).collect())
    }

    #[instrument(skip(self), fields(tenant_id = tenant_id))]
    pub async fn delete_enrollment(&self, tenant_id: TenantId, enrollment_id: i64) -> BiometricResult<DeleteOutcome> {
        self.registry.get_config(tenant_id).await?;

        if !self.enrollments.delete_by_id(tenant_id, enrollment_id).await? {
            return Err(BiometricError::NotFound(format!(
                "enrollment {} not found in tenant {}",
                enrollment_id, tenant_id
            )));
        }

        let count = self.enrollments.list(tenant_id).await?.len();
        Ok(DeleteOutcome {
            tenant_id,
            deleted: enrollment_id.to_string(),
            count,
        })
    }

    /// Delete every enrollment carrying `label`
    #[instrument(skip(self), fields(tenant_id = tenant_id))]
    pub async fn delete_enrollment_by_label(&self, tenant_id: TenantId, label: &str) -> BiometricResult<DeleteOutcome> {
        self.registry.get_config(tenant_id).await?;

        if !self.enrollments.delete_by_label(tenant_id, label).await? {
            return Err(BiometricError::NotFound(format!(
                "no enrollment labelled '{}' in tenant {}",
                label, tenant_id
            )));
        }

        let count = self.enrollments.list(tenant_id).await?.len();
        Ok(DeleteOutcome {
            tenant_id,
            deleted: label.to_string(),
            count,
        })
    }

    /// Compare a capture against a caller-supplied embedding
    #[instrument(skip_all)]
    pub async fn compare(
        &self,
        image: &[u8],
        target: &[f32],
        threshold: Option<f64>,
    ) -> BiometricResult<CompareOutcome> {
        if target.len() != EMBEDDING_DIM {
            return Err(BiometricError::InvalidInput(format!(
                "target embedding must have {} values, got {}",
                EMBEDDING_DIM,
                target.len()
            )));
        }
        let threshold = threshold.unwrap_or(self.config.match_threshold);

        let face = self.embed(image).await?;
        if face.embedding.len() != target.len() {
            return Err(BiometricError::Incompatible(format!(
                "candidate embedding has {} values, target has {}",
                face.embedding.len(),
                target.len()
            )));
        }

        let distance = matcher::cosine_distance(&face.embedding, target);
        Ok(CompareOutcome {
            matched: matcher::is_match(distance, threshold),
            distance,
            threshold,
            bbox: face.bbox,
        })
    }

    /// Embedding of the largest face in the image
    #[instrument(skip_all)]
    pub async fn encode(&self, image: &[u8]) -> BiometricResult<EncodeOutcome> {
        let face = self.embed_full(image).await?;

        Ok(EncodeOutcome {
            embedding: face.embedding,
            bbox: face.bbox,
            det_score: face.det_score,
        })
    }

    /// Every face in the image, without embeddings
    #[instrument(skip_all)]
    pub async fn detect(&self, image: &[u8]) -> BiometricResult<Vec<FaceSummary>> {
        let frame = self.engine.decode(image).await?;
        let faces = self.engine.detect(Arc::new(frame)).await?;

        Ok(faces
            .into_iter()
            .map(|face| FaceSummary {
                bbox: face.bbox,
                det_score: face.det_score,
            })
            .collect())
    }
}
