use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;

/// Which liveness check rejected the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessFailure {
    FaceTooSmall,
    LowDetectionScore,
}

/// Measurements, thresholds and verdicts of the liveness heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    pub face_width: f32,
    pub face_height: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Face width over frame width
    pub face_ratio: f64,
    pub min_face_ratio: f64,
    pub face_size_ok: bool,
    pub det_score: f32,
    pub min_det_score: f64,
    pub det_score_ok: bool,
    pub liveness_passed: bool,
}

impl LivenessResult {
    /// First failing check; size is reported before confidence.
    pub fn failure(&self) -> Option<LivenessFailure> {
        if !self.face_size_ok {
            Some(LivenessFailure::FaceTooSmall)
        } else if !self.det_score_ok {
            Some(LivenessFailure::LowDetectionScore)
        } else {
            None
        }
    }

    /// Corrective message for the first failing check
    pub fn failure_message(&self) -> Option<String> {
        self.failure().map(|failure| match failure {
            LivenessFailure::FaceTooSmall => format!(
                "Face too far from the camera, move closer (currently {:.1}%, minimum {:.0}%)",
                self.face_ratio * 100.0,
                self.min_face_ratio * 100.0
            ),
            LivenessFailure::LowDetectionScore => format!(
                "Low detection quality ({:.2}). Make sure the face is well lit and clearly visible.",
                self.det_score
            ),
        })
    }
}

/// Apply the face-size and detection-confidence checks
pub fn evaluate(
    bbox: &BoundingBox,
    det_score: f32,
    frame_width: u32,
    frame_height: u32,
    min_face_ratio: f64,
    min_det_score: f64,
) -> LivenessResult {
    let face_width = bbox.width();
    let face_height = bbox.height();
    let face_ratio = if frame_width > 0 {
        f64::from(face_width) / f64::from(frame_width)
    } else {
        0.0
    };

    let face_size_ok = face_ratio >= min_face_ratio;
    let det_score_ok = det_score >= min_det_score as f32;

    LivenessResult {
        face_width,
        face_height,
        frame_width,
        frame_height,
        face_ratio,
        min_face_ratio,
        face_size_ok,
        det_score,
        min_det_score,
        det_score_ok,
        liveness_passed: face_size_ok && det_score_ok,
    }
}

/// Liveness block of a verification response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessReport {
    pub face_detected: bool,
    #[serde(flatten)]
    pub result: Option<LivenessResult>,
}

impl LivenessReport {
    pub fn no_face() -> Self {
        Self {
            face_detected: false,
            result: None,
        }
    }
}

impl From<LivenessResult> for LivenessReport {
    fn from(result: LivenessResult) -> Self {
        Self {
            face_detected: true,
            result: Some(result),
        }
    }
}
