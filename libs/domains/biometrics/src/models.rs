use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::liveness::LivenessReport;

pub type TenantId = i64;
pub type UserId = i64;

/// Length of every embedding produced by the current engine
pub const EMBEDDING_DIM: usize = 512;

/// Tenant activation flag
///
/// The gateway stores it either as a string (`active` / `inactive`) or as a
/// boolean-like integer (`1` / `0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TenantStatus {
    #[strum(to_string = "active", serialize = "1")]
    Active,
    #[strum(to_string = "inactive", serialize = "0")]
    Inactive,
}

impl TenantStatus {
    pub fn from_flag(flag: i64) -> Self {
        if flag != 0 { Self::Active } else { Self::Inactive }
    }
}

/// Connection parameters of one tenant's database
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: TenantId,
    pub name: String,
    pub db_host: String,
    pub port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_pass: String,
    pub status: TenantStatus,
}

impl TenantConfig {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

impl std::fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("db_host", &self.db_host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_pass", &"***")
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
}

/// One enrolled face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: i64,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub label: String,
    /// Stored as written; the length is not guaranteed to be [`EMBEDDING_DIM`]
    pub embedding: Vec<f32>,
    pub status: EnrollmentStatus,
    pub created_at: Option<NaiveDateTime>,
}

impl EnrollmentRecord {
    /// Whether the stored embedding can be compared with `probe`
    pub fn is_compatible_with(&self, probe: &[f32]) -> bool {
        self.embedding.len() == probe.len()
    }
}

/// Enrollment listing without the embedding payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSummary {
    pub id: i64,
    pub user_id: UserId,
    pub label: String,
    pub created_at: Option<NaiveDateTime>,
}

impl From<&EnrollmentRecord> for EnrollmentSummary {
    fn from(record: &EnrollmentRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            label: record.label.clone(),
            created_at: record.created_at,
        }
    }
}

/// All active enrollments of a tenant, in ascending id order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    pub records: Vec<EnrollmentRecord>,
    /// Rows skipped because their stored embedding could not be decoded
    pub malformed: usize,
}

impl Gallery {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Face location in pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub tenant_id: TenantId,
    pub stored: EnrollmentSummary,
    /// Gallery size after the write
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyOutcome {
    pub tenant_id: TenantId,
    #[serde(rename = "match")]
    pub matched: bool,
    pub name: String,
    pub user_id: UserId,
    pub enrollment_id: i64,
    pub distance: f64,
    pub threshold: f64,
    pub count: usize,
    /// Gallery records with a different embedding dimension
    pub skipped: usize,
    pub bbox: BoundingBox,
}

/// Why a verification ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerifyReason {
    NotEnrolled,
    NoFaceDetected,
    FaceTooSmall,
    LowDetectionScore,
    IncompatibleEncoding,
    Matched,
    NotMatched,
}

impl VerifyReason {
    /// Not enrolled, no face and incompatible encoding carry `success = false`.
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::NotEnrolled | Self::NoFaceDetected | Self::IncompatibleEncoding
        )
    }
}

/// Verification envelope
///
/// Known negative outcomes (not enrolled, no face, liveness failure,
/// incompatible encoding, mismatch) are reported here with `verified = false`
/// instead of as errors.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub verified: bool,
    pub reason: VerifyReason,
    pub message: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub liveness: Option<LivenessReport>,
}

impl VerifyOutcome {
    pub(crate) fn new(
        reason: VerifyReason,
        message: impl Into<String>,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Self {
        Self {
            success: reason.is_success(),
            verified: reason == VerifyReason::Matched,
            reason,
            message: message.into(),
            tenant_id,
            user_id,
            user_name: None,
            enrollment_id: None,
            distance: None,
            threshold: None,
            bbox: None,
            liveness: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub tenant_id: TenantId,
    /// Id or label that was deleted
    pub deleted: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareOutcome {
    #[serde(rename = "match")]
    pub matched: bool,
    pub distance: f64,
    pub threshold: f64,
    pub bbox: BoundingBox,
}

/// Embedding of the canonical face with where it was found
#[derive(Debug, Clone, Serialize)]
pub struct EncodeOutcome {
    pub embedding: Vec<f32>,
    pub bbox: BoundingBox,
    pub det_score: f32,
}

/// A detected face without its embedding
#[derive(Debug, Clone, Serialize)]
pub struct FaceSummary {
    pub bbox: BoundingBox,
    pub det_score: f32,
}
