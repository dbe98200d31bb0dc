use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::risk::RiskLevel;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanType {
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "MRI")]
    Mri,
    #[serde(rename = "PET")]
    Pet,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Ct => "CT",
            ScanType::Mri => "MRI",
            ScanType::Pet => "PET",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScanType::Ct => "Computed Tomography Scan",
            ScanType::Mri => "Magnetic Resonance Imaging",
            ScanType::Pet => "Positron Emission Tomography",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CT" => Ok(ScanType::Ct),
            "MRI" => Ok(ScanType::Mri),
            "PET" => Ok(ScanType::Pet),
            other => Err(format!("unknown scan type '{}' (expected CT, MRI or PET)", other)),
        }
    }
}

/// A selected scan file, not yet validated.
#[derive(Clone)]
pub struct ScanUpload {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub scan_type: ScanType,
    pub data: Vec<u8>,
}

impl fmt::Debug for ScanUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanUpload")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("scan_type", &self.scan_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ScanUpload {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        scan_type: ScanType,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            scan_type,
            data,
        }
    }

    pub fn image_ref(&self) -> String {
        format!("upload://{}/{}", self.id, self.file_name)
    }
}

/// The structured `{riskLevel, confidence, findings, recommendations}` verdict.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Model,
    Fallback,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub scan_type: ScanType,
    pub file_name: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub image_ref: String,
    pub source: VerdictSource,
    pub analyzed_at: DateTime<Utc>,
}
