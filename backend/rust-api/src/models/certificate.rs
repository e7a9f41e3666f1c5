use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::SessionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateRequest {
    pub student_id: String,
    pub assessment_id: String,
    pub assessment_title: String,
    pub skill: Option<String>,
    pub attempt_id: String,
    pub score: u32,
    pub percentage: u32,
    pub passing_grade: u32,
}

impl CertificateRequest {
    pub fn from_result(
        result: &SessionResult,
        assessment_title: &str,
        skill: Option<&str>,
        passing_grade: u32,
    ) -> Self {
        Self {
            student_id: result.student_id.clone(),
            assessment_id: result.assessment_id.clone(),
            assessment_title: assessment_title.to_string(),
            skill: skill.map(str::to_string),
            attempt_id: result.attempt_id.clone(),
            score: result.score,
            percentage: result.percentage,
            passing_grade,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: String,
    pub student_id: String,
    pub assessment_id: String,
    pub assessment_title: String,
    pub skill: Option<String>,
    pub attempt_id: String,
    pub score: u32,
    pub percentage: u32,
    pub passing_grade: u32,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
}
