use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::Database;
use rand::Rng;

use super::collaborators::CertificateIssuer;
use crate::metrics::{track_db_operation, CERTIFICATES_ISSUED_TOTAL};
use crate::models::{CertificateRequest, CertificateStatus};
use crate::utils::time::chrono_to_bson;

const CERTIFICATES_COLLECTION: &str = "certificates";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Issues certificates into MongoDB, at most one per attempt.
pub struct CertificateService {
    mongo: Database,
}

impl CertificateService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl CertificateIssuer for CertificateService {
    async fn issue_certificate(&self, request: &CertificateRequest) -> Result<String> {
        let collection = self.mongo.collection::<Document>(CERTIFICATES_COLLECTION);

        let existing = track_db_operation("find_one", CERTIFICATES_COLLECTION, async {
            collection
                .find_one(doc! { "attempt_id": &request.attempt_id })
                .await
                .context("Failed to query certificates")
        })
        .await?;

        if let Some(existing) = existing {
            let certificate_id = existing
                .get_str("certificate_id")
                .context("Existing certificate has no id")?
                .to_string();
            CERTIFICATES_ISSUED_TOTAL
                .with_label_values(&["existing"])
                .inc();
            return Ok(certificate_id);
        }

        let now = Utc::now();
        let certificate_id = generate_certificate_id(now);
        let document = doc! {
            "certificate_id": &certificate_id,
            "student_id": &request.student_id,
            "assessment_id": &request.assessment_id,
            "assessment_title": &request.assessment_title,
            "skill": request.skill.as_deref(),
            "attempt_id": &request.attempt_id,
            "score": request.score as i64,
            "percentage": request.percentage as i64,
            "passing_grade": request.passing_grade as i64,
            "status": CertificateStatus::Active.as_str(),
            "issued_at": chrono_to_bson(now),
        };

        track_db_operation("insert_one", CERTIFICATES_COLLECTION, async {
            collection
                .insert_one(document)
                .await
                .context("Failed to insert certificate")
        })
        .await?;

        CERTIFICATES_ISSUED_TOTAL.with_label_values(&["issued"]).inc();
        tracing::info!(
            certificate_id = %certificate_id,
            attempt_id = %request.attempt_id,
            percentage = request.percentage,
            "Certificate issued"
        );
        Ok(certificate_id)
    }
}

/// `CERT-<base36 millis>-<6 random base36 chars>`, upper-cased.
pub fn generate_certificate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("CERT-{}-{}", to_base36(millis), suffix).to_uppercase()
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
