use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::Database;

use super::collaborators::EnrollmentUpdater;
use crate::metrics::track_db_operation;
use crate::models::EnrollmentStatus;
use crate::utils::time::chrono_to_bson;

const ENROLLMENTS_COLLECTION: &str = "enrollments";

/// Skill enrollment status updates for the skill assessment flow.
pub struct EnrollmentService {
    mongo: Database,
}

impl EnrollmentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl EnrollmentUpdater for EnrollmentService {
    async fn update_enrollment(
        &self,
        student_id: &str,
        skill_id: &str,
        status: EnrollmentStatus,
        certificate_id: Option<&str>,
    ) -> Result<()> {
        let now = chrono_to_bson(Utc::now());
        let mut set = doc! {
            "status": status.as_str(),
            "updated_at": now,
        };
        if matches!(
            status,
            EnrollmentStatus::Completed | EnrollmentStatus::Certified
        ) {
            set.insert("completed_at", now);
        }
        if let Some(certificate_id) = certificate_id {
            set.insert("certificate_id", certificate_id);
        }

        let collection = self.mongo.collection::<Document>(ENROLLMENTS_COLLECTION);
        let outcome = track_db_operation("update_one", ENROLLMENTS_COLLECTION, async {
            collection
                .update_one(
                    doc! { "student_id": student_id, "skill_id": skill_id },
                    doc! { "$set": set },
                )
                .await
                .context("Failed to update enrollment")
        })
        .await?;

        if outcome.matched_count == 0 {
            tracing::warn!(
                student_id = %student_id,
                skill_id = %skill_id,
                "No enrollment found to update"
            );
        }
        Ok(())
    }
}
