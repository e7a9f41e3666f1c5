use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::Database;

use super::collaborators::AttemptStore;
use crate::metrics::track_db_operation;
use crate::models::{AttemptStatus, NewAttempt, SessionResult};
use crate::utils::time::chrono_to_bson;

const ATTEMPTS_COLLECTION: &str = "attempts";

/// Assessment attempts persisted in MongoDB.
pub struct AttemptService {
    mongo: Database,
}

impl AttemptService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> mongodb::Collection<Document> {
        self.mongo.collection::<Document>(ATTEMPTS_COLLECTION)
    }
}

#[async_trait]
impl AttemptStore for AttemptService {
    async fn create_attempt(&self, attempt: &NewAttempt) -> Result<String> {
        let attempt_id = ObjectId::new();
        let document = doc! {
            "_id": attempt_id,
            "session_id": &attempt.session_id,
            "assessment_id": &attempt.assessment_id,
            "student_id": &attempt.student_id,
            "status": AttemptStatus::InProgress.as_str(),
            "total_marks": attempt.total_marks as i64,
            "question_count": attempt.question_count as i64,
            "duration_seconds": attempt.duration_seconds as i64,
            "started_at": chrono_to_bson(attempt.started_at),
        };

        let collection = self.collection();
        track_db_operation("insert_one", ATTEMPTS_COLLECTION, async {
            collection
                .insert_one(document)
                .await
                .context("Failed to insert attempt")
        })
        .await?;

        tracing::info!(
            attempt_id = %attempt_id.to_hex(),
            session_id = %attempt.session_id,
            "Attempt created"
        );
        Ok(attempt_id.to_hex())
    }

    async fn update_attempt(&self, attempt_id: &str, result: &SessionResult) -> Result<()> {
        let oid = ObjectId::parse_str(attempt_id).context("Invalid attempt id")?;
        let answers = bson::to_bson(&result.answers).context("Failed to encode answers")?;
        let violations =
            bson::to_bson(&result.violations).context("Failed to encode violations")?;

        let update = doc! {
            "$set": {
                "status": AttemptStatus::from(result.status).as_str(),
                "submit_reason": result.reason.as_str(),
                "score": result.score as i64,
                "total_marks": result.total_marks as i64,
                "percentage": result.percentage as i64,
                "passed": result.passed,
                "time_spent": result.time_spent as i64,
                "tab_switch_count": result.tab_switch_count as i64,
                "fullscreen_exit_count": result.fullscreen_exit_count as i64,
                "answers": answers,
                "violations": violations,
                "submitted_at": chrono_to_bson(result.submitted_at),
            }
        };

        let collection = self.collection();
        let outcome = track_db_operation("update_one", ATTEMPTS_COLLECTION, async {
            collection
                .update_one(doc! { "_id": oid }, update)
                .await
                .context("Failed to update attempt")
        })
        .await?;

        if outcome.matched_count == 0 {
            return Err(anyhow!("Attempt {} not found", attempt_id));
        }
        Ok(())
    }

    async fn link_certificate(&self, attempt_id: &str, certificate_id: &str) -> Result<()> {
        let oid = ObjectId::parse_str(attempt_id).context("Invalid attempt id")?;
        let collection = self.collection();
        let outcome = track_db_operation("update_one", ATTEMPTS_COLLECTION, async {
            collection
                .update_one(
                    doc! { "_id": oid },
                    doc! { "$set": { "certificate_id": certificate_id } },
                )
                .await
                .context("Failed to link certificate to attempt")
        })
        .await?;

        if outcome.matched_count == 0 {
            return Err(anyhow!("Attempt {} not found", attempt_id));
        }
        Ok(())
    }

    async fn mark_abandoned(&self, attempt_id: &str, at: DateTime<Utc>) -> Result<()> {
        let oid = ObjectId::parse_str(attempt_id).context("Invalid attempt id")?;
        let collection = self.collection();
        track_db_operation("update_one", ATTEMPTS_COLLECTION, async {
            collection
                .update_one(
                    doc! { "_id": oid, "status": AttemptStatus::InProgress.as_str() },
                    doc! { "$set": {
                        "status": AttemptStatus::Abandoned.as_str(),
                        "abandoned_at": chrono_to_bson(at),
                    }},
                )
                .await
                .context("Failed to mark attempt abandoned")
        })
        .await?;
        Ok(())
    }
}
