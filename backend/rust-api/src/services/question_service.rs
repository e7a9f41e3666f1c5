use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::Database;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::collaborators::{CollaboratorError, QuestionSource};
use crate::metrics::track_db_operation;
use crate::models::{Question, QuestionSet, QuestionType, SessionTarget};

const ASSESSMENTS_COLLECTION: &str = "assessments";
const QUESTIONS_COLLECTION: &str = "questions";
const SKILLS_COLLECTION: &str = "skills";
const FALLBACK_QUESTION_LIMIT: i64 = 10;
const GENERATED_OPTION_COUNT: usize = 4;
const GENERATED_DEFAULT_POINTS: u32 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateQuestionsRequest<'a> {
    skill: &'a str,
    assessment_title: &'a str,
    difficulty: &'a str,
    question_type: &'a str,
    number_of_questions: u32,
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateQuestionsResponse {
    success: bool,
    #[serde(default)]
    questions: Vec<GeneratedQuestion>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default, rename = "type")]
    question_type: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct_answer: Option<i64>,
    #[serde(default)]
    points: Option<u32>,
}

/// Settings for generated skill assessments.
#[derive(Debug, Clone)]
pub struct SkillAssessmentSettings {
    pub generator_url: String,
    pub duration_seconds: u32,
    pub question_count: u32,
}

/// Loads assessment questions from MongoDB and generates skill assessment
/// questions through the question generator API.
pub struct QuestionService {
    mongo: Database,
    http_client: Client,
    skill: SkillAssessmentSettings,
}

impl QuestionService {
    pub fn new(mongo: Database, skill: SkillAssessmentSettings) -> Self {
        Self {
            mongo,
            http_client: Client::new(),
            skill,
        }
    }

    async fn load_assessment(&self, assessment_id: &str) -> Result<QuestionSet, CollaboratorError> {
        let assessments = self.mongo.collection::<Document>(ASSESSMENTS_COLLECTION);
        let assessment = track_db_operation("find_one", ASSESSMENTS_COLLECTION, async {
            assessments
                .find_one(id_filter(assessment_id))
                .await
                .context("Failed to query assessment")
        })
        .await?
        .ok_or_else(|| CollaboratorError::NotFound(format!("assessment {}", assessment_id)))?;

        let title = assessment.get_str("title").unwrap_or("Assessment").to_string();
        let skill = assessment.get_str("skill").ok().map(str::to_string);
        let duration_minutes = read_u32(&assessment, "duration")
            .ok_or_else(|| anyhow!("Assessment {} has no duration", assessment_id))?;

        let question_ids: Vec<String> = assessment
            .get_array("questions")
            .map(|ids| ids.iter().filter_map(bson_id).collect())
            .unwrap_or_default();

        let questions = if question_ids.is_empty() {
            match skill.as_deref() {
                Some(skill) => self.questions_by_skill(skill).await?,
                None => Vec::new(),
            }
        } else {
            self.questions_by_ids(&question_ids).await?
        };

        Ok(QuestionSet {
            title,
            skill,
            duration_seconds: duration_minutes.saturating_mul(60),
            questions,
        })
    }

    /// Questions in the order the assessment lists them. Ids missing from the
    /// bank are skipped.
    async fn questions_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Question>> {
        let collection = self.mongo.collection::<Document>(QUESTIONS_COLLECTION);
        let bson_ids: Vec<Bson> = ids
            .iter()
            .map(|id| match ObjectId::parse_str(id) {
                Ok(oid) => Bson::ObjectId(oid),
                Err(_) => Bson::String(id.clone()),
            })
            .collect();

        let documents: Vec<Document> = track_db_operation("find", QUESTIONS_COLLECTION, async {
            collection
                .find(doc! { "_id": { "$in": bson_ids } })
                .await
                .context("Failed to query questions")?
                .try_collect()
                .await
                .context("Failed to read questions")
        })
        .await?;

        let mut loaded: Vec<Question> = documents
            .iter()
            .filter_map(|document| match question_from_document(document) {
                Ok(question) => Some(question),
                Err(e) => {
                    tracing::warn!("Skipping malformed question: {}", e);
                    None
                }
            })
            .collect();

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(position) = loaded.iter().position(|q| &q.id == id) {
                ordered.push(loaded.swap_remove(position));
            }
        }
        Ok(ordered)
    }

    async fn questions_by_skill(&self, skill: &str) -> anyhow::Result<Vec<Question>> {
        let collection = self.mongo.collection::<Document>(QUESTIONS_COLLECTION);
        let documents: Vec<Document> = track_db_operation("find", QUESTIONS_COLLECTION, async {
            collection
                .find(doc! { "skill": skill })
                .limit(FALLBACK_QUESTION_LIMIT)
                .await
                .context("Failed to query questions by skill")?
                .try_collect()
                .await
                .context("Failed to read questions")
        })
        .await?;

        Ok(documents
            .iter()
            .filter_map(|document| question_from_document(document).ok())
            .collect())
    }

    async fn generate_skill_assessment(
        &self,
        skill_id: &str,
    ) -> Result<QuestionSet, CollaboratorError> {
        let skills = self.mongo.collection::<Document>(SKILLS_COLLECTION);
        let skill = track_db_operation("find_one", SKILLS_COLLECTION, async {
            skills
                .find_one(id_filter(skill_id))
                .await
                .context("Failed to query skill")
        })
        .await?
        .ok_or_else(|| CollaboratorError::NotFound(format!("skill {}", skill_id)))?;

        let name = skill
            .get_str("name")
            .map_err(|_| anyhow!("Skill {} has no name", skill_id))?
            .to_string();
        let title = format!("{} Skill Assessment", name);
        let topics = skill
            .get_str("description")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(|d| vec![d.to_string()])
            .unwrap_or_default();

        let request = GenerateQuestionsRequest {
            skill: &name,
            assessment_title: &title,
            difficulty: "medium",
            question_type: "mcq",
            number_of_questions: self.skill.question_count,
            topics,
        };

        let url = format!("{}/api/generate-questions", self.skill.generator_url);
        tracing::info!("Generating {} questions for {}", self.skill.question_count, title);

        let response: GenerateQuestionsResponse = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call question generator")?
            .error_for_status()
            .context("Question generator returned an error status")?
            .json()
            .await
            .context("Failed to parse question generator response")?;

        if !response.success {
            return Err(anyhow!(
                "Question generator failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )
            .into());
        }

        Ok(QuestionSet {
            title,
            skill: Some(name),
            duration_seconds: self.skill.duration_seconds,
            questions: format_generated(response.questions),
        })
    }
}

#[async_trait]
impl QuestionSource for QuestionService {
    async fn load_questions(
        &self,
        target: &SessionTarget,
    ) -> Result<QuestionSet, CollaboratorError> {
        match target {
            SessionTarget::Assessment { assessment_id } => {
                self.load_assessment(assessment_id).await
            }
            SessionTarget::Skill { skill_id } => self.generate_skill_assessment(skill_id).await,
        }
    }
}

/// Keeps only well-formed four-option MCQs from the generator.
fn format_generated(generated: Vec<GeneratedQuestion>) -> Vec<Question> {
    generated
        .into_iter()
        .filter(|q| q.question_type.as_deref().map_or(true, |t| t == "mcq"))
        .filter_map(|q| {
            let options = q.options?;
            let correct = usize::try_from(q.correct_answer?).ok()?;
            if options.len() != GENERATED_OPTION_COUNT || correct >= GENERATED_OPTION_COUNT {
                return None;
            }
            Some((q.question, q.explanation, options, correct, q.points))
        })
        .enumerate()
        .map(|(index, (title, explanation, options, correct, points))| Question {
            id: format!("generated-{}", index),
            title,
            description: String::new(),
            question_type: QuestionType::Mcq,
            options,
            correct_answer: Some(correct),
            points: points.filter(|p| *p > 0).unwrap_or(GENERATED_DEFAULT_POINTS),
            explanation: explanation.filter(|e| !e.trim().is_empty()),
        })
        .collect()
}

fn question_from_document(document: &Document) -> anyhow::Result<Question> {
    let id = document
        .get("_id")
        .and_then(bson_id)
        .ok_or_else(|| anyhow!("Question has unsupported _id type"))?;

    let question_type = match document.get_str("type").unwrap_or("mcq") {
        "mcq" => QuestionType::Mcq,
        "coding" => QuestionType::Coding,
        "practical" => QuestionType::Practical,
        other => return Err(anyhow!("Question {} has unknown type {}", id, other)),
    };

    let options = document
        .get_array("options")
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let correct_answer = read_u32(document, "correctAnswer")
        .or_else(|| read_u32(document, "correct_answer"))
        .map(|index| index as usize);

    Ok(Question {
        id,
        title: document.get_str("title").unwrap_or_default().to_string(),
        description: document
            .get_str("description")
            .unwrap_or_default()
            .to_string(),
        question_type,
        options,
        correct_answer,
        points: read_u32(document, "points").unwrap_or(1),
        explanation: document.get_str("explanation").ok().map(str::to_string),
    })
}

fn id_filter(id: &str) -> Document {
    if let Ok(object_id) = ObjectId::parse_str(id) {
        doc! { "_id": object_id }
    } else {
        doc! { "_id": id }
    }
}

fn bson_id(value: &Bson) -> Option<String> {
    match value {
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::String(value) => Some(value.to_string()),
        _ => None,
    }
}

fn read_u32(document: &Document, key: &str) -> Option<u32> {
    match document.get(key)? {
        Bson::Int32(v) => u32::try_from(*v).ok(),
        Bson::Int64(v) => u32::try_from(*v).ok(),
        Bson::Double(v) if *v >= 0.0 => Some(*v as u32),
        _ => None,
    }
}
