// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::engine::grading::DEFAULT_PASSING_SCORE;
use crate::models::question::Question;

/// Exam configuration row. The exam id is the attempt target: sessions and
/// attempts key on (user, exam). `subject_id` is set for subject-scoped
/// exams; whole-course exams leave it null.
#[derive(Debug, FromRow)]
pub struct ExamConfigRow {
    pub id: i64,
    pub course_id: i64,
    pub subject_id: Option<i64>,
    pub title: String,
    pub duration_minutes: i32,
    pub questions: serde_json::Value,
    pub passing_score: Option<i32>,
    pub proctor_required: bool,
    pub proctor_mode: String,
    pub proctor_screenshare_required: bool,
}

impl ExamConfigRow {
    /// Decodes the stored question bank. The admin upsert validates banks on
    /// the way in, so a decode failure here is data corruption.
    pub fn bank(&self) -> Result<Vec<Question>, serde_json::Error> {
        serde_json::from_value(self.questions.clone())
    }

    pub fn question_count(&self) -> usize {
        self.questions.as_array().map(|a| a.len()).unwrap_or(0)
    }

    /// Per-target threshold; whole-course exams default to 50.
    pub fn effective_passing_score(&self) -> i32 {
        self.passing_score.unwrap_or(DEFAULT_PASSING_SCORE)
    }
}

/// DTO for creating an exam configuration. Admin only.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    pub course_id: i64,
    pub subject_id: Option<i64>,
    #[validate(length(min = 2, max = 200))]
    pub title: String,
    pub duration_minutes: Option<i32>,
    #[validate(length(min = 1), custom(function = validate_bank))]
    pub questions: Vec<Question>,
    pub passing_score: Option<i32>,
    pub proctor_required: Option<bool>,
    pub proctor_mode: Option<String>,
    pub proctor_screenshare_required: Option<bool>,
}

/// DTO for updating an exam configuration. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExamRequest {
    #[validate(length(min = 2, max = 200))]
    pub title: Option<String>,
    pub duration_minutes: Option<i32>,
    #[validate(custom(function = validate_bank))]
    pub questions: Option<Vec<Question>>,
    pub passing_score: Option<i32>,
    pub proctor_required: Option<bool>,
    pub proctor_mode: Option<String>,
    pub proctor_screenshare_required: Option<bool>,
}

fn validate_bank(questions: &[Question]) -> Result<(), validator::ValidationError> {
    for q in questions {
        if q.options.is_empty() {
            return Err(validator::ValidationError::new("question_without_options"));
        }
        if q.correct_index < 0 || q.correct_index as usize >= q.options.len() {
            return Err(validator::ValidationError::new("correct_index_out_of_range"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_validation_rejects_out_of_range_answer() {
        let qs = vec![Question {
            id: 1,
            text: "q".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_index: 2,
        }];
        assert!(validate_bank(&qs).is_err());
    }

    #[test]
    fn bank_validation_accepts_well_formed_questions() {
        let qs = vec![Question {
            id: 1,
            text: "q".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_index: 1,
        }];
        assert!(validate_bank(&qs).is_ok());
    }
}
