// src/models/paper.rs

use serde::{Deserialize, Serialize};

use crate::models::question::{PublicQuestion, Question};

/// The per-attempt materialization of a question bank: a subset of the bank
/// in randomized order, each question's options shuffled and its
/// `correct_index` remapped. Derived once at session start, embedded in the
/// session row, and never re-derived from the live bank afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPaper {
    pub seed: u32,
    pub duration_minutes: i32,
    pub questions: Vec<Question>,
}

/// Client-facing view of a paper: questions with answers stripped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPaper {
    pub duration_minutes: i32,
    pub question_count: usize,
    pub questions: Vec<PublicQuestion>,
}

impl From<&GeneratedPaper> for PublicPaper {
    fn from(paper: &GeneratedPaper) -> Self {
        PublicPaper {
            duration_minutes: paper.duration_minutes,
            question_count: paper.questions.len(),
            questions: paper.questions.iter().map(PublicQuestion::from).collect(),
        }
    }
}
