// src/models/question.rs

use serde::{Deserialize, Serialize};

/// One multiple-choice question as stored in the exam's question bank and,
/// after shuffling, inside a generated paper. `correct_index` points into
/// `options` and never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: i64,
}

/// DTO for sending a question to the client (correct answer stripped).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
        }
    }
}
