// src/engine/grading.rs

use std::collections::HashMap;

use crate::models::question::Question;

pub const DEFAULT_PASSING_SCORE: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeOutcome {
    pub correct: usize,
    pub total: usize,
    pub score_percent: i32,
}

/// Grades submitted answers against the paper the session embedded — never
/// the live bank, so edits to the bank mid-attempt cannot change the result.
/// Unanswered or unknown question ids simply score zero.
pub fn grade(questions: &[Question], answers: &HashMap<i64, i64>) -> GradeOutcome {
    let mut correct = 0;
    for q in questions {
        if answers.get(&q.id) == Some(&q.correct_index) {
            correct += 1;
        }
    }
    let total = questions.len();
    let score_percent =
        ((correct as f64 / total.max(1) as f64) * 100.0).round() as i32;
    GradeOutcome {
        correct,
        total,
        score_percent,
    }
}

/// The boundary is inclusive: scoring exactly the threshold passes.
pub fn passed(score_percent: i32, passing_score: i32) -> bool {
    score_percent >= passing_score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper_questions() -> Vec<Question> {
        (1..=4)
            .map(|i| Question {
                id: i,
                text: format!("Q{i}"),
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_index: (i % 3) as i64,
            })
            .collect()
    }

    #[test]
    fn all_correct_scores_hundred() {
        let qs = paper_questions();
        let answers: HashMap<i64, i64> = qs.iter().map(|q| (q.id, q.correct_index)).collect();
        let out = grade(&qs, &answers);
        assert_eq!(out.correct, 4);
        assert_eq!(out.score_percent, 100);
    }

    #[test]
    fn no_answers_scores_zero() {
        let out = grade(&paper_questions(), &HashMap::new());
        assert_eq!(out.correct, 0);
        assert_eq!(out.score_percent, 0);
    }

    #[test]
    fn partial_score_rounds() {
        let qs = paper_questions();
        // 1 of 4 correct -> 25; 3 of 4 -> 75.
        let one: HashMap<i64, i64> = [(qs[0].id, qs[0].correct_index)].into();
        assert_eq!(grade(&qs, &one).score_percent, 25);

        let three: HashMap<i64, i64> = qs[..3].iter().map(|q| (q.id, q.correct_index)).collect();
        assert_eq!(grade(&qs, &three).score_percent, 75);

        // 1 of 3 correct -> 33.33 rounds down to 33; 2 of 3 -> 66.67 rounds up.
        let qs3 = &qs[..3];
        let one3: HashMap<i64, i64> = [(qs3[0].id, qs3[0].correct_index)].into();
        assert_eq!(grade(qs3, &one3).score_percent, 33);
        let two3: HashMap<i64, i64> = qs3[..2].iter().map(|q| (q.id, q.correct_index)).collect();
        assert_eq!(grade(qs3, &two3).score_percent, 67);
    }

    #[test]
    fn unknown_question_ids_do_not_count() {
        let qs = paper_questions();
        let answers: HashMap<i64, i64> = [(999, 0), (998, 1)].into();
        assert_eq!(grade(&qs, &answers).correct, 0);
    }

    #[test]
    fn pass_boundary_is_exact() {
        assert!(passed(50, 50));
        assert!(!passed(49, 50));
        assert!(passed(70, 70));
        assert!(!passed(69, 70));
    }

    #[test]
    fn empty_paper_scores_zero_without_division_blowup() {
        let out = grade(&[], &HashMap::new());
        assert_eq!(out.total, 0);
        assert_eq!(out.score_percent, 0);
    }
}
