// src/engine/paper.rs

use sha2::{Digest, Sha256};

use crate::models::paper::GeneratedPaper;
use crate::models::question::Question;

/// Mulberry32: 32-bit PRNG matching the generator the exam client ecosystem
/// was seeded against. One instance per paper-generation call; never shared
/// or reused across sessions, so a stored seed reproduces its paper exactly.
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Mulberry32 { state: seed }
    }

    /// Next value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let a = self.state;
        let mut t = (a ^ (a >> 15)).wrapping_mul(a | 1);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61)) ^ t;
        (t ^ (t >> 14)) as f64 / 4_294_967_296.0
    }
}

/// Fisher-Yates shuffle driven by the session PRNG. Returns a new vector;
/// the input order is left untouched.
pub fn seeded_shuffle<T: Clone>(items: &[T], rng: &mut Mulberry32) -> Vec<T> {
    let mut a = items.to_vec();
    for i in (1..a.len()).rev() {
        let j = (rng.next_f64() * (i as f64 + 1.0)).floor() as usize;
        a.swap(i, j);
    }
    a
}

/// Builds the randomized paper for one attempt.
///
/// 1. If `questions_per_attempt` is positive and smaller than the bank,
///    shuffle the bank and keep the first N (which questions).
/// 2. Shuffle the selection again (what order) — an independent permutation.
/// 3. Shuffle each question's options and remap `correct_index` through the
///    permutation. A correct index that cannot be located in the permutation
///    is clamped to 0; that can only happen if the bank entry was malformed.
pub fn generate(
    bank: &[Question],
    questions_per_attempt: usize,
    seed: u32,
    duration_minutes: i32,
) -> GeneratedPaper {
    let mut rng = Mulberry32::new(seed);

    let picked: Vec<Question> =
        if questions_per_attempt > 0 && questions_per_attempt < bank.len() {
            let mut shuffled = seeded_shuffle(bank, &mut rng);
            shuffled.truncate(questions_per_attempt);
            shuffled
        } else {
            bank.to_vec()
        };

    let ordered = seeded_shuffle(&picked, &mut rng);

    let questions = ordered
        .into_iter()
        .map(|q| {
            let idxs: Vec<usize> = (0..q.options.len()).collect();
            let shuffled_idxs = seeded_shuffle(&idxs, &mut rng);
            let options: Vec<String> = shuffled_idxs
                .iter()
                .map(|&i| q.options[i].clone())
                .collect();
            let correct_index = shuffled_idxs
                .iter()
                .position(|&i| i as i64 == q.correct_index)
                .unwrap_or(0) as i64;
            Question {
                id: q.id,
                text: q.text,
                options,
                correct_index,
            }
        })
        .collect();

    GeneratedPaper {
        seed,
        duration_minutes,
        questions,
    }
}

/// Content hash over the canonical JSON form of the paper, recorded next to
/// the embedded paper as tamper evidence.
pub fn content_hash(paper: &GeneratedPaper) -> serde_json::Result<String> {
    let canonical = serde_json::to_string(paper)?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}
