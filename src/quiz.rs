//! Quiz content normalization, per-attempt randomization and grading.
//!
//! Stored quiz JSON comes in several shapes (string options or `{id, text}`
//! objects, index or id correct answers). It is normalized once, right after
//! it is read, into [`Question`]; nothing past this module sees raw JSON.
//!
//! The questions a learner sees are never persisted. They are recomputed
//! from an [`AttemptSeed`] both when the quiz is displayed and when it is
//! graded, so answers are always scored against the displayed order.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{QuizRow, SubmittedAnswer};
use crate::progress::round2;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectAnswer {
    ById(String),
    ByIndex(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub correct: CorrectAnswer,
}

impl Question {
    /// Index of the correct option in bank order. Ids are matched first,
    /// then option text.
    pub fn correct_index(&self) -> Option<usize> {
        match &self.correct {
            CorrectAnswer::ByIndex(i) => (*i < self.options.len()).then_some(*i),
            CorrectAnswer::ById(id) => self
                .options
                .iter()
                .position(|o| &o.id == id)
                .or_else(|| self.options.iter().position(|o| &o.text == id)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizOwner {
    Training(Uuid),
    SubUnit(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub owner: QuizOwner,
    pub title: String,
    pub passing_score: i32,
    pub questions_per_attempt: Option<usize>,
    pub shuffle_options: bool,
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Assemble a quiz from a row and an already normalized bank, e.g. right
    /// after inserting it. `row.questions` is not parsed again.
    pub fn from_saved(row: QuizRow, owner: QuizOwner, questions: Vec<Question>) -> Self {
        Quiz {
            id: row.id,
            owner,
            title: row.title,
            passing_score: row.passing_score,
            questions_per_attempt: row
                .questions_per_attempt
                .and_then(|k| usize::try_from(k).ok()),
            shuffle_options: row.shuffle_options,
            questions,
        }
    }
}

impl TryFrom<QuizRow> for Quiz {
    type Error = StoreError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        let quiz_id = row.id;
        let invalid = move |reason: String| StoreError::InvalidQuizContent { quiz_id, reason };
        let owner = match (row.training_id, row.sub_unit_id) {
            (Some(t), None) => QuizOwner::Training(t),
            (None, Some(s)) => QuizOwner::SubUnit(s),
            _ => return Err(invalid("quiz must belong to exactly one owner".into())),
        };
        let questions = normalize_questions(&row.questions.0).map_err(invalid)?;
        Ok(Quiz::from_saved(row, owner, questions))
    }
}

// --- raw stored shapes ---

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(alias = "question")]
    text: String,
    options: Vec<RawOption>,
    #[serde(alias = "correctAnswer")]
    correct_answer: RawCorrect,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Text(String),
    Entry {
        #[serde(default)]
        id: Option<serde_json::Value>,
        text: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCorrect {
    Index(usize),
    Id(String),
}

fn id_string(v: Option<serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse stored question JSON into normalized questions.
pub fn normalize_questions(raw: &serde_json::Value) -> Result<Vec<Question>, String> {
    let raw: Vec<RawQuestion> =
        serde_json::from_value(raw.clone()).map_err(|e| format!("malformed questions: {e}"))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (i, rq) in raw.into_iter().enumerate() {
        let id = id_string(rq.id).unwrap_or_else(|| format!("q{i}"));
        if !seen.insert(id.clone()) {
            return Err(format!("duplicate question id {id}"));
        }
        if rq.options.is_empty() {
            return Err(format!("question {id} has no options"));
        }
        let options = rq
            .options
            .into_iter()
            .enumerate()
            .map(|(j, o)| match o {
                RawOption::Text(text) => QuizOption {
                    id: j.to_string(),
                    text,
                },
                RawOption::Entry { id, text } => QuizOption {
                    id: id_string(id).unwrap_or_else(|| j.to_string()),
                    text,
                },
            })
            .collect();
        let correct = match rq.correct_answer {
            RawCorrect::Index(n) => CorrectAnswer::ByIndex(n),
            RawCorrect::Id(s) => CorrectAnswer::ById(s),
        };
        let q = Question {
            id,
            text: rq.text,
            options,
            correct,
        };
        if q.correct_index().is_none() {
            return Err(format!("question {} has a correct answer matching no option", q.id));
        }
        out.push(q);
    }
    Ok(out)
}

// --- randomization ---

/// Seed for one (learner, quiz, attempt) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSeed(u64);

impl AttemptSeed {
    pub fn new(learner_id: Uuid, quiz_id: Uuid, attempt_number: i32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(learner_id.as_bytes());
        hasher.update(quiz_id.as_bytes());
        hasher.update(attempt_number.to_be_bytes());
        let digest = hasher.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(first))
    }
}

/// A question as displayed for one attempt. `correct_answer` indexes
/// `options` in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub correct_answer: usize,
}

/// Pick `k` questions (all when `None` or larger than the bank) and order
/// them, optionally shuffling options too. Same seed, same output.
pub fn select_questions(
    bank: &[Question],
    seed: AttemptSeed,
    k: Option<usize>,
    shuffle_options: bool,
) -> Vec<PresentedQuestion> {
    let mut rng = StdRng::seed_from_u64(seed.0);
    let mut order: Vec<usize> = (0..bank.len()).collect();
    order.shuffle(&mut rng);
    if let Some(k) = k {
        order.truncate(k);
    }

    order
        .into_iter()
        .filter_map(|i| {
            let q = &bank[i];
            let original = q.correct_index()?;
            let mut perm: Vec<usize> = (0..q.options.len()).collect();
            if shuffle_options {
                perm.shuffle(&mut rng);
            }
            let correct_answer = perm.iter().position(|&j| j == original)?;
            Some(PresentedQuestion {
                id: q.id.clone(),
                text: q.text.clone(),
                options: perm.iter().map(|&j| q.options[j].clone()).collect(),
                correct_answer,
            })
        })
        .collect()
}

// --- learner-facing view ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizView {
    pub quiz_id: Uuid,
    pub title: String,
    pub passing_score: i32,
    pub attempt_number: i32,
    pub questions: Vec<QuestionView>,
}

impl QuizView {
    pub fn new(quiz: &Quiz, attempt_number: i32, presented: &[PresentedQuestion]) -> Self {
        Self {
            quiz_id: quiz.id,
            title: quiz.title.clone(),
            passing_score: quiz.passing_score,
            attempt_number,
            questions: presented
                .iter()
                .map(|p| QuestionView {
                    id: p.id.clone(),
                    text: p.text.clone(),
                    options: p.options.clone(),
                })
                .collect(),
        }
    }
}

// --- grading ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResult {
    pub question_id: String,
    pub selected: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: f64,
    pub correct: usize,
    pub total: usize,
    pub results: Vec<QuestionResult>,
}

/// Score answers against the displayed questions. Missing answers and
/// answers for questions that were not shown count for nothing.
pub fn grade(presented: &[PresentedQuestion], answers: &[SubmittedAnswer]) -> Grade {
    let by_id: HashMap<&str, Option<usize>> = answers
        .iter()
        .map(|a| (a.question_id.as_str(), a.selected))
        .collect();

    let results: Vec<QuestionResult> = presented
        .iter()
        .map(|p| {
            let selected = by_id.get(p.id.as_str()).copied().flatten();
            QuestionResult {
                question_id: p.id.clone(),
                selected,
                correct_answer: p.correct_answer,
                is_correct: selected == Some(p.correct_answer),
            }
        })
        .collect();

    let correct = results.iter().filter(|r| r.is_correct).count();
    let total = results.len();
    let score = if total == 0 {
        0.0
    } else {
        round2(correct as f64 * 100.0 / total as f64)
    };
    Grade {
        score,
        correct,
        total,
        results,
    }
}
