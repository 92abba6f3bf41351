//! Input checks run before any store mutation.

use crate::error::{EngineError, EngineResult};
use crate::models::{NewQuiz, NewSubUnit, SubmittedAnswer};
use crate::quiz::{normalize_questions, Question};

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_ANSWERS: usize = 500;

pub fn watched_seconds(v: f64) -> EngineResult<i64> {
    if !v.is_finite() {
        return Err(EngineError::validation("watched_seconds must be a finite number"));
    }
    if v < 0.0 {
        return Err(EngineError::validation("watched_seconds must not be negative"));
    }
    Ok(v.floor() as i64)
}

pub fn title(v: &str) -> EngineResult<()> {
    if v.trim().is_empty() {
        return Err(EngineError::validation("title is required"));
    }
    if v.len() > MAX_TITLE_LEN {
        return Err(EngineError::validation(format!(
            "title exceeds {MAX_TITLE_LEN} bytes"
        )));
    }
    Ok(())
}

pub fn new_sub_unit(req: &NewSubUnit) -> EngineResult<()> {
    title(&req.title)?;
    if matches!(req.video_duration_seconds, Some(d) if d < 0) {
        return Err(EngineError::validation("video_duration_seconds must not be negative"));
    }
    Ok(())
}

/// Validates quiz settings and returns the normalized question bank.
pub fn new_quiz(req: &NewQuiz) -> EngineResult<Vec<Question>> {
    title(&req.title)?;
    if !(0..=100).contains(&req.passing_score) {
        return Err(EngineError::validation("passing_score must be between 0 and 100"));
    }
    if matches!(req.questions_per_attempt, Some(k) if k < 1) {
        return Err(EngineError::validation("questions_per_attempt must be at least 1"));
    }
    let questions = normalize_questions(&req.questions).map_err(EngineError::Validation)?;
    if questions.is_empty() {
        return Err(EngineError::validation("a quiz needs at least one question"));
    }
    Ok(questions)
}

pub fn answers(answers: &[SubmittedAnswer]) -> EngineResult<()> {
    if answers.len() > MAX_ANSWERS {
        return Err(EngineError::validation(format!(
            "at most {MAX_ANSWERS} answers per submission"
        )));
    }
    Ok(())
}

pub fn time_spent(v: Option<i64>) -> EngineResult<i32> {
    match v {
        None => Ok(0),
        Some(s) if s < 0 => Err(EngineError::validation("time_spent_seconds must not be negative")),
        Some(s) => Ok(i32::try_from(s).unwrap_or(i32::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn watched_seconds_rejects_bad_numbers() {
        assert_matches!(watched_seconds(-1.0), Err(EngineError::Validation(_)));
        assert_matches!(watched_seconds(f64::NAN), Err(EngineError::Validation(_)));
        assert_matches!(watched_seconds(f64::INFINITY), Err(EngineError::Validation(_)));
        assert_eq!(watched_seconds(12.9).unwrap(), 12);
        assert_eq!(watched_seconds(0.0).unwrap(), 0);
    }

    fn quiz(passing_score: i32, questions: serde_json::Value) -> NewQuiz {
        NewQuiz {
            title: "Safety basics".into(),
            passing_score,
            questions_per_attempt: None,
            shuffle_options: false,
            questions,
        }
    }

    #[test]
    fn new_quiz_checks_settings_and_content() {
        let qs = json!([{"text": "?", "options": ["a", "b"], "correct_answer": 0}]);
        assert_eq!(new_quiz(&quiz(70, qs.clone())).unwrap().len(), 1);
        assert_matches!(new_quiz(&quiz(101, qs.clone())), Err(EngineError::Validation(_)));
        assert_matches!(new_quiz(&quiz(70, json!([]))), Err(EngineError::Validation(_)));

        let mut zero_k = quiz(70, qs);
        zero_k.questions_per_attempt = Some(0);
        assert_matches!(new_quiz(&zero_k), Err(EngineError::Validation(_)));
    }

    #[test]
    fn titles_must_be_present_and_bounded() {
        assert!(title("Intro").is_ok());
        assert!(title("   ").is_err());
        assert!(title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn time_spent_defaults_and_bounds() {
        assert_eq!(time_spent(None).unwrap(), 0);
        assert_eq!(time_spent(Some(90)).unwrap(), 90);
        assert_eq!(time_spent(Some(i64::MAX)).unwrap(), i32::MAX);
        assert!(time_spent(Some(-3)).is_err());
    }
}
