//! Recalculation of every learner's progress after a training's content
//! graph changes.

use serde::Serialize;
use uuid::Uuid;

use crate::engine::{LearningEngine, Rollup};
use crate::error::EngineResult;
use crate::notify::RequirementsChanged;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecalcFailure {
    pub learner_id: Uuid,
    pub error: String,
}

/// Outcome of one recalculation pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecalculationReport {
    pub training_id: Uuid,
    pub processed: usize,
    /// Learners who were complete before the change and no longer are.
    pub demoted: Vec<Uuid>,
    pub promoted: Vec<Uuid>,
    /// Nothing was written for these learners.
    pub failed: Vec<RecalcFailure>,
    /// Progress was saved and any flip is reported above, but the XP award
    /// or course rollup failed. The next pass redoes both.
    pub follow_up_failed: Vec<RecalcFailure>,
}

impl RecalculationReport {
    fn new(training_id: Uuid) -> Self {
        Self {
            training_id,
            processed: 0,
            demoted: Vec::new(),
            promoted: Vec::new(),
            failed: Vec::new(),
            follow_up_failed: Vec::new(),
        }
    }
}

impl LearningEngine {
    /// Recompute progress for every learner with a record on `training_id`.
    ///
    /// Learners are processed one at a time under their own lock. A failure
    /// for one learner is recorded in the report and does not stop the
    /// others. Every learner's course record is rolled up again, so rerunning
    /// the pass converges.
    pub async fn on_content_graph_changed(
        &self,
        training_id: Uuid,
    ) -> EngineResult<RecalculationReport> {
        let training = self.training(training_id).await?;
        let shape = self.load_shape(&training).await?;
        let records = self.store().list_training_progress(training_id).await?;

        tracing::info!(
            training_id = %training_id,
            learners = records.len(),
            sub_units = shape.sub_units.len(),
            has_video = shape.has_video,
            has_quiz = shape.has_quiz,
            "recalculating training progress"
        );

        let mut report = RecalculationReport::new(training_id);
        for record in records {
            let learner_id = record.learner_id;
            let _guard = self.lock(learner_id, training_id).await;
            match self.settle(learner_id, &training, &shape, Rollup::Always).await {
                Ok(settled) => {
                    report.processed += 1;
                    if settled.demoted() {
                        report.demoted.push(learner_id);
                    } else if settled.promoted() {
                        report.promoted.push(learner_id);
                    }
                    if let Some(e) = settled.follow_up {
                        report.follow_up_failed.push(RecalcFailure {
                            learner_id,
                            error: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::error!(
                        learner_id = %learner_id,
                        training_id = %training_id,
                        error = %e,
                        "recalculation failed for learner"
                    );
                    report.failed.push(RecalcFailure {
                        learner_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.demoted.is_empty() {
            let alert = RequirementsChanged {
                learner_ids: report.demoted.clone(),
                training_id,
                training_title: training.title.clone(),
            };
            if let Err(e) = self.notifier().requirements_changed(&alert).await {
                tracing::warn!(training_id = %training_id, error = %e, "requirements alert not delivered");
            }
        }

        tracing::info!(
            training_id = %training_id,
            processed = report.processed,
            demoted = report.demoted.len(),
            promoted = report.promoted.len(),
            failed = report.failed.len(),
            follow_up_failed = report.follow_up_failed.len(),
            "recalculation finished"
        );
        Ok(report)
    }
}
