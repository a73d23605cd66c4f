//! Cohort-level aggregation: the deliberation board and per-assessment
//! class statistics.

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::evaluator::AcademicEvaluator;
use crate::model::{
    validate_grade_value, Cohort, EvaluationResult, GradeStatus, RiskLevel, Standing,
};

/// One student's line on the deliberation board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRow {
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub major: Option<String>,
    /// Present when the student's records evaluated cleanly.
    #[serde(default)]
    pub evaluation: Option<EvaluationResult>,
    /// Why the student could not be evaluated.
    #[serde(default)]
    pub error: Option<String>,
}

impl BoardRow {
    pub fn standing(&self) -> Option<Standing> {
        self.evaluation.as_ref().map(|e| e.overall_standing)
    }

    pub fn weighted_average(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.weighted_average)
    }
}

/// Number of students per standing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingCounts {
    pub admitted: usize,
    pub retake: usize,
    pub repeating: usize,
    pub excluded: usize,
}

impl StandingCounts {
    pub fn get(&self, standing: Standing) -> usize {
        match standing {
            Standing::Admitted => self.admitted,
            Standing::Retake => self.retake,
            Standing::Repeating => self.repeating,
            Standing::Excluded => self.excluded,
        }
    }

    fn bump(&mut self, standing: Standing) {
        match standing {
            Standing::Admitted => self.admitted += 1,
            Standing::Retake => self.retake += 1,
            Standing::Repeating => self.repeating += 1,
            Standing::Excluded => self.excluded += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.admitted + self.retake + self.repeating + self.excluded
    }
}

/// End-of-semester jury view of a cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationBoard {
    /// Rows by descending weighted average; unevaluated students last.
    pub rows: Vec<BoardRow>,
    pub standing_counts: StandingCounts,
    /// Mean of the evaluated students' weighted averages.
    pub cohort_average: Option<f64>,
    /// Share of evaluated students admitted, in percent.
    pub admission_rate: f64,
    /// Ids of students whose attendance risk is high.
    pub at_risk: Vec<String>,
    pub evaluated: usize,
    pub failed: usize,
}

/// Evaluate every student of a cohort.
///
/// A student whose records are invalid gets a row carrying the error; the
/// rest of the board is still produced.
pub fn deliberation_board(cohort: &Cohort, evaluator: &AcademicEvaluator) -> DeliberationBoard {
    let mut rows = Vec::with_capacity(cohort.students.len());
    let mut standing_counts = StandingCounts::default();
    let mut at_risk = Vec::new();
    let mut averages = Vec::new();

    for student in &cohort.students {
        let (evaluation, error) = match evaluator.evaluate(&student.profile) {
            Ok(result) => {
                standing_counts.bump(result.overall_standing);
                averages.push(result.weighted_average);
                if result.risk_level == RiskLevel::High {
                    at_risk.push(student.id.clone());
                }
                (Some(result), None)
            }
            Err(e) => {
                tracing::warn!("cannot evaluate student {}: {e}", student.id);
                (None, Some(e.to_string()))
            }
        };

        rows.push(BoardRow {
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            major: student.major.clone(),
            evaluation,
            error,
        });
    }

    rows.sort_by(|a, b| match (a.weighted_average(), b.weighted_average()) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.student_name.cmp(&b.student_name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.student_name.cmp(&b.student_name),
    });

    let evaluated = averages.len();
    let cohort_average = if averages.is_empty() {
        None
    } else {
        Some(averages.iter().sum::<f64>() / evaluated as f64)
    };
    let admission_rate = if evaluated == 0 {
        0.0
    } else {
        standing_counts.admitted as f64 * 100.0 / evaluated as f64
    };

    DeliberationBoard {
        failed: rows.len() - evaluated,
        rows,
        standing_counts,
        cohort_average,
        admission_rate,
        at_risk,
        evaluated,
    }
}

/// Summary of one assessment across a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub count: usize,
    pub mean: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Share of grades at or above the validation threshold, in percent.
    pub pass_rate: f64,
    pub eliminatory_count: usize,
}

/// Statistics over one column of grades. An empty column yields zeros.
pub fn class_statistics(
    values: &[f64],
    evaluator: &AcademicEvaluator,
) -> Result<ClassStatistics, EvaluationError> {
    values.iter().try_for_each(|v| validate_grade_value(*v))?;

    if values.is_empty() {
        return Ok(ClassStatistics {
            count: 0,
            mean: 0.0,
            min: None,
            max: None,
            pass_rate: 0.0,
            eliminatory_count: 0,
        });
    }

    let mut passed = 0usize;
    let mut eliminatory_count = 0usize;
    for &value in values {
        match evaluator.classify_grade(value)? {
            GradeStatus::Validated => passed += 1,
            GradeStatus::Eliminatory => eliminatory_count += 1,
            GradeStatus::Retake => {}
        }
    }

    let count = values.len();
    Ok(ClassStatistics {
        count,
        mean: values.iter().sum::<f64>() / count as f64,
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        pass_rate: passed as f64 * 100.0 / count as f64,
        eliminatory_count,
    })
}
