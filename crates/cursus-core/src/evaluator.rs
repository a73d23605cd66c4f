//! The academic evaluator.
//!
//! Pure, stateless computation of averages, grade statuses, semester
//! standing and attendance risk. Every operation validates its input at the
//! boundary and fails instead of clamping. An `AcademicEvaluator` is `Copy`
//! and holds only its rule set, so it can be shared freely across tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::model::{
    validate_attendance_rate, validate_grade_value, Appreciation, EvaluationResult, GradeEntry,
    GradeStatus, RiskLevel, Standing, StudentAcademicProfile, GRADE_SCALE_MAX, GRADE_SCALE_MIN,
};

type Result<T> = std::result::Result<T, EvaluationError>;

/// Grades strictly below this are eliminatory.
pub const ELIMINATORY_THRESHOLD: f64 = 5.0;
/// Grades and averages at or above this are validated.
pub const VALIDATION_THRESHOLD: f64 = 12.0;
/// Averages strictly below this mean repeating the year.
pub const REPEATING_THRESHOLD: f64 = 7.0;
/// Attendance below this percentage is high risk and grounds for expulsion.
pub const EXPULSION_ATTENDANCE_THRESHOLD: f64 = 75.0;
/// Attendance at or above this percentage is low risk.
pub const LOW_RISK_ATTENDANCE_THRESHOLD: f64 = 90.0;

/// Thresholds applied by the evaluator.
///
/// Defaults are the institution's inferred regulations; a deployment can
/// override them through the `[rules]` table of its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcademicRules {
    pub eliminatory_below: f64,
    pub validated_from: f64,
    pub repeating_below: f64,
    pub high_risk_below: f64,
    pub low_risk_from: f64,
}

impl Default for AcademicRules {
    fn default() -> Self {
        Self {
            eliminatory_below: ELIMINATORY_THRESHOLD,
            validated_from: VALIDATION_THRESHOLD,
            repeating_below: REPEATING_THRESHOLD,
            high_risk_below: EXPULSION_ATTENDANCE_THRESHOLD,
            low_risk_from: LOW_RISK_ATTENDANCE_THRESHOLD,
        }
    }
}

impl AcademicRules {
    /// Reject rule sets whose brackets overlap or leave their scale.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("eliminatory_below", self.eliminatory_below),
            ("validated_from", self.validated_from),
            ("repeating_below", self.repeating_below),
        ] {
            if !value.is_finite() || !(GRADE_SCALE_MIN..=GRADE_SCALE_MAX).contains(&value) {
                return Err(EvaluationError::invalid(format!(
                    "rule {name} = {value} is outside the grade scale"
                )));
            }
        }
        for (name, value) in [
            ("high_risk_below", self.high_risk_below),
            ("low_risk_from", self.low_risk_from),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(EvaluationError::invalid(format!(
                    "rule {name} = {value} is not a percentage"
                )));
            }
        }
        if self.eliminatory_below > self.repeating_below
            || self.repeating_below > self.validated_from
        {
            return Err(EvaluationError::invalid(
                "grade thresholds must satisfy eliminatory_below <= repeating_below <= validated_from",
            ));
        }
        if self.high_risk_below > self.low_risk_from {
            return Err(EvaluationError::invalid(
                "attendance thresholds must satisfy high_risk_below <= low_risk_from",
            ));
        }
        Ok(())
    }
}

/// Weighted average of one subject's grades, as shown on a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject_name: String,
    pub average: f64,
    pub total_weight: u32,
    pub grade_count: usize,
    pub status: GradeStatus,
    pub appreciation: Appreciation,
}

/// Stateless evaluator parameterised by a rule set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AcademicEvaluator {
    rules: AcademicRules,
}

impl AcademicEvaluator {
    pub fn new(rules: AcademicRules) -> Result<Self> {
        rules.validate()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &AcademicRules {
        &self.rules
    }

    /// `Σ(value·weight) / Σ(weight)`.
    ///
    /// Fails with `InvalidInput` on an empty sequence or zero total weight,
    /// and with the entry's own error on an invalid grade.
    pub fn compute_weighted_average(&self, grades: &[GradeEntry]) -> Result<f64> {
        if grades.is_empty() {
            return Err(EvaluationError::invalid(
                "cannot average an empty grade sequence",
            ));
        }
        validate_all(grades)?;

        let (weighted_sum, total_weight) = weighted_totals(grades);
        if total_weight == 0 {
            return Err(EvaluationError::invalid("total weight is zero"));
        }
        Ok(weighted_sum / total_weight as f64)
    }

    /// Classify a grade or average. Each bracket includes its lower bound.
    pub fn classify_grade(&self, value: f64) -> Result<GradeStatus> {
        validate_grade_value(value)?;
        Ok(self.classify_unchecked(value))
    }

    /// Semester standing; the first matching rule wins:
    /// any eliminatory grade, then a repeating average, then a retake average.
    ///
    /// The module counters are checked for consistency but do not alter the
    /// rule order.
    pub fn compute_overall_standing(
        &self,
        grades: &[GradeEntry],
        modules_validated: u32,
        modules_required: u32,
    ) -> Result<Standing> {
        if modules_validated > modules_required {
            return Err(EvaluationError::invalid(format!(
                "{modules_validated} modules validated out of {modules_required} required"
            )));
        }
        let average = self.compute_weighted_average(grades)?;

        if grades
            .iter()
            .any(|g| self.classify_unchecked(g.value) == GradeStatus::Eliminatory)
        {
            return Ok(Standing::Excluded);
        }
        if average < self.rules.repeating_below {
            return Ok(Standing::Repeating);
        }
        if average < self.rules.validated_from {
            return Ok(Standing::Retake);
        }
        Ok(Standing::Admitted)
    }

    /// Attendance-derived risk.
    pub fn compute_attendance_risk(&self, attendance_rate_percent: f64) -> Result<RiskLevel> {
        validate_attendance_rate(attendance_rate_percent)?;
        Ok(if attendance_rate_percent < self.rules.high_risk_below {
            RiskLevel::High
        } else if attendance_rate_percent < self.rules.low_risk_from {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        })
    }

    /// Percentage of entries at or above the validation threshold; 0 when
    /// there are none.
    pub fn compute_pass_rate(&self, grades: &[GradeEntry]) -> Result<f64> {
        if grades.is_empty() {
            return Ok(0.0);
        }
        validate_all(grades)?;
        let passed = grades
            .iter()
            .filter(|g| g.value >= self.rules.validated_from)
            .count();
        Ok(passed as f64 * 100.0 / grades.len() as f64)
    }

    /// Per-subject weighted averages, in order of first appearance.
    pub fn subject_averages(&self, grades: &[GradeEntry]) -> Result<Vec<SubjectSummary>> {
        validate_all(grades)?;

        let mut order: Vec<&str> = Vec::new();
        let mut by_subject: BTreeMap<&str, Vec<&GradeEntry>> = BTreeMap::new();
        for grade in grades {
            let entry = by_subject.entry(grade.subject_name.as_str()).or_default();
            if entry.is_empty() {
                order.push(grade.subject_name.as_str());
            }
            entry.push(grade);
        }

        let summaries = order
            .into_iter()
            .map(|subject| {
                let entries = &by_subject[subject];
                let weighted_sum: f64 = entries.iter().map(|g| g.value * g.weight as f64).sum();
                let total_weight: u32 = entries.iter().map(|g| g.weight).sum();
                let average = weighted_sum / total_weight as f64;
                SubjectSummary {
                    subject_name: subject.to_string(),
                    average,
                    total_weight,
                    grade_count: entries.len(),
                    status: self.classify_unchecked(average),
                    appreciation: Appreciation::from_average(average),
                }
            })
            .collect();
        Ok(summaries)
    }

    /// Evaluate a whole profile.
    pub fn evaluate(&self, profile: &StudentAcademicProfile) -> Result<EvaluationResult> {
        let grades = profile.grades();
        let weighted_average = self.compute_weighted_average(grades)?;

        let status_per_grade = grades
            .iter()
            .map(|g| (g.id.clone(), self.classify_unchecked(g.value)))
            .collect::<BTreeMap<_, _>>();

        let subjects = self.subject_averages(grades)?;
        let modules_required = subjects.len() as u32;
        let modules_validated = subjects
            .iter()
            .filter(|s| s.status == GradeStatus::Validated)
            .count() as u32;

        let overall_standing =
            self.compute_overall_standing(grades, modules_validated, modules_required)?;
        let attendance_rate_percent = profile.attendance_rate_percent();
        let risk_level = self.compute_attendance_risk(attendance_rate_percent)?;
        let pass_rate = self.compute_pass_rate(grades)?;

        tracing::debug!(
            student = profile.student_id(),
            weighted_average,
            standing = %overall_standing,
            risk = %risk_level,
            "evaluated profile"
        );

        Ok(EvaluationResult {
            weighted_average,
            status_per_grade,
            overall_standing,
            risk_level,
            attendance_rate_percent,
            pass_rate,
            modules_validated,
            modules_required,
        })
    }

    /// Average needed over `remaining_weight` further coefficients for the
    /// overall average to reach `target`.
    ///
    /// The result is not clamped: above 20 means the target is out of reach,
    /// zero or below means it is already secured.
    pub fn required_average(
        &self,
        grades: &[GradeEntry],
        remaining_weight: u32,
        target: f64,
    ) -> Result<f64> {
        validate_grade_value(target)?;
        if remaining_weight == 0 {
            return Err(EvaluationError::invalid(
                "remaining weight must be at least 1",
            ));
        }
        validate_all(grades)?;

        let (weighted_sum, total_weight) = weighted_totals(grades);
        let remaining = remaining_weight as f64;
        Ok((target * (total_weight as f64 + remaining) - weighted_sum) / remaining)
    }

    fn classify_unchecked(&self, value: f64) -> GradeStatus {
        if value < self.rules.eliminatory_below {
            GradeStatus::Eliminatory
        } else if value < self.rules.validated_from {
            GradeStatus::Retake
        } else {
            GradeStatus::Validated
        }
    }
}

fn validate_all(grades: &[GradeEntry]) -> Result<()> {
    grades.iter().try_for_each(GradeEntry::validate)
}

fn weighted_totals(grades: &[GradeEntry]) -> (f64, u64) {
    grades.iter().fold((0.0, 0u64), |(sum, weight), g| {
        (sum + g.value * g.weight as f64, weight + g.weight as u64)
    })
}

/// Round half away from zero to two decimals, for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Default-rule shorthands
// ---------------------------------------------------------------------------

pub fn compute_weighted_average(grades: &[GradeEntry]) -> Result<f64> {
    AcademicEvaluator::default().compute_weighted_average(grades)
}

pub fn classify_grade(value: f64) -> Result<GradeStatus> {
    AcademicEvaluator::default().classify_grade(value)
}

pub fn compute_overall_standing(
    grades: &[GradeEntry],
    modules_validated: u32,
    modules_required: u32,
) -> Result<Standing> {
    AcademicEvaluator::default().compute_overall_standing(grades, modules_validated, modules_required)
}

pub fn compute_attendance_risk(attendance_rate_percent: f64) -> Result<RiskLevel> {
    AcademicEvaluator::default().compute_attendance_risk(attendance_rate_percent)
}

pub fn compute_pass_rate(grades: &[GradeEntry]) -> Result<f64> {
    AcademicEvaluator::default().compute_pass_rate(grades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceRecord, AttendanceStatus};

    fn grades(pairs: &[(f64, u32)]) -> Vec<GradeEntry> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(value, weight))| {
                GradeEntry::new(&format!("G{}", i + 1), &format!("Subject {i}"), value, weight)
            })
            .collect()
    }

    fn semester_report() -> Vec<GradeEntry> {
        grades(&[
            (15.75, 4),
            (13.5, 3),
            (14.0, 4),
            (11.25, 2),
            (16.0, 2),
            (12.5, 3),
        ])
    }

    #[test]
    fn weighted_average_of_semester_report() {
        let avg = compute_weighted_average(&semester_report()).unwrap();
        assert!((avg - 251.5 / 18.0).abs() < 1e-9, "got {avg}");
        assert_eq!(round2(avg), 13.97);
    }

    #[test]
    fn weighted_average_rejects_empty() {
        assert!(matches!(
            compute_weighted_average(&[]),
            Err(EvaluationError::InvalidInput(_))
        ));
    }

    #[test]
    fn weighted_average_rejects_bad_entries() {
        assert!(matches!(
            compute_weighted_average(&grades(&[(12.0, 1), (25.0, 1)])),
            Err(EvaluationError::OutOfRange { .. })
        ));
        assert!(matches!(
            compute_weighted_average(&grades(&[(12.0, 0), (14.0, 0)])),
            Err(EvaluationError::InvalidInput(_))
        ));
    }

    #[test]
    fn weighted_average_stays_within_bounds() {
        // Small LCG so the sample is reproducible.
        let mut seed: u64 = 0x5eed;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        for _ in 0..500 {
            let len = (next() % 8 + 1) as usize;
            let sample: Vec<(f64, u32)> = (0..len)
                .map(|_| ((next() % 2001) as f64 / 100.0, next() % 6 + 1))
                .collect();
            let entries = grades(&sample);
            let avg = compute_weighted_average(&entries).unwrap();
            let min = sample.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
            let max = sample.iter().map(|s| s.0).fold(f64::NEG_INFINITY, f64::max);
            assert!(
                avg >= min - 1e-9 && avg <= max + 1e-9,
                "{avg} outside [{min}, {max}] for {sample:?}"
            );
        }
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify_grade(4.99).unwrap(), GradeStatus::Eliminatory);
        assert_eq!(classify_grade(4.999).unwrap(), GradeStatus::Eliminatory);
        assert_eq!(classify_grade(5.0).unwrap(), GradeStatus::Retake);
        assert_eq!(classify_grade(11.99).unwrap(), GradeStatus::Retake);
        assert_eq!(classify_grade(12.0).unwrap(), GradeStatus::Validated);
        assert_eq!(classify_grade(0.0).unwrap(), GradeStatus::Eliminatory);
        assert_eq!(classify_grade(20.0).unwrap(), GradeStatus::Validated);
    }

    #[test]
    fn classify_rejects_out_of_scale() {
        assert!(matches!(
            classify_grade(20.01),
            Err(EvaluationError::OutOfRange { .. })
        ));
        assert!(matches!(
            classify_grade(f64::INFINITY),
            Err(EvaluationError::InvalidInput(_))
        ));
    }

    #[test]
    fn eliminatory_grade_excludes_regardless_of_average() {
        let entries = grades(&[(18.0, 1), (3.0, 1)]);
        assert_eq!(compute_weighted_average(&entries).unwrap(), 10.5);
        assert_eq!(
            compute_overall_standing(&entries, 1, 2).unwrap(),
            Standing::Excluded
        );
    }

    #[test]
    fn standing_rule_order() {
        assert_eq!(
            compute_overall_standing(&grades(&[(6.0, 1), (7.5, 1)]), 0, 2).unwrap(),
            Standing::Repeating
        );
        assert_eq!(
            compute_overall_standing(&grades(&[(7.0, 1)]), 0, 1).unwrap(),
            Standing::Retake
        );
        assert_eq!(
            compute_overall_standing(&grades(&[(11.0, 1), (12.5, 1)]), 1, 2).unwrap(),
            Standing::Retake
        );
        assert_eq!(
            compute_overall_standing(&semester_report(), 5, 6).unwrap(),
            Standing::Admitted
        );
    }

    #[test]
    fn standing_rejects_inconsistent_module_counts() {
        assert!(matches!(
            compute_overall_standing(&semester_report(), 7, 6),
            Err(EvaluationError::InvalidInput(_))
        ));
    }

    #[test]
    fn standing_of_empty_grades_fails() {
        assert!(compute_overall_standing(&[], 0, 0).is_err());
    }

    #[test]
    fn attendance_risk_boundaries() {
        assert_eq!(compute_attendance_risk(74.0).unwrap(), RiskLevel::High);
        assert_eq!(compute_attendance_risk(74.99).unwrap(), RiskLevel::High);
        assert_eq!(compute_attendance_risk(75.0).unwrap(), RiskLevel::Medium);
        assert_eq!(compute_attendance_risk(89.0).unwrap(), RiskLevel::Medium);
        assert_eq!(compute_attendance_risk(90.0).unwrap(), RiskLevel::Low);
        assert_eq!(compute_attendance_risk(100.0).unwrap(), RiskLevel::Low);
        assert_eq!(EXPULSION_ATTENDANCE_THRESHOLD, 75.0);
    }

    #[test]
    fn attendance_risk_rejects_out_of_range() {
        assert!(matches!(
            compute_attendance_risk(100.5),
            Err(EvaluationError::OutOfRange { .. })
        ));
        assert!(matches!(
            compute_attendance_risk(-1.0),
            Err(EvaluationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn pass_rate() {
        assert_eq!(compute_pass_rate(&[]).unwrap(), 0.0);
        let entries = grades(&[(14.5, 1), (16.0, 1), (8.5, 1), (12.0, 1)]);
        assert_eq!(compute_pass_rate(&entries).unwrap(), 75.0);
    }

    #[test]
    fn operations_are_idempotent() {
        let entries = semester_report();
        let evaluator = AcademicEvaluator::default();
        assert_eq!(
            evaluator.compute_weighted_average(&entries).unwrap(),
            evaluator.compute_weighted_average(&entries).unwrap()
        );
        assert_eq!(
            evaluator.compute_overall_standing(&entries, 5, 6).unwrap(),
            evaluator.compute_overall_standing(&entries, 5, 6).unwrap()
        );
        assert_eq!(
            evaluator.compute_pass_rate(&entries).unwrap(),
            evaluator.compute_pass_rate(&entries).unwrap()
        );
        assert_eq!(
            evaluator.compute_attendance_risk(88.0).unwrap(),
            evaluator.compute_attendance_risk(88.0).unwrap()
        );

        let profile = StudentAcademicProfile::new("S1", entries, vec![]).unwrap();
        assert_eq!(
            evaluator.evaluate(&profile).unwrap(),
            evaluator.evaluate(&profile).unwrap()
        );
    }

    #[test]
    fn evaluate_semester_profile() {
        let attendance = (1..=10)
            .map(|i| AttendanceRecord {
                student_id: "S202401".into(),
                session_id: format!("sess-{i}"),
                status: if i == 3 {
                    AttendanceStatus::Absent
                } else {
                    AttendanceStatus::Present
                },
            })
            .collect();
        let profile =
            StudentAcademicProfile::new("S202401", semester_report(), attendance).unwrap();

        let result = AcademicEvaluator::default().evaluate(&profile).unwrap();
        assert_eq!(round2(result.weighted_average), 13.97);
        assert_eq!(result.overall_standing, Standing::Admitted);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.attendance_rate_percent, 90.0);
        assert_eq!(result.status_per_grade.len(), 6);
        assert_eq!(result.status_per_grade["G4"], GradeStatus::Retake);
        assert!(!result
            .status_per_grade
            .values()
            .any(|s| *s == GradeStatus::Eliminatory));
        assert_eq!(result.modules_required, 6);
        assert_eq!(result.modules_validated, 5);
    }

    #[test]
    fn evaluate_rejects_declared_rate_out_of_range() {
        let profile = StudentAcademicProfile::new("S1", semester_report(), vec![])
            .unwrap()
            .with_declared_attendance_rate(120.0);
        assert!(matches!(
            AcademicEvaluator::default().evaluate(&profile),
            Err(EvaluationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn subject_averages_group_in_first_seen_order() {
        let entries = vec![
            GradeEntry::new("g1", "Graphs", 10.0, 1),
            GradeEntry::new("g2", "Java", 16.0, 2),
            GradeEntry::new("g3", "Graphs", 16.0, 3),
        ];
        let subjects = AcademicEvaluator::default()
            .subject_averages(&entries)
            .unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].subject_name, "Graphs");
        assert_eq!(subjects[0].average, 14.5);
        assert_eq!(subjects[0].total_weight, 4);
        assert_eq!(subjects[0].appreciation, Appreciation::VeryGood);
        assert_eq!(subjects[1].status, GradeStatus::Validated);
    }

    #[test]
    fn required_average_for_target() {
        let entries = grades(&[(10.0, 2)]);
        let evaluator = AcademicEvaluator::default();
        // (12 * 4 - 20) / 2
        assert_eq!(evaluator.required_average(&entries, 2, 12.0).unwrap(), 14.0);
        assert_eq!(evaluator.required_average(&[], 3, 12.0).unwrap(), 12.0);
        assert!(evaluator.required_average(&entries, 0, 12.0).is_err());
        assert!(matches!(
            evaluator.required_average(&entries, 2, 21.0),
            Err(EvaluationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn custom_rules_shift_brackets() {
        let rules = AcademicRules {
            validated_from: 10.0,
            ..AcademicRules::default()
        };
        let evaluator = AcademicEvaluator::new(rules).unwrap();
        assert_eq!(evaluator.classify_grade(10.0).unwrap(), GradeStatus::Validated);
        assert_eq!(
            evaluator
                .compute_overall_standing(&grades(&[(10.5, 1)]), 1, 1)
                .unwrap(),
            Standing::Admitted
        );
    }

    #[test]
    fn inconsistent_rules_are_rejected() {
        let rules = AcademicRules {
            eliminatory_below: 13.0,
            ..AcademicRules::default()
        };
        assert!(AcademicEvaluator::new(rules).is_err());

        let rules = AcademicRules {
            low_risk_from: 120.0,
            ..AcademicRules::default()
        };
        assert!(AcademicEvaluator::new(rules).is_err());
    }

    #[test]
    fn round2_half_away_from_zero() {
        assert_eq!(round2(14.514), 14.51);
        assert_eq!(round2(10.125), 10.13);
        assert_eq!(round2(0.0), 0.0);
    }
}
