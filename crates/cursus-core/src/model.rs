//! Core data model types for cursus.
//!
//! Grade entries and attendance records are supplied by a data provider
//! (teacher input, import pipeline, mock data). Everything else in this
//! module is derived from them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// Lowest grade on the 0–20 scale.
pub const GRADE_SCALE_MIN: f64 = 0.0;
/// Highest grade on the 0–20 scale.
pub const GRADE_SCALE_MAX: f64 = 20.0;

/// A single recorded grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    /// Unique identifier within a student's profile.
    pub id: String,
    /// Subject (module) the grade belongs to.
    pub subject_name: String,
    /// Grade on the 0–20 scale.
    pub value: f64,
    /// Coefficient, at least 1.
    pub weight: u32,
    /// Date the grade was recorded.
    #[serde(default)]
    pub recorded_date: Option<NaiveDate>,
    /// Teacher who issued the grade.
    #[serde(default)]
    pub issuer_name: String,
}

impl GradeEntry {
    pub fn new(id: &str, subject_name: &str, value: f64, weight: u32) -> Self {
        Self {
            id: id.to_string(),
            subject_name: subject_name.to_string(),
            value,
            weight,
            recorded_date: None,
            issuer_name: String::new(),
        }
    }

    /// Check the entry's invariants: `0 ≤ value ≤ 20`, `weight ≥ 1`.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.id.trim().is_empty() {
            return Err(EvaluationError::invalid("grade entry has an empty id"));
        }
        validate_grade_value(self.value)?;
        if self.weight == 0 {
            return Err(EvaluationError::invalid(format!(
                "grade '{}' has weight 0, weights start at 1",
                self.id
            )));
        }
        Ok(())
    }
}

/// Reject non-finite values and values outside the 0–20 scale.
pub fn validate_grade_value(value: f64) -> Result<(), EvaluationError> {
    if !value.is_finite() {
        return Err(EvaluationError::invalid(format!(
            "grade value must be a finite number, got {value}"
        )));
    }
    if !(GRADE_SCALE_MIN..=GRADE_SCALE_MAX).contains(&value) {
        return Err(EvaluationError::OutOfRange {
            field: "grade value",
            value,
            min: GRADE_SCALE_MIN,
            max: GRADE_SCALE_MAX,
        });
    }
    Ok(())
}

/// Reject non-finite rates and rates outside 0–100.
pub fn validate_attendance_rate(rate: f64) -> Result<(), EvaluationError> {
    if !rate.is_finite() {
        return Err(EvaluationError::invalid(format!(
            "attendance rate must be a finite number, got {rate}"
        )));
    }
    if !(0.0..=100.0).contains(&rate) {
        return Err(EvaluationError::OutOfRange {
            field: "attendance rate",
            value: rate,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(())
}

/// Attendance status for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excluded,
}

impl AttendanceStatus {
    /// Only `Present` counts towards the attendance rate.
    pub fn counts_as_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "present"),
            AttendanceStatus::Absent => write!(f, "absent"),
            AttendanceStatus::Late => write!(f, "late"),
            AttendanceStatus::Excluded => write!(f, "excluded"),
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "a" => Ok(AttendanceStatus::Absent),
            "late" | "l" | "retard" => Ok(AttendanceStatus::Late),
            "excluded" | "exclu" => Ok(AttendanceStatus::Excluded),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One student's attendance for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub session_id: String,
    pub status: AttendanceStatus,
}

/// Grades and attendance of one student.
///
/// Fields are private: a profile is rebuilt from its records, never patched.
/// The attendance rate is derived from the records on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentAcademicProfile {
    student_id: String,
    grades: Vec<GradeEntry>,
    attendance: Vec<AttendanceRecord>,
    declared_attendance_rate: Option<f64>,
}

impl StudentAcademicProfile {
    /// Build a profile, rejecting duplicate grade ids, duplicate
    /// `(student_id, session_id)` pairs and records of other students.
    pub fn new(
        student_id: &str,
        grades: Vec<GradeEntry>,
        attendance: Vec<AttendanceRecord>,
    ) -> Result<Self, EvaluationError> {
        let mut grade_ids = HashSet::new();
        for grade in &grades {
            if !grade_ids.insert(grade.id.as_str()) {
                return Err(EvaluationError::invalid(format!(
                    "duplicate grade id '{}' for student '{student_id}'",
                    grade.id
                )));
            }
        }

        let mut sessions = HashSet::new();
        for record in &attendance {
            if record.student_id != student_id {
                return Err(EvaluationError::invalid(format!(
                    "attendance record for '{}' found in profile of '{student_id}'",
                    record.student_id
                )));
            }
            if !sessions.insert(record.session_id.as_str()) {
                return Err(EvaluationError::invalid(format!(
                    "duplicate attendance record for ({student_id}, {})",
                    record.session_id
                )));
            }
        }

        Ok(Self {
            student_id: student_id.to_string(),
            grades,
            attendance,
            declared_attendance_rate: None,
        })
    }

    /// Attach a rate supplied by the data provider. It is only used when the
    /// profile carries no attendance records; it is range-checked by the
    /// evaluator, not here.
    pub fn with_declared_attendance_rate(mut self, rate: f64) -> Self {
        self.declared_attendance_rate = Some(rate);
        self
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn grades(&self) -> &[GradeEntry] {
        &self.grades
    }

    pub fn attendance(&self) -> &[AttendanceRecord] {
        &self.attendance
    }

    /// Present sessions over all recorded sessions, as a percentage.
    ///
    /// Without records, falls back to the declared rate, then to 100.
    pub fn attendance_rate_percent(&self) -> f64 {
        if self.attendance.is_empty() {
            return self.declared_attendance_rate.unwrap_or(100.0);
        }
        let attended = self
            .attendance
            .iter()
            .filter(|r| r.status.counts_as_attended())
            .count();
        attended as f64 * 100.0 / self.attendance.len() as f64
    }

    /// Count of records with the given status.
    pub fn count_status(&self, status: AttendanceStatus) -> usize {
        self.attendance.iter().filter(|r| r.status == status).count()
    }
}

/// Per-grade classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    Eliminatory,
    Retake,
    Validated,
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeStatus::Eliminatory => write!(f, "eliminatory"),
            GradeStatus::Retake => write!(f, "retake"),
            GradeStatus::Validated => write!(f, "validated"),
        }
    }
}

/// Jury-facing semester outcome, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Excluded,
    Repeating,
    Retake,
    Admitted,
}

impl Standing {
    pub const ALL: [Standing; 4] = [
        Standing::Admitted,
        Standing::Retake,
        Standing::Repeating,
        Standing::Excluded,
    ];
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Standing::Excluded => write!(f, "excluded"),
            Standing::Repeating => write!(f, "repeating"),
            Standing::Retake => write!(f, "retake"),
            Standing::Admitted => write!(f, "admitted"),
        }
    }
}

/// Attendance-derived early-warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Transcript appreciation for a subject or overall average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Appreciation {
    Insufficient,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl Appreciation {
    pub fn from_average(average: f64) -> Self {
        if average < 10.0 {
            Appreciation::Insufficient
        } else if average < 12.0 {
            Appreciation::Fair
        } else if average < 14.0 {
            Appreciation::Good
        } else if average < 16.0 {
            Appreciation::VeryGood
        } else {
            Appreciation::Excellent
        }
    }
}

impl fmt::Display for Appreciation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Appreciation::Insufficient => write!(f, "Insufficient"),
            Appreciation::Fair => write!(f, "Fair"),
            Appreciation::Good => write!(f, "Good"),
            Appreciation::VeryGood => write!(f, "Very Good"),
            Appreciation::Excellent => write!(f, "Excellent"),
        }
    }
}

/// Outcome of evaluating one profile. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Σ(value·weight)/Σ(weight), unrounded.
    pub weighted_average: f64,
    /// Classification of each grade, keyed by grade id.
    pub status_per_grade: BTreeMap<String, GradeStatus>,
    pub overall_standing: Standing,
    pub risk_level: RiskLevel,
    /// Attendance rate the risk level was derived from.
    pub attendance_rate_percent: f64,
    /// Share of grades at or above the validation threshold, in percent.
    pub pass_rate: f64,
    /// Subjects whose weighted average is validated.
    pub modules_validated: u32,
    /// Distinct subjects in the profile.
    pub modules_required: u32,
}

/// A student as known to the data provider.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub major: Option<String>,
    pub profile: StudentAcademicProfile,
}

/// A class or promotion going through deliberation together.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub id: String,
    pub name: String,
    pub students: Vec<StudentRecord>,
}

impl Cohort {
    pub fn find_student(&self, id: &str) -> Option<&StudentRecord> {
        self.students.iter().find(|s| s.id == id)
    }
}
