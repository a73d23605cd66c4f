//! TOML cohort file parser.
//!
//! Loads cohorts from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::evaluator::AcademicRules;
use crate::model::{
    validate_attendance_rate, AttendanceRecord, AttendanceStatus, Cohort, GradeEntry,
    StudentAcademicProfile, StudentRecord,
};

/// Intermediate TOML structure for parsing cohort files.
#[derive(Debug, Deserialize)]
struct TomlCohortFile {
    cohort: TomlCohortHeader,
    #[serde(default)]
    students: Vec<TomlStudent>,
}

#[derive(Debug, Deserialize)]
struct TomlCohortHeader {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlStudent {
    id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    major: Option<String>,
    #[serde(default)]
    attendance_rate: Option<f64>,
    #[serde(default)]
    grades: Vec<TomlGrade>,
    #[serde(default)]
    attendance: Vec<TomlAttendance>,
}

#[derive(Debug, Deserialize)]
struct TomlGrade {
    id: String,
    subject: String,
    value: f64,
    #[serde(default = "default_weight")]
    weight: u32,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TomlAttendance {
    session: String,
    status: String,
}

/// Parse a single TOML file into a `Cohort`.
pub fn parse_cohort(path: &Path) -> Result<Cohort> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cohort file: {}", path.display()))?;

    parse_cohort_str(&content, path)
}

/// Parse a TOML string into a `Cohort` (useful for testing).
pub fn parse_cohort_str(content: &str, source_path: &Path) -> Result<Cohort> {
    let parsed: TomlCohortFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let students = parsed
        .students
        .into_iter()
        .map(|s| {
            let student_id = s.id;

            let grades = s
                .grades
                .into_iter()
                .map(|g| {
                    let recorded_date = g
                        .date
                        .map(|d| {
                            NaiveDate::parse_from_str(&d, "%Y-%m-%d").with_context(|| {
                                format!("grade '{}': invalid date '{d}', expected YYYY-MM-DD", g.id)
                            })
                        })
                        .transpose()?;
                    Ok(GradeEntry {
                        id: g.id,
                        subject_name: g.subject,
                        value: g.value,
                        weight: g.weight,
                        recorded_date,
                        issuer_name: g.issuer.unwrap_or_default(),
                    })
                })
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("student '{student_id}'"))?;

            let attendance = s
                .attendance
                .into_iter()
                .map(|a| {
                    let status: AttendanceStatus = a
                        .status
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!("student '{student_id}': {e}"))?;
                    Ok(AttendanceRecord {
                        student_id: student_id.clone(),
                        session_id: a.session,
                        status,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut profile = StudentAcademicProfile::new(&student_id, grades, attendance)?;
            if let Some(rate) = s.attendance_rate {
                profile = profile.with_declared_attendance_rate(rate);
            }

            Ok(StudentRecord {
                id: student_id,
                name: s.name,
                email: s.email,
                major: s.major,
                profile,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid cohort file: {}", source_path.display()))?;

    Ok(Cohort {
        id: parsed.cohort.id,
        name: parsed.cohort.name,
        students,
    })
}

/// Recursively load all `.toml` cohort files from a directory.
pub fn load_cohort_directory(dir: &Path) -> Result<Vec<Cohort>> {
    let mut cohorts = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            cohorts.extend(load_cohort_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_cohort(&path) {
                Ok(cohort) => cohorts.push(cohort),
                Err(e) => {
                    tracing::warn!("skipping {}: {e:#}", path.display());
                }
            }
        }
    }

    Ok(cohorts)
}

/// Load a single file, or every cohort file under a directory.
pub fn load_cohorts(path: &Path) -> Result<Vec<Cohort>> {
    if path.is_dir() {
        load_cohort_directory(path)
    } else {
        Ok(vec![parse_cohort(path)?])
    }
}

/// A warning from cohort validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The student ID (if applicable).
    pub student_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a cohort for common data-entry issues.
pub fn validate_cohort(cohort: &Cohort, rules: &AcademicRules) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if cohort.students.is_empty() {
        warnings.push(ValidationWarning {
            student_id: None,
            message: "cohort has no students".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for student in &cohort.students {
        if !seen_ids.insert(&student.id) {
            warnings.push(ValidationWarning {
                student_id: Some(student.id.clone()),
                message: format!("duplicate student ID: {}", student.id),
            });
        }
    }

    for student in &cohort.students {
        let warn = |message: String| ValidationWarning {
            student_id: Some(student.id.clone()),
            message,
        };
        let profile = &student.profile;

        if profile.grades().is_empty() {
            warnings.push(warn("no grades recorded".into()));
        }

        for grade in profile.grades() {
            if let Err(e) = grade.validate() {
                warnings.push(warn(format!("grade '{}': {e}", grade.id)));
            }
        }

        let rate = profile.attendance_rate_percent();
        match validate_attendance_rate(rate) {
            Err(e) => warnings.push(warn(e.to_string())),
            Ok(()) if rate < rules.high_risk_below => {
                warnings.push(warn(format!(
                    "attendance rate {rate:.1}% is below the {:.0}% expulsion threshold",
                    rules.high_risk_below
                )));
            }
            Ok(()) => {}
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[cohort]
id = "ginf-3"
name = "GINF 3rd year"

[[students]]
id = "S1"
name = "Yassine Benali"
email = "yassine@school.ma"
major = "GINF"

[[students.grades]]
id = "g1"
subject = "Distributed Systems"
value = 14.5
weight = 2
date = "2025-01-10"
issuer = "Dr. Alami"

[[students.grades]]
id = "g2"
subject = "Compilers"
value = 11.0

[[students.attendance]]
session = "sess-1"
status = "present"

[[students.attendance]]
session = "sess-2"
status = "late"

[[students]]
id = "S2"
name = "Omar Tazi"
attendance_rate = 72.0

[[students.grades]]
id = "g1"
subject = "Compilers"
value = 9.0
weight = 3
"#;

    #[test]
    fn parse_valid_toml() {
        let cohort = parse_cohort_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(cohort.id, "ginf-3");
        assert_eq!(cohort.students.len(), 2);

        let s1 = cohort.find_student("S1").unwrap();
        assert_eq!(s1.major.as_deref(), Some("GINF"));
        assert_eq!(s1.profile.grades().len(), 2);
        assert_eq!(s1.profile.grades()[0].weight, 2);
        assert_eq!(s1.profile.grades()[1].weight, 1);
        assert_eq!(
            s1.profile.grades()[0].recorded_date,
            NaiveDate::from_ymd_opt(2025, 1, 10)
        );
        assert_eq!(s1.profile.grades()[0].issuer_name, "Dr. Alami");
        assert_eq!(s1.profile.attendance_rate_percent(), 50.0);

        let s2 = cohort.find_student("S2").unwrap();
        assert_eq!(s2.profile.attendance_rate_percent(), 72.0);
    }

    #[test]
    fn parse_rejects_unknown_status() {
        let toml = r#"
[cohort]
id = "c"
name = "C"

[[students]]
id = "S1"
name = "A"

[[students.attendance]]
session = "s1"
status = "sleeping"
"#;
        let err = parse_cohort_str(toml, &PathBuf::from("c.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("unknown attendance status"));
    }

    #[test]
    fn parse_rejects_duplicate_sessions() {
        let toml = r#"
[cohort]
id = "c"
name = "C"

[[students]]
id = "S1"
name = "A"

[[students.attendance]]
session = "s1"
status = "present"

[[students.attendance]]
session = "s1"
status = "absent"
"#;
        let err = parse_cohort_str(toml, &PathBuf::from("c.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate attendance record"));
    }

    #[test]
    fn parse_rejects_bad_date() {
        let toml = r#"
[cohort]
id = "c"
name = "C"

[[students]]
id = "S1"
name = "A"

[[students.grades]]
id = "g1"
subject = "Maths"
value = 12.0
date = "10/01/2025"
"#;
        let err = parse_cohort_str(toml, &PathBuf::from("c.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("expected YYYY-MM-DD"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_cohort_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_data_issues() {
        let toml = r#"
[cohort]
id = "c"
name = "C"

[[students]]
id = "S1"
name = "A"
attendance_rate = 60.0

[[students.grades]]
id = "g1"
subject = "Maths"
value = 24.0

[[students]]
id = "S1"
name = "B"
"#;
        let cohort = parse_cohort_str(toml, &PathBuf::from("c.toml")).unwrap();
        let warnings = validate_cohort(&cohort, &AcademicRules::default());

        assert!(warnings.iter().any(|w| w.message.contains("duplicate student ID")));
        assert!(warnings.iter().any(|w| w.message.contains("out of range")));
        assert!(warnings.iter().any(|w| w.message.contains("expulsion threshold")));
        assert!(warnings.iter().any(|w| w.message == "no grades recorded"));
    }

    #[test]
    fn validate_clean_cohort() {
        let cohort = parse_cohort_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_cohort(&cohort, &AcademicRules::default());
        // S1 attended one of two sessions.
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.message.contains("expulsion")));
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ginf.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[cohort").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let cohorts = load_cohort_directory(dir.path()).unwrap();
        assert_eq!(cohorts.len(), 1);
        assert_eq!(cohorts[0].id, "ginf-3");
    }

    #[test]
    fn load_cohorts_accepts_file_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ginf.toml");
        std::fs::write(&file, VALID_TOML).unwrap();

        assert_eq!(load_cohorts(&file).unwrap().len(), 1);
        assert_eq!(load_cohorts(dir.path()).unwrap().len(), 1);
    }
}
