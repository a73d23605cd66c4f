//! Deliberation report types with JSON persistence and standing comparison.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluator::AcademicRules;
use crate::insight::Insight;
use crate::model::{Cohort, Standing};
use crate::statistics::DeliberationBoard;

/// A complete deliberation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the cohort.
    pub cohort: CohortSummary,
    /// Thresholds the board was computed with.
    pub rules: AcademicRules,
    pub board: DeliberationBoard,
    /// Optional dashboard summary attached by the CLI.
    #[serde(default)]
    pub insight: Option<Insight>,
}

/// Summary of a cohort (without the student records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortSummary {
    pub id: String,
    pub name: String,
    pub student_count: usize,
}

impl From<&Cohort> for CohortSummary {
    fn from(cohort: &Cohort) -> Self {
        Self {
            id: cohort.id.clone(),
            name: cohort.name.clone(),
            student_count: cohort.students.len(),
        }
    }
}

impl BoardReport {
    pub fn new(cohort: &Cohort, rules: AcademicRules, board: DeliberationBoard) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            cohort: CohortSummary::from(cohort),
            rules,
            board,
            insight: None,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: BoardReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare this report against a baseline, student by student.
    ///
    /// Standings are compared between evaluated rows. A student evaluated in
    /// the baseline whose current row carries an error is reported as no
    /// longer evaluated, which counts as a decline.
    pub fn compare(&self, baseline: &BoardReport) -> StandingDiff {
        let standings = |report: &BoardReport| -> HashMap<String, (String, Standing, f64)> {
            report
                .board
                .rows
                .iter()
                .filter_map(|row| {
                    let eval = row.evaluation.as_ref()?;
                    Some((
                        row.student_id.clone(),
                        (
                            row.student_name.clone(),
                            eval.overall_standing,
                            eval.weighted_average,
                        ),
                    ))
                })
                .collect()
        };

        let baseline_map = standings(baseline);
        let current_map = standings(self);

        let mut improved = Vec::new();
        let mut declined = Vec::new();
        let mut unchanged = 0usize;
        let mut new_students = Vec::new();

        for (id, (name, current, current_average)) in &current_map {
            match baseline_map.get(id) {
                Some((_, before, baseline_average)) => {
                    let change = StandingChange {
                        student_id: id.clone(),
                        student_name: name.clone(),
                        baseline: *before,
                        current: *current,
                        baseline_average: *baseline_average,
                        current_average: *current_average,
                    };
                    match current.cmp(before) {
                        std::cmp::Ordering::Greater => improved.push(change),
                        std::cmp::Ordering::Less => declined.push(change),
                        std::cmp::Ordering::Equal => unchanged += 1,
                    }
                }
                None => new_students.push(id.clone()),
            }
        }

        let on_current_board: HashSet<&str> = self
            .board
            .rows
            .iter()
            .map(|row| row.student_id.as_str())
            .collect();
        let (mut no_longer_evaluated, mut removed_students): (Vec<String>, Vec<String>) =
            baseline_map
                .keys()
                .filter(|k| !current_map.contains_key(*k))
                .cloned()
                .partition(|id| on_current_board.contains(id.as_str()));

        improved.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        declined.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        new_students.sort();
        removed_students.sort();
        no_longer_evaluated.sort();

        StandingDiff {
            improved,
            declined,
            unchanged,
            new_students,
            removed_students,
            no_longer_evaluated,
        }
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingDiff {
    /// Students whose standing went up.
    pub improved: Vec<StandingChange>,
    /// Students whose standing went down.
    pub declined: Vec<StandingChange>,
    pub unchanged: usize,
    /// Students in current but not baseline.
    pub new_students: Vec<String>,
    /// Students in baseline but not current.
    pub removed_students: Vec<String>,
    /// Students evaluated in baseline whose current records are invalid.
    #[serde(default)]
    pub no_longer_evaluated: Vec<String>,
}

/// One student's standing in both reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingChange {
    pub student_id: String,
    pub student_name: String,
    pub baseline: Standing,
    pub current: Standing,
    pub baseline_average: f64,
    pub current_average: f64,
}

impl StandingChange {
    pub fn delta(&self) -> f64 {
        self.current_average - self.baseline_average
    }
}

impl StandingDiff {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} declined, {} improved, {} unchanged, {} new, {} removed, {} no longer evaluated\n\n",
            self.declined.len(),
            self.improved.len(),
            self.unchanged,
            self.new_students.len(),
            self.removed_students.len(),
            self.no_longer_evaluated.len()
        ));

        for (title, changes) in [("Declined", &self.declined), ("Improved", &self.improved)] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Student | Baseline | Current | Average delta |\n");
            md.push_str("|---------|----------|---------|---------------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} ({}) | {} | {} | {:+.2} |\n",
                    c.student_name,
                    c.student_id,
                    c.baseline,
                    c.current,
                    c.delta()
                ));
            }
            md.push('\n');
        }

        if !self.no_longer_evaluated.is_empty() {
            md.push_str("### No longer evaluated\n\n");
            for id in &self.no_longer_evaluated {
                md.push_str(&format!("- {id}\n"));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if any student's standing went down or could no longer
    /// be evaluated.
    pub fn has_declines(&self) -> bool {
        !self.declined.is_empty() || !self.no_longer_evaluated.is_empty()
    }
}
