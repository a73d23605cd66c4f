//! The `cursus validate` command.

use std::path::PathBuf;

use anyhow::Result;

use cursus_core::parser::{load_cohorts, validate_cohort};
use cursus_providers::config::load_config_from;

pub fn execute(cohort_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let rules = *config.evaluator()?.rules();
    let cohorts = load_cohorts(&cohort_path)?;

    let mut total_warnings = 0;

    for cohort in &cohorts {
        println!("Cohort: {} ({} students)", cohort.name, cohort.students.len());

        let warnings = validate_cohort(cohort, &rules);
        for w in &warnings {
            let prefix = w
                .student_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if cohorts.is_empty() {
        println!("No cohort files found.");
    } else if total_warnings == 0 {
        println!("All cohorts valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
