//! The `cursus compare` command.

use std::path::PathBuf;

use anyhow::Result;

use cursus_core::report::BoardReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    fail_on_decline: bool,
    format: String,
) -> Result<()> {
    let baseline = BoardReport::load_json(&baseline_path)?;
    let current = BoardReport::load_json(&current_path)?;

    if baseline.cohort.id != current.cohort.id {
        eprintln!(
            "Warning: comparing different cohorts ({} vs {})",
            baseline.cohort.id, current.cohort.id
        );
    }

    let diff = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", diff.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        _ => {
            println!(
                "Comparison: {} declined, {} improved, {} unchanged",
                diff.declined.len(),
                diff.improved.len(),
                diff.unchanged
            );

            for (title, changes) in [("Declined", &diff.declined), ("Improved", &diff.improved)] {
                if changes.is_empty() {
                    continue;
                }
                println!("\n{title}:");
                for c in changes {
                    println!(
                        "  {} ({}) {} -> {} ({:+.2})",
                        c.student_name,
                        c.student_id,
                        c.baseline,
                        c.current,
                        c.delta()
                    );
                }
            }

            if !diff.new_students.is_empty() {
                println!("\n{} new student(s)", diff.new_students.len());
            }
            if !diff.removed_students.is_empty() {
                println!("{} removed student(s)", diff.removed_students.len());
            }
            if !diff.no_longer_evaluated.is_empty() {
                println!(
                    "\nNo longer evaluated: {}",
                    diff.no_longer_evaluated.join(", ")
                );
            }
        }
    }

    if fail_on_decline && diff.has_declines() {
        std::process::exit(1);
    }

    Ok(())
}
