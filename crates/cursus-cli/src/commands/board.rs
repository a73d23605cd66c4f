//! The `cursus board` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use cursus_core::evaluator::{round2, AcademicEvaluator};
use cursus_core::insight::{board_context, Insight, InsightKind};
use cursus_core::model::Cohort;
use cursus_core::parser::load_cohorts;
use cursus_core::report::BoardReport;
use cursus_core::statistics::{class_statistics, deliberation_board};
use cursus_providers::config::load_config_from;
use cursus_report::html::write_html_report;

use super::{insight_service_or_warn, parse_formats};

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    cohort_path: PathBuf,
    format: String,
    output: Option<PathBuf>,
    insights: bool,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let formats = parse_formats(&format)?;
    let config = load_config_from(config_path.as_deref())?;
    let evaluator = config.evaluator()?;
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let cohorts = load_cohorts(&cohort_path)?;
    anyhow::ensure!(
        !cohorts.is_empty(),
        "no cohort files found in {}",
        cohort_path.display()
    );

    let mut reports: Vec<BoardReport> = cohorts
        .iter()
        .map(|cohort| {
            let board = deliberation_board(cohort, &evaluator);
            BoardReport::new(cohort, *evaluator.rules(), board)
        })
        .collect();

    if insights {
        let requests = reports
            .iter()
            .map(|r| {
                (
                    InsightKind::DashboardSummary,
                    board_context(&r.cohort.name, &r.board),
                )
            })
            .collect::<Vec<_>>();
        let generated = match insight_service_or_warn(&config, provider.as_deref(), model.as_deref())
        {
            Some(service) => service.generate_many(requests).await,
            None => requests
                .iter()
                .map(|(kind, _)| Insight::fallback(*kind))
                .collect(),
        };
        for (report, insight) in reports.iter_mut().zip(generated) {
            report.insight = Some(insight);
        }
    }

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    for (cohort, report) in cohorts.iter().zip(&reports) {
        print_board(report);
        print_subject_statistics(cohort, &evaluator);
        if let Some(insight) = &report.insight {
            println!("\nAI summary:\n{}", insight.text);
        }

        for fmt in &formats {
            match *fmt {
                "json" => {
                    std::fs::create_dir_all(&output)?;
                    let path = output.join(format!("board-{}-{timestamp}.json", report.cohort.id));
                    report.save_json(&path)?;
                    eprintln!("Report saved to: {}", path.display());
                }
                "html" => {
                    let path = output.join(format!("board-{}-{timestamp}.html", report.cohort.id));
                    write_html_report(report, &path)?;
                    eprintln!("HTML report: {}", path.display());
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn print_board(report: &BoardReport) {
    let board = &report.board;
    println!(
        "Deliberation board: {} ({} students)",
        report.cohort.name, report.cohort.student_count
    );

    let mut table = Table::new();
    table.set_header(vec![
        "#",
        "Student",
        "Major",
        "Average",
        "Standing",
        "Attendance",
        "Risk",
    ]);

    for (rank, row) in board.rows.iter().enumerate() {
        let major = row.major.as_deref().unwrap_or("-");
        match &row.evaluation {
            Some(eval) => table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(format!("{} ({})", row.student_name, row.student_id)),
                Cell::new(major),
                Cell::new(format!("{:.2}", round2(eval.weighted_average))),
                Cell::new(eval.overall_standing),
                Cell::new(format!("{:.1}%", eval.attendance_rate_percent)),
                Cell::new(eval.risk_level),
            ]),
            None => table.add_row(vec![
                Cell::new("-"),
                Cell::new(format!("{} ({})", row.student_name, row.student_id)),
                Cell::new(major),
                Cell::new("-"),
                Cell::new(row.error.as_deref().unwrap_or("not evaluated")),
                Cell::new("-"),
                Cell::new("-"),
            ]),
        };
    }
    println!("{table}");

    let counts = &board.standing_counts;
    println!(
        "Admitted: {} | Retake: {} | Repeating: {} | Excluded: {}",
        counts.admitted, counts.retake, counts.repeating, counts.excluded
    );
    match board.cohort_average {
        Some(avg) => println!(
            "Cohort average: {:.2}/20 | Admission rate: {:.1}%",
            round2(avg),
            board.admission_rate
        ),
        None => println!("Cohort average: - | Admission rate: -"),
    }
    if !board.at_risk.is_empty() {
        println!("High attendance risk: {}", board.at_risk.join(", "));
    }
    if board.failed > 0 {
        eprintln!("Warning: {} student(s) could not be evaluated", board.failed);
    }
}

/// Per-subject grade distribution across the cohort.
fn print_subject_statistics(cohort: &Cohort, evaluator: &AcademicEvaluator) {
    let mut by_subject: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for student in &cohort.students {
        for grade in student.profile.grades() {
            by_subject
                .entry(grade.subject_name.as_str())
                .or_default()
                .push(grade.value);
        }
    }
    if by_subject.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Subject",
        "Grades",
        "Mean",
        "Min",
        "Max",
        "Pass rate",
        "Eliminatory",
    ]);
    for (subject, values) in &by_subject {
        match class_statistics(values, evaluator) {
            Ok(stats) => table.add_row(vec![
                Cell::new(subject),
                Cell::new(stats.count),
                Cell::new(format!("{:.2}", round2(stats.mean))),
                Cell::new(stats.min.map(|v| format!("{v:.2}")).unwrap_or_default()),
                Cell::new(stats.max.map(|v| format!("{v:.2}")).unwrap_or_default()),
                Cell::new(format!("{:.1}%", stats.pass_rate)),
                Cell::new(stats.eliminatory_count),
            ]),
            Err(e) => {
                tracing::warn!("skipping statistics for {subject}: {e}");
                continue;
            }
        };
    }
    println!("{table}");
}
