//! The `cursus evaluate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use cursus_core::evaluator::round2;
use cursus_core::insight::{grade_goal_context, student_context, Insight, InsightKind};
use cursus_core::model::{Appreciation, GRADE_SCALE_MAX};
use cursus_core::parser::load_cohorts;
use cursus_providers::config::load_config_from;

use super::insight_service_or_warn;

pub async fn execute(
    cohort_path: PathBuf,
    student_id: String,
    goal: Option<f64>,
    remaining_weight: u32,
    advice: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let evaluator = config.evaluator()?;

    let cohorts = load_cohorts(&cohort_path)?;
    let (cohort, student) = cohorts
        .iter()
        .find_map(|c| c.find_student(&student_id).map(|s| (c, s)))
        .with_context(|| {
            format!(
                "student '{student_id}' not found in {}",
                cohort_path.display()
            )
        })?;

    let result = evaluator
        .evaluate(&student.profile)
        .with_context(|| format!("cannot evaluate student '{student_id}'"))?;
    let subjects = evaluator.subject_averages(student.profile.grades())?;

    println!(
        "{} ({}) | {} | {}",
        student.name,
        student.id,
        cohort.name,
        student.major.as_deref().unwrap_or("no major")
    );

    let mut table = Table::new();
    table.set_header(vec!["Subject", "Average", "Coef", "Status", "Appreciation"]);
    for subject in &subjects {
        table.add_row(vec![
            Cell::new(&subject.subject_name),
            Cell::new(format!("{:.2}", round2(subject.average))),
            Cell::new(subject.total_weight),
            Cell::new(subject.status),
            Cell::new(subject.appreciation),
        ]);
    }
    println!("{table}");

    println!(
        "Weighted average: {:.2}/20 ({})",
        round2(result.weighted_average),
        Appreciation::from_average(result.weighted_average)
    );
    println!("Standing: {}", result.overall_standing);
    println!(
        "Attendance: {:.1}% (risk: {})",
        result.attendance_rate_percent, result.risk_level
    );
    println!("Pass rate: {:.1}%", result.pass_rate);
    println!(
        "Modules validated: {}/{}",
        result.modules_validated, result.modules_required
    );

    let goal_context = match goal {
        Some(target) => {
            let required =
                evaluator.required_average(student.profile.grades(), remaining_weight, target)?;
            let verdict = if required > GRADE_SCALE_MAX {
                " (out of reach)"
            } else if required <= 0.0 {
                " (already secured)"
            } else {
                ""
            };
            println!(
                "Goal {target:.2}/20: {:.2}/20 needed on the next {remaining_weight} coefficient(s){verdict}",
                round2(required)
            );
            Some(grade_goal_context(result.weighted_average, target, required))
        }
        None => None,
    };

    if advice {
        let service = insight_service_or_warn(&config, None, None);
        let mut requests = vec![(
            InsightKind::StudentAdvice,
            student_context(&student.name, &result),
        )];
        if let Some(context) = goal_context {
            requests.push((InsightKind::GradeGoal, context));
        }

        let insights = match &service {
            Some(service) => service.generate_many(requests).await,
            None => requests
                .iter()
                .map(|(kind, _)| Insight::fallback(*kind))
                .collect(),
        };
        for insight in insights {
            println!("\n[{}] {}", insight.kind, insight.text);
        }
    }

    Ok(())
}
