//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use cursus_core::evaluator::round2;
use cursus_core::insight::InsightSource;
use cursus_core::model::{RiskLevel, Standing};
use cursus_core::report::BoardReport;
use cursus_core::statistics::StandingCounts;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn standing_class(standing: Standing) -> &'static str {
    match standing {
        Standing::Admitted => "admitted",
        Standing::Retake => "retake",
        Standing::Repeating => "repeating",
        Standing::Excluded => "excluded",
    }
}

fn standing_color(standing: Standing) -> &'static str {
    match standing {
        Standing::Admitted => "#22c55e",
        Standing::Retake => "#eab308",
        Standing::Repeating => "#f97316",
        Standing::Excluded => "#ef4444",
    }
}

/// Generate an HTML page from a deliberation report.
pub fn generate_html(report: &BoardReport) -> Result<String> {
    let board = &report.board;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>Deliberation board: {}</title>\n",
        html_escape(&report.cohort.name)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>Deliberation board</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Cohort: <strong>{}</strong> ({}) | {} students | {}</p>\n",
        html_escape(&report.cohort.name),
        html_escape(&report.cohort.id),
        report.cohort.student_count,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Summary dashboard
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Evaluated</th><th>Not evaluated</th><th>Cohort average</th><th>Admission rate</th><th>High attendance risk</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{}</td></tr></tbody></table>\n",
        board.evaluated,
        board.failed,
        board
            .cohort_average
            .map(|a| format!("{:.2}/20", round2(a)))
            .unwrap_or_else(|| "-".to_string()),
        board.admission_rate,
        board.at_risk.len(),
    ));

    if board.evaluated > 0 {
        html.push_str(&generate_bar_chart(&board.standing_counts));
    }

    if let Some(insight) = &report.insight {
        let label = match insight.source {
            InsightSource::Generated => "AI summary",
            InsightSource::Fallback => "AI summary (unavailable)",
        };
        html.push_str(&format!(
            "<aside class=\"insight\"><h3>{label}</h3><p>{}</p></aside>\n",
            html_escape(&insight.text).replace('\n', "<br>")
        ));
    }
    html.push_str("</section>\n");

    // Students
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Students</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Student</th><th onclick=\"sortTable(1)\">Major</th><th onclick=\"sortTable(2)\">Average</th><th onclick=\"sortTable(3)\">Standing</th><th onclick=\"sortTable(4)\">Attendance</th><th onclick=\"sortTable(5)\">Modules</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for row in &board.rows {
        let major = html_escape(row.major.as_deref().unwrap_or("-"));
        let name = format!(
            "{} <span class=\"id\">{}</span>",
            html_escape(&row.student_name),
            html_escape(&row.student_id)
        );
        match (&row.evaluation, &row.error) {
            (Some(eval), _) => {
                let class = standing_class(eval.overall_standing);
                let risk_class = if eval.risk_level == RiskLevel::High {
                    " class=\"risk\""
                } else {
                    ""
                };
                html.push_str(&format!(
                    "<tr><td>{name}</td><td>{major}</td><td>{:.2}</td><td><span class=\"badge {class}\">{}</span></td><td{risk_class}>{:.1}% ({})</td><td>{}/{}</td></tr>\n",
                    round2(eval.weighted_average),
                    eval.overall_standing,
                    eval.attendance_rate_percent,
                    eval.risk_level,
                    eval.modules_validated,
                    eval.modules_required,
                ));
            }
            (None, error) => {
                html.push_str(&format!(
                    "<tr class=\"error\"><td>{name}</td><td>{major}</td><td colspan=\"4\">{}</td></tr>\n",
                    html_escape(error.as_deref().unwrap_or("not evaluated"))
                ));
            }
        }
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).context("failed to serialize report")?,
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    Ok(html)
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &BoardReport, path: &Path) -> Result<()> {
    let html = generate_html(report)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

/// Horizontal bar per standing, scaled to the largest count.
fn generate_bar_chart(counts: &StandingCounts) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 120;

    let max_count = Standing::ALL
        .iter()
        .map(|s| counts.get(*s))
        .max()
        .unwrap_or(0)
        .max(1);
    let total = counts.total().max(1);

    let total_height = Standing::ALL.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 100,
        total_height
    );

    for (i, standing) in Standing::ALL.iter().enumerate() {
        let count = counts.get(*standing);
        let y = i * (bar_height + padding) + padding;
        let width = count * max_width / max_count;

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            standing
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width,
            y,
            width,
            bar_height,
            standing_color(*standing)
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{} ({:.1}%)</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            count,
            count as f64 * 100.0 / total as f64
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --risk: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --risk: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta, .id { color: #6b7280; }
.id { font-size: 0.8rem; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.badge { padding: 0.15rem 0.6rem; border-radius: 999px; color: #fff; font-size: 0.85rem; }
.badge.admitted { background: #16a34a; }
.badge.retake { background: #ca8a04; }
.badge.repeating { background: #ea580c; }
.badge.excluded { background: #dc2626; }
.risk { background: var(--risk); }
tr.error td { font-style: italic; color: #6b7280; }
.insight { border-left: 4px solid #6366f1; padding: 0.5rem 1rem; margin: 1rem 0; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col] ? a.cells[col].textContent : '';
    const vb = b.cells[col] ? b.cells[col].textContent : '';
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
