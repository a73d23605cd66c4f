//! Subcommand implementations.

pub mod board;
pub mod compare;
pub mod evaluate;
pub mod init;
pub mod insight;
pub mod list_models;
pub mod validate;

use anyhow::Result;

use cursus_core::insight::{Insight, InsightKind, InsightService};
use cursus_providers::CursusConfig;

/// Build the insight service, or explain why it is unavailable.
///
/// A missing or broken provider never blocks the academic output: callers
/// fall back to static text.
pub(crate) fn insight_service_or_warn(
    config: &CursusConfig,
    provider: Option<&str>,
    model: Option<&str>,
) -> Option<InsightService> {
    match config.insight_service(provider, model) {
        Ok(service) => Some(service),
        Err(e) => {
            tracing::warn!("insight provider unavailable: {e:#}");
            None
        }
    }
}

/// One insight, using the fallback text when no service could be built.
pub(crate) async fn insight_or_fallback(
    service: Option<&InsightService>,
    kind: InsightKind,
    context: &str,
) -> Insight {
    match service {
        Some(service) => service.generate(kind, context).await,
        None => Insight::fallback(kind),
    }
}

/// Split a `--format` value into its parts; `all` expands to every format.
pub(crate) fn parse_formats(format: &str) -> Result<Vec<&str>> {
    let formats: Vec<&str> = if format == "all" {
        vec!["json", "html"]
    } else {
        format.split(',').map(str::trim).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            matches!(*fmt, "json" | "html" | "none"),
            "unknown format '{fmt}', expected json, html, all or none"
        );
    }
    Ok(formats)
}
