//! The `cursus insight` command.

use std::path::PathBuf;

use anyhow::Result;

use cursus_core::insight::{InsightKind, InsightSource};
use cursus_providers::config::load_config_from;

use super::{insight_or_fallback, insight_service_or_warn};

pub async fn execute(
    kind: InsightKind,
    context: String,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let service = insight_service_or_warn(&config, provider.as_deref(), model.as_deref());

    let insight = insight_or_fallback(service.as_ref(), kind, &context).await;
    if insight.source == InsightSource::Fallback {
        eprintln!("Note: insight provider unavailable, showing fallback text");
    }
    println!("{}", insight.text);

    Ok(())
}
