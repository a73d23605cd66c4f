//! The `cursus init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("cursus.toml").exists() {
        println!("cursus.toml already exists, skipping.");
    } else {
        std::fs::write("cursus.toml", SAMPLE_CONFIG)?;
        println!("Created cursus.toml");
    }

    std::fs::create_dir_all("cohorts")?;
    let example_path = Path::new("cohorts/example.toml");
    if example_path.exists() {
        println!("cohorts/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_COHORT)?;
        println!("Created cohorts/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit cursus.toml with your API keys (or export CURSUS_GEMINI_KEY)");
    println!("  2. Run: cursus validate --cohort cohorts/example.toml");
    println!("  3. Run: cursus board --cohort cohorts/example.toml --insights");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# cursus configuration

default_provider = "gemini"
default_model = "gemini-3-flash-preview"
output_dir = "./cursus-reports"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[insight]
timeout_ms = 10000
max_retries = 3
retry_delay_ms = 1000
parallelism = 4

# Uncomment to override the institution's thresholds.
# [rules]
# eliminatory_below = 5.0
# repeating_below = 7.0
# validated_from = 12.0
# high_risk_below = 75.0
# low_risk_from = 90.0
"#;

const EXAMPLE_COHORT: &str = r#"[cohort]
id = "ginf-3"
name = "GINF 3rd year"

[[students]]
id = "S1"
name = "Yassine Benali"
email = "yassine.benali@example.edu"
major = "GINF"

[[students.grades]]
id = "ds-cc1"
subject = "Distributed Systems"
value = 14.5
weight = 2
date = "2025-01-10"
issuer = "Dr. Alami"

[[students.grades]]
id = "comp-cc1"
subject = "Compilers"
value = 12.0
weight = 1

[[students.attendance]]
session = "ds-w1"
status = "present"

[[students.attendance]]
session = "ds-w2"
status = "present"

[[students]]
id = "S2"
name = "Omar Tazi"
major = "GINF"
attendance_rate = 72.0

[[students.grades]]
id = "ds-cc1"
subject = "Distributed Systems"
value = 18.0
weight = 2

[[students.grades]]
id = "comp-cc1"
subject = "Compilers"
value = 4.0
weight = 1

[[students]]
id = "S3"
name = "Salma Idrissi"
major = "GSEA"
attendance_rate = 88.0

[[students.grades]]
id = "ds-cc1"
subject = "Distributed Systems"
value = 9.0
weight = 2

[[students.grades]]
id = "comp-cc1"
subject = "Compilers"
value = 10.5
weight = 1
"#;
