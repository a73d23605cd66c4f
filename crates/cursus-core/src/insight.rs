//! Resilient access to the text insight collaborator.
//!
//! Every call is bounded by a timeout and a retry budget, and ends in either
//! generated text or the static fallback for its kind. Callers never see a
//! provider error and academic computation never waits on this module.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::model::{EvaluationResult, GradeStatus};
use crate::statistics::DeliberationBoard;
use crate::traits::{clean_insight_text, InsightRequest, TextInsightProvider};

/// The prompts the school portals ask the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightKind {
    /// Career path suggestions from a student's results.
    Orientation,
    /// Short justification of a timetable under constraints.
    ScheduleReasoning,
    /// Strategic summary of cohort statistics for administrators.
    DashboardSummary,
    /// Diagnostic of one class for its teacher.
    ClassDiagnostic,
    /// Encouraging advice addressed to a student.
    StudentAdvice,
    /// How much higher upcoming grades must be to reach a target.
    GradeGoal,
}

impl InsightKind {
    pub const ALL: [InsightKind; 6] = [
        InsightKind::Orientation,
        InsightKind::ScheduleReasoning,
        InsightKind::DashboardSummary,
        InsightKind::ClassDiagnostic,
        InsightKind::StudentAdvice,
        InsightKind::GradeGoal,
    ];

    /// Fill the prompt template with caller-provided context.
    pub fn prompt(&self, context: &str) -> String {
        match self {
            InsightKind::Orientation => format!(
                "Given the following student performance and interests: \"{context}\", suggest 3 career paths. For each give the major, a compatibility score from 0 to 100 and one sentence of justification."
            ),
            InsightKind::ScheduleReasoning => format!(
                "As a school scheduling expert, give a concise reasoning (2 sentences max) for an optimized weekly timetable under these constraints: {context}"
            ),
            InsightKind::DashboardSummary => format!(
                "Analyze these school statistics: {context}. Provide a 3-bullet strategic summary about student success and administrative risks."
            ),
            InsightKind::ClassDiagnostic => format!(
                "As a pedagogical assistant, analyze this class performance data: {context}. Give a brief diagnostic (2-3 sentences) of the class's strengths and one specific action the teacher should take this week."
            ),
            InsightKind::StudentAdvice => format!(
                "Give short (1-2 sentences), encouraging and tactical academic advice to a student with these results: {context}. Keep it friendly and motivating."
            ),
            InsightKind::GradeGoal => format!(
                "A student's situation: {context}. In 20 words or less, tell them how many points higher their next grades should be on average."
            ),
        }
    }

    /// Text shown when the model cannot be reached.
    pub fn fallback(&self) -> &'static str {
        match self {
            InsightKind::Orientation => {
                "Orientation suggestions are unavailable right now. Meet your academic advisor to discuss your options."
            }
            InsightKind::ScheduleReasoning => {
                "Schedule optimized for student focus and teacher availability."
            }
            InsightKind::DashboardSummary => "AI analysis currently unavailable.",
            InsightKind::ClassDiagnostic => {
                "Pedagogical analysis currently unavailable. Continue with the current lesson plan."
            }
            InsightKind::StudentAdvice => "Keep pushing forward, you're doing great!",
            InsightKind::GradeGoal => {
                "Target higher grades in your next high-coefficient modules to raise your average."
            }
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightKind::Orientation => write!(f, "orientation"),
            InsightKind::ScheduleReasoning => write!(f, "schedule"),
            InsightKind::DashboardSummary => write!(f, "dashboard"),
            InsightKind::ClassDiagnostic => write!(f, "class"),
            InsightKind::StudentAdvice => write!(f, "student"),
            InsightKind::GradeGoal => write!(f, "grade-goal"),
        }
    }
}

impl FromStr for InsightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orientation" => Ok(InsightKind::Orientation),
            "schedule" | "schedule-reasoning" => Ok(InsightKind::ScheduleReasoning),
            "dashboard" | "dashboard-summary" => Ok(InsightKind::DashboardSummary),
            "class" | "class-diagnostic" => Ok(InsightKind::ClassDiagnostic),
            "student" | "student-advice" => Ok(InsightKind::StudentAdvice),
            "grade-goal" | "goal" => Ok(InsightKind::GradeGoal),
            other => Err(format!("unknown insight kind: {other}")),
        }
    }
}

/// Where an insight's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSource {
    Generated,
    Fallback,
}

/// Text ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub text: String,
    pub source: InsightSource,
}

impl Insight {
    pub fn fallback(kind: InsightKind) -> Self {
        Self {
            kind,
            text: kind.fallback().to_string(),
            source: InsightSource::Fallback,
        }
    }
}

/// Timeout and retry budget for insight calls.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// Upper bound for a single provider call.
    pub timeout: Duration,
    /// Retries after the first attempt on transient errors.
    pub max_retries: u32,
    /// Initial delay between retries, doubled each time up to 60s.
    pub retry_delay: Duration,
    /// Maximum concurrent calls in [`InsightService::generate_many`].
    pub parallelism: usize,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            parallelism: 4,
            max_tokens: 512,
            temperature: 0.4,
            system_prompt: None,
        }
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Provider wrapper that always produces displayable text.
pub struct InsightService {
    provider: Arc<dyn TextInsightProvider>,
    model: String,
    config: InsightConfig,
}

impl InsightService {
    pub fn new(provider: Arc<dyn TextInsightProvider>, model: &str, config: InsightConfig) -> Self {
        Self {
            provider,
            model: model.to_string(),
            config,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate one insight, falling back to static text on any failure.
    pub async fn generate(&self, kind: InsightKind, context: &str) -> Insight {
        let request = InsightRequest {
            model: self.model.clone(),
            prompt: kind.prompt(context),
            system_prompt: self.config.system_prompt.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        match self.generate_text(&request).await {
            Ok(text) if !text.is_empty() => Insight {
                kind,
                text,
                source: InsightSource::Generated,
            },
            Ok(_) => {
                tracing::warn!(%kind, "provider returned an empty insight, using fallback");
                Insight::fallback(kind)
            }
            Err(e) => {
                tracing::warn!(%kind, provider = self.provider.name(), "insight unavailable, using fallback: {e:#}");
                Insight::fallback(kind)
            }
        }
    }

    /// Generate several insights with bounded concurrency, preserving order.
    pub async fn generate_many(&self, requests: Vec<(InsightKind, String)>) -> Vec<Insight> {
        stream::iter(requests)
            .map(|(kind, context)| async move { self.generate(kind, &context).await })
            .buffered(self.config.parallelism.max(1))
            .collect()
            .await
    }

    async fn generate_text(&self, request: &InsightRequest) -> anyhow::Result<String> {
        let mut last_error = None;
        let mut retry_delay = self.config.retry_delay;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            }

            match tokio::time::timeout(self.config.timeout, self.provider.generate(request)).await
            {
                Ok(Ok(response)) => return Ok(clean_insight_text(&response.content)),
                Ok(Err(e)) => {
                    if let Some(provider_error) = e.downcast_ref::<ProviderError>() {
                        if provider_error.is_permanent() {
                            return Err(e);
                        }
                        if let Some(ms) = provider_error.retry_after_ms() {
                            retry_delay = Duration::from_millis(ms);
                        }
                    }
                    tracing::debug!(attempt, "insight attempt failed: {e}");
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::debug!(attempt, "insight attempt timed out");
                    let timeout_ms = self.config.timeout.as_millis() as u64;
                    last_error = Some(ProviderError::Timeout(timeout_ms).into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no insight attempt was made")))
    }
}

// ---------------------------------------------------------------------------
// Context builders
// ---------------------------------------------------------------------------

/// Compact JSON describing one student's evaluation, for advice prompts.
pub fn student_context(name: &str, result: &EvaluationResult) -> String {
    let eliminatory = result
        .status_per_grade
        .values()
        .filter(|s| **s == GradeStatus::Eliminatory)
        .count();
    serde_json::json!({
        "student": name,
        "average": (result.weighted_average * 100.0).round() / 100.0,
        "standing": result.overall_standing.to_string(),
        "attendance_rate": result.attendance_rate_percent,
        "attendance_risk": result.risk_level.to_string(),
        "modules_validated": format!("{}/{}", result.modules_validated, result.modules_required),
        "eliminatory_grades": eliminatory,
    })
    .to_string()
}

/// Compact JSON describing a deliberation board, for dashboard prompts.
pub fn board_context(cohort_name: &str, board: &DeliberationBoard) -> String {
    serde_json::json!({
        "cohort": cohort_name,
        "students": board.rows.len(),
        "evaluated": board.evaluated,
        "cohort_average": board.cohort_average.map(|a| (a * 100.0).round() / 100.0),
        "admission_rate": board.admission_rate,
        "admitted": board.standing_counts.admitted,
        "retake": board.standing_counts.retake,
        "repeating": board.standing_counts.repeating,
        "excluded": board.standing_counts.excluded,
        "high_attendance_risk": board.at_risk.len(),
    })
    .to_string()
}

/// Context sentence for a grade goal prompt.
pub fn grade_goal_context(current_average: f64, target: f64, required_average: f64) -> String {
    format!(
        "current average {current_average:.2}/20, target {target:.2}/20, required average on remaining coefficients {required_average:.2}/20"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::traits::{InsightResponse, ModelInfo, TokenUsage};

    /// Fails `failures` times with the error built by `error`, then answers.
    struct ScriptedProvider {
        failures: u32,
        error: fn() -> ProviderError,
        answer: &'static str,
        delay: Duration,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(failures: u32, error: fn() -> ProviderError, answer: &'static str) -> Self {
            Self {
                failures,
                error,
                answer,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TextInsightProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &InsightRequest) -> anyhow::Result<InsightResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                return Err((self.error)().into());
            }
            Ok(InsightResponse {
                content: self.answer.to_string(),
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 0,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn fast_config() -> InsightConfig {
        InsightConfig {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..InsightConfig::default()
        }
    }

    fn network() -> ProviderError {
        ProviderError::NetworkError("connection reset".into())
    }

    fn auth() -> ProviderError {
        ProviderError::AuthenticationFailed("invalid key".into())
    }

    #[tokio::test(start_paused = true)]
    async fn generated_text_is_cleaned() {
        let provider = Arc::new(ScriptedProvider::new(0, network, "```\nRevise graphs.\n```"));
        let service = InsightService::new(provider, "model", fast_config());

        let insight = service.generate(InsightKind::StudentAdvice, "{}").await;
        assert_eq!(insight.source, InsightSource::Generated);
        assert_eq!(insight.text, "Revise graphs.");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(2, network, "Stable class."));
        let service = InsightService::new(provider.clone(), "model", fast_config());

        let insight = service.generate(InsightKind::ClassDiagnostic, "{}").await;
        assert_eq!(insight.source, InsightSource::Generated);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back() {
        let provider = Arc::new(ScriptedProvider::new(10, network, "never"));
        let service = InsightService::new(provider.clone(), "model", fast_config());

        let insight = service.generate(InsightKind::DashboardSummary, "{}").await;
        assert_eq!(insight, Insight::fallback(InsightKind::DashboardSummary));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_stop_immediately() {
        let provider = Arc::new(ScriptedProvider::new(10, auth, "never"));
        let service = InsightService::new(provider.clone(), "model", fast_config());

        let insight = service.generate(InsightKind::Orientation, "{}").await;
        assert_eq!(insight.source, InsightSource::Fallback);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let mut scripted = ScriptedProvider::new(0, network, "too late");
        scripted.delay = Duration::from_secs(30);
        let provider = Arc::new(scripted);
        let config = InsightConfig {
            max_retries: 0,
            ..fast_config()
        };
        let service = InsightService::new(provider, "model", config);

        let insight = service.generate(InsightKind::ScheduleReasoning, "no gaps").await;
        assert_eq!(insight.source, InsightSource::Fallback);
        assert_eq!(
            insight.text,
            "Schedule optimized for student focus and teacher availability."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_is_reported_in_millis() {
        let mut scripted = ScriptedProvider::new(0, network, "too late");
        scripted.delay = Duration::from_secs(5);
        let config = InsightConfig {
            timeout: Duration::from_millis(250),
            max_retries: 0,
            ..fast_config()
        };
        let service = InsightService::new(Arc::new(scripted), "model", config);

        let err = service
            .generate_text(&InsightRequest::new("model", "prompt"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Timeout(250))
        ));
        assert_eq!(err.to_string(), "request timed out after 250ms");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_answer_falls_back() {
        let provider = Arc::new(ScriptedProvider::new(0, network, "   "));
        let service = InsightService::new(provider, "model", fast_config());

        let insight = service.generate(InsightKind::GradeGoal, "").await;
        assert_eq!(insight.source, InsightSource::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn generate_many_preserves_order() {
        let provider = Arc::new(ScriptedProvider::new(0, network, "ok"));
        let service = InsightService::new(provider, "model", fast_config());

        let insights = service
            .generate_many(vec![
                (InsightKind::Orientation, "a".into()),
                (InsightKind::GradeGoal, "b".into()),
                (InsightKind::StudentAdvice, "c".into()),
            ])
            .await;
        let kinds: Vec<InsightKind> = insights.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InsightKind::Orientation,
                InsightKind::GradeGoal,
                InsightKind::StudentAdvice
            ]
        );
    }

    #[test]
    fn kind_display_roundtrips_through_parse() {
        for kind in InsightKind::ALL {
            assert_eq!(kind.to_string().parse::<InsightKind>().unwrap(), kind);
        }
        assert!("horoscope".parse::<InsightKind>().is_err());
    }

    #[test]
    fn prompts_embed_context() {
        let prompt = InsightKind::GradeGoal.prompt("current average 10.50/20");
        assert!(prompt.contains("current average 10.50/20"));
        assert!(prompt.contains("20 words or less"));
    }

    #[test]
    fn grade_goal_context_formats_two_decimals() {
        assert_eq!(
            grade_goal_context(10.5, 12.0, 14.0),
            "current average 10.50/20, target 12.00/20, required average on remaining coefficients 14.00/20"
        );
    }
}
