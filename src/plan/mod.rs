//! Resilient analysis-plan recovery.
//!
//! The assistant is asked for JSON, but what comes back may be strict JSON,
//! a single-quoted literal, JSON buried in prose, or a plain markdown list.
//! [`parse`] walks a fixed ladder of strategies and always produces a usable
//! [`StructuredPlan`] unless the input is empty.

mod literal;

pub use literal::parse_literal;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{PlanError, PlanResult};

/// Title used when the assistant text has no usable heading.
pub const DEFAULT_PLAN_TITLE: &str = "Analysis Plan";

static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\.\s+|[-*+]\s+)(.+)").unwrap());

static JSON_FRAGMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[\s\S]*?\}").unwrap());

/// A plan as a JSON mapping.
///
/// Fields the parser does not understand are carried through untouched, so
/// callers can attach their own structure (`assistant_response`,
/// `current_plan_execution`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredPlan(Map<String, Value>);

/// Either an already-structured plan or raw assistant text awaiting parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanSource {
    Structured(StructuredPlan),
    Raw(String),
}

/// One named analysis with ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// A single step of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
}

/// Which rung of the ladder produced a plan. Logged, and useful in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePath {
    Identity,
    Json,
    Literal,
    EmbeddedJson,
    Fallback,
}

/// Parse a plan source into a structured plan.
///
/// `None` and empty text are the only failures; everything else degrades to
/// a best-effort structure.
pub fn parse(raw: Option<&PlanSource>) -> PlanResult<StructuredPlan> {
    parse_with_path(raw).map(|(plan, _)| plan)
}

/// Parse raw assistant text into a structured plan.
pub fn parse_text(text: &str) -> PlanResult<StructuredPlan> {
    parse_text_with_path(text).map(|(plan, _)| plan)
}

/// Same as [`parse`], also reporting which strategy succeeded.
pub fn parse_with_path(raw: Option<&PlanSource>) -> PlanResult<(StructuredPlan, ParsePath)> {
    match raw {
        None => Err(PlanError::Empty),
        Some(PlanSource::Structured(plan)) => Ok((plan.clone(), ParsePath::Identity)),
        Some(PlanSource::Raw(text)) => parse_text_with_path(text),
    }
}

fn parse_text_with_path(text: &str) -> PlanResult<(StructuredPlan, ParsePath)> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(PlanError::Empty);
    }

    if let Some(plan) = strict_json(body) {
        debug!(path = "json", "Plan parsed");
        return Ok((plan, ParsePath::Json));
    }

    if let Some(Value::Object(map)) = parse_literal(body) {
        debug!(path = "literal", "Plan parsed");
        return Ok((StructuredPlan(map), ParsePath::Literal));
    }

    if let Some(plan) = embedded_json(body) {
        debug!(path = "embedded_json", "Plan parsed");
        return Ok((plan, ParsePath::EmbeddedJson));
    }

    warn!(
        chars = body.len(),
        "No JSON plan found in assistant text, synthesizing from lines"
    );
    Ok((synthesize(body), ParsePath::Fallback))
}

/// Remove a surrounding triple-backtick fence and its optional language tag.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')))
        .unwrap_or(rest.len());
    let after_tag = &rest[tag_len..];
    let rest = match after_tag.chars().next() {
        Some(c) if c.is_whitespace() || c == '{' || c == '[' => after_tag,
        None => after_tag,
        _ => rest,
    };

    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn strict_json(text: &str) -> Option<StructuredPlan> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(StructuredPlan(map)),
        _ => None,
    }
}

fn embedded_json(text: &str) -> Option<StructuredPlan> {
    let fragment = JSON_FRAGMENT_RE.find(text)?;
    if let Some(plan) = strict_json(fragment.as_str()) {
        return Some(plan);
    }
    // The shortest match stops at the first closing brace, which cuts nested
    // plans in half; retry with the balanced object from the same start.
    balanced_object(&text[fragment.start()..]).and_then(strict_json)
}

/// Slice of `text` (which starts at `{`) up to its matching close brace.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn synthesize(body: &str) -> StructuredPlan {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let (title, rest) = match lines.split_first() {
        Some((first, rest)) if !STEP_RE.is_match(first) => {
            let heading = first.trim_start_matches(|c: char| c == '#' || c == ' ').trim();
            let title = if heading.is_empty() {
                DEFAULT_PLAN_TITLE
            } else {
                heading
            };
            (title, rest)
        }
        _ => (DEFAULT_PLAN_TITLE, lines.as_slice()),
    };

    let mut steps: Vec<PlanStep> = rest
        .iter()
        .filter_map(|line| STEP_RE.captures(line))
        .map(|caps| PlanStep {
            step: caps[1].trim().to_string(),
        })
        .collect();

    if steps.is_empty() {
        let remainder = rest.join("\n");
        steps.push(PlanStep {
            step: if remainder.is_empty() {
                body.to_string()
            } else {
                remainder
            },
        });
    }

    StructuredPlan::from_analyses(vec![Analysis {
        title: title.to_string(),
        steps,
    }])
}

impl StructuredPlan {
    /// Build the canonical `{analyses: [...]}` shape.
    pub fn from_analyses(analyses: Vec<Analysis>) -> Self {
        let analyses: Vec<Value> = analyses
            .into_iter()
            .map(|analysis| {
                let steps: Vec<Value> = analysis
                    .steps
                    .into_iter()
                    .map(|s| json!({ "step": s.step }))
                    .collect();
                json!({ "title": analysis.title, "steps": steps })
            })
            .collect();

        let mut map = Map::new();
        map.insert("analyses".to_string(), Value::Array(analyses));
        Self(map)
    }

    /// The underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Typed view of the `analyses` field, if it has the canonical shape.
    pub fn analyses(&self) -> Option<Vec<Analysis>> {
        self.0
            .get("analyses")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Human-readable markdown for display and for prompts.
    pub fn to_markdown(&self) -> String {
        if let Some(analyses) = self.analyses() {
            return render_analyses(&analyses);
        }

        let mut parts = Vec::new();
        if let Some(Value::String(response)) = self.0.get("assistant_response") {
            let nested = serde_json::from_str::<StructuredPlan>(response)
                .ok()
                .and_then(|plan| plan.analyses());
            match nested {
                Some(analyses) => parts.push(render_analyses(&analyses)),
                None => parts.push(response.clone()),
            }
        }
        if let Some(Value::String(execution)) = self.0.get("current_plan_execution") {
            parts.push(execution.clone());
        }
        if !parts.is_empty() {
            return parts.join("\n\n");
        }

        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

fn render_analyses(analyses: &[Analysis]) -> String {
    let mut md = Vec::new();
    for analysis in analyses {
        md.push(format!("### {}\n", analysis.title));
        for (idx, step) in analysis.steps.iter().enumerate() {
            md.push(format!("{}. {}", idx + 1, step.step));
        }
        md.push(String::new());
    }
    md.join("\n")
}

impl From<StructuredPlan> for PlanSource {
    fn from(plan: StructuredPlan) -> Self {
        PlanSource::Structured(plan)
    }
}

impl From<String> for PlanSource {
    fn from(text: String) -> Self {
        PlanSource::Raw(text)
    }
}

impl From<&str> for PlanSource {
    fn from(text: &str) -> Self {
        PlanSource::Raw(text.to_string())
    }
}
