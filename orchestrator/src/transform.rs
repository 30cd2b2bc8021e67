//! Result transforms: free text in, typed result out
//!
//! Every pattern produces a raw result (`String`, or `Vec<Message>` for the
//! concurrent pattern) and then runs it through a [`ResultTransform`]. The
//! default is the identity; callers attach their own to get typed output.
//!
//! - [`FnTransform`] wraps a plain closure
//! - [`SectionTransform`] deterministically maps each agent's bullet list to a
//!   named field
//! - [`StructuredOutputTransform`] asks a model to coerce the text into a JSON
//!   shape derived from the target type's schema

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use maestro_agent::llm::{self, ChatRequest, Llm};
use maestro_agent::{strip_think_tags, Message};

/// Failure while coercing a raw result into the target shape
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("model call failed: {0}")]
    Model(String),

    #[error("missing output from {0}")]
    MissingSection(String),

    #[error("output does not match the target shape: {0}")]
    Coercion(String),
}

/// Converts a pattern's raw result into `T`
///
/// Implementations must fail rather than return a partially populated value.
#[async_trait]
pub trait ResultTransform<I, T>: Send + Sync {
    async fn transform(&self, input: &I) -> Result<T, TransformError>;
}

/// Pass the raw result through unchanged
pub struct Identity;

#[async_trait]
impl<I> ResultTransform<I, I> for Identity
where
    I: Clone + Send + Sync,
{
    async fn transform(&self, input: &I) -> Result<I, TransformError> {
        Ok(input.clone())
    }
}

/// Shared identity transform
pub(crate) fn identity<I>() -> Arc<dyn ResultTransform<I, I>>
where
    I: Clone + Send + Sync + 'static,
{
    Arc::new(Identity)
}

/// Transform backed by a synchronous closure
pub struct FnTransform<F> {
    func: F,
}

impl<F> FnTransform<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<I, T, F> ResultTransform<I, T> for FnTransform<F>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T, TransformError> + Send + Sync,
{
    async fn transform(&self, input: &I) -> Result<T, TransformError> {
        (self.func)(input)
    }
}

// ============================================================================
// Rendering raw results as text
// ============================================================================

/// Raw results that can be rendered as text for a model
pub trait TransformInput {
    fn render(&self) -> String;
}

impl TransformInput for String {
    fn render(&self) -> String {
        self.clone()
    }
}

impl TransformInput for Vec<Message> {
    fn render(&self) -> String {
        self.iter()
            .map(|m| format!("## {}\n{}", m.author, m.text()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ============================================================================
// Section transform
// ============================================================================

/// Split free text into list items
///
/// Bullet (`-`, `*`, `•`) and numbered (`1.`, `2)`) lines become one item
/// each; if the text has no list markers every non-empty line is an item.
pub fn list_items(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let items: Vec<String> = lines.iter().filter_map(|l| strip_marker(l)).collect();
    if items.is_empty() {
        lines.iter().map(|l| l.to_string()).collect()
    } else {
        items
    }
}

fn strip_marker(line: &str) -> Option<String> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim().to_string());
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim().to_string());
        }
    }

    None
}

/// Map each agent's response to a field holding its list items
///
/// Each field is filled from exactly one agent; a missing agent fails the
/// transform.
///
/// ```rust,ignore
/// let transform = SectionTransform::<TravelAnalysis>::new()
///     .field("BudgetExpert", "budget_insights")
///     .field("FoodExpert", "food_experiences");
/// ```
pub struct SectionTransform<T> {
    fields: BTreeMap<String, String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for SectionTransform<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SectionTransform<T> {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            _marker: PhantomData,
        }
    }

    /// Fill `field` from the response of `agent`
    pub fn field(mut self, agent: impl Into<String>, field: impl Into<String>) -> Self {
        self.fields.insert(agent.into(), field.into());
        self
    }

    fn sections(&self, messages: &[Message]) -> Result<Map<String, Value>, TransformError> {
        let mut object = Map::new();
        for (agent, field) in &self.fields {
            let message = messages
                .iter()
                .find(|m| m.author.is_agent(agent))
                .ok_or_else(|| TransformError::MissingSection(agent.clone()))?;
            let items = list_items(&message.text())
                .into_iter()
                .map(Value::String)
                .collect();
            object.insert(field.clone(), Value::Array(items));
        }
        Ok(object)
    }
}

#[async_trait]
impl<T> ResultTransform<Vec<Message>, T> for SectionTransform<T>
where
    T: DeserializeOwned + Send,
{
    async fn transform(&self, input: &Vec<Message>) -> Result<T, TransformError> {
        let object = self.sections(input)?;
        serde_json::from_value(Value::Object(object))
            .map_err(|e| TransformError::Coercion(e.to_string()))
    }
}

// ============================================================================
// Structured output transform
// ============================================================================

const STRUCTURED_OUTPUT_PROMPT: &str = "You convert text into JSON. \
Reply with a single JSON value that matches the JSON schema below. \
Do not add commentary or markdown.";

/// Model-backed transform that coerces text into `T` via its JSON schema
pub struct StructuredOutputTransform<T> {
    llm: Arc<dyn Llm>,
    temperature: f32,
    instructions: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema> StructuredOutputTransform<T> {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            instructions: None,
            _marker: PhantomData,
        }
    }

    /// Set sampling temperature for the conversion call
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Extra guidance appended to the system prompt
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// The completion request sent for a given input text
    pub fn build_request(&self, text: &str) -> ChatRequest {
        let schema = schemars::schema_for!(T);
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());

        let mut system = format!("{}\n\nSchema:\n{}", STRUCTURED_OUTPUT_PROMPT, schema);
        if let Some(extra) = &self.instructions {
            system.push_str("\n\n");
            system.push_str(extra);
        }

        ChatRequest::new(vec![llm::Message::user(text)], self.temperature).with_system(system)
    }
}

// First fenced block anywhere in the reply; the language tag is optional
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)```").expect("Invalid fenced block regex")
});

// Outermost object span
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid JSON object regex"));

/// Pull the JSON payload out of a model reply
///
/// Reasoning blocks are dropped first. Then the first fenced code block wins,
/// wherever it sits; failing that, the outermost `{...}` span; failing that,
/// the whole reply.
pub fn extract_json(reply: &str) -> String {
    let reply = strip_think_tags(reply);
    if let Some(body) = FENCED_BLOCK.captures(&reply).and_then(|c| c.get(1)) {
        return body.as_str().trim().to_string();
    }
    match JSON_OBJECT.find(&reply) {
        Some(span) => span.as_str().to_string(),
        None => reply,
    }
}

#[async_trait]
impl<I, T> ResultTransform<I, T> for StructuredOutputTransform<T>
where
    I: TransformInput + Sync,
    T: DeserializeOwned + JsonSchema + Send,
{
    async fn transform(&self, input: &I) -> Result<T, TransformError> {
        let request = self.build_request(&input.render());
        let reply = self
            .llm
            .chat(&request)
            .await
            .map_err(|e| TransformError::Model(format!("{:#}", e)))?;

        serde_json::from_str(&extract_json(&reply)).map_err(|e| {
            tracing::debug!(reply = %reply, "Structured output did not parse");
            TransformError::Coercion(e.to_string())
        })
    }
}
