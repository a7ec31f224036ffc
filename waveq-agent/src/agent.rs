//! Agent implementation - orchestrates the LLM <-> tools loop

use crate::prompt::{self, LIST_TABLES, PYTHON, QUERY, SCHEMA};
use crate::session::{Role as TurnRole, Turn};
use std::time::Duration;
use tracing::{debug, info, warn};
use waveq_core::error::from_provider;
use waveq_core::{
    AgentSettings, Bindings, ChatMessage, CompletionRequest, CompletionResponse, DataSource, Error,
    ErrorKind, LlmConfig, LlmProvider, QueryResult, Result, Sandbox, ToolCall, ToolChoice, UsageTracker,
};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Print each Thought / Action / Observation step
    pub verbose: bool,
    /// Tool calls allowed per question
    pub max_iterations: usize,
    /// Wall-clock budget for one question
    pub turn_timeout: Duration,
    pub temperature: f32,
    /// Overrides the provider's default model
    pub model: Option<String>,
    /// Example rows appended to schema observations
    pub sample_rows: usize,
    /// Offer tools through the API's `tools` field
    pub native_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let settings = AgentSettings::default();
        Self {
            verbose: false,
            max_iterations: settings.max_iterations,
            turn_timeout: settings.turn_timeout,
            temperature: 0.2,
            model: None,
            sample_rows: settings.sample_rows,
            native_tools: true,
        }
    }
}

impl AgentConfig {
    pub fn from_settings(settings: &AgentSettings, llm: &LlmConfig) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            turn_timeout: settings.turn_timeout,
            temperature: llm.temperature,
            model: Some(llm.model.clone()),
            sample_rows: settings.sample_rows,
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Answers one question given the conversation so far
#[allow(async_fn_in_trait)]
pub trait ReasoningAgent {
    async fn answer(&mut self, question: &str, history: &[Turn]) -> Result<String>;
}

/// What the model wants next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    FinalAnswer(String),
    Tool {
        tool: String,
        input: String,
        origin: ToolOrigin,
    },
}

/// How a tool request arrived, so the transcript can be replayed the same way
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOrigin {
    /// A native API tool call
    Native { call_id: String, arguments: String, thought: Option<String> },
    /// `Action:` / `Action Input:` lines in plain text
    Text { raw: String },
}

/// One executed tool call and what it returned
#[derive(Debug, Clone)]
pub struct Step {
    pub tool: String,
    pub input: String,
    pub origin: ToolOrigin,
    pub observation: String,
}

/// The agent orchestrator - drives tool calls until a final answer
pub struct Agent<P, D, X> {
    provider: P,
    source: D,
    /// Absent when plotting is disabled
    sandbox: Option<X>,
    config: AgentConfig,
    system_prompt: String,
    usage: UsageTracker,
}

impl<P, D, X> Agent<P, D, X>
where
    P: LlmProvider,
    D: DataSource,
    X: Sandbox,
{
    pub fn new(provider: P, source: D, sandbox: Option<X>, config: AgentConfig) -> Self {
        let artifact = sandbox.as_ref().map(|s| s.artifact_name());
        let system_prompt = prompt::system_prompt(source.schema(), source.name(), artifact);
        Self {
            provider,
            source,
            sandbox,
            config,
            system_prompt,
            usage: UsageTracker::new(),
        }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn plotting_enabled(&self) -> bool {
        self.sandbox.is_some()
    }

    /// Assemble the conversation the model sees for the next decision
    fn messages(&self, question: &str, history: &[Turn], steps: &[Step]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + history.len() + steps.len() * 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        for turn in history {
            messages.push(match turn.role() {
                TurnRole::User => ChatMessage::user(turn.text()),
                TurnRole::Agent => ChatMessage::assistant(turn.text()),
            });
        }
        messages.push(ChatMessage::user(question));

        for step in steps {
            match &step.origin {
                ToolOrigin::Native { call_id, arguments, thought } => {
                    messages.push(ChatMessage::assistant_tool_calls(
                        thought.clone(),
                        vec![ToolCall {
                            id: call_id.clone(),
                            name: step.tool.clone(),
                            arguments: arguments.clone(),
                        }],
                    ));
                    messages.push(ChatMessage::tool_result(call_id, &step.observation));
                }
                ToolOrigin::Text { raw } => {
                    messages.push(ChatMessage::assistant(raw));
                    messages.push(ChatMessage::user(format!("Observation: {}", step.observation)));
                }
            }
        }
        messages
    }

    /// Ask the model for the next action given the question, prior turns
    /// and the tool calls made so far for this question.
    pub async fn decide(&mut self, question: &str, history: &[Turn], steps: &[Step]) -> Result<Decision> {
        let mut request = CompletionRequest::new(self.messages(question, history, steps))
            .with_temperature(self.config.temperature);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        if self.config.native_tools {
            request = request
                .with_tools(prompt::tool_definitions(self.plotting_enabled()))
                .with_tool_choice(ToolChoice::Auto);
        }

        let response = self.provider.complete(request).await.map_err(from_provider)?;
        let model = if response.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            response.model.clone()
        };
        self.usage.track(&model, &response.usage);

        parse_response(response)
    }

    /// Run one tool. Failures become observation text for the model.
    async fn act(&self, tool: &str, input: &str, pending: &mut Option<QueryResult>) -> String {
        match self.run_tool(tool, input, pending).await {
            Ok(observation) => observation,
            Err(err) => {
                warn!(tool, error = %err, "tool failed");
                format!("Error: {}", err.message())
            }
        }
    }

    async fn run_tool(&self, tool: &str, input: &str, pending: &mut Option<QueryResult>) -> Result<String> {
        match tool {
            LIST_TABLES => Ok(self.source.schema().table_names().join(", ")),
            SCHEMA => self.describe(input).await,
            QUERY => {
                let result = self.source.execute(input).await?;
                let mut observation = result.render();
                if result.truncated {
                    observation.push_str(&format!(
                        "\n(result truncated to {} rows; aggregate or add LIMIT)",
                        result.len()
                    ));
                }
                *pending = Some(result);
                Ok(observation)
            }
            PYTHON => match &self.sandbox {
                Some(sandbox) => {
                    let mut bindings = Bindings::new();
                    if let Some(result) = pending.take() {
                        bindings.insert("data".to_string(), result.to_binding());
                        bindings.insert("columns".to_string(), serde_json::json!(result.columns));
                    }
                    let output = sandbox.run(input, &bindings).await?;
                    Ok(output.observation())
                }
                None => Err(unknown_tool(tool, false)),
            },
            other => Err(unknown_tool(other, self.plotting_enabled())),
        }
    }

    /// Schema text for the requested tables plus a few example rows
    async fn describe(&self, input: &str) -> Result<String> {
        let names: Vec<&str> = input
            .split(',')
            .map(|t| t.trim().trim_matches(|c| c == '`' || c == '"' || c == '\''))
            .filter(|t| !t.is_empty())
            .collect();
        let names = if names.is_empty() {
            self.source.schema().table_names()
        } else {
            names
        };

        let mut text = Vec::with_capacity(names.len());
        for name in names.iter().copied() {
            let mut part = self.source.schema().describe_tables(&[name])?;
            if self.config.sample_rows > 0 {
                match self.source.sample_rows(name, self.config.sample_rows).await {
                    Ok(sample) => {
                        part.push_str(&format!(
                            "\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
                            sample.len(),
                            name,
                            sample.columns.join("\t"),
                            sample
                                .rows
                                .iter()
                                .map(|row| row.iter().map(cell_text).collect::<Vec<_>>().join("\t"))
                                .collect::<Vec<_>>()
                                .join("\n")
                        ));
                    }
                    Err(err) => debug!(table = name, error = %err, "sample rows unavailable"),
                }
            }
            text.push(part);
        }
        Ok(text.join("\n\n"))
    }

    /// The decide-act-observe loop for one question
    async fn run_loop(&mut self, question: &str, history: &[Turn]) -> Result<String> {
        if self.config.verbose {
            println!("\n> Entering new agent run...");
        }

        let mut steps: Vec<Step> = Vec::new();
        let mut pending: Option<QueryResult> = None;

        for iteration in 1..=self.config.max_iterations {
            match self.decide(question, history, &steps).await? {
                Decision::FinalAnswer(answer) => {
                    info!(iterations = iteration, "final answer");
                    if self.config.verbose {
                        println!("Final Answer: {}\n> Finished chain.", answer);
                    }
                    return Ok(answer);
                }
                Decision::Tool { tool, input, origin } => {
                    debug!(iteration, %tool, input = %truncate(&input, 200), "tool call");
                    if self.config.verbose {
                        if let ToolOrigin::Native { thought: Some(thought), .. } = &origin {
                            println!("Thought: {}", thought);
                        }
                        println!("Action: {}\nAction Input: {}", tool, input);
                    }

                    let observation = self.act(&tool, &input, &mut pending).await;

                    if self.config.verbose {
                        println!("Observation: {}", truncate(&observation, 2000));
                    }
                    steps.push(Step {
                        tool,
                        input,
                        origin,
                        observation,
                    });
                }
            }
        }

        warn!(max = self.config.max_iterations, "agent stopped without a final answer");
        Err(Error::agent_exhausted(self.config.max_iterations))
    }
}

impl<P, D, X> ReasoningAgent for Agent<P, D, X>
where
    P: LlmProvider,
    D: DataSource,
    X: Sandbox,
{
    async fn answer(&mut self, question: &str, history: &[Turn]) -> Result<String> {
        let timeout = self.config.turn_timeout;
        match tokio::time::timeout(timeout, self.run_loop(question, history)).await {
            Ok(result) => result,
            Err(_) => Err(Error::agent_timeout(timeout.as_secs())),
        }
    }
}

fn unknown_tool(name: &str, with_python: bool) -> Error {
    let mut known = vec![LIST_TABLES, SCHEMA, QUERY];
    if with_python {
        known.push(PYTHON);
    }
    Error::new(
        ErrorKind::InvalidArgument,
        format!("{} is not a valid tool, try one of [{}]", name, known.join(", ")),
    )
}

/// Turn a completion into a decision: native tool calls first, then ReAct
/// text, then plain text as the answer.
pub fn parse_response(response: CompletionResponse) -> Result<Decision> {
    let content = response.content.filter(|c| !c.trim().is_empty());

    if let Some(call) = response.tool_calls.into_iter().next() {
        let input = tool_input(&call.arguments);
        return Ok(Decision::Tool {
            tool: call.name.trim().to_string(),
            input,
            origin: ToolOrigin::Native {
                call_id: call.id,
                arguments: call.arguments,
                thought: content,
            },
        });
    }

    let text = content.ok_or_else(|| Error::inference_failed("model returned an empty response"))?;
    Ok(parse_text(&text))
}

/// Parse ReAct-style text. Text without `Action:` is taken as the answer.
pub fn parse_text(text: &str) -> Decision {
    let action = text.find("Action:");
    let final_answer = text.find("Final Answer:");

    if let Some(at) = action.filter(|a| final_answer.map_or(true, |f| *a < f)) {
        let after = &text[at + "Action:".len()..];
        let tool = after.lines().next().unwrap_or("").trim();
        let tool = tool.trim_matches(|c| c == '`' || c == '*' || c == '"' || c == '\'').to_string();

        let input = match after.find("Action Input:") {
            Some(i) => {
                let rest = &after[i + "Action Input:".len()..];
                let rest = rest.split("\nObservation:").next().unwrap_or(rest);
                clean_input(rest)
            }
            None => String::new(),
        };

        return Decision::Tool {
            tool,
            input,
            origin: ToolOrigin::Text {
                raw: text.split("\nObservation:").next().unwrap_or(text).trim().to_string(),
            },
        };
    }

    match final_answer {
        Some(at) => Decision::FinalAnswer(text[at + "Final Answer:".len()..].trim().to_string()),
        None => Decision::FinalAnswer(text.trim().to_string()),
    }
}

/// Tool arguments are JSON objects with one string field; fall back to the raw text
fn tool_input(arguments: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(map)) => map
            .values()
            .find_map(|v| v.as_str().map(clean_input))
            .unwrap_or_default(),
        Ok(serde_json::Value::String(s)) => clean_input(&s),
        _ => clean_input(arguments),
    }
}

/// Strip markdown fences and wrapping quotes (handles ```python blocks)
fn clean_input(raw: &str) -> String {
    let trimmed = raw.trim();
    let unfenced = if trimmed.starts_with("```") {
        let body = trimmed.trim_start_matches('`');
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].contains(' ') => &body[nl + 1..],
            _ => body,
        };
        body.trim_end().trim_end_matches('`')
    } else {
        trimmed
    };
    let unfenced = unfenced.trim();
    let wrapped = ['"', '\'', '`']
        .iter()
        .any(|q| unfenced.starts_with(*q) && unfenced.ends_with(*q));
    let unquoted = if unfenced.len() >= 2 && wrapped && !unfenced.contains('\n') {
        &unfenced[1..unfenced.len() - 1]
    } else {
        unfenced
    };
    unquoted.trim().to_string()
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    }
}
