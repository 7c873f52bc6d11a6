use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One parsed stdout line in the CLI's stream-json output.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: String,
    pub subtype: Option<String>,
    pub value: Value,
}

impl StreamEvent {
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(trimmed).ok()?;
        let kind = value.get("type").and_then(Value::as_str)?.to_string();
        let subtype = value
            .get("subtype")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            kind,
            subtype,
            value,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deltas {
    pub text: Option<String>,
    pub thinking: Option<String>,
}

/// Pulls text and thinking deltas out of a partial-message event. Accepts
/// both the CLI's `stream_event` wrapper and a bare `content_block_delta`.
pub fn extract_deltas(value: &Value) -> Deltas {
    let event = match value.get("type").and_then(Value::as_str) {
        Some("stream_event") => value.get("event").unwrap_or(&Value::Null),
        _ => value,
    };
    if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return Deltas::default();
    }
    let delta = event.get("delta").unwrap_or(&Value::Null);
    match delta.get("type").and_then(Value::as_str) {
        Some("text_delta") => Deltas {
            text: delta.get("text").and_then(Value::as_str).map(str::to_string),
            thinking: None,
        },
        Some("thinking_delta") => Deltas {
            text: None,
            thinking: delta
                .get("thinking")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        _ => Deltas::default(),
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InitInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "claude_code_version")]
    pub version: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ResultInfo {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub event_counts: BTreeMap<String, usize>,
    pub unparsed_lines: usize,
    pub reply: String,
    pub thinking: String,
    pub init: Option<InitInfo>,
    pub result: Option<ResultInfo>,
}

impl StreamSummary {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut summary = Self::default();
        for line in lines {
            summary.observe(line);
        }
        summary
    }

    pub fn observe(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Some(event) = StreamEvent::parse(line) else {
            self.unparsed_lines += 1;
            return;
        };
        *self.event_counts.entry(event.kind.clone()).or_default() += 1;

        match (event.kind.as_str(), event.subtype.as_deref()) {
            ("system", Some("init")) if self.init.is_none() => {
                self.init = serde_json::from_value(event.value).ok();
            }
            ("result", _) => {
                self.result = serde_json::from_value(event.value).ok();
            }
            _ => {
                let deltas = extract_deltas(&event.value);
                if let Some(text) = deltas.text {
                    self.reply.push_str(&text);
                }
                if let Some(thinking) = deltas.thinking {
                    self.thinking.push_str(&thinking);
                }
            }
        }
    }

    /// Streamed text if partial messages were on, otherwise the final result text.
    pub fn reply_text(&self) -> Option<&str> {
        if !self.reply.is_empty() {
            return Some(&self.reply);
        }
        self.result
            .as_ref()
            .and_then(|r| r.result.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let counts = self
            .event_counts
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "Events: {}", if counts.is_empty() { "-" } else { counts.as_str() });
        if self.unparsed_lines > 0 {
            let _ = writeln!(out, "Non-JSON stdout lines: {}", self.unparsed_lines);
        }
        if let Some(init) = &self.init {
            let _ = writeln!(
                out,
                "Init: model={} version={} tools={} permission_mode={} session={}",
                init.model.as_deref().unwrap_or("-"),
                init.version.as_deref().unwrap_or("-"),
                init.tools.len(),
                init.permission_mode.as_deref().unwrap_or("-"),
                init.session_id.as_deref().unwrap_or("-"),
            );
        }
        if let Some(result) = &self.result {
            let _ = writeln!(
                out,
                "Result: subtype={} is_error={} turns={} duration={}ms api={}ms cost=${:.4} tokens in={} out={} cache_read={}",
                result.subtype.as_deref().unwrap_or("-"),
                result.is_error,
                result.num_turns,
                result.duration_ms,
                result.duration_api_ms,
                result.total_cost_usd,
                result.usage.input_tokens,
                result.usage.output_tokens,
                result.usage.cache_read_input_tokens,
            );
            if let Some(session) = &result.session_id {
                let _ = writeln!(out, "Session: {session}");
            }
        }
        if !self.thinking.is_empty() {
            let _ = writeln!(out, "Thinking: {} chars", self.thinking.chars().count());
        }
        if let Some(reply) = self.reply_text() {
            let _ = writeln!(out, "Reply: {}", reply.trim());
        }
        out
    }
}
