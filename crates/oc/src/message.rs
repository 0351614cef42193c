use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Chat LLM Role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(Error::UnsupportedMessageFormat(Value::String(s.to_string()))),
        }
    }
}

/// One turn of a conversation.
///
/// Turns that carry metadata are display annotations (a rendered thinking
/// span, for example) and never take part in a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the turn is display-only. An empty metadata map doesn't count.
    pub fn is_annotation(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// A raw history entry, as handed over by a front end.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Turn(ChatTurn),
    Map(Map<String, Value>),
    Nested(Vec<HistoryEntry>),
}

impl HistoryEntry {
    /// Normalizes the entry into turns, flattening nested lists in order.
    pub fn flatten_into(self, turns: &mut Vec<ChatTurn>) -> Result<()> {
        match self {
            Self::Turn(turn) => turns.push(turn),
            Self::Map(map) => turns.push(turn_from_map(map)?),
            Self::Nested(entries) => {
                for entry in entries {
                    entry.flatten_into(turns)?;
                }
            }
        }

        Ok(())
    }
}

impl From<ChatTurn> for HistoryEntry {
    fn from(turn: ChatTurn) -> Self {
        Self::Turn(turn)
    }
}

impl From<Vec<HistoryEntry>> for HistoryEntry {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self::Nested(entries)
    }
}

impl TryFrom<Value> for HistoryEntry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Map(map)),
            Value::Array(values) => values
                .into_iter()
                .map(Self::try_from)
                .collect::<Result<Vec<_>>>()
                .map(Self::Nested),
            other => Err(Error::UnsupportedMessageFormat(other)),
        }
    }
}

/// Normalizes every entry of a history into a flat list of turns.
pub fn normalize(history: Vec<HistoryEntry>) -> Result<Vec<ChatTurn>> {
    let mut turns = Vec::with_capacity(history.len());
    for entry in history {
        entry.flatten_into(&mut turns)?;
    }
    Ok(turns)
}

/// Reads a history file: a JSON array of entries, or a single entry.
pub fn load_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    tracing::event!(tracing::Level::INFO, "Loading history from {:?}", path);
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;

    let entries = match HistoryEntry::try_from(value)? {
        HistoryEntry::Nested(entries) => entries,
        entry => vec![entry],
    };

    Ok(entries)
}

fn turn_from_map(map: Map<String, Value>) -> Result<ChatTurn> {
    let unsupported =
        |map: &Map<String, Value>| Error::UnsupportedMessageFormat(Value::Object(map.clone()));

    let role = match map.get("role") {
        None => Role::User,
        Some(Value::String(role)) => role.parse().map_err(|_| unsupported(&map))?,
        Some(_) => return Err(unsupported(&map)),
    };

    let content = match map.get("content") {
        None => String::new(),
        Some(Value::String(content)) => content.clone(),
        Some(_) => return Err(unsupported(&map)),
    };

    let metadata = match map.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(metadata)) => Some(metadata.clone()),
        Some(_) => return Err(unsupported(&map)),
    };

    Ok(ChatTurn {
        role,
        content,
        metadata,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Done,
}

/// Display hints attached to a thinking message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub id: u32,
    pub status: Status,
    /// Seconds spent thinking, set once the span is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// A message handed to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub content: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DisplayMessage {
    /// Creates a plain assistant answer.
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
            metadata: None,
        }
    }

    /// Creates an assistant message describing a failure.
    pub fn error(error: impl fmt::Display) -> Self {
        Self::answer(format!("Error: {error}"))
    }

    pub fn is_thinking(&self) -> bool {
        self.metadata.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(value: Value) -> HistoryEntry {
        HistoryEntry::try_from(value).unwrap()
    }

    #[test]
    fn maps_default_role_and_content() {
        let turns = normalize(vec![entry(json!({}))]).unwrap();

        assert_eq!(turns, vec![ChatTurn::user("")]);
    }

    #[test]
    fn nested_lists_flatten_in_order() {
        let history = vec![
            entry(json!({"role": "user", "content": "one"})),
            entry(json!([
                {"role": "assistant", "content": "two"},
                [{"role": "user", "content": "three"}]
            ])),
            HistoryEntry::from(ChatTurn::assistant("four")),
        ];

        let contents: Vec<String> = normalize(history)
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();

        assert_eq!(contents, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn scalars_are_unsupported() {
        let err = HistoryEntry::try_from(json!(42)).unwrap_err();

        assert!(matches!(err, Error::UnsupportedMessageFormat(v) if v == json!(42)));
    }

    #[test]
    fn scalars_inside_lists_are_unsupported() {
        let err = HistoryEntry::try_from(json!([{"content": "ok"}, "oops"])).unwrap_err();

        assert!(matches!(err, Error::UnsupportedMessageFormat(v) if v == json!("oops")));
    }

    #[test]
    fn unknown_roles_report_the_whole_entry() {
        let value = json!({"role": "tool", "content": "x"});
        let err = normalize(vec![entry(value.clone())]).unwrap_err();

        assert!(matches!(err, Error::UnsupportedMessageFormat(v) if v == value));
    }

    #[test]
    fn non_string_content_is_unsupported() {
        let err = normalize(vec![entry(json!({"role": "user", "content": ["a"]}))]).unwrap_err();

        assert!(matches!(err, Error::UnsupportedMessageFormat(_)));
    }

    #[test]
    fn empty_metadata_is_not_an_annotation() {
        let turns = normalize(vec![
            entry(json!({"content": "a", "metadata": {}})),
            entry(json!({"content": "b", "metadata": null})),
            entry(json!({"content": "c", "metadata": {"title": "Thinking..."}})),
        ])
        .unwrap();

        let annotations: Vec<bool> = turns.iter().map(ChatTurn::is_annotation).collect();
        assert_eq!(annotations, vec![false, false, true]);
    }

    #[test]
    fn answers_serialize_without_metadata() {
        let value = serde_json::to_value(DisplayMessage::answer("hi")).unwrap();

        assert_eq!(value, json!({"content": "hi", "role": "assistant"}));
    }

    #[test]
    fn loads_history_files() {
        let path = std::env::temp_dir().join(format!("oc-history-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();

        let turns = normalize(load_history(&path).unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(
            turns,
            vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")]
        );
    }

    #[test]
    fn unreadable_history_is_an_error() {
        let error = load_history(Path::new("/definitely/not/history.json")).unwrap_err();

        assert!(matches!(error, Error::Io(_)));
    }
}
