use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::{normalize, ChatTurn, HistoryEntry, Role};
use crate::segmenter::Markers;

const THINK_DIRECTIVE: &str = "/think";
const NO_THINK_DIRECTIVE: &str = "/no_think";

const USER_TOKEN: &str = "<｜User｜>";
const ASSISTANT_TOKEN: &str = "<｜Assistant｜>";
const END_OF_TURN_TOKEN: &str = "<｜end▁of▁sentence｜>";

/// How a conversation is linearized into a single prompt.
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    /// `role: content` lines with `/think` or `/no_think` directives.
    #[default]
    Generic,
    /// Role delimiter tokens, for DeepSeek style reasoning models.
    ReasoningTagged,
}

/// Builds the prompt for a new user message on top of the chat history.
///
/// Turns carrying metadata are display annotations and never reach the
/// prompt. An empty `custom_instructions` is the same as none.
pub fn build(
    history: Vec<HistoryEntry>,
    user_message: &str,
    custom_instructions: Option<&str>,
    thinking: bool,
    format: ModelFormat,
) -> Result<String> {
    if user_message.trim().is_empty() {
        return Err(Error::EmptyMessage);
    }

    let instructions = custom_instructions.filter(|i| !i.trim().is_empty());
    let mut turns = normalize(history)?;

    tracing::event!(
        tracing::Level::DEBUG,
        "Building {:?} prompt from {} history turns",
        format,
        turns.len()
    );

    let prompt = match format {
        ModelFormat::Generic => {
            let directive = if thinking {
                THINK_DIRECTIVE
            } else {
                NO_THINK_DIRECTIVE
            };

            let system = match instructions {
                Some(instructions) => format!("{instructions} {directive}"),
                None => directive.to_string(),
            };
            turns.insert(0, ChatTurn::system(system));
            turns.push(ChatTurn::user(format!("{user_message} {directive}")));

            render_generic(&turns)
        }
        ModelFormat::ReasoningTagged => {
            if let Some(instructions) = instructions {
                turns.insert(0, ChatTurn::system(instructions));
            }
            turns.push(ChatTurn::user(user_message));

            let mut prompt = render_reasoning_tagged(&turns);
            prompt.push_str(ASSISTANT_TOKEN);
            if !thinking {
                let markers = Markers::default();
                prompt.push_str(&format!("{}\n\n{}\n\n", markers.start, markers.end));
            }
            prompt
        }
    };

    Ok(prompt)
}

fn render_generic(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .filter(|turn| !turn.is_annotation())
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<String>>()
        .join("\n")
}

fn render_reasoning_tagged(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .filter(|turn| !turn.is_annotation())
        .map(|turn| match turn.role {
            Role::System => turn.content.clone(),
            Role::User => format!("{USER_TOKEN}{}", turn.content),
            Role::Assistant => format!("{ASSISTANT_TOKEN}{}{END_OF_TURN_TOKEN}", turn.content),
        })
        .collect::<Vec<String>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn history(value: serde_json::Value) -> Vec<HistoryEntry> {
        match HistoryEntry::try_from(value).unwrap() {
            HistoryEntry::Nested(entries) => entries,
            entry => vec![entry],
        }
    }

    #[test]
    fn empty_history_ends_with_directive_and_user_lines() {
        let prompt = build(vec![], "hi", Some(""), true, ModelFormat::Generic).unwrap();

        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines, vec!["system: /think", "user: hi /think"]);
    }

    #[test]
    fn instructions_carry_the_directive() {
        let prompt = build(
            vec![],
            "hi",
            Some("Answer in French."),
            false,
            ModelFormat::Generic,
        )
        .unwrap();

        assert_eq!(
            prompt,
            "system: Answer in French. /no_think\nuser: hi /no_think"
        );
    }

    #[test]
    fn generic_keeps_history_order() {
        let history = history(json!([
            {"role": "user", "content": "What is 2 + 2?"},
            {"role": "assistant", "content": "4"}
        ]));

        let prompt = build(history, "And 3 + 3?", None, true, ModelFormat::Generic).unwrap();

        assert_eq!(
            prompt,
            "system: /think\nuser: What is 2 + 2?\nassistant: 4\nuser: And 3 + 3? /think"
        );
    }

    #[test]
    fn annotations_never_reach_the_prompt() {
        let history = vec![
            HistoryEntry::from(ChatTurn::user("question")),
            HistoryEntry::from(ChatTurn::assistant("SECRET REASONING").with_metadata(
                json!({"title": "Thinking...", "id": 0, "status": "done"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )),
            HistoryEntry::from(ChatTurn::assistant("answer")),
        ];

        for format in [ModelFormat::Generic, ModelFormat::ReasoningTagged] {
            let prompt = build(history.clone(), "next", None, true, format).unwrap();

            assert!(!prompt.contains("SECRET REASONING"), "{format:?}: {prompt}");
            assert!(prompt.contains("answer"));
        }
    }

    #[test]
    fn reasoning_tagged_lets_the_model_think() {
        let history = history(json!([
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "hi there"}
        ]));

        let prompt = build(
            history,
            "how are you?",
            Some("Be brief."),
            true,
            ModelFormat::ReasoningTagged,
        )
        .unwrap();

        assert_eq!(
            prompt,
            "Be brief.<｜User｜>hello<｜Assistant｜>hi there<｜end▁of▁sentence｜><｜User｜>how are you?<｜Assistant｜>"
        );
    }

    #[test]
    fn reasoning_tagged_suppresses_thinking_with_an_empty_span() {
        let prompt = build(vec![], "hi", None, false, ModelFormat::ReasoningTagged).unwrap();

        assert_eq!(prompt, "<｜User｜>hi<｜Assistant｜><think>\n\n</think>\n\n");
        assert!(!prompt.contains(NO_THINK_DIRECTIVE));
    }

    #[test]
    fn empty_user_message_is_rejected() {
        let err = build(vec![], "  ", None, true, ModelFormat::Generic).unwrap_err();

        assert!(matches!(err, Error::EmptyMessage));
    }

    #[test]
    fn malformed_history_aborts_the_build() {
        let history = vec![HistoryEntry::Nested(vec![HistoryEntry::Map(
            json!({"role": 7}).as_object().cloned().unwrap(),
        )])];

        let err = build(history, "hi", None, true, ModelFormat::Generic).unwrap_err();

        assert!(matches!(err, Error::UnsupportedMessageFormat(v) if v == json!({"role": 7})));
    }
}
