use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::message::{DisplayMessage, Metadata, Role, Status};

/// Upper bound of the accumulated response text, in bytes.
pub const DEFAULT_MAX_BUFFER: usize = 4 * 1024 * 1024;
pub const THINKING_TITLE: &str = "Thinking...";
/// Shown when a response finishes without any content.
pub const EMPTY_RESPONSE: &str = "Sorry, the model returned an empty response.";

/// Delimiters of a thinking span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    pub start: String,
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: "<think>".to_string(),
            end: "</think>".to_string(),
        }
    }
}

#[derive(Debug)]
struct ThinkingSpan {
    id: u32,
    content: String,
    started_at: Instant,
    elapsed: Option<Duration>,
}

impl ThinkingSpan {
    fn open(id: u32) -> Self {
        tracing::event!(tracing::Level::DEBUG, "Thinking span {id} opened");
        Self {
            id,
            content: String::new(),
            started_at: Instant::now(),
            elapsed: None,
        }
    }

    /// Closing twice keeps the first measurement.
    fn close(&mut self) {
        if self.elapsed.is_none() {
            let elapsed = self.started_at.elapsed();
            tracing::event!(
                tracing::Level::DEBUG,
                "Thinking span {} closed after {:?}",
                self.id,
                elapsed
            );
            self.elapsed = Some(elapsed);
        }
    }

    fn snapshot(&self) -> DisplayMessage {
        DisplayMessage {
            content: self.content.clone(),
            role: Role::Assistant,
            metadata: Some(Metadata {
                title: THINKING_TITLE.to_string(),
                id: self.id,
                status: if self.elapsed.is_some() {
                    Status::Done
                } else {
                    Status::Pending
                },
                time: self.elapsed.map(|elapsed| elapsed.as_secs_f64()),
            }),
        }
    }
}

/// Splits one streamed response into a thinking span and the final answer.
///
/// Every call to `ingest` re-reads the whole accumulated text, so markers cut
/// across chunk boundaries are still found. The returned messages are the
/// complete current view of the response and replace whatever the previous
/// call returned. One segmenter serves exactly one request.
#[derive(Debug)]
pub struct StreamSegmenter {
    markers: Markers,
    span_id: u32,
    max_buffer: usize,
    buffer: String,
    span: Option<ThinkingSpan>,
    truncated: bool,
}

impl Default for StreamSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSegmenter {
    pub fn new() -> Self {
        Self {
            markers: Markers::default(),
            span_id: 0,
            max_buffer: DEFAULT_MAX_BUFFER,
            buffer: String::new(),
            span: None,
            truncated: false,
        }
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    /// Sets the id reported in the metadata of the thinking message.
    pub fn with_span_id(mut self, id: u32) -> Self {
        self.span_id = id;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Adds a chunk of response text and returns the current view.
    pub fn ingest(&mut self, chunk: &str) -> Vec<DisplayMessage> {
        self.append(chunk);
        self.evaluate()
    }

    /// Returns the terminal view once the upstream stream has ended.
    ///
    /// An unterminated thinking span is closed here, and an empty response
    /// still produces one apology message.
    pub fn finalize(mut self) -> Vec<DisplayMessage> {
        let mut view = self.evaluate();

        if let Some(span) = self.span.as_mut() {
            span.close();
            if let Some(thinking) = view.first_mut() {
                *thinking = span.snapshot();
            }
        } else if view.is_empty() && !self.buffer.trim().is_empty() {
            view.push(DisplayMessage::answer(self.buffer.trim()));
        }

        if view.is_empty() {
            tracing::event!(tracing::Level::INFO, "Empty response, using fallback message");
            view.push(DisplayMessage::answer(EMPTY_RESPONSE));
        }

        view
    }

    fn append(&mut self, chunk: &str) {
        if self.buffer.len() + chunk.len() <= self.max_buffer {
            self.buffer.push_str(chunk);
            return;
        }

        let mut room = self.max_buffer.saturating_sub(self.buffer.len()).min(chunk.len());
        while !chunk.is_char_boundary(room) {
            room -= 1;
        }
        self.buffer.push_str(&chunk[..room]);

        if !self.truncated {
            tracing::event!(
                tracing::Level::WARN,
                "Response exceeds {} bytes, dropping the rest",
                self.max_buffer
            );
            self.truncated = true;
        }
    }

    fn evaluate(&mut self) -> Vec<DisplayMessage> {
        let Markers { start, end } = &self.markers;

        if let Some(rest) = self.buffer.strip_prefix(start.as_str()) {
            let span_id = self.span_id;
            let span = self.span.get_or_insert_with(|| ThinkingSpan::open(span_id));

            return match rest.find(end.as_str()) {
                None => {
                    span.content = strip_partial_marker(rest, end).trim().to_string();
                    vec![span.snapshot()]
                }
                Some(index) => {
                    span.content = rest[..index].trim().to_string();
                    span.close();

                    let answer = rest[index + end.len()..].trim();
                    if answer.is_empty() {
                        vec![span.snapshot()]
                    } else {
                        vec![span.snapshot(), DisplayMessage::answer(answer)]
                    }
                }
            };
        }

        if let Some(index) = self.buffer.find(end.as_str()) {
            let answer = self.buffer[index + end.len()..].trim();
            return if answer.is_empty() {
                vec![]
            } else {
                vec![DisplayMessage::answer(answer)]
            };
        }

        // Hold back text that may still turn into a start marker.
        if start.starts_with(self.buffer.as_str()) {
            return vec![];
        }

        let answer = self.buffer.trim();
        if answer.is_empty() {
            vec![]
        } else {
            vec![DisplayMessage::answer(answer)]
        }
    }
}

/// Drops a trailing prefix of `marker`, a marker that hasn't fully arrived yet.
fn strip_partial_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    (1..marker.len())
        .rev()
        .filter(|len| marker.is_char_boundary(*len))
        .find_map(|len| text.strip_suffix(&marker[..len]))
        .unwrap_or(text)
}
