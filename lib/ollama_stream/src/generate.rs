use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::client::Client;
use crate::error::Error;

// Generate API
const GENERATE_API: &str = "/api/generate";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GenerateBody {
    /// Name of the model that should complete the prompt.
    pub model: String,
    /// The full, already linearized prompt.
    pub prompt: String,
    /// Ask the server for newline-delimited partial records.
    pub stream: bool,
}

impl GenerateBody {
    /// Creates a new streaming `GenerateBody`
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
        }
    }
}

/// One line of the streamed `/api/generate` response.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Incremental token text.
    #[serde(default)]
    pub response: String,
    pub done: Option<bool>,
}

impl Record {
    /// Decodes a single NDJSON line.
    pub fn from_line(line: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(line).map_err(|e| Error::MalformedRecord {
            line: String::from_utf8_lossy(line).into_owned(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(text).map_err(|e| Error::MalformedRecord {
            line: text.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Splits an arbitrarily chunked byte stream into complete lines.
///
/// Splitting happens on raw bytes so a multi-byte character cut between two
/// network chunks is only decoded once its line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Adds a chunk and returns every line it completed, blank lines excluded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(index) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=index).collect();
            let line = trim_line(&line[..line.len() - 1]);
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
        }

        lines
    }

    /// Returns the unterminated trailing line, if any.
    pub fn finish(self) -> Option<Vec<u8>> {
        let line = trim_line(&self.pending);
        if line.is_empty() {
            None
        } else {
            Some(line.to_vec())
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);

    &line[start..end]
}

impl Client {
    /// Streams the records of a `/api/generate` call.
    ///
    /// Connection errors and non-success statuses are returned directly.
    /// Once the stream is open, undecodable lines show up as
    /// `Error::MalformedRecord` items and the stream keeps going, while read
    /// errors and read timeouts are sent as the last item.
    pub async fn generate(
        &self,
        body: &GenerateBody,
    ) -> Result<impl Stream<Item = Result<Record, Error>>, Error> {
        log::debug!("generate body: {:#?}", body);

        let request_body = serde_json::to_value(body)?;
        let response = self.post_stream(GENERATE_API, &request_body).await?;

        let timeout = self.config().timeout();

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            let bytes = response.bytes_stream();
            tokio::pin!(bytes);
            let mut lines = LineBuffer::default();

            loop {
                let chunk = match tokio::time::timeout(timeout, bytes.next()).await {
                    Err(_) => {
                        log::debug!("no data received for {timeout:?}");
                        let _ = tx.send(Err(Error::Timeout(timeout))).await;
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(Error::Request(e))).await;
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                for line in lines.push(&chunk) {
                    if tx.send(Record::from_line(&line)).await.is_err() {
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                let _ = tx.send(Record::from_line(&line)).await;
            }

            log::debug!("generate stream closed");
        });

        Ok(ReceiverStream::new(rx))
    }
}
