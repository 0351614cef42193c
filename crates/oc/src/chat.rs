use ollama_stream::{Client, GenerateBody};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::Instrument;

use crate::message::DisplayMessage;
use crate::segmenter::{Markers, StreamSegmenter};

/// The current view of one model's response.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUpdate {
    pub model: String,
    /// Position of the model in the requested list.
    pub index: usize,
    pub messages: Vec<DisplayMessage>,
}

/// Streams the response of `model` to `prompt` as successive views.
///
/// Every item replaces the previous one. Transport failures end the stream
/// with a single error message.
pub fn respond(
    client: Client,
    model: String,
    prompt: String,
    markers: Markers,
) -> impl Stream<Item = Vec<DisplayMessage>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let segmenter = StreamSegmenter::new().with_markers(markers);
        drive(&client, &model, prompt, segmenter, &tx, |messages| messages).await;
    });

    ReceiverStream::new(rx)
}

/// Sends one prompt to several models at once.
///
/// Updates of different models interleave; the updates of a single model
/// keep their order.
pub fn respond_all(
    client: Client,
    models: Vec<String>,
    prompt: String,
    markers: Markers,
) -> impl Stream<Item = ModelUpdate> {
    let (tx, rx) = mpsc::channel(100);

    if models.is_empty() {
        tracing::event!(tracing::Level::WARN, "No model selected");
        // The channel is empty and has room.
        let _ = tx.try_send(ModelUpdate {
            model: String::new(),
            index: 0,
            messages: vec![DisplayMessage::error("No model selected")],
        });
        return ReceiverStream::new(rx);
    }

    for (index, model) in models.into_iter().enumerate() {
        let client = client.clone();
        let prompt = prompt.clone();
        let segmenter = StreamSegmenter::new()
            .with_markers(markers.clone())
            .with_span_id(span_id(index));
        let tx = tx.clone();
        let span = tracing::span!(tracing::Level::INFO, "model", name = %model);

        tokio::spawn(
            async move {
                drive(&client, &model, prompt, segmenter, &tx, |messages| {
                    ModelUpdate {
                        model: model.clone(),
                        index,
                        messages,
                    }
                })
                .await;
            }
            .instrument(span),
        );
    }

    ReceiverStream::new(rx)
}

/// Thinking span id of the model at `index`, saturating at `u32::MAX`.
fn span_id(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Runs one request through `segmenter`, sending every view to `tx`.
async fn drive<T>(
    client: &Client,
    model: &str,
    prompt: String,
    mut segmenter: StreamSegmenter,
    tx: &mpsc::Sender<T>,
    wrap: impl Fn(Vec<DisplayMessage>) -> T,
) {
    tracing::event!(tracing::Level::INFO, "Streaming response from {model}...");

    let records = match client.generate(&GenerateBody::new(model, prompt)).await {
        Ok(records) => records,
        Err(e) => {
            tracing::event!(tracing::Level::ERROR, "API request failed: {e}");
            let _ = tx.send(wrap(vec![DisplayMessage::error(e)])).await;
            return;
        }
    };

    tokio::pin!(records);

    while let Some(record) = records.next().await {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_record_error() => {
                tracing::event!(tracing::Level::WARN, "Skipping record: {e}");
                continue;
            }
            Err(e) => {
                tracing::event!(tracing::Level::ERROR, "Error streaming response: {e}");
                let _ = tx.send(wrap(vec![DisplayMessage::error(e)])).await;
                return;
            }
        };

        tracing::event!(tracing::Level::DEBUG, "Received record... {:?}", record);

        let view = segmenter.ingest(&record.response);
        if !view.is_empty() && tx.send(wrap(view)).await.is_err() {
            // The caller stopped listening.
            return;
        }
    }

    let _ = tx.send(wrap(segmenter.finalize())).await;
}
