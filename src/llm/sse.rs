//! Server-sent event plumbing shared by the streaming providers.

use anyhow::Result;
use async_stream::try_stream;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest_eventsource::{Error as SseError, Event, RequestBuilderExt};
use tracing::debug;

/// Open an SSE request and yield the `data` field of every message.
///
/// The source is closed when the server ends the stream so it does not
/// reconnect. A non-2xx status becomes an error carrying the body.
pub(crate) fn data_events(request: reqwest::RequestBuilder) -> Result<BoxStream<'static, Result<String>>> {
    let mut source = request.eventsource()?;
    let stream = try_stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!("event stream opened"),
                Ok(Event::Message(message)) => {
                    yield message.data;
                }
                Err(SseError::StreamEnded) => break,
                Err(SseError::InvalidStatusCode(status, response)) => {
                    source.close();
                    let body = response.text().await.unwrap_or_default();
                    Err::<(), _>(anyhow::anyhow!("API error ({}): {}", status, body))?;
                }
                Err(e) => {
                    source.close();
                    Err::<(), _>(anyhow::Error::from(e))?;
                }
            }
        }
        source.close();
    };
    Ok(stream.boxed())
}
