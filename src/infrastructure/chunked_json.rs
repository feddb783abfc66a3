// Chunked event streaming: u32 big-endian length prefix, then JSON (optionally Brotli)
use crate::application::events::ChartEvent;
use crate::infrastructure::http_response::brotli;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub fn chunked_json_stream<S>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = ChartEvent> + Send + 'static,
{
    let byte_stream = stream.then(move |event| async move { encode_chunk(&event, compress).await });

    // chunks are compressed individually, so no Content-Encoding header
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson-chunked")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn encode_chunk(event: &ChartEvent, compress: bool) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(event)?;
    let payload = if compress { brotli(json).await? } else { json };

    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    Ok(chunk.freeze())
}

/// Streams everything published on `rx`. Subscribers that fall behind skip
/// the events they missed.
pub fn stream_from_broadcast(rx: broadcast::Receiver<ChartEvent>, compress: bool) -> impl IntoResponse {
    let mut events = BroadcastStream::new(rx);
    let stream = async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => yield event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream subscriber lagged, skipped {} events", skipped);
                }
            }
        }
    };

    match chunked_json_stream(stream, compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
