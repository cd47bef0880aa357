//! Server-Sent Events support

use crate::events::TraceEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Stream trace events as `data: <json>` frames until the run drops its sender
pub fn trace_stream(
    rx: mpsc::Receiver<TraceEvent>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
