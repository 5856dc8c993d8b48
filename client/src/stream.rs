//! Continuous consumption of a run's event feed.

use exosphere_types::{EventPayload, RunEvent, RunId, DEFAULT_EVENT_TYPE};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::cancel::merge_cancellations;
use crate::client::{read_capped_error_body, ExosphereClient};
use crate::error::ClientError;
use crate::sse::FrameDecoder;

/// Handler for stream faults that should not abort the awaiting caller.
pub type OnStreamError = Box<dyn FnMut(ClientError) + Send>;

/// Caller-supplied payload transform, replacing the default best-effort
/// JSON decode.
pub type PayloadParser = Box<dyn FnMut(&str) -> EventPayload + Send>;

/// Configuration for [`stream_run_events`].
#[derive(Default)]
pub struct StreamRunOptions {
    cancel: Option<CancellationToken>,
    on_error: Option<OnStreamError>,
    payload_parser: Option<PayloadParser>,
}

impl StreamRunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the stream when this token fires. The reader resolves normally
    /// on cancellation; it never invokes the event callback afterwards.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Intercept faults raised after a successful open. When set, the reader
    /// hands the fault here and resolves normally instead of returning it.
    /// A non-success open is never routed through this.
    #[must_use]
    pub fn with_on_error(mut self, on_error: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Transform joined `data` lines yourself instead of the default
    /// JSON-with-text-fallback decode.
    #[must_use]
    pub fn with_payload_parser(
        mut self,
        parser: impl FnMut(&str) -> EventPayload + Send + 'static,
    ) -> Self {
        self.payload_parser = Some(Box::new(parser));
        self
    }
}

impl std::fmt::Debug for StreamRunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRunOptions")
            .field("cancel", &self.cancel.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("payload_parser", &self.payload_parser.is_some())
            .finish()
    }
}

/// Open one streaming connection to a run's event feed and invoke `on_event`
/// once per decoded event, in arrival order, until the stream ends, faults,
/// or is cancelled.
///
/// Frames are emitted synchronously as they are decoded; the next chunk is
/// not read until every frame of the current one has been dispatched. On
/// every exit path the internally owned cancellation fires (stopping the
/// transport if it has not already stopped) and the stream handle is
/// dropped; the callback is never invoked after return.
pub async fn stream_run_events<F>(
    client: &ExosphereClient,
    run_id: &RunId,
    mut on_event: F,
    options: StreamRunOptions,
) -> Result<(), ClientError>
where
    F: FnMut(RunEvent),
{
    let StreamRunOptions {
        cancel,
        mut on_error,
        mut payload_parser,
    } = options;

    // One derived token bounds the request lifetime: the caller's token (if
    // any) plus an internally owned one that fires when this call returns.
    let internal = CancellationToken::new();
    let _stop_transport = internal.clone().drop_guard();
    let merged = merge_cancellations(cancel.into_iter().chain([internal]));

    let response = match client.open_event_stream(run_id, &merged).await {
        Ok(response) => response,
        Err(ClientError::Cancelled { .. }) => return Ok(()),
        Err(e) => return Err(e),
    };

    let status = response.status();
    if !status.is_success() {
        let body = read_capped_error_body(response).await;
        return Err(ClientError::api(status, body));
    }

    let mut stream = response.bytes_stream();
    let mut decoder = FrameDecoder::new();

    let result = loop {
        let next = tokio::select! {
            () = merged.cancelled() => break Ok(()),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            // Natural end of stream.
            break Ok(());
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => break Err(ClientError::Http(e)),
        };

        if let Err(fault) = dispatch_chunk(
            &chunk,
            &mut decoder,
            &mut on_event,
            payload_parser.as_mut(),
        ) {
            break Err(fault);
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(fault) => match on_error.as_mut() {
            Some(on_error) => {
                tracing::warn!(%run_id, error = %fault, "event stream fault intercepted");
                on_error(fault);
                Ok(())
            }
            None => Err(fault),
        },
    }
}

/// Feed one chunk to the decoder and emit every frame it completes.
fn dispatch_chunk<F>(
    chunk: &[u8],
    decoder: &mut FrameDecoder,
    on_event: &mut F,
    mut payload_parser: Option<&mut PayloadParser>,
) -> Result<(), ClientError>
where
    F: FnMut(RunEvent),
{
    decoder.push(chunk)?;
    while let Some(frame) = decoder.next_frame()? {
        let payload = frame.data.as_deref().map(|raw| match payload_parser.as_mut() {
            Some(parser) => parser(raw),
            None => EventPayload::decode(raw),
        });
        on_event(RunEvent {
            event_type: frame.event.unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_owned()),
            payload,
            ts: frame.ts,
        });
    }
    Ok(())
}
