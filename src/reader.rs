//! Drains the device into the history.

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::{
    codec::FramedRead,
    sync::{CancellationToken, DropGuard},
};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::{
    history::History,
    serial::codecs::{Framing, RecordCodec},
    transport::BoxedReader,
};

type Frames = FramedRead<BoxedReader, RecordCodec>;

/// A running reader.
/// Dropping it stops the reader.
#[derive(Debug)]
pub(crate) struct ReaderHandle {
    shutdown: DropGuard,
    join_handle: JoinHandle<()>,
}

impl ReaderHandle {
    /// Start draining the reader into the history.
    pub(crate) fn spawn(
        device: &str,
        reader: BoxedReader,
        framing: Framing,
        history: Arc<History>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let frames = FramedRead::new(reader, RecordCodec::from(framing));

        let join_handle = tokio::spawn(
            run(frames, history, shutdown.clone()).instrument(info_span!("reader", %device)),
        );

        Self {
            shutdown: shutdown.drop_guard(),
            join_handle,
        }
    }

    /// Has the reader stopped on its own?
    pub(crate) fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Stop the reader and wait for it to finish its final drain.
    pub(crate) async fn stop(self) {
        debug!("Stopping reader");
        let token = self.shutdown.disarm();
        token.cancel();

        if let Err(e) = self.join_handle.await {
            warn!("Reader join error: {e:?}");
        }
        debug!("Reader stopped");
    }
}

async fn run(mut frames: Frames, history: Arc<History>, shutdown: CancellationToken) {
    info!("Reader started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                drain(&mut frames, &history).await;
                debug!("Told to stop");

                // Whoever stopped us owns the session state.
                return;
            }
            frame = frames.next() => match frame {
                Some(Ok(payload)) => {
                    if payload.is_empty() {
                        continue;
                    }

                    trace!("Message from device: `{:?}`", &payload[..payload.len().min(32)]);
                    history.append(payload).await;
                }
                // The framed stream ends after its first error, so there is no retrying.
                Some(Err(e)) => {
                    error!(?e, "Problem reading from device, giving up on it");
                    break;
                }
                None => {
                    error!("Device closed the stream");
                    break;
                }
            }
        }
    }

    // Nobody asked us to stop, so the device is gone.
    // Blocked callers must learn about it.
    history.close();
}

/// Take whatever is already buffered, without waiting for more.
async fn drain(frames: &mut Frames, history: &History) {
    let mut drained = 0;

    while let Some(Some(Ok(payload))) = frames.next().now_or_never() {
        if !payload.is_empty() {
            history.append(payload).await;
            drained += 1;
        }
    }

    if drained > 0 {
        debug!("Drained {drained} record(s) on stop");
    }
}
