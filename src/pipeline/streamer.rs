//! Audio output streaming with bounded buffering.
//!
//! The streamer sits between the coordinator and the consumer-facing
//! audio stream. Real-time audio has no replay value, so when the
//! consumer falls behind the queue capacity, new chunks are dropped
//! rather than buffered or blocked on.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drain chunks from the coordinator and enqueue them on the bounded
/// output stream, dropping on backpressure. Returns the total number of
/// dropped chunks.
pub(crate) async fn run_streamer(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    out_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    debug_mode: bool,
) -> u64 {
    let mut drops: u64 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                match out_tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        drops += 1;
                        if debug_mode && drops % 10 == 0 {
                            debug!("audio stream backpressure: {drops} chunks dropped so far");
                        }
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    if drops > 0 {
        info!("audio streamer closed with {drops} dropped chunks");
    }
    drops
}
