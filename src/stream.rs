//! Producer/consumer plumbing shared by the streaming operations
//!
//! The producer drives the response stream of one IMAP command and
//! pushes items onto a bounded queue as they come off the wire; the
//! consumer drains the queue into the caller's callback. The command's
//! own outcome is reported only after the queue is empty, so a failure
//! that arrives after some items were delivered still fails the whole
//! attempt.

use crate::error::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

/// Items buffered between the wire and the callback.
const QUEUE_DEPTH: usize = 64;

/// Deliver every item of `items` to `on_item`, in order.
///
/// Returns the number of items delivered, or the first error the
/// stream produced. Items delivered before that error are not
/// retracted: callers that need all-or-nothing results collect into
/// an attempt-local buffer and keep it only on `Ok`.
pub async fn drain<T, S, F>(items: S, mut on_item: F) -> Result<usize>
where
    S: Stream<Item = Result<T>>,
    F: FnMut(T),
{
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);

    let producer = async move {
        let mut items = std::pin::pin!(items);
        while let Some(item) = items.next().await {
            // The receiver lives until the join below completes.
            if tx.send(item?).await.is_err() {
                break;
            }
        }
        Ok::<(), crate::Error>(())
    };

    let consumer = async {
        let mut delivered = 0;
        while let Some(item) = rx.recv().await {
            on_item(item);
            delivered += 1;
        }
        delivered
    };

    let (done, delivered) = tokio::join!(producer, consumer);
    done?;
    Ok(delivered)
}
