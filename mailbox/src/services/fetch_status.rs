//! Merge of background fetch-progress streams
//!
//! Each source (one per listing type) is forwarded by its own task into a
//! shared channel, tagged with the source it came from. Events keep their
//! order within a source; across sources they are delivered in arrival order.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::{FetchProgress, FetchStatus, ListingType};

pub struct StatusMerger {
    tx: flume::Sender<FetchStatus>,
    rx: flume::Receiver<FetchStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl StatusMerger {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            tasks: Vec::new(),
        }
    }

    /// Start forwarding `stream`. Must be called from within a tokio runtime.
    pub fn add_source<S>(&mut self, source: ListingType, stream: S)
    where
        S: Stream<Item = FetchProgress> + Send + 'static,
    {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(progress) = stream.next().await {
                if tx.send_async(progress.tagged(source)).await.is_err() {
                    break;
                }
            }
            debug!("{} fetch status source ended", source);
        });
        self.tasks.push(task);
    }

    /// The merged stream. It ends once every source has ended.
    pub fn into_stream(self) -> MergedStatusStream {
        MergedStatusStream {
            inner: self.rx.into_stream().boxed(),
            tasks: self.tasks,
        }
    }
}

impl Default for StatusMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Merged, tagged fetch-status events. Dropping it stops the forwarding tasks.
pub struct MergedStatusStream {
    inner: BoxStream<'static, FetchStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl MergedStatusStream {
    /// Stop forwarding. Events already merged are still delivered. Idempotent.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Stream for MergedStatusStream {
    type Item = FetchStatus;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FetchStatus>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl Drop for MergedStatusStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
