//! Dedicated writer task for the outbound path.
//!
//! Every encoded packet is handed to an mpsc channel consumed by a single
//! writer task, so concurrent producers can never interleave partial frames
//! on the shared output stream. The task batches ready frames into one
//! `write_vectored` call where possible.
//!
//! ```text
//! dispatch 1 ─┐
//! dispatch 2 ─┼─► mpsc::Sender<Bytes> ─► writer task ─► stdout
//! heartbeat  ─┘
//! ```
//!
//! An atomic in-flight counter is incremented at enqueue and decremented once
//! the batch has been written and flushed; clean shutdown waits on it to
//! reach zero so no response is lost at exit.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, WorkerError};

/// Default channel capacity for the frame queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending encoded frames to the writer task.
///
/// Cheaply cloneable; every producer task holds one.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    in_flight: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Enqueue one encoded frame for writing.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ChannelClosed`] if the writer task has exited.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::Release);
            WorkerError::ChannelClosed
        })
    }

    /// Number of frames enqueued but not yet written.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every enqueued frame has been written and flushed.
    pub async fn wait_idle(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Spawn the writer task over `writer` and return a handle for producers.
pub fn spawn_writer_task<W>(
    writer: W,
    channel_capacity: usize,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity);
    let in_flight = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        in_flight: in_flight.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, in_flight));

    (handle, task)
}

/// Receive frames and write them in enqueue order, batching when more than
/// one frame is ready.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    in_flight: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            // All senders dropped: clean shutdown.
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
        in_flight.fetch_sub(batch.len(), Ordering::Release);
    }
}

/// Write a batch of frames with scatter/gather I/O, continuing after partial
/// writes until every byte has landed.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(|f| f.len()).sum();
    let mut written = 0usize;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(WorkerError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlice list for the batch bytes not yet written.
fn remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame[start..]));
        }
        offset = end;
    }

    slices
}
