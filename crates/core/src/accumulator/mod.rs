//! Fixed-size block regrouping without any overlap or transform.

use std::sync::Arc;

use num_traits::AsPrimitive;
use tracing::{debug, warn};

use crate::queue::{SlotQueue, SlotRing};
use crate::stream::StreamReader;
use crate::{Result, Sample};

/// Producer half of a [`BlockAccumulator`].
pub struct BlockWriter<S, Q = SlotRing<S>> {
    queue: Arc<Q>,
    partial: Box<[S]>,
    len: usize,
}

impl<S, Q> BlockWriter<S, Q>
where
    S: Sample,
    Q: SlotQueue<S>,
{
    /// Appends samples, committing a block each time one fills up.
    ///
    /// When the queue has no free slot the remaining input of this call is
    /// discarded and only the accepted prefix length is returned. A full
    /// partial block is kept and retried on the next call.
    pub fn put(&mut self, data: &[S]) -> Result<usize> {
        let block = self.partial.len();
        let mut accepted = 0;
        loop {
            if self.len == block {
                let Some(handle) = self.queue.reserve_write() else {
                    if accepted < data.len() {
                        warn!(
                            block_size = block,
                            slots = self.queue.capacity(),
                            filled = self.queue.filled(),
                            dropped = data.len() - accepted,
                            "block queue overflow, discarding input"
                        );
                    }
                    return Ok(accepted);
                };
                let partial = &self.partial;
                self.queue
                    .with_slot(&handle, |slot| slot.copy_from_slice(partial));
                self.queue.commit_write(handle)?;
                self.len = 0;
            }

            if accepted == data.len() {
                return Ok(accepted);
            }
            let n = (data.len() - accepted).min(block - self.len);
            self.partial[self.len..self.len + n].copy_from_slice(&data[accepted..accepted + n]);
            self.len += n;
            accepted += n;
        }
    }

    /// Samples waiting for their block to fill up.
    pub fn pending(&self) -> usize {
        self.len
    }
}

/// Regroups an arbitrarily chunked stream into fixed-size blocks held in a
/// slot queue, and drains those blocks back out as a stream.
pub struct BlockAccumulator<S, Q = SlotRing<S>> {
    writer: BlockWriter<S, Q>,
    reader: StreamReader<S, S, Q>,
}

impl<S> BlockAccumulator<S>
where
    S: Sample + AsPrimitive<S>,
{
    /// Creates an accumulator of `slots` blocks of `block_size` samples.
    pub fn new(block_size: usize, slots: usize) -> Result<Self> {
        let queue = SlotRing::new(slots, block_size)?;
        Ok(Self::with_queue(queue))
    }
}

impl<S, Q> BlockAccumulator<S, Q>
where
    S: Sample + AsPrimitive<S>,
    Q: SlotQueue<S>,
{
    /// Builds an accumulator on top of a caller-provided queue.
    pub fn with_queue(queue: Q) -> Self {
        let block = queue.slot_len();
        debug!(
            block_size = block,
            slots = queue.capacity(),
            "creating block accumulator"
        );
        let queue = Arc::new(queue);
        Self {
            writer: BlockWriter {
                queue: Arc::clone(&queue),
                partial: vec![S::default(); block].into_boxed_slice(),
                len: 0,
            },
            reader: StreamReader::new(queue, false),
        }
    }

    pub fn put(&mut self, data: &[S]) -> Result<usize> {
        self.writer.put(data)
    }

    /// Copies up to `out.len()` already-blocked samples; short on underflow.
    pub fn get(&mut self, out: &mut [S]) -> Result<usize> {
        self.reader.get(out)
    }

    /// Pushes `buf` through the accumulator and overwrites it with whatever
    /// comes out. A short result is logged as an underflow.
    pub fn process(&mut self, buf: &mut [S]) -> Result<usize> {
        self.put(buf)?;
        let got = self.get(buf)?;
        if got < buf.len() {
            warn!(
                wanted = buf.len(),
                got, "buffer underflow"
            );
        }
        Ok(got)
    }

    /// Two-buffer variant of [`process`](Self::process): pushes `input`,
    /// then fills as much of `output` as is ready.
    pub fn process_into(&mut self, input: &[S], output: &mut [S]) -> Result<usize> {
        self.put(input)?;
        let got = self.get(output)?;
        if got < output.len() {
            warn!(wanted = output.len(), got, "buffer underflow");
        }
        Ok(got)
    }

    /// All-or-nothing read; see [`StreamReader::get_exact`].
    pub fn get_exact(&mut self, out: &mut [S]) -> Result<bool> {
        self.reader.get_exact(out)
    }

    pub fn available(&self) -> usize {
        self.reader.available()
    }

    /// Separates the producer and consumer halves so they can live on
    /// different threads.
    pub fn split(self) -> (BlockWriter<S, Q>, StreamReader<S, S, Q>) {
        (self.writer, self.reader)
    }
}
