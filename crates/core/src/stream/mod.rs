//! Consumer side of a slot queue: turns committed slots back into a sample
//! stream (partial reads) or into whole records (all-or-nothing reads).

use std::marker::PhantomData;
use std::sync::Arc;

use num_traits::AsPrimitive;

use crate::queue::{SlotHandle, SlotQueue, SlotRing};
use crate::{OverlapError, Result, Sample, Work};

/// Drains one output queue. Owned by the consumer thread.
///
/// `W` is the element type stored in the queue, `S` the type handed to the
/// caller; conversion is a plain numeric cast.
pub struct StreamReader<S, W = Work, Q = SlotRing<W>> {
    queue: Arc<Q>,
    cursor: Option<SlotHandle>,
    pos: usize,
    records: bool,
    _marker: PhantomData<fn(W) -> S>,
}

impl<S, W, Q> StreamReader<S, W, Q>
where
    S: Sample,
    W: AsPrimitive<S>,
    Q: SlotQueue<W>,
{
    pub(crate) fn new(queue: Arc<Q>, records: bool) -> Self {
        Self {
            queue,
            cursor: None,
            pos: 0,
            records,
            _marker: PhantomData,
        }
    }

    /// Copies up to `out.len()` samples and returns how many were copied.
    ///
    /// Never blocks: a short count means the producer has not finished enough
    /// blocks yet. A partly drained block is resumed on the next call.
    pub fn get(&mut self, out: &mut [S]) -> Result<usize> {
        if self.records {
            return Err(OverlapError::WrongMode {
                expected: "streaming",
            });
        }

        let slot_len = self.queue.slot_len();
        let mut copied = 0;
        while copied < out.len() {
            let handle = match self.cursor {
                Some(handle) => handle,
                None => match self.queue.reserve_read() {
                    Some(handle) => {
                        self.cursor = Some(handle);
                        handle
                    }
                    None => break,
                },
            };

            let n = (out.len() - copied).min(slot_len - self.pos);
            let pos = self.pos;
            self.queue.with_slot(&handle, |slot| {
                for (dst, src) in out[copied..copied + n]
                    .iter_mut()
                    .zip(&slot[pos..pos + n])
                {
                    *dst = src.as_();
                }
            });

            self.pos += n;
            copied += n;
            if self.pos >= slot_len {
                self.queue.release_read(handle)?;
                self.cursor = None;
                self.pos = 0;
            }
        }
        Ok(copied)
    }

    /// All-or-nothing streaming read: fills `out` completely and returns
    /// `true`, or copies nothing and returns `false` if fewer than
    /// `out.len()` samples are ready.
    pub fn get_exact(&mut self, out: &mut [S]) -> Result<bool> {
        if self.records {
            return Err(OverlapError::WrongMode {
                expected: "streaming",
            });
        }
        if self.available() < out.len() {
            return Ok(false);
        }
        // Only this reader consumes, so everything counted above is still there.
        let copied = self.get(out)?;
        Ok(copied == out.len())
    }

    /// Copies exactly one record into `out`, or returns `false` if none is
    /// queued. `out` must be exactly one record long.
    pub fn get_record(&mut self, out: &mut [S]) -> Result<bool> {
        if !self.records {
            return Err(OverlapError::WrongMode { expected: "record" });
        }
        if out.len() != self.queue.slot_len() {
            return Err(OverlapError::InvalidInput(
                "record buffer length must match the configured record length",
            ));
        }

        let Some(handle) = self.queue.reserve_read() else {
            return Ok(false);
        };
        self.queue.with_slot(&handle, |slot| {
            for (dst, src) in out.iter_mut().zip(slot.iter()) {
                *dst = src.as_();
            }
        });
        self.queue.release_read(handle)?;
        Ok(true)
    }

    /// Samples (streaming) or records ready to be read right now.
    pub fn available(&self) -> usize {
        let queued = self.queue.filled();
        if self.records {
            queued
        } else {
            let partial = if self.cursor.is_some() {
                self.queue.slot_len() - self.pos
            } else {
                0
            };
            queued * self.queue.slot_len() + partial
        }
    }

    /// Length of one output slot (block or record).
    pub fn slot_len(&self) -> usize {
        self.queue.slot_len()
    }
}

impl<S, W, Q> std::fmt::Debug for StreamReader<S, W, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("cursor", &self.cursor)
            .field("pos", &self.pos)
            .field("records", &self.records)
            .finish()
    }
}
