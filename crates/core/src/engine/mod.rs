//! Streaming overlap-add engine.
//!
//! Input samples are cast to [`Work`] and regrouped into blocks in the input
//! queue. Once enough blocks are held, a pass assembles them into the working
//! buffer, runs the transform, and either overlap-adds the faded result into
//! the held output blocks (streaming) or emits one record (record mode).
//! After each pass the oldest `skip` input blocks are released and the oldest
//! `skip` output blocks are committed for the reader.
//!
//! All of this runs synchronously inside [`OverlapWriter::put`]. The reader
//! half only touches the output queue, so writer and reader can live on two
//! different threads after [`OverlapEngine::split`].

use std::marker::PhantomData;
use std::sync::Arc;

use num_traits::AsPrimitive;
use tracing::{debug, info, trace, warn};

use crate::config::{EngineConfig, Geometry};
use crate::fade::{FadeTable, Placement};
use crate::queue::{SlotHandle, SlotQueue, SlotRing};
use crate::stream::StreamReader;
use crate::{OverlapError, Result, Sample, Transform, Work};

/// Blocks held by the engine, addressed by a pair of ring cursors.
///
/// The ring has one more entry than it can hold so that `cur == next` always
/// means empty.
#[derive(Debug)]
struct HandleRing {
    slots: Box<[Option<SlotHandle>]>,
    cur: usize,
    next: usize,
}

impl HandleRing {
    fn new(held: usize) -> Self {
        Self {
            slots: vec![None; held + 1].into_boxed_slice(),
            cur: 0,
            next: 0,
        }
    }

    fn modulus(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        (self.next + self.modulus() - self.cur) % self.modulus()
    }

    fn push(&mut self, handle: SlotHandle) {
        debug_assert!(self.len() + 1 < self.modulus());
        self.slots[self.next] = Some(handle);
        self.next = (self.next + 1) % self.modulus();
    }

    fn pop(&mut self) -> Option<SlotHandle> {
        if self.cur == self.next {
            return None;
        }
        let handle = self.slots[self.cur].take();
        self.cur = (self.cur + 1) % self.modulus();
        handle
    }

    /// `index`-th held block, oldest first.
    fn get(&self, index: usize) -> Option<SlotHandle> {
        if index >= self.len() {
            return None;
        }
        self.slots[(self.cur + index) % self.modulus()]
    }
}

/// One transform call within a pass.
#[derive(Debug, Clone, Copy)]
struct SubWindow {
    /// Start of the window inside the concatenated input blocks.
    in_offset: usize,
    len: usize,
    /// Start of the written-back region inside the window.
    emit_from: usize,
    placement: Placement,
}

fn plan(geometry: &Geometry) -> Vec<SubWindow> {
    let block = geometry.block_size;
    if geometry.is_paired() {
        // Block-long windows at evenly spaced offsets.
        let step = block / geometry.sub_windows;
        (0..geometry.sub_windows)
            .map(|i| SubWindow {
                in_offset: step * i,
                len: block,
                emit_from: 0,
                placement: Placement {
                    out_offset: step * i,
                    len: block,
                },
            })
            .collect()
    } else {
        vec![SubWindow {
            in_offset: 0,
            len: geometry.window_len,
            emit_from: geometry.lookbehind * block,
            placement: Placement {
                out_offset: 0,
                len: geometry.emit_len,
            },
        }]
    }
}

/// Producer half: accepts samples, runs passes, fills the output queue.
pub struct OverlapWriter<S, T, Q = SlotRing<Work>> {
    geometry: Geometry,
    transform: T,
    input: Q,
    output: Arc<Q>,
    filling: Option<SlotHandle>,
    fill_pos: usize,
    inputs: HandleRing,
    outputs: HandleRing,
    staging: Box<[Work]>,
    window: Box<[Work]>,
    plan: Vec<SubWindow>,
    fades: FadeTable,
    passes: u64,
    _marker: PhantomData<fn(S)>,
}

impl<S, T, Q> OverlapWriter<S, T, Q>
where
    S: Sample,
    T: Transform,
    Q: SlotQueue<Work>,
{
    fn new(geometry: Geometry, transform: T, input: Q, output: Arc<Q>) -> Self {
        let plan = plan(&geometry);
        let placements: Vec<Placement> = plan.iter().map(|sub| sub.placement).collect();
        let fades = FadeTable::build(&placements, geometry.hop_len(), geometry.effective_overlap);
        let window_len = plan.iter().map(|sub| sub.len).max().unwrap_or(0);

        Self {
            transform,
            input,
            output,
            filling: None,
            fill_pos: 0,
            inputs: HandleRing::new(geometry.held_inputs),
            outputs: HandleRing::new(geometry.held_outputs),
            staging: vec![0.0; geometry.held_inputs * geometry.block_size].into_boxed_slice(),
            window: vec![0.0; window_len].into_boxed_slice(),
            plan,
            fades,
            passes: 0,
            geometry,
            _marker: PhantomData,
        }
    }

    /// Appends samples and runs every pass they make possible.
    ///
    /// Returns the number of samples accepted. When the input queue has no
    /// free slot the rest of `data` is dropped; the caller may resubmit it.
    pub fn put(&mut self, data: &[S]) -> Result<usize> {
        // The reader may have drained output since the last call.
        self.pump()?;

        let block = self.geometry.block_size;
        let mut accepted = 0;
        while accepted < data.len() {
            let handle = match self.filling {
                Some(handle) => handle,
                None => match self.input.reserve_write() {
                    Some(handle) => {
                        self.filling = Some(handle);
                        handle
                    }
                    None => {
                        warn!(
                            block_size = block,
                            input_slots = self.input.capacity(),
                            filled = self.input.filled(),
                            dropped = data.len() - accepted,
                            "filter buffer overflow, discarding input"
                        );
                        return Ok(accepted);
                    }
                },
            };

            let n = (data.len() - accepted).min(block - self.fill_pos);
            let pos = self.fill_pos;
            let src = &data[accepted..accepted + n];
            self.input.with_slot(&handle, |slot| {
                for (dst, &sample) in slot[pos..pos + n].iter_mut().zip(src) {
                    *dst = sample.to_work();
                }
            });
            self.fill_pos += n;
            accepted += n;

            if self.fill_pos == block {
                self.input.commit_write(handle)?;
                self.filling = None;
                self.fill_pos = 0;
                self.pump()?;
            }
        }
        Ok(accepted)
    }

    /// Runs passes for as long as enough input and output blocks can be held.
    ///
    /// `put` does this on its own; call it directly to finish passes that were
    /// waiting for the reader once no more input is coming.
    pub fn pump(&mut self) -> Result<()> {
        loop {
            while self.inputs.len() < self.geometry.held_inputs {
                match self.input.reserve_read() {
                    Some(handle) => self.inputs.push(handle),
                    None => return Ok(()),
                }
            }
            while self.outputs.len() < self.geometry.held_outputs {
                match self.output.reserve_write() {
                    Some(handle) => {
                        self.output.with_slot(&handle, |slot| slot.fill(0.0));
                        self.outputs.push(handle);
                    }
                    None => return Ok(()),
                }
            }

            self.run_pass()?;
            self.retire()?;
        }
    }

    fn run_pass(&mut self) -> Result<()> {
        let block = self.geometry.block_size;
        for index in 0..self.geometry.held_inputs {
            if let Some(handle) = self.inputs.get(index) {
                let dst = &mut self.staging[index * block..(index + 1) * block];
                self.input
                    .with_slot(&handle, |slot| dst.copy_from_slice(slot));
            }
        }

        if self.geometry.record_len.is_some() {
            let window = &mut self.window[..self.staging.len()];
            window.copy_from_slice(&self.staging);
            self.transform.transform(window);

            match self.output.reserve_write() {
                Some(handle) => {
                    let transform = &mut self.transform;
                    let window = &self.window[..];
                    self.output
                        .with_slot(&handle, |record| transform.emit(window, record));
                    self.output.commit_write(handle)?;
                }
                None => warn!(
                    pass = self.passes,
                    output_slots = self.output.capacity(),
                    "record queue full, dropping record"
                ),
            }
        } else {
            for (index, sub) in self.plan.iter().enumerate() {
                let window = &mut self.window[..sub.len];
                window.copy_from_slice(&self.staging[sub.in_offset..sub.in_offset + sub.len]);
                self.transform.transform(window);

                overlap_add(
                    &*self.output,
                    &self.outputs,
                    block,
                    sub.placement.out_offset,
                    &window[sub.emit_from..sub.emit_from + sub.placement.len],
                    self.fades.weights(index),
                );
            }
        }

        trace!(pass = self.passes, "window processed");
        self.passes += 1;
        Ok(())
    }

    /// Releases the oldest `skip` inputs and commits the oldest `skip` outputs.
    fn retire(&mut self) -> Result<()> {
        for _ in 0..self.geometry.skip {
            if let Some(handle) = self.inputs.pop() {
                self.input.release_read(handle)?;
            }
            if let Some(handle) = self.outputs.pop() {
                self.output.commit_write(handle)?;
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of transform passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

/// `out = out + weight * result`, spread over the held output blocks.
fn overlap_add<Q: SlotQueue<Work>>(
    queue: &Q,
    held: &HandleRing,
    block: usize,
    out_offset: usize,
    emitted: &[Work],
    weights: &[Work],
) {
    let mut done = 0;
    while done < emitted.len() {
        let at = out_offset + done;
        let (index, pos) = (at / block, at % block);
        let n = (block - pos).min(emitted.len() - done);
        if let Some(handle) = held.get(index) {
            let src = &emitted[done..done + n];
            let weights = &weights[done..done + n];
            queue.with_slot(&handle, |slot| {
                for ((dst, x), w) in slot[pos..pos + n].iter_mut().zip(src).zip(weights) {
                    *dst += x * w;
                }
            });
        }
        done += n;
    }
}

impl<S, T, Q> std::fmt::Debug for OverlapWriter<S, T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapWriter")
            .field("geometry", &self.geometry)
            .field("fill_pos", &self.fill_pos)
            .field("held_inputs", &self.inputs.len())
            .field("held_outputs", &self.outputs.len())
            .field("passes", &self.passes)
            .finish()
    }
}

/// Overlap-add engine: one writer and one reader sharing the output queue.
pub struct OverlapEngine<S, T, Q = SlotRing<Work>> {
    writer: OverlapWriter<S, T, Q>,
    reader: StreamReader<S, Work, Q>,
}

impl<S, T> OverlapEngine<S, T>
where
    S: Sample,
    T: Transform,
    Work: AsPrimitive<S>,
{
    /// Builds an engine with ring-buffer queues sized from `config`.
    pub fn new(config: &EngineConfig, transform: T) -> Result<Self> {
        let geometry = config.validate()?;
        let input = SlotRing::new(config.input_slots, geometry.block_size)?;
        let output = SlotRing::new(config.output_slots, geometry.output_slot_len())?;
        Self::with_queues(geometry, transform, input, output)
    }
}

impl<S, T, Q> OverlapEngine<S, T, Q>
where
    S: Sample,
    T: Transform,
    Q: SlotQueue<Work>,
    Work: AsPrimitive<S>,
{
    /// Builds an engine on caller-provided queues.
    pub fn with_queues(geometry: Geometry, transform: T, input: Q, output: Q) -> Result<Self> {
        if input.slot_len() != geometry.block_size {
            return Err(OverlapError::config(format!(
                "input slots hold {} samples, blocks are {}",
                input.slot_len(),
                geometry.block_size
            )));
        }
        if output.slot_len() != geometry.output_slot_len() {
            return Err(OverlapError::config(format!(
                "output slots hold {} samples, expected {}",
                output.slot_len(),
                geometry.output_slot_len()
            )));
        }
        if input.capacity() < geometry.held_inputs || output.capacity() < geometry.held_outputs {
            return Err(OverlapError::config("queues too shallow for one window"));
        }

        if geometry.effective_overlap != geometry.requested_overlap {
            info!(
                requested = geometry.requested_overlap,
                effective = geometry.effective_overlap,
                "overlap count adjusted to fit the period"
            );
        }
        debug!(
            block_size = geometry.block_size,
            held_inputs = geometry.held_inputs,
            held_outputs = geometry.held_outputs,
            skip = geometry.skip,
            window_len = geometry.window_len,
            input_slots = input.capacity(),
            output_slots = output.capacity(),
            "creating overlap engine"
        );

        let output = Arc::new(output);
        let records = geometry.record_len.is_some();
        Ok(Self {
            writer: OverlapWriter::new(geometry, transform, input, Arc::clone(&output)),
            reader: StreamReader::new(output, records),
        })
    }

    pub fn put(&mut self, data: &[S]) -> Result<usize> {
        self.writer.put(data)
    }

    /// Streaming mode: copies up to `out.len()` finished samples.
    pub fn get(&mut self, out: &mut [S]) -> Result<usize> {
        self.reader.get(out)
    }

    /// Record mode: copies one complete record, or returns `false`.
    pub fn get_record(&mut self, out: &mut [S]) -> Result<bool> {
        self.reader.get_record(out)
    }

    /// Pushes `buf` through the engine and overwrites it with the output that
    /// is ready. Early calls come back short while the first window fills.
    pub fn process(&mut self, buf: &mut [S]) -> Result<usize> {
        self.put(buf)?;
        let got = self.get(buf)?;
        if got < buf.len() {
            debug!(wanted = buf.len(), got, "buffer underflow");
        }
        Ok(got)
    }

    /// Two-buffer variant of [`process`](Self::process): `input` and `output`
    /// may differ in length.
    pub fn process_into(&mut self, input: &[S], output: &mut [S]) -> Result<usize> {
        self.put(input)?;
        let got = self.get(output)?;
        if got < output.len() {
            debug!(wanted = output.len(), got, "buffer underflow");
        }
        Ok(got)
    }

    /// Streaming mode: fills `out` completely, or reads nothing and returns
    /// `false`.
    pub fn get_exact(&mut self, out: &mut [S]) -> Result<bool> {
        self.reader.get_exact(out)
    }

    /// Finished samples (or records) waiting to be read.
    pub fn available(&self) -> usize {
        self.reader.available()
    }

    pub fn geometry(&self) -> &Geometry {
        self.writer.geometry()
    }

    pub fn passes(&self) -> u64 {
        self.writer.passes()
    }

    /// Separates the producer and consumer halves so `put` and `get` can run
    /// on different threads.
    pub fn split(self) -> (OverlapWriter<S, T, Q>, StreamReader<S, Work, Q>) {
        (self.writer, self.reader)
    }
}

impl<S, T, Q> std::fmt::Debug for OverlapEngine<S, T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapEngine")
            .field("writer", &self.writer)
            .field("reader", &self.reader)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Identity;

    fn drain<S, T>(engine: &mut OverlapEngine<S, T>, out: &mut Vec<S>)
    where
        S: Sample,
        T: Transform,
        Work: AsPrimitive<S>,
    {
        let mut buf = vec![S::default(); 97];
        loop {
            let n = engine.get(&mut buf).unwrap();
            assert!(n <= buf.len());
            out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
    }

    /// Feeds `input` in `chunk`-sized pieces, draining output after each one.
    fn run<S, T>(engine: &mut OverlapEngine<S, T>, input: &[S], chunk: usize) -> Vec<S>
    where
        S: Sample,
        T: Transform,
        Work: AsPrimitive<S>,
    {
        let mut out = Vec::new();
        for piece in input.chunks(chunk) {
            assert_eq!(engine.put(piece).unwrap(), piece.len());
            drain(engine, &mut out);
        }
        out
    }

    fn assert_constant_tail(out: &[Work], from: usize, label: &str) {
        assert!(out.len() > from + 64, "{label}: only {} samples", out.len());
        for (t, v) in out.iter().enumerate().skip(from) {
            assert!((v - 1.0).abs() < 1e-9, "{label}: sample {t} = {v}");
        }
    }

    #[test]
    fn identity_reconstructs_constant_signal() {
        // (block, period, overlap)
        for (block, period, overlap) in [(16, 4, 2), (16, 4, 4), (8, 3, 3), (8, 5, 2), (12, 6, 3)] {
            let config = EngineConfig::period(block, period + 2, period + 2, overlap, period);
            let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
            let g = *engine.geometry();
            let out = run(&mut engine, &vec![1.0; block * 40], 13);
            let label = format!("block={block} period={period} overlap={overlap}");
            assert_constant_tail(&out, g.emit_len - g.hop_len(), &label);
        }
    }

    #[test]
    fn leading_half_window_is_attenuated() {
        let config = EngineConfig::period(16, 6, 6, 2, 4);
        let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
        let out = run(&mut engine, &vec![1.0; 16 * 12], 16);
        assert_eq!(out[0], 0.0);
        assert!((out[16] - 0.5).abs() < 1e-12);
        assert!((out[32] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn impulse_survives_two_way_overlap() {
        let config = EngineConfig::period(256, 6, 6, 2, 4);
        let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
        assert_eq!(engine.geometry().skip, 2);

        let mut input = vec![0.0; 4096];
        input[1024] = 1.0;
        let out = run(&mut engine, &input, 300);
        assert!(out.len() > 2048);
        for (t, v) in out.iter().enumerate() {
            if t == 1024 {
                assert!((v - 1.0).abs() <= 1e-9, "impulse came back as {v}");
            } else {
                assert!(v.abs() <= 1e-12, "sample {t} = {v}");
            }
        }
    }

    #[test]
    fn no_overlap_is_exact_passthrough() {
        let config = EngineConfig::period(32, 4, 4, 1, 3);
        let mut engine = OverlapEngine::<i16, _>::new(&config, Identity).unwrap();
        assert_eq!(engine.geometry().skip, 3);

        let input: Vec<i16> = (0..32 * 30).map(|i| (i % 2000 - 1000) as i16).collect();
        let out = run(&mut engine, &input, 45);
        assert_eq!(out.len(), 32 * 30);
        assert_eq!(out, input);
    }

    #[test]
    fn output_stays_a_prefix_of_the_input() {
        let config = EngineConfig::period(10, 3, 3, 1, 2);
        let mut engine = OverlapEngine::<i32, _>::new(&config, Identity).unwrap();
        let input: Vec<i32> = (0..500).collect();
        let mut accepted = Vec::new();
        let mut out = Vec::new();
        let mut buf = [0i32; 7];
        // The reader falls behind, so some input is dropped along the way.
        for piece in input.chunks(9) {
            let n = engine.put(piece).unwrap();
            accepted.extend_from_slice(&piece[..n]);
            let n = engine.get(&mut buf).unwrap();
            assert!(n <= buf.len());
            out.extend_from_slice(&buf[..n]);
            assert_eq!(out[..], accepted[..out.len()]);
        }
        assert!(!out.is_empty());
    }

    #[test]
    fn paired_layout_passes_through_without_overlap() {
        let config = EngineConfig::paired(16, 4, 4, 1);
        let mut engine = OverlapEngine::<i16, _>::new(&config, Identity).unwrap();
        let input: Vec<i16> = (0..16 * 20).map(|i| i as i16).collect();
        let out = run(&mut engine, &input, 5);
        assert_eq!(out.len(), 16 * 19);
        assert_eq!(out[..], input[..out.len()]);
    }

    #[test]
    fn paired_layout_reconstructs_after_first_block() {
        for overlap in [2, 3, 4] {
            let config = EngineConfig::paired(24, 4, 4, overlap);
            let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
            assert_eq!(engine.geometry().sub_windows, overlap);
            let out = run(&mut engine, &vec![1.0; 24 * 20], 11);
            assert_constant_tail(&out, 24, &format!("paired overlap={overlap}"));
        }
    }

    #[test]
    fn paired_layout_runs_one_transform_per_sub_window() {
        let config = EngineConfig::paired(8, 4, 4, 4);
        let gain = |w: &mut [Work]| w.iter_mut().for_each(|v| *v *= 2.0);
        let mut engine = OverlapEngine::<f64, _>::new(&config, gain).unwrap();
        let out = run(&mut engine, &vec![0.5; 8 * 12], 8);
        // Twelve blocks make eleven passes of four sub-windows each.
        assert_eq!(engine.passes(), 11);
        assert_constant_tail(&out, 8, "doubled");
    }

    #[test]
    fn padding_is_seen_but_never_written_back() {
        let block = 8;
        let config = EngineConfig::period(block, 8, 4, 1, 2).with_padding(1, 1);
        let transform = move |w: &mut [Work]| {
            assert_eq!(w.len(), 4 * block);
            // Context blocks are contiguous with the emitted region.
            assert!(w.windows(2).all(|p| p[1] - p[0] == 1.0));
            w[..block].fill(1.0e6);
            w[3 * block..].fill(1.0e6);
        };
        let mut engine = OverlapEngine::<f64, _>::new(&config, transform).unwrap();
        let input: Vec<f64> = (0..block * 20).map(|t| t as f64).collect();
        let out = run(&mut engine, &input, 5);

        assert!(!out.is_empty());
        for (t, v) in out.iter().enumerate() {
            // Output block 0 lines up with input block 1 (after the lookbehind).
            assert_eq!(*v, input[t + block]);
        }
    }

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| (t as f64 * 0.37).sin() + ((t * 7919) % 101) as f64 / 101.0)
            .collect()
    }

    #[test]
    fn padded_overlapping_windows_reconstruct_the_shifted_input() {
        let configs = [
            EngineConfig::period(16, 10, 6, 2, 4).with_padding(1, 2),
            EngineConfig::period(8, 8, 6, 4, 4).with_padding(2, 0),
            EngineConfig::period(12, 8, 7, 3, 5).with_padding(0, 1),
            EngineConfig::period(8, 10, 9, 2, 7).with_padding(1, 1),
            EngineConfig::paired(10, 4, 4, 3),
        ];
        for config in configs {
            let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
            let g = *engine.geometry();
            assert!(g.effective_overlap >= 2);
            let input = test_signal(g.block_size * 40);
            let out = run(&mut engine, &input, 7);

            let shift = g.lookbehind * g.block_size;
            let from = if g.is_paired() {
                g.block_size
            } else {
                g.emit_len - g.hop_len()
            };
            assert!(out.len() > from + g.emit_len, "{config:?}");
            for t in from..out.len() {
                assert!(
                    (out[t] - input[t + shift]).abs() < 1e-9,
                    "{config:?}: sample {t} = {} expected {}",
                    out[t],
                    input[t + shift]
                );
            }
        }
    }

    #[test]
    fn process_into_and_exact_reads() {
        let config = EngineConfig::period(4, 4, 4, 1, 1);
        let mut engine = OverlapEngine::<i16, _>::new(&config, Identity).unwrap();

        let mut output = [0i16; 6];
        assert_eq!(engine.process_into(&[1, 2, 3, 4, 5], &mut output).unwrap(), 4);
        assert_eq!(&output[..4], &[1, 2, 3, 4]);

        assert_eq!(engine.put(&[6, 7, 8]).unwrap(), 3);
        let mut exact = [0i16; 5];
        assert!(!engine.get_exact(&mut exact).unwrap());
        assert_eq!(engine.available(), 4);
        let mut exact = [0i16; 3];
        assert!(engine.get_exact(&mut exact).unwrap());
        assert_eq!(exact, [5, 6, 7]);
        assert_eq!(engine.process_into(&[], &mut exact).unwrap(), 1);
        assert_eq!(exact[0], 8);
    }

    #[test]
    fn overflow_drops_input_and_keeps_running() {
        let config = EngineConfig::period(8, 4, 4, 1, 2);
        let mut engine = OverlapEngine::<i32, _>::new(&config, Identity).unwrap();

        let first: Vec<i32> = (0..1000).collect();
        let accepted = engine.put(&first).unwrap();
        assert!(accepted < first.len());
        assert!(accepted > 0);

        let mut out = Vec::new();
        drain(&mut engine, &mut out);
        assert!(!out.is_empty());

        let second: Vec<i32> = (5000..5100).collect();
        let accepted_second = engine.put(&second).unwrap();
        assert!(accepted_second > 0);
        drain(&mut engine, &mut out);

        // No more input: finish the passes that waited on output space.
        engine.put(&[]).unwrap();
        drain(&mut engine, &mut out);

        let mut stream = first[..accepted].to_vec();
        stream.extend_from_slice(&second[..accepted_second]);
        assert_eq!(out, stream);
    }

    #[test]
    fn record_mode_emits_one_record_per_pass() {
        let config = EngineConfig::period(8, 4, 16, 2, 2).with_records(3);
        let mut engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
        assert_eq!(engine.geometry().skip, 1);

        let input: Vec<f64> = (0..8 * 6).map(|t| t as f64).collect();
        assert_eq!(engine.put(&input).unwrap(), input.len());
        assert_eq!(engine.available(), 5);

        let mut record = [0.0; 3];
        for pass in 0..5 {
            assert!(engine.get_record(&mut record).unwrap());
            let start = (pass * 8) as f64;
            assert_eq!(record, [start, start + 1.0, start + 2.0]);
        }
        assert!(!engine.get_record(&mut record).unwrap());
        assert!(engine.get(&mut [0.0; 4]).is_err());
    }

    #[test]
    fn full_record_queue_drops_records() {
        let config = EngineConfig::period(4, 2, 1, 1, 1).with_records(4);
        let mut engine = OverlapEngine::<i16, _>::new(&config, Identity).unwrap();
        let input: Vec<i16> = (0..16).collect();
        assert_eq!(engine.put(&input).unwrap(), 16);
        assert_eq!(engine.passes(), 4);
        assert_eq!(engine.available(), 1);

        let mut record = [0i16; 4];
        assert!(engine.get_record(&mut record).unwrap());
        assert_eq!(record, [0, 1, 2, 3]);
        assert!(!engine.get_record(&mut record).unwrap());

        assert_eq!(engine.put(&[20, 21, 22, 23]).unwrap(), 4);
        assert!(engine.get_record(&mut record).unwrap());
        assert_eq!(record, [20, 21, 22, 23]);
    }

    #[test]
    fn split_engine_streams_across_threads() {
        let config = EngineConfig::period(32, 8, 8, 2, 4);
        let engine = OverlapEngine::<f32, _>::new(&config, Identity).unwrap();
        let hop = engine.geometry().hop_len();
        let emit = engine.geometry().emit_len;
        let (mut writer, mut reader) = engine.split();
        let total = 32 * 200;

        let producer = std::thread::spawn(move || {
            let input = vec![0.25f32; total];
            let mut sent = 0;
            while sent < total {
                let end = (sent + 50).min(total);
                sent += writer.put(&input[sent..end]).unwrap();
                std::thread::yield_now();
            }
            // 200 blocks, four per window, hopping two.
            while writer.passes() < 99 {
                writer.pump().unwrap();
                std::thread::yield_now();
            }
            writer.passes()
        });

        let expected_out = total - 32 * 2;
        let mut received = Vec::with_capacity(expected_out);
        let mut buf = [0f32; 64];
        while received.len() < expected_out {
            let n = reader.get(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        assert_eq!(producer.join().unwrap(), 99);

        for v in &received[emit - hop..] {
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn split_engine_under_load_reconstructs_the_accepted_input() {
        let config = EngineConfig::period(8, 6, 6, 2, 4);
        let engine = OverlapEngine::<f64, _>::new(&config, Identity).unwrap();
        let g = *engine.geometry();
        let (mut writer, mut reader) = engine.split();
        let total = 256 * 64;

        // The writer never resubmits what the engine refused.
        let producer = std::thread::spawn(move || {
            let input = test_signal(total);
            let mut accepted = Vec::new();
            for piece in input.chunks(256) {
                let n = writer.put(piece).unwrap();
                accepted.extend_from_slice(&piece[..n]);
            }
            (writer, accepted)
        });

        let mut out = Vec::new();
        let mut buf = [0.0; 5];
        while !producer.is_finished() {
            let n = reader.get(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        let (mut writer, accepted) = producer.join().unwrap();
        assert!(accepted.len() < total);

        // Every complete window of the accepted stream gets its pass.
        let blocks = accepted.len() / g.block_size;
        let expected = if blocks < 4 { 0 } else { ((blocks - 4) / 2 + 1) * g.hop_len() };
        while out.len() < expected {
            writer.pump().unwrap();
            let n = reader.get(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out.len(), expected);

        for t in g.emit_len - g.hop_len()..out.len() {
            assert!((out[t] - accepted[t]).abs() < 1e-9, "sample {t}");
        }
    }

    #[test]
    fn custom_queues_must_match_the_geometry() {
        let g = EngineConfig::period(16, 4, 4, 2, 2).validate().unwrap();
        let bad_input = SlotRing::new(4, 8).unwrap();
        let output = SlotRing::new(4, 16).unwrap();
        let err = OverlapEngine::<f64, _>::with_queues(g, Identity, bad_input, output).unwrap_err();
        assert!(matches!(err, OverlapError::InvalidConfig(_)));
    }
}
