use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{OverlapError, Result};

/// Constructor parameters of an overlap engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Samples per input block.
    pub block_size: usize,
    /// Depth of the input slot queue.
    pub input_slots: usize,
    /// Depth of the output slot queue.
    pub output_slots: usize,
    /// Requested number of windows overlapping any output sample.
    pub overlap_count: usize,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub output: OutputMode,
}

/// How input blocks are grouped into windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    /// Two live blocks; `overlap_count` block-sized windows per block.
    Paired,
    /// `buffers_per_period` blocks per window, plus context blocks that the
    /// transform sees but that are never written back.
    Period {
        buffers_per_period: usize,
        #[serde(default)]
        lookbehind: usize,
        #[serde(default)]
        lookahead: usize,
    },
}

impl Default for Layout {
    fn default() -> Self {
        Self::Period {
            buffers_per_period: 4,
            lookbehind: 0,
            lookahead: 0,
        }
    }
}

/// How finished output is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputMode {
    /// Overlap-added sample stream, drained with partial reads.
    #[default]
    Streaming,
    /// One fixed-size record per pass, drained all-or-nothing.
    Records { record_len: usize },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            input_slots: 8,
            output_slots: 8,
            overlap_count: 2,
            layout: Layout::default(),
            output: OutputMode::default(),
        }
    }
}

impl EngineConfig {
    /// Generalized streaming engine with no context padding.
    pub fn period(
        block_size: usize,
        input_slots: usize,
        output_slots: usize,
        overlap_count: usize,
        buffers_per_period: usize,
    ) -> Self {
        Self {
            block_size,
            input_slots,
            output_slots,
            overlap_count,
            layout: Layout::Period {
                buffers_per_period,
                lookbehind: 0,
                lookahead: 0,
            },
            output: OutputMode::Streaming,
        }
    }

    /// Two-block engine running `overlap_count` sub-windows per block.
    pub fn paired(
        block_size: usize,
        input_slots: usize,
        output_slots: usize,
        overlap_count: usize,
    ) -> Self {
        Self {
            block_size,
            input_slots,
            output_slots,
            overlap_count,
            layout: Layout::Paired,
            output: OutputMode::Streaming,
        }
    }

    /// Adds lookbehind/lookahead context blocks. Ignored by the paired layout.
    pub fn with_padding(mut self, lookbehind: usize, lookahead: usize) -> Self {
        if let Layout::Period {
            lookbehind: ref mut behind,
            lookahead: ref mut ahead,
            ..
        } = self.layout
        {
            *behind = lookbehind;
            *ahead = lookahead;
        }
        self
    }

    /// Switches to fixed-record output.
    pub fn with_records(mut self, record_len: usize) -> Self {
        self.output = OutputMode::Records { record_len };
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks the parameters and derives the window geometry.
    pub fn validate(&self) -> Result<Geometry> {
        if self.block_size == 0 {
            return Err(OverlapError::config("block_size must be non-zero"));
        }
        if self.overlap_count == 0 {
            return Err(OverlapError::config("overlap_count must be at least 1"));
        }

        let geometry = match self.layout {
            Layout::Paired => {
                if let OutputMode::Records { .. } = self.output {
                    return Err(OverlapError::config(
                        "the paired layout only supports streaming output",
                    ));
                }
                // Sub-window offsets are block_size / k apart; more windows
                // than samples would stack on the same offset.
                let effective = self.overlap_count.min(self.block_size);
                Geometry {
                    layout: self.layout,
                    block_size: self.block_size,
                    held_inputs: 2,
                    held_outputs: 2,
                    skip: 1,
                    requested_overlap: self.overlap_count,
                    effective_overlap: effective,
                    lookbehind: 0,
                    lookahead: 0,
                    window_len: self.block_size,
                    emit_len: self.block_size,
                    sub_windows: effective,
                    record_len: None,
                }
            }
            Layout::Period {
                buffers_per_period,
                lookbehind,
                lookahead,
            } => {
                if buffers_per_period == 0 {
                    return Err(OverlapError::config(
                        "buffers_per_period must be at least 1",
                    ));
                }
                let skip = (buffers_per_period / self.overlap_count).max(1);
                let effective = buffers_per_period / skip;
                let held_inputs = buffers_per_period + lookbehind + lookahead;
                let record_len = match self.output {
                    OutputMode::Streaming => None,
                    OutputMode::Records { record_len: 0 } => {
                        return Err(OverlapError::config("record_len must be non-zero"));
                    }
                    OutputMode::Records { record_len } => Some(record_len),
                };
                Geometry {
                    layout: self.layout,
                    block_size: self.block_size,
                    held_inputs,
                    held_outputs: if record_len.is_some() {
                        0
                    } else {
                        buffers_per_period
                    },
                    skip,
                    requested_overlap: self.overlap_count,
                    effective_overlap: effective,
                    lookbehind,
                    lookahead,
                    window_len: held_inputs * self.block_size,
                    emit_len: buffers_per_period * self.block_size,
                    sub_windows: 1,
                    record_len,
                }
            }
        };

        if self.input_slots < geometry.held_inputs {
            return Err(OverlapError::config(format!(
                "input_slots = {} cannot hold a window of {} blocks",
                self.input_slots, geometry.held_inputs
            )));
        }
        let min_output = geometry.held_outputs.max(1);
        if self.output_slots < min_output {
            return Err(OverlapError::config(format!(
                "output_slots = {} cannot hold {} output blocks",
                self.output_slots, min_output
            )));
        }

        Ok(geometry)
    }
}

/// Window geometry derived from an [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub layout: Layout,
    pub block_size: usize,
    /// Input blocks held per pass, context included.
    pub held_inputs: usize,
    /// Output blocks held per pass (zero in record mode).
    pub held_outputs: usize,
    /// Blocks retired after each pass.
    pub skip: usize,
    pub requested_overlap: usize,
    /// Overlap actually achieved by `skip`; drives all fade math.
    pub effective_overlap: usize,
    pub lookbehind: usize,
    pub lookahead: usize,
    /// Length of the buffer handed to the transform.
    pub window_len: usize,
    /// Samples of each window written back to the output.
    pub emit_len: usize,
    /// Transform calls per pass.
    pub sub_windows: usize,
    pub record_len: Option<usize>,
}

impl Geometry {
    /// Output slot length.
    pub fn output_slot_len(&self) -> usize {
        self.record_len.unwrap_or(self.block_size)
    }

    /// Output samples between consecutive passes.
    pub fn hop_len(&self) -> usize {
        self.skip * self.block_size
    }

    /// Windows are one block long and slide within the held pair.
    pub fn is_paired(&self) -> bool {
        matches!(self.layout, Layout::Paired)
    }
}
