//! Streaming fixed-block overlap-add processing.
//!
//! Callers push samples in arbitrary chunk sizes and pull processed samples
//! (or fixed-size records) back out. In between, the stream is regrouped into
//! fixed blocks, assembled into overlapping windows, handed to a
//! [`Transform`], and blended back together with a triangular fade so that an
//! identity transform reconstructs the input.
//!
//! - [`BlockAccumulator`] only regroups, with no overlap.
//! - [`OverlapEngine`] runs either the two-block [`Layout::Paired`] scheme or
//!   the multi-block [`Layout::Period`] scheme, streaming or record output.

pub mod accumulator;
pub mod config;
pub mod engine;
pub mod error;
pub mod fade;
pub mod queue;
pub mod sample;
pub mod spectral;
pub mod stream;
pub mod transform;

pub use accumulator::{BlockAccumulator, BlockWriter};
pub use config::{EngineConfig, Geometry, Layout, OutputMode};
pub use engine::{OverlapEngine, OverlapWriter};
pub use error::{OverlapError, Result};
pub use fade::{fade, FadeTable, Placement};
pub use queue::{SlotHandle, SlotQueue, SlotRing};
pub use sample::{Sample, Work};
pub use spectral::{MagnitudeSpectrum, SpectralFilter};
pub use stream::StreamReader;
pub use transform::{Identity, Transform};
