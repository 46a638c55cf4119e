//! Chunked I/O and reduction engine for HDF5/NetCDF4 variables, with
//! optional active-storage offload.
//!
//! A caller opens a variable ([`handle::open`]), optionally sets a
//! reduction method, and slices it ([`handle::Handle::get`]). The engine
//! computes which chunks intersect the selection, reads and reduces each
//! one — locally or via a remote active-storage server — and combines the
//! partial results into a final array or scalar.
//!
//! This crate is read-only: it never writes or modifies stored data, and
//! carries no persistence layer of its own.

pub mod buffer;
pub mod config;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod filters;
pub mod handle;
pub mod indexer;
pub mod missing;
pub mod order;
pub mod reducer;
pub mod selection;
pub mod source;

pub use error::{Error, Result};
pub use handle::{open, GetResult, Handle, OpenOptions, Version};
pub use reducer::Method;
pub use selection::{AxisSelector, Selection};
pub use source::{ChunkDescriptor, ChunkIndex, VariableMetadata};
