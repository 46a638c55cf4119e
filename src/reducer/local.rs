//! Local chunk reducer (C3): read → decompress → unfilter → interpret →
//! mask → slice → (optionally) reduce, all for a single chunk.
//!
//! Grounded on the teacher's `FSStore::get` (positional read into an owned
//! buffer) for the read step; the CPU-bound decode/mask/reduce work runs
//! inside `tokio::task::spawn_blocking`, the same idiom `db/mod.rs` uses to
//! keep its blocking backend calls off the async reactor (§5 "CPU-bound C3
//! work runs via `tokio::task::spawn_blocking`").

use crate::buffer::{Op, TypedBuffer};
use crate::dtype::Dtype;
use crate::error::{Error, Result};
use crate::filters::{self, Compressor, Filter};
use crate::indexer::AxisRange;
use crate::missing::MissingSpec;
use crate::order::Order;
use crate::source::{ChunkDescriptor, Source};

use super::ChunkOutcome;

/// Everything C3 needs to turn one chunk's bytes into an outcome (§4.3).
///
/// Owns its fields rather than borrowing them: a request is moved wholesale
/// into `tokio::task::spawn_blocking`, which requires `'static` data, so
/// each per-chunk task gets its own small clone of the variable-level
/// filter pipeline and missing spec rather than sharing references across
/// the blocking-pool boundary.
pub struct LocalChunkRequest {
    pub descriptor: ChunkDescriptor,
    pub compressor: Option<Compressor>,
    pub filters: Vec<Filter>,
    pub missing: MissingSpec,
    pub dtype: Dtype,
    pub endianness: crate::dtype::ResolvedEndianness,
    pub chunk_shape: Vec<u64>,
    pub order: Order,
    pub chunk_selection: Vec<AxisRange>,
    pub op: Option<Op>,
}

/// Execute the C3 contract against an already-read byte buffer (the read
/// itself is async and happens in the caller; this function is the
/// CPU-bound remainder, intended to run inside `spawn_blocking`).
pub fn reduce_chunk_bytes(req: &LocalChunkRequest, raw: &[u8]) -> Result<ChunkOutcome> {
    if req.order != Order::RowMajor {
        return Err(Error::UnsupportedFeature(
            "only row-major (\"C\") storage order is supported in v1".into(),
        ));
    }

    let decompressed = filters::decompress(req.compressor, raw)?;
    let unfiltered = filters::unfilter(&req.filters, &decompressed)?;
    let buffer = TypedBuffer::from_bytes(req.dtype, req.endianness, &unfiltered)?;

    let expected_elements: u64 = req.chunk_shape.iter().product();
    if buffer.len() as u64 != expected_elements {
        return Err(Error::DecodeFailure(format!(
            "decoded {} elements but chunk shape {:?} expects {expected_elements}",
            buffer.len(),
            req.chunk_shape
        )));
    }

    match req.op {
        None => {
            let sliced = buffer.gather(&req.chunk_shape, &req.chunk_selection);
            Ok(ChunkOutcome::Select(sliced))
        }
        Some(op) => {
            let indices = crate::buffer::flat_indices(&req.chunk_shape, &req.chunk_selection);
            let (partial, count) = buffer.reduce_masked(&indices, op, &req.missing);
            Ok(ChunkOutcome::Reduce(partial, count))
        }
    }
}

/// Read the chunk's bytes from `source` and reduce it, off the async
/// reactor (§5).
pub async fn reduce_chunk(source: &dyn Source, req: LocalChunkRequest) -> Result<ChunkOutcome> {
    let raw = source.read(req.descriptor.offset, req.descriptor.size).await?;

    tokio::task::spawn_blocking(move || reduce_chunk_bytes(&req, &raw))
        .await
        .map_err(|e| Error::TransportFailure(format!("blocking reduce task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ResolvedEndianness;
    use crate::missing::RawMissingAttrs;

    fn no_missing() -> MissingSpec {
        MissingSpec::normalize(RawMissingAttrs::default()).unwrap()
    }

    #[test]
    fn select_slices_uncompressed_chunk() {
        let data: Vec<f64> = (0..8).map(|x| x as f64).collect();
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();

        let missing = no_missing();
        let req = LocalChunkRequest {
            descriptor: ChunkDescriptor {
                offset: 0,
                size: bytes.len() as u64,
                filter_mask: 0,
            },
            compressor: None,
            filters: vec![],
            missing: missing.clone(),
            dtype: Dtype::F64,
            endianness: ResolvedEndianness::Little,
            chunk_shape: vec![2, 4],
            order: Order::RowMajor,
            chunk_selection: vec![
                AxisRange { start: 0, stop: 1, step: 1 },
                AxisRange { start: 0, stop: 4, step: 1 },
            ],
            op: None,
        };

        let outcome = reduce_chunk_bytes(&req, &bytes).unwrap();
        match outcome {
            ChunkOutcome::Select(buf) => {
                assert_eq!(buf, TypedBuffer::F64(vec![0.0, 1.0, 2.0, 3.0]));
            }
            _ => panic!("expected Select"),
        }
    }

    #[test]
    fn sum_reduction_masks_fill_value() {
        let data: Vec<f64> = vec![1.0, -999.0, 3.0, 4.0];
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let missing = MissingSpec::normalize(RawMissingAttrs {
            fill: Some(-999.0),
            ..Default::default()
        })
        .unwrap();

        let req = LocalChunkRequest {
            descriptor: ChunkDescriptor {
                offset: 0,
                size: bytes.len() as u64,
                filter_mask: 0,
            },
            compressor: None,
            filters: vec![],
            missing: missing.clone(),
            dtype: Dtype::F64,
            endianness: ResolvedEndianness::Little,
            chunk_shape: vec![4],
            order: Order::RowMajor,
            chunk_selection: vec![AxisRange { start: 0, stop: 4, step: 1 }],
            op: Some(Op::Sum),
        };

        let outcome = reduce_chunk_bytes(&req, &bytes).unwrap();
        match outcome {
            ChunkOutcome::Reduce(partial, count) => {
                assert_eq!(count, 3);
                assert_eq!(partial.as_f64(), 8.0);
            }
            _ => panic!("expected Reduce"),
        }
    }

    #[test]
    fn rejects_mismatched_chunk_shape() {
        let bytes = vec![0u8; 8]; // 1 f64 element
        let missing = no_missing();
        let req = LocalChunkRequest {
            descriptor: ChunkDescriptor {
                offset: 0,
                size: 8,
                filter_mask: 0,
            },
            compressor: None,
            filters: vec![],
            missing: missing.clone(),
            dtype: Dtype::F64,
            endianness: ResolvedEndianness::Little,
            chunk_shape: vec![5],
            order: Order::RowMajor,
            chunk_selection: vec![AxisRange { start: 0, stop: 1, step: 1 }],
            op: None,
        };
        assert!(matches!(
            reduce_chunk_bytes(&req, &bytes).unwrap_err(),
            Error::DecodeFailure(_)
        ));
    }
}
