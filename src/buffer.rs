//! The minimum numeric array machinery the reducer needs: decoding raw
//! chunk bytes into typed elements, gathering a strided sub-selection, and
//! reducing with the missing-value predicate fused into a single pass
//! (§9 "Numeric masking").
//!
//! This is deliberately not a general N-dimensional array library (§1
//! Non-goals) — just enough to carry chunk bytes through decode → mask →
//! reduce.

use crate::dtype::{Dtype, ResolvedEndianness};
use crate::error::{Error, Result};
use crate::indexer::AxisRange;
use crate::missing::MissingSpec;

/// A decoded, in-memory chunk buffer, one variant per [`Dtype`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypedBuffer {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! decode_ints {
    ($bytes:expr, $endian:expr, $ty:ty) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        if $bytes.len() % WIDTH != 0 {
            return Err(Error::DecodeFailure(format!(
                "buffer length {} is not a multiple of element width {WIDTH}",
                $bytes.len()
            )));
        }
        $bytes
            .chunks_exact(WIDTH)
            .map(|c| {
                let arr: [u8; WIDTH] = c.try_into().unwrap();
                match $endian {
                    ResolvedEndianness::Little => <$ty>::from_le_bytes(arr),
                    ResolvedEndianness::Big => <$ty>::from_be_bytes(arr),
                }
            })
            .collect()
    }};
}

impl TypedBuffer {
    /// Interpret `bytes` as an array of `dtype` elements in `endianness`
    /// order (§4.3 step 3, element interpretation; shape/order handling
    /// lives in the caller via [`gather`](Self::gather)).
    pub fn from_bytes(
        dtype: Dtype,
        endianness: ResolvedEndianness,
        bytes: &[u8],
    ) -> Result<Self> {
        Ok(match dtype {
            Dtype::I8 => TypedBuffer::I8(bytes.iter().map(|&b| b as i8).collect()),
            Dtype::U8 => TypedBuffer::U8(bytes.to_vec()),
            Dtype::I16 => TypedBuffer::I16(decode_ints!(bytes, endianness, i16)),
            Dtype::U16 => TypedBuffer::U16(decode_ints!(bytes, endianness, u16)),
            Dtype::I32 => TypedBuffer::I32(decode_ints!(bytes, endianness, i32)),
            Dtype::U32 => TypedBuffer::U32(decode_ints!(bytes, endianness, u32)),
            Dtype::I64 => TypedBuffer::I64(decode_ints!(bytes, endianness, i64)),
            Dtype::U64 => TypedBuffer::U64(decode_ints!(bytes, endianness, u64)),
            Dtype::F32 => TypedBuffer::F32(decode_ints!(bytes, endianness, f32)),
            Dtype::F64 => TypedBuffer::F64(decode_ints!(bytes, endianness, f64)),
        })
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            TypedBuffer::I8(_) => Dtype::I8,
            TypedBuffer::U8(_) => Dtype::U8,
            TypedBuffer::I16(_) => Dtype::I16,
            TypedBuffer::U16(_) => Dtype::U16,
            TypedBuffer::I32(_) => Dtype::I32,
            TypedBuffer::U32(_) => Dtype::U32,
            TypedBuffer::I64(_) => Dtype::I64,
            TypedBuffer::U64(_) => Dtype::U64,
            TypedBuffer::F32(_) => Dtype::F32,
            TypedBuffer::F64(_) => Dtype::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedBuffer::I8(v) => v.len(),
            TypedBuffer::U8(v) => v.len(),
            TypedBuffer::I16(v) => v.len(),
            TypedBuffer::U16(v) => v.len(),
            TypedBuffer::I32(v) => v.len(),
            TypedBuffer::U32(v) => v.len(),
            TypedBuffer::I64(v) => v.len(),
            TypedBuffer::U64(v) => v.len(),
            TypedBuffer::F32(v) => v.len(),
            TypedBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen the element at `idx` to `f64`, for masking-predicate purposes
    /// only (§4.5's comparisons run in `f64` regardless of on-disk dtype).
    #[inline]
    pub fn get_f64(&self, idx: usize) -> f64 {
        match self {
            TypedBuffer::I8(v) => v[idx] as f64,
            TypedBuffer::U8(v) => v[idx] as f64,
            TypedBuffer::I16(v) => v[idx] as f64,
            TypedBuffer::U16(v) => v[idx] as f64,
            TypedBuffer::I32(v) => v[idx] as f64,
            TypedBuffer::U32(v) => v[idx] as f64,
            TypedBuffer::I64(v) => v[idx] as f64,
            TypedBuffer::U64(v) => v[idx] as f64,
            TypedBuffer::F32(v) => v[idx] as f64,
            TypedBuffer::F64(v) => v[idx],
        }
    }

    /// This element's native byte representation (little-endian), used for
    /// writing into the pre-allocated select-mode output buffer. The output
    /// buffer's own byte convention is little-endian regardless of the
    /// source file's endianness — the decode step above already resolved
    /// byte order, so this is just this crate's one fixed in-memory layout.
    #[inline]
    pub fn element_le_bytes(&self, idx: usize) -> Vec<u8> {
        match self {
            TypedBuffer::I8(v) => vec![v[idx] as u8],
            TypedBuffer::U8(v) => vec![v[idx]],
            TypedBuffer::I16(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::U16(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::I32(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::U32(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::I64(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::U64(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::F32(v) => v[idx].to_le_bytes().to_vec(),
            TypedBuffer::F64(v) => v[idx].to_le_bytes().to_vec(),
        }
    }

    /// Gather the row-major flat indices denoted by `ranges` against
    /// `shape`, producing a new buffer holding just those elements in
    /// iteration order (used for the §4.3 step 5 `chunk_selection` slice).
    pub fn gather(&self, shape: &[u64], ranges: &[AxisRange]) -> Self {
        let indices = flat_indices(shape, ranges);
        match self {
            TypedBuffer::I8(v) => TypedBuffer::I8(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::U8(v) => TypedBuffer::U8(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::I16(v) => TypedBuffer::I16(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::U16(v) => TypedBuffer::U16(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::I32(v) => TypedBuffer::I32(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::U32(v) => TypedBuffer::U32(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::I64(v) => TypedBuffer::I64(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::U64(v) => TypedBuffer::U64(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::F32(v) => TypedBuffer::F32(indices.iter().map(|&i| v[i]).collect()),
            TypedBuffer::F64(v) => TypedBuffer::F64(indices.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// Enumerate the row-major flat indices into a `shape`-shaped array that
/// `ranges` (one `(start, stop, step)` per axis) selects.
pub fn flat_indices(shape: &[u64], ranges: &[AxisRange]) -> Vec<usize> {
    debug_assert_eq!(shape.len(), ranges.len());
    let mut strides = vec![1u64; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let axis_positions: Vec<Vec<u64>> = ranges
        .iter()
        .map(|r| (r.start..r.stop).step_by(r.step as usize).collect())
        .collect();

    if axis_positions.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut combo = vec![0usize; axis_positions.len()];
    loop {
        let flat: u64 = combo
            .iter()
            .enumerate()
            .map(|(axis, &pos_idx)| axis_positions[axis][pos_idx] * strides[axis])
            .sum();
        out.push(flat as usize);

        let mut axis = combo.len();
        loop {
            if axis == 0 {
                return out;
            }
            axis -= 1;
            combo[axis] += 1;
            if combo[axis] < axis_positions[axis].len() {
                break;
            }
            combo[axis] = 0;
            if axis == 0 {
                return out;
            }
        }
    }
}

/// A reduction scalar, widened only as far as needed to stay exact for the
/// dtype category it came from (§8 item 5 requires bit-identical integer
/// reductions between the local and remote paths).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartialValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl PartialValue {
    pub fn as_f64(self) -> f64 {
        match self {
            PartialValue::Int(v) => v as f64,
            PartialValue::UInt(v) => v as f64,
            PartialValue::Float(v) => v,
        }
    }

    /// Combine two same-domain partials with `op` (§4.6's re-apply of the
    /// operator across the list of per-chunk partials). Both partials come
    /// from the same variable and hence the same dtype category, so the
    /// variants always match; a mismatch indicates a caller bug rather than
    /// a data condition worth recovering from.
    pub fn combine(self, other: Self, op: Op) -> Self {
        match (self, other) {
            (PartialValue::Int(a), PartialValue::Int(b)) => PartialValue::Int(match op {
                Op::Min => a.min(b),
                Op::Max => a.max(b),
                Op::Sum => a.wrapping_add(b),
            }),
            (PartialValue::UInt(a), PartialValue::UInt(b)) => PartialValue::UInt(match op {
                Op::Min => a.min(b),
                Op::Max => a.max(b),
                Op::Sum => a.wrapping_add(b),
            }),
            (PartialValue::Float(a), PartialValue::Float(b)) => PartialValue::Float(match op {
                Op::Min => a.min(b),
                Op::Max => a.max(b),
                Op::Sum => a + b,
            }),
            (a, b) => panic!("combining partials from mismatched numeric domains: {a:?} / {b:?}"),
        }
    }
}

/// The reduction operator, as applied by the local reducer over unmasked
/// elements (§4.3 step 6). `Mean` is represented as `Sum` here; the division
/// happens once during combination (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Min,
    Max,
    Sum,
}

impl TypedBuffer {
    /// Apply the missing-value predicate and `op` in a single pass over
    /// `indices` into this buffer (§9: fused skip-if-equal/out-of-range,
    /// no materialized boolean mask). Returns `(partial, n_unmasked)`.
    ///
    /// When every element is masked, returns the identity for `op` with
    /// count 0 (§4.3 edge case) — `+inf`/`-inf` for float min/max, the
    /// dtype's saturating extreme for integer min/max (never read back
    /// since its count is 0), and zero for sum.
    pub fn reduce_masked(
        &self,
        indices: &[usize],
        op: Op,
        missing: &MissingSpec,
    ) -> (PartialValue, u64) {
        match self {
            TypedBuffer::F32(v) => reduce_float(v.iter().map(|&x| x as f64), indices, op, missing),
            TypedBuffer::F64(v) => reduce_float(v.iter().copied(), indices, op, missing),
            TypedBuffer::I8(v) => reduce_int(v.iter().map(|&x| x as i64), indices, op, missing),
            TypedBuffer::I16(v) => reduce_int(v.iter().map(|&x| x as i64), indices, op, missing),
            TypedBuffer::I32(v) => reduce_int(v.iter().map(|&x| x as i64), indices, op, missing),
            TypedBuffer::I64(v) => reduce_int(v.iter().copied(), indices, op, missing),
            TypedBuffer::U8(v) => reduce_uint(v.iter().map(|&x| x as u64), indices, op, missing),
            TypedBuffer::U16(v) => reduce_uint(v.iter().map(|&x| x as u64), indices, op, missing),
            TypedBuffer::U32(v) => reduce_uint(v.iter().map(|&x| x as u64), indices, op, missing),
            TypedBuffer::U64(v) => reduce_uint(v.iter().copied(), indices, op, missing),
        }
    }
}

fn reduce_float(
    values: impl Iterator<Item = f64>,
    indices: &[usize],
    op: Op,
    missing: &MissingSpec,
) -> (PartialValue, u64) {
    let collected: Vec<f64> = values.collect();
    let mut count = 0u64;
    let mut acc = match op {
        Op::Min => f64::INFINITY,
        Op::Max => f64::NEG_INFINITY,
        Op::Sum => 0.0,
    };
    for &idx in indices {
        let v = collected[idx];
        if missing.is_missing(v) {
            continue;
        }
        count += 1;
        acc = match op {
            Op::Min => acc.min(v),
            Op::Max => acc.max(v),
            Op::Sum => acc + v,
        };
    }
    (PartialValue::Float(acc), count)
}

fn reduce_int(
    values: impl Iterator<Item = i64>,
    indices: &[usize],
    op: Op,
    missing: &MissingSpec,
) -> (PartialValue, u64) {
    let collected: Vec<i64> = values.collect();
    let mut count = 0u64;
    let mut acc: i64 = match op {
        Op::Min => i64::MAX,
        Op::Max => i64::MIN,
        Op::Sum => 0,
    };
    for &idx in indices {
        let v = collected[idx];
        if missing.is_missing(v as f64) {
            continue;
        }
        count += 1;
        acc = match op {
            Op::Min => acc.min(v),
            Op::Max => acc.max(v),
            Op::Sum => acc.wrapping_add(v),
        };
    }
    (PartialValue::Int(acc), count)
}

fn reduce_uint(
    values: impl Iterator<Item = u64>,
    indices: &[usize],
    op: Op,
    missing: &MissingSpec,
) -> (PartialValue, u64) {
    let collected: Vec<u64> = values.collect();
    let mut count = 0u64;
    let mut acc: u64 = match op {
        Op::Min => u64::MAX,
        Op::Max => u64::MIN,
        Op::Sum => 0,
    };
    for &idx in indices {
        let v = collected[idx];
        if missing.is_missing(v as f64) {
            continue;
        }
        count += 1;
        acc = match op {
            Op::Min => acc.min(v),
            Op::Max => acc.max(v),
            Op::Sum => acc.wrapping_add(v),
        };
    }
    (PartialValue::UInt(acc), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missing::{MissingSpec, RawMissingAttrs};

    #[test]
    fn decodes_little_endian_i32() {
        let bytes = 42i32.to_le_bytes();
        let buf = TypedBuffer::from_bytes(Dtype::I32, ResolvedEndianness::Little, &bytes).unwrap();
        assert_eq!(buf.get_f64(0), 42.0);
    }

    #[test]
    fn decodes_big_endian_f64() {
        let bytes = 3.25f64.to_be_bytes();
        let buf = TypedBuffer::from_bytes(Dtype::F64, ResolvedEndianness::Big, &bytes).unwrap();
        assert_eq!(buf.get_f64(0), 3.25);
    }

    #[test]
    fn rejects_misaligned_buffer() {
        let err = TypedBuffer::from_bytes(Dtype::I32, ResolvedEndianness::Little, &[0, 1, 2])
            .unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[test]
    fn flat_indices_row_major_2d() {
        // shape (2,3), select all of it: expect row-major order 0..6
        let ranges = [
            AxisRange { start: 0, stop: 2, step: 1 },
            AxisRange { start: 0, stop: 3, step: 1 },
        ];
        let idx = flat_indices(&[2, 3], &ranges);
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn gather_extracts_subselection() {
        let buf = TypedBuffer::F64((0..6).map(|x| x as f64).collect());
        let ranges = [
            AxisRange { start: 1, stop: 2, step: 1 },
            AxisRange { start: 0, stop: 3, step: 1 },
        ];
        let gathered = buf.gather(&[2, 3], &ranges);
        assert_eq!(gathered, TypedBuffer::F64(vec![3.0, 4.0, 5.0]));
    }

    #[test]
    fn sum_skips_masked_elements() {
        let buf = TypedBuffer::F64(vec![1.0, -999.0, 3.0]);
        let spec = MissingSpec::normalize(RawMissingAttrs {
            fill: Some(-999.0),
            ..Default::default()
        })
        .unwrap();
        let (partial, count) = buf.reduce_masked(&[0, 1, 2], Op::Sum, &spec);
        assert_eq!(partial, PartialValue::Float(4.0));
        assert_eq!(count, 2);
    }

    #[test]
    fn all_masked_yields_identity_with_zero_count() {
        let buf = TypedBuffer::F64(vec![-999.0, -999.0]);
        let spec = MissingSpec::normalize(RawMissingAttrs {
            fill: Some(-999.0),
            ..Default::default()
        })
        .unwrap();
        let (min_partial, n) = buf.reduce_masked(&[0, 1], Op::Min, &spec);
        assert_eq!(n, 0);
        assert_eq!(min_partial, PartialValue::Float(f64::INFINITY));
    }

    #[test]
    fn integer_sum_stays_exact() {
        let buf = TypedBuffer::I64(vec![i64::MAX / 2, i64::MAX / 2]);
        let spec = MissingSpec::default();
        let (partial, n) = buf.reduce_masked(&[0, 1], Op::Sum, &spec);
        assert_eq!(n, 2);
        assert_eq!(partial, PartialValue::Int(i64::MAX - 1));
    }
}
