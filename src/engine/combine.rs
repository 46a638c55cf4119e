//! Partial-result combination (§4.6), `drop_axes`/`components` shaping
//! (§4.1, §9), and the disjoint select-mode output writer.
//!
//! Grounded on `active.py::_from_storage` (the `method(out)` re-apply over
//! the collected partials, the `components` branch, and mean's deferred
//! division).

use crate::buffer::{Op, PartialValue, TypedBuffer};
use crate::indexer::AxisRange;
use crate::reducer::Method;
use crate::selection::Selection;

/// The final shape of a `select`-mode (no `method`) result, after squeezing
/// integer-selector axes — always squeezed, since select mode has no
/// `components` branch to force `keepdims` (§9's resolution applies only to
/// reduction output).
pub fn select_output_shape(selection: &Selection) -> Vec<u64> {
    selection.squeezed_shape()
}

/// Remove the entries at `drop_axes` from a per-axis list, used to collapse
/// a chunk's `out_selection`/local buffer dimensionality to match the
/// squeezed output array (§4.1 "Axes collapsed by an integer selector").
pub fn squeeze_ranges(ranges: &[AxisRange], drop_axes: &[usize]) -> Vec<AxisRange> {
    ranges
        .iter()
        .enumerate()
        .filter(|(axis, _)| !drop_axes.contains(axis))
        .map(|(_, r)| *r)
        .collect()
}

/// A disjoint-slice byte writer for the pre-allocated select-mode output
/// buffer (§5 "Shared resources"). Concurrent chunk tasks each write into
/// their own `out_selection` slice; the indexer guarantees those slices
/// never overlap, so no lock is needed here — only the invariant that every
/// caller's `write` target is disjoint from every other caller's, which the
/// engine upholds by construction (one call per distinct chunk task).
///
/// Modeled on `zarrs`' `UnsafeCellSlice` idiom: a raw pointer wrapped in a
/// type that is `Send + Sync` purely on the strength of that invariant.
pub struct DisjointByteWriter {
    ptr: *mut u8,
    len: usize,
}

// Safety: every `write` call targets a byte range disjoint from every other
// call the engine makes against the same writer (guaranteed by the
// indexer's per-chunk `out_selection` partition, §4.1/§4.6), so concurrent
// writers never race on the same memory.
unsafe impl Send for DisjointByteWriter {}
unsafe impl Sync for DisjointByteWriter {}

impl DisjointByteWriter {
    /// # Safety
    /// The caller must ensure all `write` calls made through this (and any
    /// cloned) writer target disjoint byte ranges of `buf` for the writer's
    /// lifetime.
    pub unsafe fn new(buf: &mut [u8]) -> Self {
        Self {
            ptr: buf.as_mut_ptr(),
            len: buf.len(),
        }
    }

    pub fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.len,
            "write out of bounds: offset {offset} + {} > {}",
            bytes.len(),
            self.len
        );
        // Safety: disjointness is the writer's own invariant (see `new`).
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
    }
}

/// Combine the per-chunk reduction partials into the final `(value, n)`
/// (§4.6: re-apply the operator over the partial list; for `mean`, sum then
/// the caller divides by the total count).
pub fn combine_partials(partials: &[(PartialValue, u64)], op: Op) -> (PartialValue, u64) {
    assert!(!partials.is_empty(), "combine_partials requires at least one partial");
    let total_count: u64 = partials.iter().map(|(_, c)| c).sum();
    let value = partials
        .iter()
        .map(|(v, _)| *v)
        .reduce(|acc, v| acc.combine(v, op))
        .expect("non-empty partials");
    (value, total_count)
}

/// Shape of the `n` and `value` reshape when `components=true`: `(1,)` per
/// output axis, regardless of `drop_axes` (§4.6, §9 — components mode
/// always forces full `keepdims`).
pub fn components_shape(selection: &Selection) -> Vec<u64> {
    vec![1; selection.kept_shape().len()]
}

/// The final scalar a reduction produces once partials are combined,
/// applying `mean`'s deferred division.
pub fn finalize_scalar(method: Method, value: PartialValue, count: u64) -> PartialValue {
    match method {
        Method::Mean if count > 0 => PartialValue::Float(value.as_f64() / count as f64),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_sum_adds_all_partials() {
        let partials = vec![
            (PartialValue::Float(1.0), 2),
            (PartialValue::Float(3.0), 1),
        ];
        let (value, n) = combine_partials(&partials, Op::Sum);
        assert_eq!(value, PartialValue::Float(4.0));
        assert_eq!(n, 3);
    }

    #[test]
    fn combine_min_ignores_count_zero_identity() {
        let partials = vec![
            (PartialValue::Float(f64::INFINITY), 0),
            (PartialValue::Float(2.0), 5),
        ];
        let (value, n) = combine_partials(&partials, Op::Min);
        assert_eq!(value, PartialValue::Float(2.0));
        assert_eq!(n, 5);
    }

    #[test]
    fn mean_divides_by_total_count() {
        let value = finalize_scalar(Method::Mean, PartialValue::Float(16.0), 8);
        assert_eq!(value, PartialValue::Float(2.0));
    }

    #[test]
    fn squeeze_ranges_drops_named_axes() {
        let ranges = vec![
            AxisRange { start: 0, stop: 1, step: 1 },
            AxisRange { start: 0, stop: 4, step: 1 },
        ];
        let squeezed = squeeze_ranges(&ranges, &[0]);
        assert_eq!(squeezed, vec![AxisRange { start: 0, stop: 4, step: 1 }]);
    }

    #[test]
    fn disjoint_writer_writes_at_offsets() {
        let mut buf = vec![0u8; 8];
        unsafe {
            let writer = DisjointByteWriter::new(&mut buf);
            writer.write(0, &[1, 2]);
            writer.write(4, &[3, 4]);
        }
        assert_eq!(buf, vec![1, 2, 0, 0, 3, 4, 0, 0]);
    }
}
