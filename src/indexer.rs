//! Indexer (C1): translates an N-D [`Selection`] against a chunk grid into
//! an iterable of `(chunk_coords, chunk_selection, out_selection)` triples.
//!
//! Grounded on the iterator idiom in `chunker/fast_cdc/mod.rs` (a struct
//! that yields `Chunk { offset, length, .. }` over a byte source), adapted
//! from 1-D content-defined cut points to N-D fixed-grid chunk boundaries;
//! the per-axis grouping and Cartesian product over axes use `itertools`,
//! the teacher's own dependency for this kind of combinatorial expansion.

use itertools::Itertools;

use crate::selection::{AxisSelector, Selection};

/// A `(start, stop, step)` triple, used both for a chunk-local selection and
/// for the corresponding slot in the output array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub start: u64,
    pub stop: u64,
    pub step: u64,
}

impl AxisRange {
    pub fn len(self) -> u64 {
        if self.stop <= self.start {
            0
        } else {
            (self.stop - self.start).div_ceil(self.step)
        }
    }
}

/// Per-axis, per-chunk intersection of the selection with one chunk's
/// footprint along that axis.
#[derive(Debug, Clone, Copy)]
struct AxisChunkHit {
    chunk_index: u64,
    /// Range local to the chunk's own coordinate frame.
    chunk_local: AxisRange,
    /// Range in the output array's coordinate frame for this axis.
    out_local: AxisRange,
}

/// One chunk's worth of work: which chunk, the selection local to it, and
/// where its result lands in the output.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub chunk_coords: Vec<u64>,
    pub chunk_selection: Vec<AxisRange>,
    pub out_selection: Vec<AxisRange>,
}

/// Compute, for one axis, the chunk indices touched by `sel` and the
/// intersection with each one, in the chunk's local frame and the output's
/// frame.
///
/// Because `sel`'s step is constant, the global positions touching a single
/// chunk form an arithmetic progression with that same step (§4.1
/// implementation note) — no per-element index list is ever materialized,
/// only the per-chunk `(start, stop, step)` bounds.
fn axis_hits(sel: AxisSelector, chunk_len: u64) -> Vec<AxisChunkHit> {
    let (start, stop, step) = sel.as_slice();
    if stop <= start || chunk_len == 0 {
        return Vec::new();
    }

    let first_chunk = start / chunk_len;
    let last_chunk = (stop - 1) / chunk_len;

    let mut hits = Vec::new();
    let mut out_pos: u64 = 0;

    for chunk_index in first_chunk..=last_chunk {
        let chunk_base = chunk_index * chunk_len;
        let chunk_end = chunk_base + chunk_len;

        // First global position >= max(start, chunk_base) that lies on the
        // selection's stride.
        let lower = start.max(chunk_base);
        let rem = if lower >= start {
            (lower - start) % step
        } else {
            0
        };
        let first_global = if rem == 0 { lower } else { lower + (step - rem) };

        if first_global >= chunk_end || first_global >= stop {
            // No element of this axis's stride falls in this chunk; still
            // advance out_pos bookkeeping only if genuinely empty (it is,
            // since we only enumerate chunks between first/last touched).
            continue;
        }

        // Count how many strided positions land inside this chunk.
        let last_in_chunk = {
            let upper = (stop - 1).min(chunk_end - 1);
            if upper < first_global {
                continue;
            }
            first_global + ((upper - first_global) / step) * step
        };
        let count = (last_in_chunk - first_global) / step + 1;

        hits.push(AxisChunkHit {
            chunk_index,
            chunk_local: AxisRange {
                start: first_global - chunk_base,
                stop: last_in_chunk - chunk_base + 1,
                step,
            },
            out_local: AxisRange {
                start: out_pos,
                stop: out_pos + count,
                step: 1,
            },
        });

        out_pos += count;
    }

    hits
}

/// Iterate the `(chunk_coords, chunk_selection, out_selection)` triples for
/// `selection` against a variable of the given `chunk_shape` (§4.1).
///
/// Orthogonal (per-axis) semantics only, matching the source's
/// `OrthogonalIndexer` — fancy indexing is not supported.
pub fn iter_chunks(selection: &Selection, chunk_shape: &[u64]) -> Vec<ChunkTask> {
    let per_axis_hits: Vec<Vec<AxisChunkHit>> = selection
        .axes()
        .iter()
        .zip(chunk_shape)
        .map(|(&sel, &chunk_len)| axis_hits(sel, chunk_len))
        .collect();

    if per_axis_hits.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    per_axis_hits
        .into_iter()
        .multi_cartesian_product()
        .map(|combo| ChunkTask {
            chunk_coords: combo.iter().map(|h| h.chunk_index).collect(),
            chunk_selection: combo.iter().map(|h| h.chunk_local).collect(),
            out_selection: combo.iter().map(|h| h.out_local).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::AxisSelector;

    fn slice(start: u64, stop: u64, step: u64) -> AxisSelector {
        AxisSelector::Slice { start, stop, step }
    }

    #[test]
    fn single_chunk_selection_yields_one_task() {
        let sel = Selection::new(vec![slice(0, 2, 1), slice(0, 2, 1)], &[10, 10]).unwrap();
        let tasks = iter_chunks(&sel, &[5, 5]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].chunk_coords, vec![0, 0]);
    }

    #[test]
    fn spanning_selection_yields_expected_chunk_count() {
        // 10x10x10 with 5x5x5 chunks, selection [0:2, 4:6, 7:9] spans
        // chunks (0,0,1) and (0,1,1) along axis 1 (4..6 straddles chunk
        // boundary 5), so 2 chunks total.
        let sel = Selection::new(
            vec![slice(0, 2, 1), slice(4, 6, 1), slice(7, 9, 1)],
            &[10, 10, 10],
        )
        .unwrap();
        let tasks = iter_chunks(&sel, &[5, 5, 5]);
        assert_eq!(tasks.len(), 2);
        let coords: Vec<Vec<u64>> = tasks.iter().map(|t| t.chunk_coords.clone()).collect();
        assert!(coords.contains(&vec![0, 0, 1]));
        assert!(coords.contains(&vec![0, 1, 1]));
    }

    #[test]
    fn out_selections_are_disjoint_and_cover_output() {
        let sel = Selection::new(
            vec![slice(0, 2, 1), slice(4, 6, 1), slice(7, 9, 1)],
            &[10, 10, 10],
        )
        .unwrap();
        let tasks = iter_chunks(&sel, &[5, 5, 5]);
        let mut covered = vec![vec![false; 2]; 2];
        for task in &tasks {
            let axis1 = &task.out_selection[1];
            for i in axis1.start..axis1.stop {
                for j in 0..2 {
                    covered[i as usize][j] = true;
                }
            }
        }
        assert!(covered.iter().flatten().all(|&b| b));
    }

    #[test]
    fn strided_selection_respects_step_within_chunk() {
        let sel = Selection::new(vec![slice(0, 10, 3)], &[10]).unwrap();
        let tasks = iter_chunks(&sel, &[5]);
        // global positions: 0, 3, 6, 9 -> chunk 0 has {0,3}, chunk 1 has {6,9}
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            match task.chunk_coords[0] {
                0 => assert_eq!(task.chunk_selection[0].len(), 2),
                1 => assert_eq!(task.chunk_selection[0].len(), 2),
                _ => panic!("unexpected chunk"),
            }
        }
    }

    #[test]
    fn empty_selection_yields_no_tasks() {
        let sel = Selection::new(vec![slice(0, 0, 1)], &[10]).unwrap();
        let tasks = iter_chunks(&sel, &[5]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn index_selector_yields_single_element_range() {
        let sel = Selection::new(vec![AxisSelector::Index(7)], &[10]).unwrap();
        let tasks = iter_chunks(&sel, &[5]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].chunk_coords, vec![1]);
        assert_eq!(tasks[0].chunk_selection[0].len(), 1);
    }
}
