//! N-dimensional selections (hyperslabs) over a variable.

use crate::error::{Error, Result};

/// A single axis selector: either a strided slice or a dropping integer
/// index (§3 "Selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelector {
    /// `start..stop` stepping by `step` (`step >= 1`).
    Slice { start: u64, stop: u64, step: u64 },
    /// A single index; the axis is dropped from the output unless
    /// `components=true` forces `keepdims` (§9).
    Index(u64),
}

impl AxisSelector {
    /// Normalize to the `(start, stop, step)` triple this selector denotes,
    /// treating a bare index as `slice(i, i+1, 1)` (§3).
    pub fn as_slice(self) -> (u64, u64, u64) {
        match self {
            AxisSelector::Slice { start, stop, step } => (start, stop, step),
            AxisSelector::Index(i) => (i, i + 1, 1),
        }
    }

    /// Whether this selector drops its axis from the output.
    pub fn drops_axis(self) -> bool {
        matches!(self, AxisSelector::Index(_))
    }

    /// Number of elements this selector yields along its axis.
    pub fn len(self) -> u64 {
        let (start, stop, step) = self.as_slice();
        if stop <= start {
            0
        } else {
            (stop - start).div_ceil(step)
        }
    }
}

/// An N-tuple of [`AxisSelector`]s addressing a hyperslab of a variable.
///
/// Negative indices are disallowed at this layer — the caller is expected to
/// have already resolved them against the variable's shape (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection(Vec<AxisSelector>);

impl Selection {
    /// Validate `selectors` against `shape`, producing a [`Selection`].
    ///
    /// Fails with [`Error::InvalidInput`] if the rank doesn't match, a step
    /// is zero, or any selector's range exceeds the corresponding shape
    /// dimension.
    pub fn new(selectors: Vec<AxisSelector>, shape: &[u64]) -> Result<Self> {
        if selectors.len() != shape.len() {
            return Err(Error::InvalidInput(format!(
                "selection has {} axes but variable has {} dimensions",
                selectors.len(),
                shape.len()
            )));
        }
        for (axis, (sel, &dim)) in selectors.iter().zip(shape).enumerate() {
            let (start, stop, step) = sel.as_slice();
            if step == 0 {
                return Err(Error::InvalidInput(format!(
                    "axis {axis}: step must be >= 1"
                )));
            }
            if start > stop {
                return Err(Error::InvalidInput(format!(
                    "axis {axis}: start ({start}) is after stop ({stop})"
                )));
            }
            if stop > dim {
                return Err(Error::InvalidInput(format!(
                    "axis {axis}: selection [{start}:{stop}:{step}] exceeds dimension size {dim}"
                )));
            }
        }
        Ok(Self(selectors))
    }

    /// A selection over the full extent of `shape` (i.e. `handle[::, ::, ...]`).
    pub fn full(shape: &[u64]) -> Self {
        Self(
            shape
                .iter()
                .map(|&dim| AxisSelector::Slice {
                    start: 0,
                    stop: dim,
                    step: 1,
                })
                .collect(),
        )
    }

    pub fn axes(&self) -> &[AxisSelector] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The shape of the array this selection produces, before any axes are
    /// dropped (i.e. with `keepdims` semantics).
    pub fn kept_shape(&self) -> Vec<u64> {
        self.0.iter().map(|sel| sel.len()).collect()
    }

    /// Indices of axes that are dropped by an [`AxisSelector::Index`].
    pub fn drop_axes(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, sel)| sel.drops_axis())
            .map(|(i, _)| i)
            .collect()
    }

    /// The output shape after squeezing `drop_axes`, matching `keepdims=false`.
    pub fn squeezed_shape(&self) -> Vec<u64> {
        self.0
            .iter()
            .filter(|sel| !sel.drops_axis())
            .map(|sel| sel.len())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(start: u64, stop: u64, step: u64) -> AxisSelector {
        AxisSelector::Slice { start, stop, step }
    }

    #[test]
    fn full_selection_spans_shape() {
        let shape = [10, 10, 10];
        let sel = Selection::full(&shape);
        assert_eq!(sel.kept_shape(), vec![10, 10, 10]);
        assert!(sel.drop_axes().is_empty());
    }

    #[test]
    fn rejects_out_of_range_selection() {
        let shape = [10];
        let err = Selection::new(vec![slice(0, 11, 1)], &shape).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_rank_mismatch() {
        let shape = [10, 10];
        let err = Selection::new(vec![slice(0, 10, 1)], &shape).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_step() {
        let shape = [10];
        let err = Selection::new(vec![slice(0, 10, 0)], &shape).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn index_selector_drops_its_axis() {
        let shape = [10, 10, 10];
        let sel = Selection::new(
            vec![AxisSelector::Index(0), slice(4, 6, 1), slice(7, 9, 1)],
            &shape,
        )
        .unwrap();
        assert_eq!(sel.drop_axes(), vec![0]);
        assert_eq!(sel.squeezed_shape(), vec![2, 2]);
        assert_eq!(sel.kept_shape(), vec![1, 2, 2]);
    }

    #[test]
    fn strided_slice_length() {
        assert_eq!(slice(0, 10, 3).len(), 4); // 0,3,6,9
        assert_eq!(slice(0, 0, 1).len(), 0);
    }
}
