//! Dense potentials over the dimensions of a parfactor.
//!
//! A [`Potential`] is a non-negative table with one axis per dimension term.
//! Axis `i` has as many entries as term `i` has values: the range size of a
//! function application, or the number of histograms of a counting term.

use scirs2_core::ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{FoveError, Result};

/// A table of weights indexed by one value per dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Potential {
    values: ArrayD<f64>,
}

impl Potential {
    pub fn new(values: ArrayD<f64>) -> Self {
        Self { values }
    }

    /// A table of the given shape with every entry set to `value`.
    pub fn filled(shape: &[usize], value: f64) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Build from row-major data.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(FoveError::DimensionMismatch {
                expected: vec![expected],
                got: vec![data.len()],
            });
        }
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(Self::new)
            .map_err(|e| FoveError::InvalidPotential(e.to_string()))
    }

    /// Build by evaluating `f` at every index tuple.
    pub fn from_fn<F>(shape: &[usize], mut f: F) -> Self
    where
        F: FnMut(&[usize]) -> f64,
    {
        let mut values = ArrayD::zeros(IxDyn(shape));
        for idx in assignments(shape) {
            values[idx.as_slice()] = f(&idx);
        }
        Self::new(values)
    }

    /// A zero-dimensional potential.
    pub fn scalar(value: f64) -> Self {
        Self::filled(&[], value)
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The entry at `idx`, or `None` when `idx` is outside the table.
    pub fn get(&self, idx: &[usize]) -> Option<f64> {
        self.values.get(idx).copied()
    }

    /// Like [`get`](Self::get), but an out-of-range index is an error.
    pub fn value(&self, idx: &[usize]) -> Result<f64> {
        self.get(idx).ok_or_else(|| self.out_of_range(idx))
    }

    pub fn set(&mut self, idx: &[usize], value: f64) -> Result<()> {
        match self.values.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.out_of_range(idx)),
        }
    }

    fn out_of_range(&self, idx: &[usize]) -> FoveError {
        FoveError::IndexOutOfRange {
            index: idx.to_vec(),
            shape: self.shape().to_vec(),
        }
    }

    /// Sum of all entries.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// The single entry of a zero-dimensional potential.
    pub fn as_scalar(&self) -> Option<f64> {
        (self.ndim() == 0).then(|| self.values.iter().copied().next().unwrap_or(0.0))
    }

    /// Entries in row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Pointwise product of several potentials over a joint index space.
    ///
    /// `mapping[k]` gives, for axis `k` of the input, the output axis it
    /// reads its index from. Two input axes may read the same output axis.
    pub fn product(inputs: &[(&Potential, Vec<usize>)], shape: &[usize]) -> Result<Potential> {
        for (pot, mapping) in inputs {
            if mapping.len() != pot.ndim() {
                return Err(FoveError::DimensionMismatch {
                    expected: vec![pot.ndim()],
                    got: vec![mapping.len()],
                });
            }
            for (axis, out) in mapping.iter().enumerate() {
                if shape.get(*out) != Some(&pot.shape()[axis]) {
                    return Err(FoveError::DimensionMismatch {
                        expected: pot.shape().to_vec(),
                        got: mapping.iter().map(|o| shape.get(*o).copied().unwrap_or(0)).collect(),
                    });
                }
            }
        }

        let mut sub_idx: Vec<Vec<usize>> = inputs.iter().map(|(p, _)| vec![0; p.ndim()]).collect();
        Ok(Potential::from_fn(shape, |idx| {
            let mut value = 1.0;
            for ((pot, mapping), sub) in inputs.iter().zip(sub_idx.iter_mut()) {
                for (k, out) in mapping.iter().enumerate() {
                    sub[k] = idx[*out];
                }
                value *= pot.values()[&sub[..]];
            }
            value
        }))
    }

    /// Marginalize one axis away.
    pub fn sum_out(&self, axis: usize) -> Potential {
        Potential::new(self.values.sum_axis(Axis(axis)))
    }

    /// Marginalize one axis away, scaling entry `v` of that axis by
    /// `weights[v]` first.
    pub fn sum_out_weighted(&self, axis: usize, weights: &[f64]) -> Result<Potential> {
        if weights.len() != self.shape()[axis] {
            return Err(FoveError::DimensionMismatch {
                expected: vec![self.shape()[axis]],
                got: vec![weights.len()],
            });
        }
        let mut out_shape = self.shape().to_vec();
        out_shape.remove(axis);
        let mut acc = ArrayD::zeros(IxDyn(&out_shape));
        for (v, w) in weights.iter().enumerate() {
            let slice = self.values.index_axis(Axis(axis), v);
            acc.scaled_add(*w, &slice);
        }
        Ok(Potential::new(acc))
    }

    /// Raise every entry to the power `n`.
    pub fn pow(&self, n: usize) -> Potential {
        let exp = n as f64;
        Potential::new(self.values.mapv(|v| v.powf(exp)))
    }

    /// Scale so the entries sum to one.
    pub fn normalize(&self) -> Result<Potential> {
        let sum = self.total();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(FoveError::InvalidPotential(format!(
                "cannot normalize a potential with total weight {}",
                sum
            )));
        }
        Ok(Potential::new(self.values.mapv(|v| v / sum)))
    }

    /// Whether both tables have the same shape and every pair of entries
    /// differs by at most `tol`.
    pub fn within_tolerance(&self, other: &Potential, tol: f64) -> bool {
        self.shape() == other.shape()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// The slice at value `index` of `axis`, with that axis removed.
    pub fn index_axis(&self, axis: usize, index: usize) -> Potential {
        Potential::new(self.values.index_axis(Axis(axis), index).to_owned())
    }

    /// Keep the entries where axes `a` and `b` agree, dropping axis `b`.
    pub fn diagonal(&self, a: usize, b: usize) -> Result<Potential> {
        if a == b || self.shape()[a] != self.shape()[b] {
            return Err(FoveError::DimensionMismatch {
                expected: vec![self.shape()[a]],
                got: vec![self.shape()[b]],
            });
        }
        let mut out_shape = self.shape().to_vec();
        out_shape.remove(b);
        let mut full = vec![0; self.ndim()];
        Ok(Potential::from_fn(&out_shape, |idx| {
            let mut k = 0;
            for (axis, slot) in full.iter_mut().enumerate() {
                if axis == b {
                    continue;
                }
                *slot = idx[k];
                k += 1;
            }
            full[b] = full[a];
            self.values[full.as_slice()]
        }))
    }

    /// Reorder axes: output axis `i` is input axis `order[i]`.
    pub fn permuted(&self, order: &[usize]) -> Potential {
        Potential::new(self.values.clone().permuted_axes(IxDyn(order)).as_standard_layout().to_owned())
    }
}

/// Every index tuple of a table with the given shape, in row-major order.
pub fn assignments(shape: &[usize]) -> impl Iterator<Item = Vec<usize>> + '_ {
    let total: usize = shape.iter().product();
    (0..total).map(move |linear_idx| {
        let mut assignment = vec![0; shape.len()];
        let mut temp_idx = linear_idx;
        for (slot, dim) in assignment.iter_mut().zip(shape).rev() {
            *slot = temp_idx % dim;
            temp_idx /= dim;
        }
        assignment
    })
}
