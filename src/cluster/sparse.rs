//! Row-major sparse matrix used for document-term weights.

/// Sparse vector with strictly increasing indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVec {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseVec {
    /// Build from `(index, value)` pairs; pairs are sorted and zeros dropped.
    pub fn from_pairs(mut pairs: Vec<(usize, f64)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let (indices, values): (Vec<usize>, Vec<f64>) = pairs.into_iter().filter(|(_, v)| *v != 0.0).unzip();
        Self { indices, values }
    }

    pub fn from_dense(dense: &[f64]) -> Self {
        Self::from_pairs(dense.iter().copied().enumerate().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn norm_sq(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Dot product with a dense vector of the full width.
    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(i, v)| v * dense[i]).sum()
    }

    /// Scale to unit L2 norm; the zero vector is left alone.
    pub fn l2_normalize(&mut self) {
        let norm = self.norm_sq().sqrt();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }
}

/// Documents as rows, vocabulary terms as columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    pub rows: Vec<SparseVec>,
    pub n_cols: usize,
}

impl SparseMatrix {
    pub fn new(rows: Vec<SparseVec>, n_cols: usize) -> Self {
        Self { rows, n_cols }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(SparseVec::nnz).sum()
    }
}

/// Squared Euclidean distance between a sparse row and a dense point whose
/// squared norm is already known.
pub fn distance_sq(row: &SparseVec, row_norm_sq: f64, point: &[f64], point_norm_sq: f64) -> f64 {
    (row_norm_sq - 2.0 * row.dot_dense(point) + point_norm_sq).max(0.0)
}
