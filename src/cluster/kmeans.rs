use super::sparse::{distance_sq, SparseMatrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// K-Means clustering over sparse rows with dense centroids.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub centroids: Vec<Vec<f64>>,
    pub assignments: Vec<usize>,
    /// Sum of squared distances of rows to their centroid
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    /// Runs K-Means `n_init` times from k-means++ seeds and keeps the run with
    /// the lowest inertia.
    ///
    /// # Arguments
    /// * `data` - Rows to cluster.
    /// * `k` - Number of clusters, clamped to the number of rows.
    /// * `n_init` - Number of restarts.
    /// * `max_iterations` - Iteration cap per restart.
    /// * `seed` - RNG seed; equal inputs give equal clusterings.
    pub fn fit(data: &SparseMatrix, k: usize, n_init: usize, max_iterations: usize, seed: u64) -> Self {
        if data.n_rows() == 0 || k == 0 {
            return Self {
                centroids: vec![],
                assignments: vec![],
                inertia: 0.0,
                iterations: 0,
            };
        }

        let k = k.min(data.n_rows());
        let mut rng = StdRng::seed_from_u64(seed);
        let row_norms: Vec<f64> = data.rows.iter().map(|r| r.norm_sq()).collect();

        let mut best: Option<Self> = None;
        for run in 0..n_init.max(1) {
            let candidate = lloyd(data, &row_norms, k, max_iterations, &mut rng);
            debug!(run = run, inertia = candidate.inertia, iterations = candidate.iterations, "k-means run");
            if best.as_ref().map_or(true, |b| candidate.inertia < b.inertia) {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| Self {
            centroids: vec![],
            assignments: vec![],
            inertia: 0.0,
            iterations: 0,
        })
    }

    /// Number of rows assigned to each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &c in &self.assignments {
            sizes[c] += 1;
        }
        sizes
    }
}

fn lloyd(
    data: &SparseMatrix,
    row_norms: &[f64],
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> KMeans {
    let dim = data.n_cols;
    let mut centroids = kmeans_plus_plus(data, row_norms, k, rng);
    let mut assignments = vec![usize::MAX; data.n_rows()];
    let mut distances = vec![0.0; data.n_rows()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        // E-step: Assign points to nearest centroid
        let centroid_norms: Vec<f64> = centroids.iter().map(|c| norm_sq(c)).collect();
        let mut changes = false;
        for (i, row) in data.rows.iter().enumerate() {
            let (best_cluster, best_dist) = nearest(row, row_norms[i], &centroids, &centroid_norms);
            distances[i] = best_dist;
            if assignments[i] != best_cluster {
                assignments[i] = best_cluster;
                changes = true;
            }
        }

        if !changes || iterations >= max_iterations {
            break;
        }

        // M-step: Update centroids
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, row) in data.rows.iter().enumerate() {
            let cluster = assignments[i];
            for (j, val) in row.iter() {
                sums[cluster][j] += val;
            }
            counts[cluster] += 1;
        }

        for j in 0..k {
            if counts[j] > 0 {
                let n = counts[j] as f64;
                for value in &mut sums[j] {
                    *value /= n;
                }
                centroids[j] = std::mem::take(&mut sums[j]);
            } else if let Some(far) = farthest(&distances) {
                // Empty cluster takes over the worst-served row
                centroids[j] = dense_row(data, far);
                distances[far] = 0.0;
            }
        }
    }

    KMeans {
        centroids,
        assignments,
        inertia: distances.iter().sum(),
        iterations,
    }
}

/// k-means++ seeding: each next centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one.
fn kmeans_plus_plus(data: &SparseMatrix, row_norms: &[f64], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.n_rows();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(dense_row(data, rng.gen_range(0..n)));

    let mut closest: Vec<f64> = (0..n)
        .map(|i| distance_to(data, row_norms, i, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, d) in closest.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // All remaining rows coincide with a centroid
            rng.gen_range(0..n)
        };

        let centroid = dense_row(data, next);
        for (i, d) in closest.iter_mut().enumerate() {
            *d = d.min(distance_to(data, row_norms, i, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn nearest(
    row: &super::sparse::SparseVec,
    row_norm: f64,
    centroids: &[Vec<f64>],
    centroid_norms: &[f64],
) -> (usize, f64) {
    let mut min_dist_sq = f64::MAX;
    let mut best_cluster = 0;
    for (j, centroid) in centroids.iter().enumerate() {
        let dist_sq = distance_sq(row, row_norm, centroid, centroid_norms[j]);
        if dist_sq < min_dist_sq {
            min_dist_sq = dist_sq;
            best_cluster = j;
        }
    }
    (best_cluster, min_dist_sq)
}

fn distance_to(data: &SparseMatrix, row_norms: &[f64], i: usize, centroid: &[f64]) -> f64 {
    distance_sq(&data.rows[i], row_norms[i], centroid, norm_sq(centroid))
}

fn farthest(distances: &[f64]) -> Option<usize> {
    distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > 0.0)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn dense_row(data: &SparseMatrix, i: usize) -> Vec<f64> {
    let mut dense = vec![0.0; data.n_cols];
    for (j, v) in data.rows[i].iter() {
        dense[j] = v;
    }
    dense
}

fn norm_sq(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::sparse::SparseVec;

    fn matrix(points: &[[f64; 2]]) -> SparseMatrix {
        SparseMatrix::new(points.iter().map(|p| SparseVec::from_dense(p)).collect(), 2)
    }

    #[test]
    fn test_separates_two_blobs() {
        let data = matrix(&[
            [0.0, 0.1],
            [0.1, 0.0],
            [0.1, 0.1],
            [5.0, 5.1],
            [5.1, 5.0],
            [5.1, 5.1],
        ]);
        let km = KMeans::fit(&data, 2, 5, 100, 42);

        assert_eq!(km.assignments.len(), 6);
        assert_eq!(km.assignments[0], km.assignments[1]);
        assert_eq!(km.assignments[1], km.assignments[2]);
        assert_eq!(km.assignments[3], km.assignments[4]);
        assert_eq!(km.assignments[4], km.assignments[5]);
        assert_ne!(km.assignments[0], km.assignments[3]);
        assert!(km.inertia < 0.1);
        assert_eq!(km.cluster_sizes(), vec![3, 3]);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let data = matrix(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.2, 0.9], [0.9, 0.1]]);
        let a = KMeans::fit(&data, 2, 3, 50, 7);
        let b = KMeans::fit(&data, 2, 3, 50, 7);
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn test_k_clamped_to_rows() {
        let data = matrix(&[[1.0, 0.0], [0.0, 1.0]]);
        let km = KMeans::fit(&data, 6, 2, 10, 42);
        assert_eq!(km.centroids.len(), 2);
        assert_ne!(km.assignments[0], km.assignments[1]);
    }

    #[test]
    fn test_empty_input() {
        let km = KMeans::fit(&SparseMatrix::default(), 3, 1, 10, 42);
        assert!(km.assignments.is_empty());
        assert!(km.centroids.is_empty());
    }
}
