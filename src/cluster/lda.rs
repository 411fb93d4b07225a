//! Latent Dirichlet Allocation fitted with batch variational Bayes.
//!
//! Works on any non-negative document-term matrix (TF-IDF weights included).
//! Each EM pass runs the per-document E-step to convergence against the
//! current topic-word parameters, then replaces those parameters with the
//! prior plus the expected sufficient statistics.

use super::sparse::{SparseMatrix, SparseVec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Per-document E-step iteration cap
const MAX_DOC_UPDATE_ITER: usize = 100;

/// Mean absolute change in a document's topic weights that ends its E-step
const MEAN_CHANGE_TOL: f64 = 1e-3;

/// Fitted topic model
#[derive(Debug, Clone)]
pub struct Lda {
    /// Variational topic-word parameters, `n_topics x n_terms`
    pub components: Vec<Vec<f64>>,
    doc_topic_prior: f64,
    exp_elog_beta: Vec<Vec<f64>>,
}

impl Lda {
    /// Fit `n_topics` topics with priors `1 / n_topics`.
    pub fn fit(data: &SparseMatrix, n_topics: usize, max_iter: usize, seed: u64) -> Self {
        let n_topics = n_topics.max(1);
        let prior = 1.0 / n_topics as f64;
        let mut rng = StdRng::seed_from_u64(seed);

        // Start near 1 with jitter so topics can separate
        let components: Vec<Vec<f64>> = (0..n_topics)
            .map(|_| (0..data.n_cols).map(|_| jitter(&mut rng)).collect())
            .collect();

        let mut lda = Self {
            exp_elog_beta: dirichlet_expectation_exp(&components),
            components,
            doc_topic_prior: prior,
        };

        for pass in 0..max_iter {
            let mut sstats = vec![vec![0.0; data.n_cols]; n_topics];
            for row in &data.rows {
                let gamma = lda.infer(row, &mut rng);
                lda.accumulate(row, &gamma, &mut sstats);
            }

            for (k, topic) in lda.components.iter_mut().enumerate() {
                for (w, value) in topic.iter_mut().enumerate() {
                    *value = prior + sstats[k][w] * lda.exp_elog_beta[k][w];
                }
            }
            lda.exp_elog_beta = dirichlet_expectation_exp(&lda.components);
            debug!(pass = pass + 1, "LDA pass complete");
        }

        lda
    }

    pub fn n_topics(&self) -> usize {
        self.components.len()
    }

    /// Normalized topic distribution of every row
    pub fn transform(&self, data: &SparseMatrix, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        data.rows
            .iter()
            .map(|row| {
                let gamma = self.infer(row, &mut rng);
                let total: f64 = gamma.iter().sum();
                gamma.iter().map(|g| g / total).collect()
            })
            .collect()
    }

    /// Index of the heaviest topic of every row
    pub fn dominant_topics(&self, data: &SparseMatrix, seed: u64) -> Vec<usize> {
        self.transform(data, seed).iter().map(|dist| argmax(dist)).collect()
    }

    /// Column indices of the `n` heaviest terms of each topic
    pub fn top_terms(&self, n: usize) -> Vec<Vec<usize>> {
        self.components.iter().map(|topic| top_indices(topic, n)).collect()
    }

    /// Variational E-step for one document; returns its unnormalized topic weights.
    fn infer(&self, row: &SparseVec, rng: &mut StdRng) -> Vec<f64> {
        let k = self.n_topics();
        let mut gamma: Vec<f64> = (0..k).map(|_| jitter(rng)).collect();
        if row.is_empty() {
            return gamma;
        }

        let mut exp_elog_theta = exp_dirichlet_expectation(&gamma);
        for _ in 0..MAX_DOC_UPDATE_ITER {
            let last = gamma.clone();
            let phinorm = self.phinorm(row, &exp_elog_theta);

            for t in 0..k {
                let weighted: f64 = row
                    .iter()
                    .zip(&phinorm)
                    .map(|((w, cnt), norm)| cnt / norm * self.exp_elog_beta[t][w])
                    .sum();
                gamma[t] = self.doc_topic_prior + exp_elog_theta[t] * weighted;
            }
            exp_elog_theta = exp_dirichlet_expectation(&gamma);

            let mean_change =
                gamma.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum::<f64>() / k as f64;
            if mean_change < MEAN_CHANGE_TOL {
                break;
            }
        }
        gamma
    }

    fn accumulate(&self, row: &SparseVec, gamma: &[f64], sstats: &mut [Vec<f64>]) {
        if row.is_empty() {
            return;
        }
        let exp_elog_theta = exp_dirichlet_expectation(gamma);
        let phinorm = self.phinorm(row, &exp_elog_theta);
        for (t, stats) in sstats.iter_mut().enumerate() {
            for ((w, cnt), norm) in row.iter().zip(&phinorm) {
                stats[w] += exp_elog_theta[t] * cnt / norm;
            }
        }
    }

    fn phinorm(&self, row: &SparseVec, exp_elog_theta: &[f64]) -> Vec<f64> {
        row.indices
            .iter()
            .map(|&w| {
                exp_elog_theta
                    .iter()
                    .zip(&self.exp_elog_beta)
                    .map(|(theta, beta)| theta * beta[w])
                    .sum::<f64>()
                    + 1e-100
            })
            .collect()
    }
}

fn jitter(rng: &mut StdRng) -> f64 {
    0.9 + 0.2 * rng.gen::<f64>()
}

/// `exp(E[log x])` for x ~ Dirichlet(alpha)
fn exp_dirichlet_expectation(alpha: &[f64]) -> Vec<f64> {
    let total = digamma(alpha.iter().sum());
    alpha.iter().map(|a| (digamma(*a) - total).exp()).collect()
}

fn dirichlet_expectation_exp(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| exp_dirichlet_expectation(r)).collect()
}

/// Digamma for positive arguments: recurrence up to 6, then the asymptotic series.
pub(crate) fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let f = 1.0 / (x * x);
    result + x.ln()
        - 0.5 / x
        - f * (1.0 / 12.0 - f * (1.0 / 120.0 - f * (1.0 / 252.0 - f * (1.0 / 240.0 - f / 132.0))))
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

pub(crate) fn top_indices(values: &[f64], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
    order.truncate(n);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digamma_known_values() {
        // psi(1) = -euler_gamma
        assert!((digamma(1.0) + 0.577_215_664_901_532_9).abs() < 1e-10);
        // psi(0.5) = -euler_gamma - 2 ln 2
        assert!((digamma(0.5) + 0.577_215_664_901_532_9 + 2.0 * 2f64.ln()).abs() < 1e-10);
        assert!((digamma(10.0) - 2.251_752_589_066_721).abs() < 1e-10);
    }

    #[test]
    fn test_separates_disjoint_vocabularies() {
        // Terms 0..3 belong to one theme, 3..6 to the other.
        let mut rows = Vec::new();
        for i in 0..8 {
            let base = if i % 2 == 0 { 0 } else { 3 };
            rows.push(SparseVec::from_pairs(vec![
                (base, 4.0),
                (base + 1, 3.0),
                (base + 2, 2.0),
            ]));
        }
        let data = SparseMatrix::new(rows, 6);

        let lda = Lda::fit(&data, 2, 50, 42);
        let topics = lda.dominant_topics(&data, 42);

        for i in (2..8).step_by(2) {
            assert_eq!(topics[i], topics[0]);
        }
        for i in (3..8).step_by(2) {
            assert_eq!(topics[i], topics[1]);
        }
        assert_ne!(topics[0], topics[1]);

        let top = lda.top_terms(3);
        let mut first = top[topics[0]].clone();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1, 2]);
    }

    #[test]
    fn test_transform_rows_sum_to_one() {
        let data = SparseMatrix::new(
            vec![
                SparseVec::from_pairs(vec![(0, 1.0), (1, 0.5)]),
                SparseVec::default(),
            ],
            2,
        );
        let lda = Lda::fit(&data, 3, 5, 1);
        for dist in lda.transform(&data, 1) {
            assert_eq!(dist.len(), 3);
            assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_top_indices_orders_by_weight() {
        assert_eq!(top_indices(&[0.1, 0.7, 0.3, 0.7], 3), vec![1, 3, 2]);
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), 1);
    }
}
