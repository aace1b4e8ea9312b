use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::tfidf::SparseVec;

const MAX_ITER: usize = 300;

/// Lloyd's k-means over sparse rows with greedy k-means++ seeding.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    n_init: usize,
    seed: u64,
}

#[derive(Debug, Clone)]
pub struct Fit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl KMeans {
    pub fn new(k: usize, n_init: usize, seed: u64) -> Self {
        Self {
            k: k.max(1),
            n_init: n_init.max(1),
            seed,
        }
    }

    /// Best of `n_init` runs by inertia. One rng drives every run, so the
    /// result depends only on the input, `k`, and the seed.
    pub fn fit(&self, points: &[SparseVec], dim: usize) -> Fit {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<Fit> = None;
        for _ in 0..self.n_init {
            let fit = self.fit_once(points, dim, &mut rng);
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        best.unwrap_or_else(|| Fit {
            labels: Vec::new(),
            centroids: vec![vec![0.0; dim]; self.k],
            inertia: 0.0,
        })
    }

    fn fit_once(&self, points: &[SparseVec], dim: usize, rng: &mut StdRng) -> Fit {
        if points.is_empty() {
            return Fit {
                labels: Vec::new(),
                centroids: vec![vec![0.0; dim]; self.k],
                inertia: 0.0,
            };
        }

        let norms: Vec<f64> = points.iter().map(SparseVec::norm_sq).collect();
        let mut centroids = init_plus_plus(points, &norms, dim, self.k, rng);
        let mut labels = vec![usize::MAX; points.len()];

        for _ in 0..MAX_ITER {
            if !assign(points, &norms, &centroids, &mut labels) {
                break;
            }
            update(points, &labels, &mut centroids);
        }
        assign(points, &norms, &centroids, &mut labels);

        let c_norms: Vec<f64> = centroids.iter().map(|c| dense_norm_sq(c)).collect();
        let inertia = points
            .iter()
            .zip(&labels)
            .zip(&norms)
            .map(|((p, &l), &pn)| dist_sq(p, pn, &centroids[l], c_norms[l]))
            .sum();

        Fit {
            labels,
            centroids,
            inertia,
        }
    }
}

fn init_plus_plus(
    points: &[SparseVec],
    norms: &[f64],
    dim: usize,
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f64>> {
    let n = points.len();
    let n_trials = 2 + (k as f64).ln() as usize;

    let first = rng.gen_range(0..n);
    let mut centroids = vec![points[first].to_dense(dim)];
    let c0 = dense_norm_sq(&centroids[0]);
    let mut closest: Vec<f64> = points
        .iter()
        .zip(norms)
        .map(|(p, &pn)| dist_sq(p, pn, &centroids[0], c0))
        .collect();

    while centroids.len() < k {
        let potential: f64 = closest.iter().sum();
        if potential <= 0.0 {
            // Every point already sits on a centroid; extras start as duplicates.
            let idx = rng.gen_range(0..n);
            centroids.push(points[idx].to_dense(dim));
            continue;
        }

        let mut best: Option<(usize, Vec<f64>, f64)> = None;
        for _ in 0..n_trials {
            let cand = sample_weighted(&closest, rng.gen::<f64>() * potential);
            let cand_dense = points[cand].to_dense(dim);
            let cand_norm = dense_norm_sq(&cand_dense);
            let next: Vec<f64> = points
                .iter()
                .zip(norms)
                .zip(&closest)
                .map(|((p, &pn), &c)| c.min(dist_sq(p, pn, &cand_dense, cand_norm)))
                .collect();
            let pot: f64 = next.iter().sum();
            if best.as_ref().map_or(true, |b| pot < b.2) {
                best = Some((cand, next, pot));
            }
        }

        if let Some((idx, next, _)) = best {
            centroids.push(points[idx].to_dense(dim));
            closest = next;
        }
    }
    centroids
}

/// Index whose cumulative weight first exceeds `target`.
fn sample_weighted(weights: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            last_positive = i;
        }
        acc += w;
        if acc > target && w > 0.0 {
            return i;
        }
    }
    last_positive
}

/// Nearest-centroid assignment; ties go to the lower index. Returns whether any label moved.
fn assign(points: &[SparseVec], norms: &[f64], centroids: &[Vec<f64>], labels: &mut [usize]) -> bool {
    let c_norms: Vec<f64> = centroids.iter().map(|c| dense_norm_sq(c)).collect();
    let mut changed = false;
    for ((p, &pn), label) in points.iter().zip(norms).zip(labels.iter_mut()) {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (j, c) in centroids.iter().enumerate() {
            let d = dist_sq(p, pn, c, c_norms[j]);
            if d < best_d {
                best_d = d;
                best = j;
            }
        }
        if *label != best {
            *label = best;
            changed = true;
        }
    }
    changed
}

/// Move each centroid to its members' mean. Empty clusters keep their centroid.
fn update(points: &[SparseVec], labels: &[usize], centroids: &mut [Vec<f64>]) {
    let dim = centroids.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];
    for (p, &l) in points.iter().zip(labels) {
        counts[l] += 1;
        for &(i, v) in &p.entries {
            sums[l][i] += v;
        }
    }
    for ((c, sum), &n) in centroids.iter_mut().zip(sums).zip(&counts) {
        if n > 0 {
            *c = sum.into_iter().map(|v| v / n as f64).collect();
        }
    }
}

fn dense_norm_sq(c: &[f64]) -> f64 {
    c.iter().map(|v| v * v).sum()
}

fn dist_sq(p: &SparseVec, p_norm: f64, c: &[f64], c_norm: f64) -> f64 {
    (p_norm - 2.0 * p.dot_dense(c) + c_norm).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(v: &[(usize, f64)]) -> SparseVec {
        SparseVec { entries: v.to_vec() }
    }

    #[test]
    fn separates_two_blobs() {
        let points = vec![
            pt(&[(0, 1.0)]),
            pt(&[(0, 0.9), (1, 0.1)]),
            pt(&[(2, 1.0)]),
            pt(&[(2, 0.95), (1, 0.05)]),
        ];
        let fit = KMeans::new(2, 5, 42).fit(&points, 3);
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[2], fit.labels[3]);
        assert_ne!(fit.labels[0], fit.labels[2]);
    }

    #[test]
    fn same_seed_same_labels() {
        let points: Vec<SparseVec> = (0..12)
            .map(|i| pt(&[(i % 4, 1.0), ((i + 1) % 4, 0.5)]))
            .collect();
        let a = KMeans::new(3, 10, 42).fit(&points, 4);
        let b = KMeans::new(3, 10, 42).fit(&points, 4);
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn more_clusters_than_points() {
        let points = vec![pt(&[(0, 1.0)]), pt(&[(1, 1.0)])];
        let fit = KMeans::new(5, 3, 42).fit(&points, 2);
        assert_eq!(fit.labels.len(), 2);
        assert!(fit.labels.iter().all(|&l| l < 5));
        assert_ne!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.centroids.len(), 5);
        assert!(fit.inertia.abs() < 1e-12);
    }

    #[test]
    fn identical_points() {
        let points = vec![pt(&[(0, 1.0)]); 4];
        let fit = KMeans::new(3, 2, 7).fit(&points, 1);
        assert!(fit.labels.iter().all(|&l| l == fit.labels[0]));
    }

    #[test]
    fn weighted_sampling_skips_zero_weights() {
        let w = [0.0, 2.0, 0.0, 1.0];
        assert_eq!(sample_weighted(&w, 0.0), 1);
        assert_eq!(sample_weighted(&w, 1.99), 1);
        assert_eq!(sample_weighted(&w, 2.5), 3);
        assert_eq!(sample_weighted(&w, 10.0), 3);
    }
}
