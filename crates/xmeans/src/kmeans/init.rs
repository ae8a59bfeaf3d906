use super::{Init, arithmetic_mean};
use crate::distance::Distance;
use rand::RngExt;
use std::array;

// Scikit uses (2+log(k)), 3 is plenty for the small k used here
const N_CANDIDATES: usize = 3;

/// Initial centroids for `k` clusters. Assumes `k < dataset.len()`.
pub fn initial_centroids<D: Distance + ?Sized>(
    rng: &mut impl RngExt,
    dataset: &[Vec<f64>],
    k: usize,
    init: Init,
    metric: &D,
) -> Vec<Vec<f64>> {
    match init {
        Init::NaiveSharding => naive_sharding(dataset, k),
        Init::Random => random_distinct(rng, dataset.len(), k)
            .into_iter()
            .map(|i| dataset[i].clone())
            .collect(),
        Init::PlusPlus => plus_plus(rng, dataset, k, metric)
            .into_iter()
            .map(|i| dataset[i].clone())
            .collect(),
    }
}

/// Splits the dataset in order into `k` shards of `n / k` points (the last
/// one takes the remainder) and returns the mean of each shard.
pub fn naive_sharding(dataset: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let n = dataset.len();
    assert!(k > 0 && k <= n);

    let step = n / k;
    (0..k)
        .map(|i| {
            let start = step * i;
            let end = if i + 1 == k { n } else { step * (i + 1) };
            let shard: Vec<&[f64]> = dataset[start..end].iter().map(Vec::as_slice).collect();
            arithmetic_mean(&shard)
        })
        .collect()
}

/// `k` distinct indices in `0..n`, in the order they were drawn.
pub fn random_distinct(rng: &mut impl RngExt, n: usize, k: usize) -> Vec<usize> {
    assert!(k <= n);

    let mut picked = Vec::with_capacity(k);
    while picked.len() < k {
        let index = rng.random_range(0..n);
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    picked
}

#[inline(always)]
fn sample_by_weight(rng: &mut impl RngExt, weights: &[f64], sum: f64) -> usize {
    let random_threshold = rng.random::<f64>() * sum;
    let mut cumsum = 0.0;

    for (i, &weight) in weights.iter().enumerate() {
        cumsum += weight;
        if cumsum > random_threshold {
            return i;
        }
    }

    weights.len() - 1
}

/// Greedy k-means++: each step samples several candidates with probability
/// proportional to their squared distance from the chosen set, and keeps
/// the one that minimises the total potential.
pub fn plus_plus<D: Distance + ?Sized>(
    rng: &mut impl RngExt,
    dataset: &[Vec<f64>],
    k: usize,
    metric: &D,
) -> Vec<usize> {
    let n = dataset.len();

    // More clusters than points => silent clamping
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }

    let squared = |a: &[f64], b: &[f64]| {
        let d = metric.distance(a, b);
        d * d
    };

    let mut init_points = Vec::with_capacity(k);
    let c0 = rng.random_range(0..n);
    init_points.push(c0);

    let mut min_distances: Vec<f64> = dataset.iter().map(|p| squared(p, &dataset[c0])).collect();
    let mut min_distances_sum: f64 = min_distances.iter().sum();

    let mut candidate_min_distances: [_; N_CANDIDATES] = array::from_fn(|_| vec![0.0f64; n]);

    for _ in 1..k {
        let mut candidates = [0usize; N_CANDIDATES];
        for candidate in candidates.iter_mut() {
            *candidate = sample_by_weight(rng, &min_distances, min_distances_sum);
        }

        let mut potentials = [0.0f64; N_CANDIDATES];
        for (j, &candidate) in candidates.iter().enumerate() {
            let centre = &dataset[candidate];
            let slot = &mut candidate_min_distances[j];
            for (i, point) in dataset.iter().enumerate() {
                let d = squared(point, centre).min(min_distances[i]);
                slot[i] = d;
                potentials[j] += d;
            }
        }

        let mut best_potential = f64::INFINITY;
        let mut best = 0;
        for (i, potential) in potentials.iter().copied().enumerate() {
            if potential < best_potential {
                best_potential = potential;
                best = i;
            }
        }

        std::mem::swap(&mut min_distances, &mut candidate_min_distances[best]);
        min_distances_sum = best_potential;
        init_points.push(candidates[best]);
    }

    init_points
}
