//! Internal validity indices for a finished clustering.
//!
//! Every function reads the dataset the result was computed on and measures
//! distances with the caller's metric, so a palette clustered under
//! CIEDE2000 is also scored under CIEDE2000.
//!
//! References:
//! - Rousseeuw, "Silhouettes: a graphical aid to the interpretation and
//!   validation of cluster analysis" (1987)
//! - Davies, Bouldin, "A Cluster Separation Measure" (1979)
//! - Calinski, Harabasz, "A dendrite method for cluster analysis" (1974)

use crate::distance::Distance;
use crate::kmeans::{ClusteringResult, arithmetic_mean};

fn mean_distance_to<'a, D: Distance + ?Sized>(
    point: &[f64],
    others: impl Iterator<Item = &'a [f64]>,
    metric: &D,
) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for other in others {
        total += metric.distance(point, other);
        count += 1;
    }
    (count > 0).then(|| total / count as f64)
}

fn silhouette_coefficient(a: f64, b: f64) -> f64 {
    let max_ab = a.max(b);
    if max_ab == 0.0 { 0.0 } else { (b - a) / max_ab }
}

/// Silhouette coefficient of every dataset point, in `-1..=1`.
///
/// Points in singleton clusters score 0, as does everything when there is
/// only one cluster.
pub fn silhouette<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> Vec<f64> {
    let mut scores = vec![0.0; dataset.len()];
    if result.k() < 2 {
        return scores;
    }

    for (c, cluster) in result.clusters.iter().enumerate() {
        if cluster.members.len() < 2 {
            continue;
        }
        for &i in &cluster.members {
            let point = &dataset[i];
            let own = cluster
                .members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| dataset[j].as_slice());
            let a = mean_distance_to(point, own, metric).unwrap_or(0.0);

            let b = (0..result.k())
                .filter(|&other| other != c)
                .filter_map(|other| {
                    mean_distance_to(point, result.cluster_points(dataset, other), metric)
                })
                .fold(f64::INFINITY, f64::min);

            scores[i] = silhouette_coefficient(a, b);
        }
    }

    scores
}

/// Mean of [`silhouette`]. Higher is better.
pub fn silhouette_score<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> f64 {
    let scores = silhouette(dataset, result, metric);
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Average distance from each centroid to its members.
pub fn mean_distance_within_clusters<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> Vec<f64> {
    (0..result.k())
        .map(|c| {
            mean_distance_to(
                &result.centroids[c],
                result.cluster_points(dataset, c),
                metric,
            )
            .unwrap_or(0.0)
        })
        .collect()
}

/// Average distance from each centroid to every other centroid. A lone
/// centroid gets 0.
pub fn mean_distance_between_centroids<D: Distance + ?Sized>(
    result: &ClusteringResult,
    metric: &D,
) -> Vec<f64> {
    let centroids = &result.centroids;
    (0..centroids.len())
        .map(|i| {
            let others = centroids
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, c)| c.as_slice());
            mean_distance_to(&centroids[i], others, metric).unwrap_or(0.0)
        })
        .collect()
}

/// Davies-Bouldin index of every cluster: the worst ratio of combined
/// scatter to centroid separation against any other cluster. Lower is
/// better; 0 means compact, separated clusters.
///
/// Two clusters with zero scatter contribute 0 even if their centroids
/// coincide. Coincident centroids with some scatter give infinity.
pub fn davies_bouldin<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> Vec<f64> {
    let k = result.k();
    let scatter = mean_distance_within_clusters(dataset, result, metric);

    (0..k)
        .map(|i| {
            (0..k)
                .filter(|&j| j != i)
                .map(|j| {
                    let spread = scatter[i] + scatter[j];
                    if spread == 0.0 {
                        return 0.0;
                    }
                    spread / metric.distance(&result.centroids[i], &result.centroids[j])
                })
                .fold(0.0, f64::max)
        })
        .collect()
}

/// Mean of [`davies_bouldin`].
pub fn davies_bouldin_score<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> f64 {
    let scores = davies_bouldin(dataset, result, metric);
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Calinski-Harabasz variance ratio: between-cluster over within-cluster
/// dispersion (squared metric distances), each divided by its degrees of
/// freedom. Higher is better.
///
/// `None` when there is a single cluster or one cluster per point.
pub fn calinski_harabasz<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    result: &ClusteringResult,
    metric: &D,
) -> Option<f64> {
    let n = dataset.len();
    let k = result.k();
    if k < 2 || k >= n {
        return None;
    }

    let squared = |a: &[f64], b: &[f64]| {
        let d = metric.distance(a, b);
        d * d
    };

    let all: Vec<&[f64]> = dataset.iter().map(Vec::as_slice).collect();
    let overall = arithmetic_mean(&all);

    let mut between = 0.0;
    let mut within = 0.0;
    for (c, cluster) in result.clusters.iter().enumerate() {
        let centroid = &result.centroids[c];
        between += cluster.members.len() as f64 * squared(centroid, &overall);
        within += result
            .cluster_points(dataset, c)
            .map(|p| squared(p, centroid))
            .sum::<f64>();
    }

    Some((between / (k - 1) as f64) / (within / (n - k) as f64))
}
