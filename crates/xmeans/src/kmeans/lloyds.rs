use super::{
    Assignment, Cluster, ClusteringError, ClusteringResult, Clusterer, KMeansConfig, MeanFn,
    SpatialIndexSnafu, check_metric_dimensions, init, validate_dataset,
};
use crate::distance::Distance;
use crate::kdtree::KdTree;
use rand::RngExt;
use snafu::ResultExt;
use tracing::{debug, warn};

/// Labels every point with the index of its nearest centroid. Linear scans
/// keep the first centroid on ties.
pub fn assign_points<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    centroids: &[Vec<f64>],
    metric: &D,
    assignment: Assignment,
    assignments: &mut [usize],
) -> Result<(), ClusteringError> {
    debug_assert_eq!(dataset.len(), assignments.len());
    debug_assert!(!centroids.is_empty());

    match assignment {
        Assignment::Linear => {
            for (point, label) in dataset.iter().zip(assignments.iter_mut()) {
                let mut min = f64::INFINITY;
                let mut min_idx = 0;
                for (j, centroid) in centroids.iter().enumerate() {
                    let d = metric.distance(point, centroid);
                    if d < min {
                        min = d;
                        min_idx = j;
                    }
                }
                *label = min_idx;
            }
        }
        Assignment::KdTree => {
            let ids: Vec<usize> = (0..centroids.len()).collect();
            let dimensions = (0..centroids[0].len()).collect();
            let tree =
                KdTree::build(centroids, &ids, dimensions, metric).context(SpatialIndexSnafu)?;

            for (point, label) in dataset.iter().zip(assignments.iter_mut()) {
                if let Some(nearest) = tree.nearest(point, 1, None).first() {
                    *label = nearest.id;
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug)]
pub struct Update {
    pub centroids: Vec<Vec<f64>>,
    pub counts: Vec<usize>,
    /// Clusters that got no points and were given a random dataset point
    /// as their new centroid.
    pub reseeded: Vec<usize>,
}

/// Recomputes each of the `k` centroids from its members.
pub fn update_centroids(
    rng: &mut impl RngExt,
    dataset: &[Vec<f64>],
    k: usize,
    assignments: &[usize],
    mean: MeanFn,
) -> Update {
    let mut members: Vec<Vec<&[f64]>> = vec![Vec::new(); k];
    for (point, &label) in dataset.iter().zip(assignments) {
        assert!(label < k);
        members[label].push(point);
    }

    let mut reseeded = Vec::new();
    let counts = members.iter().map(Vec::len).collect();
    let centroids = members
        .iter()
        .enumerate()
        .map(|(i, points)| {
            if points.is_empty() {
                let random_point = rng.random_range(0..dataset.len());
                debug!(cluster = i, point = random_point, "reseeding empty cluster");
                reseeded.push(i);
                dataset[random_point].clone()
            } else {
                mean(points)
            }
        })
        .collect();

    Update {
        centroids,
        counts,
        reseeded,
    }
}

/// Largest distance any centroid moved between two sets of equal size.
pub fn max_movement<D: Distance + ?Sized>(old: &[Vec<f64>], new: &[Vec<f64>], metric: &D) -> f64 {
    old.iter()
        .zip(new)
        .map(|(a, b)| metric.distance(a, b))
        .fold(0.0, f64::max)
}

/// Exact equality, or all movements within `threshold` when one is given.
pub fn has_converged<D: Distance + ?Sized>(
    old: &[Vec<f64>],
    new: &[Vec<f64>],
    metric: &D,
    threshold: Option<f64>,
) -> bool {
    old.len() == new.len()
        && (old == new || threshold.is_some_and(|t| max_movement(old, new, metric) <= t))
}

/// Whether `update` leaves the centroids where they were.
///
/// A reseeded centroid counts as settled only when it landed exactly on its
/// previous position, which happens once every point it could take is
/// already a centroid.
pub fn is_stable<D: Distance + ?Sized>(
    old: &[Vec<f64>],
    update: &Update,
    metric: &D,
    threshold: Option<f64>,
) -> bool {
    has_converged(old, &update.centroids, metric, threshold)
        && update.reseeded.iter().all(|&i| old[i] == update.centroids[i])
}

/// Sum of squared metric distances from every point to its centroid.
pub fn within_cluster_variance<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    centroids: &[Vec<f64>],
    assignments: &[usize],
    metric: &D,
) -> f64 {
    dataset
        .iter()
        .zip(assignments)
        .map(|(point, &label)| {
            let d = metric.distance(point, &centroids[label]);
            d * d
        })
        .sum()
}

/// Member farthest from its centroid, among clusters holding more than one
/// distinct point. Returns the cluster and the member's position in it.
fn farthest_member<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    members: &[Vec<usize>],
    means: &[Vec<f64>],
    metric: &D,
) -> Option<(usize, usize)> {
    let mut farthest = None;
    let mut max_distance = f64::NEG_INFINITY;
    for (c, cluster) in members.iter().enumerate() {
        let Some(&first) = cluster.first() else {
            continue;
        };
        if cluster.iter().all(|&i| dataset[i] == dataset[first]) {
            continue;
        }
        for (slot, &i) in cluster.iter().enumerate() {
            let d = metric.distance(&dataset[i], &means[c]);
            if d > max_distance {
                max_distance = d;
                farthest = Some((c, slot));
            }
        }
    }
    farthest
}

/// Relabels against the final centroids and recomputes each centroid from
/// its members.
///
/// A cluster left empty takes the point farthest from its centroid out of a
/// cluster that still holds two distinct points. Only when no such cluster
/// remains, i.e. the dataset has fewer distinct points than clusters, are
/// empty clusters dropped.
pub(crate) fn finish<D: Distance + ?Sized>(
    dataset: &[Vec<f64>],
    centroids: Vec<Vec<f64>>,
    config: &KMeansConfig,
    metric: &D,
    iterations: usize,
    converged: bool,
) -> Result<ClusteringResult, ClusteringError> {
    let mut assignments = vec![0; dataset.len()];
    assign_points(dataset, &centroids, metric, config.assignment, &mut assignments)?;

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
    for (i, &label) in assignments.iter().enumerate() {
        members[label].push(i);
    }

    let mean_of = |members: &[usize]| {
        let points: Vec<&[f64]> = members.iter().map(|&i| dataset[i].as_slice()).collect();
        (config.mean)(&points)
    };
    let mut means: Vec<Vec<f64>> = members
        .iter()
        .zip(&centroids)
        .map(|(m, c)| if m.is_empty() { c.clone() } else { mean_of(m) })
        .collect();

    while let Some(empty) = members.iter().position(Vec::is_empty) {
        let Some((donor, slot)) = farthest_member(dataset, &members, &means, metric) else {
            break;
        };
        let point = members[donor].remove(slot);
        means[donor] = mean_of(&members[donor]);
        debug!(cluster = empty, donor, point, "refilling empty cluster");

        members[empty].push(point);
        means[empty] = dataset[point].clone();
        assignments[point] = empty;
    }

    let mut remap = vec![usize::MAX; centroids.len()];
    let mut clusters = Vec::with_capacity(centroids.len());
    for (old, (members, centroid)) in members.into_iter().zip(means).enumerate() {
        if members.is_empty() {
            debug!(cluster = old, "dropping empty cluster");
            continue;
        }
        remap[old] = clusters.len();
        clusters.push(Cluster { centroid, members });
    }

    for label in &mut assignments {
        *label = remap[*label];
    }

    Ok(ClusteringResult {
        centroids: clusters.iter().map(|c| c.centroid.clone()).collect(),
        clusters,
        assignments,
        iterations,
        converged,
    })
}

/// Runs Lloyd's iterations from the given centroids.
pub(crate) fn lloyds_loop<D: Distance + ?Sized>(
    rng: &mut impl RngExt,
    dataset: &[Vec<f64>],
    mut centroids: Vec<Vec<f64>>,
    config: &KMeansConfig,
    metric: &D,
) -> Result<ClusteringResult, ClusteringError> {
    let k = centroids.len();
    let mut assignments = vec![0; dataset.len()];
    let mut iterations = 0;

    let converged = loop {
        if iterations == config.max_iterations {
            break false;
        }
        iterations += 1;

        assign_points(dataset, &centroids, metric, config.assignment, &mut assignments)?;
        let update = update_centroids(rng, dataset, k, &assignments, config.mean);

        let stable = is_stable(&centroids, &update, metric, config.movement_threshold);
        debug!(
            iteration = iterations,
            k,
            movement = max_movement(&centroids, &update.centroids, metric),
            "lloyds iteration"
        );

        centroids = update.centroids;
        if stable {
            break true;
        }
    };

    if !converged {
        warn!(
            max_iterations = config.max_iterations,
            k, "k-means did not converge within the iteration budget"
        );
    }

    finish(dataset, centroids, config, metric, iterations, converged)
}

/// Plain K-means with a fixed number of clusters.
#[derive(Debug, Clone)]
pub struct KMeans<D> {
    config: KMeansConfig,
    metric: D,
}

impl<D: Distance> KMeans<D> {
    pub fn new(config: KMeansConfig, metric: D) -> Result<Self, ClusteringError> {
        config.validate()?;
        Ok(Self { config, metric })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    pub fn metric(&self) -> &D {
        &self.metric
    }
}

impl<D: Distance> Clusterer for KMeans<D> {
    fn seed(&self) -> u64 {
        self.config.seed
    }

    fn transform_with_rng(
        &self,
        dataset: &[Vec<f64>],
        rng: &mut impl RngExt,
    ) -> Result<ClusteringResult, ClusteringError> {
        let dimensions = validate_dataset(dataset, self.config.k)?;
        check_metric_dimensions(&self.metric, dimensions)?;

        let centroids =
            init::initial_centroids(rng, dataset, self.config.k, self.config.init, &self.metric);
        lloyds_loop(rng, dataset, centroids, &self.config, &self.metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{Euclidean, SquaredEuclidean};
    use crate::kmeans::{ErrorKind, Init, arithmetic_mean};
    use crate::rng;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const N_PER_CLUSTER: usize = 64;
    const CENTERS: [[f64; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [10.0, 0.0, 0.0],
        [0.0, 10.0, 0.0],
        [0.0, 0.0, 10.0],
    ];

    fn make_four_clusters() -> Vec<Vec<f64>> {
        let mut dataset = Vec::with_capacity(N_PER_CLUSTER * CENTERS.len());
        for center in CENTERS {
            for i in 0..N_PER_CLUSTER {
                let offset = i as f64 * 0.001;
                dataset.push(center.iter().map(|c| c + offset).collect());
            }
        }
        dataset
    }

    fn random_dataset(rng: &mut impl RngExt, n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| vec![rng.random_range(0.0..100.0), rng.random_range(0.0..100.0)])
            .collect()
    }

    #[test]
    fn two_obvious_clusters() {
        let dataset = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![10.0, 0.0],
            vec![10.0, 1.0],
        ];
        let kmeans = KMeans::new(KMeansConfig::new(2).with_max_iterations(10), Euclidean).unwrap();
        let result = kmeans.transform(&dataset).unwrap();

        assert!(result.converged);
        assert!(result.iterations <= 10);
        assert_eq!(result.centroids, vec![vec![0.0, 0.5], vec![10.0, 0.5]]);
        assert_eq!(result.clusters[0].members, vec![0, 1]);
        assert_eq!(result.clusters[1].members, vec![2, 3]);
        assert_eq!(result.assignments, vec![0, 0, 1, 1]);
    }

    #[test]
    fn assign_points_linear_and_kdtree_agree() {
        let dataset = make_four_clusters();
        let centroids: Vec<Vec<f64>> = CENTERS.iter().map(|c| c.to_vec()).collect();

        let mut linear = vec![0; dataset.len()];
        assign_points(&dataset, &centroids, &Euclidean, Assignment::Linear, &mut linear).unwrap();
        let mut kdtree = vec![0; dataset.len()];
        assign_points(&dataset, &centroids, &Euclidean, Assignment::KdTree, &mut kdtree).unwrap();

        let expected: Vec<usize> = (0..dataset.len()).map(|i| i / N_PER_CLUSTER).collect();
        assert_eq!(linear, expected);
        assert_eq!(kdtree, expected);
    }

    #[test]
    fn linear_assignment_keeps_first_on_ties() {
        let dataset = vec![vec![5.0]];
        let centroids = vec![vec![0.0], vec![10.0]];
        let mut assignments = vec![usize::MAX];
        assign_points(&dataset, &centroids, &Euclidean, Assignment::Linear, &mut assignments)
            .unwrap();
        assert_eq!(assignments, vec![0]);
    }

    #[test]
    fn update_centroids_means_and_counts() {
        let dataset = make_four_clusters();
        let assignments: Vec<usize> = (0..dataset.len()).map(|i| i / N_PER_CLUSTER).collect();

        let update = update_centroids(&mut rng::new(), &dataset, 4, &assignments, arithmetic_mean);

        assert_eq!(update.counts, vec![N_PER_CLUSTER; 4]);
        assert!(update.reseeded.is_empty());
        // Offsets are 0..64 * 0.001, so the mean offset is 0.0315
        for (centroid, center) in update.centroids.iter().zip(CENTERS) {
            for (c, expected) in centroid.iter().zip(center) {
                assert!((c - expected - 0.0315).abs() < 1e-9, "got {c}, expected ~{expected}");
            }
        }
    }

    #[test]
    fn empty_cluster_is_reseeded_from_dataset() {
        let dataset = vec![vec![0.0], vec![1.0], vec![2.0]];
        let assignments = vec![0, 0, 0];

        let update = update_centroids(&mut rng::new(), &dataset, 2, &assignments, arithmetic_mean);

        assert_eq!(update.counts, vec![3, 0]);
        assert_eq!(update.reseeded, vec![1]);
        assert_eq!(update.centroids[0], vec![1.0]);
        assert!(dataset.contains(&update.centroids[1]));
    }

    #[test]
    fn convergence_rule() {
        let a = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let b = vec![vec![0.0, 0.0], vec![1.0, 1.5]];

        assert!(has_converged(&a, &a, &Euclidean, None));
        assert!(!has_converged(&a, &b, &Euclidean, None));
        assert!(has_converged(&a, &b, &Euclidean, Some(0.5)));
        assert!(!has_converged(&a, &b, &Euclidean, Some(0.4)));
        assert!(!has_converged(&a, &a[..1], &Euclidean, Some(10.0)));
        assert_eq!(max_movement(&a, &b, &Euclidean), 0.5);
    }

    #[test]
    fn variance_is_non_increasing() {
        let mut rng = rng::from_seed(7);
        let dataset = random_dataset(&mut rng, 300);
        let k = 5;

        let mut centroids = init::naive_sharding(&dataset, k);
        let mut assignments = vec![0; dataset.len()];
        let mut previous = f64::INFINITY;

        for _ in 0..30 {
            assign_points(&dataset, &centroids, &Euclidean, Assignment::Linear, &mut assignments)
                .unwrap();
            let update = update_centroids(&mut rng, &dataset, k, &assignments, arithmetic_mean);
            centroids = update.centroids;

            if !update.reseeded.is_empty() {
                previous = f64::INFINITY;
                continue;
            }
            let variance = within_cluster_variance(&dataset, &centroids, &assignments, &Euclidean);
            assert!(
                variance <= previous + 1e-9,
                "variance went up: {previous} -> {variance}"
            );
            previous = variance;
        }
    }

    #[test]
    fn seeded_runs_are_identical() {
        let dataset = random_dataset(&mut rng::from_seed(11), 200);
        for init in [Init::NaiveSharding, Init::Random, Init::PlusPlus] {
            let kmeans = KMeans::new(KMeansConfig::new(4).with_init(init).with_seed(99), Euclidean)
                .unwrap();
            assert_eq!(kmeans.transform(&dataset).unwrap(), kmeans.transform(&dataset).unwrap());
        }
    }

    #[test]
    fn kdtree_assignment_matches_linear() {
        let dataset = random_dataset(&mut rng::from_seed(3), 250);
        let linear = KMeans::new(KMeansConfig::new(6), SquaredEuclidean).unwrap();
        let kdtree =
            KMeans::new(KMeansConfig::new(6).with_assignment(Assignment::KdTree), SquaredEuclidean)
                .unwrap();

        let a = linear.transform(&dataset).unwrap();
        let b = kdtree.transform(&dataset).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn iteration_budget_exhausted() {
        let dataset = random_dataset(&mut rng::from_seed(5), 500);
        let config = KMeansConfig::new(8)
            .with_init(Init::PlusPlus)
            .with_max_iterations(1);
        let kmeans = KMeans::new(config, Euclidean).unwrap();
        let result = kmeans.transform(&dataset).unwrap();

        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
    }

    #[test]
    fn movement_threshold_stops_early() {
        let dataset = random_dataset(&mut rng::from_seed(5), 500);
        let exact = KMeans::new(KMeansConfig::new(8).with_init(Init::PlusPlus), Euclidean)
            .unwrap()
            .transform(&dataset)
            .unwrap();
        let loose = KMeans::new(
            KMeansConfig::new(8)
                .with_init(Init::PlusPlus)
                .with_movement_threshold(1e6),
            Euclidean,
        )
        .unwrap()
        .transform(&dataset)
        .unwrap();

        assert!(loose.converged);
        assert_eq!(loose.iterations, 1);
        assert!(loose.iterations <= exact.iterations);
    }

    #[test]
    fn too_few_points_fails_before_running() {
        let dataset = vec![vec![0.0], vec![1.0], vec![2.0]];
        let err = KMeans::new(KMeansConfig::new(5), Euclidean)
            .unwrap()
            .transform(&dataset)
            .unwrap_err();
        assert_eq!(err, ClusteringError::TooFewPoints { len: 3, k: 5 });
        assert_eq!(err.kind(), ErrorKind::InvalidDataset);
    }

    #[test]
    fn duplicate_points_never_yield_empty_clusters() {
        let dataset = vec![vec![1.0, 1.0]; 6];
        let result = KMeans::new(KMeansConfig::new(3).with_init(Init::Random), Euclidean)
            .unwrap()
            .transform(&dataset)
            .unwrap();

        assert!(result.clusters.iter().all(|c| !c.members.is_empty()));
        assert_eq!(result.clusters.iter().map(|c| c.members.len()).sum::<usize>(), 6);
    }

    #[test]
    fn reseed_onto_its_own_position_is_settled() {
        let old = vec![vec![0.0], vec![5.0]];
        let update = Update {
            centroids: vec![vec![0.0], vec![5.0]],
            counts: vec![4, 0],
            reseeded: vec![1],
        };
        assert!(is_stable(&old, &update, &Euclidean, None));

        let moved = Update {
            centroids: vec![vec![0.0], vec![1.0]],
            counts: vec![4, 0],
            reseeded: vec![1],
        };
        assert!(!is_stable(&old, &moved, &Euclidean, Some(10.0)));
    }

    #[test]
    fn identical_points_converge() {
        let dataset = vec![vec![0.1, 53.2, -0.7]; 10];
        let result = KMeans::new(KMeansConfig::new(3), Euclidean)
            .unwrap()
            .transform(&dataset)
            .unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.k(), 1);
    }

    #[test]
    fn budget_exhaustion_keeps_every_cluster() {
        let dataset: Vec<Vec<f64>> = [
            [2, 2],
            [2, 1],
            [3, 1],
            [2, 1],
            [2, 0],
            [3, 3],
            [0, 1],
            [0, 1],
            [2, 3],
        ]
        .iter()
        .map(|p| p.iter().map(|&v| v as f64).collect())
        .collect();

        for seed in 0..2000 {
            let config = KMeansConfig::new(3).with_max_iterations(2).with_seed(seed);
            let result = KMeans::new(config, Euclidean)
                .unwrap()
                .transform(&dataset)
                .unwrap();
            assert_eq!(result.k(), 3, "seed {seed}");
            assert!(result.clusters.iter().all(|c| !c.members.is_empty()));
        }
    }

    #[test]
    fn empty_clusters_are_refilled_from_the_widest_cluster() {
        let dataset = vec![vec![0.0], vec![4.0], vec![5.0], vec![6.0]];
        // The second centroid attracts nothing
        let centroids = vec![vec![5.0], vec![100.0]];
        let config = KMeansConfig::new(2);
        let result = finish(&dataset, centroids, &config, &Euclidean, 1, false).unwrap();

        assert_eq!(result.k(), 2);
        assert_eq!(result.clusters[0].members, vec![1, 2, 3]);
        assert_eq!(result.clusters[0].centroid, vec![5.0]);
        assert_eq!(result.clusters[1].members, vec![0]);
        assert_eq!(result.clusters[1].centroid, vec![0.0]);
        assert_eq!(result.assignments, vec![1, 0, 0, 0]);
    }

    #[test]
    fn closure_metric() {
        let manhattan =
            |a: &[f64], b: &[f64]| -> f64 { a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum() };
        let dataset = make_four_clusters();
        let result = KMeans::new(KMeansConfig::new(4).with_init(Init::PlusPlus), manhattan)
            .unwrap()
            .transform(&dataset)
            .unwrap();
        assert_eq!(result.k(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_point_in_exactly_one_cluster(
            grid in prop::collection::vec(prop::collection::vec(-3i32..3, 2), 7..60),
            k in 1usize..7,
            max_iterations in 1usize..4,
            seed in any::<u64>(),
        ) {
            let distinct = grid.iter().collect::<BTreeSet<_>>().len();
            let dataset: Vec<Vec<f64>> = grid
                .iter()
                .map(|p| p.iter().map(|&v| v as f64).collect())
                .collect();
            let config = KMeansConfig::new(k)
                .with_init(Init::Random)
                .with_max_iterations(max_iterations)
                .with_seed(seed);
            let result = KMeans::new(config, Euclidean).unwrap().transform(&dataset).unwrap();

            // Exactly k whenever there are enough distinct points
            prop_assert!(
                result.k() >= k.min(distinct),
                "k = {}, distinct = {}",
                result.k(),
                distinct
            );
            prop_assert!(result.k() <= k);
            let mut seen = vec![0usize; dataset.len()];
            for (c, cluster) in result.clusters.iter().enumerate() {
                prop_assert!(!cluster.members.is_empty());
                for &i in &cluster.members {
                    seen[i] += 1;
                    prop_assert_eq!(result.assignments[i], c);
                }
            }
            prop_assert!(seen.iter().all(|&s| s == 1));
        }
    }
}
