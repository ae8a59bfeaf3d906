use super::lloyds::{self, KMeans};
use super::{
    ClusteringError, ClusteringResult, Clusterer, InvalidKRangeSnafu, KMeansConfig,
    ZeroClustersSnafu, check_metric_dimensions, check_threshold, init, validate_dataset,
};
use crate::distance::Distance;
use rand::RngExt;
use snafu::ensure;
use tracing::{debug, warn};

/// Bayesian Information Criterion of `k` clusters over `n` points with the
/// given total within-cluster variance. Lower is better.
pub fn bic(within_variance: f64, n: usize, k: usize) -> f64 {
    let n = n as f64;
    n * (within_variance / n).ln() + k as f64 * n.ln()
}

/// Score of one cluster considered on its own: its variance and size, with
/// the penalty taken over the whole dataset.
pub fn cluster_bic(within_variance: f64, n: usize, total: usize) -> f64 {
    let n_f = n as f64;
    n_f * (within_variance / n_f).ln() + (total as f64).ln()
}

/// True when `new` is lower than `current` by more than `threshold`.
/// Thresholds strictly between 0 and 1 are fractions of `|current|`.
pub fn is_improvement(current: f64, new: f64, threshold: f64) -> bool {
    if !current.is_finite() {
        return new < current;
    }

    let margin = if threshold > 0.0 && threshold < 1.0 {
        threshold * current.abs()
    } else {
        threshold
    };
    current - new > margin
}

#[derive(Debug, Copy, Clone)]
pub struct XMeansConfig {
    pub min_k: usize,
    pub max_k: usize,
    /// Engine settings; `kmeans.k` always equals `min_k`.
    pub kmeans: KMeansConfig,
    /// A split is kept only if it lowers the BIC by more than this.
    /// Default: 0.
    pub split_threshold: f64,
    /// Stop once an accepted split lowers the BIC by no more than this.
    /// Default: 0.
    pub bic_threshold: f64,
}

impl XMeansConfig {
    pub fn new(min_k: usize, max_k: usize) -> Self {
        Self {
            min_k,
            max_k,
            kmeans: KMeansConfig::new(min_k),
            split_threshold: 0.0,
            bic_threshold: 0.0,
        }
    }

    #[must_use]
    pub fn with_kmeans(mut self, kmeans: KMeansConfig) -> Self {
        self.kmeans = KMeansConfig {
            k: self.min_k,
            ..kmeans
        };
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.kmeans.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_split_threshold(mut self, threshold: f64) -> Self {
        self.split_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_bic_threshold(mut self, threshold: f64) -> Self {
        self.bic_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.kmeans.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ClusteringError> {
        ensure!(self.min_k > 0, ZeroClustersSnafu);
        ensure!(
            self.min_k <= self.max_k,
            InvalidKRangeSnafu {
                min_k: self.min_k,
                max_k: self.max_k
            }
        );
        KMeansConfig {
            k: self.min_k,
            ..self.kmeans
        }
        .validate()?;
        check_threshold("split_threshold", self.split_threshold)?;
        check_threshold("bic_threshold", self.bic_threshold)?;
        Ok(())
    }
}

/// K-means that grows the number of clusters from `min_k` up to `max_k`,
/// splitting a cluster in two whenever that lowers the BIC.
#[derive(Debug, Clone)]
pub struct XMeans<D> {
    config: XMeansConfig,
    engine: KMeans<D>,
    splitter: KMeans<D>,
}

impl<D: Distance + Clone> XMeans<D> {
    pub fn new(config: XMeansConfig, metric: D) -> Result<Self, ClusteringError> {
        config.validate()?;

        let engine_config = KMeansConfig {
            k: config.min_k,
            ..config.kmeans
        };
        let engine = KMeans::new(engine_config, metric.clone())?;
        let splitter = KMeans::new(KMeansConfig { k: 2, ..engine_config }, metric)?;

        Ok(Self {
            config,
            engine,
            splitter,
        })
    }
}

struct Split {
    centroids: Vec<Vec<f64>>,
    assignments: Vec<usize>,
    bic: f64,
}

impl<D: Distance> XMeans<D> {
    pub fn config(&self) -> &XMeansConfig {
        &self.config
    }

    pub fn metric(&self) -> &D {
        self.engine.metric()
    }

    /// Cluster with the highest score on its own, among those with enough
    /// points to be split.
    fn split_candidate(
        &self,
        dataset: &[Vec<f64>],
        centroids: &[Vec<f64>],
        assignments: &[usize],
    ) -> Option<(usize, Vec<usize>)> {
        let metric = self.metric();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
        let mut variances = vec![0.0; centroids.len()];
        for (i, &label) in assignments.iter().enumerate() {
            let d = metric.distance(&dataset[i], &centroids[label]);
            variances[label] += d * d;
            members[label].push(i);
        }

        members
            .into_iter()
            .zip(variances)
            .enumerate()
            .filter(|(_, (members, _))| members.len() > 2)
            .map(|(i, (members, variance))| {
                (cluster_bic(variance, members.len(), dataset.len()), i, members)
            })
            .filter(|(score, _, _)| score.is_finite())
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, i, members)| (i, members))
    }

    /// Splits `candidate` with 2-means over its members and relabels the
    /// whole dataset against the grown centroid set.
    fn try_split(
        &self,
        rng: &mut impl RngExt,
        dataset: &[Vec<f64>],
        centroids: &[Vec<f64>],
        candidate: usize,
        members: &[usize],
    ) -> Result<Option<Split>, ClusteringError> {
        let points: Vec<Vec<f64>> = members.iter().map(|&i| dataset[i].clone()).collect();
        let children = self.splitter.transform_with_rng(&points, rng)?;
        if children.k() != 2 {
            return Ok(None);
        }

        let mut grown = centroids.to_vec();
        grown.splice(candidate..=candidate, children.centroids);

        let mut assignments = vec![0; dataset.len()];
        let metric = self.metric();
        let assignment = self.engine.config().assignment;
        lloyds::assign_points(dataset, &grown, metric, assignment, &mut assignments)?;

        // A centroid that attracts no points cannot lower the BIC honestly
        let mut counts = vec![0usize; grown.len()];
        for &label in &assignments {
            counts[label] += 1;
        }
        if counts.contains(&0) {
            return Ok(None);
        }

        let variance = lloyds::within_cluster_variance(dataset, &grown, &assignments, metric);
        Ok(Some(Split {
            bic: bic(variance, dataset.len(), grown.len()),
            centroids: grown,
            assignments,
        }))
    }
}

impl<D: Distance> Clusterer for XMeans<D> {
    fn seed(&self) -> u64 {
        self.config.kmeans.seed
    }

    fn transform_with_rng(
        &self,
        dataset: &[Vec<f64>],
        rng: &mut impl RngExt,
    ) -> Result<ClusteringResult, ClusteringError> {
        if self.config.min_k == self.config.max_k {
            return self.engine.transform_with_rng(dataset, rng);
        }
        let dimensions = validate_dataset(dataset, self.config.min_k)?;
        check_metric_dimensions(self.metric(), dimensions)?;

        let config = self.engine.config();
        let metric = self.metric();
        let n = dataset.len();

        let mut centroids = init::initial_centroids(rng, dataset, config.k, config.init, metric);
        let mut assignments = vec![0; n];
        let mut iterations = 0;

        let converged = loop {
            if iterations == config.max_iterations {
                break false;
            }
            iterations += 1;
            let k = centroids.len();

            lloyds::assign_points(dataset, &centroids, metric, config.assignment, &mut assignments)?;
            let update = lloyds::update_centroids(rng, dataset, k, &assignments, config.mean);
            let stable =
                lloyds::is_stable(&centroids, &update, metric, config.movement_threshold);
            centroids = update.centroids;

            if k == self.config.max_k {
                if stable {
                    break true;
                }
                continue;
            }

            let variance = lloyds::within_cluster_variance(dataset, &centroids, &assignments, metric);
            let current_bic = bic(variance, n, k);

            let Some((candidate, members)) = self.split_candidate(dataset, &centroids, &assignments)
            else {
                if stable {
                    break true;
                }
                continue;
            };

            let split = self.try_split(rng, dataset, &centroids, candidate, &members)?;
            let accepted = split
                .as_ref()
                .is_some_and(|s| is_improvement(current_bic, s.bic, self.config.split_threshold));
            debug!(
                iteration = iterations,
                k,
                candidate,
                bic = current_bic,
                split_bic = split.as_ref().map(|s| s.bic),
                accepted,
                "split evaluation"
            );

            match split {
                Some(split) if accepted => {
                    centroids = split.centroids;
                    assignments = split.assignments;
                    if !is_improvement(current_bic, split.bic, self.config.bic_threshold) {
                        break true;
                    }
                }
                _ => {
                    if stable {
                        break true;
                    }
                }
            }
        };

        if !converged {
            warn!(
                max_iterations = config.max_iterations,
                k = centroids.len(),
                "x-means did not converge within the iteration budget"
            );
        }

        lloyds::finish(dataset, centroids, config, metric, iterations, converged)
    }
}
