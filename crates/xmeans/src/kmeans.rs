use crate::distance::Distance;
use crate::kdtree::KdTreeError;
use crate::rng;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub mod adaptive;
pub mod init;
pub mod lloyds;

// References:
// - X-means: Extending K-means with Efficient Estimation of the Number of
//   Clusters (D. Pelleg, A. Moore)
//   https://www.cs.cmu.edu/~dpelleg/download/xmeans.pdf
// - Noisy, Greedy and Not so Greedy k-Means++ (A. Bhattacharya et al)
//   https://drops.dagstuhl.de/storage/00lipics/lipics-vol173-esa2020/LIPIcs.ESA.2020.18/LIPIcs.ESA.2020.18.pdf

pub const DEFAULT_MAX_ITERATIONS: usize = 300;

#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ClusteringError {
    #[snafu(display("dataset is empty"))]
    EmptyDataset,

    #[snafu(display("point {index} has no components"))]
    EmptyPoint { index: usize },

    #[snafu(display("point {index} has {found} components, expected {expected}"))]
    RaggedDataset {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[snafu(display("point {index} has a non-finite component"))]
    NonFiniteValue { index: usize },

    #[snafu(display("dataset must have more than {k} points, got {len}"))]
    TooFewPoints { len: usize, k: usize },

    #[snafu(display("points have {found} components, the distance metric needs {expected}"))]
    UnsupportedDimensions { expected: usize, found: usize },

    #[snafu(display("the number of clusters must be positive"))]
    ZeroClusters,

    #[snafu(display("min_k ({min_k}) must not exceed max_k ({max_k})"))]
    InvalidKRange { min_k: usize, max_k: usize },

    #[snafu(display("max_iterations must be positive"))]
    ZeroIterations,

    #[snafu(display("{name} must be a finite non-negative number, got {value}"))]
    InvalidThreshold { name: &'static str, value: f64 },

    #[snafu(display("spatial index failed: {source}"))]
    SpatialIndex { source: KdTreeError },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidDataset,
    InvalidConfiguration,
    SpatialIndex,
}

impl ClusteringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusteringError::EmptyDataset
            | ClusteringError::EmptyPoint { .. }
            | ClusteringError::RaggedDataset { .. }
            | ClusteringError::NonFiniteValue { .. }
            | ClusteringError::TooFewPoints { .. }
            | ClusteringError::UnsupportedDimensions { .. } => ErrorKind::InvalidDataset,
            ClusteringError::ZeroClusters
            | ClusteringError::InvalidKRange { .. }
            | ClusteringError::ZeroIterations
            | ClusteringError::InvalidThreshold { .. } => ErrorKind::InvalidConfiguration,
            ClusteringError::SpatialIndex { .. } => ErrorKind::SpatialIndex,
        }
    }
}

/// Recomputes a centroid from the points assigned to it. Never called with
/// an empty slice.
pub type MeanFn = fn(&[&[f64]]) -> Vec<f64>;

/// Running mean, so identical points average to exactly themselves.
pub fn arithmetic_mean(points: &[&[f64]]) -> Vec<f64> {
    let mut mean = vec![0.0; points[0].len()];
    for (count, point) in points.iter().enumerate() {
        let count = (count + 1) as f64;
        for (m, v) in mean.iter_mut().zip(point.iter()) {
            *m += (v - *m) / count;
        }
    }
    mean
}

/// How the first centroids are picked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Init {
    /// Split the dataset, in order, into `k` contiguous shards and average
    /// each one. Deterministic.
    #[default]
    NaiveSharding,
    /// `k` distinct random points.
    Random,
    /// Greedy k-means++.
    PlusPlus,
}

/// How points find their nearest centroid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Assignment {
    /// Compare against every centroid.
    #[default]
    Linear,
    /// Query a KD-tree built over the centroids each iteration.
    KdTree,
}

#[derive(Debug, Copy, Clone)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub k: usize,
    /// Upper bound on relabel/recenter passes. Default: 300.
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this (by the distance
    /// metric). `None` stops only when centroids stop changing. Default:
    /// `None`.
    pub movement_threshold: Option<f64>,
    /// Default: [`Init::NaiveSharding`].
    pub init: Init,
    /// Default: [`Assignment::Linear`].
    pub assignment: Assignment,
    /// Default: [`arithmetic_mean`].
    pub mean: MeanFn,
    /// Seed for [`Clusterer::transform`]. Default: [`rng::DEFAULT_SEED`].
    pub seed: u64,
}

impl KMeansConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            movement_threshold: None,
            init: Init::default(),
            assignment: Assignment::default(),
            mean: arithmetic_mean,
            seed: rng::DEFAULT_SEED,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_movement_threshold(mut self, threshold: f64) -> Self {
        self.movement_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub fn with_assignment(mut self, assignment: Assignment) -> Self {
        self.assignment = assignment;
        self
    }

    #[must_use]
    pub fn with_mean(mut self, mean: MeanFn) -> Self {
        self.mean = mean;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ClusteringError> {
        ensure!(self.k > 0, ZeroClustersSnafu);
        ensure!(self.max_iterations > 0, ZeroIterationsSnafu);
        if let Some(value) = self.movement_threshold {
            check_threshold("movement_threshold", value)?;
        }
        Ok(())
    }
}

pub(crate) fn check_threshold(name: &'static str, value: f64) -> Result<(), ClusteringError> {
    ensure!(
        value.is_finite() && value >= 0.0,
        InvalidThresholdSnafu { name, value }
    );
    Ok(())
}

/// Checks that `dataset` is non-empty, rectangular, finite, and has more
/// than `k` points. Returns the dimensionality.
pub fn validate_dataset(dataset: &[Vec<f64>], k: usize) -> Result<usize, ClusteringError> {
    ensure!(!dataset.is_empty(), EmptyDatasetSnafu);

    let expected = dataset[0].len();
    for (index, point) in dataset.iter().enumerate() {
        ensure!(!point.is_empty(), EmptyPointSnafu { index });
        ensure!(
            point.len() == expected,
            RaggedDatasetSnafu {
                index,
                expected,
                found: point.len()
            }
        );
        ensure!(
            point.iter().all(|v| v.is_finite()),
            NonFiniteValueSnafu { index }
        );
    }

    ensure!(
        dataset.len() > k,
        TooFewPointsSnafu {
            len: dataset.len(),
            k
        }
    );
    Ok(expected)
}

/// Fails with [`ClusteringError::UnsupportedDimensions`] unless points of
/// `dimensions` components are what `metric` reads.
pub fn check_metric_dimensions<D: Distance + ?Sized>(
    metric: &D,
    dimensions: usize,
) -> Result<(), ClusteringError> {
    if let Some(expected) = metric.required_dimensions() {
        ensure!(
            dimensions == expected,
            UnsupportedDimensionsSnafu {
                expected,
                found: dimensions
            }
        );
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub centroid: Vec<f64>,
    /// Indices into the dataset.
    pub members: Vec<usize>,
}

/// Outcome of one `transform` call. Every dataset point belongs to exactly
/// one cluster, and no cluster is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringResult {
    pub centroids: Vec<Vec<f64>>,
    pub clusters: Vec<Cluster>,
    /// Cluster index of every dataset point.
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

impl ClusteringResult {
    pub fn k(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster_points<'d>(
        &self,
        dataset: &'d [Vec<f64>],
        cluster: usize,
    ) -> impl Iterator<Item = &'d [f64]> {
        self.clusters[cluster]
            .members
            .iter()
            .map(move |&i| dataset[i].as_slice())
    }
}

/// Shared interface of the plain and adaptive engines.
pub trait Clusterer {
    fn seed(&self) -> u64;

    fn transform_with_rng(
        &self,
        dataset: &[Vec<f64>],
        rng: &mut impl RngExt,
    ) -> Result<ClusteringResult, ClusteringError>;

    /// Runs with a generator seeded from the configuration, so repeated
    /// calls give identical results.
    fn transform(&self, dataset: &[Vec<f64>]) -> Result<ClusteringResult, ClusteringError> {
        self.transform_with_rng(dataset, &mut rng::from_seed(self.seed()))
    }
}
