//! Request/response boundary for running one clustering job.
//!
//! A job is a single X-means transform followed by the quality indices,
//! executed to completion without any shared state.

use crate::distance::Metric;
use crate::kmeans::adaptive::{XMeans, XMeansConfig};
use crate::kmeans::{
    Assignment, ClusteringError, ClusteringResult, Clusterer, ErrorKind, KMeansConfig,
};
use crate::{quality, rng};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_SPLIT_THRESHOLD: f64 = 0.05;
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.0;

fn default_split_threshold() -> f64 {
    DEFAULT_SPLIT_THRESHOLD
}

fn default_distance_threshold() -> f64 {
    DEFAULT_DISTANCE_THRESHOLD
}

fn default_seed() -> u64 {
    rng::DEFAULT_SEED
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub min_k: usize,
    pub max_k: usize,
    pub max_iterations: usize,
    pub data: Vec<Vec<f64>>,
    /// BIC gain a split must exceed; fractions in (0, 1) are relative.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: f64,
    /// Largest centroid movement still counted as converged.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    #[serde(default)]
    pub metric: Metric,
    /// Assign points through a KD-tree over the centroids. Under the
    /// perceptual metrics (CIE94, CIEDE2000) the tree cannot prune and is
    /// searched exhaustively, so this only pays off with the Euclidean
    /// ones.
    #[serde(default)]
    pub kd_tree: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Request {
    pub fn new(min_k: usize, max_k: usize, max_iterations: usize, data: Vec<Vec<f64>>) -> Self {
        Self {
            min_k,
            max_k,
            max_iterations,
            data,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            metric: Metric::default(),
            kd_tree: false,
            seed: rng::DEFAULT_SEED,
        }
    }

    pub fn config(&self) -> XMeansConfig {
        let assignment = if self.kd_tree {
            Assignment::KdTree
        } else {
            Assignment::Linear
        };
        let kmeans = KMeansConfig::new(self.min_k)
            .with_max_iterations(self.max_iterations)
            .with_movement_threshold(self.distance_threshold)
            .with_assignment(assignment)
            .with_seed(self.seed);

        XMeansConfig::new(self.min_k, self.max_k)
            .with_kmeans(kmeans)
            .with_split_threshold(self.split_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReply {
    pub centroid: Vec<f64>,
    pub points: Vec<Vec<f64>>,
    /// Positions of `points` in the request's `data`.
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub clusters: Vec<ClusterReply>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
    pub davies_bouldin_indices: Vec<f64>,
    pub calinski_harabasz_index: Option<f64>,
    pub cluster_distances: Vec<f64>,
    pub intra_cluster_distances: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    /// Absent when the request could not be read at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl From<&ClusteringError> for ErrorResponse {
    fn from(err: &ClusteringError) -> Self {
        Self {
            error: err.to_string(),
            kind: Some(err.kind()),
        }
    }
}

impl ErrorResponse {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: None,
        }
    }
}

fn response(data: &[Vec<f64>], result: ClusteringResult, metric: Metric) -> Response {
    let davies_bouldin_indices = quality::davies_bouldin(data, &result, &metric);
    let calinski_harabasz_index = quality::calinski_harabasz(data, &result, &metric);
    let cluster_distances = quality::mean_distance_between_centroids(&result, &metric);
    let intra_cluster_distances = quality::mean_distance_within_clusters(data, &result, &metric);

    let clusters = result
        .clusters
        .into_iter()
        .map(|cluster| ClusterReply {
            points: cluster.members.iter().map(|&i| data[i].clone()).collect(),
            centroid: cluster.centroid,
            indices: cluster.members,
        })
        .collect();

    Response {
        clusters,
        centroids: result.centroids,
        iterations: result.iterations,
        converged: result.converged,
        davies_bouldin_indices,
        calinski_harabasz_index,
        cluster_distances,
        intra_cluster_distances,
    }
}

/// Runs one job: X-means over `request.data`, then the quality indices.
pub fn handle(request: &Request) -> Result<Response, ClusteringError> {
    let xmeans = XMeans::new(request.config(), request.metric)?;
    let result = xmeans.transform(&request.data)?;
    info!(
        points = request.data.len(),
        k = result.k(),
        iterations = result.iterations,
        converged = result.converged,
        "clustering finished"
    );

    Ok(response(&request.data, result, request.metric))
}
