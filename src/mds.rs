//! Metric multidimensional scaling into two dimensions.
//!
//! The solver seeds with classical (Torgerson) scaling and refines with SMACOF
//! (iterated Guttman transforms). There are no random restarts, so identical
//! input always produces identical coordinates.

use clap::ValueEnum;
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::{debug, info};

use crate::error::MdsError;

pub const DIMENSIONS: usize = 2;
pub const DEFAULT_MAX_ITER: usize = 300;
pub const DEFAULT_EPS: f64 = 1e-3;

/// How the input matrix is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DissimilarityMode {
    /// Rows are feature vectors; distances are Euclidean distances between rows.
    #[default]
    Euclidean,
    /// The matrix already holds the target distances.
    Precomputed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdsConfig {
    pub mode: DissimilarityMode,
    pub max_iter: usize,
    /// Relative stress improvement below which SMACOF stops.
    pub eps: f64,
}

impl Default for MdsConfig {
    fn default() -> Self {
        Self {
            mode: DissimilarityMode::default(),
            max_iter: DEFAULT_MAX_ITER,
            eps: DEFAULT_EPS,
        }
    }
}

/// One 2-D point per network, in matrix column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub points: Vec<[f64; 2]>,
    /// Raw stress: sum over pairs of (embedded distance - target distance)².
    pub stress: f64,
    pub iterations: usize,
}

impl Embedding {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn embed(matrix: &DMatrix<f64>, config: &MdsConfig) -> Result<Embedding, MdsError> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(MdsError::NotSquare { rows, cols });
    }
    for j in 0..cols {
        for i in 0..rows {
            if !matrix[(i, j)].is_finite() {
                return Err(MdsError::NonFinite { row: i, col: j });
            }
        }
    }

    let n = rows;
    if n == 0 {
        return Ok(Embedding {
            points: Vec::new(),
            stress: 0.0,
            iterations: 0,
        });
    }
    if n == 1 {
        return Ok(Embedding {
            points: vec![[0.0, 0.0]],
            stress: 0.0,
            iterations: 0,
        });
    }

    let target = match config.mode {
        DissimilarityMode::Euclidean => euclidean_distances(matrix),
        DissimilarityMode::Precomputed => matrix.clone(),
    };

    let seed = classical_mds(&target)?;
    let (mut coords, stress, iterations) = smacof(&target, seed, config.max_iter, config.eps);
    orient_axes(&mut coords);

    let total: f64 = upper_pairs(n).map(|(i, j)| target[(i, j)].powi(2)).sum();
    let stress_1 = if total > 0.0 { (stress / total).sqrt() } else { 0.0 };
    info!(networks = n, iterations, stress, stress_1, "MDS converged");

    let points = (0..n).map(|i| [coords[(i, 0)], coords[(i, 1)]]).collect();
    Ok(Embedding {
        points,
        stress,
        iterations,
    })
}

/// Pairwise Euclidean distances between the rows of `features`.
pub fn euclidean_distances(features: &DMatrix<f64>) -> DMatrix<f64> {
    let n = features.nrows();
    let mut out = DMatrix::zeros(n, n);
    for (i, j) in upper_pairs(n) {
        let d = (features.row(i) - features.row(j)).norm();
        out[(i, j)] = d;
        out[(j, i)] = d;
    }
    out
}

/// Torgerson scaling: eigenvectors of the double-centred squared distances.
pub fn classical_mds(distances: &DMatrix<f64>) -> Result<DMatrix<f64>, MdsError> {
    let n = distances.nrows();
    let squared = distances.map(|d| d * d);

    let row_means: Vec<f64> = (0..n).map(|i| squared.row(i).mean()).collect();
    let col_means: Vec<f64> = (0..n).map(|j| squared.column(j).mean()).collect();
    let grand_mean = squared.mean();

    let b = DMatrix::from_fn(n, n, |i, j| {
        -0.5 * (squared[(i, j)] - row_means[i] - col_means[j] + grand_mean)
    });

    let eigen = SymmetricEigen::new(b);
    if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
        return Err(MdsError::Numerical(
            "eigen-decomposition produced non-finite eigenvalues".to_string(),
        ));
    }

    // nalgebra doesn't sort eigenvalues
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut coords = DMatrix::zeros(n, DIMENSIONS);
    for (axis, &k) in order.iter().take(DIMENSIONS).enumerate() {
        let scale = eigen.eigenvalues[k].max(0.0).sqrt();
        for i in 0..n {
            coords[(i, axis)] = eigen.eigenvectors[(i, k)] * scale;
        }
    }
    debug!(
        eigenvalues = ?order.iter().take(DIMENSIONS).map(|&k| eigen.eigenvalues[k]).collect::<Vec<_>>(),
        "classical MDS seed"
    );
    Ok(coords)
}

/// SMACOF from `init`. Returns the coordinates, raw stress and iterations run.
pub fn smacof(
    target: &DMatrix<f64>,
    init: DMatrix<f64>,
    max_iter: usize,
    eps: f64,
) -> (DMatrix<f64>, f64, usize) {
    let n = target.nrows();
    let mut coords = init;
    let mut stress = raw_stress(target, &coords);
    let mut iterations = 0;

    while iterations < max_iter && stress > 0.0 {
        let current = pairwise_distances(&coords);
        let mut guttman = DMatrix::zeros(n, n);
        for (i, j) in upper_pairs(n) {
            if current[(i, j)] > f64::EPSILON {
                let v = -target[(i, j)] / current[(i, j)];
                guttman[(i, j)] = v;
                guttman[(j, i)] = v;
            }
        }
        for i in 0..n {
            guttman[(i, i)] = -guttman.row(i).sum();
        }

        let next = (&guttman * &coords) / n as f64;
        let next_stress = raw_stress(target, &next);
        iterations += 1;

        let improvement = (stress - next_stress) / stress;
        coords = next;
        stress = next_stress;
        if improvement < eps {
            break;
        }
    }

    (coords, stress, iterations)
}

fn raw_stress(target: &DMatrix<f64>, coords: &DMatrix<f64>) -> f64 {
    let current = pairwise_distances(coords);
    upper_pairs(target.nrows())
        .map(|(i, j)| (current[(i, j)] - target[(i, j)]).powi(2))
        .sum()
}

fn pairwise_distances(coords: &DMatrix<f64>) -> DMatrix<f64> {
    euclidean_distances(coords)
}

fn upper_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j)))
}

/// Flips each axis so its largest-magnitude coordinate is positive.
fn orient_axes(coords: &mut DMatrix<f64>) {
    for axis in 0..coords.ncols() {
        let extreme = coords
            .column(axis)
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if extreme < 0.0 {
            coords.column_mut(axis).neg_mut();
        }
    }
}
