use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::DMatrix;
use tracing::info;

use crate::error::InputError;

const WHAT: &str = "dissimilarity matrix";

/// Absolute tolerance for symmetry and the zero diagonal, scaled by the largest entry.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Square, symmetric, zero-diagonal dissimilarities with identical row and column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DissimilarityMatrix {
    labels: Vec<String>,
    values: DMatrix<f64>,
}

impl DissimilarityMatrix {
    /// Validates shape, finiteness, sign, symmetry and diagonal.
    pub fn new(labels: Vec<String>, values: DMatrix<f64>) -> Result<Self, InputError> {
        Self::with_tolerance(labels, values, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(
        labels: Vec<String>,
        values: DMatrix<f64>,
        tolerance: f64,
    ) -> Result<Self, InputError> {
        let n = labels.len();
        if n == 0 {
            return Err(InputError::Matrix("no networks".to_string()));
        }
        if values.nrows() != n || values.ncols() != n {
            return Err(InputError::Matrix(format!(
                "{} labels but a {}x{} matrix",
                n,
                values.nrows(),
                values.ncols()
            )));
        }

        let mut scale: f64 = 1.0;
        for i in 0..n {
            for j in 0..n {
                let v = values[(i, j)];
                if !v.is_finite() {
                    return Err(InputError::Matrix(format!(
                        "non-finite value at ({}, {})",
                        labels[i], labels[j]
                    )));
                }
                if v < 0.0 {
                    return Err(InputError::Matrix(format!(
                        "negative dissimilarity {} at ({}, {})",
                        v, labels[i], labels[j]
                    )));
                }
                scale = scale.max(v);
            }
        }

        let tol = tolerance * scale;
        for i in 0..n {
            if values[(i, i)].abs() > tol {
                return Err(InputError::Matrix(format!(
                    "diagonal entry for '{}' is {} (expected 0)",
                    labels[i],
                    values[(i, i)]
                )));
            }
            for j in (i + 1)..n {
                if (values[(i, j)] - values[(j, i)]).abs() > tol {
                    return Err(InputError::Matrix(format!(
                        "asymmetric entries for ('{}', '{}'): {} vs {}",
                        labels[i],
                        labels[j],
                        values[(i, j)],
                        values[(j, i)]
                    )));
                }
            }
        }

        Ok(Self { labels, values })
    }

    /// Column labels, in matrix order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub fn load_matrix(path: &Path) -> Result<DissimilarityMatrix, InputError> {
    let file = std::fs::File::open(path).map_err(|source| InputError::Io {
        what: format!("{} {}", WHAT, path.display()),
        source,
    })?;
    let matrix = read_matrix(file)?;
    info!(networks = matrix.len(), path = %path.display(), "loaded dissimilarity matrix");
    Ok(matrix)
}

/// Reads a labelled CSV: header `<index>,A,B,...`, then one `label,v,v,...` row per network.
pub fn read_matrix<R: Read>(reader: R) -> Result<DissimilarityMatrix, InputError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let csv_err = |source| InputError::Csv {
        what: WHAT.to_string(),
        source,
    };

    let headers = rdr.headers().map_err(csv_err)?.clone();
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let n = columns.len();
    if n == 0 {
        return Err(InputError::Matrix("header row has no network labels".to_string()));
    }

    let mut row_labels = Vec::with_capacity(n);
    let mut data = Vec::with_capacity(n * n);
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record).map_err(csv_err)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() != n + 1 {
            return Err(InputError::Matrix(format!(
                "line {} has {} cells, expected {}",
                line,
                record.len(),
                n + 1
            )));
        }
        row_labels.push(record[0].to_string());
        for (j, cell) in record.iter().skip(1).enumerate() {
            let v: f64 = cell.parse().map_err(|_| {
                InputError::Matrix(format!(
                    "line {}: cell for column '{}' is not a number: '{}'",
                    line, columns[j], cell
                ))
            })?;
            data.push(v);
        }
    }

    if row_labels.len() != n {
        return Err(InputError::Matrix(format!(
            "{} rows but {} columns",
            row_labels.len(),
            n
        )));
    }
    if let Some((row, col)) = row_labels
        .iter()
        .zip(&columns)
        .find(|(row, col)| row != col)
    {
        return Err(InputError::Matrix(format!(
            "row label '{}' does not match column label '{}'",
            row, col
        )));
    }

    let values = DMatrix::from_row_slice(n, n, &data);
    DissimilarityMatrix::new(columns, values)
}
