use std::path::PathBuf;

use tracing::info;

use crate::classify::{Classifier, MatchRule};
use crate::error::Error;
use crate::fonts::TextMeasure;
use crate::matrix::{DissimilarityMatrix, load_matrix};
use crate::mds::{Embedding, MdsConfig, embed};
use crate::metadata::{NetworkMetadataRow, load_metadata};
use crate::output::{CoordinateRow, FigureFormat, write_coordinates, write_figure};
use crate::render::{FigureStyle, RenderedFigure, render};
use crate::scheme::{CategoryCode, CategoryScheme};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub distances: PathBuf,
    pub metadata: PathBuf,
    pub output: PathBuf,
    pub coords: Option<PathBuf>,
    pub mds: MdsConfig,
    pub match_rule: MatchRule,
    pub style: FigureStyle,
    pub png_scale: f32,
}

/// Everything derived from the two input tables, before anything is written.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub labels: Vec<String>,
    pub codes: Vec<CategoryCode>,
    pub embedding: Embedding,
    pub figure: RenderedFigure,
}

impl Analysis {
    pub fn coordinates(&self, scheme: &CategoryScheme) -> Result<Vec<CoordinateRow>, Error> {
        self.labels
            .iter()
            .zip(&self.codes)
            .zip(&self.embedding.points)
            .map(|((network, &code), point)| -> Result<CoordinateRow, Error> {
                Ok(CoordinateRow {
                    network: network.clone(),
                    code,
                    label: scheme.encoding_for(code)?.label.clone(),
                    x: point[0],
                    y: point[1],
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub networks: usize,
    pub categories: usize,
    pub stress: f64,
    pub format: FigureFormat,
}

/// Classifies every column, embeds, and renders. Classification runs before MDS so a
/// stale scheme fails before any numerical work.
pub fn analyze<T: TextMeasure>(
    matrix: &DissimilarityMatrix,
    metadata: &[NetworkMetadataRow],
    scheme: &CategoryScheme,
    match_rule: MatchRule,
    mds: &MdsConfig,
    style: &FigureStyle,
    measure: &mut T,
) -> Result<Analysis, Error> {
    let codes = Classifier::new(scheme)
        .with_match_rule(match_rule)
        .classify_all(matrix.labels(), metadata)?;
    info!(networks = codes.len(), scheme = scheme.name(), "classified networks");

    let embedding = embed(matrix.values(), mds)?;
    let figure = render(&embedding, &codes, scheme, style, measure)?;

    Ok(Analysis {
        labels: matrix.labels().to_vec(),
        codes,
        embedding,
        figure,
    })
}

pub fn run<T: TextMeasure>(
    config: &RunConfig,
    scheme: &CategoryScheme,
    measure: &mut T,
) -> Result<RunSummary, Error> {
    // Validate the output path before loading anything.
    FigureFormat::from_path(&config.output)?;

    let matrix = load_matrix(&config.distances)?;
    let metadata = load_metadata(&config.metadata)?;

    let analysis = analyze(
        &matrix,
        &metadata,
        scheme,
        config.match_rule,
        &config.mds,
        &config.style,
        measure,
    )?;

    let format = write_figure(&config.output, &analysis.figure.svg, config.png_scale)?;
    if let Some(path) = &config.coords {
        write_coordinates(path, &analysis.coordinates(scheme)?)?;
    }

    Ok(RunSummary {
        networks: analysis.labels.len(),
        categories: analysis.figure.legend.len(),
        stress: analysis.embedding.stress,
        format,
    })
}
