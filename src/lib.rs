//! Food-web dissimilarity maps: classify each network by study (or habitat, for
//! aggregate entries), project the dissimilarity matrix to 2-D with MDS, and draw a
//! labelled scatter plot as SVG, PNG or PDF.

pub mod classify;
pub mod error;
pub mod fonts;
pub mod matrix;
pub mod mds;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod scheme;

pub use classify::{Classifier, MatchRule, classify};
pub use error::{ClassifyError, Error, Result, SchemeError};
pub use scheme::{CategoryCode, CategoryScheme, VisualEncoding};
