use std::path::Path;

use resvg::usvg;
use serde::Serialize;
use tiny_skia::{Pixmap, Transform};
use tracing::info;

use crate::error::OutputError;

const FIGURE_FORMATS: &str = ".svg, .png or .pdf";
const COORDINATE_FORMATS: &str = ".csv or .json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureFormat {
    Svg,
    Png,
    Pdf,
}

impl FigureFormat {
    pub fn from_path(path: &Path) -> Result<Self, OutputError> {
        let ext = extension(path)?;
        match ext.as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            _ => Err(OutputError::UnsupportedFormat(ext, FIGURE_FORMATS)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Svg => "SVG",
            Self::Png => "PNG",
            Self::Pdf => "PDF",
        }
    }
}

fn extension(path: &Path) -> Result<String, OutputError> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or(OutputError::MissingExtension)
}

/// Writes the figure in the format the path's extension names.
pub fn write_figure(path: &Path, svg: &str, png_scale: f32) -> Result<FigureFormat, OutputError> {
    let format = FigureFormat::from_path(path)?;
    let bytes = match format {
        FigureFormat::Svg => svg.as_bytes().to_vec(),
        FigureFormat::Png => svg_to_png(svg, png_scale)?,
        FigureFormat::Pdf => svg_to_pdf(svg)?,
    };
    write_bytes(path, &bytes)?;
    info!(format = format.name(), path = %path.display(), "figure written");
    eprintln!("{} saved to: {}", format.name(), path.display());
    Ok(format)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
    std::fs::write(path, bytes).map_err(|source| OutputError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub fn svg_to_png(svg: &str, scale: f32) -> Result<Vec<u8>, OutputError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(OutputError::InvalidScale(scale));
    }

    let mut opts = usvg::Options::default();
    {
        let fontdb = opts.fontdb_mut();
        fontdb.load_system_fonts();
        load_local_fonts(|dir| fontdb.load_fonts_dir(dir));

        let fallbacks = FontFallbacks::pick(
            fontdb
                .faces()
                .flat_map(|face| face.families.iter().map(|(family, _)| family.as_str())),
        );
        if let Some(sans) = &fallbacks.sans {
            fontdb.set_sans_serif_family(sans);
            fontdb.set_serif_family(sans);
        }
        if let Some(mono) = &fallbacks.mono {
            fontdb.set_monospace_family(mono);
        }
    }

    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| OutputError::Render(format!("Failed to parse SVG: {}", e)))?;

    let width = (tree.size().width() * scale).ceil() as u32;
    let height = (tree.size().height() * scale).ceil() as u32;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| OutputError::Render(format!("Failed to create {}x{} pixmap", width, height)))?;
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| OutputError::Render(format!("Failed to encode PNG: {}", e)))
}

pub fn svg_to_pdf(svg: &str) -> Result<Vec<u8>, OutputError> {
    use svg2pdf::usvg::fontdb;

    let mut fontdb = fontdb::Database::new();
    fontdb.load_system_fonts();
    load_local_fonts(|dir| fontdb.load_fonts_dir(dir));

    let fallbacks = FontFallbacks::pick(
        fontdb
            .faces()
            .flat_map(|face| face.families.iter().map(|(family, _)| family.as_str())),
    );
    if let Some(sans) = &fallbacks.sans {
        fontdb.set_sans_serif_family(sans);
        fontdb.set_serif_family(sans);
    }
    if let Some(mono) = &fallbacks.mono {
        fontdb.set_monospace_family(mono);
    }

    let opts = svg2pdf::usvg::Options {
        fontdb: std::sync::Arc::new(fontdb),
        ..Default::default()
    };

    let tree = svg2pdf::usvg::Tree::from_str(svg, &opts)
        .map_err(|e| OutputError::Render(format!("Failed to parse SVG: {}", e)))?;

    // Text as paths: legend labels survive viewers without the font.
    let options = svg2pdf::ConversionOptions {
        embed_text: false,
        ..Default::default()
    };

    svg2pdf::to_pdf(&tree, options, svg2pdf::PageOptions::default())
        .map_err(|e| OutputError::Render(format!("Failed to convert SVG to PDF: {}", e)))
}

fn load_local_fonts(mut load: impl FnMut(&Path)) {
    let local_fonts = Path::new("fonts");
    if local_fonts.is_dir() {
        load(local_fonts);
    }
}

/// Generic family names resolved against the installed faces.
#[derive(Debug, Default, PartialEq, Eq)]
struct FontFallbacks {
    sans: Option<String>,
    mono: Option<String>,
}

impl FontFallbacks {
    fn pick<'a>(families: impl Iterator<Item = &'a str>) -> Self {
        let mut first: Option<&str> = None;
        let mut sans: Option<&str> = None;
        let mut mono: Option<&str> = None;

        for family in families {
            first.get_or_insert(family);
            let lower = family.to_ascii_lowercase();
            if sans.is_none() && lower.contains("sans") {
                sans = Some(family);
            }
            if mono.is_none() && (lower.contains("mono") || lower.contains("code")) {
                mono = Some(family);
            }
        }

        let sans = sans.or(first);
        Self {
            sans: sans.map(str::to_string),
            mono: mono.or(sans).map(str::to_string),
        }
    }
}

/// One embedded network, as written by `--coords`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRow {
    pub network: String,
    pub code: usize,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

pub fn write_coordinates(path: &Path, rows: &[CoordinateRow]) -> Result<(), OutputError> {
    let ext = extension(path)?;
    let bytes = match ext.as_str() {
        "csv" => coordinates_csv(rows)?,
        "json" => serde_json::to_vec_pretty(rows).map_err(|e| OutputError::Encode(e.to_string()))?,
        _ => return Err(OutputError::UnsupportedFormat(ext, COORDINATE_FORMATS)),
    };
    write_bytes(path, &bytes)?;
    info!(rows = rows.len(), path = %path.display(), "coordinates written");
    Ok(())
}

fn coordinates_csv(rows: &[CoordinateRow]) -> Result<Vec<u8>, OutputError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| OutputError::Encode(e.to_string()))?;
    }
    wtr.into_inner()
        .map_err(|e| OutputError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figure_format_from_extension() {
        assert_eq!(FigureFormat::from_path(Path::new("a/2d.PDF")).unwrap(), FigureFormat::Pdf);
        assert_eq!(FigureFormat::from_path(Path::new("plot.svg")).unwrap(), FigureFormat::Svg);
        assert!(matches!(
            FigureFormat::from_path(Path::new("plot")),
            Err(OutputError::MissingExtension)
        ));
        assert!(matches!(
            FigureFormat::from_path(Path::new("plot.jpg")),
            Err(OutputError::UnsupportedFormat(ref ext, _)) if ext == "jpg"
        ));
    }

    #[test]
    fn png_scale_must_be_positive() {
        assert!(matches!(svg_to_png("<svg/>", 0.0), Err(OutputError::InvalidScale(_))));
        assert!(matches!(svg_to_png("<svg/>", f32::NAN), Err(OutputError::InvalidScale(_))));
    }

    #[test]
    fn fallbacks_prefer_sans_and_mono_families() {
        let picked = FontFallbacks::pick(["Noto Serif", "DejaVu Sans", "Fira Code"].into_iter());
        assert_eq!(picked.sans.as_deref(), Some("DejaVu Sans"));
        assert_eq!(picked.mono.as_deref(), Some("Fira Code"));

        let only_serif = FontFallbacks::pick(["Noto Serif"].into_iter());
        assert_eq!(only_serif.sans.as_deref(), Some("Noto Serif"));
        assert_eq!(only_serif.mono.as_deref(), Some("Noto Serif"));

        assert_eq!(FontFallbacks::pick(std::iter::empty()), FontFallbacks::default());
    }

    #[test]
    fn coordinates_as_csv() {
        let rows = vec![CoordinateRow {
            network: "Beaver_1985.csv".to_string(),
            code: 4,
            label: "Beaver (1985)".to_string(),
            x: 0.5,
            y: -1.25,
        }];
        let csv = String::from_utf8(coordinates_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv, "network,code,label,x,y\nBeaver_1985.csv,4,Beaver (1985),0.5,-1.25\n");
    }
}
