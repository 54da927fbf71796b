use std::collections::BTreeMap;
use std::f32::consts::PI;

use tracing::debug;

use crate::error::{Error, OutputError};
use crate::fonts::TextMeasure;
use crate::mds::Embedding;
use crate::scheme::{CategoryCode, CategoryScheme, MarkerShape, VisualEncoding};

/// Pixels per typographic point at the 100 dpi the figure is laid out for.
const PX_PER_PT: f32 = 100.0 / 72.0;
const TICK_TARGET: f32 = 5.0;
const TICK_LENGTH: f32 = 4.0;
const DATA_PADDING: f64 = 0.05;

/// Layout and chrome for the scatter figure.
#[derive(Debug, Clone)]
pub struct FigureStyle {
    pub background: String,
    pub frame_color: String,
    pub text_color: String,
    pub font_family: String,
    pub tick_font_size: f32,
    pub legend_font_size: f32,
    /// Side length of the (square, equal-aspect) plot area.
    pub plot_size: f32,
    pub margin: f32,
    pub legend_gap: f32,
    /// Legend glyphs are drawn this much larger than the data markers.
    pub legend_marker_scale: f32,
    pub edge_width: f32,
    /// Plot embedding dimension 2 on the horizontal axis, as the published figure does.
    pub swap_axes: bool,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            background: "#ffffff".to_string(),
            frame_color: "#262626".to_string(),
            text_color: "#262626".to_string(),
            font_family: "sans-serif".to_string(),
            tick_font_size: 12.0,
            legend_font_size: 9.0,
            plot_size: 540.0,
            margin: 56.0,
            legend_gap: 16.0,
            legend_marker_scale: 1.8,
            edge_width: 0.5 * PX_PER_PT,
            swap_axes: true,
        }
    }
}

impl FigureStyle {
    /// Scales the plot so the whole figure is roughly `width` pixels wide.
    pub fn with_width(mut self, width: f32) -> Self {
        if width.is_finite() && width > 0.0 {
            self.plot_size = (width * 0.7).max(120.0);
        }
        self
    }
}

/// Points drawn in one call with one encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawGroup {
    pub code: CategoryCode,
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub code: CategoryCode,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct RenderedFigure {
    pub svg: String,
    pub width: f32,
    pub height: f32,
    pub groups: Vec<DrawGroup>,
    pub legend: Vec<LegendEntry>,
}

/// Point indices per code, ascending by code; codes with no points are absent.
pub fn group_by_code(codes: &[CategoryCode]) -> Vec<DrawGroup> {
    let mut groups: BTreeMap<CategoryCode, Vec<usize>> = BTreeMap::new();
    for (index, &code) in codes.iter().enumerate() {
        groups.entry(code).or_default().push(index);
    }
    groups
        .into_iter()
        .map(|(code, indices)| DrawGroup { code, indices })
        .collect()
}

struct Frame {
    left: f32,
    top: f32,
    size: f32,
    x_min: f64,
    y_min: f64,
    span: f64,
}

impl Frame {
    fn fit(points: &[[f64; 2]], left: f32, top: f32, size: f32) -> Self {
        let (mut x_lo, mut x_hi) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y_lo, mut y_hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            x_lo = x_lo.min(p[0]);
            x_hi = x_hi.max(p[0]);
            y_lo = y_lo.min(p[1]);
            y_hi = y_hi.max(p[1]);
        }
        if points.is_empty() {
            (x_lo, x_hi, y_lo, y_hi) = (0.0, 0.0, 0.0, 0.0);
        }

        let mut span = (x_hi - x_lo).max(y_hi - y_lo);
        if span <= 0.0 {
            span = 1.0;
        }
        span *= 1.0 + 2.0 * DATA_PADDING;

        Self {
            left,
            top,
            size,
            x_min: (x_lo + x_hi) / 2.0 - span / 2.0,
            y_min: (y_lo + y_hi) / 2.0 - span / 2.0,
            span,
        }
    }

    fn to_px(&self, p: [f64; 2]) -> (f32, f32) {
        let fx = ((p[0] - self.x_min) / self.span) as f32;
        let fy = ((p[1] - self.y_min) / self.span) as f32;
        (self.left + fx * self.size, self.top + (1.0 - fy) * self.size)
    }

    fn right(&self) -> f32 {
        self.left + self.size
    }

    fn bottom(&self) -> f32 {
        self.top + self.size
    }
}

/// Draws one marker group per present category and a legend in category order.
pub fn render<T: TextMeasure>(
    embedding: &Embedding,
    codes: &[CategoryCode],
    scheme: &CategoryScheme,
    style: &FigureStyle,
    measure: &mut T,
) -> Result<RenderedFigure, Error> {
    if embedding.len() != codes.len() {
        return Err(OutputError::Render(format!(
            "{} points but {} category codes",
            embedding.len(),
            codes.len()
        ))
        .into());
    }

    let groups = group_by_code(codes);
    let encodings: Vec<&VisualEncoding> = groups
        .iter()
        .map(|g| scheme.encoding_for(g.code))
        .collect::<Result<_, _>>()?;

    let points: Vec<[f64; 2]> = embedding
        .points
        .iter()
        .map(|p| if style.swap_axes { [p[1], p[0]] } else { *p })
        .collect();

    let frame = Frame::fit(&points, style.margin, style.margin / 2.0, style.plot_size);
    let mut svg = String::new();

    render_axes(&mut svg, &frame, style);

    for (group, encoding) in groups.iter().zip(&encodings) {
        let radius = marker_radius(encoding.size);
        svg.push_str(&format!(
            r#"<g class="category-{}" fill="{}" stroke="{}" stroke-width="{:.2}">"#,
            group.code, encoding.fill, encoding.edge, style.edge_width
        ));
        for &index in &group.indices {
            let (x, y) = frame.to_px(points[index]);
            svg.push_str(&marker_svg(encoding.marker, x, y, radius));
        }
        svg.push_str("</g>");
        debug!(code = group.code, points = group.indices.len(), "drew category group");
    }

    let legend: Vec<LegendEntry> = groups
        .iter()
        .zip(&encodings)
        .map(|(g, e)| LegendEntry {
            code: g.code,
            label: e.label.clone(),
        })
        .collect();

    let legend_left = frame.right() + style.legend_gap;
    let center_y = frame.top + frame.size / 2.0;
    let (legend_w, legend_bottom) =
        render_legend(&mut svg, &encodings, legend_left, center_y, style, measure);

    let width = legend_left + legend_w + style.margin / 2.0;
    let height = (frame.bottom() + style.margin).max(legend_bottom + style.margin / 2.0);

    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}"><rect width="100%" height="100%" fill="{bg}" />{body}</svg>"#,
        w = width.ceil(),
        h = height.ceil(),
        bg = style.background,
        body = svg,
    );

    Ok(RenderedFigure {
        svg,
        width: width.ceil(),
        height: height.ceil(),
        groups,
        legend,
    })
}

fn render_axes(svg: &mut String, frame: &Frame, style: &FigureStyle) {
    svg.push_str(&format!(
        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="{}" stroke-width="1" />"#,
        frame.left, frame.top, frame.size, frame.size, style.frame_color
    ));

    let step = nice_step(frame.span / TICK_TARGET as f64);
    let decimals = tick_decimals(step);
    let font = style.tick_font_size;

    for value in ticks(frame.x_min, frame.x_min + frame.span, step) {
        let (x, _) = frame.to_px([value, frame.y_min]);
        let y = frame.bottom();
        svg.push_str(&format!(
            r#"<line x1="{x:.2}" y1="{y:.2}" x2="{x:.2}" y2="{:.2}" stroke="{}" stroke-width="1" /><text x="{x:.2}" y="{:.2}" font-family="{}" font-size="{font:.2}" fill="{}" text-anchor="middle">{}</text>"#,
            y + TICK_LENGTH,
            style.frame_color,
            y + TICK_LENGTH + font * 1.1,
            style.font_family,
            style.text_color,
            format_tick(value, decimals),
        ));
    }

    for value in ticks(frame.y_min, frame.y_min + frame.span, step) {
        let (_, y) = frame.to_px([frame.x_min, value]);
        let x = frame.left;
        svg.push_str(&format!(
            r#"<line x1="{x:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="1" /><text x="{:.2}" y="{:.2}" font-family="{}" font-size="{font:.2}" fill="{}" text-anchor="end">{}</text>"#,
            x - TICK_LENGTH,
            style.frame_color,
            x - TICK_LENGTH - 2.0,
            y + font * 0.35,
            style.font_family,
            style.text_color,
            format_tick(value, decimals),
        ));
    }

    let (x_title, y_title) = if style.swap_axes {
        ("MDS dimension 2", "MDS dimension 1")
    } else {
        ("MDS dimension 1", "MDS dimension 2")
    };
    let cx = frame.left + frame.size / 2.0;
    let cy = frame.top + frame.size / 2.0;
    svg.push_str(&format!(
        r#"<text x="{cx:.2}" y="{:.2}" font-family="{ff}" font-size="{fs:.2}" fill="{fill}" text-anchor="middle">{}</text>"#,
        frame.bottom() + TICK_LENGTH + font * 2.6,
        x_title,
        ff = style.font_family,
        fs = font,
        fill = style.text_color,
    ));
    let tx = frame.left - style.margin * 0.8;
    svg.push_str(&format!(
        r#"<text x="{tx:.2}" y="{cy:.2}" font-family="{ff}" font-size="{fs:.2}" fill="{fill}" text-anchor="middle" transform="rotate(-90 {tx:.2} {cy:.2})">{}</text>"#,
        y_title,
        ff = style.font_family,
        fs = font,
        fill = style.text_color,
    ));
}

/// Returns the legend's width and bottom edge. The box is anchored centre-left at
/// (`left`, `center_y`) but never starts above the top of the canvas.
fn render_legend<T: TextMeasure>(
    svg: &mut String,
    encodings: &[&VisualEncoding],
    left: f32,
    center_y: f32,
    style: &FigureStyle,
    measure: &mut T,
) -> (f32, f32) {
    if encodings.is_empty() {
        return (0.0, 0.0);
    }

    let font = style.legend_font_size;
    let pad = font * 0.6;
    let glyph_radius = encodings
        .iter()
        .map(|e| marker_radius(e.size) * style.legend_marker_scale)
        .fold(0.0_f32, f32::max);
    let row_height = (font * 1.5).max(glyph_radius * 2.0 + 2.0);
    let text_width = encodings
        .iter()
        .map(|e| measure.measure_text(&e.label, font).0)
        .fold(0.0_f32, f32::max);

    let glyph_column = glyph_radius * 2.0 + pad;
    let width = pad * 2.0 + glyph_column + text_width;
    let height = pad * 2.0 + row_height * encodings.len() as f32;
    let top = (center_y - height / 2.0).max(pad);

    svg.push_str(&format!(
        r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="3" fill="{}" fill-opacity="0.8" stroke="#cccccc" stroke-width="1" />"##,
        left, top, width, height, style.background
    ));

    for (row, encoding) in encodings.iter().enumerate() {
        let cy = top + pad + row_height * (row as f32 + 0.5);
        let gx = left + pad + glyph_radius;
        let radius = marker_radius(encoding.size) * style.legend_marker_scale;
        svg.push_str(&format!(
            r#"<g fill="{}" stroke="{}" stroke-width="{:.2}">{}</g>"#,
            encoding.fill,
            encoding.edge,
            style.edge_width,
            marker_svg(encoding.marker, gx, cy, radius)
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.2}" fill="{}">{}</text>"#,
            left + pad + glyph_column,
            cy + font * 0.35,
            style.font_family,
            font,
            style.text_color,
            escape_xml(&encoding.label)
        ));
    }

    (width, top + height)
}

/// matplotlib's `s` is marker area in pt²; the radius is half its square root.
fn marker_radius(size: f32) -> f32 {
    size.max(0.0).sqrt() / 2.0 * PX_PER_PT
}

fn marker_svg(shape: MarkerShape, x: f32, y: f32, r: f32) -> String {
    match shape {
        MarkerShape::Circle => format!(r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" />"#, x, y, r),
        MarkerShape::Square => {
            let half = r * 0.9;
            format!(
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" />"#,
                x - half,
                y - half,
                half * 2.0,
                half * 2.0
            )
        }
        MarkerShape::Diamond => polygon(&regular_polygon(x, y, r, 4, -PI / 2.0)),
        MarkerShape::TriangleUp => polygon(&regular_polygon(x, y, r, 3, -PI / 2.0)),
        MarkerShape::TriangleDown => polygon(&regular_polygon(x, y, r, 3, PI / 2.0)),
        MarkerShape::Star => {
            let inner = r * 0.382;
            let vertices: Vec<(f32, f32)> = (0..10)
                .map(|k| {
                    let radius = if k % 2 == 0 { r } else { inner };
                    let angle = -PI / 2.0 + k as f32 * PI / 5.0;
                    (x + radius * angle.cos(), y + radius * angle.sin())
                })
                .collect();
            polygon(&vertices)
        }
    }
}

fn regular_polygon(x: f32, y: f32, r: f32, sides: usize, rotation: f32) -> Vec<(f32, f32)> {
    (0..sides)
        .map(|k| {
            let angle = rotation + k as f32 * 2.0 * PI / sides as f32;
            (x + r * angle.cos(), y + r * angle.sin())
        })
        .collect()
}

fn polygon(vertices: &[(f32, f32)]) -> String {
    let points: Vec<String> = vertices
        .iter()
        .map(|(px, py)| format!("{:.2},{:.2}", px, py))
        .collect();
    format!(r#"<polygon points="{}" />"#, points.join(" "))
}

/// 1, 2 or 5 times a power of ten, at least `raw`.
fn nice_step(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn ticks(lo: f64, hi: f64, step: f64) -> impl Iterator<Item = f64> {
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(move |k| k as f64 * step)
}

fn tick_decimals(step: f64) -> usize {
    if step >= 1.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    }
}

fn format_tick(value: f64, decimals: usize) -> String {
    // Avoid "-0.00"
    let value = if value.abs() < 1e-12 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

/// Escapes markup characters and drops code points XML 1.0 cannot carry.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}
