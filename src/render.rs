//! Pair graph rasterization.
//!
//! Draws a [`PairGraph`] with its [`Layout`] onto a PNG canvas. Label text
//! needs a TrueType font; [`GraphRenderer::probe`] checks for one up front so
//! a host without fonts can skip the chart instead of failing the report.
//!
//! Visual sizes are given in points and converted with the configured DPI,
//! so the chart keeps its proportions at any resolution.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_polygon_mut,
    draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use petgraph::visit::EdgeRef;
use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::graph::{Layout, PairGraph};

/// Font files tried, in order, when no font is configured.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const NODE_COLOR: Rgb<u8> = Rgb([135, 206, 235]);
const EDGE_COLOR: Rgb<u8> = Rgb([128, 128, 128]);
const EDGE_LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Node marker area in square points.
const NODE_AREA_PT2: f64 = 2500.0;
const LABEL_FONT_PT: f64 = 8.0;
const TITLE_FONT_PT: f64 = 12.0;
const EDGE_WIDTH_PT: f64 = 2.0;
const ARROW_LENGTH_PT: f64 = 10.0;

/// Pixel sizes derived from the configured DPI.
#[derive(Debug, Clone, Copy)]
struct Metrics {
    width: u32,
    height: u32,
    node_radius: f64,
    label_px: f32,
    title_px: f32,
    edge_half_width: f64,
    arrow_length: f64,
    title_band: f64,
}

impl Metrics {
    fn new(config: &RenderConfig) -> Self {
        let (width, height) = config.canvas_size();
        let px = |pt: f64| pt * config.dpi as f64 / 72.0;

        Self {
            width,
            height,
            node_radius: px(NODE_AREA_PT2.sqrt() / 2.0),
            label_px: px(LABEL_FONT_PT) as f32,
            title_px: px(TITLE_FONT_PT) as f32,
            edge_half_width: px(EDGE_WIDTH_PT) / 2.0,
            arrow_length: px(ARROW_LENGTH_PT),
            title_band: px(TITLE_FONT_PT) * 3.0,
        }
    }

    /// Maps layout space [-1, 1]² onto the drawing area below the title.
    fn to_canvas(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let margin = self.node_radius * 1.6;
        let left = margin;
        let right = self.width as f64 - margin;
        let top = self.title_band + margin;
        let bottom = self.height as f64 - margin;

        (
            left + (x + 1.0) / 2.0 * (right - left),
            bottom - (y + 1.0) / 2.0 * (bottom - top),
        )
    }
}

/// Renders pair graphs once a usable font has been found.
pub struct GraphRenderer {
    font: FontVec,
    font_path: PathBuf,
    metrics: Metrics,
}

impl GraphRenderer {
    /// Checks that rendering is possible and prepares the renderer.
    ///
    /// Fails with a capability error when no usable font exists.
    pub fn probe(config: &RenderConfig) -> Result<Self, RenderError> {
        let (font_path, font) = match &config.font_path {
            Some(path) => (path.clone(), load_font(path)?),
            None => locate_system_font(SYSTEM_FONT_CANDIDATES)?,
        };

        debug!("Using font {}", font_path.display());

        Ok(Self {
            font,
            font_path,
            metrics: Metrics::new(config),
        })
    }

    pub fn font_path(&self) -> &Path {
        &self.font_path
    }

    /// Draws the graph onto a fresh canvas.
    pub fn render(&self, pair_graph: &PairGraph, layout: &Layout, title: &str) -> RgbImage {
        let m = self.metrics;
        let mut canvas = RgbImage::from_pixel(m.width, m.height, WHITE);
        let graph = pair_graph.graph();

        let mut edge_labels = Vec::with_capacity(graph.edge_count());

        for edge in graph.edge_references() {
            let from = m.to_canvas(layout.position(edge.source()));
            let to = m.to_canvas(layout.position(edge.target()));
            let label = edge.weight().to_string();

            if edge.source() == edge.target() {
                let anchor = self.draw_self_loop(&mut canvas, from);
                edge_labels.push((anchor, label));
                continue;
            }

            // Reciprocal pairs are drawn side by side instead of on top of each other.
            let offset = if graph.find_edge(edge.target(), edge.source()).is_some() {
                m.node_radius * 0.25
            } else {
                0.0
            };
            let (from, to) = offset_segment(from, to, offset);

            self.draw_arrow(&mut canvas, from, to);
            edge_labels.push((midpoint(from, to), label));
        }

        for node in graph.node_indices() {
            let center = m.to_canvas(layout.position(node));
            draw_filled_circle_mut(
                &mut canvas,
                to_pixel(center),
                m.node_radius.round() as i32,
                NODE_COLOR,
            );
            self.draw_centered_text(&mut canvas, center, &graph[node], m.label_px, BLACK, None);
        }

        for (anchor, label) in &edge_labels {
            self.draw_centered_text(
                &mut canvas,
                *anchor,
                label,
                m.label_px,
                EDGE_LABEL_COLOR,
                Some(WHITE),
            );
        }

        let title_center = (m.width as f64 / 2.0, m.title_band / 2.0);
        self.draw_centered_text(&mut canvas, title_center, title, m.title_px, BLACK, None);

        canvas
    }

    /// Renders and writes the graph as PNG, replacing any existing file.
    pub fn render_to_file(
        &self,
        pair_graph: &PairGraph,
        layout: &Layout,
        title: &str,
        path: &Path,
    ) -> Result<(), RenderError> {
        let canvas = self.render(pair_graph, layout, title);

        canvas
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| RenderError::ImageWrite {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            "Wrote {}x{} graph image to {}",
            canvas.width(),
            canvas.height(),
            path.display()
        );
        Ok(())
    }

    /// Draws an edge ending with an arrowhead on the target node's rim.
    fn draw_arrow(&self, canvas: &mut RgbImage, from: (f64, f64), to: (f64, f64)) {
        let m = self.metrics;
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        if length <= m.node_radius + m.arrow_length {
            return;
        }
        let (ux, uy) = (dx / length, dy / length);

        let tip = (to.0 - ux * m.node_radius, to.1 - uy * m.node_radius);
        let base = (tip.0 - ux * m.arrow_length, tip.1 - uy * m.arrow_length);

        draw_thick_line(canvas, from, base, m.edge_half_width, EDGE_COLOR);

        let spread = m.arrow_length * 0.35;
        let head = [
            tip,
            (base.0 - uy * spread, base.1 + ux * spread),
            (base.0 + uy * spread, base.1 - ux * spread),
        ];
        let points = to_points(&head);
        if points.first() != points.last() {
            draw_polygon_mut(canvas, &points, EDGE_COLOR);
        }
    }

    /// Draws a loop above the node and returns where its label goes.
    fn draw_self_loop(&self, canvas: &mut RgbImage, center: (f64, f64)) -> (f64, f64) {
        let m = self.metrics;
        let loop_radius = m.node_radius * 0.6;
        let loop_center = (center.0, center.1 - m.node_radius - loop_radius * 0.5);
        let thickness = (m.edge_half_width * 2.0).round().max(1.0) as i32;
        let base_radius = loop_radius.round() as i32;

        for step in 0..thickness {
            let radius = base_radius - thickness / 2 + step;
            if radius > 0 {
                draw_hollow_circle_mut(canvas, to_pixel(loop_center), radius, EDGE_COLOR);
            }
        }

        (loop_center.0, loop_center.1 - loop_radius)
    }

    fn draw_centered_text(
        &self,
        canvas: &mut RgbImage,
        center: (f64, f64),
        text: &str,
        px: f32,
        color: Rgb<u8>,
        background: Option<Rgb<u8>>,
    ) {
        if text.is_empty() {
            return;
        }
        let scale = PxScale::from(px);
        let (w, h) = text_size(scale, &self.font, text);
        if w == 0 || h == 0 {
            return;
        }
        let x = (center.0 - w as f64 / 2.0).round() as i32;
        let y = (center.1 - h as f64 / 2.0).round() as i32;

        if let Some(fill) = background {
            let pad = (px / 4.0).round() as i32;
            let rect = Rect::at(x - pad, y - pad)
                .of_size(w + 2 * pad as u32, h + 2 * pad as u32);
            draw_filled_rect_mut(canvas, rect, fill);
        }

        draw_text_mut(canvas, color, x, y, scale, &self.font, text);
    }
}

/// Tries each candidate path and returns the first font that loads.
pub fn locate_system_font(candidates: &[&str]) -> Result<(PathBuf, FontVec), RenderError> {
    let mut searched = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if !path.is_file() {
            searched.push(path);
            continue;
        }
        match load_font(&path) {
            Ok(font) => return Ok((path, font)),
            Err(e) => {
                debug!("Ignoring font candidate: {}", e);
                searched.push(path);
            }
        }
    }

    Err(RenderError::FontUnavailable { searched })
}

fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    if !path.exists() {
        return Err(RenderError::FontUnavailable {
            searched: vec![path.to_path_buf()],
        });
    }

    let bytes = std::fs::read(path).map_err(|source| RenderError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;

    FontVec::try_from_vec(bytes).map_err(|_| RenderError::InvalidFont {
        path: path.to_path_buf(),
    })
}

/// Draws a line of the given half width as a filled quadrilateral.
fn draw_thick_line(
    canvas: &mut RgbImage,
    from: (f64, f64),
    to: (f64, f64),
    half_width: f64,
    color: Rgb<u8>,
) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1.0 {
        return;
    }
    let (nx, ny) = (-dy / length * half_width, dx / length * half_width);

    let quad = [
        (from.0 + nx, from.1 + ny),
        (to.0 + nx, to.1 + ny),
        (to.0 - nx, to.1 - ny),
        (from.0 - nx, from.1 - ny),
    ];
    let points = to_points(&quad);
    if points.first() != points.last() {
        draw_polygon_mut(canvas, &points, color);
    }
}

/// Shifts a segment sideways by `offset` pixels, to the right of its direction.
fn offset_segment(from: (f64, f64), to: (f64, f64), offset: f64) -> ((f64, f64), (f64, f64)) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if offset == 0.0 || length == 0.0 {
        return (from, to);
    }
    let (nx, ny) = (-dy / length * offset, dx / length * offset);
    ((from.0 + nx, from.1 + ny), (to.0 + nx, to.1 + ny))
}

fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

fn to_pixel(p: (f64, f64)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

fn to_points(points: &[(f64, f64)]) -> Vec<Point<i32>> {
    points
        .iter()
        .map(|&p| {
            let (x, y) = to_pixel(p);
            Point::new(x, y)
        })
        .collect()
}
