//! Raster preview of a Gerber layer.
//!
//! Every aperture is rendered once into a small pixmap (with and without its
//! hole) and composited at each flash. Strokes and regions are drawn straight
//! onto the layer surface. Clear polarity erases instead of painting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tiny_skia::{
    BlendMode, Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Rect,
    Stroke, Transform,
};

use crate::arc::Arc;
use crate::bounds::gerber_bounds;
use crate::error::CamError;
use crate::parsers::gerber::apertures::{Aperture, Hole, Shape};
use crate::state::GraphicsState;
use crate::types::{DataBlock, GerberDocument, ImageBounds, InterpolationMode, Polarity};

/// Raster pass settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub pixels_per_mm: f64,
    /// Empty border around the drawing, in pixels
    pub margin_px: u32,
    /// Composite apertures with their holes cut out
    pub holes: bool,
    /// Write every newly rendered aperture as `aperture-<n>.png` into this directory
    pub aperture_dump: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            pixels_per_mm: 40.0,
            margin_px: 4,
            holes: true,
            aperture_dump: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Apertures rendered into the cache
    pub renders: usize,
    /// Flashes served from the cache
    pub cache_hits: usize,
    pub flashes: usize,
}

/// Finished layer image.
pub struct RenderOutput {
    pub pixmap: Pixmap,
    pub bounds: ImageBounds,
    pub stats: RenderStats,
}

impl RenderOutput {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, CamError> {
        self.pixmap
            .encode_png()
            .map_err(|e| CamError::Render(e.to_string()))
    }

    pub fn save_png(&self, path: &Path) -> Result<(), CamError> {
        self.pixmap
            .save_png(path)
            .map_err(|e| CamError::Render(e.to_string()))?;
        info!("Wrote {} ({}x{})", path.display(), self.width(), self.height());
        Ok(())
    }
}

fn copper_color() -> Color {
    Color::from_rgba8(184, 115, 51, 255)
}

fn polarity_blend(polarity: Polarity) -> BlendMode {
    match polarity {
        Polarity::Dark => BlendMode::SourceOver,
        Polarity::Clear => BlendMode::DestinationOut,
    }
}

fn paint_for(polarity: Polarity) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(copper_color());
    paint.anti_alias = true;
    paint.blend_mode = polarity_blend(polarity);
    paint
}

/// Upper limit for either side of a surface, in pixels.
const MAX_SURFACE_PX: f64 = 32_768.0;

/// Pixel count for `length_px` of drawing plus `padding_px`, at least one.
fn surface_side(length_px: f64, padding_px: u32) -> Option<u32> {
    let side = length_px.ceil() + f64::from(padding_px);
    if side.is_finite() && side <= MAX_SURFACE_PX {
        Some(side.max(1.0) as u32)
    } else {
        None
    }
}

/// Cached rendering of one aperture, centred at `center` (pixels).
struct ApertureImage {
    plain: Pixmap,
    holed: Pixmap,
    center: (f32, f32),
}

impl ApertureImage {
    fn render(aperture: &Aperture, pixels_per_mm: f64, unit_scale: f64) -> Result<Self, CamError> {
        let scale = (pixels_per_mm * unit_scale) as f32;
        let (w, h) = aperture.size();
        let too_large = || {
            CamError::Render(format!(
                "D{}: {w}x{h} aperture is too large to render at {pixels_per_mm} px/mm",
                aperture.number
            ))
        };
        let width = surface_side(w * f64::from(scale), 2).ok_or_else(too_large)?;
        let height = surface_side(h * f64::from(scale), 2).ok_or_else(too_large)?;
        let mut plain = Pixmap::new(width, height).ok_or_else(|| {
            CamError::Render(format!("cannot allocate {width}x{height} image for D{}", aperture.number))
        })?;

        let center = (width as f32 / 2.0, height as f32 / 2.0);
        let transform = Transform::from_scale(scale, -scale).post_translate(center.0, center.1);

        if let Some(path) = polygon_path(&aperture.outline()) {
            plain.fill_path(
                &path,
                &paint_for(Polarity::Dark),
                FillRule::Winding,
                transform,
                None,
            );
        }

        let mut holed = plain.clone();
        if let Some(hole) = &aperture.hole {
            let path = match *hole {
                Hole::Circle { diameter } => PathBuilder::from_circle(0.0, 0.0, diameter as f32 / 2.0),
                Hole::Rectangle { x_size, y_size } => Rect::from_xywh(
                    -x_size as f32 / 2.0,
                    -y_size as f32 / 2.0,
                    x_size as f32,
                    y_size as f32,
                )
                .map(PathBuilder::from_rect),
            };
            if let Some(path) = path {
                let mut paint = paint_for(Polarity::Dark);
                paint.blend_mode = BlendMode::Clear;
                holed.fill_path(&path, &paint, FillRule::Winding, transform, None);
            }
        }

        Ok(Self {
            plain,
            holed,
            center,
        })
    }
}

fn polygon_path(points: &[[f64; 2]]) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first[0] as f32, first[1] as f32);
    for p in rest {
        pb.line_to(p[0] as f32, p[1] as f32);
    }
    pb.close();
    pb.finish()
}

/// Layer surface plus the per-pass aperture cache.
pub struct Renderer<'o> {
    options: &'o RenderOptions,
    pixmap: Pixmap,
    bounds: ImageBounds,
    /// mm -> pixels, y flipped
    transform: Transform,
    cache: HashMap<u32, ApertureImage>,
    /// Closed contours of the region being collected, in mm
    contours: Vec<Vec<(f64, f64)>>,
    stats: RenderStats,
}

impl<'o> Renderer<'o> {
    pub fn new(bounds: ImageBounds, options: &'o RenderOptions) -> Result<Self, CamError> {
        let s = options.pixels_per_mm;
        let margin = options.margin_px;
        let too_large = || {
            CamError::Render(format!(
                "{:.3}x{:.3} mm drawing is too large to render at {s} px/mm",
                bounds.width(),
                bounds.height()
            ))
        };
        let padding = margin.checked_mul(2).ok_or_else(too_large)?;
        let width = surface_side(bounds.width() * s, padding).ok_or_else(too_large)?;
        let height = surface_side(bounds.height() * s, padding).ok_or_else(too_large)?;
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| CamError::Render(format!("cannot allocate {width}x{height} surface")))?;

        let (x_min, y_min) = if bounds.is_empty() {
            (0.0, 0.0)
        } else {
            bounds.min_corner()
        };
        let m = margin as f64;
        let transform = Transform::from_scale(s as f32, -s as f32).post_translate(
            (m - x_min * s) as f32,
            (height as f64 - m + y_min * s) as f32,
        );

        if let Some(dir) = &options.aperture_dump {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self {
            options,
            pixmap,
            bounds,
            transform,
            cache: HashMap::new(),
            contours: Vec::new(),
            stats: RenderStats::default(),
        })
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn finish(self) -> RenderOutput {
        RenderOutput {
            pixmap: self.pixmap,
            bounds: self.bounds,
            stats: self.stats,
        }
    }

    fn to_pixels(&self, x: f64, y: f64) -> (f32, f32) {
        let t = self.transform;
        (
            t.sx * x as f32 + t.kx * y as f32 + t.tx,
            t.ky * x as f32 + t.sy * y as f32 + t.ty,
        )
    }

    fn flash(
        &mut self,
        aperture: &Aperture,
        unit_scale: f64,
        at: (f64, f64),
        polarity: Polarity,
    ) -> Result<(), CamError> {
        self.stats.flashes += 1;
        if self.cache.contains_key(&aperture.number) {
            self.stats.cache_hits += 1;
        } else {
            let image = ApertureImage::render(aperture, self.options.pixels_per_mm, unit_scale)?;
            self.stats.renders += 1;
            if let Some(dir) = &self.options.aperture_dump {
                let path = dir.join(format!("aperture-{}.png", aperture.number));
                image
                    .holed
                    .save_png(&path)
                    .map_err(|e| CamError::Render(e.to_string()))?;
                debug!("Dumped D{} to {}", aperture.number, path.display());
            }
            self.cache.insert(aperture.number, image);
        }

        let (px, py) = self.to_pixels(at.0, at.1);
        let Some(image) = self.cache.get(&aperture.number) else {
            return Ok(());
        };
        let source = if self.options.holes {
            &image.holed
        } else {
            &image.plain
        };
        let paint = PixmapPaint {
            blend_mode: polarity_blend(polarity),
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            (px - image.center.0).round() as i32,
            (py - image.center.1).round() as i32,
            source.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn stroke(&mut self, points: &[(f64, f64)], width: f64, round: bool, polarity: Polarity) {
        let mut pb = PathBuilder::new();
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        pb.move_to(first.0 as f32, first.1 as f32);
        for p in rest {
            pb.line_to(p.0 as f32, p.1 as f32);
        }
        let Some(path) = pb.finish() else {
            return;
        };
        let (line_cap, line_join) = if round {
            (LineCap::Round, LineJoin::Round)
        } else {
            (LineCap::Square, LineJoin::Miter)
        };
        let stroke = Stroke {
            width: width as f32,
            line_cap,
            line_join,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint_for(polarity), &stroke, self.transform, None);
    }

    /// Add a contour edge to the region being collected.
    fn region_edge(&mut self, points: Vec<(f64, f64)>) {
        match self.contours.last_mut() {
            Some(contour) if !contour.is_empty() => contour.extend(points.into_iter().skip(1)),
            _ => self.contours.push(points),
        }
    }

    fn fill_region(&mut self, polarity: Polarity) {
        let mut pb = PathBuilder::new();
        for contour in self.contours.drain(..).filter(|c| c.len() >= 3) {
            pb.move_to(contour[0].0 as f32, contour[0].1 as f32);
            for p in &contour[1..] {
                pb.line_to(p.0 as f32, p.1 as f32);
            }
            pb.close();
        }
        if let Some(path) = pb.finish() {
            self.pixmap.fill_path(
                &path,
                &paint_for(polarity),
                FillRule::EvenOdd,
                self.transform,
                None,
            );
        }
    }
}

impl DataBlock {
    /// Draw this block onto the layer surface, given the state before it is applied.
    pub fn render_to_surface(
        &self,
        line: usize,
        state: &GraphicsState,
        renderer: &mut Renderer,
    ) -> Result<(), CamError> {
        match self {
            DataBlock::Flash { x, y } => {
                let aperture = state.require_aperture(line)?;
                renderer.flash(
                    aperture,
                    state.units.scale(),
                    state.point_mm(*x, *y),
                    state.polarity,
                )?;
            }
            DataBlock::Interpolate { mode, x, y, center } => {
                let start = state.position();
                let end = state.point_mm(*x, *y);
                let points = match (mode, center) {
                    (InterpolationMode::Linear, _) | (_, None) => vec![start, end],
                    (_, Some((cx, cy))) => {
                        let clockwise = *mode == InterpolationMode::ClockwiseArc;
                        match Arc::new(start, end, state.point_mm(*cx, *cy), clockwise) {
                            Some(arc) => arc.points(),
                            None => vec![start, end],
                        }
                    }
                };

                if state.in_region {
                    renderer.region_edge(points);
                } else {
                    let aperture = state.require_aperture(line)?;
                    let round = matches!(aperture.shape, Shape::Circle { .. });
                    let width = state.to_mm(aperture.stroke_width());
                    renderer.stroke(&points, width, round, state.polarity);
                }
            }
            DataBlock::Move { x, y } => {
                if state.in_region {
                    renderer.contours.push(vec![state.point_mm(*x, *y)]);
                }
            }
            DataBlock::RegionStart => renderer.contours.clear(),
            DataBlock::RegionEnd => renderer.fill_region(state.polarity),
            DataBlock::ApertureSelect(_)
            | DataBlock::PolaritySet(_)
            | DataBlock::Attribute { .. }
            | DataBlock::FormatSpec(_) => {}
        }
        Ok(())
    }
}

/// Rasterize a Gerber document. Runs its own bounds pass to size the surface.
pub fn render_gerber(doc: &GerberDocument, options: &RenderOptions) -> Result<RenderOutput, CamError> {
    let bounds = gerber_bounds(doc)?;
    let mut renderer = Renderer::new(bounds, options)?;
    let mut state = GraphicsState::new(&doc.apertures);
    for block in &doc.blocks {
        block.value.render_to_surface(block.line, &state, &mut renderer)?;
        state.apply(block)?;
    }
    state.finish(doc.blocks.last().map_or(0, |b| b.line))?;

    let stats = renderer.stats();
    debug!(
        "Render: {} flashes, {} apertures rendered, {} cache hits",
        stats.flashes, stats.renders, stats.cache_hits
    );
    Ok(renderer.finish())
}
