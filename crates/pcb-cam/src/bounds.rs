use log::debug;

use crate::arc::Arc;
use crate::error::CamError;
use crate::parsers::gerber::excellon::{DrillProgram, Step};
use crate::state::GraphicsState;
use crate::types::{DataBlock, GerberDocument, ImageBounds, InterpolationMode};

impl DataBlock {
    /// Grow `bounds` by the footprint this block leaves, given the state
    /// before the block is applied.
    pub fn check_bounds(
        &self,
        line: usize,
        state: &GraphicsState,
        bounds: &mut ImageBounds,
    ) -> Result<(), CamError> {
        match self {
            DataBlock::Flash { x, y } => {
                let aperture = state.require_aperture(line)?;
                let (x0, x1, y0, y1) = aperture.flash_extent(*x, *y);
                bounds.update(state.to_mm(x0), state.to_mm(x1), state.to_mm(y0), state.to_mm(y1));
            }
            DataBlock::Interpolate { mode, x, y, center } => {
                let (hx, hy, radius) = if state.in_region {
                    (0.0, 0.0, 0.0)
                } else {
                    let aperture = state.require_aperture(line)?;
                    let (hx, hy) = aperture.half_extents();
                    (
                        state.to_mm(hx),
                        state.to_mm(hy),
                        state.to_mm(aperture.stroke_width() / 2.0),
                    )
                };
                let start = state.position();
                let end = state.point_mm(*x, *y);
                bounds.expand_around(start.0, start.1, hx, hy);
                bounds.expand_around(end.0, end.1, hx, hy);

                if let (Some((cx, cy)), true) = (center, *mode != InterpolationMode::Linear) {
                    let center = state.point_mm(*cx, *cy);
                    let clockwise = *mode == InterpolationMode::ClockwiseArc;
                    if let Some(arc) = Arc::new(start, end, center, clockwise) {
                        for (ex, ey) in arc.axis_extremes() {
                            bounds.expand_around(ex, ey, radius, radius);
                        }
                    }
                }
            }
            DataBlock::ApertureSelect(_)
            | DataBlock::Move { .. }
            | DataBlock::RegionStart
            | DataBlock::RegionEnd
            | DataBlock::PolaritySet(_)
            | DataBlock::Attribute { .. }
            | DataBlock::FormatSpec(_) => {}
        }
        Ok(())
    }
}

/// Bounding box of everything a Gerber document draws, in millimetres.
pub fn gerber_bounds(doc: &GerberDocument) -> Result<ImageBounds, CamError> {
    let mut state = GraphicsState::new(&doc.apertures);
    let mut bounds = ImageBounds::empty();
    for block in &doc.blocks {
        block.value.check_bounds(block.line, &state, &mut bounds)?;
        state.apply(block)?;
    }
    state.finish(doc.blocks.last().map_or(0, |b| b.line))?;
    debug!(
        "Gerber bounds: x {:.3}..{:.3}, y {:.3}..{:.3}",
        bounds.x_min, bounds.x_max, bounds.y_min, bounds.y_max
    );
    Ok(bounds)
}

/// Bounding box of every hole in a drill program, in millimetres.
pub fn drill_bounds(program: &DrillProgram) -> Result<ImageBounds, CamError> {
    let mut bounds = ImageBounds::empty();
    let mut radius = None;
    for step in &program.steps {
        match step {
            Step::ChangeTool(id) => {
                radius = Some(program.units.to_mm(program.tool(*id)?.size) / 2.0);
            }
            Step::Drill { x, y } => {
                let r = radius.ok_or(CamError::StepBeforeTool)?;
                bounds.expand_around(program.units.to_mm(*x), program.units.to_mm(*y), r, r);
            }
            Step::UnloadTool => radius = None,
        }
    }
    debug!(
        "Drill bounds: x {:.3}..{:.3}, y {:.3}..{:.3}",
        bounds.x_min, bounds.x_max, bounds.y_min, bounds.y_max
    );
    Ok(bounds)
}
