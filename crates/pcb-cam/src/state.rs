use crate::error::CamError;
use crate::parsers::gerber::apertures::{Aperture, ApertureTable};
use crate::parsers::gerber::coord::Units;
use crate::types::{DataBlock, FormatDirective, Located, Polarity};

/// Gerber graphics state, advanced one block at a time by every consumer.
///
/// The cursor is kept in document units; [`GraphicsState::position`] converts
/// to millimetres with the unit mode in effect.
#[derive(Debug, Clone)]
pub struct GraphicsState<'a> {
    apertures: &'a ApertureTable,
    x: f64,
    y: f64,
    aperture: Option<u32>,
    pub polarity: Polarity,
    pub units: Units,
    pub in_region: bool,
}

impl<'a> GraphicsState<'a> {
    pub fn new(apertures: &'a ApertureTable) -> Self {
        Self {
            apertures,
            x: 0.0,
            y: 0.0,
            aperture: None,
            polarity: Polarity::Dark,
            units: Units::Millimeters,
            in_region: false,
        }
    }

    /// Current point in millimetres.
    pub fn position(&self) -> (f64, f64) {
        (self.to_mm(self.x), self.to_mm(self.y))
    }

    pub fn to_mm(&self, value: f64) -> f64 {
        self.units.to_mm(value)
    }

    /// Convert a document-unit point to millimetres.
    pub fn point_mm(&self, x: f64, y: f64) -> (f64, f64) {
        (self.to_mm(x), self.to_mm(y))
    }

    pub fn apertures(&self) -> &'a ApertureTable {
        self.apertures
    }

    pub fn aperture_number(&self) -> Option<u32> {
        self.aperture
    }

    pub fn current_aperture(&self) -> Option<&'a Aperture> {
        self.aperture.and_then(|n| self.apertures.get(n))
    }

    /// Aperture a flash or stroke on `line` draws with.
    pub fn require_aperture(&self, line: usize) -> Result<&'a Aperture, CamError> {
        self.current_aperture()
            .ok_or(CamError::NoApertureSelected { line })
    }

    /// Validate `block` against the current state and advance past it.
    pub fn apply(&mut self, block: &Located<DataBlock>) -> Result<(), CamError> {
        let line = block.line;
        match &block.value {
            DataBlock::ApertureSelect(number) => {
                if self.apertures.get(*number).is_none() {
                    return Err(CamError::UnknownAperture {
                        number: *number,
                        line,
                    });
                }
                self.aperture = Some(*number);
            }
            DataBlock::Flash { x, y } => {
                if self.in_region {
                    return Err(CamError::InvalidRegion {
                        line,
                        reason: "flash inside a region".into(),
                    });
                }
                self.require_aperture(line)?;
                self.move_to(*x, *y);
            }
            DataBlock::Move { x, y } => self.move_to(*x, *y),
            DataBlock::Interpolate { x, y, .. } => {
                if !self.in_region {
                    self.require_aperture(line)?;
                }
                self.move_to(*x, *y);
            }
            DataBlock::RegionStart => {
                if self.in_region {
                    return Err(CamError::InvalidRegion {
                        line,
                        reason: "G36 inside a region".into(),
                    });
                }
                self.in_region = true;
            }
            DataBlock::RegionEnd => {
                if !self.in_region {
                    return Err(CamError::InvalidRegion {
                        line,
                        reason: "G37 without G36".into(),
                    });
                }
                self.in_region = false;
            }
            DataBlock::PolaritySet(polarity) => self.polarity = *polarity,
            DataBlock::FormatSpec(FormatDirective::Units(units)) => self.units = *units,
            DataBlock::FormatSpec(FormatDirective::Coordinate(_)) | DataBlock::Attribute { .. } => {}
        }
        Ok(())
    }

    /// Check the state at the end of the document.
    pub fn finish(&self, last_line: usize) -> Result<(), CamError> {
        if self.in_region {
            return Err(CamError::InvalidRegion {
                line: last_line,
                reason: "region not closed before end of file".into(),
            });
        }
        Ok(())
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}
