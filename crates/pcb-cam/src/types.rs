use serde::Serialize;

use crate::parsers::gerber::apertures::ApertureTable;
use crate::parsers::gerber::coord::{CoordinateFormat, Units};

/// Round a float to N decimal places.
pub fn round_f64(v: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (v * factor).round() / factor
}

fn serialize_f64_rounded<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_f64(*v, 6))
}

// ─── Image bounds ────────────────────────────────────────────────────

/// Axis-aligned bounding box in millimetres.
///
/// Starts inverted (+inf/-inf) so the first update always tightens it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageBounds {
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub x_min: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub x_max: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub y_min: f64,
    #[serde(serialize_with = "serialize_f64_rounded")]
    pub y_max: f64,
}

impl Default for ImageBounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl ImageBounds {
    pub fn empty() -> Self {
        Self {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        }
    }

    /// Tighten the box so it contains `[x_min, x_max] x [y_min, y_max]`.
    pub fn update(&mut self, x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
        self.x_min = self.x_min.min(x_min);
        self.x_max = self.x_max.max(x_max);
        self.y_min = self.y_min.min(y_min);
        self.y_max = self.y_max.max(y_max);
    }

    pub fn expand_point(&mut self, x: f64, y: f64) {
        self.update(x, x, y, y);
    }

    /// Grow to include a point surrounded by a box of the given half extents.
    pub fn expand_around(&mut self, x: f64, y: f64, half_x: f64, half_y: f64) {
        self.update(x - half_x, x + half_x, y - half_y, y + half_y);
    }

    pub fn merge(&mut self, other: &ImageBounds) {
        self.update(other.x_min, other.x_max, other.y_min, other.y_max);
    }

    pub fn merged(mut self, other: &ImageBounds) -> ImageBounds {
        self.merge(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.x_max - self.x_min
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.y_max - self.y_min
        }
    }

    pub fn min_corner(&self) -> (f64, f64) {
        (self.x_min, self.y_min)
    }

    /// Translation that moves the minimum corner to the origin.
    ///
    /// An empty box yields the identity so an empty layer still produces
    /// sensible coordinates.
    pub fn translate_to_origin(&self) -> impl Fn(f64, f64) -> (f64, f64) + Clone + 'static {
        let (dx, dy) = if self.is_empty() {
            (0.0, 0.0)
        } else {
            self.min_corner()
        };
        move |x, y| (x - dx, y - dy)
    }
}

// ─── Gerber data blocks ──────────────────────────────────────────────

/// Layer polarity from %LP command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

/// Interpolation mode in effect for a D01 operation (G01/G02/G03).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterpolationMode {
    #[default]
    Linear,
    ClockwiseArc,
    CounterClockwiseArc,
}

/// Which attribute directive produced an [`DataBlock::Attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// %TF
    File,
    /// %TA
    Aperture,
    /// %TO
    Object,
    /// %TD
    Delete,
}

/// Format-related directives, recorded in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDirective {
    /// %FS
    Coordinate(CoordinateFormat),
    /// %MO (or legacy G70/G71)
    Units(Units),
}

/// One graphics directive of a Gerber document.
///
/// Coordinates are absolute and in document units: modal X/Y values and the
/// interpolation mode are resolved by the parser, arc I/J offsets are turned
/// into an absolute centre.
#[derive(Debug, Clone, PartialEq)]
pub enum DataBlock {
    /// Dnn - select the current aperture
    ApertureSelect(u32),
    /// D03 - stamp the current aperture
    Flash { x: f64, y: f64 },
    /// D02 - move without drawing
    Move { x: f64, y: f64 },
    /// D01 - draw to (x, y); `center` is set for arcs
    Interpolate {
        mode: InterpolationMode,
        x: f64,
        y: f64,
        center: Option<(f64, f64)>,
    },
    /// G36
    RegionStart,
    /// G37
    RegionEnd,
    /// %LPD / %LPC
    PolaritySet(Polarity),
    /// %TF / %TA / %TO / %TD
    Attribute {
        kind: AttributeKind,
        name: String,
        args: Vec<String>,
    },
    /// %FS / %MO
    FormatSpec(FormatDirective),
}

/// A value tagged with the 1-based source line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub line: usize,
    pub value: T,
}

/// A parsed Gerber file: data blocks in source order plus the aperture table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GerberDocument {
    pub blocks: Vec<Located<DataBlock>>,
    pub apertures: ApertureTable,
}

impl GerberDocument {
    /// Value of the first `%TF.FileFunction` attribute, if any.
    pub fn file_function(&self) -> Option<&[String]> {
        self.blocks.iter().find_map(|b| match &b.value {
            DataBlock::Attribute {
                kind: AttributeKind::File,
                name,
                args,
            } if name == ".FileFunction" => Some(args.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_empty_bounds() {
        let b = ImageBounds::empty();
        assert!(b.is_empty());
        assert_eq!(b.width(), 0.0);
        assert_eq!(b.height(), 0.0);
    }

    #[test]
    fn test_first_update_tightens() {
        let mut b = ImageBounds::empty();
        b.update(1.0, 2.0, 3.0, 4.0);
        assert!(!b.is_empty());
        assert_eq!(b, ImageBounds { x_min: 1.0, x_max: 2.0, y_min: 3.0, y_max: 4.0 });
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let mut a = ImageBounds::empty();
        a.update(-1.0, 1.0, 0.0, 2.0);
        let mut b = ImageBounds::empty();
        b.update(0.5, 5.0, -3.0, 1.0);
        let mut c = ImageBounds::empty();
        c.expand_point(10.0, 10.0);

        assert_eq!(a.merged(&b), b.merged(&a));
        assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
        assert_eq!(
            a.merged(&b),
            ImageBounds { x_min: -1.0, x_max: 5.0, y_min: -3.0, y_max: 2.0 }
        );
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let mut a = ImageBounds::empty();
        a.update(-1.0, 1.0, 0.0, 2.0);
        assert_eq!(a.merged(&ImageBounds::empty()), a);
    }

    #[test]
    fn test_translate_to_origin_preserves_distances() {
        let mut b = ImageBounds::empty();
        b.update(-188.157, -187.331, -324.707, -306.153);
        let t = b.translate_to_origin();

        let (x0, y0) = t(b.x_min, b.y_min);
        assert_abs_diff_eq!(x0, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y0, 0.0, epsilon = 1e-12);

        let (x1, y1) = t(b.x_max, b.y_max);
        assert_abs_diff_eq!(x1, b.width(), epsilon = 1e-9);
        assert_abs_diff_eq!(y1, b.height(), epsilon = 1e-9);

        let (ax, ay) = t(-187.757, -324.307);
        let (bx, by) = t(-187.731, -306.553);
        assert_abs_diff_eq!(bx - ax, 0.026, epsilon = 1e-9);
        assert_abs_diff_eq!(by - ay, 17.754, epsilon = 1e-9);
    }

    #[test]
    fn test_translate_empty_is_identity() {
        let t = ImageBounds::empty().translate_to_origin();
        assert_eq!(t(3.0, -4.0), (3.0, -4.0));
    }

    #[test]
    fn test_bounds_json() {
        let mut b = ImageBounds::empty();
        b.update(0.1234567, 1.0, 2.0, 3.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, r#"{"x_min":0.123457,"x_max":1.0,"y_min":2.0,"y_max":3.0}"#);
    }
}
