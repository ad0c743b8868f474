use std::collections::HashMap;
use std::f64::consts::PI;

/// Segments used to sample a full circle when building outlines.
pub const CIRCLE_SEGMENTS: usize = 64;

/// Aperture shape from an %AD command, sizes in document units.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle {
        diameter: f64,
    },
    Rectangle {
        x_size: f64,
        y_size: f64,
    },
    Obround {
        x_size: f64,
        y_size: f64,
    },
    Polygon {
        outer_diameter: f64,
        vertices: u32,
        rotation: f64,
    },
}

/// Hole cut out of the middle of a standard aperture.
#[derive(Debug, Clone, PartialEq)]
pub enum Hole {
    Circle { diameter: f64 },
    Rectangle { x_size: f64, y_size: f64 },
}

impl Hole {
    pub fn size(&self) -> (f64, f64) {
        match *self {
            Hole::Circle { diameter } => (diameter, diameter),
            Hole::Rectangle { x_size, y_size } => (x_size, y_size),
        }
    }
}

/// How an obround is assembled: two semicircular caps on the shorter axis
/// joined by two straight edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObroundProfile {
    pub cap_radius: f64,
    pub edge_length: f64,
    /// Caps on the left/right ends (x_size >= y_size).
    pub horizontal: bool,
}

impl ObroundProfile {
    pub fn new(x_size: f64, y_size: f64) -> Self {
        Self {
            cap_radius: x_size.min(y_size) / 2.0,
            edge_length: (x_size - y_size).abs(),
            horizontal: x_size >= y_size,
        }
    }

    /// Closed outline centred on the origin, `segs` segments per cap.
    pub fn outline(&self, segs: usize) -> Vec<[f64; 2]> {
        let r = self.cap_radius;
        let half = self.edge_length / 2.0;
        let mut pts = Vec::with_capacity(segs * 2 + 2);

        if self.horizontal {
            // Right cap: -PI/2 -> PI/2, left cap: PI/2 -> 3PI/2
            for k in 0..=segs {
                let a = -PI / 2.0 + PI * (k as f64) / (segs as f64);
                pts.push([half + r * a.cos(), r * a.sin()]);
            }
            for k in 0..=segs {
                let a = PI / 2.0 + PI * (k as f64) / (segs as f64);
                pts.push([-half + r * a.cos(), r * a.sin()]);
            }
        } else {
            // Top cap: 0 -> PI, bottom cap: PI -> 2PI
            for k in 0..=segs {
                let a = PI * (k as f64) / (segs as f64);
                pts.push([r * a.cos(), half + r * a.sin()]);
            }
            for k in 0..=segs {
                let a = PI + PI * (k as f64) / (segs as f64);
                pts.push([r * a.cos(), -half + r * a.sin()]);
            }
        }

        pts
    }
}

/// An aperture in the aperture table.
#[derive(Debug, Clone, PartialEq)]
pub struct Aperture {
    pub number: u32,
    pub shape: Shape,
    pub hole: Option<Hole>,
}

impl Aperture {
    /// Build an aperture, rejecting negative sizes and holes that do not fit.
    pub fn new(number: u32, shape: Shape, hole: Option<Hole>) -> Result<Self, String> {
        let aperture = Self {
            number,
            shape,
            hole,
        };
        let (w, h) = aperture.size();
        if !(w >= 0.0 && h >= 0.0) {
            return Err(format!("D{number}: negative aperture size"));
        }
        if let Shape::Polygon { vertices, .. } = aperture.shape {
            if !(3..=12).contains(&vertices) {
                return Err(format!("D{number}: polygon needs 3 to 12 vertices, got {vertices}"));
            }
        }
        if let Some(hole) = &aperture.hole {
            let (hw, hh) = hole.size();
            if !(hw >= 0.0 && hh >= 0.0) {
                return Err(format!("D{number}: negative hole size"));
            }
            if hw > w || hh > h {
                return Err(format!(
                    "D{number}: hole {hw}x{hh} larger than aperture {w}x{h}"
                ));
            }
        }
        Ok(aperture)
    }

    /// Full width and height of the aperture.
    pub fn size(&self) -> (f64, f64) {
        match self.shape {
            Shape::Circle { diameter } => (diameter, diameter),
            Shape::Rectangle { x_size, y_size } | Shape::Obround { x_size, y_size } => {
                (x_size, y_size)
            }
            Shape::Polygon { outer_diameter, .. } => (outer_diameter, outer_diameter),
        }
    }

    pub fn half_extents(&self) -> (f64, f64) {
        let (w, h) = self.size();
        (w / 2.0, h / 2.0)
    }

    /// Half the smaller dimension.
    pub fn min_size(&self) -> f64 {
        let (hx, hy) = self.half_extents();
        hx.min(hy)
    }

    /// Effective stroke width when the aperture is used for D01 draws.
    /// For circles, this is the diameter. For rectangles/obrounds, it's the minimum dimension.
    pub fn stroke_width(&self) -> f64 {
        match self.shape {
            Shape::Circle { diameter } => diameter,
            Shape::Rectangle { x_size, y_size } | Shape::Obround { x_size, y_size } => {
                x_size.min(y_size)
            }
            Shape::Polygon { outer_diameter, .. } => outer_diameter,
        }
    }

    /// Footprint of a flash at (x, y): `(x_min, x_max, y_min, y_max)`.
    pub fn flash_extent(&self, x: f64, y: f64) -> (f64, f64, f64, f64) {
        let (hx, hy) = self.half_extents();
        (x - hx, x + hx, y - hy, y + hy)
    }

    /// Outer contour centred on the origin.
    pub fn outline(&self) -> Vec<[f64; 2]> {
        match self.shape {
            Shape::Circle { diameter } => regular_polygon(diameter / 2.0, CIRCLE_SEGMENTS, 0.0),
            Shape::Rectangle { x_size, y_size } => {
                let (hx, hy) = (x_size / 2.0, y_size / 2.0);
                vec![[-hx, -hy], [hx, -hy], [hx, hy], [-hx, hy]]
            }
            Shape::Obround { x_size, y_size } => {
                ObroundProfile::new(x_size, y_size).outline(CIRCLE_SEGMENTS / 4)
            }
            Shape::Polygon {
                outer_diameter,
                vertices,
                rotation,
            } => regular_polygon(outer_diameter / 2.0, vertices as usize, rotation.to_radians()),
        }
    }
}

fn regular_polygon(radius: f64, n: usize, rotation: f64) -> Vec<[f64; 2]> {
    (0..n)
        .map(|k| {
            let angle = rotation + 2.0 * PI * (k as f64) / (n as f64);
            [radius * angle.cos(), radius * angle.sin()]
        })
        .collect()
}

/// Aperture table built from %AD commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApertureTable {
    apertures: HashMap<u32, Aperture>,
}

impl ApertureTable {
    /// Add an aperture. Numbers may only be assigned once per document.
    pub fn define(&mut self, aperture: Aperture) -> Result<(), String> {
        if self.apertures.contains_key(&aperture.number) {
            return Err(format!("aperture D{} defined twice", aperture.number));
        }
        self.apertures.insert(aperture.number, aperture);
        Ok(())
    }

    pub fn get(&self, number: u32) -> Option<&Aperture> {
        self.apertures.get(&number)
    }

    pub fn len(&self) -> usize {
        self.apertures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apertures.is_empty()
    }
}
