use std::f64::consts::{PI, TAU};

/// Circular arc from a start point to an end point around an absolute centre.
///
/// `sweep` is signed: positive counter-clockwise, negative clockwise. Equal
/// start and end points describe a full circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub center: (f64, f64),
    pub radius: f64,
    pub start_angle: f64,
    pub sweep: f64,
}

impl Arc {
    /// Returns `None` for a degenerate arc whose centre sits on the start point.
    pub fn new(start: (f64, f64), end: (f64, f64), center: (f64, f64), clockwise: bool) -> Option<Self> {
        let (cx, cy) = center;
        let radius = ((start.0 - cx).powi(2) + (start.1 - cy).powi(2)).sqrt();
        if radius < 1e-9 {
            return None;
        }

        let start_angle = (start.1 - cy).atan2(start.0 - cx);
        let end_angle = (end.1 - cy).atan2(end.0 - cx);

        let sweep = if clockwise {
            let mut s = end_angle - start_angle;
            if s >= -1e-12 {
                s -= TAU;
            }
            s
        } else {
            let mut s = end_angle - start_angle;
            if s <= 1e-12 {
                s += TAU;
            }
            s
        };

        Some(Self {
            center,
            radius,
            start_angle,
            sweep,
        })
    }

    pub fn point_at(&self, angle: f64) -> (f64, f64) {
        (
            self.center.0 + self.radius * angle.cos(),
            self.center.1 + self.radius * angle.sin(),
        )
    }

    /// Polyline approximation, roughly 2 degrees per segment, both ends included.
    pub fn points(&self) -> Vec<(f64, f64)> {
        let segments = ((self.sweep.abs() / (PI / 90.0)).ceil() as usize).max(2);
        (0..=segments)
            .map(|k| {
                let t = k as f64 / segments as f64;
                self.point_at(self.start_angle + t * self.sweep)
            })
            .collect()
    }

    /// Points where the arc crosses 0, 90, 180 or 270 degrees.
    pub fn axis_extremes(&self) -> Vec<(f64, f64)> {
        (0..4)
            .map(|k| k as f64 * PI / 2.0)
            .filter(|&theta| {
                let delta = if self.sweep >= 0.0 {
                    (theta - self.start_angle).rem_euclid(TAU)
                } else {
                    (self.start_angle - theta).rem_euclid(TAU)
                };
                delta <= self.sweep.abs() + 1e-12
            })
            .map(|theta| self.point_at(theta))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quarter_arc_ccw() {
        let arc = Arc::new((1.0, 0.0), (0.0, 1.0), (0.0, 0.0), false).unwrap();
        assert_abs_diff_eq!(arc.radius, 1.0);
        assert_abs_diff_eq!(arc.sweep, PI / 2.0, epsilon = 1e-12);
        let extremes = arc.axis_extremes();
        assert_eq!(extremes.len(), 2);
    }

    #[test]
    fn test_quarter_arc_cw_goes_the_long_way() {
        let arc = Arc::new((1.0, 0.0), (0.0, 1.0), (0.0, 0.0), true).unwrap();
        assert_abs_diff_eq!(arc.sweep, -1.5 * PI, epsilon = 1e-12);
        // passes 0, 270, 180 and ends at 90
        assert_eq!(arc.axis_extremes().len(), 4);
    }

    #[test]
    fn test_full_circle() {
        let arc = Arc::new((1.0, 0.0), (1.0, 0.0), (0.0, 0.0), false).unwrap();
        assert_abs_diff_eq!(arc.sweep, TAU, epsilon = 1e-12);
        let pts = arc.points();
        let (x, y) = *pts.last().unwrap();
        assert_abs_diff_eq!(x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_points_stay_on_circle() {
        let arc = Arc::new((2.0, 1.0), (1.0, 2.0), (1.0, 1.0), false).unwrap();
        for (x, y) in arc.points() {
            assert_abs_diff_eq!(((x - 1.0).powi(2) + (y - 1.0).powi(2)).sqrt(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_degenerate() {
        assert!(Arc::new((1.0, 1.0), (2.0, 2.0), (1.0, 1.0), false).is_none());
    }
}
