use serde::{Deserialize, Serialize};

/// Which zeros a coordinate word may omit (`L` or `T` in `%FS`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroOmission {
    #[default]
    Leading,
    Trailing,
}

/// Coordinate format from the %FS (Format Specification) command.
///
/// Example: `%FSLAX24Y24*%` means leading-zero omission, absolute mode,
/// 2 integer digits + 4 decimal digits for both X and Y.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateFormat {
    pub zeros: ZeroOmission,
    pub x_integer: u8,
    pub x_decimal: u8,
    pub y_integer: u8,
    pub y_decimal: u8,
}

impl Default for CoordinateFormat {
    fn default() -> Self {
        // Common default: 2.4 format (FSLAX24Y24)
        Self {
            zeros: ZeroOmission::Leading,
            x_integer: 2,
            x_decimal: 4,
            y_integer: 2,
            y_decimal: 4,
        }
    }
}

/// Parse a plain decimal number: optional sign, digits, optional `.digits`.
///
/// Exponents, `inf` and `nan` are not numbers in Gerber or drill files.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (integer.is_empty() && fraction.is_empty()) || !digits(integer) || !digits(fraction) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coordinate axis a number belongs to. I offsets use the X digits, J the Y digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl CoordinateFormat {
    /// Decode a coordinate number (e.g. `-12345`) into document units.
    ///
    /// With leading-zero omission the last N digits are the decimal part. With
    /// trailing-zero omission the digits are left-aligned against the integer
    /// part and padded on the right. A number with an explicit decimal point is
    /// taken as written.
    pub fn decode(&self, text: &str, axis: Axis) -> Option<f64> {
        if text.contains('.') {
            return parse_decimal(text);
        }
        let (integer, decimal) = match axis {
            Axis::X => (self.x_integer, self.x_decimal),
            Axis::Y => (self.y_integer, self.y_decimal),
        };
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let raw: i64 = match self.zeros {
            ZeroOmission::Leading => digits.parse().ok()?,
            ZeroOmission::Trailing => {
                let total = (integer + decimal) as usize;
                let mut padded = digits.to_string();
                while padded.len() < total {
                    padded.push('0');
                }
                padded.parse().ok()?
            }
        };
        let value = raw as f64 / 10f64.powi(decimal as i32);
        Some(if negative { -value } else { value })
    }
}

/// Unit system from the %MO command (or the INCH/METRIC drill header).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    /// Scale factor from this unit to millimetres.
    pub fn scale(self) -> f64 {
        match self {
            Units::Millimeters => 1.0,
            Units::Inches => 25.4,
        }
    }

    pub fn to_mm(self, value: f64) -> f64 {
        value * self.scale()
    }
}
