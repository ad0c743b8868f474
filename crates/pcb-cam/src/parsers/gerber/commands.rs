use crate::error::CamError;
use crate::types::{
    AttributeKind, DataBlock, FormatDirective, GerberDocument, InterpolationMode, Located,
    Polarity,
};

use super::apertures::{Aperture, Hole, Shape};
use super::coord::{parse_decimal, Axis, CoordinateFormat, Units, ZeroOmission};
use super::lexer::{GerberToken, Token};

/// Operation code remembered for bare coordinate words (deprecated modal D codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Interpolate,
    Move,
    Flash,
}

/// Coordinate fields of one word, still as raw text.
#[derive(Debug, Default)]
struct CoordWord<'a> {
    x: Option<&'a str>,
    y: Option<&'a str>,
    i: Option<&'a str>,
    j: Option<&'a str>,
    d: Option<u32>,
}

/// Parse state for one document. Each call to [`parse_tokens`] owns a fresh one.
struct GerberParser {
    format: Option<CoordinateFormat>,
    x: f64,
    y: f64,
    mode: InterpolationMode,
    last_operation: Option<Operation>,
    ended: bool,
    doc: GerberDocument,
}

/// Parse a token stream into data blocks and an aperture table.
pub fn parse_tokens(tokens: &[Token]) -> Result<GerberDocument, CamError> {
    let mut parser = GerberParser::new();
    for token in tokens {
        parser.token(token)?;
        if parser.ended {
            break;
        }
    }
    if !parser.ended {
        let line = tokens.last().map(|t| t.line).unwrap_or(1);
        return Err(CamError::parse(line, "missing M02 end-of-file marker"));
    }
    Ok(parser.doc)
}

impl GerberParser {
    fn new() -> Self {
        Self {
            format: None,
            x: 0.0,
            y: 0.0,
            mode: InterpolationMode::Linear,
            last_operation: None,
            ended: false,
            doc: GerberDocument::default(),
        }
    }

    fn push(&mut self, line: usize, value: DataBlock) {
        self.doc.blocks.push(Located { line, value });
    }

    fn token(&mut self, token: &Token) -> Result<(), CamError> {
        match &token.token {
            GerberToken::Extended(content) => self.extended(token.line, content),
            GerberToken::Word(word) => self.word(token.line, word),
        }
    }

    // ─── Extended commands ───────────────────────────────────────────

    /// Parse an extended command (content between % delimiters).
    fn extended(&mut self, line: usize, content: &str) -> Result<(), CamError> {
        let code = content.get(..2).unwrap_or(content);
        match code {
            "FS" => {
                let format = parse_format_spec(content).map_err(|r| CamError::parse(line, r))?;
                self.format = Some(format.clone());
                self.push(line, DataBlock::FormatSpec(FormatDirective::Coordinate(format)));
            }
            "MO" => {
                let units = match content {
                    "MOMM" => Units::Millimeters,
                    "MOIN" => Units::Inches,
                    _ => return Err(CamError::parse(line, format!("bad unit mode: {content}"))),
                };
                self.push(line, DataBlock::FormatSpec(FormatDirective::Units(units)));
            }
            "AD" => {
                let aperture =
                    parse_aperture_define(content).map_err(|r| CamError::parse(line, r))?;
                self.doc
                    .apertures
                    .define(aperture)
                    .map_err(|r| CamError::parse(line, r))?;
            }
            "LP" => {
                let polarity = match content {
                    "LPD" => Polarity::Dark,
                    "LPC" => Polarity::Clear,
                    _ => return Err(CamError::parse(line, format!("bad polarity: {content}"))),
                };
                self.push(line, DataBlock::PolaritySet(polarity));
            }
            "TF" | "TA" | "TO" | "TD" => {
                self.push(line, parse_attribute(content));
            }
            "AM" => return Err(CamError::parse(line, "aperture macros are not supported")),
            "SR" => return Err(CamError::parse(line, "step and repeat is not supported")),
            "IP" | "LN" | "IN" | "OF" | "AS" | "MI" | "SF" => {
                check_legacy_image(content).map_err(|r| CamError::parse(line, r))?;
            }
            _ => {
                return Err(CamError::parse(
                    line,
                    format!("unrecognized extended command: {content}"),
                ))
            }
        }
        Ok(())
    }

    // ─── Word commands ───────────────────────────────────────────────

    /// Parse a word command (e.g., "D10", "X100Y200D01", "G01", "M02").
    ///
    /// A single word may contain an embedded G-code prefix (e.g., "G01X100Y200D01").
    fn word(&mut self, line: usize, word: &str) -> Result<(), CamError> {
        if !word.is_ascii() {
            return Err(CamError::parse(line, format!("non-ASCII character in word: {word}")));
        }
        let mut remaining = word;

        if remaining.starts_with('M') {
            return match remaining[1..].parse::<u32>() {
                Ok(0) | Ok(2) => {
                    self.ended = true;
                    Ok(())
                }
                Ok(1) => Ok(()),
                _ => Err(CamError::parse(line, format!("unrecognized M code: {word}"))),
            };
        }

        if remaining.starts_with('G') {
            let g_end = remaining[1..]
                .find(|c: char| !c.is_ascii_digit())
                .map(|i| i + 1)
                .unwrap_or(remaining.len());
            self.g_code(line, &remaining[..g_end])?;
            remaining = &remaining[g_end..];
            if remaining.is_empty() {
                return Ok(());
            }
        }

        let fields = split_coord_word(remaining)
            .ok_or_else(|| CamError::parse(line, format!("malformed word: {word}")))?;
        self.coordinates(line, word, fields)
    }

    fn g_code(&mut self, line: usize, g: &str) -> Result<(), CamError> {
        let code: u32 = g[1..]
            .parse()
            .map_err(|_| CamError::parse(line, format!("bad G code: {g}")))?;
        match code {
            1 => self.mode = InterpolationMode::Linear,
            2 => self.mode = InterpolationMode::ClockwiseArc,
            3 => self.mode = InterpolationMode::CounterClockwiseArc,
            36 => self.push(line, DataBlock::RegionStart),
            37 => self.push(line, DataBlock::RegionEnd),
            // Quadrant modes, absolute mode and the aperture-select prefix
            54 | 55 | 74 | 75 | 90 => {}
            70 => self.push(line, DataBlock::FormatSpec(FormatDirective::Units(Units::Inches))),
            71 => self.push(
                line,
                DataBlock::FormatSpec(FormatDirective::Units(Units::Millimeters)),
            ),
            91 => return Err(CamError::parse(line, "incremental coordinates are not supported")),
            _ => return Err(CamError::parse(line, format!("unrecognized G code: {g}"))),
        }
        Ok(())
    }

    fn coordinates(&mut self, line: usize, word: &str, f: CoordWord<'_>) -> Result<(), CamError> {
        let has_coords = f.x.is_some() || f.y.is_some() || f.i.is_some() || f.j.is_some();

        let operation = match f.d {
            Some(code) if code >= 10 => {
                if has_coords {
                    return Err(CamError::parse(
                        line,
                        format!("coordinates on aperture select: {word}"),
                    ));
                }
                self.push(line, DataBlock::ApertureSelect(code));
                return Ok(());
            }
            Some(1) => Operation::Interpolate,
            Some(2) => Operation::Move,
            Some(3) => Operation::Flash,
            Some(code) => {
                return Err(CamError::parse(line, format!("invalid D code D{code:02}")))
            }
            None if has_coords => self.last_operation.ok_or_else(|| {
                CamError::parse(line, format!("coordinates without D code: {word}"))
            })?,
            None => return Err(CamError::parse(line, format!("empty word: {word}"))),
        };
        self.last_operation = Some(operation);

        let format = self
            .format
            .clone()
            .ok_or_else(|| CamError::parse(line, "coordinates before %FS format"))?;
        let decode = |text: Option<&str>, axis: Axis| -> Result<Option<f64>, CamError> {
            text.map(|t| {
                format
                    .decode(t, axis)
                    .ok_or_else(|| CamError::parse(line, format!("bad coordinate {t} in {word}")))
            })
            .transpose()
        };

        let start = (self.x, self.y);
        let x = decode(f.x, Axis::X)?.unwrap_or(self.x);
        let y = decode(f.y, Axis::Y)?.unwrap_or(self.y);
        let i = decode(f.i, Axis::X)?.unwrap_or(0.0);
        let j = decode(f.j, Axis::Y)?.unwrap_or(0.0);
        self.x = x;
        self.y = y;

        let block = match operation {
            Operation::Flash => DataBlock::Flash { x, y },
            Operation::Move => DataBlock::Move { x, y },
            Operation::Interpolate => {
                let center = match self.mode {
                    InterpolationMode::Linear => None,
                    InterpolationMode::ClockwiseArc | InterpolationMode::CounterClockwiseArc => {
                        Some((start.0 + i, start.1 + j))
                    }
                };
                DataBlock::Interpolate {
                    mode: self.mode,
                    x,
                    y,
                    center,
                }
            }
        };
        self.push(line, block);
        Ok(())
    }
}

/// Split "X100Y-200I5J0D01" into its fields. Returns None on unknown letters
/// or repeated fields.
fn split_coord_word(s: &str) -> Option<CoordWord<'_>> {
    let mut fields = CoordWord::default();
    let bytes = s.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let key = bytes[pos];
        pos += 1;
        let start = pos;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
            pos += 1;
        }
        let value = &s[start..pos];
        if value.is_empty() {
            return None;
        }
        let slot = match key {
            b'X' => &mut fields.x,
            b'Y' => &mut fields.y,
            b'I' => &mut fields.i,
            b'J' => &mut fields.j,
            b'D' => {
                if fields.d.is_some() {
                    return None;
                }
                fields.d = Some(value.parse().ok()?);
                continue;
            }
            _ => return None,
        };
        if slot.replace(value).is_some() {
            return None;
        }
    }

    Some(fields)
}

/// Parse %FS command. Example: `FSLAX24Y24`
fn parse_format_spec(content: &str) -> Result<CoordinateFormat, String> {
    // Expected format: FS[L|T][A|I]X<n><m>Y<n><m>
    let s = &content[2..];
    let mut zeros = ZeroOmission::Leading;
    let mut rest = s;
    loop {
        match rest.chars().next() {
            Some('L') => zeros = ZeroOmission::Leading,
            Some('T') => zeros = ZeroOmission::Trailing,
            Some('A') => {}
            Some('I') => return Err("FS: incremental notation is not supported".into()),
            _ => break,
        }
        rest = &rest[1..];
    }

    let x_pos = rest.find('X').ok_or("FS: missing X")?;
    let y_pos = rest.find('Y').ok_or("FS: missing Y")?;
    if y_pos < x_pos {
        return Err(format!("FS: X must precede Y: {content}"));
    }
    let x_part = &rest[x_pos + 1..y_pos];
    let y_part = &rest[y_pos + 1..];

    let digits = |part: &str| -> Result<(u8, u8), String> {
        let bytes = part.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(format!("FS: invalid format digits: {part}"));
        }
        Ok((bytes[0] - b'0', bytes[1] - b'0'))
    };
    let (x_integer, x_decimal) = digits(x_part)?;
    let (y_integer, y_decimal) = digits(y_part)?;

    Ok(CoordinateFormat {
        zeros,
        x_integer,
        x_decimal,
        y_integer,
        y_decimal,
    })
}

/// Parse %AD command. Example: `ADD10C,0.020` or `ADD11R,0.040X0.020`
fn parse_aperture_define(content: &str) -> Result<Aperture, String> {
    let s = content[2..]
        .strip_prefix('D')
        .ok_or_else(|| format!("AD: expected D, got: {content}"))?;

    // Find where the code ends and the template type begins
    let type_pos = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("AD: no template type in: {s}"))?;
    let number: u32 = s[..type_pos]
        .parse()
        .map_err(|_| format!("AD: bad aperture code: {s}"))?;
    if number < 10 {
        return Err(format!("AD: aperture numbers start at 10, got D{number}"));
    }

    let rest = &s[type_pos..];
    let (template, params_str) = rest.split_once(',').unwrap_or((rest, ""));
    let params: Vec<f64> = if params_str.is_empty() {
        Vec::new()
    } else {
        params_str
            .split('X')
            .map(|p| parse_decimal(p).ok_or_else(|| format!("AD: bad param: {p}")))
            .collect::<Result<Vec<_>, _>>()?
    };

    let (shape, hole_params) = match template {
        "C" => {
            let diameter = *params.first().ok_or("AD C: missing diameter")?;
            (Shape::Circle { diameter }, &params[1..])
        }
        "R" | "O" => {
            if params.len() < 2 {
                return Err(format!("AD {template}: need x_size and y_size"));
            }
            let (x_size, y_size) = (params[0], params[1]);
            let shape = if template == "R" {
                Shape::Rectangle { x_size, y_size }
            } else {
                Shape::Obround { x_size, y_size }
            };
            (shape, &params[2..])
        }
        "P" => {
            if params.len() < 2 {
                return Err("AD P: need diameter and num_vertices".into());
            }
            if params[1].fract() != 0.0 {
                return Err(format!("AD P: vertex count must be an integer: {}", params[1]));
            }
            let shape = Shape::Polygon {
                outer_diameter: params[0],
                vertices: params[1] as u32,
                rotation: params.get(2).copied().unwrap_or(0.0),
            };
            (shape, params.get(3..).unwrap_or(&[]))
        }
        other => return Err(format!("AD: macro aperture '{other}' is not supported")),
    };

    let hole = match *hole_params {
        [] => None,
        [diameter] => Some(Hole::Circle { diameter }),
        [x_size, y_size] => Some(Hole::Rectangle { x_size, y_size }),
        _ => return Err(format!("AD: too many parameters in: {content}")),
    };

    Aperture::new(number, shape, hole)
}

/// Parse %TF/%TA/%TO/%TD. Example: `TF.FileFunction,Copper,L1,Top`
fn parse_attribute(content: &str) -> DataBlock {
    let kind = match &content[..2] {
        "TF" => AttributeKind::File,
        "TA" => AttributeKind::Aperture,
        "TO" => AttributeKind::Object,
        _ => AttributeKind::Delete,
    };
    let mut parts = content[2..].split(',');
    let name = parts.next().unwrap_or("").to_string();
    let args = parts.map(str::to_string).collect();
    DataBlock::Attribute { kind, name, args }
}

/// Accept deprecated image directives only when they leave the image unchanged.
fn check_legacy_image(content: &str) -> Result<(), String> {
    let s = &content[2..];
    let identity = match &content[..2] {
        "IP" => s == "POS",
        // Names carry no geometry
        "LN" | "IN" => true,
        "AS" => s == "AXBY",
        "OF" => {
            parse_ab_float(s, 'A').unwrap_or(0.0) == 0.0 && parse_ab_float(s, 'B').unwrap_or(0.0) == 0.0
        }
        "SF" => {
            parse_ab_float(s, 'A').unwrap_or(1.0) == 1.0 && parse_ab_float(s, 'B').unwrap_or(1.0) == 1.0
        }
        "MI" => {
            parse_ab_float(s, 'A').unwrap_or(0.0) == 0.0 && parse_ab_float(s, 'B').unwrap_or(0.0) == 0.0
        }
        _ => false,
    };
    if identity {
        Ok(())
    } else {
        Err(format!("unsupported image transform: {content}"))
    }
}

/// Extract the float value after a given letter key in a "A<val>B<val>" string.
fn parse_ab_float(s: &str, key: char) -> Option<f64> {
    let pos = s.find(key)?;
    let after = &s[pos + 1..];
    let end = after
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(after.len());
    parse_decimal(&after[..end])
}
