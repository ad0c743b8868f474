use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};

use log::{debug, warn};

use crate::error::CamError;

use super::coord::{parse_decimal, Units};

/// A tool definition, size (diameter) in file units.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    /// Shape code from the definition line, `C` for a round bit.
    pub shape: char,
    pub size: f64,
}

/// One step of the drill program, in file order.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `T<n>` - select tool n for the following holes
    ChangeTool(u32),
    /// `X..Y..` - drill one hole with the current tool
    Drill { x: f64, y: f64 },
    /// `T0` - put the tool away
    UnloadTool,
}

/// Coordinate format: how many integer and decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CoordFormat {
    integer: u8,
    decimal: u8,
}

/// A parsed drill file: tool table and steps.
#[derive(Debug, Clone, PartialEq)]
pub struct DrillProgram {
    pub units: Units,
    pub tools: BTreeMap<u32, Tool>,
    pub steps: Vec<Step>,
}

impl Default for DrillProgram {
    fn default() -> Self {
        Self {
            units: Units::Millimeters,
            tools: BTreeMap::new(),
            steps: Vec::new(),
        }
    }
}

impl DrillProgram {
    pub fn tool(&self, id: u32) -> Result<&Tool, CamError> {
        self.tools.get(&id).ok_or(CamError::UnknownTool(id))
    }

    pub fn hole_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Drill { .. }))
            .count()
    }
}

/// Line-oriented parse state.
struct DrillParser {
    program: DrillProgram,
    format: CoordFormat,
}

/// Parse an Excellon-style drill file from a reader.
pub fn parse<R: Read>(reader: R) -> Result<DrillProgram, CamError> {
    let mut parser = DrillParser::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| CamError::read(index + 1, e))?;
        if !parser.line(index + 1, &line)? {
            break;
        }
    }
    Ok(parser.finish())
}

/// Parse an Excellon-style drill file held in memory.
pub fn parse_str(content: &str) -> Result<DrillProgram, CamError> {
    let mut parser = DrillParser::new();
    for (index, line) in content.lines().enumerate() {
        if !parser.line(index + 1, line)? {
            break;
        }
    }
    Ok(parser.finish())
}

impl DrillParser {
    fn new() -> Self {
        Self {
            program: DrillProgram::default(),
            format: CoordFormat {
                integer: 3,
                decimal: 3,
            },
        }
    }

    fn finish(self) -> DrillProgram {
        let program = self.program;
        if program.steps.is_empty() {
            warn!("Drill: file contains no tool changes or holes");
        }
        debug!(
            "Drill: {} tools, {} steps, {} holes",
            program.tools.len(),
            program.steps.len(),
            program.hole_count()
        );
        program
    }

    /// Handle one raw line. Returns false once the end marker is reached.
    fn line(&mut self, number: usize, raw: &str) -> Result<bool, CamError> {
        let line = strip_comment(raw).trim();
        let fail = |reason: &str| CamError::parse(number, format!("{reason}: {line}"));

        match line {
            "" | "%" | "M48" | "M95" | "G05" | "G90" | "FMAT,2" | "ICI,OFF" => {}
            "M30" | "M00" => return Ok(false),
            "M71" => self.program.units = Units::Millimeters,
            "M72" => self.program.units = Units::Inches,
            _ if line.starts_with("INCH") || line.starts_with("METRIC") => {
                self.unit_line(line).map_err(|r| fail(&r))?;
            }
            _ if line.starts_with('T') => {
                if let Some((id, tool)) = parse_define_tool(line) {
                    self.program.tools.insert(id, tool);
                } else {
                    let step = parse_change_tool(line).ok_or_else(|| fail("bad tool directive"))?;
                    self.program.steps.push(step);
                }
            }
            _ if line.starts_with('X') => {
                let step = self
                    .parse_drill_hole(line)
                    .ok_or_else(|| fail("bad hole directive"))?;
                self.program.steps.push(step);
            }
            _ => return Err(fail("unparsable drill directive")),
        }
        Ok(true)
    }

    /// Units and format: "METRIC,TZ,000.000" or "INCH,LZ" or plain "INCH".
    fn unit_line(&mut self, line: &str) -> Result<(), String> {
        let mut parts = line.split(',');
        self.program.units = match parts.next() {
            Some("INCH") => Units::Inches,
            Some("METRIC") => Units::Millimeters,
            _ => return Err("unknown unit".into()),
        };
        if self.program.units == Units::Inches {
            self.format = CoordFormat {
                integer: 2,
                decimal: 4,
            };
        }

        for part in parts {
            match part.trim() {
                // Zero suppression is not needed, digits are always right-aligned
                "TZ" | "LZ" => {}
                pattern if pattern.contains('.') && pattern.chars().all(|c| c == '0' || c == '.') => {
                    let (int_part, dec_part) = pattern.split_once('.').unwrap_or((pattern, ""));
                    if int_part.is_empty() || dec_part.is_empty() {
                        return Err(format!("bad number format {pattern}"));
                    }
                    self.format = CoordFormat {
                        integer: int_part.len() as u8,
                        decimal: dec_part.len() as u8,
                    };
                }
                other => return Err(format!("unknown unit option {other}")),
            }
        }
        Ok(())
    }

    /// Coordinate line: X14.478Y10.541 or X14478Y10541
    fn parse_drill_hole(&self, line: &str) -> Option<Step> {
        let rest = line.strip_prefix('X')?;
        let (x_str, y_str) = rest.split_once('Y')?;
        let x = self.parse_coord_value(x_str)?;
        let y = self.parse_coord_value(y_str)?;
        Some(Step::Drill { x, y })
    }

    fn parse_coord_value(&self, s: &str) -> Option<f64> {
        if s.contains('.') {
            return parse_decimal(s);
        }

        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        // Eagle and most real-world tools declare TZ but omit leading zeros
        // too, so pad on the left in both modes.
        let total_digits = (self.format.integer + self.format.decimal) as usize;
        let mut padded = digits.to_string();
        while padded.len() < total_digits {
            padded.insert(0, '0');
        }

        let raw: i64 = padded.parse().ok()?;
        let val = raw as f64 / 10f64.powi(self.format.decimal as i32);
        Some(if negative { -val } else { val })
    }
}

/// Drop everything from the first `;` on.
fn strip_comment(line: &str) -> &str {
    line.split_once(';').map(|(code, _)| code).unwrap_or(line)
}

/// Tool definitions: T1C0.800, T01C0.300F200S55
fn parse_define_tool(line: &str) -> Option<(u32, Tool)> {
    let rest = line.strip_prefix('T')?;
    let shape_pos = rest.find(|c: char| !c.is_ascii_digit())?;
    let id: u32 = rest[..shape_pos].parse().ok()?;
    let shape = rest[shape_pos..].chars().next()?;
    if !shape.is_ascii_uppercase() {
        return None;
    }
    let after = &rest[shape_pos + 1..];
    let end = after
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(after.len());
    // Anything after the size must be further letter-prefixed parameters
    if end < after.len() && !after[end..].starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let size = parse_decimal(&after[..end])?;
    Some((id, Tool { shape, size }))
}

/// Tool selection: T01 or T1. T0 unloads the tool.
fn parse_change_tool(line: &str) -> Option<Step> {
    let digits = line.strip_prefix('T')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u32>().ok()? {
        0 => Some(Step::UnloadTool),
        id => Some(Step::ChangeTool(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const KICAD_DRILL: &str = "\
M48
; DRILL file {KiCad (5.99.0-8821-g31003c6e09)} date Saturday, March 06, 2021 at 01:26:26 PM
; FORMAT={-:-/ absolute / metric / decimal}
; #@! TF.CreationDate,2021-03-06T13:26:26-07:00
FMAT,2
METRIC
T1C0.800
T2C1.000
T3C1.500
%
G90
G05
T1
X-187.757Y-324.307
X-187.731Y-306.553
T2
X-187.757Y-312.649
X-187.757Y-315.189
X-187.757Y-317.729
T3
X-206.12Y-314.681
X-199.12Y-314.681
T0
M30
";

    #[test]
    fn test_kicad_drill() {
        let drl = parse_str(KICAD_DRILL).unwrap();
        assert_eq!(drl.units, Units::Millimeters);
        assert_eq!(drl.tools.len(), 3);
        assert_eq!(
            drl.tools[&1],
            Tool {
                shape: 'C',
                size: 0.8
            }
        );
        assert_eq!(drl.hole_count(), 7);
        assert_eq!(drl.steps[0], Step::ChangeTool(1));
        assert_eq!(
            drl.steps[1],
            Step::Drill {
                x: -187.757,
                y: -324.307
            }
        );
        assert_eq!(drl.steps.last(), Some(&Step::UnloadTool));
    }

    #[test]
    fn test_reader_and_str_agree() {
        let a = parse_str(KICAD_DRILL).unwrap();
        let b = parse(KICAD_DRILL.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_trailing_comment_stripped() {
        let drl = parse_str("M48\nINCH ; imperial\nT2C0.035 ; via\n%\nT2\nX1.0Y2.0 ;hole\nM30\n")
            .unwrap();
        assert_eq!(drl.units, Units::Inches);
        assert_eq!(drl.tools[&2].size, 0.035);
        assert_eq!(drl.steps, vec![Step::ChangeTool(2), Step::Drill { x: 1.0, y: 2.0 }]);
    }

    #[test]
    fn test_tool_ids_may_have_gaps() {
        let drl = parse_str("T7C0.5\nT3C0.3\n").unwrap();
        assert_eq!(drl.tools.keys().copied().collect::<Vec<_>>(), vec![3, 7]);
        assert!(drl.tool(5).is_err());
    }

    #[test]
    fn test_define_vs_change() {
        assert_eq!(
            parse_define_tool("T01C0.300F200S55"),
            Some((
                1,
                Tool {
                    shape: 'C',
                    size: 0.3
                }
            ))
        );
        assert_eq!(parse_define_tool("T12"), None);
        assert_eq!(parse_change_tool("T12"), Some(Step::ChangeTool(12)));
        assert_eq!(parse_change_tool("T0"), Some(Step::UnloadTool));
        assert_eq!(parse_change_tool("T1x"), None);
    }

    #[test]
    fn test_unparsable_lines_are_fatal() {
        match parse_str("M48\nMETRIC\nBOGUS\nM30\n") {
            Err(CamError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got: {other:?}"),
        }
        assert!(parse_str("T1C0.8\nTx\n").is_err());
        assert!(parse_str("T1C0.8\nT1\nX1.0\n").is_err());
        assert!(parse_str("Y1.0X2.0\n").is_err());
        assert!(parse_str("METRIC,ZZ\n").is_err());
    }

    #[test]
    fn test_sign_only_leads_a_coordinate() {
        match parse_str("M48\nMETRIC\nT1C0.8\n%\nT1\nX1-2Y3\nM30\n") {
            Err(CamError::Parse { line, .. }) => assert_eq!(line, 6),
            other => panic!("expected parse error, got: {other:?}"),
        }
        assert!(parse_str("T1C0.8\nT1\nX12Y3+4\n").is_err());
        assert!(parse_str("T1C0.8\nT1\nX-Y1\n").is_err());
        assert!(parse_str("T1C0.8\nT1\nX1.0Yinf\n").is_err());
        assert!(parse_str("T1Cinf\n").is_err());

        let prog = parse_str("T1C0.8\nT1\nX-12Y+3\n").unwrap();
        assert_eq!(prog.steps[1], Step::Drill { x: -0.012, y: 0.003 });
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let input: &[u8] = b"M48\nMETRIC\nT1C0.8\xff\nM30\n";
        match parse(input) {
            Err(CamError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got: {other:?}"),
        }
    }

    #[test]
    fn test_lines_after_end_ignored() {
        let drl = parse_str("T1C0.8\nT1\nX1.0Y1.0\nM30\nwhatever\n").unwrap();
        assert_eq!(drl.hole_count(), 1);
    }

    #[test]
    fn test_no_decimal_with_format() {
        let drl = parse_str("M48\nMETRIC,TZ,000.000\nT01C0.500\n%\nT01\nX14478Y-10541\nM30\n").unwrap();
        match drl.steps[1] {
            Step::Drill { x, y } => {
                assert_abs_diff_eq!(x, 14.478, epsilon = 1e-9);
                assert_abs_diff_eq!(y, -10.541, epsilon = 1e-9);
            }
            ref other => panic!("Expected Drill, got {other:?}"),
        }
    }

    #[test]
    fn test_inch_default_format() {
        let drl = parse_str("M48\nINCH,LZ\nT1C0.02\n%\nT1\nX10000Y5000\nM30\n").unwrap();
        assert_eq!(drl.steps[1], Step::Drill { x: 1.0, y: 0.5 });
    }

    #[test]
    fn test_m71_m72_units() {
        assert_eq!(parse_str("M72\n").unwrap().units, Units::Inches);
        assert_eq!(parse_str("M72\nM71\n").unwrap().units, Units::Millimeters);
    }

    #[test]
    fn test_redefinition_replaces() {
        let drl = parse_str("T1C0.8\nT1C1.2\n").unwrap();
        assert_eq!(drl.tools[&1].size, 1.2);
    }
}
