use std::io::{self, Write};

use log::debug;

use crate::arc::Arc;
use crate::config::CamConfig;
use crate::error::CamError;
use crate::parsers::gerber::excellon::{DrillProgram, Step, Tool};
use crate::state::GraphicsState;
use crate::types::{DataBlock, FormatDirective, GerberDocument, InterpolationMode, Polarity};

/// Coordinate mapping applied to every point written, usually "shift by -min".
pub type Translate = Box<dyn Fn(f64, f64) -> (f64, f64)>;

/// G-code sink: writer, machine parameters and the job-wide translation.
pub struct CamOutput<W: Write> {
    writer: W,
    config: CamConfig,
    translate: Translate,
    /// Tool down and spindle/laser on
    engaged: bool,
    lines: usize,
}

impl<W: Write> CamOutput<W> {
    pub fn new(
        writer: W,
        config: CamConfig,
        translate: impl Fn(f64, f64) -> (f64, f64) + 'static,
    ) -> Self {
        Self {
            writer,
            config,
            translate: Box::new(translate),
            engaged: false,
            lines: 0,
        }
    }

    pub fn config(&self) -> &CamConfig {
        &self.config
    }

    /// Number of lines written so far.
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.lines += 1;
        writeln!(self.writer, "{text}")
    }

    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        self.line(&format!("; {text}"))
    }

    /// Job comment, modal setup and a climb to clearance height.
    pub fn preamble(&mut self, title: &str) -> io::Result<()> {
        self.comment(title)?;
        self.line("G90 G40 G17 G21")?;
        self.rapid_z(self.config.safe_z)
    }

    pub fn trailer(&mut self) -> io::Result<()> {
        self.engaged = false;
        self.rapid_z(self.config.safe_z)?;
        self.line("M5")?;
        self.line("M30")
    }

    fn rapid_z(&mut self, z: f64) -> io::Result<()> {
        self.line(&format!("G00 Z{z:.4}"))
    }

    /// Rapid to a point given in millimetres, before translation.
    fn rapid_xy(&mut self, x: f64, y: f64) -> io::Result<()> {
        let (x, y) = (self.translate)(x, y);
        self.line(&format!("G00 X{x:.4} Y{y:.4}"))
    }

    fn engage(&mut self) -> io::Result<()> {
        if !self.engaged {
            let (power, cut_z, plunge) = (
                self.config.power,
                self.config.cut_z,
                self.config.plunge_feedrate,
            );
            self.line(&format!("M3 S{power}"))?;
            self.line(&format!("G01 Z{cut_z:.4} F{plunge}"))?;
            self.engaged = true;
        }
        Ok(())
    }

    fn retract(&mut self) -> io::Result<()> {
        if self.engaged {
            self.rapid_z(self.config.safe_z)?;
            self.line("M5")?;
            self.engaged = false;
        }
        Ok(())
    }

    fn flash_at(&mut self, x: f64, y: f64) -> io::Result<()> {
        self.retract()?;
        self.rapid_z(self.config.safe_z)?;
        self.rapid_xy(x, y)?;
        self.engage()?;
        self.retract()
    }

    fn cut_to(&mut self, x: f64, y: f64) -> io::Result<()> {
        self.engage()?;
        let (x, y) = (self.translate)(x, y);
        let feed = self.config.feedrate;
        self.line(&format!("G01 X{x:.4} Y{y:.4} F{feed}"))
    }

    fn arc_to(
        &mut self,
        clockwise: bool,
        start: (f64, f64),
        end: (f64, f64),
        center: (f64, f64),
    ) -> io::Result<()> {
        self.engage()?;
        let (sx, sy) = (self.translate)(start.0, start.1);
        let (x, y) = (self.translate)(end.0, end.1);
        let (cx, cy) = (self.translate)(center.0, center.1);
        let (i, j) = (cx - sx, cy - sy);
        let code = if clockwise { "G02" } else { "G03" };
        let feed = self.config.feedrate;
        self.line(&format!("{code} X{x:.4} Y{y:.4} I{i:.4} J{j:.4} F{feed}"))
    }
}

impl DataBlock {
    /// Emit the motion for this block, given the state before it is applied.
    pub fn generate_toolpath<W: Write>(
        &self,
        line: usize,
        state: &GraphicsState,
        out: &mut CamOutput<W>,
    ) -> Result<(), CamError> {
        match self {
            DataBlock::ApertureSelect(number) => {
                // The state validates the number when the block is applied
                if let Some(width) = state.apertures().get(*number).map(|a| a.stroke_width()) {
                    let width = state.to_mm(width);
                    out.comment(&format!("aperture D{number} width {width:.4}"))?;
                }
            }
            DataBlock::Flash { x, y } => {
                state.require_aperture(line)?;
                let (x, y) = state.point_mm(*x, *y);
                out.flash_at(x, y)?;
            }
            DataBlock::Move { x, y } => {
                out.retract()?;
                let (x, y) = state.point_mm(*x, *y);
                out.rapid_xy(x, y)?;
            }
            DataBlock::Interpolate { mode, x, y, center } => {
                if !state.in_region {
                    state.require_aperture(line)?;
                }
                let end = state.point_mm(*x, *y);
                match (mode, center) {
                    (InterpolationMode::ClockwiseArc, Some((cx, cy)))
                    | (InterpolationMode::CounterClockwiseArc, Some((cx, cy))) => {
                        let clockwise = *mode == InterpolationMode::ClockwiseArc;
                        let center = state.point_mm(*cx, *cy);
                        let start = state.position();
                        // A centre on the start point has no radius; cut straight
                        if Arc::new(start, end, center, clockwise).is_some() {
                            out.arc_to(clockwise, start, end, center)?;
                        } else {
                            out.cut_to(end.0, end.1)?;
                        }
                    }
                    _ => out.cut_to(end.0, end.1)?,
                }
            }
            DataBlock::RegionStart => out.comment("region start")?,
            DataBlock::RegionEnd => out.comment("region end")?,
            DataBlock::PolaritySet(polarity) => {
                let name = match polarity {
                    Polarity::Dark => "dark",
                    Polarity::Clear => "clear",
                };
                out.comment(&format!("polarity {name}"))?;
            }
            DataBlock::Attribute { .. }
            | DataBlock::FormatSpec(FormatDirective::Coordinate(_))
            | DataBlock::FormatSpec(FormatDirective::Units(_)) => {}
        }
        Ok(())
    }
}

/// Write a complete G-code program for a Gerber document.
pub fn generate_gerber<W: Write>(
    doc: &GerberDocument,
    out: &mut CamOutput<W>,
    title: &str,
) -> Result<(), CamError> {
    out.preamble(title)?;
    let tool_width = out.config().tool_width;
    out.comment(&format!("tool width {tool_width:.4}"))?;

    let mut state = GraphicsState::new(&doc.apertures);
    for block in &doc.blocks {
        block.value.generate_toolpath(block.line, &state, out)?;
        state.apply(block)?;
    }
    state.finish(doc.blocks.last().map_or(0, |b| b.line))?;

    out.trailer()?;
    out.flush()?;
    debug!("Gerber CAM: {} lines written", out.lines_written());
    Ok(())
}

/// Drill-program traversal state: the tool currently loaded.
pub struct DrillCam<'a> {
    program: &'a DrillProgram,
    tool: Option<&'a Tool>,
}

impl<'a> DrillCam<'a> {
    pub fn new(program: &'a DrillProgram) -> Self {
        Self {
            program,
            tool: None,
        }
    }

    pub fn step<W: Write>(&mut self, step: &Step, out: &mut CamOutput<W>) -> Result<(), CamError> {
        let units = self.program.units;
        let config = out.config().clone();
        match step {
            Step::ChangeTool(id) => {
                let tool = self.program.tool(*id)?;
                self.tool = Some(tool);
                out.comment(&format!(
                    "tool T{id} {} {:.4}",
                    tool.shape,
                    units.to_mm(tool.size)
                ))?;
                out.rapid_z(config.change_z)?;
                out.line("G00 X0 Y0")?;
                out.line("M0")?;
                out.rapid_z(config.safe_z)?;
            }
            Step::Drill { x, y } => {
                if self.tool.is_none() {
                    return Err(CamError::StepBeforeTool);
                }
                out.rapid_z(config.safe_z)?;
                out.rapid_xy(units.to_mm(*x), units.to_mm(*y))?;
                out.line(&format!("M3 S{}", config.spindle_speed))?;
                out.line(&format!(
                    "G01 Z{:.4} F{}",
                    config.drill_z, config.drill_feedrate
                ))?;
                out.rapid_z(config.safe_z)?;
                out.line("M5")?;
            }
            Step::UnloadTool => {
                self.tool = None;
                out.rapid_z(config.change_z)?;
                out.line("M5")?;
            }
        }
        Ok(())
    }
}

/// Write a complete G-code program for a drill file.
pub fn generate_drill<W: Write>(
    program: &DrillProgram,
    out: &mut CamOutput<W>,
    title: &str,
) -> Result<(), CamError> {
    out.preamble(title)?;
    let mut cam = DrillCam::new(program);
    for step in &program.steps {
        cam.step(step, out)?;
    }
    out.trailer()?;
    out.flush()?;
    debug!(
        "Drill CAM: {} holes, {} lines written",
        program.hole_count(),
        out.lines_written()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::drill_bounds;
    use crate::parsers::gerber::coord::Units;
    use crate::parsers::gerber::parse_str;
    use std::collections::BTreeMap;

    fn spec_drill() -> DrillProgram {
        DrillProgram {
            units: Units::Millimeters,
            tools: BTreeMap::from([(1, Tool { shape: 'C', size: 0.8 })]),
            steps: vec![
                Step::ChangeTool(1),
                Step::Drill {
                    x: -187.757,
                    y: -324.307,
                },
                Step::Drill {
                    x: -187.731,
                    y: -306.553,
                },
            ],
        }
    }

    fn run_drill(program: &DrillProgram) -> Result<Vec<String>, CamError> {
        let bounds = drill_bounds(program)?;
        let mut out = CamOutput::new(Vec::new(), CamConfig::default(), bounds.translate_to_origin());
        generate_drill(program, &mut out, "drill")?;
        let text = String::from_utf8(out.into_inner()).unwrap();
        Ok(text.lines().map(str::to_string).collect())
    }

    #[test]
    fn test_drill_program() {
        let lines = run_drill(&spec_drill()).unwrap();
        assert_eq!(lines[0], "; drill");
        assert_eq!(lines[1], "G90 G40 G17 G21");
        assert_eq!(lines.iter().filter(|l| *l == "M0").count(), 1);

        let change = lines.iter().position(|l| l == "M0").unwrap();
        assert_eq!(lines[change - 2], "G00 Z15.0000");
        assert_eq!(lines[change - 1], "G00 X0 Y0");
        assert_eq!(lines[change + 1], "G00 Z1.0000");

        let plunges: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("G01 Z-3.0000"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(plunges.len(), 2);
        for &i in &plunges {
            assert!(i > change);
            assert_eq!(lines[i - 3], "G00 Z1.0000");
            assert_eq!(lines[i - 1], "M3 S10000");
            assert_eq!(lines[i], "G01 Z-3.0000 F20");
            assert_eq!(lines[i + 1], "G00 Z1.0000");
            assert_eq!(lines[i + 2], "M5");
        }
        assert_eq!(lines[plunges[0] - 2], "G00 X0.4000 Y0.4000");
        assert_eq!(lines[plunges[1] - 2], "G00 X0.4260 Y18.1540");
        assert_eq!(lines.last().unwrap(), "M30");
    }

    #[test]
    fn test_drill_step_before_tool() {
        let mut program = spec_drill();
        program.steps.remove(0);
        let mut out = CamOutput::new(Vec::new(), CamConfig::default(), |x, y| (x, y));
        let err = generate_drill(&program, &mut out, "drill").unwrap_err();
        assert!(matches!(err, CamError::StepBeforeTool));
    }

    #[test]
    fn test_drill_unknown_tool() {
        let mut program = spec_drill();
        program.steps[0] = Step::ChangeTool(4);
        let mut out = CamOutput::new(Vec::new(), CamConfig::default(), |x, y| (x, y));
        assert!(matches!(
            generate_drill(&program, &mut out, "drill"),
            Err(CamError::UnknownTool(4))
        ));
    }

    #[test]
    fn test_unload_tool() {
        let mut program = spec_drill();
        program.steps.push(Step::UnloadTool);
        let lines = run_drill(&program).unwrap();
        let n = lines.len();
        assert_eq!(lines[n - 5], "G00 Z15.0000");
        assert_eq!(lines[n - 4], "M5");
        assert_eq!(&lines[n - 3..], ["G00 Z1.0000", "M5", "M30"]);
    }

    const GERBER: &str = "\
%FSLAX46Y46*%
%MOMM*%
%ADD10C,0.250000*%
%ADD11R,1.000000X1.000000*%
D10*
X0Y0D02*
G01X5000000Y0D01*
G03X5000000Y2000000I0J1000000D01*
D11*
X1000000Y1000000D03*
M02*
";

    fn run_gerber(src: &str) -> Vec<String> {
        let doc = parse_str(src).unwrap();
        let mut out = CamOutput::new(Vec::new(), CamConfig::default(), |x, y| (x + 1.0, y));
        generate_gerber(&doc, &mut out, "copper").unwrap();
        String::from_utf8(out.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_gerber_program() {
        let lines = run_gerber(GERBER);
        let expected = [
            "; copper",
            "G90 G40 G17 G21",
            "G00 Z1.0000",
            "; tool width 0.2000",
            "; aperture D10 width 0.2500",
            "G00 X1.0000 Y0.0000",
            "M3 S10",
            "G01 Z-0.1000 F100",
            "G01 X6.0000 Y0.0000 F300",
            "G03 X6.0000 Y2.0000 I0.0000 J1.0000 F300",
            "; aperture D11 width 1.0000",
            "G00 Z1.0000",
            "M5",
            "G00 Z1.0000",
            "G00 X2.0000 Y1.0000",
            "M3 S10",
            "G01 Z-0.1000 F100",
            "G00 Z1.0000",
            "M5",
            "G00 Z1.0000",
            "M5",
            "M30",
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_first_rapid_starts_at_safe_height() {
        let lines = run_gerber(GERBER);
        let first_xy = lines.iter().position(|l| l.starts_with("G00 X")).unwrap();
        assert!(lines[..first_xy].contains(&"G00 Z1.0000".to_string()));

        let lines = run_drill(&spec_drill()).unwrap();
        assert_eq!(lines[2], "G00 Z1.0000");
    }

    #[test]
    fn test_arc_without_offsets_is_cut_straight() {
        let lines = run_gerber(
            "%FSLAX46Y46*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nX0Y0D02*\nG02X2000000Y0D01*\nM02*\n",
        );
        assert!(lines.contains(&"G01 X3.0000 Y0.0000 F300".to_string()), "{lines:?}");
        assert!(!lines.iter().any(|l| l.starts_with("G02")));
    }

    #[test]
    fn test_region_and_polarity_comments() {
        let lines = run_gerber(
            "%FSLAX46Y46*%\n%MOMM*%\n%LPC*%\nG36*\nX0Y0D02*\nG01X1000000Y0D01*\nX0Y1000000D01*\nX0Y0D01*\nG37*\nM02*\n",
        );
        assert!(lines.contains(&"; polarity clear".to_string()));
        let start = lines.iter().position(|l| l == "; region start").unwrap();
        let end = lines.iter().position(|l| l == "; region end").unwrap();
        let cuts = lines[start..end]
            .iter()
            .filter(|l| l.starts_with("G01 X"))
            .count();
        assert_eq!(cuts, 3);
    }

    #[test]
    fn test_stroke_without_aperture() {
        let doc = parse_str("%FSLAX46Y46*%\n%MOMM*%\nX0Y0D02*\nX1000000Y0D01*\nM02*\n").unwrap();
        let mut out = CamOutput::new(Vec::new(), CamConfig::default(), |x, y| (x, y));
        assert!(matches!(
            generate_gerber(&doc, &mut out, "t"),
            Err(CamError::NoApertureSelected { line: 4 })
        ));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_errors_propagate() {
        let mut out = CamOutput::new(FailingWriter, CamConfig::default(), |x, y| (x, y));
        let err = generate_drill(&spec_drill(), &mut out, "drill").unwrap_err();
        assert!(matches!(err, CamError::Io(_)));
        assert_eq!(err.exit_code(), 5);
    }
}
