//! Multi-layer job: copper, outline and drill files that share one origin.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::bounds::{drill_bounds, gerber_bounds};
use crate::cam::{generate_drill, generate_gerber, CamOutput};
use crate::config::CamConfig;
use crate::error::CamError;
use crate::parsers::gerber::excellon::{self, DrillProgram};
use crate::parsers::gerber::layers::{self, LayerKind};
use crate::parsers::gerber;
use crate::types::{GerberDocument, ImageBounds};

#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Gerber(GerberDocument),
    Drill(DrillProgram),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// File name the layer was loaded from
    pub name: String,
    pub kind: LayerKind,
    /// Output suffix, unique within a job: `F_Cu`, `drl`, `F_Cu-2`, ...
    pub suffix: String,
    pub data: LayerData,
}

impl Layer {
    pub fn bounds(&self) -> Result<ImageBounds, CamError> {
        match &self.data {
            LayerData::Gerber(doc) => gerber_bounds(doc),
            LayerData::Drill(program) => drill_bounds(program),
        }
    }

    /// Output file name for this layer's program, e.g. `board-F_Cu.gcode`.
    pub fn output_name(&self, base: &str) -> String {
        format!("{base}-{}.gcode", self.suffix)
    }
}

/// Every machined layer of a board plus their merged bounds.
#[derive(Debug, Clone)]
pub struct BoardJob {
    pub layers: Vec<Layer>,
    pub bounds: ImageBounds,
}

impl BoardJob {
    fn new(mut layers: Vec<Layer>) -> Result<Self, CamError> {
        layers.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        // Layers of the same kind are adjacent after sorting
        let mut repeat = 1;
        for i in 1..layers.len() {
            if layers[i].kind == layers[i - 1].kind {
                repeat += 1;
                layers[i].suffix = format!("{}-{repeat}", layers[i].kind.suffix());
                warn!(
                    "Board: {} and {} are both {}, writing the second as {}",
                    layers[i - 1].name,
                    layers[i].name,
                    layers[i].kind.suffix(),
                    layers[i].suffix
                );
            } else {
                repeat = 1;
            }
        }
        let mut bounds = ImageBounds::empty();
        for layer in &layers {
            bounds.merge(&layer.bounds()?);
        }
        debug!(
            "Board: {} layers, {:.3} x {:.3} mm",
            layers.len(),
            bounds.width(),
            bounds.height()
        );
        Ok(Self { layers, bounds })
    }

    /// Load `BASE-F_Cu.gbr`, `BASE-B_Cu.gbr`, `BASE-Edge_Cuts.gbr` and `BASE.drl`,
    /// skipping the ones that do not exist.
    pub fn from_basename(base: &Path) -> Result<Self, CamError> {
        let base = base.to_string_lossy();
        let candidates: Vec<PathBuf> = ["-F_Cu.gbr", "-B_Cu.gbr", "-Edge_Cuts.gbr", ".drl"]
            .iter()
            .map(|suffix| PathBuf::from(format!("{base}{suffix}")))
            .collect();

        let mut layers = Vec::new();
        for path in &candidates {
            if !path.exists() {
                debug!("Board: {} not found, skipping", path.display());
                continue;
            }
            let content = std::fs::read_to_string(path)?;
            let name = path.to_string_lossy().into_owned();
            if let Some(layer) = load_layer(&name, &content)? {
                layers.push(layer);
            }
        }

        if layers.is_empty() {
            return Err(CamError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no layer files found for {base}"),
            )));
        }
        Self::new(layers)
    }

    /// Load every machined layer from a zip archive held in memory.
    pub fn from_zip(data: &[u8]) -> Result<Self, CamError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

        let mut layers = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = String::new();
            if file.read_to_string(&mut content).is_err() {
                warn!("Board: skipping non-text archive member {name}");
                continue;
            }
            if let Some(layer) = load_layer(&name, &content)? {
                layers.push(layer);
            }
        }

        if layers.is_empty() {
            return Err(CamError::parse(0, "no copper, outline or drill files in archive"));
        }
        Self::new(layers)
    }

    /// Write one G-code program per layer, all shifted by the board's minimum corner.
    ///
    /// `open` supplies the writer for each layer; the writers are returned flushed.
    pub fn generate<W: Write>(
        &self,
        config: &CamConfig,
        mut open: impl FnMut(&Layer) -> Result<W, CamError>,
    ) -> Result<Vec<W>, CamError> {
        let translate = self.bounds.translate_to_origin();
        let mut writers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut out = CamOutput::new(open(layer)?, config.clone(), translate.clone());
            let title = format!("pcb-cam {} ({})", layer.name, layer.suffix);
            match &layer.data {
                LayerData::Gerber(doc) => generate_gerber(doc, &mut out, &title)?,
                LayerData::Drill(program) => generate_drill(program, &mut out, &title)?,
            }
            info!("Board: {} -> {} lines", layer.name, out.lines_written());
            writers.push(out.into_inner());
        }
        Ok(writers)
    }
}

/// Parse one file of a job. Returns `None` for layers that are not machined.
fn load_layer(name: &str, content: &str) -> Result<Option<Layer>, CamError> {
    let by_name = layers::identify_from_filename(name);

    if by_name == LayerKind::Drills {
        let program = excellon::parse_str(content)?;
        return Ok(Some(Layer {
            name: name.to_string(),
            suffix: LayerKind::Drills.suffix(),
            kind: LayerKind::Drills,
            data: LayerData::Drill(program),
        }));
    }

    if !content.contains('*') {
        debug!("Board: {name} is not a Gerber file, skipping");
        return Ok(None);
    }

    let doc = match gerber::parse_str(content) {
        Ok(doc) => doc,
        // Silkscreen and mask layers may use features we do not machine
        Err(e) if by_name == LayerKind::Other => {
            warn!("Board: skipping {name}: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let kind = doc
        .file_function()
        .map(layers::identify_from_file_function)
        .filter(|k| *k != LayerKind::Other)
        .unwrap_or(by_name);
    if !kind.is_machined() {
        debug!("Board: {name} is not machined, skipping");
        return Ok(None);
    }

    Ok(Some(Layer {
        name: name.to_string(),
        suffix: kind.suffix(),
        kind,
        data: LayerData::Gerber(doc),
    }))
}
