use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::info;
use pcb_cam::parsers::gerber::{self, excellon, layers};
use pcb_cam::types::ImageBounds;
use pcb_cam::{
    drill_bounds, gerber_bounds, generate_drill, generate_gerber, render_gerber, BoardJob,
    CamConfig, CamError, CamOutput, RenderOptions,
};

#[derive(Parser)]
#[command(
    name = "pcb-cam",
    about = "Turn Gerber and drill files into G-code or PNG previews"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file with machine parameters
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output file (or directory for `board`)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(flatten)]
    machine: MachineArgs,
}

/// Per-field overrides of the loaded config.
#[derive(Args)]
struct MachineArgs {
    #[arg(long, global = true)]
    feedrate: Option<f64>,
    #[arg(long, global = true)]
    plunge_feedrate: Option<f64>,
    #[arg(long, global = true)]
    tool_width: Option<f64>,
    #[arg(long, global = true)]
    power: Option<u32>,
    #[arg(long, global = true)]
    safe_z: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    cut_z: Option<f64>,
    #[arg(long, global = true)]
    change_z: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    drill_z: Option<f64>,
    #[arg(long, global = true)]
    drill_feedrate: Option<f64>,
    #[arg(long, global = true)]
    spindle_speed: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Gerber layer to G-code
    Gcode {
        #[arg(default_value = "board-F_Cu.gbr")]
        file: PathBuf,
    },
    /// Drill file to G-code
    Drill {
        #[arg(default_value = "board.drl")]
        file: PathBuf,
    },
    /// Gerber layer to a PNG preview
    Render {
        #[arg(default_value = "board-F_Cu.gbr")]
        file: PathBuf,
        /// Write each rendered aperture into this directory
        #[arg(long)]
        dump_apertures: Option<PathBuf>,
        /// Pixels per millimetre
        #[arg(long)]
        ppmm: Option<f64>,
        /// Do not cut aperture holes
        #[arg(long)]
        no_holes: bool,
    },
    /// All copper, outline and drill layers of a board (BASE or BASE.zip)
    Board { base: PathBuf },
    /// Print the merged bounding box of Gerber and drill files as JSON
    Bounds {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// An error together with the process exit status it maps to.
struct Failure {
    code: i32,
    message: String,
}

impl From<CamError> for Failure {
    fn from(e: CamError) -> Self {
        Failure {
            code: e.exit_code(),
            message: e.to_string(),
        }
    }
}

fn open_input(path: &Path) -> Result<File, Failure> {
    File::open(path).map_err(|e| Failure {
        code: 2,
        message: format!("cannot open {}: {e}", path.display()),
    })
}

fn create_output(path: &Path) -> Result<BufWriter<File>, CamError> {
    Ok(BufWriter::new(File::create(path)?))
}

fn load_config(cli: &Cli) -> Result<CamConfig, Failure> {
    let mut config = match &cli.config {
        Some(path) => CamConfig::from_json_file(path).map_err(|e| Failure {
            code: 1,
            message: format!("bad config {}: {e}", path.display()),
        })?,
        None => CamConfig::default(),
    };

    let m = &cli.machine;
    macro_rules! apply {
        ($($field:ident),*) => {
            $(if let Some(v) = m.$field { config.$field = v; })*
        };
    }
    apply!(
        feedrate,
        plunge_feedrate,
        tool_width,
        power,
        safe_z,
        cut_z,
        change_z,
        drill_z,
        drill_feedrate,
        spindle_speed
    );
    Ok(config)
}

fn run_gcode(file: &Path, output: Option<PathBuf>, config: CamConfig) -> Result<(), Failure> {
    let doc = gerber::parse(BufReader::new(open_input(file)?))?;
    let bounds = gerber_bounds(&doc)?;
    let out_path = output.unwrap_or_else(|| file.with_extension("gcode"));
    let mut out = CamOutput::new(create_output(&out_path)?, config, bounds.translate_to_origin());
    generate_gerber(&doc, &mut out, &format!("pcb-cam {}", file.display()))?;
    info!("Wrote {}", out_path.display());
    Ok(())
}

fn run_drill(file: &Path, output: Option<PathBuf>, config: CamConfig) -> Result<(), Failure> {
    let program = excellon::parse(open_input(file)?)?;
    let bounds = drill_bounds(&program)?;
    let out_path = output.unwrap_or_else(|| file.with_extension("gcode"));
    let mut out = CamOutput::new(create_output(&out_path)?, config, bounds.translate_to_origin());
    generate_drill(&program, &mut out, &format!("pcb-cam {}", file.display()))?;
    info!("Wrote {}", out_path.display());
    Ok(())
}

fn run_render(file: &Path, output: Option<PathBuf>, options: RenderOptions) -> Result<(), Failure> {
    let doc = gerber::parse(BufReader::new(open_input(file)?))?;
    let image = render_gerber(&doc, &options)?;
    let out_path = output.unwrap_or_else(|| file.with_extension("png"));
    image.save_png(&out_path)?;
    Ok(())
}

fn run_board(base: &Path, output: Option<PathBuf>, config: CamConfig) -> Result<(), Failure> {
    let is_zip = base
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

    let job = if is_zip {
        let data = std::fs::read(base).map_err(|e| Failure {
            code: 2,
            message: format!("cannot open {}: {e}", base.display()),
        })?;
        BoardJob::from_zip(&data)?
    } else {
        BoardJob::from_basename(base).map_err(|e| match e {
            CamError::Io(io) => Failure {
                code: 2,
                message: io.to_string(),
            },
            other => other.into(),
        })?
    };

    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("board")
        .to_string();
    let dir = output.unwrap_or_else(|| {
        base.parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    job.generate(&config, |layer| {
        let path = dir.join(layer.output_name(&stem));
        info!("Writing {}", path.display());
        create_output(&path)
    })?;
    Ok(())
}

fn run_bounds(files: &[PathBuf]) -> Result<(), Failure> {
    let mut bounds = ImageBounds::empty();
    for file in files {
        let name = file.to_string_lossy();
        let layer_bounds = if layers::identify_from_filename(&name) == layers::LayerKind::Drills {
            drill_bounds(&excellon::parse(open_input(file)?)?)?
        } else {
            gerber_bounds(&gerber::parse(BufReader::new(open_input(file)?))?)?
        };
        bounds.merge(&layer_bounds);
    }
    let json = serde_json::to_string_pretty(&bounds).map_err(CamError::from)?;
    println!("{json}");
    Ok(())
}

fn run(cli: Cli) -> Result<(), Failure> {
    let config = load_config(&cli)?;
    let output = cli.output.clone();
    match cli.command {
        Command::Gcode { file } => run_gcode(&file, output, config),
        Command::Drill { file } => run_drill(&file, output, config),
        Command::Render {
            file,
            dump_apertures,
            ppmm,
            no_holes,
        } => {
            let defaults = RenderOptions::default();
            let options = RenderOptions {
                pixels_per_mm: ppmm.unwrap_or(defaults.pixels_per_mm),
                holes: !no_holes,
                aperture_dump: dump_apertures,
                ..defaults
            };
            run_render(&file, output, options)
        }
        Command::Board { base } => run_board(&base, output, config),
        Command::Bounds { files } => run_bounds(&files),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(failure) = run(cli) {
        eprintln!("Error: {}", failure.message);
        std::process::exit(failure.code);
    }
}
