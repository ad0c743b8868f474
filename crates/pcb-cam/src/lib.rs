pub mod arc;
pub mod board;
pub mod bounds;
pub mod cam;
pub mod config;
pub mod error;
pub mod parsers;
pub mod render;
pub mod state;
pub mod types;

pub use board::BoardJob;
pub use bounds::{drill_bounds, gerber_bounds};
pub use cam::{generate_drill, generate_gerber, CamOutput};
pub use config::CamConfig;
pub use error::CamError;
pub use render::{render_gerber, RenderOptions, RenderOutput};
