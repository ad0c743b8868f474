use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamError {
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("unknown aperture D{number} (line {line})")]
    UnknownAperture { number: u32, line: usize },

    #[error("no aperture selected before use on line {line}")]
    NoApertureSelected { line: usize },

    #[error("invalid region on line {line}: {reason}")]
    InvalidRegion { line: usize, reason: String },

    #[error("unknown tool T{0}")]
    UnknownTool(u32),

    #[error("drill step before tool")]
    StepBeforeTool,

    #[error("render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl CamError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        CamError::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Error for a failed read of parser input. Text that is not UTF-8 is
    /// malformed input rather than an I/O failure.
    pub fn read(line: usize, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::InvalidData {
            CamError::parse(line, format!("invalid text: {err}"))
        } else {
            CamError::Io(err)
        }
    }

    /// Process exit status used by the command-line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            CamError::Parse { .. } | CamError::Zip(_) => 3,
            CamError::Json(_) => 1,
            _ => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = CamError::parse(12, "bad directive");
        assert_eq!(err.to_string(), "parse error on line 12: bad directive");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_reference_errors_are_generation_failures() {
        assert_eq!(CamError::StepBeforeTool.exit_code(), 5);
        assert_eq!(CamError::UnknownTool(3).to_string(), "unknown tool T3");
        assert_eq!(CamError::StepBeforeTool.to_string(), "drill step before tool");
    }

    #[test]
    fn test_read_errors() {
        let bad_text = std::io::Error::new(std::io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        assert!(matches!(CamError::read(7, bad_text), CamError::Parse { line: 7, .. }));
        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(CamError::read(7, broken).exit_code(), 5);
    }
}
