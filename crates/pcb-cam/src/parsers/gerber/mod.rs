pub mod apertures;
pub mod commands;
pub mod coord;
pub mod excellon;
pub mod layers;
pub mod lexer;

use std::io::Read;

use log::debug;

use crate::error::CamError;
use crate::types::GerberDocument;

/// Parse a Gerber RS274X document from a reader.
pub fn parse<R: Read>(mut reader: R) -> Result<GerberDocument, CamError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let content = String::from_utf8(bytes).map_err(|e| {
        let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
        let line = 1 + valid.iter().filter(|&&b| b == b'\n').count();
        CamError::parse(line, "invalid UTF-8 in Gerber file")
    })?;
    parse_str(&content)
}

/// Parse a Gerber RS274X document held in memory.
pub fn parse_str(content: &str) -> Result<GerberDocument, CamError> {
    let tokens = lexer::tokenize(content);
    if tokens.is_empty() {
        return Err(CamError::parse(1, "empty Gerber file"));
    }

    let doc = commands::parse_tokens(&tokens)?;
    debug!(
        "Gerber: {} tokens, {} data blocks, {} apertures",
        tokens.len(),
        doc.blocks.len(),
        doc.apertures.len()
    );
    Ok(doc)
}
