//! Line source
//!
//! Extractors work on pre-trimmed lines. Files are memory mapped once and
//! decoded lossily so a stray non-UTF-8 byte does not abort a parse.

use crate::types::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Split text into lines with surrounding whitespace removed
pub fn lines_from_str(text: &str) -> Vec<String> {
    text.lines().map(|l| l.trim().to_string()).collect()
}

/// Read a text file into trimmed lines
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let file = File::open(path.as_ref())?;
    // Mapping a zero-length file fails on some platforms
    if file.metadata()?.len() == 0 {
        debug!("empty file");
        return Ok(Vec::new());
    }
    let mmap = unsafe { Mmap::map(&file)? };

    let lines = lines_from_str(&String::from_utf8_lossy(&mmap));
    info!(
        bytes = mmap.len(),
        lines = lines.len(),
        "file loaded"
    );
    Ok(lines)
}
