//! FATBAND file extractor
//!
//! ```text
//! # BAND number :     1
//!      1   -0.31245   0.20000     <- kpt eigenvalue character
//!      2   -0.30012   0.21000
//! &
//! # BAND number :     2
//! ...
//! ```

use crate::scanner::{scan, Rule, Trigger};
use crate::tokens::decompose_line;
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use tracing::{debug, error, info, instrument};

/// Parse every band block of a FATBAND file
#[instrument(skip_all, fields(lines = window.len()))]
pub fn extract_fatbands(window: LineWindow<'_>) -> Result<Parsed<Fatbands>> {
    let rules = [Rule::recurring(
        "band",
        Trigger::Prefix(FATBAND_MARKER),
        &extract_band_block,
    )];
    let blocks = scan(window, &rules, &[])?;
    let consumed = blocks.consumed;
    let bands = blocks.into_values();

    if let Some(first) = bands.first() {
        let expected = first.points.len();
        for (i, band) in bands.iter().enumerate() {
            if band.points.len() != expected {
                return Err(ParseError::mismatch(
                    format!("k-points in band {}", i + 1),
                    expected,
                    band.points.len(),
                ));
            }
        }
    }

    let fatbands = Fatbands { bands };
    info!(
        bands = fatbands.band_count(),
        kpoints = fatbands.kpt_count(),
        "fatbands extracted"
    );
    Ok(Parsed::new(fatbands, consumed))
}

/// `# BAND`, `&` and empty lines delimit band blocks
fn is_boundary(line: &str) -> bool {
    line.starts_with(FATBAND_MARKER) || line.starts_with(FATBAND_SEPARATOR) || line.is_empty()
}

/// Parse one band block.
///
/// The first boundary line opens the block, the second one ends it and is
/// left for the caller. Every other line must be `kpt eigenvalue character`.
pub fn extract_band_block(window: LineWindow<'_>) -> Result<Parsed<FatbandRecord>> {
    let mut opened = false;
    let mut record = FatbandRecord::default();

    for (i, line) in window.iter().enumerate() {
        if is_boundary(line) {
            if opened {
                debug!(kpoints = record.points.len(), "band block parsed");
                return Ok(Parsed::new(record, i));
            }
            opened = true;
            continue;
        }

        let d = decompose_line(line);
        if d.floats.len() != 2 || d.ints.len() != 1 {
            error!(line = window.offset() + i, "error while extracting fatband data");
            return Err(ParseError::malformed(
                line,
                "expected k-point index, eigenvalue and character",
            ));
        }
        record.points.push(FatbandPoint {
            kpt: d.ints[0],
            eigenvalue: d.floats[0],
            character: d.floats[1],
        });
    }

    Ok(Parsed::new(record, window.len()))
}

// ============================================================================
// Tests
// ============================================================================
