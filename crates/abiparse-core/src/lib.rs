//! # ABINIT Output Parser - Core Library
//!
//! Extracts typed numeric data from the text files written by ABINIT.
//!
//! ## Supported Files
//!
//! - Eigenvalue sections of the main output file and `_EIG` files
//! - DMFT `.eig` files (correlated band window eigenvalues)
//! - DMFT projector files (complex `(kpt, band, spin, atom, orbital)` tensor)
//! - `_FATBAND` files
//! - DOS files, self-energy and other plain column files
//!
//! ## Features
//!
//! - Token classifier that recovers floats printed without a separator
//! - Trigger-driven block scanner; every extractor reports how many lines
//!   it consumed so callers can nest them
//! - Header counts checked against the data actually found
//! - Memory-mapped file reads
//! - Structured logging via `tracing` for diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use abiparse_core::{read_dmft_eigenvalues, read_projectors, DmftEigenvalues};
//!
//! let eig = read_dmft_eigenvalues("run_DMFT.eig").unwrap();
//! println!("bands in window: {}", eig.header.band_count());
//! if let DmftEigenvalues::Polarized(spins) = &eig.eigenvalues {
//!     println!("spins: {:?}", spins.keys().collect::<Vec<_>>());
//! }
//!
//! let proj = read_projectors("run_DMFT.ovlp").unwrap();
//! println!("shape: {:?}", proj.shape());
//! ```
//!
//! ## Working on Lines
//!
//! Every extractor takes a [`LineWindow`] over pre-trimmed lines, so data
//! already in memory can be parsed without touching the file system:
//!
//! ```rust
//! use abiparse_core::{extract_band_block, lines_from_str, LineWindow};
//!
//! let lines = lines_from_str("# BAND number : 1\n1 2.5 0.8\n&\n");
//! let band = extract_band_block(LineWindow::new(&lines)).unwrap();
//! assert_eq!(band.consumed, 2);
//! assert_eq!(band.value.pairs(), vec![(2.5, 0.8)]);
//! ```
//!
//! ## Enabling Logging
//!
//! This library uses `tracing` for structured logging. To see log output,
//! initialize a tracing subscriber in your application:
//!
//! ```rust,ignore
//! // Add tracing-subscriber to your Cargo.toml
//! tracing_subscriber::fmt::init();
//!
//! // Now library logs will be visible
//! let fatbands = abiparse_core::read_fatbands("run_FATBANDS_at0001_Fe_is1_l0002").unwrap();
//! ```

mod dmft_eig;
mod eig;
mod fatband;
mod projectors;
mod scanner;
mod sections;
mod source;
mod table;
mod tokens;
mod types;
mod window;

use tracing::instrument;

// Re-export public types
pub use types::{
    // Classified tokens
    Token,
    TokenDiagnostic,
    // Error types
    ParseError,
    Result,
    // Eigenvalues
    EigenvalueChannel,
    EigenvalueScope,
    EigenvalueSection,
    KPointRecord,
    SpinResolved,
    // DMFT
    DmftEigFile,
    DmftEigenvalues,
    HeaderMeta,
    ProjectorTensor,
    // Fatbands and column files
    ColumnTable,
    DosTable,
    FatbandPoint,
    FatbandRecord,
    Fatbands,
    SelfEnergy,
    // Constants
    DMFT_EIGENVALUE_SCALE,
    EIGENVALUES_TERMINATOR,
    EIGENVALUES_TRIGGER,
    GLUED_FLOAT_SPLIT_OFFSET,
    KPOINT_MARKER,
    SPIN_DOWN,
    SPIN_UP,
};

pub use dmft_eig::extract_dmft_eigenvalues;
pub use eig::{extract_eigenvalues, extract_kpoint};
pub use fatband::{extract_band_block, extract_fatbands};
pub use projectors::extract_projectors;
pub use scanner::{scan, take_block, Handler, Rule, Scan, Trigger};
pub use sections::{extract_sections, Section};
pub use source::{lines_from_str, read_lines};
pub use table::{parse_column_table, parse_dos, SlopeEstimate};
pub use tokens::{classify_token, decompose_line, tokenize, Classified, DecomposedLine};
pub use window::{LineWindow, Parsed};

// ============================================================================
// Public API Functions
// ============================================================================

/// Read the eigenvalues of an `_EIG` file.
///
/// Lines before the first `Eigenvalues` header (e.g. the Fermi energy line)
/// are skipped; everything after it belongs to the section.
///
/// # Example
/// ```rust,no_run
/// let eig = abiparse_core::read_eigenvalues("run_EIG").unwrap();
/// if let Some(up) = eig.channel("up") {
///     println!("{} k-points", up.kpoints.len());
/// }
/// ```
#[instrument]
pub fn read_eigenvalues(filename: &str) -> Result<EigenvalueSection> {
    let lines = read_lines(filename)?;
    let window = LineWindow::new(&lines);
    let start = window
        .position(|l| l.contains(EIGENVALUES_TRIGGER))
        .ok_or_else(|| ParseError::trigger_not_found(EIGENVALUES_TRIGGER))?;
    Ok(extract_eigenvalues(window.advance(start), EigenvalueScope::WholeFile)?.value)
}

/// Read the sections of one dataset of an output file
#[instrument]
pub fn read_sections(filename: &str) -> Result<Scan<Section>> {
    let lines = read_lines(filename)?;
    extract_sections(LineWindow::new(&lines))
}

/// Read a DMFT `.eig` file
#[instrument]
pub fn read_dmft_eigenvalues(filename: &str) -> Result<DmftEigFile> {
    let lines = read_lines(filename)?;
    Ok(extract_dmft_eigenvalues(LineWindow::new(&lines))?.value)
}

/// Read a DMFT projector file
#[instrument]
pub fn read_projectors(filename: &str) -> Result<ProjectorTensor> {
    let lines = read_lines(filename)?;
    Ok(extract_projectors(LineWindow::new(&lines))?.value)
}

/// Read a `_FATBAND` file
#[instrument]
pub fn read_fatbands(filename: &str) -> Result<Fatbands> {
    let lines = read_lines(filename)?;
    Ok(extract_fatbands(LineWindow::new(&lines))?.value)
}

/// Read a `_DOS` file
#[instrument]
pub fn read_dos(filename: &str) -> Result<DosTable> {
    let lines = read_lines(filename)?;
    Ok(parse_dos(LineWindow::new(&lines))?.value)
}

/// Read a plain column file, e.g. a spectral function
#[instrument]
pub fn read_column_table(filename: &str) -> Result<ColumnTable> {
    let lines = read_lines(filename)?;
    Ok(parse_column_table(LineWindow::new(&lines))?.value)
}

/// Read one or more self-energy files and average them.
///
/// # Arguments
/// * `filenames` - Self-energy files sampled on the same frequencies
/// * `double_counting` - Shift subtracted from every real part
///
/// # Returns
/// * `Ok(SelfEnergy)` - The element-wise mean
/// * `Err(ParseError::GridMismatch)` - If the frequency grids differ
#[instrument]
pub fn read_self_energy(filenames: &[&str], double_counting: f64) -> Result<SelfEnergy> {
    let sources = filenames
        .iter()
        .map(|f| {
            let table = read_column_table(f)?;
            SelfEnergy::from_table(&table, double_counting)
        })
        .collect::<Result<Vec<_>>>()?;
    SelfEnergy::mean(&sources)
}
