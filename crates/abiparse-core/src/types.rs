//! Common types, errors, and constants for ABINIT text output parsing

use std::collections::BTreeMap;
use std::ops::Index;

use num_complex::Complex64;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::Serialize;

// ============================================================================
// Constants
// ============================================================================

/// Trigger of an eigenvalue section inside a dataset of the main output file
pub const EIGENVALUES_TRIGGER: &str = "Eigenvalues";
/// Phrase that closes an eigenvalue section when no blank line precedes it
pub const EIGENVALUES_TERMINATOR: &str = "Total charge density";
/// Marker of a spin-polarized eigenvalue channel
pub const SPIN_MARKER: &str = "SPIN";
/// Prefix of a k-point line in eigenvalue sections and EIG files
pub const KPOINT_MARKER: &str = "kpt#";
/// Marker of an occupation block following a k-point block
pub const OCCUPATIONS_MARKER: &str = "occupation numbers";

/// DMFT `.eig` header terminator (matched case-insensitively)
pub const DMFT_HEADER_MARKER: &str = "for each k-point";
pub const DMFT_SPIN_MARKER: &str = "For spin";
pub const DMFT_KPOINT_MARKER: &str = "For k-point";
/// Eigenvalues in DMFT `.eig` files are written doubled
pub const DMFT_EIGENVALUE_SCALE: f64 = 2.0;

pub const PROJECTOR_KPOINT_MARKER: &str = "ikpt";
pub const PROJECTOR_BAND_MARKER: &str = "iband";

pub const FATBAND_MARKER: &str = "# BAND";
pub const FATBAND_SEPARATOR: &str = "&";

/// Characters from the `E` of a glued float to the start of the second
/// float: `E`, the exponent sign and two exponent digits.
pub const GLUED_FLOAT_SPLIT_OFFSET: usize = 4;

/// Spin labels for the two channels of a collinear polarized run
pub const SPIN_UP: &str = "up";
pub const SPIN_DOWN: &str = "down";

// ============================================================================
// Tokens
// ============================================================================

/// One classified whitespace-separated token
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Token {
    Str(String),
    Int(i64),
    Float(f64),
}

// ============================================================================
// Error Types
// ============================================================================

/// Fatal error raised by an extractor
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trigger '{trigger}' not found")]
    TriggerNotFound { trigger: String },

    #[error("{what}: expected {expected} but found {found}")]
    StructuralCountMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("{what}: input ended after {found} of {expected}")]
    PrematureEndOfInput {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("malformed row '{line}': {reason}")]
    MalformedRow { line: String, reason: String },

    #[error("'{token}' is not a number")]
    InvalidNumber { token: String },

    #[error("frequency grids differ between self-energies")]
    GridMismatch,

    #[error("slope fit failed: {0}")]
    DegenerateFit(String),
}

impl ParseError {
    pub(crate) fn mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        ParseError::StructuralCountMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    pub(crate) fn premature_end(what: impl Into<String>, expected: usize, found: usize) -> Self {
        ParseError::PrematureEndOfInput {
            what: what.into(),
            expected,
            found,
        }
    }

    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ParseError::MalformedRow {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn trigger_not_found(trigger: &str) -> Self {
        ParseError::TriggerNotFound {
            trigger: trigger.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Non-fatal problem met while classifying a single token.
///
/// The token is kept as a string and the line is still decomposed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenDiagnostic {
    #[error("'{token}' looks numeric but matches no numeric form")]
    TokenAmbiguity { token: String },

    #[error("'{token}' could not be decomposed into 2 floats")]
    GluedFloatRecoveryFailure { token: String },
}

// ============================================================================
// Eigenvalues
// ============================================================================

/// Ordered mapping from spin label to per-spin data
pub type SpinResolved<T> = BTreeMap<String, T>;

/// Eigenvalues (and optional occupations) at one k-point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct KPointRecord {
    pub coordinates: [f64; 3],
    pub eigenvalues: Vec<f64>,
    pub occupations: Option<Vec<f64>>,
}

/// All k-points of one spin channel
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EigenvalueChannel {
    /// Energy unit written in the channel header, e.g. `hartree`
    pub units: Option<String>,
    pub kpoints: Vec<KPointRecord>,
}

impl EigenvalueChannel {
    /// Number of bands, taken from the first k-point
    pub fn band_count(&self) -> Option<usize> {
        self.kpoints.first().map(|k| k.eigenvalues.len())
    }

    pub fn coordinates(&self) -> Vec<[f64; 3]> {
        self.kpoints.iter().map(|k| k.coordinates).collect()
    }
}

/// Eigenvalue section, split by spin when the run is polarized
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EigenvalueSection {
    Unpolarized(EigenvalueChannel),
    Polarized(SpinResolved<EigenvalueChannel>),
}

impl EigenvalueSection {
    pub fn is_polarized(&self) -> bool {
        matches!(self, EigenvalueSection::Polarized(_))
    }

    /// Channel for `spin`; the unpolarized channel answers to any label
    pub fn channel(&self, spin: &str) -> Option<&EigenvalueChannel> {
        match self {
            EigenvalueSection::Unpolarized(c) => Some(c),
            EigenvalueSection::Polarized(map) => map.get(spin),
        }
    }
}

/// Which lines belong to an eigenvalue extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EigenvalueScope {
    /// Section embedded in an output file, closed by a blank line or
    /// [`EIGENVALUES_TERMINATOR`]
    #[default]
    Section,
    /// Stand-alone EIG file: every line belongs to the section
    WholeFile,
}

// ============================================================================
// DMFT eigenvalues
// ============================================================================

/// Dimensions declared in the header of a DMFT `.eig` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HeaderMeta {
    pub total_bands: usize,
    pub spin_count: usize,
    pub kpt_count: usize,
    pub band_range_start: usize,
    pub band_range_end: usize,
}

impl HeaderMeta {
    /// Number of bands in the correlated window
    pub fn band_count(&self) -> usize {
        (self.band_range_end + 1).saturating_sub(self.band_range_start)
    }
}

/// DMFT eigenvalues indexed `[kpt][band]`, per spin when polarized
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum DmftEigenvalues {
    /// Single spin: the spin axis is dropped
    Collapsed(Vec<Vec<f64>>),
    Polarized(SpinResolved<Vec<Vec<f64>>>),
}

impl DmftEigenvalues {
    /// Total number of eigenvalues held
    pub fn len(&self) -> usize {
        fn count(kpts: &[Vec<f64>]) -> usize {
            kpts.iter().map(Vec::len).sum()
        }
        match self {
            DmftEigenvalues::Collapsed(k) => count(k),
            DmftEigenvalues::Polarized(map) => map.values().map(|k| count(k)).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parsed DMFT `.eig` file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DmftEigFile {
    pub header: HeaderMeta,
    pub eigenvalues: DmftEigenvalues,
}

// ============================================================================
// Projectors
// ============================================================================

/// Dense `(kpt, band, spin, atom, orbital)` array of complex projections
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProjectorTensor {
    shape: [usize; 5],
    data: Vec<Complex64>,
}

impl ProjectorTensor {
    pub(crate) fn zeros(shape: [usize; 5]) -> Result<Self> {
        let len = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| {
                ParseError::InvalidHeader(format!("projector shape {:?} is too large", shape))
            })?;
        Ok(Self {
            shape,
            data: vec![Complex64::default(); len],
        })
    }

    /// `[kpt, band, spin, atom, orbital]`
    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    pub fn kpt_count(&self) -> usize {
        self.shape[0]
    }

    pub fn band_count(&self) -> usize {
        self.shape[1]
    }

    pub fn spin_count(&self) -> usize {
        self.shape[2]
    }

    pub fn atom_count(&self) -> usize {
        self.shape[3]
    }

    pub fn orbital_count(&self) -> usize {
        self.shape[4]
    }

    /// Row-major flat storage
    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn get(&self, index: [usize; 5]) -> Option<&Complex64> {
        self.flat_index(index).map(|i| &self.data[i])
    }

    pub(crate) fn set(&mut self, index: [usize; 5], value: Complex64) {
        if let Some(i) = self.flat_index(index) {
            self.data[i] = value;
        }
    }

    fn flat_index(&self, index: [usize; 5]) -> Option<usize> {
        let mut flat = 0;
        for (i, n) in index.iter().zip(self.shape.iter()) {
            if i >= n {
                return None;
            }
            flat = flat * n + i;
        }
        Some(flat)
    }
}

impl Index<[usize; 5]> for ProjectorTensor {
    type Output = Complex64;

    fn index(&self, index: [usize; 5]) -> &Complex64 {
        match self.get(index) {
            Some(v) => v,
            None => panic!(
                "projector index {:?} out of bounds for shape {:?}",
                index, self.shape
            ),
        }
    }
}

// ============================================================================
// Fatbands
// ============================================================================

/// One k-point of a fatband: eigenvalue and band character
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FatbandPoint {
    pub kpt: i64,
    pub eigenvalue: f64,
    pub character: f64,
}

/// All k-points of one band
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FatbandRecord {
    pub points: Vec<FatbandPoint>,
}

impl FatbandRecord {
    /// `(eigenvalue, character)` pairs in k-point order
    pub fn pairs(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.eigenvalue, p.character))
            .collect()
    }
}

/// Parsed FATBAND file, indexed `[band][kpt]`
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Fatbands {
    pub bands: Vec<FatbandRecord>,
}

impl Fatbands {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn kpt_count(&self) -> usize {
        self.bands.first().map(|b| b.points.len()).unwrap_or(0)
    }
}

// ============================================================================
// Column tables
// ============================================================================

/// Numeric table with a fixed column count
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ColumnTable {
    pub rows: Vec<Vec<f64>>,
}

impl ColumnTable {
    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy of column `index`, `None` when out of range
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.column_count() {
            return None;
        }
        Some(self.rows.iter().map(|r| r[index]).collect())
    }
}

/// Self-energy on Matsubara frequencies
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SelfEnergy {
    pub frequencies: Vec<f64>,
    pub real: Vec<f64>,
    pub imaginary: Vec<f64>,
}

/// Density of states table and its column title line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DosTable {
    pub titles: String,
    pub table: ColumnTable,
}
