//! Per-dataset section table
//!
//! A dataset of the main output file is scanned once with a table of
//! trigger phrases. Each trigger hands its section to a dedicated extractor.

use crate::eig::extract_eigenvalues;
use crate::scanner::{scan, Rule, Scan, Trigger};
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use tracing::{info, instrument};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Section recognised inside a dataset
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Section {
    Eigenvalues(EigenvalueSection),
}

impl Section {
    pub fn as_eigenvalues(&self) -> Option<&EigenvalueSection> {
        match self {
            Section::Eigenvalues(e) => Some(e),
        }
    }
}

fn eigenvalues_section(window: LineWindow<'_>) -> Result<Parsed<Section>> {
    Ok(extract_eigenvalues(window, EigenvalueScope::Section)?.map(Section::Eigenvalues))
}

/// Scan the lines of one dataset.
///
/// Every rule fires at most once. A section that runs to the end of the
/// dataset without its terminator is parsed up to the last line.
#[instrument(skip_all, fields(start = window.offset(), lines = window.len()))]
pub fn extract_sections(window: LineWindow<'_>) -> Result<Scan<Section>> {
    let rules = [Rule::once(
        "eigenvalues",
        Trigger::Contains(EIGENVALUES_TRIGGER),
        &eigenvalues_section,
    )];

    let sections = scan(window, &rules, &[])?;
    info!(sections = sections.entries.len(), "dataset scanned");
    Ok(sections)
}

// ============================================================================
// Tests
// ============================================================================
