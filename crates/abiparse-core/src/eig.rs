//! Eigenvalue and occupation extractor
//!
//! Reads the `Eigenvalues (hartree) for nkpt= ...` section of an output file,
//! or a whole `_EIG` file. Layout of one channel:
//!
//! ```text
//! Eigenvalues (hartree) for nkpt=   2  k points:
//! kpt#   1, nband=  3, wtk=  0.50000, kpt=  0.0000  0.0000  0.0000 (reduced coord)
//!   -0.12345   0.23456   0.34567
//! occupation numbers for kpt#   1
//!    2.00000   2.00000   0.00000
//! kpt#   2, ...
//! ```
//!
//! Polarized runs repeat that layout once per `SPIN UP:` / `SPIN DOWN:` header.

use crate::scanner::{scan, take_block, Rule, Trigger};
use crate::tokens::line_floats;
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use tracing::{debug, instrument, warn};

/// Block found inside one spin channel
enum ChannelBlock {
    KPoint(KPointRecord),
    Occupations(Vec<f64>),
}

/// Extract an eigenvalue section starting at its trigger line.
///
/// With [`EigenvalueScope::Section`] the section ends before the first empty
/// line or [`EIGENVALUES_TERMINATOR`] line; that line is not consumed.
#[instrument(skip_all, fields(start = window.offset(), scope = ?scope))]
pub fn extract_eigenvalues(
    window: LineWindow<'_>,
    scope: EigenvalueScope,
) -> Result<Parsed<EigenvalueSection>> {
    let section = match scope {
        EigenvalueScope::Section => {
            take_block(window, |l| l.is_empty() || l.contains(EIGENVALUES_TERMINATOR)).value
        }
        EigenvalueScope::WholeFile => window,
    };
    let first = section
        .first()
        .ok_or_else(|| ParseError::trigger_not_found(EIGENVALUES_TRIGGER))?;
    debug!(lines = section.len(), "eigenvalue lines to parse");

    let value = if first.contains(SPIN_MARKER) {
        EigenvalueSection::Polarized(extract_polarized(section)?)
    } else {
        EigenvalueSection::Unpolarized(extract_channel(section)?)
    };
    Ok(Parsed::new(value, section.len()))
}

/// Split a polarized section on its `SPIN` headers and parse each channel
fn extract_polarized(section: LineWindow<'_>) -> Result<SpinResolved<EigenvalueChannel>> {
    let starts: Vec<usize> = section
        .iter()
        .enumerate()
        .filter(|(_, l)| l.contains(SPIN_MARKER))
        .map(|(i, _)| i)
        .collect();

    let mut channels = SpinResolved::new();
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(section.len());
        let segment = section.advance(start).take(end - start);
        let header = segment.first().unwrap_or_default();
        let label = spin_label(header)
            .ok_or_else(|| ParseError::InvalidHeader(format!("no spin label in '{}'", header)))?;
        debug!(spin = %label, lines = segment.len(), "spin channel");
        channels.insert(label, extract_channel(segment)?);
    }

    if channels.len() != starts.len() {
        return Err(ParseError::mismatch(
            "distinct spin channels",
            starts.len(),
            channels.len(),
        ));
    }
    Ok(channels)
}

/// `... SPIN UP:` -> `up`
fn spin_label(line: &str) -> Option<String> {
    let last = line.split_whitespace().last()?;
    let label = last.trim_end_matches(|c: char| !c.is_alphanumeric());
    (!label.is_empty()).then(|| label.to_lowercase())
}

/// Energy unit between the parentheses of a channel header
fn parse_units(line: &str) -> Option<String> {
    let open = line.find('(')?;
    let inner = &line[open + 1..];
    let inner = inner.split(')').next().unwrap_or(inner);
    inner.split_whitespace().next().map(str::to_string)
}

/// Parse one channel: header line, then k-point and occupation blocks
fn extract_channel(lines: LineWindow<'_>) -> Result<EigenvalueChannel> {
    let units = lines.first().and_then(parse_units);

    let kpoint = |w: LineWindow<'_>| -> Result<Parsed<ChannelBlock>> {
        Ok(extract_kpoint(w)?.map(ChannelBlock::KPoint))
    };
    let occupations = |w: LineWindow<'_>| -> Result<Parsed<ChannelBlock>> {
        Ok(extract_value_run(w).map(ChannelBlock::Occupations))
    };
    let rules = [
        Rule::recurring("kpoint", Trigger::Prefix(KPOINT_MARKER), &kpoint),
        Rule::recurring("occupations", Trigger::Contains(OCCUPATIONS_MARKER), &occupations),
    ];
    let blocks = scan(lines.advance(1), &rules, &[])?;

    let mut channel = EigenvalueChannel {
        units,
        kpoints: Vec::new(),
    };
    for block in blocks.into_values() {
        match block {
            ChannelBlock::KPoint(k) => channel.kpoints.push(k),
            ChannelBlock::Occupations(occ) => {
                let last = channel.kpoints.last_mut().ok_or_else(|| {
                    ParseError::mismatch("k-points before occupation block", 1, 0)
                })?;
                if last.occupations.is_some() {
                    warn!(
                        coordinates = ?last.coordinates,
                        "second occupation block replaces the first"
                    );
                }
                last.occupations = Some(occ);
            }
        }
    }

    debug!(
        kpoints = channel.kpoints.len(),
        bands = ?channel.band_count(),
        "channel parsed"
    );
    Ok(channel)
}

/// Parse a k-point block: the `kpt#` line and the eigenvalue run below it.
///
/// An empty eigenvalue run is accepted.
pub fn extract_kpoint(window: LineWindow<'_>) -> Result<Parsed<KPointRecord>> {
    let line = window
        .first()
        .ok_or_else(|| ParseError::trigger_not_found(KPOINT_MARKER))?;
    let coordinates = parse_kpoint_coordinates(line)?;
    let run = extract_value_run(window);
    if run.value.is_empty() {
        debug!(?coordinates, "no eigenvalues found for k-point");
    }
    Ok(run.map(|eigenvalues| KPointRecord {
        coordinates,
        eigenvalues,
        occupations: None,
    }))
}

/// Floats of the lines following a marker, up to the next marker
fn extract_value_run(window: LineWindow<'_>) -> Parsed<Vec<f64>> {
    let run = take_block(window.advance(1), |l| {
        l.contains(KPOINT_MARKER) || l.contains(OCCUPATIONS_MARKER)
    });
    let values = run.value.iter().flat_map(line_floats).collect();
    Parsed::new(values, run.consumed + 1)
}

/// Last three numbers of a `kpt#` line, ignoring a trailing `(...)` note
fn parse_kpoint_coordinates(line: &str) -> Result<[f64; 3]> {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .take_while(|t| !t.starts_with('('))
        .collect();
    if tokens.len() < 4 {
        return Err(ParseError::malformed(line, "k-point line without 3 coordinates"));
    }

    let mut coords = [0.0; 3];
    for (c, t) in coords.iter_mut().zip(&tokens[tokens.len() - 3..]) {
        *c = t.parse().map_err(|_| ParseError::InvalidNumber {
            token: t.to_string(),
        })?;
    }
    Ok(coords)
}

// ============================================================================
// Tests
// ============================================================================
