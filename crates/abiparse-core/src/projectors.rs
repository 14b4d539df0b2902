//! DMFT projector file extractor
//!
//! ```text
//!  ... header ...
//!     25    29                  <- first and last band of the window
//!  ikpt =     1
//!   iband =    25
//!     1  1  1   0.123   -0.045  <- spin atom orbital re im
//!     ...
//! ```
//!
//! The spin, atom and orbital dimensions are not written anywhere: they are
//! the number of distinct labels seen over the whole file. Rows are first
//! collected per `(kpt, band)` cell and reshaped once every cell is known.

use crate::scanner::{scan, take_block, Rule, Trigger};
use crate::tokens::{decompose_line, tokenize};
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use num_complex::Complex64;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// One raw projector row
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProjectorRow {
    spin: i64,
    atom: i64,
    orbital: i64,
    value: Complex64,
}

/// Parse a projector file into a dense `(kpt, band, spin, atom, orbital)` tensor
#[instrument(skip_all, fields(lines = window.len()))]
pub fn extract_projectors(window: LineWindow<'_>) -> Result<Parsed<ProjectorTensor>> {
    let body_start = window
        .position(|l| l.contains(PROJECTOR_KPOINT_MARKER))
        .ok_or_else(|| ParseError::trigger_not_found(PROJECTOR_KPOINT_MARKER))?;
    let band_count = parse_band_count(window.take(body_start))?;
    debug!(bands = band_count, "band window from header");

    let kpoint_block = |w: LineWindow<'_>| extract_kpoint_block(w, band_count);
    let rules = [Rule::recurring(
        "kpoint",
        Trigger::Contains(PROJECTOR_KPOINT_MARKER),
        &kpoint_block,
    )];
    let body = scan(window.advance(body_start), &rules, &[])?;
    let consumed = body_start + body.consumed;

    let tensor = reshape(&body.into_values(), band_count)?;
    info!(shape = ?tensor.shape(), "projectors reshaped");
    Ok(Parsed::new(tensor, consumed))
}

/// Band count from the last header line: `first last`
fn parse_band_count(header: LineWindow<'_>) -> Result<usize> {
    let line = header
        .len()
        .checked_sub(1)
        .and_then(|i| header.get(i))
        .ok_or_else(|| ParseError::InvalidHeader("projector file has no header".into()))?;
    let ints = decompose_line(line).ints;
    match ints.as_slice() {
        [first, last, ..] if last >= first => last
            .checked_sub(*first)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| {
                ParseError::InvalidHeader(format!("band range {}..{} is too wide", first, last))
            }),
        [first, last, ..] => Err(ParseError::InvalidHeader(format!(
            "band range {}..{} is empty",
            first, last
        ))),
        _ => Err(ParseError::InvalidHeader(format!(
            "no band range in '{}'",
            line
        ))),
    }
}

/// `ikpt` block: band blocks up to the next `ikpt`
fn extract_kpoint_block(
    window: LineWindow<'_>,
    band_count: usize,
) -> Result<Parsed<Vec<Vec<ProjectorRow>>>> {
    let rules = [Rule::recurring(
        "band",
        Trigger::Contains(PROJECTOR_BAND_MARKER),
        &extract_band_block,
    )];
    let bands = scan(
        window.advance(1),
        &rules,
        &[Trigger::Contains(PROJECTOR_KPOINT_MARKER)],
    )?;

    let found = bands.count("band");
    if found != band_count {
        let what = format!("bands at k-point block line {}", window.offset() + 1);
        return Err(if bands.exhausted && found < band_count {
            ParseError::premature_end(what, band_count, found)
        } else {
            ParseError::mismatch(what, band_count, found)
        });
    }
    let consumed = 1 + bands.consumed;
    Ok(Parsed::new(bands.into_values(), consumed))
}

/// `iband` block: raw rows up to the next `iband` or `ikpt`
fn extract_band_block(window: LineWindow<'_>) -> Result<Parsed<Vec<ProjectorRow>>> {
    let block = take_block(window.advance(1), |l| {
        l.contains(PROJECTOR_BAND_MARKER) || l.contains(PROJECTOR_KPOINT_MARKER)
    });
    let rows = block
        .value
        .iter()
        .filter(|l| !l.is_empty())
        .map(parse_row)
        .collect::<Result<Vec<_>>>()?;
    Ok(Parsed::new(rows, block.consumed + 1))
}

/// `spin atom orbital re im`
///
/// The parts are the last two numeric tokens in line order, so either may be
/// printed as an integer.
fn parse_row(line: &str) -> Result<ProjectorRow> {
    let tokens = tokenize(line);
    let mut numbers = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match token {
            Token::Int(i) => numbers.push(*i as f64),
            Token::Float(f) => numbers.push(*f),
            Token::Str(_) => {
                return Err(ParseError::malformed(line, "unexpected text in projector row"))
            }
        }
    }
    let labels = match tokens.as_slice() {
        [Token::Int(s), Token::Int(a), Token::Int(o), ..] => (*s, *a, *o),
        _ => {
            return Err(ParseError::malformed(
                line,
                "expected spin, atom and orbital labels",
            ))
        }
    };
    let n = numbers.len();
    if n < 5 {
        return Err(ParseError::malformed(
            line,
            "expected real and imaginary parts",
        ));
    }
    Ok(ProjectorRow {
        spin: labels.0,
        atom: labels.1,
        orbital: labels.2,
        value: Complex64::new(numbers[n - 2], numbers[n - 1]),
    })
}

/// Sorted distinct labels of one column over every cell
fn distinct_labels<F>(cells: &[Vec<Vec<ProjectorRow>>], column: F) -> Vec<i64>
where
    F: Fn(&ProjectorRow) -> i64,
{
    cells
        .iter()
        .flatten()
        .flatten()
        .map(column)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Dense position of a label; labels come from the same data so it is present
fn rank(labels: &[i64], label: i64) -> usize {
    labels.binary_search(&label).unwrap_or_default()
}

fn reshape(cells: &[Vec<Vec<ProjectorRow>>], band_count: usize) -> Result<ProjectorTensor> {
    let spins = distinct_labels(cells, |r| r.spin);
    let atoms = distinct_labels(cells, |r| r.atom);
    let orbitals = distinct_labels(cells, |r| r.orbital);
    let (ns, na, no) = (spins.len(), atoms.len(), orbitals.len());
    let per_cell = ns.checked_mul(na).and_then(|n| n.checked_mul(no));
    debug!(
        kpoints = cells.len(),
        bands = band_count,
        spins = ns,
        atoms = na,
        orbitals = no,
        "inferred projector shape"
    );

    for (ik, kpt) in cells.iter().enumerate() {
        for (ib, rows) in kpt.iter().enumerate() {
            if per_cell != Some(rows.len()) {
                return Err(ParseError::mismatch(
                    format!("projector rows at kpt {} band {}", ik + 1, ib + 1),
                    per_cell.unwrap_or(usize::MAX),
                    rows.len(),
                ));
            }
        }
    }

    let per_cell = per_cell.unwrap_or_default();
    let mut tensor = ProjectorTensor::zeros([cells.len(), band_count, ns, na, no])?;
    for (ik, kpt) in cells.iter().enumerate() {
        for (ib, rows) in kpt.iter().enumerate() {
            let mut filled = vec![false; per_cell];
            for row in rows {
                let (s, a, o) = (
                    rank(&spins, row.spin),
                    rank(&atoms, row.atom),
                    rank(&orbitals, row.orbital),
                );
                let flat = s * na * no + a * no + o;
                if std::mem::replace(&mut filled[flat], true) {
                    return Err(ParseError::malformed(
                        &format!("{} {} {}", row.spin, row.atom, row.orbital),
                        format!("duplicate row at kpt {} band {}", ik + 1, ib + 1),
                    ));
                }
                tensor.set([ik, ib, s, a, o], row.value);
            }
        }
    }
    Ok(tensor)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Value stored for a cell, unique per index
    fn value(k: usize, b: usize, a: usize, o: usize) -> (f64, f64) {
        let re = (k * 1000 + b * 100 + a * 10 + o) as f64 / 1000.0;
        (re, -re / 2.0)
    }

    /// Projector file with spin {1}, the given atom and orbital labels
    fn projector_file(
        kpts: usize,
        bands: (usize, usize),
        atoms: &[i64],
        orbitals: &[i64],
    ) -> Vec<String> {
        let mut out = vec![
            "Projector file for DMFT".to_string(),
            format!("   {}   {}", bands.0, bands.1),
        ];
        for k in 1..=kpts {
            out.push(format!("ikpt = {}", k));
            for b in bands.0..=bands.1 {
                out.push(format!(" iband = {}", b));
                for (ia, atom) in atoms.iter().enumerate() {
                    for (io, orb) in orbitals.iter().enumerate() {
                        let (re, im) = value(k, b - bands.0, ia, io);
                        out.push(format!("1 {} {} {:.6} {:.6}", atom, orb, re, im));
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_shape_inference() {
        let data = projector_file(2, (10, 11), &[1, 2], &[1, 2, 3]);
        let parsed = extract_projectors(LineWindow::new(&data)).unwrap();
        assert_eq!(parsed.consumed, data.len());
        let t = parsed.value;
        assert_eq!(t.shape(), [2, 2, 1, 2, 3]);
        assert_eq!(t.as_slice().len(), 24);

        let (re, im) = value(2, 1, 1, 2);
        assert!((t[[1, 1, 0, 1, 2]] - Complex64::new(re, im)).norm() < 1e-9);
        let (re, im) = value(1, 0, 0, 0);
        assert!((t[[0, 0, 0, 0, 0]] - Complex64::new(re, im)).norm() < 1e-9);
    }

    #[test]
    fn test_sparse_labels_are_ranked() {
        let data = projector_file(1, (3, 3), &[4, 9], &[2]);
        let t = extract_projectors(LineWindow::new(&data)).unwrap().value;
        assert_eq!(t.shape(), [1, 1, 1, 2, 1]);
        let (re, _) = value(1, 0, 1, 0);
        assert!((t[[0, 0, 0, 1, 0]].re - re).abs() < 1e-9);
    }

    #[test]
    fn test_missing_row_is_mismatch() {
        let mut data = projector_file(2, (10, 11), &[1, 2], &[1, 2, 3]);
        // first row of (kpt 1, band 10)
        assert!(data[4].starts_with("1 1 1"));
        data.remove(4);
        let err = extract_projectors(LineWindow::new(&data)).unwrap_err();
        match err {
            ParseError::StructuralCountMismatch {
                what,
                expected,
                found,
            } => {
                assert_eq!((expected, found), (6, 5));
                assert!(what.contains("kpt 1 band 1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let mut data = projector_file(1, (1, 1), &[1, 2], &[1, 2]);
        data[7] = data[4].clone();
        let err = extract_projectors(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { .. }));
    }

    #[test]
    fn test_missing_band_block() {
        let data = projector_file(1, (1, 2), &[1], &[1]);
        let short = [&data[..5], &data[6..]].concat();
        // header says 2 bands, second band block header removed
        let err = extract_projectors(LineWindow::new(&short)).unwrap_err();
        assert!(matches!(err, ParseError::PrematureEndOfInput { .. }));
    }

    #[test]
    fn test_bad_row() {
        let err = parse_row("1 1 0.5 0.5").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { .. }));
        let err = parse_row("1 1 1 x 0.5").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow { .. }));
        let row = parse_row("2 1 3 0.25 -0.5").unwrap();
        assert_eq!((row.spin, row.atom, row.orbital), (2, 1, 3));
        assert_eq!(row.value, Complex64::new(0.25, -0.5));
    }

    #[test]
    fn test_integer_parts_keep_their_order() {
        let row = parse_row("1 1 1 0.5 0").unwrap();
        assert_eq!(row.value, Complex64::new(0.5, 0.0));
        let row = parse_row("1 1 1 0 -0.5").unwrap();
        assert_eq!(row.value, Complex64::new(0.0, -0.5));
    }

    #[test]
    fn test_distinct_labels_checked_before_allocation() {
        let mut data = vec![
            "Projector file for DMFT".to_string(),
            "1 1".to_string(),
            "ikpt = 1".to_string(),
            " iband = 1".to_string(),
        ];
        data.extend((1..=3000).map(|i| format!("{} {} {} 0.1 0.2", i, i, i)));
        let err = extract_projectors(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::StructuralCountMismatch {
                expected: 27_000_000_000,
                found: 3000,
                ..
            }
        ));
    }

    #[test]
    fn test_band_range_overflow_is_invalid_header() {
        let data = vec![
            "Projector file for DMFT".to_string(),
            "-9223372036854775808 9223372036854775807".to_string(),
            "ikpt = 1".to_string(),
        ];
        let err = extract_projectors(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader(_)));
    }

    #[test]
    fn test_missing_body() {
        let data = vec!["1 2".to_string()];
        let err = extract_projectors(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(err, ParseError::TriggerNotFound { .. }));
    }
}
