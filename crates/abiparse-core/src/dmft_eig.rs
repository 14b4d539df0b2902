//! DMFT `.eig` file extractor
//!
//! Layout:
//!
//! ```text
//!  Comment ...
//!     25      2      3     10     14        <- nband nsppol nkpt ... bandi bandf
//!  for each k-point, eigenvalues for each band
//!  For spin
//!       1
//!  For k-point
//!       1
//!     10      1    -0.2468
//!     ...
//! ```
//!
//! Every count read from the header is enforced on the body. Eigenvalues are
//! written doubled and are halved here.

use crate::scanner::{scan, Rule, Trigger};
use crate::tokens::{decompose_line, line_floats};
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use tracing::{debug, info, instrument, trace};

/// Parse a whole DMFT `.eig` file
#[instrument(skip_all, fields(lines = window.len()))]
pub fn extract_dmft_eigenvalues(window: LineWindow<'_>) -> Result<Parsed<DmftEigFile>> {
    let marker = window
        .position(|l| l.to_lowercase().contains(DMFT_HEADER_MARKER))
        .ok_or_else(|| ParseError::trigger_not_found(DMFT_HEADER_MARKER))?;
    let header = parse_header(window.take(marker))?;
    info!(
        spins = header.spin_count,
        kpoints = header.kpt_count,
        bands = header.band_count(),
        "DMFT header"
    );

    let spin_block = |w: LineWindow<'_>| extract_spin_block(w, &header);
    let rules = [Rule::recurring(
        "spin",
        Trigger::Contains(DMFT_SPIN_MARKER),
        &spin_block,
    )];
    let body = scan(window.advance(marker + 1), &rules, &[])?;
    let consumed = marker + 1 + body.consumed;

    let spins = body.into_values();
    if spins.len() < header.spin_count {
        return Err(ParseError::premature_end(
            "spin blocks",
            header.spin_count,
            spins.len(),
        ));
    }
    if spins.len() != header.spin_count {
        return Err(ParseError::mismatch(
            "spin blocks",
            header.spin_count,
            spins.len(),
        ));
    }

    let eigenvalues = if header.spin_count == 1 {
        DmftEigenvalues::Collapsed(spins.into_iter().next().unwrap_or_default())
    } else {
        DmftEigenvalues::Polarized(
            spins
                .into_iter()
                .enumerate()
                .map(|(n, kpts)| (spin_label(n), kpts))
                .collect(),
        )
    };
    Ok(Parsed::new(
        DmftEigFile {
            header,
            eigenvalues,
        },
        consumed,
    ))
}

/// Metadata line: the nearest header line with at least five integers
fn parse_header(header: LineWindow<'_>) -> Result<HeaderMeta> {
    let ints = header
        .iter()
        .rev()
        .map(|l| decompose_line(l).ints)
        .find(|ints| ints.len() >= 5)
        .ok_or_else(|| {
            ParseError::InvalidHeader("no line with 5 integers before the body".into())
        })?;

    let field = |v: i64, name: &str| {
        usize::try_from(v)
            .map_err(|_| ParseError::InvalidHeader(format!("negative {}: {}", name, v)))
    };
    let n = ints.len();
    let meta = HeaderMeta {
        total_bands: field(ints[0], "band total")?,
        spin_count: field(ints[1], "spin count")?,
        kpt_count: field(ints[2], "k-point count")?,
        band_range_start: field(ints[n - 2], "first band")?,
        band_range_end: field(ints[n - 1], "last band")?,
    };
    if meta.band_range_end < meta.band_range_start {
        return Err(ParseError::InvalidHeader(format!(
            "band range {}..{} is empty",
            meta.band_range_start, meta.band_range_end
        )));
    }
    Ok(meta)
}

fn spin_label(n: usize) -> String {
    match n {
        0 => SPIN_UP.to_string(),
        1 => SPIN_DOWN.to_string(),
        _ => (n + 1).to_string(),
    }
}

/// `For spin` block: k-point blocks up to the next `For spin`
fn extract_spin_block(
    window: LineWindow<'_>,
    header: &HeaderMeta,
) -> Result<Parsed<Vec<Vec<f64>>>> {
    let band_count = header.band_count();
    let kpoint_block = |w: LineWindow<'_>| extract_kpoint_block(w, band_count);
    let rules = [Rule::recurring(
        "kpoint",
        Trigger::Contains(DMFT_KPOINT_MARKER),
        &kpoint_block,
    )];
    let kpts = scan(
        window.advance(1),
        &rules,
        &[Trigger::Contains(DMFT_SPIN_MARKER)],
    )?;

    let found = kpts.count("kpoint");
    if found != header.kpt_count {
        return Err(if kpts.exhausted && found < header.kpt_count {
            ParseError::premature_end("k-points in spin block", header.kpt_count, found)
        } else {
            ParseError::mismatch("k-points in spin block", header.kpt_count, found)
        });
    }
    debug!(kpoints = found, start = window.offset(), "spin block parsed");
    let consumed = 1 + kpts.consumed;
    Ok(Parsed::new(kpts.into_values(), consumed))
}

/// `For k-point` block: one halved eigenvalue per row, ending at the first
/// line without a float once rows have started
fn extract_kpoint_block(window: LineWindow<'_>, band_count: usize) -> Result<Parsed<Vec<f64>>> {
    let mut eigenvalues = Vec::with_capacity(band_count.min(window.len()));
    let mut end = window.len();

    for (i, line) in window.iter().enumerate().skip(1) {
        match line_floats(line).first() {
            Some(raw) => eigenvalues.push(raw / DMFT_EIGENVALUE_SCALE),
            None if !eigenvalues.is_empty() => {
                end = i;
                break;
            }
            None => {}
        }
    }

    if eigenvalues.len() != band_count {
        return Err(ParseError::mismatch(
            format!("eigenvalues at k-point block line {}", window.offset() + 1),
            band_count,
            eigenvalues.len(),
        ));
    }
    trace!(bands = eigenvalues.len(), "k-point block parsed");
    Ok(Parsed::new(eigenvalues, end))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// DMFT file with raw values `2 * (s + k/10 + b/100)`
    fn dmft_file(
        spins: usize,
        kpts: usize,
        bands: std::ops::RangeInclusive<usize>,
    ) -> Vec<String> {
        let mut out = vec![
            "Comment for DMFT eigenvalues".to_string(),
            format!(
                "{} {} {} {} {}",
                20,
                spins,
                kpts,
                bands.start(),
                bands.end()
            ),
            "for each k-point, eigenvalues for each band".to_string(),
        ];
        for s in 1..=spins {
            out.push("For spin".into());
            out.push(format!("{}", s));
            for k in 1..=kpts {
                out.push("For k-point".into());
                out.push(format!("{}", k));
                for b in bands.clone() {
                    let v = 2.0 * (s as f64 + k as f64 / 10.0 + b as f64 / 100.0);
                    out.push(format!("{} {} {:.6}", b, k, v));
                }
            }
        }
        out
    }

    #[test]
    fn test_polarized_shape() {
        let data = dmft_file(2, 3, 10..=14);
        let parsed = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap();
        assert_eq!(parsed.consumed, data.len());
        assert_eq!(parsed.value.header.band_count(), 5);

        let DmftEigenvalues::Polarized(map) = &parsed.value.eigenvalues else {
            panic!("expected polarized eigenvalues");
        };
        assert_eq!(map.len(), 2);
        for kpts in map.values() {
            assert_eq!(kpts.len(), 3);
            assert!(kpts.iter().all(|k| k.len() == 5));
        }
        assert_eq!(parsed.value.eigenvalues.len(), 30);
        assert!((map["up"][0][0] - 1.2).abs() < 1e-12);
        assert!((map["down"][2][4] - 2.44).abs() < 1e-12);
    }

    #[test]
    fn test_single_spin_collapses() {
        let data = dmft_file(1, 2, 1..=3);
        let parsed = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap();
        let DmftEigenvalues::Collapsed(kpts) = parsed.value.eigenvalues else {
            panic!("expected no spin axis");
        };
        assert_eq!(kpts.len(), 2);
        assert_eq!(kpts[1].len(), 3);
    }

    #[test]
    fn test_eigenvalues_are_halved() {
        let data: Vec<String> = [
            "header",
            "3 1 1 1 1",
            "For each k-point, eigenvalues for each band",
            "For spin",
            "1",
            "For k-point",
            "1",
            "1 1 2.468",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let parsed = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap();
        assert_eq!(
            parsed.value.eigenvalues,
            DmftEigenvalues::Collapsed(vec![vec![1.234]])
        );
    }

    #[test]
    fn test_missing_band_row_is_mismatch() {
        for removed in [9, 15, 40] {
            let mut data = dmft_file(2, 3, 10..=14);
            assert!(data[removed].split_whitespace().count() == 3);
            data.remove(removed);
            let err = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap_err();
            assert!(
                matches!(
                    err,
                    ParseError::StructuralCountMismatch {
                        expected: 5,
                        found: 4,
                        ..
                    }
                ),
                "line {}: {:?}",
                removed,
                err
            );
        }
    }

    #[test]
    fn test_truncated_file_is_premature_end() {
        let data = dmft_file(2, 3, 1..=2);
        let cut = data.iter().rposition(|l| l == "For spin").unwrap();
        let err = extract_dmft_eigenvalues(LineWindow::new(&data[..cut])).unwrap_err();
        assert!(matches!(
            err,
            ParseError::PrematureEndOfInput {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_huge_band_range_is_mismatch() {
        for header in ["3 1 1 1 9223372036854775807", "3 1 1 1 100000000000"] {
            let data: Vec<String> = [
                "header",
                header,
                "For each k-point, eigenvalues for each band",
                "For spin",
                "1",
                "For k-point",
                "1",
                "1 1 2.468",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
            let err = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap_err();
            assert!(
                matches!(err, ParseError::StructuralCountMismatch { found: 1, .. }),
                "{}: {:?}",
                header,
                err
            );
        }
    }

    #[test]
    fn test_missing_header_marker() {
        let data = vec!["1 2 3 4 5".to_string()];
        let err = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(err, ParseError::TriggerNotFound { .. }));
    }

    #[test]
    fn test_header_without_counts() {
        let data = vec![
            "title".to_string(),
            "for each k-point, eigenvalues".to_string(),
        ];
        let err = extract_dmft_eigenvalues(LineWindow::new(&data)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader(_)));
    }
}
