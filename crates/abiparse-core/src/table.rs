//! Plain numeric column files
//!
//! Self-energies, spectral functions and DOS files are whitespace separated
//! columns with optional `#` comment lines.

use crate::tokens::tokenize;
use crate::types::*;
use crate::window::{LineWindow, Parsed};
use tracing::{debug, info, instrument, trace};

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Parse every non-comment line as a row of numbers
#[instrument(skip_all, fields(lines = window.len()))]
pub fn parse_column_table(window: LineWindow<'_>) -> Result<Parsed<ColumnTable>> {
    let mut table = ColumnTable::default();

    for (i, line) in window.iter().enumerate() {
        if is_comment(line) {
            continue;
        }
        let row = tokenize(line)
            .into_iter()
            .map(|t| match t {
                Token::Int(v) => Ok(v as f64),
                Token::Float(v) => Ok(v),
                Token::Str(s) => Err(ParseError::InvalidNumber { token: s }),
            })
            .collect::<Result<Vec<f64>>>()
            .map_err(|e| ParseError::malformed(line, e.to_string()))?;

        if let Some(first) = table.rows.first() {
            if row.len() != first.len() {
                return Err(ParseError::mismatch(
                    format!("columns at line {}", window.offset() + i + 1),
                    first.len(),
                    row.len(),
                ));
            }
        }
        trace!(columns = row.len(), "row parsed");
        table.rows.push(row);
    }

    debug!(
        rows = table.len(),
        columns = table.column_count(),
        "column table parsed"
    );
    Ok(Parsed::new(table, window.len()))
}

/// Parse a DOS file: the data table and its column title line.
///
/// The title line is the nearest comment line above the first data line
/// that mentions `energy`; its leading `#` is removed.
pub fn parse_dos(window: LineWindow<'_>) -> Result<Parsed<DosTable>> {
    let data_start = window
        .position(|l| !is_comment(l))
        .ok_or_else(|| ParseError::trigger_not_found("energy"))?;
    let titles = window
        .take(data_start)
        .iter()
        .rev()
        .find(|l| l.contains("energy"))
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .ok_or_else(|| ParseError::trigger_not_found("energy"))?;

    let table = parse_column_table(window)?;
    info!(rows = table.value.len(), titles = %titles, "DOS parsed");
    Ok(table.map(|table| DosTable { titles, table }))
}

// ============================================================================
// Self-energy
// ============================================================================

/// How the low-frequency slope of `Im Σ(iω)` is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeEstimate {
    /// `Im Σ(iω₀) / ω₀` on the first frequency
    FiniteDifference,
    /// Linear coefficient of a least-squares polynomial over the first
    /// `frequencies` points
    Polynomial { degree: usize, frequencies: usize },
}

impl Default for SlopeEstimate {
    fn default() -> Self {
        SlopeEstimate::Polynomial {
            degree: 4,
            frequencies: 6,
        }
    }
}

impl SelfEnergy {
    /// Columns 0, 1 and 2 are frequency, real and imaginary part. The
    /// double-counting term is subtracted from the real part.
    pub fn from_table(table: &ColumnTable, double_counting: f64) -> Result<Self> {
        if table.column_count() < 3 {
            return Err(ParseError::mismatch(
                "self-energy columns",
                3,
                table.column_count(),
            ));
        }
        Ok(Self {
            frequencies: table.rows.iter().map(|r| r[0]).collect(),
            real: table.rows.iter().map(|r| r[1] - double_counting).collect(),
            imaginary: table.rows.iter().map(|r| r[2]).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Element-wise mean of self-energies sampled on the same frequencies
    pub fn mean(sources: &[SelfEnergy]) -> Result<Self> {
        let first = sources
            .first()
            .ok_or_else(|| ParseError::mismatch("self-energies to average", 1, 0))?;
        if sources[1..].iter().any(|s| s.frequencies != first.frequencies) {
            return Err(ParseError::GridMismatch);
        }

        let n = sources.len() as f64;
        let mut real = vec![0.0; first.len()];
        let mut imaginary = vec![0.0; first.len()];
        for s in sources {
            for (acc, v) in real.iter_mut().zip(&s.real) {
                *acc += v;
            }
            for (acc, v) in imaginary.iter_mut().zip(&s.imaginary) {
                *acc += v;
            }
        }
        real.iter_mut().chain(imaginary.iter_mut()).for_each(|v| *v /= n);

        debug!(sources = sources.len(), points = first.len(), "self-energy mean");
        Ok(Self {
            frequencies: first.frequencies.clone(),
            real,
            imaginary,
        })
    }

    /// Mass renormalization `1 - dIm Σ/dω` at zero frequency
    pub fn mass_renormalization(&self, estimate: SlopeEstimate) -> Result<f64> {
        let slope = match estimate {
            SlopeEstimate::FiniteDifference => {
                let (w, s) = self
                    .frequencies
                    .first()
                    .zip(self.imaginary.first())
                    .ok_or_else(|| ParseError::mismatch("self-energy points", 1, 0))?;
                if *w == 0.0 {
                    return Err(ParseError::DegenerateFit("first frequency is zero".into()));
                }
                s / w
            }
            SlopeEstimate::Polynomial {
                degree,
                frequencies,
            } => {
                let n = frequencies.min(self.len());
                if n < degree + 1 {
                    return Err(ParseError::mismatch(
                        "frequencies for polynomial fit",
                        degree + 1,
                        n,
                    ));
                }
                let coeffs =
                    polyfit(&self.frequencies[..n], &self.imaginary[..n], degree)?;
                coeffs.get(1).copied().unwrap_or(0.0)
            }
        };
        Ok(1.0 - slope)
    }
}

/// Least-squares polynomial coefficients, lowest power first
fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    let m = degree + 1;
    // normal equations: (VᵀV) c = Vᵀy
    let mut a = vec![vec![0.0; m + 1]; m];
    for (xi, yi) in x.iter().zip(y) {
        let powers: Vec<f64> = (0..m).map(|p| xi.powi(p as i32)).collect();
        for r in 0..m {
            for c in 0..m {
                a[r][c] += powers[r] * powers[c];
            }
            a[r][m] += powers[r] * yi;
        }
    }

    for col in 0..m {
        let pivot = (col..m)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col] == 0.0 {
            return Err(ParseError::DegenerateFit(format!(
                "singular system for degree {}",
                degree
            )));
        }
        a.swap(col, pivot);
        let pivot_row = a[col].clone();
        for (r, row) in a.iter_mut().enumerate() {
            if r != col {
                let factor = row[col] / pivot_row[col];
                for c in col..=m {
                    row[c] -= factor * pivot_row[c];
                }
            }
        }
    }
    let coeffs: Vec<f64> = (0..m).map(|i| a[i][m] / a[i][i]).collect();
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(ParseError::DegenerateFit(format!(
            "non-finite coefficients for degree {}",
            degree
        )));
    }
    Ok(coeffs)
}

// ============================================================================
// Tests
// ============================================================================
