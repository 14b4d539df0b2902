//! Token classifier
//!
//! Splits a trimmed output line on whitespace and classifies each token as an
//! integer, a float or a string. Two producer quirks are handled here:
//!
//! - placeholder values written as tiny expressions (`1/3`, `sqrt(2)/2`) or
//!   as bare builtin names (`max`, `min`);
//! - two scientific floats written without a separator (`1.52E-0210.000`).
//!
//! Classification never fails a line. Tokens that cannot be read as numbers
//! are kept as strings and reported through [`TokenDiagnostic`].

use crate::types::{Token, TokenDiagnostic, GLUED_FLOAT_SPLIT_OFFSET};
use tracing::{debug, warn};

/// Names accepted as placeholder symbols; kept as strings
const PLACEHOLDER_SYMBOLS: &[&str] = &[
    "abs", "all", "any", "len", "max", "min", "pow", "round", "sqrt", "sum",
];

/// Outcome of classifying one token
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    /// One token, or two floats for a recovered glued float
    pub tokens: Vec<Token>,
    pub diagnostic: Option<TokenDiagnostic>,
}

impl Classified {
    fn single(token: Token) -> Self {
        Self {
            tokens: vec![token],
            diagnostic: None,
        }
    }
}

/// A line partitioned by token kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecomposedLine {
    pub strings: Vec<String>,
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub diagnostics: Vec<TokenDiagnostic>,
}

impl DecomposedLine {
    /// Integers followed by floats, as `f64`
    pub fn numbers(&self) -> Vec<f64> {
        self.ints
            .iter()
            .map(|&i| i as f64)
            .chain(self.floats.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.ints.is_empty() && self.floats.is_empty()
    }
}

/// Classify a single non-empty token
pub fn classify_token(token: &str) -> Classified {
    if let Ok(i) = token.parse::<i64>() {
        return Classified::single(Token::Int(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Classified::single(Token::Float(f));
    }
    if PLACEHOLDER_SYMBOLS.contains(&token) {
        return Classified::single(Token::Str(token.to_string()));
    }
    if let Some(f) = evaluate_expression(token) {
        return Classified::single(Token::Float(f));
    }

    if is_glued_candidate(token) {
        if let Some((a, b)) = split_glued_floats(token) {
            return Classified {
                tokens: vec![Token::Float(a), Token::Float(b)],
                diagnostic: None,
            };
        }
        warn!(token, "could not be decomposed into 2 floats");
        return Classified {
            tokens: vec![Token::Str(token.to_string())],
            diagnostic: Some(TokenDiagnostic::GluedFloatRecoveryFailure {
                token: token.to_string(),
            }),
        };
    }

    let diagnostic = if looks_numeric(token) {
        debug!(token, "numeric-looking token kept as string");
        Some(TokenDiagnostic::TokenAmbiguity {
            token: token.to_string(),
        })
    } else {
        None
    };
    Classified {
        tokens: vec![Token::Str(token.to_string())],
        diagnostic,
    }
}

/// Classified tokens of `line` in their original order
pub fn tokenize(line: &str) -> Vec<Token> {
    line.split_whitespace()
        .flat_map(|t| classify_token(t).tokens)
        .collect()
}

/// Partition the tokens of `line` into strings, integers and floats
pub fn decompose_line(line: &str) -> DecomposedLine {
    let mut out = DecomposedLine::default();
    for raw in line.split_whitespace() {
        let classified = classify_token(raw);
        for token in classified.tokens {
            match token {
                Token::Str(s) => out.strings.push(s),
                Token::Int(i) => out.ints.push(i),
                Token::Float(f) => out.floats.push(f),
            }
        }
        out.diagnostics.extend(classified.diagnostic);
    }
    out
}

/// Floats of `line`, the common case for value runs
#[inline]
pub fn line_floats(line: &str) -> Vec<f64> {
    decompose_line(line).floats
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate `term (('/' | '*') term)*` with `term := [+-] (number | sqrt(number))`
fn evaluate_expression(token: &str) -> Option<f64> {
    if !token.contains(['/', '*']) && !token.contains("sqrt(") {
        return None;
    }

    let mut value = 1.0;
    let mut op = '*';
    let mut start = 0;
    let ends = token
        .char_indices()
        .filter(|(_, c)| *c == '/' || *c == '*')
        .chain(std::iter::once((token.len(), '*')));

    for (pos, next_op) in ends {
        let term = evaluate_term(&token[start..pos])?;
        value = match op {
            '/' if term == 0.0 => return None,
            '/' => value / term,
            _ => value * term,
        };
        op = next_op;
        start = pos + 1;
    }

    value.is_finite().then_some(value)
}

fn evaluate_term(term: &str) -> Option<f64> {
    let (sign, body) = match term.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, term.strip_prefix('+').unwrap_or(term)),
    };
    let value = match body.strip_prefix("sqrt(").and_then(|b| b.strip_suffix(')')) {
        Some(arg) => {
            let x = parse_finite(arg)?;
            if x < 0.0 {
                return None;
            }
            x.sqrt()
        }
        None => parse_finite(body)?,
    };
    Some(sign * value)
}

fn parse_finite(s: &str) -> Option<f64> {
    // f64::from_str also takes "inf" and "nan"; those are names, not literals
    if !s.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

// ============================================================================
// Glued floats
// ============================================================================

/// `E-` with a decimal point somewhere before it
fn is_glued_candidate(token: &str) -> bool {
    token
        .find("E-")
        .map(|pos| token[..pos].contains('.'))
        .unwrap_or(false)
}

/// Split two-digit-exponent glued floats, e.g. `1.52E-0210.000`.
///
/// Other exponent widths are not guessed: a split that leaves a malformed
/// exponent on either side is a failure.
fn split_glued_floats(token: &str) -> Option<(f64, f64)> {
    let e = token.find('E')?;
    let split = e + GLUED_FLOAT_SPLIT_OFFSET;
    if split >= token.len() || !token.is_char_boundary(split) {
        return None;
    }
    let (first, second) = token.split_at(split);

    if !is_two_digit_exponent(&first[e + 1..]) {
        return None;
    }
    if let Some(pos) = second.find(['E', 'e']) {
        if !is_two_digit_exponent(&second[pos + 1..]) {
            return None;
        }
    }

    let a = first.parse::<f64>().ok()?;
    let b = second.parse::<f64>().ok()?;
    Some((a, b))
}

fn is_two_digit_exponent(exp: &str) -> bool {
    match exp.strip_prefix(['+', '-']) {
        Some(digits) => digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn looks_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-' | '.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_mixed_line() {
        let line = decompose_line("kpt#   1, nband=  8, wtk=  1.00000");
        assert_eq!(line.strings, vec!["kpt#", "1,", "nband=", "8,", "wtk="]);
        assert!(line.ints.is_empty());
        assert_eq!(line.floats, vec![1.0]);

        let line = decompose_line("1   2   -0.25  3.5E-01");
        assert_eq!(line.ints, vec![1, 2]);
        assert_eq!(line.floats, vec![-0.25, 0.35]);
        assert!(line.strings.is_empty());
    }

    #[test]
    fn test_empty_tokens_dropped() {
        let line = decompose_line("  a    b  ");
        assert_eq!(line.strings, vec!["a", "b"]);
        assert!(decompose_line("").is_empty());
    }

    #[test]
    fn test_fraction_and_radical() {
        assert_eq!(tokenize("1/4"), vec![Token::Float(0.25)]);
        assert_eq!(tokenize("-1/2"), vec![Token::Float(-0.5)]);
        let t = tokenize("sqrt(3)/2");
        match t.as_slice() {
            [Token::Float(f)] => assert!((f - 3f64.sqrt() / 2.0).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tokenize("2*3"), vec![Token::Float(6.0)]);
    }

    #[test]
    fn test_bad_expressions_are_strings() {
        assert_eq!(tokenize("1/0"), vec![Token::Str("1/0".into())]);
        assert_eq!(tokenize("a/b"), vec![Token::Str("a/b".into())]);
        assert_eq!(tokenize("2**3"), vec![Token::Str("2**3".into())]);
        assert_eq!(tokenize("sqrt(-1)"), vec![Token::Str("sqrt(-1)".into())]);
    }

    #[test]
    fn test_placeholder_symbols() {
        assert_eq!(tokenize("max"), vec![Token::Str("max".into())]);
        let line = decompose_line("min 3");
        assert_eq!(line.strings, vec!["min"]);
        assert_eq!(line.ints, vec![3]);
        assert!(line.diagnostics.is_empty());
    }

    #[test]
    fn test_glued_float_recovery() {
        let line = decompose_line("1.52E-0210.000");
        assert_eq!(line.floats, vec![0.0152, 10.0]);
        assert!(line.diagnostics.is_empty());

        let line = decompose_line("-4.1234E-01-3.2100E-02");
        assert_eq!(line.floats, vec![-0.41234, -0.0321]);
    }

    #[test]
    fn test_glued_float_failure_demotes_to_string() {
        let line = decompose_line("1.5E-2x.y 4");
        assert_eq!(line.strings, vec!["1.5E-2x.y"]);
        assert_eq!(line.ints, vec![4]);
        assert_eq!(
            line.diagnostics,
            vec![TokenDiagnostic::GluedFloatRecoveryFailure {
                token: "1.5E-2x.y".into()
            }]
        );
    }

    #[test]
    fn test_glued_float_three_digit_second_exponent_fails() {
        let line = decompose_line("1.0E-011.0E-100");
        assert!(line.floats.is_empty());
        assert_eq!(line.strings.len(), 1);
    }

    #[test]
    fn test_separated_floats_not_glued() {
        let line = decompose_line("1.52E-02 10.000");
        assert_eq!(line.floats, vec![0.0152, 10.0]);
        assert!(line.diagnostics.is_empty());
    }

    #[test]
    fn test_ambiguous_numeric_token() {
        let line = decompose_line("1.2.3");
        assert_eq!(line.strings, vec!["1.2.3"]);
        assert_eq!(
            line.diagnostics,
            vec![TokenDiagnostic::TokenAmbiguity {
                token: "1.2.3".into()
            }]
        );
        assert!(decompose_line("hartree").diagnostics.is_empty());
    }

    #[test]
    fn test_tokenize_preserves_order() {
        assert_eq!(
            tokenize("1 a 2.5"),
            vec![Token::Int(1), Token::Str("a".into()), Token::Float(2.5)]
        );
    }
}
