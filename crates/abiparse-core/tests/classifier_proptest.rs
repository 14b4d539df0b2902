//! Property-based tests for the token classifier
//!
//! - Every whitespace-separated token lands in exactly one of the string,
//!   integer and float lists, in order
//! - Floats separated by whitespace are never split
//! - Two-digit-exponent floats printed without a separator are recovered

use abiparse_core::{classify_token, decompose_line, Token};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Field {
    Word(String),
    Int(i64),
    Float(String),
}

impl Field {
    fn text(&self) -> String {
        match self {
            Field::Word(w) => w.clone(),
            Field::Int(i) => i.to_string(),
            Field::Float(f) => f.clone(),
        }
    }
}

/// Labels as printed in output files; `inf` and `nan` read as floats
fn word_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z][a-z_]{0,8}", "[a-z]{1,6}[#=:,]", "\\([a-z]{2,8}\\)",]
        .prop_filter("float keyword", |w| w.parse::<f64>().is_err())
}

/// Floats in the fixed and scientific forms the code prints
fn float_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (-1000.0f64..1000.0).prop_map(|f| format!("{:.5}", f)),
        (1.0f64..10.0, -99i32..=99, any::<bool>()).prop_map(|(m, e, neg)| {
            let sign = if neg { "-" } else { "" };
            let esign = if e < 0 { '-' } else { '+' };
            format!("{}{:.4}E{}{:02}", sign, m, esign, e.abs())
        }),
    ]
}

fn field_strategy() -> impl Strategy<Value = Field> {
    prop_oneof![
        word_strategy().prop_map(Field::Word),
        any::<i32>().prop_map(|i| Field::Int(i as i64)),
        float_text_strategy().prop_map(Field::Float),
    ]
}

fn separator_strategy() -> impl Strategy<Value = String> {
    "[ \t]{1,4}"
}

proptest! {
    #[test]
    fn tokens_are_conserved(
        fields in prop::collection::vec(field_strategy(), 0..12),
        sep in separator_strategy(),
    ) {
        let line = fields.iter().map(Field::text).collect::<Vec<_>>().join(&sep);
        let d = decompose_line(&line);

        let words: Vec<String> = fields.iter().filter_map(|f| match f {
            Field::Word(w) => Some(w.clone()),
            _ => None,
        }).collect();
        let ints: Vec<i64> = fields.iter().filter_map(|f| match f {
            Field::Int(i) => Some(*i),
            _ => None,
        }).collect();
        let floats: Vec<f64> = fields.iter().filter_map(|f| match f {
            Field::Float(t) => t.parse().ok(),
            _ => None,
        }).collect();

        prop_assert_eq!(d.strings, words);
        prop_assert_eq!(d.ints, ints);
        prop_assert_eq!(d.floats, floats);
    }

    #[test]
    fn separated_floats_are_not_split(
        texts in prop::collection::vec(float_text_strategy(), 1..10),
    ) {
        let line = texts.join(" ");
        let d = decompose_line(&line);
        prop_assert_eq!(d.floats.len(), texts.len());
        prop_assert!(d.diagnostics.is_empty());
    }

    #[test]
    fn glued_floats_are_recovered(
        mantissa in 1.0f64..10.0,
        exponent in 1u32..=99,
        second in -99.0f64..100.0,
    ) {
        let first = format!("{:.4}E-{:02}", mantissa, exponent);
        let second = format!("{:.3}", second);
        let glued = format!("{}{}", first, second);

        let classified = classify_token(&glued);
        prop_assert!(classified.diagnostic.is_none(), "{}", glued);
        prop_assert_eq!(
            classified.tokens,
            vec![
                Token::Float(first.parse().unwrap()),
                Token::Float(second.parse().unwrap()),
            ]
        );
    }
}
