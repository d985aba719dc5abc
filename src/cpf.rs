//! CPF (Cadastro de Pessoas Físicas) identifiers.
//!
//! Two entry points exist on purpose and must not be merged:
//!
//! - [`is_valid`] / [`Cpf::parse`] run the full two check-digit algorithm and
//!   are used when a person registers an entry.
//! - [`has_lookup_length`] / [`Cpf::from_lookup_input`] only require 11 digits
//!   after normalization and are used to build batch lookups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digits in a normalized CPF.
pub const CPF_LEN: usize = 11;

/// Strips every character that is not an ASCII digit.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when `raw` has exactly 11 digits once normalized.
///
/// This is the batch filter; it does not look at check digits.
pub fn has_lookup_length(raw: &str) -> bool {
    raw.chars().filter(|c| c.is_ascii_digit()).count() == CPF_LEN
}

/// Validates a CPF against its two check digits.
///
/// Total over any input: punctuation is ignored, anything that does not
/// normalize to 11 digits is rejected, and sequences of a single repeated
/// digit (which satisfy the arithmetic) are rejected too.
pub fn is_valid(raw: &str) -> bool {
    let digits: Vec<u32> = raw
        .chars()
        .filter(|c| c.is_ascii_digit())
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != CPF_LEN || digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9], 10) == digits[9] && check_digit(&digits[..10], 11) == digits[10]
}

/// Weighted modulo-11 check digit; weights run down from `first_weight`.
fn check_digit(digits: &[u32], first_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (first_weight - i as u32))
        .sum();

    let digit = 11 - (sum % 11);
    if digit >= 10 {
        0
    } else {
        digit
    }
}

/// A normalized, 11-digit CPF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cpf(String);

impl Cpf {
    /// Builds a CPF from free-form input when it has 11 digits, ignoring check digits.
    pub fn from_lookup_input(raw: &str) -> Option<Self> {
        let digits = normalize(raw);
        (digits.len() == CPF_LEN).then_some(Self(digits))
    }

    /// Builds a CPF only when the full check-digit validation passes.
    pub fn parse(raw: &str) -> Option<Self> {
        if is_valid(raw) {
            Some(Self(normalize(raw)))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cpf {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Splits pasted text into lookup-ready CPFs, one candidate per line.
///
/// Lines that do not normalize to 11 digits are dropped silently, matching the
/// batch filter. Order is preserved and duplicates are kept.
pub fn parse_lookup_list(text: &str) -> Vec<Cpf> {
    text.lines()
        .filter_map(|line| Cpf::from_lookup_input(line.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_valid_cpf() {
        assert!(is_valid("11144477735"));
        assert!(is_valid("111.444.777-35"));
        assert!(is_valid("529.982.247-25"));
    }

    #[test]
    fn test_corrupted_check_digits() {
        assert!(!is_valid("11144477736"));
        assert!(!is_valid("11144477725"));
        assert!(!is_valid("52998224735"));
    }

    #[test]
    fn test_repeated_digits_rejected() {
        for d in 0..=9 {
            let cpf = d.to_string().repeat(11);
            assert!(!is_valid(&cpf), "repeated {} should be rejected", cpf);
        }
    }

    #[test]
    fn test_wrong_lengths() {
        assert!(!is_valid(""));
        assert!(!is_valid("1114447773"));
        assert!(!is_valid("111444777350"));
        assert!(!is_valid("abc"));
    }

    #[test]
    fn test_non_ascii_digits_are_noise() {
        // Arabic-Indic digits are not CPF digits
        assert!(!is_valid("١١١٤٤٤٧٧٧٣٥"));
        assert!(!has_lookup_length("١١١٤٤٤٧٧٧٣٥"));
    }

    #[test]
    fn test_lookup_length_ignores_check_digits() {
        assert!(has_lookup_length("12345678910"));
        assert!(!is_valid("12345678910"));
        assert!(Cpf::from_lookup_input("123.456.789-10").is_some());
        assert!(Cpf::parse("123.456.789-10").is_none());
    }

    #[test]
    fn test_parse_lookup_list() {
        let text = "111.444.777-35\n  \n123\n98765432100\r\n  529 982 247 25 ";
        let cpfs: Vec<String> = parse_lookup_list(text)
            .into_iter()
            .map(Cpf::into_string)
            .collect();
        assert_eq!(cpfs, vec!["11144477735", "98765432100", "52998224725"]);
    }
}
