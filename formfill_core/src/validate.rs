//! Per-type validators. Each returns the canonical form of a valid value.

use std::sync::OnceLock;

use regex::Regex;

use crate::entity::ValueType;
use crate::error::ValueError;
use crate::spoken::{spoken_digits, tokens, words_to_number};

pub const AGE_MIN: i64 = 0;
pub const AGE_MAX: i64 = 130;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9_%+-]+(\.[a-z0-9_%+-]+)*@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$")
            .expect("email pattern compiles")
    })
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ten digits after separators and a recognised country prefix are stripped.
pub fn phone(text: &str) -> Result<String, ValueError> {
    let raw = spoken_digits(text);
    let digits = raw
        .strip_prefix("+91")
        .or_else(|| raw.strip_prefix("0091"))
        .unwrap_or(&raw);
    if digits.contains('+') {
        return Err(ValueError::format(ValueType::Phone, "unrecognised country prefix"));
    }
    let digits = match digits.len() {
        12 if digits.starts_with("91") => &digits[2..],
        11 if digits.starts_with('0') => &digits[1..],
        _ => digits,
    };
    if digits.len() != 10 {
        return Err(ValueError::format(
            ValueType::Phone,
            format!("expected 10 digits, found {}", digits.len()),
        ));
    }
    Ok(digits.to_string())
}

/// Conservative user@domain.tld, accepting spoken "at" / "dot".
pub fn email(text: &str) -> Result<String, ValueError> {
    let spoken = format!(" {} ", text.trim().to_lowercase());
    let joined: String = spoken
        .replace(" at the rate ", "@")
        .replace(" at ", "@")
        .replace(" dot ", ".")
        .replace(" underscore ", "_")
        .split_whitespace()
        .collect();
    if email_re().is_match(&joined) {
        Ok(joined)
    } else {
        Err(ValueError::format(ValueType::Email, "not a user@domain.tld address"))
    }
}

/// Whole years in [0, 130].
pub fn age(text: &str) -> Result<String, ValueError> {
    let trimmed = text.trim();
    let n: i64 = match trimmed.parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            let toks = tokens(trimmed);
            let words: Vec<&str> = toks
                .iter()
                .map(String::as_str)
                .filter(|w| !matches!(*w, "years" | "year" | "yrs" | "yr" | "old" | "aged" | "i" | "am"))
                .collect();
            words_to_number(&words)
                .map(i64::from)
                .ok_or_else(|| ValueError::format(ValueType::Age, "not a whole number of years"))?
        }
    };
    if !(AGE_MIN..=AGE_MAX).contains(&n) {
        return Err(ValueError::Range {
            kind: ValueType::Age,
            value: n,
            min: AGE_MIN,
            max: AGE_MAX,
        });
    }
    Ok(n.to_string())
}

fn fixed_digits(kind: ValueType, text: &str, len: usize) -> Result<String, ValueError> {
    let digits = spoken_digits(text);
    if digits.len() != len || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValueError::format(kind, format!("expected {len} digits")));
    }
    Ok(digits)
}

/// Six digits, first digit 1-9.
pub fn pincode(text: &str) -> Result<String, ValueError> {
    let digits = fixed_digits(ValueType::Pincode, text, 6)?;
    if digits.starts_with('0') {
        return Err(ValueError::format(ValueType::Pincode, "postal region 0 does not exist"));
    }
    Ok(digits)
}

/// Twelve digits, first digit 2-9, Verhoeff check digit.
pub fn aadhaar(text: &str) -> Result<String, ValueError> {
    let digits = fixed_digits(ValueType::Aadhaar, text, 12)?;
    if digits.starts_with('0') || digits.starts_with('1') {
        return Err(ValueError::format(ValueType::Aadhaar, "cannot start with 0 or 1"));
    }
    if !verhoeff_valid(&digits) {
        return Err(ValueError::format(ValueType::Aadhaar, "checksum mismatch"));
    }
    Ok(digits)
}

pub fn number(text: &str) -> Result<String, ValueError> {
    let toks = tokens(text);
    let words: Vec<&str> = toks.iter().map(String::as_str).collect();
    if let Some(n) = words_to_number(&words) {
        return Ok(n.to_string());
    }
    let digits = spoken_digits(text);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(digits)
    } else {
        Err(ValueError::format(ValueType::Number, "no digits found"))
    }
}

/// Title-cased, single-spaced, no digits.
pub fn name(text: &str) -> Result<String, ValueError> {
    let collapsed = collapse_whitespace(text);
    if collapsed.is_empty() {
        return Err(ValueError::format(ValueType::Name, "empty"));
    }
    if collapsed.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValueError::format(ValueType::Name, "contains digits"));
    }
    let titled = collapsed
        .split(' ')
        .map(|w| -> String {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().chain(cs.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    Ok(titled)
}

pub fn non_empty(kind: ValueType, text: &str) -> Result<String, ValueError> {
    let collapsed = collapse_whitespace(text);
    if collapsed.is_empty() {
        Err(ValueError::format(kind, "empty"))
    } else {
        Ok(collapsed)
    }
}

// ---------------------------------------------------------------------
// Verhoeff checksum
// ---------------------------------------------------------------------

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

pub fn verhoeff_valid(digits: &str) -> bool {
    let mut c = 0u8;
    for (i, ch) in digits.bytes().rev().enumerate() {
        if !ch.is_ascii_digit() {
            return false;
        }
        let d = (ch - b'0') as usize;
        c = VERHOEFF_D[c as usize][VERHOEFF_P[i % 8][d] as usize];
    }
    c == 0
}
