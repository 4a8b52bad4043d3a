//! Canonicalises raw extracted values into typed, validated representations.
//!
//! Dates resolve relative forms ("last monday", "three days ago") against the
//! reference date supplied at session start, and always come out as
//! `YYYY-MM-DD`.

use std::sync::OnceLock;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;

use crate::entity::{Entity, NormalizedEntity, Validation, ValueType};
use crate::error::ValueError;
use crate::spoken::{ordinal_day, spoken_year, tokens, words_to_number};
use crate::validate;

#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    reference: NaiveDate,
}

impl Normalizer {
    pub fn new(reference: NaiveDate) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// Normalize one entity. Failures are retained on the result, never dropped.
    ///
    /// The extractor's own canonical form is preferred as input when present.
    pub fn normalize(&self, entity: &Entity) -> NormalizedEntity {
        let input = entity.normalized.as_deref().unwrap_or(&entity.raw_text);
        let (value, validation) = if entity.kind == ValueType::Unknown {
            (validate::collapse_whitespace(input), Validation::Unchecked)
        } else {
            match self.normalize_value(entity.kind, input) {
                Ok(v) => (v, Validation::Valid),
                Err(e) => (validate::collapse_whitespace(input), Validation::Invalid(e)),
            }
        };
        NormalizedEntity {
            entity: entity.clone(),
            value,
            validation,
        }
    }

    pub fn normalize_all(&self, entities: &[Entity]) -> Vec<NormalizedEntity> {
        entities.iter().map(|e| self.normalize(e)).collect()
    }

    /// Canonical form of `text` read as `kind`.
    pub fn normalize_value(&self, kind: ValueType, text: &str) -> Result<String, ValueError> {
        match kind {
            ValueType::Date => self.date(text).map(|d| d.format("%Y-%m-%d").to_string()),
            ValueType::Phone => validate::phone(text),
            ValueType::Email => validate::email(text),
            ValueType::Age => validate::age(text),
            ValueType::Pincode => validate::pincode(text),
            ValueType::Aadhaar => validate::aadhaar(text),
            ValueType::Number => validate::number(text),
            ValueType::Name => validate::name(text),
            ValueType::Address | ValueType::PermanentAddress | ValueType::CurrentAddress | ValueType::Text => {
                validate::non_empty(kind, text)
            }
            ValueType::Unknown => Err(ValueError::format(kind, "untyped value")),
        }
    }

    pub fn date(&self, text: &str) -> Result<NaiveDate, ValueError> {
        let t = validate::collapse_whitespace(&text.to_lowercase());
        if t.is_empty() {
            return Err(ValueError::format(ValueType::Date, "empty"));
        }
        if let Some(d) = self.relative_date(&t) {
            return Ok(d);
        }
        if let Some((y, m, d)) = numeric_date(&t) {
            return ymd(y, m, d);
        }
        if let Some((y, m, d)) = worded_date(&t) {
            return ymd(y, m, d);
        }
        Err(ValueError::format(ValueType::Date, format!("no supported pattern matches {text:?}")))
    }

    fn relative_date(&self, t: &str) -> Option<NaiveDate> {
        let r = self.reference;
        match t {
            "today" => return Some(r),
            "yesterday" => return r.checked_sub_days(Days::new(1)),
            "tomorrow" => return r.checked_add_days(Days::new(1)),
            "day before yesterday" | "the day before yesterday" => return r.checked_sub_days(Days::new(2)),
            "day after tomorrow" | "the day after tomorrow" => return r.checked_add_days(Days::new(2)),
            _ => {}
        }

        let words: Vec<&str> = t.split(' ').collect();
        match words.as_slice() {
            [dir @ ("last" | "next"), day] => {
                let target = weekday(day)?;
                let from = r.weekday().num_days_from_monday() as i64;
                let to = target.num_days_from_monday() as i64;
                if *dir == "last" {
                    let back = match (from - to).rem_euclid(7) {
                        0 => 7,
                        n => n,
                    };
                    r.checked_sub_days(Days::new(back as u64))
                } else {
                    let fwd = match (to - from).rem_euclid(7) {
                        0 => 7,
                        n => n,
                    };
                    r.checked_add_days(Days::new(fwd as u64))
                }
            }
            [count @ .., unit, "ago"] if !count.is_empty() => {
                let n = words_to_number(count)? as u64;
                let days = match *unit {
                    "day" | "days" => n,
                    "week" | "weeks" => n * 7,
                    _ => return None,
                };
                r.checked_sub_days(Days::new(days))
            }
            _ => None,
        }
    }
}

fn ymd(y: i32, m: u32, d: u32) -> Result<NaiveDate, ValueError> {
    NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| ValueError::format(ValueType::Date, format!("{y:04}-{m:02}-{d:02} is not a calendar date")))
}

fn weekday(w: &str) -> Option<Weekday> {
    Some(match w {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    })
}

fn month(w: &str) -> Option<u32> {
    Some(match w {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    })
}

fn numeric_date(t: &str) -> Option<(i32, u32, u32)> {
    static YMD: OnceLock<Regex> = OnceLock::new();
    static DMY: OnceLock<Regex> = OnceLock::new();
    let ymd_re = YMD.get_or_init(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("ymd pattern compiles"));
    let dmy_re = DMY.get_or_init(|| Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})$").expect("dmy pattern compiles"));

    if let Some(c) = ymd_re.captures(t) {
        return Some((c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?));
    }
    // Day first, as written on Indian forms.
    if let Some(c) = dmy_re.captures(t) {
        return Some((c[3].parse().ok()?, c[2].parse().ok()?, c[1].parse().ok()?));
    }
    None
}

fn day_of(words: &[&str]) -> Option<u32> {
    ordinal_day(words)
        .or_else(|| words_to_number(words))
        .filter(|d| (1..=31).contains(d))
}

/// "12 march 1990", "12th of march, 1990", "march 12 1990",
/// "twelfth march nineteen ninety".
fn worded_date(t: &str) -> Option<(i32, u32, u32)> {
    let toks = tokens(t);
    let words: Vec<&str> = toks
        .iter()
        .map(String::as_str)
        .filter(|w| !matches!(*w, "the" | "of" | "on" | "born"))
        .collect();
    let m_idx = words.iter().position(|w| month(w).is_some())?;
    let m = month(words[m_idx])?;

    if m_idx > 0 {
        let d = day_of(&words[..m_idx])?;
        let y = spoken_year(&words[m_idx + 1..])?;
        return Some((y, m, d));
    }

    let rest = &words[1..];
    for k in 1..=2.min(rest.len()) {
        if let (Some(d), Some(y)) = (day_of(&rest[..k]), spoken_year(&rest[k..])) {
            return Some((y, m, d));
        }
    }
    None
}
