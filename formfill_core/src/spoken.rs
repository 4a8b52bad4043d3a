//! Spoken-form helpers: digit words, number words, ordinals and years as
//! they come out of a transcript.

fn digit_word(w: &str) -> Option<char> {
    Some(match w {
        "zero" | "oh" | "o" | "nil" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    })
}

fn small_number(w: &str) -> Option<u32> {
    Some(match w {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    })
}

fn ordinal_word(w: &str) -> Option<u32> {
    Some(match w {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        "fifth" => 5,
        "sixth" => 6,
        "seventh" => 7,
        "eighth" => 8,
        "ninth" => 9,
        "tenth" => 10,
        "eleventh" => 11,
        "twelfth" => 12,
        "thirteenth" => 13,
        "fourteenth" => 14,
        "fifteenth" => 15,
        "sixteenth" => 16,
        "seventeenth" => 17,
        "eighteenth" => 18,
        "nineteenth" => 19,
        "twentieth" => 20,
        "thirtieth" => 30,
        _ => return None,
    })
}

/// Lowercased tokens split on whitespace and common separators.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | ',' | '(' | ')' | '/' | '.'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collapse a spoken or mixed digit sequence into its digits.
///
/// "nine eight double seven" -> "9877", "plus nine one 98765" -> "+9198765".
/// Words that are not digits are skipped.
pub fn spoken_digits(text: &str) -> String {
    let mut out = String::new();
    let mut repeat = 1usize;
    for tok in tokens(text) {
        match tok.as_str() {
            "double" => {
                repeat = 2;
                continue;
            }
            "triple" => {
                repeat = 3;
                continue;
            }
            "plus" => out.push('+'),
            t => {
                if let Some(d) = digit_word(t) {
                    for _ in 0..repeat {
                        out.push(d);
                    }
                } else if t.chars().all(|c| c.is_ascii_digit() || c == '+') {
                    // "double 5" repeats only the first digit of the group
                    let mut chars = t.chars();
                    if let Some(first) = chars.next() {
                        for _ in 0..repeat {
                            out.push(first);
                        }
                        out.extend(chars);
                    }
                }
            }
        }
        repeat = 1;
    }
    out
}

/// Parse "thirty two", "one hundred and five", "2005" or "two thousand five".
pub fn words_to_number(words: &[&str]) -> Option<u32> {
    let words: Vec<&str> = words.iter().copied().filter(|w| *w != "and").collect();
    if words.is_empty() {
        return None;
    }
    if words.len() == 1 && words[0].chars().all(|c| c.is_ascii_digit()) {
        return words[0].parse().ok();
    }

    let mut total = 0u32;
    let mut current = 0u32;
    for w in words {
        match w {
            "hundred" => current = current.max(1).checked_mul(100)?,
            "thousand" => {
                total = total.checked_add(current.max(1).checked_mul(1000)?)?;
                current = 0;
            }
            _ => current = current.checked_add(small_number(w)?)?,
        }
    }
    total.checked_add(current)
}

/// Parse a day ordinal: "12th", "12", "twelfth", "twenty first".
pub fn ordinal_day(words: &[&str]) -> Option<u32> {
    match words {
        [w] => {
            let digits = w.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return digits.parse().ok();
            }
            ordinal_word(w)
        }
        [tens, unit] => {
            let tens = match *tens {
                "twenty" => 20,
                "thirty" => 30,
                _ => return None,
            };
            let unit = ordinal_word(unit).filter(|u| *u < 10)?;
            Some(tens + unit)
        }
        _ => None,
    }
}

/// Parse a year: "1990", "nineteen ninety", "nineteen oh five",
/// "two thousand five", "twenty twenty one".
pub fn spoken_year(words: &[&str]) -> Option<i32> {
    if let Some(n) = words_to_number(words) {
        if n >= 1000 {
            return i32::try_from(n).ok();
        }
    }
    let (first, rest) = words.split_first()?;
    let century = words_to_number(&[*first]).filter(|c| (10..=99).contains(c))?;
    let tail = match rest {
        [] => return None,
        [oh, unit] if *oh == "oh" || *oh == "o" => words_to_number(&[*unit]).filter(|u| *u < 10)?,
        _ => words_to_number(rest).filter(|u| *u < 100)?,
    };
    i32::try_from(century * 100 + tail).ok()
}
