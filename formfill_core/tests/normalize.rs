use chrono::NaiveDate;
use formfill_core::spoken::{spoken_digits, spoken_year, words_to_number};
use formfill_core::validate;
use formfill_core::*;

// A Tuesday.
fn normalizer() -> Normalizer {
    Normalizer::new(NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date"))
}

fn date(text: &str) -> String {
    normalizer()
        .normalize_value(ValueType::Date, text)
        .unwrap_or_else(|e| panic!("{text:?}: {e}"))
}

#[test]
fn absolute_dates() {
    assert_eq!(date("12/03/1990"), "1990-03-12");
    assert_eq!(date("12-03-1990"), "1990-03-12");
    assert_eq!(date("1990-03-12"), "1990-03-12");
    assert_eq!(date("12 March 1990"), "1990-03-12");
    assert_eq!(date("March 12, 1990"), "1990-03-12");
    assert_eq!(date("12th of March 1990"), "1990-03-12");
    assert_eq!(date("twelfth of march nineteen ninety"), "1990-03-12");
    assert_eq!(date("1st January two thousand five"), "2005-01-01");
}

#[test]
fn relative_dates_use_reference() {
    assert_eq!(date("today"), "2026-03-10");
    assert_eq!(date("Yesterday"), "2026-03-09");
    assert_eq!(date("day before yesterday"), "2026-03-08");
    assert_eq!(date("tomorrow"), "2026-03-11");
    assert_eq!(date("last monday"), "2026-03-09");
    assert_eq!(date("last tuesday"), "2026-03-03");
    assert_eq!(date("next friday"), "2026-03-13");
    assert_eq!(date("three days ago"), "2026-03-07");
    assert_eq!(date("2 weeks ago"), "2026-02-24");
}

#[test]
fn impossible_dates_are_format_errors() {
    let n = normalizer();
    assert!(matches!(n.date("31/02/2020"), Err(ValueError::Format { kind: ValueType::Date, .. })));
    assert!(n.date("next full moon").is_err());
    assert!(n.date("").is_err());
}

#[test]
fn phone_forms() {
    assert_eq!(validate::phone("+91 98765 43210").unwrap(), "9876543210");
    assert_eq!(validate::phone("09876543210").unwrap(), "9876543210");
    assert_eq!(validate::phone("double nine eight seven six five four three two one").unwrap(), "9987654321");
    assert_eq!(
        validate::phone("nine eight seven six five four three two one zero").unwrap(),
        "9876543210"
    );
    assert!(validate::phone("12345").is_err());
    assert!(validate::phone("+44 20 7946 0958").is_err());
}

#[test]
fn email_forms() {
    assert_eq!(validate::email("ravi dot kumar at gmail dot com").unwrap(), "ravi.kumar@gmail.com");
    assert_eq!(validate::email("Ravi.Kumar@Example.co.in").unwrap(), "ravi.kumar@example.co.in");
    assert!(validate::email("ravi at gmail").is_err());
    assert!(validate::email("@gmail.com").is_err());
}

#[test]
fn age_bounds() {
    assert_eq!(validate::age("32").unwrap(), "32");
    assert_eq!(validate::age("thirty two years old").unwrap(), "32");
    assert_eq!(
        validate::age("150"),
        Err(ValueError::Range {
            kind: ValueType::Age,
            value: 150,
            min: validate::AGE_MIN,
            max: validate::AGE_MAX,
        })
    );
    assert!(validate::age("old enough").is_err());
}

#[test]
fn pincode_and_aadhaar() {
    assert_eq!(validate::pincode("560038").unwrap(), "560038");
    assert_eq!(validate::pincode("five six zero zero three eight").unwrap(), "560038");
    assert!(validate::pincode("060038").is_err());
    assert!(validate::pincode("56003").is_err());

    assert_eq!(validate::aadhaar("2345 6789 0124").unwrap(), "234567890124");
    assert!(validate::verhoeff_valid("234567890124"));
    assert!(!validate::verhoeff_valid("234567890123"));
    assert!(validate::aadhaar("234567890123").is_err());
    assert!(validate::aadhaar("123456789012").is_err());
}

#[test]
fn names_and_text() {
    assert_eq!(validate::name("  ravi   KUMAR ").unwrap(), "Ravi Kumar");
    assert!(validate::name("r2d2").is_err());
    assert!(validate::name("   ").is_err());
    assert_eq!(
        validate::non_empty(ValueType::Address, " 12  MG Road ").unwrap(),
        "12 MG Road"
    );
}

#[test]
fn spoken_helpers() {
    assert_eq!(spoken_digits("nine eight double seven"), "9877");
    assert_eq!(spoken_digits("triple five oh"), "5550");
    assert_eq!(words_to_number(&["one", "hundred", "and", "five"]), Some(105));
    assert_eq!(words_to_number(&["banana"]), None);
    assert_eq!(spoken_year(&["nineteen", "oh", "five"]), Some(1905));
    assert_eq!(spoken_year(&["twenty", "twenty", "one"]), Some(2021));
}

#[test]
fn normalizer_prefers_extractor_value_and_keeps_failures() {
    let n = normalizer();

    let e = Entity::new("e1", ValueType::Phone, "nine eight seven", 0.9).with_normalized("9876543210");
    let ne = n.normalize(&e);
    assert_eq!(ne.value, "9876543210");
    assert_eq!(ne.validation, Validation::Valid);

    let bad = n.normalize(&Entity::new("e2", ValueType::Email, "  ravi at  gmail ", 0.9));
    assert!(!bad.validated());
    assert_eq!(bad.value, "ravi at gmail");

    let untyped = n.normalize(&Entity::new("e3", ValueType::Unknown, "blue", 0.9));
    assert_eq!(untyped.validation, Validation::Unchecked);
}

#[test]
fn type_tags() {
    assert_eq!(ValueType::from_tag("Date of Birth"), ValueType::Date);
    assert_eq!(ValueType::from_tag("mobile"), ValueType::Phone);
    assert_eq!(ValueType::from_tag("present-address"), ValueType::CurrentAddress);
    assert_eq!(ValueType::from_tag("colour"), ValueType::Unknown);
}
