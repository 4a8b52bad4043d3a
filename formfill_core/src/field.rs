use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, ValueType};
use crate::error::{SchemaError, ValueError};

pub type FieldId = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    #[default]
    Single,
    Multi,
}

/// Character-class contract for transliterated text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    Latin,
    Devanagari,
    Digits,
    Alphanumeric,
}

impl CharClass {
    fn admits(self, c: char) -> bool {
        let separator = c.is_whitespace() || matches!(c, '.' | ',' | '-' | '\'' | '/' | '#' | '(' | ')');
        match self {
            CharClass::Digits => c.is_ascii_digit(),
            CharClass::Latin => separator || c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c),
            CharClass::Devanagari => separator || c.is_ascii_digit() || ('\u{0900}'..='\u{097F}').contains(&c),
            CharClass::Alphanumeric => separator || c.is_ascii_alphanumeric(),
        }
    }
}

/// Optional per-field format constraints handed over by form detection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    #[serde(default)]
    pub charset: Option<CharClass>,
    #[serde(default)]
    pub max_len: Option<usize>,
}

impl FormatSpec {
    pub fn check(&self, kind: ValueType, value: &str) -> Result<(), ValueError> {
        if let Some(class) = self.charset {
            if let Some(bad) = value.chars().find(|c| !class.admits(*c)) {
                return Err(ValueError::format(
                    kind,
                    format!("character {bad:?} is outside the {class:?} class"),
                ));
            }
        }
        if let Some(max) = self.max_len {
            let len = value.chars().count();
            if len > max {
                return Err(ValueError::format(kind, format!("{len} characters exceeds limit of {max}")));
            }
        }
        Ok(())
    }
}

/// Sub-part of a composite address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressPart {
    Street,
    City,
    State,
    Pincode,
}

impl AddressPart {
    pub fn value_type(self) -> ValueType {
        match self {
            AddressPart::Pincode => ValueType::Pincode,
            _ => ValueType::Text,
        }
    }
}

/// Marks a field as one slot of a decomposed address group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    pub group: String,
    pub part: AddressPart,
}

/// A slot in the target form. Immutable for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub expected: ValueType,
    #[serde(default)]
    pub label_tokens: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub format_spec: Option<FormatSpec>,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub composite: Option<Composite>,
}

impl FieldDescriptor {
    pub fn new<I, S>(id: impl Into<FieldId>, expected: ValueType, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            expected,
            label_tokens: labels.into_iter().map(Into::into).collect(),
            required: false,
            format_spec: None,
            multiplicity: Multiplicity::Single,
            composite: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_format(mut self, spec: FormatSpec) -> Self {
        self.format_spec = Some(spec);
        self
    }

    /// Declare this field as one part of a decomposed address group.
    pub fn part_of(mut self, group: impl Into<String>, part: AddressPart) -> Self {
        self.multiplicity = Multiplicity::Multi;
        self.composite = Some(Composite {
            group: group.into(),
            part,
        });
        self
    }

    /// Composite slots are filled by decomposition, never by the generic scorer.
    #[inline]
    pub fn is_composite(&self) -> bool {
        self.multiplicity == Multiplicity::Multi && self.composite.is_some()
    }

    pub fn check_format(&self, value: &str) -> Result<(), ValueError> {
        match &self.format_spec {
            Some(spec) => spec.check(self.expected, value),
            None => Ok(()),
        }
    }
}

/// Reject field and entity sets that violate the upstream contract.
pub fn check_schema(entities: &[Entity], fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
    let mut seen = BTreeSet::new();
    for (i, f) in fields.iter().enumerate() {
        if f.id.trim().is_empty() {
            return Err(SchemaError::EmptyFieldId(i));
        }
        if !seen.insert(f.id.as_str()) {
            return Err(SchemaError::DuplicateField(f.id.clone()));
        }
    }
    check_entities(entities)
}

pub fn check_entities(entities: &[Entity]) -> Result<(), SchemaError> {
    let mut seen = BTreeSet::new();
    for (i, e) in entities.iter().enumerate() {
        if e.id.trim().is_empty() {
            return Err(SchemaError::EmptyEntityId(i));
        }
        if !seen.insert(e.id.as_str()) {
            return Err(SchemaError::DuplicateEntity(e.id.clone()));
        }
        if !e.confidence.is_finite() || !(0.0..=1.0).contains(&e.confidence) {
            return Err(SchemaError::ConfidenceOutOfRange {
                id: e.id.clone(),
                confidence: e.confidence,
            });
        }
    }
    Ok(())
}
