use serde::{Deserialize, Serialize};

use crate::error::ValueError;

pub type EntityId = String;

/// Semantic type of an extracted value or an expected field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Name,
    Date,
    Phone,
    Email,
    Age,
    Pincode,
    Aadhaar,
    Address,
    PermanentAddress,
    CurrentAddress,
    Number,
    Text,
    Unknown,
}

impl ValueType {
    /// Parse an upstream type tag. Anything unrecognised is `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "name" | "person" | "full_name" => ValueType::Name,
            "date" | "dob" | "date_of_birth" => ValueType::Date,
            "phone" | "mobile" | "telephone" => ValueType::Phone,
            "email" | "e_mail" => ValueType::Email,
            "age" => ValueType::Age,
            "pincode" | "pin" | "postal_code" | "zip" => ValueType::Pincode,
            "aadhaar" | "aadhar" | "uid" => ValueType::Aadhaar,
            "address" => ValueType::Address,
            "permanent_address" => ValueType::PermanentAddress,
            "current_address" | "present_address" => ValueType::CurrentAddress,
            "number" | "numeric" | "integer" => ValueType::Number,
            "text" | "string" => ValueType::Text,
            _ => ValueType::Unknown,
        }
    }

    /// The generic type this one specialises, if any.
    pub fn supertype(self) -> Option<ValueType> {
        match self {
            ValueType::PermanentAddress | ValueType::CurrentAddress => Some(ValueType::Address),
            ValueType::Age => Some(ValueType::Number),
            _ => None,
        }
    }

    /// Exact match, supertype relation in either direction, or nothing.
    pub fn compatibility(entity: ValueType, field: ValueType) -> TypeMatch {
        if entity == ValueType::Unknown || field == ValueType::Unknown {
            return TypeMatch::None;
        }
        if entity == field {
            TypeMatch::Exact
        } else if field.supertype() == Some(entity) || entity.supertype() == Some(field) {
            TypeMatch::Supertype
        } else {
            TypeMatch::None
        }
    }

    pub fn is_address(self) -> bool {
        matches!(
            self,
            ValueType::Address | ValueType::PermanentAddress | ValueType::CurrentAddress
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeMatch {
    Exact,
    Supertype,
    None,
}

/// Byte range of the value inside the transcript it was extracted from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: u32,
    pub end: u32,
}

/// A typed value extracted from speech. Immutable once created; a
/// re-extraction supersedes the whole set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: ValueType,
    pub raw_text: String,
    /// Canonical form proposed by the extractor, if it produced one.
    #[serde(default)]
    pub normalized: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub span: SourceSpan,
    /// Words from the surrounding utterance ("my mobile number is ...").
    #[serde(default)]
    pub label_hints: Vec<String>,
    /// Position in the utterance sequence.
    #[serde(default)]
    pub utterance_index: u32,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, kind: ValueType, raw_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: id.into(),
            kind,
            raw_text: raw_text.into(),
            normalized: None,
            confidence,
            span: SourceSpan::default(),
            label_hints: Vec::new(),
            utterance_index: 0,
        }
    }

    pub fn with_normalized(mut self, value: impl Into<String>) -> Self {
        self.normalized = Some(value.into());
        self
    }

    pub fn with_span(mut self, start: u32, end: u32) -> Self {
        self.span = SourceSpan { start, end };
        self
    }

    pub fn with_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_hints = hints.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(mut self, utterance_index: u32) -> Self {
        self.utterance_index = utterance_index;
        self
    }
}

/// Outcome of running an entity through the Normalizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Validation {
    Valid,
    Invalid(ValueError),
    /// Unknown-typed values are kept but never checked.
    Unchecked,
}

/// An entity paired with its canonical value and validation outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub entity: Entity,
    pub value: String,
    pub validation: Validation,
}

impl NormalizedEntity {
    #[inline]
    pub fn id(&self) -> &str {
        &self.entity.id
    }

    #[inline]
    pub fn validated(&self) -> bool {
        matches!(self.validation, Validation::Valid)
    }

    pub fn issue(&self) -> Option<&ValueError> {
        match &self.validation {
            Validation::Invalid(e) => Some(e),
            _ => None,
        }
    }
}
