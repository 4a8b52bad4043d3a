//! Domain adapter layer: convert outside-world records into core types.
//!
//! This module is intentionally small and policy-light:
//! - No IO
//! - No async
//! - No mapping rules (those live in core)
//!
//! Transcription and form detection hand over loosely typed records; an
//! `EntityBuilder` (or the provided `BasicEntityBuilder`) turns them into
//! `formfill_core::Entity`. Rendering is reached through `FormRenderer`.

use std::borrow::Cow;

use serde::Deserialize;

use formfill_core::{AddressPart, Entity, FieldDescriptor, FormatSpec, SourceSpan, ValueType};

use crate::session::MappingSession;

/// A raw entity from the extraction step.
///
/// The supervisor does not interpret the type tag; it delegates to an `EntityBuilder`.
#[derive(Clone, Debug, Deserialize)]
pub struct ExtractionRecord<'a> {
    pub entity_id: Cow<'a, str>,
    /// Extractor's type label ("phone", "dob", "person", ...).
    pub type_tag: Cow<'a, str>,
    pub raw_text: Cow<'a, str>,
    #[serde(default)]
    pub normalized: Option<Cow<'a, str>>,
    pub confidence: f32,
    #[serde(default)]
    pub span: Option<(u32, u32)>,
    /// Words heard around the value, used as label hints.
    #[serde(default)]
    pub context: Vec<Cow<'a, str>>,
    #[serde(default)]
    pub utterance_index: u32,
}

impl<'a> ExtractionRecord<'a> {
    /// Convenience constructor.
    pub fn new(
        entity_id: impl Into<Cow<'a, str>>,
        type_tag: impl Into<Cow<'a, str>>,
        raw_text: impl Into<Cow<'a, str>>,
        confidence: f32,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            type_tag: type_tag.into(),
            raw_text: raw_text.into(),
            normalized: None,
            confidence,
            span: None,
            context: Vec::new(),
            utterance_index: 0,
        }
    }

    pub fn with_normalized(mut self, value: impl Into<Cow<'a, str>>) -> Self {
        self.normalized = Some(value.into());
        self
    }

    pub fn with_context(mut self, word: impl Into<Cow<'a, str>>) -> Self {
        self.context.push(word.into());
        self
    }

    pub fn at(mut self, utterance_index: u32) -> Self {
        self.utterance_index = utterance_index;
        self
    }
}

/// Trait: map an `ExtractionRecord` into a core `Entity`.
///
/// Confidence is passed through untouched; out-of-range values are a
/// contract violation caught by session creation, not silently clamped.
pub trait EntityBuilder {
    fn build(&self, rec: &ExtractionRecord<'_>) -> Entity;
}

/// Builder that parses the type tag with `ValueType::from_tag`, with optional
/// product-specific tag aliases checked first.
#[derive(Clone, Debug, Default)]
pub struct BasicEntityBuilder {
    pub aliases: Vec<(String, ValueType)>,
}

impl BasicEntityBuilder {
    pub fn with_alias(mut self, tag: impl Into<String>, kind: ValueType) -> Self {
        self.aliases.push((tag.into().to_lowercase(), kind));
        self
    }

    fn kind_of(&self, tag: &str) -> ValueType {
        let lower = tag.trim().to_lowercase();
        self.aliases
            .iter()
            .find(|(t, _)| *t == lower)
            .map(|(_, k)| *k)
            .unwrap_or_else(|| ValueType::from_tag(&lower))
    }
}

impl EntityBuilder for BasicEntityBuilder {
    fn build(&self, rec: &ExtractionRecord<'_>) -> Entity {
        let (start, end) = rec.span.unwrap_or((0, 0));
        Entity {
            id: rec.entity_id.to_string(),
            kind: self.kind_of(&rec.type_tag),
            raw_text: rec.raw_text.to_string(),
            normalized: rec.normalized.as_ref().map(|n| n.to_string()),
            confidence: rec.confidence,
            span: SourceSpan { start, end },
            label_hints: rec.context.iter().map(|c| c.to_string()).collect(),
            utterance_index: rec.utterance_index,
        }
    }
}

/// Helper: build entities for a batch of records, preserving order.
pub fn build_entity_batch<B: EntityBuilder>(builder: &B, records: &[ExtractionRecord<'_>]) -> Vec<Entity> {
    records.iter().map(|r| builder.build(r)).collect()
}

/// A slot reported by form detection (OCR/template matching).
#[derive(Clone, Debug, Deserialize)]
pub struct DetectedSlot<'a> {
    pub id: Cow<'a, str>,
    pub type_tag: Cow<'a, str>,
    /// Printed label, e.g. "Mobile Number".
    #[serde(default)]
    pub label: Cow<'a, str>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub format_spec: Option<FormatSpec>,
    /// Composite address group and part, when the form splits an address.
    #[serde(default)]
    pub address_group: Option<Cow<'a, str>>,
    #[serde(default)]
    pub address_part: Option<AddressPart>,
}

pub fn field_from_slot(slot: &DetectedSlot<'_>) -> FieldDescriptor {
    let mut f = FieldDescriptor::new(
        slot.id.to_string(),
        ValueType::from_tag(&slot.type_tag),
        slot.label.split_whitespace().map(str::to_string),
    );
    f.required = slot.required;
    f.format_spec = slot.format_spec.clone();
    if let (Some(group), Some(part)) = (&slot.address_group, slot.address_part) {
        f = f.part_of(group.to_string(), part);
    }
    f
}

pub fn fields_from_slots(slots: &[DetectedSlot<'_>]) -> Vec<FieldDescriptor> {
    slots.iter().map(field_from_slot).collect()
}

// ---------------------------------------------------------------------
// Downstream rendering
// ---------------------------------------------------------------------

#[derive(Clone, Debug, thiserror::Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// The PDF/layout step that consumes a confirmed form.
pub trait FormRenderer {
    fn render(&self, session: &MappingSession) -> Result<(), RenderError>;
}

/// Renderer whose outcome was decided elsewhere (e.g. reported across FFI).
#[derive(Clone, Debug)]
pub struct ReportedOutcome(pub Result<(), String>);

impl FormRenderer for ReportedOutcome {
    fn render(&self, _session: &MappingSession) -> Result<(), RenderError> {
        self.0.clone().map_err(RenderError)
    }
}
