//! Candidate Scorer: a compatibility score for every (entity, field) pair.
//!
//! Three signals, each in [0,1], combined by weighted sum:
//! - type compatibility (hard filter: zero excludes the pair),
//! - label similarity between the entity's speech-context hints and the field label,
//! - reading-order context (answers tend to follow form order).
//!
//! A signal with no available input is left out and the remaining weights are
//! renormalized, so an unlabelled entity is judged on type and order alone.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cfg::MappingCfg;
use crate::entity::{EntityId, NormalizedEntity, TypeMatch, ValueType};
use crate::field::{FieldDescriptor, FieldId};
use crate::lexicon::Lexicon;

/// Contributing factors recorded on a candidate for auditing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    TypeExact,
    TypeSupertype,
    LabelExact,
    LabelSynonym,
    LabelPartial,
    LabelUnavailable,
    ContextAligned,
    ContextUnavailable,
    /// The entity failed type validation; offer for correction only.
    InvalidValue,
    /// The value breaks the field's character-class or length contract.
    FormatSpecViolation,
}

/// Raw signal values behind a score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub type_compat: f32,
    pub label: Option<f32>,
    pub context: Option<f32>,
}

/// One scored (entity, field) pair. Regenerated on every pass; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct MappingCandidate {
    pub entity_id: EntityId,
    pub field_id: FieldId,
    pub score: f32,
    pub reasons: BTreeSet<ReasonCode>,
    pub signals: Signals,
}

impl MappingCandidate {
    /// May this pair be committed without a human looking at it?
    #[inline]
    pub fn committable(&self) -> bool {
        !self.reasons.contains(&ReasonCode::InvalidValue) && !self.reasons.contains(&ReasonCode::FormatSpecViolation)
    }
}

#[inline]
pub fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}

pub struct Scorer<'a> {
    cfg: &'a MappingCfg,
    lexicon: &'a Lexicon,
}

impl<'a> Scorer<'a> {
    pub fn new(cfg: &'a MappingCfg, lexicon: &'a Lexicon) -> Self {
        Self { cfg, lexicon }
    }

    /// Score every type-compatible pair. Unknown-typed entities and composite
    /// (decomposition-only) fields never produce candidates.
    ///
    /// Output order is entity input order, then field declaration order.
    pub fn score(&self, entities: &[NormalizedEntity], fields: &[FieldDescriptor]) -> Vec<MappingCandidate> {
        let scorable: Vec<&NormalizedEntity> =
            entities.iter().filter(|e| e.entity.kind != ValueType::Unknown).collect();
        let slots: Vec<&FieldDescriptor> = fields.iter().filter(|f| !f.is_composite()).collect();

        let context_available = scorable.len() >= 2 && slots.len() >= 2;
        let entity_pos = utterance_positions(&scorable);

        let mut out = Vec::new();
        for (ei, ne) in scorable.iter().enumerate() {
            let hints = self.lexicon.label_tokens(&ne.entity.label_hints);
            for (fi, field) in slots.iter().enumerate() {
                let mut reasons = BTreeSet::new();

                let type_compat = match ValueType::compatibility(ne.entity.kind, field.expected) {
                    TypeMatch::Exact => {
                        reasons.insert(ReasonCode::TypeExact);
                        1.0
                    }
                    TypeMatch::Supertype => {
                        reasons.insert(ReasonCode::TypeSupertype);
                        self.cfg.supertype_credit
                    }
                    TypeMatch::None => continue,
                };
                if type_compat <= 0.0 {
                    continue;
                }

                let label_tokens = self.lexicon.label_tokens(&field.label_tokens);
                let label = self.label_similarity(&hints, &label_tokens, &mut reasons);
                if label.is_none() {
                    reasons.insert(ReasonCode::LabelUnavailable);
                }

                let context = if context_available {
                    let field_pos = fi as f32 / (slots.len() - 1) as f32;
                    let c = 1.0 - (entity_pos[ei] - field_pos).abs();
                    if c > 0.5 {
                        reasons.insert(ReasonCode::ContextAligned);
                    }
                    Some(c)
                } else {
                    reasons.insert(ReasonCode::ContextUnavailable);
                    None
                };

                if !ne.validated() {
                    reasons.insert(ReasonCode::InvalidValue);
                } else if field.check_format(&ne.value).is_err() {
                    reasons.insert(ReasonCode::FormatSpecViolation);
                }

                let signals = Signals {
                    type_compat,
                    label,
                    context,
                };
                out.push(MappingCandidate {
                    entity_id: ne.entity.id.clone(),
                    field_id: field.id.clone(),
                    score: self.combine(&signals),
                    reasons,
                    signals,
                });
            }
        }
        out
    }

    fn combine(&self, s: &Signals) -> f32 {
        let mut num = self.cfg.w_type * s.type_compat;
        let mut den = self.cfg.w_type;
        if let Some(l) = s.label {
            num += self.cfg.w_label * l;
            den += self.cfg.w_label;
        }
        if let Some(c) = s.context {
            num += self.cfg.w_context * c;
            den += self.cfg.w_context;
        }
        if den <= 0.0 {
            return 0.0;
        }
        round4((num / den).clamp(0.0, 1.0))
    }

    /// Mean of hint coverage and label coverage, each token credited with its
    /// best counterpart. `None` when either side has no usable tokens.
    fn label_similarity(&self, hints: &[String], labels: &[String], reasons: &mut BTreeSet<ReasonCode>) -> Option<f32> {
        if hints.is_empty() || labels.is_empty() {
            return None;
        }

        let mut credit_sum = |from: &[String], to: &[String]| -> f32 {
            let mut sum = 0.0;
            for a in from {
                let mut best = 0.0_f32;
                let mut best_reason = None;
                for b in to {
                    let (c, reason) = self.token_credit(a, b);
                    if c > best {
                        best = c;
                        best_reason = reason;
                    }
                }
                if let Some(r) = best_reason {
                    reasons.insert(r);
                }
                sum += best;
            }
            sum / from.len() as f32
        };

        let hint_cov = credit_sum(hints, labels);
        let label_cov = credit_sum(labels, hints);
        Some(((hint_cov + label_cov) / 2.0).clamp(0.0, 1.0))
    }

    fn token_credit(&self, a: &str, b: &str) -> (f32, Option<ReasonCode>) {
        if a == b {
            (1.0, Some(ReasonCode::LabelExact))
        } else if self.lexicon.synonyms(a, b) {
            (self.cfg.synonym_credit, Some(ReasonCode::LabelSynonym))
        } else if shares_prefix(a, b, 4) {
            (self.cfg.prefix_credit, Some(ReasonCode::LabelPartial))
        } else {
            (0.0, None)
        }
    }
}

fn shares_prefix(a: &str, b: &str, n: usize) -> bool {
    let pa: Vec<char> = a.chars().take(n).collect();
    let pb: Vec<char> = b.chars().take(n).collect();
    pa.len() == n && pa == pb
}

/// Relative position in [0,1] of each entity in utterance order, ties broken
/// by input order.
fn utterance_positions(entities: &[&NormalizedEntity]) -> Vec<f32> {
    let n = entities.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (entities[i].entity.utterance_index, i));
    let mut pos = vec![0.0; n];
    if n > 1 {
        for (rank, &i) in order.iter().enumerate() {
            pos[i] = rank as f32 / (n - 1) as f32;
        }
    }
    pos
}
