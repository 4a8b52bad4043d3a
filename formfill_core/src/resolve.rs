//! Assignment Resolver.
//!
//! Greedy, margin-aware one-to-one assignment. The walk never maximises total
//! score; it commits a pair only when it is both confident and clearly better
//! than every alternative, and otherwise asks.
//!
//! Sort order (fully deterministic):
//!   score desc, required field first, earlier field, earlier utterance, earlier entity.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cfg::MappingCfg;
use crate::entity::{EntityId, NormalizedEntity};
use crate::error::ValueError;
use crate::field::{FieldDescriptor, FieldId};
use crate::score::{MappingCandidate, ReasonCode};

pub type ClarificationId = String;

/// Where a filled value came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Committed by the resolver (or decomposition) from an extracted entity.
    Entity { entity_id: EntityId },
    /// Set by the user: a typed edit, or a clarification answer naming an entity.
    Manual { entity_id: Option<EntityId> },
}

impl Provenance {
    /// The entity backing this value, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Provenance::Entity { entity_id } => Some(entity_id),
            Provenance::Manual { entity_id } => entity_id.as_deref(),
        }
    }

    #[inline]
    pub fn is_manual(&self) -> bool {
        matches!(self, Provenance::Manual { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilledField {
    pub field_id: FieldId,
    pub value: String,
    pub confidence: f32,
    pub provenance: Provenance,
    pub validated: bool,
    #[serde(default)]
    pub issue: Option<ValueError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClarificationSubject {
    /// One entity fits several fields equally well.
    Entity {
        entity_id: EntityId,
        competing_fields: Vec<FieldId>,
    },
    /// Several entities fit one field equally well.
    Field {
        field_id: FieldId,
        competing_entities: Vec<EntityId>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    /// Competitors within the ambiguity margin.
    Ambiguous,
    /// A unique best pair below the confident-assignment threshold.
    LowConfidence,
}

/// A user-facing disambiguation request. Blocks its subject from being
/// committed until answered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub id: ClarificationId,
    pub subject: ClarificationSubject,
    pub reason: ClarificationReason,
    pub top_score: f32,
}

impl ClarificationRequest {
    pub fn names_field(&self, field_id: &str) -> bool {
        match &self.subject {
            ClarificationSubject::Entity { competing_fields, .. } => competing_fields.iter().any(|f| f == field_id),
            ClarificationSubject::Field { field_id: f, .. } => f == field_id,
        }
    }

    pub fn names_entity(&self, entity_id: &str) -> bool {
        match &self.subject {
            ClarificationSubject::Entity { entity_id: e, .. } => e == entity_id,
            ClarificationSubject::Field { competing_entities, .. } => competing_entities.iter().any(|e| e == entity_id),
        }
    }

    /// Drop `field_id` from an entity-subject request. Returns false when the
    /// request no longer names anything and should be discarded. A request
    /// left with a single field is no longer a tie.
    pub fn prune_field(&mut self, field_id: &str) -> bool {
        match &mut self.subject {
            ClarificationSubject::Entity { competing_fields, .. } => {
                competing_fields.retain(|f| f != field_id);
                if competing_fields.len() == 1 {
                    self.reason = ClarificationReason::LowConfidence;
                }
                !competing_fields.is_empty()
            }
            ClarificationSubject::Field { field_id: f, .. } => f != field_id,
        }
    }

    /// Drop `entity_id` from a field-subject request. Returns false when the
    /// request no longer names anything and should be discarded.
    pub fn prune_entity(&mut self, entity_id: &str) -> bool {
        match &mut self.subject {
            ClarificationSubject::Entity { entity_id: e, .. } => e != entity_id,
            ClarificationSubject::Field { competing_entities, .. } => {
                competing_entities.retain(|e| e != entity_id);
                !competing_entities.is_empty()
            }
        }
    }
}

/// An entity that cannot be committed as-is but fits a field best.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionOffer {
    pub entity_id: EntityId,
    pub field_id: FieldId,
    pub value: String,
    pub reason: ReasonCode,
    #[serde(default)]
    pub issue: Option<ValueError>,
}

/// Fields and entities already settled by the user; a pass leaves them alone.
#[derive(Clone, Debug, Default)]
pub struct Locks {
    pub fields: BTreeSet<FieldId>,
    pub entities: BTreeSet<EntityId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    pub filled: BTreeMap<FieldId, FilledField>,
    pub clarifications: Vec<ClarificationRequest>,
    pub corrections: Vec<CorrectionOffer>,
    /// Entities left over: below consideration, untyped, or with no compatible field.
    pub unmatched: Vec<EntityId>,
}

/// Sequential clarification ids, stable for a given input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationSeq(pub u64);

impl ClarificationSeq {
    pub fn next_id(&mut self) -> ClarificationId {
        self.0 += 1;
        format!("clr-{}", self.0)
    }
}

struct Ctx<'a> {
    fields: BTreeMap<&'a str, (usize, &'a FieldDescriptor)>,
    entities: BTreeMap<&'a str, (u32, usize, &'a NormalizedEntity)>,
}

impl<'a> Ctx<'a> {
    fn new(entities: &'a [NormalizedEntity], fields: &'a [FieldDescriptor]) -> Self {
        Self {
            fields: fields.iter().enumerate().map(|(i, f)| (f.id.as_str(), (i, f))).collect(),
            entities: entities
                .iter()
                .enumerate()
                .map(|(i, e)| (e.id(), (e.entity.utterance_index, i, e)))
                .collect(),
        }
    }

    fn cmp(&self, a: &MappingCandidate, b: &MappingCandidate) -> Ordering {
        let (fa, da) = self.fields[a.field_id.as_str()];
        let (fb, db) = self.fields[b.field_id.as_str()];
        let (ua, ia, _) = self.entities[a.entity_id.as_str()];
        let (ub, ib, _) = self.entities[b.entity_id.as_str()];
        b.score
            .total_cmp(&a.score)
            .then(db.required.cmp(&da.required))
            .then(fa.cmp(&fb))
            .then(ua.cmp(&ub))
            .then(ia.cmp(&ib))
    }
}

pub struct Resolver<'a> {
    cfg: &'a MappingCfg,
}

impl<'a> Resolver<'a> {
    pub fn new(cfg: &'a MappingCfg) -> Self {
        Self { cfg }
    }

    #[inline]
    fn within_margin(&self, top: f32, other: f32) -> bool {
        top - other < self.cfg.ambiguity_margin
    }

    /// Convert scored pairs into committed fields and clarification requests.
    ///
    /// Idempotent: identical inputs give identical output, including ids.
    pub fn resolve(
        &self,
        candidates: &[MappingCandidate],
        entities: &[NormalizedEntity],
        fields: &[FieldDescriptor],
        locks: &Locks,
        seq: &mut ClarificationSeq,
    ) -> Resolution {
        let ctx = Ctx::new(entities, fields);

        let mut order: Vec<&MappingCandidate> = candidates
            .iter()
            .filter(|c| ctx.fields.contains_key(c.field_id.as_str()) && ctx.entities.contains_key(c.entity_id.as_str()))
            .filter(|c| !locks.fields.contains(&c.field_id) && !locks.entities.contains(&c.entity_id))
            .collect();
        order.sort_by(|a, b| ctx.cmp(a, b));

        // Per-entity and per-field views, each in walk order.
        let mut by_entity: BTreeMap<&str, Vec<&MappingCandidate>> = BTreeMap::new();
        let mut by_field: BTreeMap<&str, Vec<&MappingCandidate>> = BTreeMap::new();
        for c in &order {
            by_entity.entry(c.entity_id.as_str()).or_default().push(c);
            by_field.entry(c.field_id.as_str()).or_default().push(c);
        }

        let mut res = Resolution::default();
        let mut taken_fields: BTreeSet<&str> = BTreeSet::new();
        let mut decided: BTreeSet<&str> = BTreeSet::new();
        // Best non-committable pair of entities that still had a valid option.
        let mut deferred: Vec<&MappingCandidate> = Vec::new();

        for c in &order {
            let entity_id = c.entity_id.as_str();
            let field_id = c.field_id.as_str();
            if decided.contains(entity_id) || taken_fields.contains(field_id) {
                continue;
            }
            // First surviving pair for this entity: its best available option.
            let (_, _, ne) = ctx.entities[entity_id];

            if !c.committable() {
                let valid_elsewhere = by_entity[entity_id]
                    .iter()
                    .any(|o| o.committable() && !taken_fields.contains(o.field_id.as_str()));
                if valid_elsewhere {
                    if !deferred.iter().any(|d| d.entity_id == c.entity_id) {
                        deferred.push(*c);
                    }
                    continue;
                }
                let best = deferred.iter().find(|d| d.entity_id == c.entity_id).copied().unwrap_or(*c);
                let (_, field) = ctx.fields[best.field_id.as_str()];
                res.corrections.push(correction(ne, best, field));
                decided.insert(entity_id);
                continue;
            }

            if c.score < self.cfg.min_consider {
                decided.insert(entity_id);
                continue;
            }

            let competing: Vec<&str> = by_entity[entity_id]
                .iter()
                .filter(|o| o.field_id != c.field_id && !taken_fields.contains(o.field_id.as_str()))
                .filter(|o| o.committable() && self.within_margin(c.score, o.score))
                .map(|o| o.field_id.as_str())
                .collect();

            if !competing.is_empty() || c.score < self.cfg.confident {
                let reason = if competing.is_empty() {
                    ClarificationReason::LowConfidence
                } else {
                    ClarificationReason::Ambiguous
                };
                let mut competing_fields = vec![c.field_id.clone()];
                competing_fields.extend(competing.iter().map(|f| f.to_string()));
                res.clarifications.push(ClarificationRequest {
                    id: seq.next_id(),
                    subject: ClarificationSubject::Entity {
                        entity_id: c.entity_id.clone(),
                        competing_fields,
                    },
                    reason,
                    top_score: c.score,
                });
                decided.insert(entity_id);
                continue;
            }

            // Field side: other undecided entities whose own best option is
            // this field, within the margin of this pair.
            let rivals: Vec<&str> = by_field[field_id]
                .iter()
                .filter(|o| o.entity_id != c.entity_id && !decided.contains(o.entity_id.as_str()))
                .filter(|o| o.committable() && o.score >= self.cfg.min_consider)
                .filter(|o| self.within_margin(c.score, o.score))
                .filter(|o| {
                    let best = by_entity[o.entity_id.as_str()]
                        .iter()
                        .find(|x| x.committable() && !taken_fields.contains(x.field_id.as_str()))
                        .map(|x| x.score)
                        .unwrap_or(o.score);
                    self.within_margin(best, o.score)
                })
                .map(|o| o.entity_id.as_str())
                .collect();

            if !rivals.is_empty() {
                let mut competing_entities = vec![c.entity_id.clone()];
                competing_entities.extend(rivals.iter().map(|e| e.to_string()));
                res.clarifications.push(ClarificationRequest {
                    id: seq.next_id(),
                    subject: ClarificationSubject::Field {
                        field_id: c.field_id.clone(),
                        competing_entities,
                    },
                    reason: ClarificationReason::Ambiguous,
                    top_score: c.score,
                });
                decided.insert(entity_id);
                decided.extend(rivals);
                taken_fields.insert(field_id);
                continue;
            }

            res.filled.insert(
                c.field_id.clone(),
                FilledField {
                    field_id: c.field_id.clone(),
                    value: ne.value.clone(),
                    confidence: c.score.min(ne.entity.confidence),
                    provenance: Provenance::Entity {
                        entity_id: c.entity_id.clone(),
                    },
                    validated: true,
                    issue: None,
                },
            );
            taken_fields.insert(field_id);
            decided.insert(entity_id);
        }

        // Fields committed later in the walk are no longer open options for
        // earlier entity-subject requests.
        let committed: Vec<FieldId> = res.filled.keys().cloned().collect();
        res.clarifications.retain_mut(|cr| {
            matches!(cr.subject, ClarificationSubject::Field { .. })
                || committed.iter().all(|f| cr.prune_field(f))
        });

        // Entities that skipped a violating pair but ended up placed nowhere
        // still get their correction offer.
        for c in deferred {
            let id = c.entity_id.as_str();
            let placed = res.filled.values().any(|f| f.provenance.entity() == Some(id))
                || res.clarifications.iter().any(|cr| cr.names_entity(id))
                || res.corrections.iter().any(|o| o.entity_id == id);
            if !placed {
                let (_, _, ne) = ctx.entities[id];
                let (_, field) = ctx.fields[c.field_id.as_str()];
                res.corrections.push(correction(ne, c, field));
            }
        }

        res.unmatched = leftover_entities(entities, locks, &res);

        tracing::debug!(
            candidates = order.len(),
            filled = res.filled.len(),
            clarifications = res.clarifications.len(),
            corrections = res.corrections.len(),
            unmatched = res.unmatched.len(),
            "resolver pass complete"
        );
        res
    }
}

fn correction(ne: &NormalizedEntity, c: &MappingCandidate, field: &FieldDescriptor) -> CorrectionOffer {
    let reason = if c.reasons.contains(&ReasonCode::InvalidValue) {
        ReasonCode::InvalidValue
    } else {
        ReasonCode::FormatSpecViolation
    };
    CorrectionOffer {
        entity_id: c.entity_id.clone(),
        field_id: c.field_id.clone(),
        value: ne.value.clone(),
        reason,
        issue: ne.issue().cloned().or_else(|| field.check_format(&ne.value).err()),
    }
}

/// Entities in input order that back nothing and are not awaiting the user.
pub fn leftover_entities(entities: &[NormalizedEntity], locks: &Locks, res: &Resolution) -> Vec<EntityId> {
    let backing: BTreeSet<&str> = res.filled.values().filter_map(|f| f.provenance.entity()).collect();
    entities
        .iter()
        .map(NormalizedEntity::id)
        .filter(|id| !locks.entities.contains(*id) && !backing.contains(id))
        .filter(|id| !res.clarifications.iter().any(|c| c.names_entity(id)))
        .filter(|id| !res.corrections.iter().any(|c| c.entity_id == *id))
        .map(str::to_string)
        .collect()
}
