//! Mapping session state machine.
//!
//! Idle -> Extracted -> Mapped -> AwaitingConfirmation -> Confirmed -> Finalized,
//! plus the terminal side state Rejected. Edits and clarification answers
//! re-enter Mapped and only touch the fields they name.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formfill_core::decompose::{composite_groups, fill_group};
use formfill_core::{
    check_entities, check_schema, evaluate, ClarificationId, ClarificationRequest, ClarificationSeq,
    ClarificationSubject, Completeness, CorrectionOffer, Entity, EntityId, FieldDescriptor, FieldId, FilledField,
    Locks, MappingCandidate, MappingEngine, NormalizedEntity, Normalizer, Provenance, SchemaError, ValueType,
};

use crate::adapter::FormRenderer;

pub type SessionId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Extracted,
    Mapped,
    AwaitingConfirmation,
    Confirmed,
    Finalized,
    Rejected,
}

impl SessionState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finalized | SessionState::Rejected)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("cannot {action} while {state:?}")]
    InvalidTransition { state: SessionState, action: &'static str },
    #[error("unknown field {0:?}")]
    UnknownField(FieldId),
    #[error("unknown clarification {0:?}")]
    UnknownClarification(ClarificationId),
    #[error("{choice:?} is not an option of clarification {clarification:?}")]
    InvalidChoice { clarification: ClarificationId, choice: String },
    #[error("entity {entity_id:?} already backs field {field_id:?}")]
    EntityAlreadyAssigned { entity_id: EntityId, field_id: FieldId },
}

/// The user's answer to a clarification request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Choice {
    /// Answers an entity-subject request.
    Field(FieldId),
    /// Answers a field-subject request.
    Entity(EntityId),
}

/// Why `confirm` did not go through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReason {
    pub pending_clarifications: Vec<ClarificationId>,
    pub unresolved_required: Vec<FieldId>,
    /// Only populated when invalid fields block confirmation.
    pub invalid: Vec<FieldId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Confirmed,
    Blocked(BlockReason),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Finalized,
    /// Rendering failed; the session stays Confirmed and finalize may be retried.
    RetryableFailure { reason: String },
}

/// Read-only state snapshot handed back to the UI after each operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub state: SessionState,
    pub revision: u64,
    /// Form order.
    pub filled: Vec<FilledField>,
    pub empty: Vec<FieldId>,
    pub clarifications: Vec<ClarificationRequest>,
    pub corrections: Vec<CorrectionOffer>,
    pub unmatched: Vec<EntityId>,
    pub completeness: Completeness,
}

/// One user's form-filling session. Mutated by one actor at a time; the
/// supervisor serializes access per session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingSession {
    id: SessionId,
    state: SessionState,
    #[serde(default)]
    template: Option<String>,
    reference_date: NaiveDate,
    fields: Vec<FieldDescriptor>,
    entities: Vec<NormalizedEntity>,
    #[serde(skip)]
    candidates: Vec<MappingCandidate>,
    filled: BTreeMap<FieldId, FilledField>,
    clarifications: Vec<ClarificationRequest>,
    corrections: Vec<CorrectionOffer>,
    unmatched: Vec<EntityId>,
    seq: ClarificationSeq,
    revision: u64,
    completeness: Completeness,
}

impl MappingSession {
    /// Create an Idle session over `fields`. Duplicate or empty ids reject it.
    pub fn open(
        id: SessionId,
        fields: Vec<FieldDescriptor>,
        reference_date: NaiveDate,
        template: Option<String>,
    ) -> Result<Self, SessionError> {
        check_schema(&[], &fields)?;
        Ok(Self {
            id,
            state: SessionState::Idle,
            template,
            reference_date,
            fields,
            entities: Vec::new(),
            candidates: Vec::new(),
            filled: BTreeMap::new(),
            clarifications: Vec::new(),
            corrections: Vec::new(),
            unmatched: Vec::new(),
            seq: ClarificationSeq::default(),
            revision: 0,
            completeness: Completeness::default(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn entities(&self) -> &[NormalizedEntity] {
        &self.entities
    }

    /// Scored pairs from the most recent pass. Not persisted.
    pub fn candidates(&self) -> &[MappingCandidate] {
        &self.candidates
    }

    pub fn filled(&self) -> &BTreeMap<FieldId, FilledField> {
        &self.filled
    }

    pub fn clarifications(&self) -> &[ClarificationRequest] {
        &self.clarifications
    }

    pub fn corrections(&self) -> &[CorrectionOffer] {
        &self.corrections
    }

    pub fn completeness(&self) -> &Completeness {
        &self.completeness
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            state: self.state,
            revision: self.revision,
            filled: self
                .fields
                .iter()
                .filter_map(|f| self.filled.get(&f.id).cloned())
                .collect(),
            empty: self
                .fields
                .iter()
                .filter(|f| !self.filled.contains_key(&f.id))
                .map(|f| f.id.clone())
                .collect(),
            clarifications: self.clarifications.clone(),
            corrections: self.corrections.clone(),
            unmatched: self.unmatched.clone(),
            completeness: self.completeness.clone(),
        }
    }

    fn reject(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    fn field(&self, field_id: &str) -> Result<&FieldDescriptor, SessionError> {
        self.fields
            .iter()
            .find(|f| f.id == field_id)
            .ok_or_else(|| SessionError::UnknownField(field_id.to_string()))
    }

    /// Hand over the extracted entity set.
    ///
    /// From Idle this runs Extracted -> Mapped. On an already mapped session
    /// the new set supersedes the old one and the resolver re-runs with every
    /// manual field locked.
    pub fn supply_entities(&mut self, engine: &MappingEngine, entities: Vec<Entity>) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {
                check_entities(&entities)?;
                self.entities = Normalizer::new(self.reference_date).normalize_all(&entities);
                self.state = SessionState::Extracted;
                tracing::debug!(session = %self.id, entities = self.entities.len(), "entities extracted");
                self.map(engine);
                Ok(())
            }
            SessionState::Mapped | SessionState::AwaitingConfirmation | SessionState::Confirmed => {
                check_entities(&entities)?;
                self.entities = Normalizer::new(self.reference_date).normalize_all(&entities);
                self.filled.retain(|_, f| f.provenance.is_manual());
                self.state = SessionState::Extracted;
                tracing::info!(session = %self.id, entities = self.entities.len(), "entity set superseded");
                self.map(engine);
                Ok(())
            }
            _ => Err(self.reject("supply entities")),
        }
    }

    /// Extracted -> Mapped. Always succeeds; clarifications do not block it.
    fn map(&mut self, engine: &MappingEngine) {
        let present: BTreeSet<&str> = self.entities.iter().map(NormalizedEntity::id).collect();
        let locks = Locks {
            fields: self.filled.keys().cloned().collect(),
            entities: self
                .filled
                .values()
                .filter_map(|f| f.provenance.entity())
                .filter(|e| present.contains(e))
                .map(str::to_string)
                .collect(),
        };

        let pass = engine.map(&self.entities, &self.fields, &locks, &mut self.seq);
        self.candidates = pass.candidates;
        self.filled.extend(pass.resolution.filled);
        self.clarifications = pass.resolution.clarifications;
        self.corrections = pass.resolution.corrections;
        self.unmatched = pass.resolution.unmatched;

        self.state = SessionState::Mapped;
        self.touch(engine);
        tracing::info!(
            session = %self.id,
            filled = self.filled.len(),
            clarifications = self.clarifications.len(),
            state = ?self.state,
            "session mapped"
        );
    }

    /// Recompute completeness, bump the revision and take the automatic
    /// Mapped -> AwaitingConfirmation step when nothing is outstanding.
    fn touch(&mut self, engine: &MappingEngine) {
        self.completeness = evaluate(&self.fields, &self.filled, &self.clarifications, engine.cfg());
        self.revision += 1;
        if self.state == SessionState::Mapped && self.completeness.ready(engine.cfg()) {
            self.state = SessionState::AwaitingConfirmation;
        }
    }

    /// Entities that back nothing and are not awaiting the user, in input order.
    fn refresh_unmatched(&mut self) {
        let backing: BTreeSet<&str> = self.filled.values().filter_map(|f| f.provenance.entity()).collect();
        self.unmatched = self
            .entities
            .iter()
            .map(NormalizedEntity::id)
            .filter(|id| !backing.contains(id))
            .filter(|id| !self.clarifications.iter().any(|c| c.names_entity(id)))
            .filter(|id| !self.corrections.iter().any(|c| c.entity_id == *id))
            .map(str::to_string)
            .collect();
    }

    /// Drop `field_id` from every pending request and offer. Entity-subject
    /// requests keep their other competing fields.
    fn release_field(&mut self, field_id: &str) {
        self.clarifications.retain_mut(|c| c.prune_field(field_id));
        self.corrections.retain(|c| c.field_id != field_id);
    }

    fn release_entity(&mut self, entity_id: &str) {
        self.clarifications.retain_mut(|c| c.prune_entity(entity_id));
        self.corrections.retain(|c| c.entity_id != entity_id);
    }

    /// Manual edit: set (or, with an empty value, clear) one field.
    ///
    /// Touches only `field_id` and the requests naming it; every other
    /// filled field keeps its value and provenance.
    pub fn apply_edit(&mut self, engine: &MappingEngine, field_id: &str, value: &str) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(self.reject("edit"));
        }
        let field = self.field(field_id)?;
        let kind = field.composite.as_ref().map(|c| c.part.value_type()).unwrap_or(field.expected);

        if value.trim().is_empty() {
            self.filled.remove(field_id);
        } else {
            let normalized = match kind {
                ValueType::Unknown => Ok(formfill_core::validate::collapse_whitespace(value)),
                _ => Normalizer::new(self.reference_date).normalize_value(kind, value),
            };
            let checked = normalized.and_then(|v| field.check_format(&v).map(|_| v));
            let filled = match checked {
                Ok(v) => FilledField {
                    field_id: field_id.to_string(),
                    value: v,
                    confidence: 1.0,
                    provenance: Provenance::Manual { entity_id: None },
                    validated: true,
                    issue: None,
                },
                Err(e) => {
                    tracing::warn!(session = %self.id, field = field_id, error = %e, "manual edit kept as invalid");
                    FilledField {
                        field_id: field_id.to_string(),
                        value: formfill_core::validate::collapse_whitespace(value),
                        confidence: 1.0,
                        provenance: Provenance::Manual { entity_id: None },
                        validated: false,
                        issue: Some(e),
                    }
                }
            };
            self.filled.insert(field_id.to_string(), filled);
        }

        // An edit settles every request naming the field.
        self.clarifications.retain(|c| !c.names_field(field_id));
        self.corrections.retain(|c| c.field_id != field_id);
        self.refresh_unmatched();
        self.state = SessionState::Mapped;
        self.touch(engine);
        tracing::info!(session = %self.id, field = field_id, revision = self.revision, state = ?self.state, "edit applied");
        Ok(())
    }

    /// Consume a clarification with the user's choice, committing it as a
    /// manual assignment backed by the chosen entity.
    pub fn resolve_clarification(
        &mut self,
        engine: &MappingEngine,
        clarification_id: &str,
        choice: Choice,
    ) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(self.reject("resolve clarification"));
        }
        let idx = self
            .clarifications
            .iter()
            .position(|c| c.id == clarification_id)
            .ok_or_else(|| SessionError::UnknownClarification(clarification_id.to_string()))?;

        let invalid = || SessionError::InvalidChoice {
            clarification: clarification_id.to_string(),
            choice: match &choice {
                Choice::Field(f) => f.clone(),
                Choice::Entity(e) => e.clone(),
            },
        };
        let (entity_id, field_id) = match (&self.clarifications[idx].subject, &choice) {
            (ClarificationSubject::Entity { entity_id, competing_fields }, Choice::Field(f))
                if competing_fields.contains(f) =>
            {
                (entity_id.clone(), f.clone())
            }
            (ClarificationSubject::Field { field_id, competing_entities }, Choice::Entity(e))
                if competing_entities.contains(e) =>
            {
                (e.clone(), field_id.clone())
            }
            _ => return Err(invalid()),
        };

        if let Some(other) = self
            .filled
            .values()
            .find(|f| f.field_id != field_id && f.provenance.entity() == Some(entity_id.as_str()))
        {
            return Err(SessionError::EntityAlreadyAssigned {
                entity_id,
                field_id: other.field_id.clone(),
            });
        }
        let entity = self
            .entities
            .iter()
            .find(|e| e.id() == entity_id)
            .ok_or_else(invalid)?
            .clone();
        let field = self.field(&field_id)?.clone();
        let provenance = Provenance::Manual {
            entity_id: Some(entity_id.clone()),
        };

        let written: Vec<FilledField> = match &field.composite {
            Some(c) => {
                let groups = composite_groups(&self.fields);
                let group: Vec<&FieldDescriptor> = groups
                    .iter()
                    .find(|(g, _)| *g == c.group)
                    .map(|(_, slots)| slots.clone())
                    .unwrap_or_default();
                let locks = Locks {
                    fields: self
                        .filled
                        .iter()
                        .filter(|(_, f)| f.provenance.is_manual())
                        .map(|(k, _)| k.clone())
                        .collect(),
                    entities: BTreeSet::new(),
                };
                fill_group(&entity, &group, &provenance, 1.0, &locks)
            }
            None => {
                let checked = field.check_format(&entity.value);
                vec![FilledField {
                    field_id: field_id.clone(),
                    value: entity.value.clone(),
                    confidence: 1.0,
                    provenance,
                    validated: entity.validated() && checked.is_ok(),
                    issue: entity.issue().cloned().or(checked.err()),
                }]
            }
        };

        self.clarifications.remove(idx);
        for f in written {
            let id = f.field_id.clone();
            self.filled.insert(id.clone(), f);
            self.release_field(&id);
        }
        self.release_entity(&entity_id);
        self.refresh_unmatched();
        self.state = SessionState::Mapped;
        self.touch(engine);
        tracing::info!(
            session = %self.id,
            clarification = clarification_id,
            entity = %entity_id,
            field = %field_id,
            state = ?self.state,
            "clarification resolved"
        );
        Ok(())
    }

    /// Explicit user confirmation. The only way into Confirmed.
    pub fn confirm(&mut self, engine: &MappingEngine) -> Result<ConfirmOutcome, SessionError> {
        match self.state {
            SessionState::AwaitingConfirmation => {
                self.state = SessionState::Confirmed;
                self.revision += 1;
                tracing::info!(session = %self.id, "session confirmed");
                Ok(ConfirmOutcome::Confirmed)
            }
            SessionState::Confirmed => Ok(ConfirmOutcome::Confirmed),
            SessionState::Mapped => {
                let c = &self.completeness;
                let reason = BlockReason {
                    pending_clarifications: self.clarifications.iter().map(|c| c.id.clone()).collect(),
                    unresolved_required: c.unresolved_required.clone(),
                    invalid: if engine.cfg().block_on_invalid {
                        c.invalid.clone()
                    } else {
                        Vec::new()
                    },
                };
                tracing::debug!(session = %self.id, ?reason, "confirmation blocked");
                Ok(ConfirmOutcome::Blocked(reason))
            }
            _ => Err(self.reject("confirm")),
        }
    }

    /// Hand the confirmed form to the renderer. Failure keeps the session
    /// Confirmed so the caller can retry without re-confirming.
    pub fn finalize<R: FormRenderer + ?Sized>(&mut self, renderer: &R) -> Result<FinalizeOutcome, SessionError> {
        if self.state != SessionState::Confirmed {
            return Err(self.reject("finalize"));
        }
        match renderer.render(self) {
            Ok(()) => {
                self.state = SessionState::Finalized;
                self.revision += 1;
                tracing::info!(session = %self.id, "session finalized");
                Ok(FinalizeOutcome::Finalized)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "render failed; session stays confirmed");
                Ok(FinalizeOutcome::RetryableFailure { reason: e.to_string() })
            }
        }
    }

    /// Any non-Finalized state -> Rejected. Discards session-scoped work.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Finalized => Err(self.reject("cancel")),
            SessionState::Rejected => Ok(()),
            _ => {
                self.state = SessionState::Rejected;
                self.candidates.clear();
                self.clarifications.clear();
                self.corrections.clear();
                self.revision += 1;
                tracing::info!(session = %self.id, "session cancelled");
                Ok(())
            }
        }
    }
}
