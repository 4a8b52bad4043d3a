//! Address decomposition: one logical address entity fanning out to the
//! street / city / state / pincode slots of a composite group.
//!
//! This runs after the generic resolver pass and only considers address
//! entities the resolver left unmatched.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cfg::MappingCfg;
use crate::entity::NormalizedEntity;
use crate::field::{AddressPart, FieldDescriptor};
use crate::lexicon::Lexicon;
use crate::resolve::{
    ClarificationReason, ClarificationRequest, ClarificationSeq, ClarificationSubject, FilledField, Locks, Provenance,
    Resolution,
};
use crate::score::round4;
use crate::validate;

const STATES: &[&str] = &[
    "andhra pradesh", "arunachal pradesh", "assam", "bihar", "chhattisgarh", "goa", "gujarat", "haryana",
    "himachal pradesh", "jharkhand", "karnataka", "kerala", "madhya pradesh", "maharashtra", "manipur",
    "meghalaya", "mizoram", "nagaland", "odisha", "punjab", "rajasthan", "sikkim", "tamil nadu", "telangana",
    "tripura", "uttar pradesh", "uttarakhand", "west bengal", "andaman and nicobar islands", "chandigarh",
    "dadra and nagar haveli and daman and diu", "delhi", "jammu and kashmir", "ladakh", "lakshadweep",
    "puducherry",
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

impl AddressParts {
    pub fn get(&self, part: AddressPart) -> Option<&str> {
        match part {
            AddressPart::Street => self.street.as_deref(),
            AddressPart::City => self.city.as_deref(),
            AddressPart::State => self.state.as_deref(),
            AddressPart::Pincode => self.pincode.as_deref(),
        }
    }
}

fn pincode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[1-9][0-9]{5}\b").expect("pincode pattern compiles"))
}

/// Split a free-form Indian address on commas.
///
/// "12 MG Road, Indiranagar, Bengaluru, Karnataka 560038" ->
/// street "12 MG Road, Indiranagar", city "Bengaluru", state "Karnataka", pincode "560038".
pub fn split_address(text: &str) -> AddressParts {
    let mut parts = AddressParts::default();

    let mut rest = text.to_string();
    if let Some(m) = pincode_re().find(text) {
        parts.pincode = Some(m.as_str().to_string());
        rest.replace_range(m.range(), "");
    }

    let mut segments: Vec<String> = rest
        .split(',')
        .map(validate::collapse_whitespace)
        .map(|s| s.trim_matches(|c: char| c == '-' || c.is_whitespace()).to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let state_idx = segments
        .iter()
        .rposition(|s| STATES.contains(&s.to_lowercase().as_str()));
    if let Some(i) = state_idx {
        parts.state = Some(segments.remove(i));
        if i > 0 && segments.len() > 1 {
            parts.city = Some(segments.remove(i - 1));
        }
    }
    if parts.city.is_none() && segments.len() >= 2 {
        parts.city = segments.pop();
    }
    if !segments.is_empty() {
        parts.street = Some(segments.join(", "));
    }
    parts
}

/// Fill every unlocked slot of `group` from `entity`.
pub fn fill_group(
    entity: &NormalizedEntity,
    group: &[&FieldDescriptor],
    provenance: &Provenance,
    confidence: f32,
    locks: &Locks,
) -> Vec<FilledField> {
    let parts = split_address(&entity.value);
    let mut out = Vec::new();
    for field in group {
        if locks.fields.contains(&field.id) {
            continue;
        }
        let Some(part) = field.composite.as_ref().map(|c| c.part) else { continue };
        let Some(raw) = parts.get(part) else { continue };

        let checked = match part {
            AddressPart::Pincode => validate::pincode(raw),
            _ => validate::non_empty(part.value_type(), raw),
        }
        .and_then(|v| field.check_format(&v).map(|_| v));

        let filled = match checked {
            Ok(value) => FilledField {
                field_id: field.id.clone(),
                value,
                confidence,
                provenance: provenance.clone(),
                validated: true,
                issue: None,
            },
            Err(e) => FilledField {
                field_id: field.id.clone(),
                value: raw.to_string(),
                confidence,
                provenance: provenance.clone(),
                validated: false,
                issue: Some(e),
            },
        };
        out.push(filled);
    }
    out
}

/// Composite groups in form order: group name -> its slots.
pub fn composite_groups(fields: &[FieldDescriptor]) -> Vec<(String, Vec<&FieldDescriptor>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<&FieldDescriptor>> = BTreeMap::new();
    for f in fields.iter().filter(|f| f.is_composite()) {
        let Some(c) = &f.composite else { continue };
        if !groups.contains_key(&c.group) {
            order.push(c.group.clone());
        }
        groups.entry(c.group.clone()).or_default().push(f);
    }
    order
        .into_iter()
        .filter_map(|g| groups.remove(&g).map(|fs| (g, fs)))
        .collect()
}

/// Match unmatched address entities to composite groups and fan them out.
pub fn decompose(
    res: &mut Resolution,
    entities: &[NormalizedEntity],
    fields: &[FieldDescriptor],
    locks: &Locks,
    cfg: &MappingCfg,
    lexicon: &Lexicon,
    seq: &mut ClarificationSeq,
) {
    let groups = composite_groups(fields);
    if groups.is_empty() {
        return;
    }

    for (group, slots) in &groups {
        let open: Vec<&FieldDescriptor> = slots
            .iter()
            .copied()
            .filter(|f| !locks.fields.contains(&f.id) && !res.filled.contains_key(&f.id))
            .collect();
        if open.is_empty() {
            continue;
        }

        let pool: Vec<&NormalizedEntity> = entities
            .iter()
            .filter(|e| e.entity.kind.is_address() && e.validated())
            .filter(|e| res.unmatched.iter().any(|u| u == e.id()))
            .collect();
        if pool.is_empty() {
            continue;
        }

        let group_labels: Vec<String> = slots.iter().flat_map(|f| f.label_tokens.iter().cloned()).collect();
        let labels = lexicon.label_tokens(&group_labels);
        let mut scored: Vec<(f32, &NormalizedEntity)> = pool
            .iter()
            .map(|e| {
                let hints = lexicon.label_tokens(&e.entity.label_hints);
                (group_score(lexicon, cfg, &hints, &labels), *e)
            })
            .collect();
        // Stable: equal scores keep utterance order.
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.entity.utterance_index.cmp(&b.1.entity.utterance_index))
        });

        let top = scored[0].0;
        if top < cfg.min_consider {
            continue;
        }
        let tied: Vec<&NormalizedEntity> = scored
            .iter()
            .filter(|(s, _)| top - *s < cfg.ambiguity_margin)
            .map(|(_, e)| *e)
            .collect();

        if tied.len() > 1 || top < cfg.confident {
            let reason = if tied.len() > 1 {
                ClarificationReason::Ambiguous
            } else {
                ClarificationReason::LowConfidence
            };
            res.clarifications.push(ClarificationRequest {
                id: seq.next_id(),
                subject: ClarificationSubject::Field {
                    field_id: open[0].id.clone(),
                    competing_entities: tied.iter().map(|e| e.id().to_string()).collect(),
                },
                reason,
                top_score: top,
            });
            res.unmatched.retain(|u| !tied.iter().any(|e| e.id() == u.as_str()));
            tracing::debug!(group = %group, entities = tied.len(), ?reason, "composite group needs the user");
            continue;
        }

        let chosen = tied[0];
        let provenance = Provenance::Entity {
            entity_id: chosen.id().to_string(),
        };
        let confidence = top.min(chosen.entity.confidence);
        for filled in fill_group(chosen, &open, &provenance, confidence, locks) {
            res.filled.insert(filled.field_id.clone(), filled);
        }
        res.unmatched.retain(|u| u != chosen.id());
        tracing::debug!(group = %group, entity = %chosen.id(), "address decomposed");
    }
}

/// Address type plus, when the entity carries hints, how much of its speech
/// context points at this group. Weights follow the scorer's.
fn group_score(lexicon: &Lexicon, cfg: &MappingCfg, hints: &[String], labels: &[String]) -> f32 {
    if hints.is_empty() || labels.is_empty() {
        return 1.0;
    }
    let mut sum = 0.0;
    for h in hints {
        let best = labels
            .iter()
            .map(|l| {
                if h == l {
                    1.0
                } else if lexicon.synonyms(h, l) {
                    cfg.synonym_credit
                } else {
                    0.0
                }
            })
            .fold(0.0_f32, f32::max);
        sum += best;
    }
    let label = sum / hints.len() as f32;
    let den = cfg.w_type + cfg.w_label;
    if den <= 0.0 {
        return 0.0;
    }
    round4((cfg.w_type + cfg.w_label * label) / den)
}
