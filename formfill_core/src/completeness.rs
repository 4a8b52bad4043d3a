use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cfg::MappingCfg;
use crate::field::{FieldDescriptor, FieldId};
use crate::resolve::{ClarificationRequest, FilledField};

/// Per-form completeness, recomputed after every successful resolution or edit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    /// filled required / total required; 1.0 when nothing is required.
    pub ratio: f32,
    pub filled_required: usize,
    pub total_required: usize,
    /// Required, empty, and not named by any pending clarification.
    pub unresolved_required: Vec<FieldId>,
    /// Committed below the low-confidence threshold. Advisory.
    pub low_confidence: Vec<FieldId>,
    /// Committed but failed validation. Advisory unless `block_on_invalid`.
    pub invalid: Vec<FieldId>,
    pub pending_clarifications: usize,
}

impl Completeness {
    /// Nothing outstanding stands between the form and confirmation.
    pub fn ready(&self, cfg: &MappingCfg) -> bool {
        self.unresolved_required.is_empty()
            && self.pending_clarifications == 0
            && (!cfg.block_on_invalid || self.invalid.is_empty())
    }
}

pub fn evaluate(
    fields: &[FieldDescriptor],
    filled: &BTreeMap<FieldId, FilledField>,
    clarifications: &[ClarificationRequest],
    cfg: &MappingCfg,
) -> Completeness {
    let mut c = Completeness {
        pending_clarifications: clarifications.len(),
        ..Completeness::default()
    };

    // Form order, not id order.
    for f in fields {
        match filled.get(&f.id) {
            Some(ff) => {
                if f.required {
                    c.filled_required += 1;
                }
                if ff.confidence < cfg.low_confidence {
                    c.low_confidence.push(f.id.clone());
                }
                if !ff.validated {
                    c.invalid.push(f.id.clone());
                }
            }
            None if f.required => {
                if !clarifications.iter().any(|cr| cr.names_field(&f.id)) {
                    c.unresolved_required.push(f.id.clone());
                }
            }
            None => {}
        }
        if f.required {
            c.total_required += 1;
        }
    }

    c.ratio = if c.total_required == 0 {
        1.0
    } else {
        c.filled_required as f32 / c.total_required as f32
    };
    c
}
