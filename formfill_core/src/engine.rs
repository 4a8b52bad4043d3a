//! One mapping pass: score, resolve, then decompose composite addresses.

use crate::cfg::MappingCfg;
use crate::decompose::decompose;
use crate::entity::NormalizedEntity;
use crate::field::FieldDescriptor;
use crate::lexicon::Lexicon;
use crate::resolve::{ClarificationSeq, Locks, Resolution, Resolver};
use crate::score::{MappingCandidate, Scorer};

/// Output of one mapping pass.
#[derive(Clone, Debug, Default)]
pub struct MappingPass {
    pub candidates: Vec<MappingCandidate>,
    pub resolution: Resolution,
}

/// Read-only tuning and lexicon shared by every session it serves.
#[derive(Clone, Debug)]
pub struct MappingEngine {
    cfg: MappingCfg,
    lexicon: Lexicon,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new(MappingCfg::default(), Lexicon::default_en())
    }
}

impl MappingEngine {
    pub fn new(cfg: MappingCfg, lexicon: Lexicon) -> Self {
        Self { cfg, lexicon }
    }

    pub fn cfg(&self) -> &MappingCfg {
        &self.cfg
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn score(&self, entities: &[NormalizedEntity], fields: &[FieldDescriptor]) -> Vec<MappingCandidate> {
        Scorer::new(&self.cfg, &self.lexicon).score(entities, fields)
    }

    /// Score, resolve and decompose. Locked fields and entities are untouched.
    pub fn map(
        &self,
        entities: &[NormalizedEntity],
        fields: &[FieldDescriptor],
        locks: &Locks,
        seq: &mut ClarificationSeq,
    ) -> MappingPass {
        let candidates = self.score(entities, fields);
        let mut resolution = Resolver::new(&self.cfg).resolve(&candidates, entities, fields, locks, seq);
        decompose(&mut resolution, entities, fields, locks, &self.cfg, &self.lexicon, seq);
        MappingPass { candidates, resolution }
    }
}
