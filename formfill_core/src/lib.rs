pub mod cfg;
pub mod error;

pub mod entity;
pub mod field;
pub mod lexicon;
pub mod spoken;
pub mod validate;
pub mod normalize;

pub mod score;
pub mod resolve;
pub mod decompose;
pub mod completeness;
pub mod engine;

pub use cfg::MappingCfg;
pub use error::{CfgError, SchemaError, ValueError};

pub use entity::{Entity, EntityId, NormalizedEntity, SourceSpan, TypeMatch, Validation, ValueType};
pub use field::{check_entities, check_schema, AddressPart, CharClass, Composite, FieldDescriptor, FieldId, FormatSpec, Multiplicity};
pub use lexicon::Lexicon;
pub use normalize::Normalizer;

pub use score::{MappingCandidate, ReasonCode, Scorer, Signals};
pub use resolve::{
    ClarificationId, ClarificationReason, ClarificationRequest, ClarificationSeq, ClarificationSubject,
    CorrectionOffer, FilledField, Locks, Provenance, Resolution, Resolver,
};
pub use decompose::{split_address, AddressParts};
pub use completeness::{evaluate, Completeness};
pub use engine::{MappingEngine, MappingPass};
