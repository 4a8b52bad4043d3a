use serde::{Deserialize, Serialize};

use crate::error::CfgError;

/// Tunable weights and thresholds for scoring and resolution.
///
/// Every field has a default; partial JSON overrides are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingCfg {
    /// Weight of the type-compatibility signal.
    pub w_type: f32,
    /// Weight of the label-similarity signal.
    pub w_label: f32,
    /// Weight of the reading-order context signal.
    pub w_context: f32,

    /// Type credit for a compatible supertype (generic address vs permanent address).
    pub supertype_credit: f32,
    /// Label credit for tokens in the same synonym group ("mobile" ~ "phone").
    pub synonym_credit: f32,
    /// Label credit for tokens sharing a prefix of at least four characters.
    pub prefix_credit: f32,

    /// Score at or above which a unique candidate is committed.
    pub confident: f32,
    /// Score gap below which two candidates are indistinguishable.
    pub ambiguity_margin: f32,
    /// Score below which a candidate is not worth asking about.
    pub min_consider: f32,
    /// Committed fields under this confidence are surfaced for review.
    pub low_confidence: f32,

    /// When set, committed fields that failed validation block confirmation.
    pub block_on_invalid: bool,
}

impl Default for MappingCfg {
    fn default() -> Self {
        Self {
            w_type: 0.5,
            w_label: 0.3,
            w_context: 0.2,
            supertype_credit: 0.5,
            synonym_credit: 0.8,
            prefix_credit: 0.5,
            confident: 0.80,
            ambiguity_margin: 0.10,
            min_consider: 0.40,
            low_confidence: 0.80,
            block_on_invalid: false,
        }
    }
}

impl MappingCfg {
    /// Parse overrides from JSON and validate the result.
    pub fn from_json(s: &str) -> Result<Self, CfgError> {
        let cfg: MappingCfg = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CfgError> {
        let unit = [
            ("supertype_credit", self.supertype_credit),
            ("synonym_credit", self.synonym_credit),
            ("prefix_credit", self.prefix_credit),
            ("confident", self.confident),
            ("ambiguity_margin", self.ambiguity_margin),
            ("min_consider", self.min_consider),
            ("low_confidence", self.low_confidence),
        ];
        for (name, value) in unit {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(CfgError::OutOfUnitRange { name, value });
            }
        }

        let weights = [self.w_type, self.w_label, self.w_context];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f32>() <= 0.0 {
            return Err(CfgError::Weights);
        }
        // Type compatibility is the hard filter; it must carry weight.
        if self.w_type <= 0.0 {
            return Err(CfgError::Weights);
        }

        if self.min_consider > self.confident {
            return Err(CfgError::ThresholdOrder {
                min: self.min_consider,
                confident: self.confident,
            });
        }
        Ok(())
    }
}
