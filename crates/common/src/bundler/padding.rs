use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diagnosis_key::{interval_number, DiagnosisKey, KeyError, INTERVALS_PER_DAY, KEY_LENGTH};

use super::Window;

/// How many synthetic keys a published bucket is topped up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaddingPolicy {
    None,
    /// Pad every bucket up to at least `count` keys.
    MinimumCount { count: usize },
    /// Pad every bucket up to the next multiple of `multiple` keys.
    RoundUp { multiple: usize },
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        PaddingPolicy::MinimumCount { count: 0 }
    }
}

impl PaddingPolicy {
    /// Whether the policy never adds a key.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            PaddingPolicy::None
                | PaddingPolicy::MinimumCount { count: 0 }
                | PaddingPolicy::RoundUp { multiple: 0 | 1 }
        )
    }

    /// Total bucket size after padding `real` keys.
    pub fn target(&self, real: usize) -> usize {
        match *self {
            PaddingPolicy::None => real,
            PaddingPolicy::MinimumCount { count } => real.max(count),
            PaddingPolicy::RoundUp { multiple } if multiple > 1 => real.div_ceil(multiple) * multiple,
            PaddingPolicy::RoundUp { .. } => real,
        }
    }
}

/// Derives padding keys from a secret seed and the bucket identity, so
/// repeated runs over the same input produce byte-identical exports. Without
/// the seed the padding is indistinguishable from real keys.
pub(crate) struct PaddingGenerator<'a> {
    policy: PaddingPolicy,
    seed: &'a [u8],
    transmission_risk_level: i32,
}

impl<'a> PaddingGenerator<'a> {
    pub fn new(policy: PaddingPolicy, seed: &'a [u8], transmission_risk_level: i32) -> Self {
        Self {
            policy,
            seed,
            transmission_risk_level,
        }
    }

    pub fn padding_for(
        &self,
        package: &str,
        window: &Window,
        real: usize,
    ) -> Result<Vec<DiagnosisKey>, KeyError> {
        let missing = self.policy.target(real).saturating_sub(real);
        let start = interval_number(window.start());
        let label = window.label();

        (0..missing as u32)
            .map(|index| {
                let mut hasher = Sha256::new();
                hasher.update(self.seed);
                hasher.update(package.as_bytes());
                hasher.update([0]);
                hasher.update(label.as_bytes());
                hasher.update([0]);
                hasher.update(index.to_be_bytes());
                let digest = hasher.finalize();

                let mut key_data = [0u8; KEY_LENGTH];
                key_data.copy_from_slice(&digest[..KEY_LENGTH]);
                DiagnosisKey::new(
                    key_data,
                    start,
                    INTERVALS_PER_DAY,
                    self.transmission_risk_level,
                    package,
                )
            })
            .collect()
    }
}
