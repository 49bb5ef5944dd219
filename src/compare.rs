use std::collections::BTreeMap;

/// Normalized configuration text keyed by pod name.
///
/// Sorted by pod name, so the reported mismatch is stable for a given set of pods.
pub type ConfigurationMap = BTreeMap<String, String>;

/// Result of comparing the configuration of all pods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftVerdict {
    NoDrift,
    /// `first` and `second` name two pods whose configurations differ.
    Drift {
        first: String,
        second: String,
    },
}

impl DriftVerdict {
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::Drift { .. })
    }

    /// Converts a detected drift into an error.
    pub fn into_result(self) -> Result<(), DriftDetected> {
        match self {
            Self::NoDrift => Ok(()),
            Self::Drift { first, second } => Err(DriftDetected { first, second }),
        }
    }
}

/// Two pods of the same workload have different configurations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{first} has a different configuration than {second}")]
pub struct DriftDetected {
    pub first: String,
    pub second: String,
}

/// Checks that every pod has the same configuration.
///
/// Equality is transitive, so comparing every entry against the first one
/// finds a mismatch whenever any pair differs.
pub fn compare(configs: &ConfigurationMap) -> DriftVerdict {
    let mut entries = configs.iter();
    let Some((reference_pod, reference)) = entries.next() else {
        return DriftVerdict::NoDrift;
    };

    entries
        .find(|(_, config)| *config != reference)
        .map_or(DriftVerdict::NoDrift, |(pod, _)| DriftVerdict::Drift {
            first: reference_pod.clone(),
            second: pod.clone(),
        })
}
