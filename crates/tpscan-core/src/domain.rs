//! Structural domains detected in a structure and their comparison to known domains.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};
use tracing::warn;

/// Terpene-synthase fold types reported by the domain detector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum DomainType {
    Alpha,
    Beta,
    Gamma,
    Delta,
    Epsilon,
    AlphaWeird,
}

impl DomainType {
    /// Alpha domains can occur twice in a single structure (e.g. class-I bifunctional synthases).
    pub fn is_recurring(&self) -> bool {
        matches!(self, DomainType::Alpha)
    }
}

/// Maximum number of occurrences of a recurring domain type that carry a label.
const MAX_OCCURRENCES: u8 = 2;

/// A domain type with its occurrence number when the type recurs.
///
/// Labels are the keys of a classifier's domain layout: `alpha1`, `alpha2`, `beta`, `gamma`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainLabel {
    domain: DomainType,
    occurrence: Option<u8>,
}

impl DomainLabel {
    pub fn single(domain: DomainType) -> Self {
        Self {
            domain,
            occurrence: None,
        }
    }
    pub fn occurrence(domain: DomainType, occurrence: u8) -> Self {
        Self {
            domain,
            occurrence: Some(occurrence),
        }
    }
    pub fn domain(&self) -> DomainType {
        self.domain
    }
}

impl fmt::Display for DomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.occurrence {
            Some(n) => write!(f, "{}{}", self.domain, n),
            None => write!(f, "{}", self.domain),
        }
    }
}

impl FromStr for DomainLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(domain) = DomainType::from_str(s) {
            if !domain.is_recurring() {
                return Ok(Self::single(domain));
            }
            return Err(format!(
                "`{s}` recurs and needs an occurrence number (e.g. `{s}1`)"
            ));
        }
        let Some((split, _)) = s.char_indices().last() else {
            return Err("empty domain label".to_string());
        };
        let (prefix, digit) = s.split_at(split);
        let occurrence: u8 = digit
            .parse()
            .map_err(|_| format!("unknown domain label `{s}`"))?;
        let domain =
            DomainType::from_str(prefix).map_err(|_| format!("unknown domain label `{s}`"))?;
        if !domain.is_recurring() || occurrence == 0 || occurrence > MAX_OCCURRENCES {
            return Err(format!("unknown domain label `{s}`"));
        }
        Ok(Self::occurrence(domain, occurrence))
    }
}

/// One domain detected in a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectedDomain {
    pub domain_type: DomainType,
    pub module_id: String,
}

/// Structure id -> detected domains, in detection order.
pub type DomainDetections = HashMap<String, Vec<DetectedDomain>>;

/// Known module id -> similarity score in [0, 1].
pub type KnownScores = HashMap<String, f32>;

/// Structure id -> detected module id -> known module id -> similarity.
pub type DomainComparison = HashMap<String, HashMap<String, KnownScores>>;

/// Assign layout labels to the detected domains of one structure.
///
/// Recurring domain types get `1` for their first occurrence and `2` for the second.
/// Further occurrences are dropped with a warning.
pub fn label_domains<'a>(
    structure_id: &str,
    domains: &'a [DetectedDomain],
) -> Vec<(DomainLabel, &'a DetectedDomain)> {
    let mut seen: HashMap<DomainType, u8> = HashMap::new();
    let mut labelled = Vec::with_capacity(domains.len());
    for domain in domains {
        let kind = domain.domain_type;
        if !kind.is_recurring() {
            labelled.push((DomainLabel::single(kind), domain));
            continue;
        }
        let count = seen.entry(kind).or_insert(0);
        *count += 1;
        if *count > MAX_OCCURRENCES {
            warn!(
                structure_id,
                module_id = %domain.module_id,
                domain = %kind,
                "more than {MAX_OCCURRENCES} {kind} domains detected, ignoring this one"
            );
            continue;
        }
        labelled.push((DomainLabel::occurrence(kind, *count), domain));
    }
    labelled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(kind: DomainType, id: &str) -> DetectedDomain {
        DetectedDomain {
            domain_type: kind,
            module_id: id.to_string(),
        }
    }

    #[test]
    fn test_label_roundtrip() {
        for label in ["alpha1", "alpha2", "beta", "gamma", "delta", "epsilon", "alphaWeird"] {
            let parsed: DomainLabel = label.parse().unwrap();
            assert_eq!(parsed.to_string(), label);
        }
    }

    #[test]
    fn test_label_rejects_unknown() {
        assert!("alpha".parse::<DomainLabel>().is_err());
        assert!("alpha3".parse::<DomainLabel>().is_err());
        assert!("alpha0".parse::<DomainLabel>().is_err());
        assert!("beta1".parse::<DomainLabel>().is_err());
        assert!("zeta".parse::<DomainLabel>().is_err());
        assert!("".parse::<DomainLabel>().is_err());
    }

    #[test]
    fn test_alpha_disambiguation() {
        let domains = vec![
            detected(DomainType::Alpha, "m0"),
            detected(DomainType::Beta, "m1"),
            detected(DomainType::Alpha, "m2"),
        ];
        let labels: Vec<String> = label_domains("P1", &domains)
            .iter()
            .map(|(label, d)| format!("{}:{}", label, d.module_id))
            .collect();
        assert_eq!(labels, vec!["alpha1:m0", "beta:m1", "alpha2:m2"]);
    }

    #[test]
    fn test_third_alpha_is_dropped() {
        let domains = vec![
            detected(DomainType::Alpha, "m0"),
            detected(DomainType::Alpha, "m1"),
            detected(DomainType::Alpha, "m2"),
        ];
        let labels = label_domains("P1", &domains);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].1.module_id, "m1");
    }

    #[test]
    fn test_detected_domain_json() {
        let d: DetectedDomain =
            serde_json::from_str(r#"{"domain_type": "alphaWeird", "module_id": "x_1"}"#).unwrap();
        assert_eq!(d.domain_type, DomainType::AlphaWeird);
        let err = serde_json::from_str::<DetectedDomain>(
            r#"{"domain_type": "alpha", "module_id": "x", "extra": 1}"#,
        );
        assert!(err.is_err());
    }
}
