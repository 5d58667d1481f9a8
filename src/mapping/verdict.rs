use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Recyclability verdict for an object class.
///
/// The set is closed: anything outside these five labels is rejected at the
/// mapping boundary. Wire labels match the ones existing clients send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Recyclability {
    #[serde(rename = "Recyclable")]
    Recyclable,
    #[serde(rename = "Non-Recyclable")]
    NonRecyclable,
    #[serde(rename = "Compostable")]
    Compostable,
    #[serde(rename = "Special Handling")]
    SpecialHandling,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Recyclability {
    /// Every valid verdict, in presentation order.
    pub const ALL: [Recyclability; 5] = [
        Recyclability::Recyclable,
        Recyclability::NonRecyclable,
        Recyclability::Compostable,
        Recyclability::SpecialHandling,
        Recyclability::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Recyclability::Recyclable => "Recyclable",
            Recyclability::NonRecyclable => "Non-Recyclable",
            Recyclability::Compostable => "Compostable",
            Recyclability::SpecialHandling => "Special Handling",
            Recyclability::Unknown => "Unknown",
        }
    }

    /// Key used for this verdict inside a classification summary.
    pub fn summary_key(self) -> &'static str {
        match self {
            Recyclability::Recyclable => "recyclable",
            Recyclability::NonRecyclable => "non_recyclable",
            Recyclability::Compostable => "compostable",
            Recyclability::SpecialHandling => "special_handling",
            Recyclability::Unknown => "unknown",
        }
    }

    pub(crate) fn valid_labels() -> String {
        Self::ALL
            .iter()
            .map(|verdict| verdict.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Recyclability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Recyclability {
    type Err = ValidationError;

    /// Labels are matched exactly (surrounding whitespace aside).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Self::ALL
            .into_iter()
            .find(|verdict| verdict.as_str() == label)
            .ok_or_else(|| ValidationError {
                code: "INVALID_RECYCLABILITY",
                message: format!(
                    "Invalid recyclability category '{}'. Must be one of: {}",
                    label,
                    Self::valid_labels()
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for verdict in Recyclability::ALL {
            let parsed: Recyclability = verdict.as_str().parse().unwrap();
            assert_eq!(parsed, verdict);
        }
        let padded: Recyclability = "  Special Handling ".parse().unwrap();
        assert_eq!(padded, Recyclability::SpecialHandling);
    }

    #[test]
    fn rejects_labels_outside_the_enumeration() {
        let err = "InvalidCategory".parse::<Recyclability>().unwrap_err();
        assert_eq!(err.code, "INVALID_RECYCLABILITY");
        assert!(err.message.contains("Non-Recyclable"));

        assert!("recyclable".parse::<Recyclability>().is_err());
        assert!("Hazardous".parse::<Recyclability>().is_err());
        assert!("".parse::<Recyclability>().is_err());
    }

    #[test]
    fn serializes_with_wire_labels() {
        let json = serde_json::to_string(&Recyclability::NonRecyclable).unwrap();
        assert_eq!(json, r#""Non-Recyclable""#);
        let parsed: Recyclability = serde_json::from_str(r#""Special Handling""#).unwrap();
        assert_eq!(parsed, Recyclability::SpecialHandling);
    }
}
