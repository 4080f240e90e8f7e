//! Categorical label sets for the advisor (X) and client (Y) targets
//!
//! Tags are the corpus vocabulary and are stored verbatim, so they keep
//! their annotated spelling (`REFLET_ACQ`, `CLIENT_POSITIF`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prediction emitted when a remote model could not produce a usable label
pub const UNRECOGNIZED_LABEL: &str = "AUTRE_NON_RECONNU";

/// Advisor strategy tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvisorTag {
    #[serde(rename = "ENGAGEMENT")]
    Engagement,
    #[serde(rename = "OUVERTURE")]
    Ouverture,
    #[serde(rename = "REFLET_VOUS")]
    RefletVous,
    #[serde(rename = "REFLET_JE")]
    RefletJe,
    #[serde(rename = "REFLET_ACQ")]
    RefletAcq,
    #[serde(rename = "EXPLICATION")]
    Explication,
    #[serde(rename = "AUTRE_NON_RECONNU")]
    Unrecognized,
}

impl AdvisorTag {
    /// Default priority order: commitment > directive > reflections > explanation
    pub const PRIORITY: [AdvisorTag; 6] = [
        AdvisorTag::Engagement,
        AdvisorTag::Ouverture,
        AdvisorTag::RefletVous,
        AdvisorTag::RefletJe,
        AdvisorTag::RefletAcq,
        AdvisorTag::Explication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisorTag::Engagement => "ENGAGEMENT",
            AdvisorTag::Ouverture => "OUVERTURE",
            AdvisorTag::RefletVous => "REFLET_VOUS",
            AdvisorTag::RefletJe => "REFLET_JE",
            AdvisorTag::RefletAcq => "REFLET_ACQ",
            AdvisorTag::Explication => "EXPLICATION",
            AdvisorTag::Unrecognized => UNRECOGNIZED_LABEL,
        }
    }

    /// Coarse family (REFLET_* collapse to REFLET)
    pub fn family(&self) -> &'static str {
        match self {
            AdvisorTag::Engagement => "ENGAGEMENT",
            AdvisorTag::Ouverture => "OUVERTURE",
            AdvisorTag::RefletVous | AdvisorTag::RefletJe | AdvisorTag::RefletAcq => "REFLET",
            AdvisorTag::Explication => "EXPLICATION",
            AdvisorTag::Unrecognized => "AUTRE",
        }
    }

    pub fn parse(raw: &str) -> Option<AdvisorTag> {
        match normalize_label(raw).as_str() {
            "ENGAGEMENT" => Some(AdvisorTag::Engagement),
            "OUVERTURE" => Some(AdvisorTag::Ouverture),
            "REFLET_VOUS" => Some(AdvisorTag::RefletVous),
            "REFLET_JE" => Some(AdvisorTag::RefletJe),
            "REFLET_ACQ" => Some(AdvisorTag::RefletAcq),
            "EXPLICATION" => Some(AdvisorTag::Explication),
            UNRECOGNIZED_LABEL => Some(AdvisorTag::Unrecognized),
            _ => None,
        }
    }
}

impl fmt::Display for AdvisorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client reaction tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientTag {
    #[serde(rename = "CLIENT_POSITIF")]
    Positif,
    #[serde(rename = "CLIENT_NEGATIF")]
    Negatif,
    #[serde(rename = "CLIENT_NEUTRE")]
    Neutre,
    #[serde(rename = "CLIENT_QUESTION")]
    Question,
    #[serde(rename = "CLIENT_SILENCE")]
    Silence,
    #[serde(rename = "AUTRE_Y")]
    AutreY,
}

impl ClientTag {
    pub const ALL: [ClientTag; 6] = [
        ClientTag::Positif,
        ClientTag::Negatif,
        ClientTag::Neutre,
        ClientTag::Question,
        ClientTag::Silence,
        ClientTag::AutreY,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientTag::Positif => "CLIENT_POSITIF",
            ClientTag::Negatif => "CLIENT_NEGATIF",
            ClientTag::Neutre => "CLIENT_NEUTRE",
            ClientTag::Question => "CLIENT_QUESTION",
            ClientTag::Silence => "CLIENT_SILENCE",
            ClientTag::AutreY => "AUTRE_Y",
        }
    }

    /// Parse a client tag, accepting the POS/NEG/NEU aliases
    pub fn parse(raw: &str) -> Option<ClientTag> {
        match normalize_label(raw).as_str() {
            "CLIENT_POSITIF" | "POS" | "POSITIF" => Some(ClientTag::Positif),
            "CLIENT_NEGATIF" | "NEG" | "NEGATIF" => Some(ClientTag::Negatif),
            "CLIENT_NEUTRE" | "NEU" | "NEUTRE" => Some(ClientTag::Neutre),
            "CLIENT_QUESTION" => Some(ClientTag::Question),
            "CLIENT_SILENCE" => Some(ClientTag::Silence),
            "AUTRE_Y" => Some(ClientTag::AutreY),
            _ => None,
        }
    }
}

impl fmt::Display for ClientTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-case and replace whitespace runs with `_`
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Canonical gold advisor label (unknown tags count as EXPLICATION)
pub fn canonical_advisor_label(raw: &str) -> String {
    match AdvisorTag::parse(raw) {
        Some(AdvisorTag::Unrecognized) | None => AdvisorTag::Explication.as_str().to_string(),
        Some(tag) => tag.as_str().to_string(),
    }
}

/// Canonical gold client label (POS/NEG/NEU aliases; unknown → CLIENT_NEUTRE)
pub fn canonical_client_label(raw: &str) -> String {
    ClientTag::parse(raw)
        .unwrap_or(ClientTag::Neutre)
        .as_str()
        .to_string()
}

/// Whether `raw` is an advisor strategy a corpus row can be scored against
pub fn is_advisor_gold(raw: &str) -> bool {
    matches!(AdvisorTag::parse(raw), Some(tag) if tag != AdvisorTag::Unrecognized)
}

/// Whether `raw` is a client reaction a corpus row can be scored against
pub fn is_client_gold(raw: &str) -> bool {
    ClientTag::parse(raw).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  reflet  acq "), "REFLET_ACQ");
        assert_eq!(normalize_label("Client Positif"), "CLIENT_POSITIF");
    }

    #[test]
    fn test_canonical_advisor_defaults_to_explication() {
        assert_eq!(canonical_advisor_label("engagement"), "ENGAGEMENT");
        assert_eq!(canonical_advisor_label("reflet vous"), "REFLET_VOUS");
        assert_eq!(canonical_advisor_label("???"), "EXPLICATION");
        assert_eq!(canonical_advisor_label(UNRECOGNIZED_LABEL), "EXPLICATION");
    }

    #[test]
    fn test_canonical_client_aliases() {
        assert_eq!(canonical_client_label("POS"), "CLIENT_POSITIF");
        assert_eq!(canonical_client_label("client negatif"), "CLIENT_NEGATIF");
        assert_eq!(canonical_client_label("neu"), "CLIENT_NEUTRE");
        assert_eq!(canonical_client_label(""), "CLIENT_NEUTRE");
    }

    #[test]
    fn test_gold_recognition() {
        assert!(is_advisor_gold("reflet acq"));
        assert!(!is_advisor_gold(""));
        assert!(!is_advisor_gold(UNRECOGNIZED_LABEL));
        assert!(!is_advisor_gold("CLIENT_POSITIF"));

        assert!(is_client_gold("neg"));
        assert!(is_client_gold("CLIENT_SILENCE"));
        assert!(!is_client_gold("  "));
        assert!(!is_client_gold("ENGAGEMENT"));
    }

    #[test]
    fn test_family_collapses_reflections() {
        assert_eq!(AdvisorTag::RefletAcq.family(), "REFLET");
        assert_eq!(AdvisorTag::RefletVous.family(), "REFLET");
        assert_eq!(AdvisorTag::Ouverture.family(), "OUVERTURE");
    }

    #[test]
    fn test_priority_order_is_fixed() {
        assert_eq!(AdvisorTag::PRIORITY[0], AdvisorTag::Engagement);
        assert_eq!(AdvisorTag::PRIORITY[1], AdvisorTag::Ouverture);
        assert_eq!(AdvisorTag::PRIORITY[5], AdvisorTag::Explication);
    }
}
