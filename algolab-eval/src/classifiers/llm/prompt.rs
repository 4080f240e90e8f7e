//! Prompts, reply parsing and post-hoc override rules

use super::transport::ChatMessage;
use crate::labels::AdvisorTag;
use serde::Deserialize;

/// Placeholder for a missing context turn
pub const MISSING_TURN: &str = "—";

/// Labels the model may answer with, in priority order
pub fn label_set() -> Vec<String> {
    AdvisorTag::PRIORITY
        .iter()
        .chain(std::iter::once(&AdvisorTag::Unrecognized))
        .map(|t| t.as_str().to_string())
        .collect()
}

const SINGLE_SYSTEM_PROMPT: &str = "\
Tu es un expert en classification des stratégies linguistiques des conseillers en centre de contact.

HIÉRARCHIE DE PRIORITÉ : 1. ENGAGEMENT > 2. OUVERTURE > 3. REFLET > 4. EXPLICATION
Si plusieurs fonctions coexistent, choisis toujours la plus haute.

ENGAGEMENT : le conseiller annonce une action qu'il réalise (\"je vais/fais/vérifie/transfère/m'occupe\", \"je suis en train de\", futur 1re personne).
OUVERTURE : le conseiller oriente le client vers une action (\"vous allez/recevrez/pourrez/devrez\", impératifs, \"veuillez\", \"il faut que vous\").
REFLET_VOUS : description de ce que le client a fait ou dit, sans instruction ni justification.
REFLET_JE : état mental du conseiller (\"je comprends/vois/entends\").
REFLET_ACQ : micro-tour d'acquiescement de 20 caractères au plus (\"oui\", \"d'accord\", \"ok\").
EXPLICATION : justification ou procédure sans action concrète (\"parce que\", \"notre politique\", \"le système fonctionne\").

Départage : une action présente l'emporte sur un acquiescement initial ; une instruction l'emporte sur une justification ; des montants ou chiffres excluent REFLET.
Réponds par un JSON {\"label\": \"...\"}.";

const CONTEXTUAL_SYSTEM_PROMPT: &str = "\
Tu es un classificateur déterministe de tours CONSEILLER dans des conversations de centre d'appels.
Classe le tour T0 (conseiller) en tenant compte du contexte T-2 et T-1.

Priorité stricte si plusieurs fonctions coexistent dans T0 :
ENGAGEMENT > OUVERTURE > REFLET_VOUS > REFLET_JE > REFLET_ACQ > EXPLICATION > AUTRE_NON_RECONNU

ENGAGEMENT : action concrète du conseiller (\"je vais/fais/vérifie/transfère/m'occupe de\").
OUVERTURE : directive vers le client (\"vous allez/devez/pouvez/veuillez/il faut que vous\").
REFLET_VOUS : description de l'action ou de l'état du client, sans directive.
REFLET_JE : état cognitif du conseiller (\"je comprends/vois/entends\"), sans action.
REFLET_ACQ : acquiescement court (\"oui\", \"d'accord\", \"ok\", 20 caractères au plus).
EXPLICATION : procédure ou justification (\"parce que\", \"c'est normal\", \"le système\", \"notre politique\").
AUTRE_NON_RECONNU : cas non classifiables.

Utilise T-2/T-1 pour désambiguïser les cas limites.
Réponds par un JSON {\"label\": \"...\"} avec exactement un des labels ci-dessus.";

const SINGLE_FEW_SHOTS: &[(&str, AdvisorTag)] = &[
    ("D'accord, je vais faire le nécessaire", AdvisorTag::Engagement),
    (
        "Vous pouvez aller sur le site parce que c'est plus rapide",
        AdvisorTag::Ouverture,
    ),
    ("Je comprends, mais je vais vérifier", AdvisorTag::Engagement),
    ("Je vois que vous avez déjà appelé hier", AdvisorTag::RefletVous),
    ("Je vois que vous avez reçu 1504,29 €", AdvisorTag::Explication),
    ("Il faut bien préciser l'heure et la station", AdvisorTag::Ouverture),
];

const CONTEXTUAL_FEW_SHOTS: &[(&str, AdvisorTag)] = &[
    (
        "T-2: client: j'ai essayé hier mais ça n'a pas marché\nT-1: conseiller: je comprends votre frustration\nT0: d'accord, je vais vérifier votre dossier maintenant",
        AdvisorTag::Engagement,
    ),
    (
        "T-2: —\nT-1: client: comment je dois faire exactement ?\nT0: vous allez recevoir un email dans quelques minutes, cliquez sur le lien",
        AdvisorTag::Ouverture,
    ),
    (
        "T-2: client: d'accord\nT-1: conseiller: très bien\nT0: oui",
        AdvisorTag::RefletAcq,
    ),
    (
        "T-2: —\nT-1: client: pourquoi ça ne marche pas ?\nT0: notre système fonctionne en trois étapes distinctes",
        AdvisorTag::Explication,
    ),
];

fn label_json(tag: AdvisorTag) -> String {
    format!("{{\"label\": \"{}\"}}", tag.as_str())
}

fn with_shots(system: &str, shots: &[(&str, AdvisorTag)], instance: String) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(shots.len() * 2 + 2);
    messages.push(ChatMessage::system(system));
    for (input, tag) in shots {
        messages.push(ChatMessage::user(*input));
        messages.push(ChatMessage::assistant(label_json(*tag)));
    }
    messages.push(ChatMessage::user(instance));
    messages
}

/// Messages for a single advisor turn
pub fn single_turn_messages(verbatim: &str) -> Vec<ChatMessage> {
    with_shots(SINGLE_SYSTEM_PROMPT, SINGLE_FEW_SHOTS, verbatim.trim().to_string())
}

/// `T-2: …\nT-1: …\nT0: …`, with a dash for missing turns
pub fn format_context(t_minus2: Option<&str>, t_minus1: Option<&str>, t0: &str) -> String {
    let turn = |t: Option<&str>| {
        t.map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(MISSING_TURN)
            .to_string()
    };
    format!(
        "T-2: {}\nT-1: {}\nT0: {}",
        turn(t_minus2),
        turn(t_minus1),
        t0.trim()
    )
}

/// Messages for an advisor turn with its two preceding turns
pub fn contextual_messages(t_minus2: Option<&str>, t_minus1: Option<&str>, t0: &str) -> Vec<ChatMessage> {
    with_shots(
        CONTEXTUAL_SYSTEM_PROMPT,
        CONTEXTUAL_FEW_SHOTS,
        format_context(t_minus2, t_minus1, t0),
    )
}

#[derive(Deserialize)]
struct LabelReply {
    label: String,
}

/// Parse a model reply: structured JSON first, then a keyword search
///
/// The keyword search scans in priority order; a bare `REFLET` maps to
/// REFLET_ACQ. Returns `None` when nothing usable is found.
pub fn parse_label(content: &str) -> Option<AdvisorTag> {
    if let Ok(reply) = serde_json::from_str::<LabelReply>(content.trim()) {
        if let Some(tag) = AdvisorTag::parse(&reply.label) {
            return Some(tag);
        }
    }

    let upper = content.to_uppercase();
    for tag in AdvisorTag::PRIORITY {
        if upper.contains(tag.as_str()) {
            return Some(tag);
        }
    }
    if upper.contains("REFLET") {
        return Some(AdvisorTag::RefletAcq);
    }
    if upper.contains(AdvisorTag::Unrecognized.as_str()) {
        return Some(AdvisorTag::Unrecognized);
    }
    None
}

/// Lexical overrides applied after a single-turn reply
pub fn single_turn_override(label: AdvisorTag, verbatim: &str) -> AdvisorTag {
    let text = verbatim.to_lowercase();
    let commitment = ["je vais", "je fais", "je vérifie"];
    let directive = ["vous allez", "veuillez", "il faut que vous"];

    if commitment.iter().any(|c| text.contains(c)) {
        return AdvisorTag::Engagement;
    }
    if directive.iter().any(|c| text.contains(c))
        && !matches!(label, AdvisorTag::Engagement | AdvisorTag::Ouverture)
    {
        return AdvisorTag::Ouverture;
    }
    label
}

/// Context-aware overrides applied after a contextual reply
pub fn contextual_override(label: AdvisorTag, t_minus1: Option<&str>, t0: &str) -> AdvisorTag {
    let prev = t_minus1.unwrap_or_default().to_lowercase();
    let current = t0.trim().to_lowercase();
    let client_spoke = prev.contains("client:");

    let help_cue = ["comment", "peux", "aide"].iter().any(|c| prev.contains(c));
    let commitment = ["je vais", "je vérifie", "je m'occupe"]
        .iter()
        .any(|c| current.contains(c));
    if client_spoke && help_cue && commitment {
        return AdvisorTag::Engagement;
    }

    let question_cue = ["?", "comment", "où"].iter().any(|c| prev.contains(c));
    let directive = ["vous allez", "cliquez", "vous devez"]
        .iter()
        .any(|c| current.contains(c));
    if client_spoke && question_cue && directive {
        return AdvisorTag::Ouverture;
    }

    let prev_ack = prev.contains("d'accord")
        || prev.contains("oui")
        || (prev.contains("ok") && current.chars().count() <= 20);
    let short_ack = ["oui", "d'accord", "ok", "très bien", "parfait"].contains(&current.as_str());
    if prev_ack && short_ack {
        return AdvisorTag::RefletAcq;
    }

    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_messages_layout() {
        let messages = single_turn_messages("  je vais regarder  ");
        assert_eq!(messages.len(), 1 + SINGLE_FEW_SHOTS.len() * 2 + 1);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].content, "{\"label\": \"ENGAGEMENT\"}");
        assert_eq!(messages.last().unwrap().content, "je vais regarder");
    }

    #[test]
    fn test_format_context_uses_dash_for_missing() {
        assert_eq!(
            format_context(None, Some("client: bonjour"), " je vais voir "),
            "T-2: —\nT-1: client: bonjour\nT0: je vais voir"
        );
        assert_eq!(format_context(Some("  "), None, "ok"), "T-2: —\nT-1: —\nT0: ok");
    }

    #[test]
    fn test_parse_structured_then_keywords() {
        assert_eq!(parse_label(r#"{"label": "REFLET_JE"}"#), Some(AdvisorTag::RefletJe));
        assert_eq!(parse_label("label: ouverture, maybe engagement"), Some(AdvisorTag::Engagement));
        assert_eq!(parse_label("un REFLET"), Some(AdvisorTag::RefletAcq));
        assert_eq!(
            parse_label(r#"{"label": "AUTRE_NON_RECONNU"}"#),
            Some(AdvisorTag::Unrecognized)
        );
        assert_eq!(parse_label("no idea"), None);
    }

    #[test]
    fn test_label_set_lists_unrecognized_last() {
        let labels = label_set();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels[0], "ENGAGEMENT");
        assert_eq!(labels[6], "AUTRE_NON_RECONNU");
    }

    #[test]
    fn test_single_turn_override() {
        assert_eq!(
            single_turn_override(AdvisorTag::Explication, "Je vais vérifier"),
            AdvisorTag::Engagement
        );
        assert_eq!(
            single_turn_override(AdvisorTag::RefletJe, "veuillez patienter"),
            AdvisorTag::Ouverture
        );
        assert_eq!(
            single_turn_override(AdvisorTag::Engagement, "veuillez patienter"),
            AdvisorTag::Engagement
        );
        assert_eq!(
            single_turn_override(AdvisorTag::RefletJe, "je comprends"),
            AdvisorTag::RefletJe
        );
    }

    #[test]
    fn test_contextual_override_rules() {
        assert_eq!(
            contextual_override(AdvisorTag::Explication, Some("client: vous pouvez m'aider"), "je vais regarder"),
            AdvisorTag::Engagement
        );
        assert_eq!(
            contextual_override(AdvisorTag::Explication, Some("client: je fais quoi ?"), "vous devez signer"),
            AdvisorTag::Ouverture
        );
        assert_eq!(
            contextual_override(AdvisorTag::Explication, Some("client: oui"), "d'accord"),
            AdvisorTag::RefletAcq
        );
        assert_eq!(
            contextual_override(AdvisorTag::RefletJe, Some("conseiller: bonjour"), "je comprends"),
            AdvisorTag::RefletJe
        );
    }
}
