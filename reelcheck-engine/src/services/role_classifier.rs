//! Role classification
//!
//! Each rule is a pure function from the appearance's signals to an optional role.
//! Rules are tried in a fixed order and the first that fires wins; supporting is the
//! fallback. Confidence depends only on which rule fired.
//!
//! | Order | Rule | Signal | Confidence |
//! |---|---|---|---|
//! | 1 | child actor | film year − birth year < 18 | 0.90 |
//! | 2 | cameo | credit text: cameo, special/guest appearance, item song, ... | 0.88 |
//! | 3 | voice | credit text: voice, dubbing, narrator, ... | 0.85 |
//! | 4 | lead | credit text names a lead role, or billed in the top two | 0.75 |
//! | 5 | supporting | none of the above | 0.60 |

use crate::matching::normalize;
use crate::types::{DiscoveredAppearance, RoleClassification, RoleType};

const CAMEO_PHRASES: &[&str] = &[
    "cameo",
    "special appearance",
    "guest appearance",
    "friendly appearance",
    "guest role",
    "item song",
    "item number",
    "special song",
];

const VOICE_PHRASES: &[&str] = &[
    "voice",
    "voiceover",
    "dubbing",
    "dubbed",
    "narrator",
    "narration",
];

const LEAD_PHRASES: &[&str] = &[
    "lead",
    "hero",
    "heroine",
    "protagonist",
    "title role",
    "main role",
];

/// Top-billed positions treated as lead when the credit text says nothing
const LEAD_BILLING_CUTOFF: u32 = 2;

/// Age (at release) below which an appearance is a child role
const CHILD_AGE_LIMIT: i32 = 18;

/// Inputs every rule sees
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleSignals<'a> {
    pub credit: Option<&'a str>,
    pub billing_order: Option<u32>,
    pub year: Option<i32>,
    pub birth_year: Option<i32>,
}

impl<'a> RoleSignals<'a> {
    pub fn from_appearance(appearance: &'a DiscoveredAppearance, birth_year: Option<i32>) -> Self {
        Self {
            credit: appearance.role.as_deref(),
            billing_order: appearance.billing_order,
            year: appearance.year,
            birth_year,
        }
    }
}

type Rule = fn(&RoleSignals<'_>) -> Option<RoleType>;

const RULES: [Rule; 4] = [child_actor_rule, cameo_rule, voice_rule, lead_rule];

pub fn child_actor_rule(signals: &RoleSignals<'_>) -> Option<RoleType> {
    let age = signals.year?.checked_sub(signals.birth_year?)?;
    (0..CHILD_AGE_LIMIT).contains(&age).then_some(RoleType::ChildActor)
}

pub fn cameo_rule(signals: &RoleSignals<'_>) -> Option<RoleType> {
    credit_mentions(signals.credit, CAMEO_PHRASES).then_some(RoleType::Cameo)
}

pub fn voice_rule(signals: &RoleSignals<'_>) -> Option<RoleType> {
    credit_mentions(signals.credit, VOICE_PHRASES).then_some(RoleType::Voice)
}

pub fn lead_rule(signals: &RoleSignals<'_>) -> Option<RoleType> {
    let billed_lead = signals
        .billing_order
        .map_or(false, |order| order >= 1 && order <= LEAD_BILLING_CUTOFF);
    (credit_mentions(signals.credit, LEAD_PHRASES) || billed_lead).then_some(RoleType::Lead)
}

/// Fixed confidence per rule outcome
pub fn rule_confidence(role: RoleType) -> f64 {
    match role {
        RoleType::ChildActor => 0.90,
        RoleType::Cameo => 0.88,
        RoleType::Voice => 0.85,
        RoleType::Lead => 0.75,
        RoleType::Supporting => 0.60,
    }
}

pub fn classify(signals: &RoleSignals<'_>) -> RoleClassification {
    let role_type = RULES
        .iter()
        .find_map(|rule| rule(signals))
        .unwrap_or(RoleType::Supporting);
    RoleClassification {
        role_type,
        confidence: rule_confidence(role_type),
        is_primary: role_type == RoleType::Lead,
    }
}

/// Classify one appearance, given the person's birth year if known
pub fn classify_role(appearance: &DiscoveredAppearance, birth_year: Option<i32>) -> RoleClassification {
    classify(&RoleSignals::from_appearance(appearance, birth_year))
}

/// Attach a classification to every appearance
pub fn classify_all(appearances: &mut [DiscoveredAppearance], birth_year: Option<i32>) {
    for appearance in appearances.iter_mut() {
        appearance.classification = Some(classify_role(appearance, birth_year));
    }
}

/// Whole-word phrase match on normalized credit text
fn credit_mentions(credit: Option<&str>, phrases: &[&str]) -> bool {
    let Some(credit) = credit else {
        return false;
    };
    let normalized = normalize(credit);
    let tokens: Vec<&str> = normalized.tokens().collect();
    phrases.iter().any(|phrase| {
        let needle: Vec<&str> = phrase.split_whitespace().collect();
        !needle.is_empty() && tokens.windows(needle.len()).any(|window| window == needle.as_slice())
    })
}
