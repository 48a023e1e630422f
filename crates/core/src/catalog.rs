//! Sequence catalog: immutable drip-campaign definitions loaded once at
//! start-up and validated before the engine ever sees them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{DripError, DripResult};

/// Largest accepted step delay, roughly a century.
pub const MAX_DELAY_DAYS: u32 = 36_500;

/// One scheduled message within a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Step {
    /// Days after enrollment (cumulative, not relative to the previous step).
    pub delay_days: u32,
    pub template: String,
    /// Subject template; may contain `{placeholder}` tokens.
    pub subject: String,
}

impl Step {
    pub fn new(delay_days: u32, template: &str, subject: &str) -> Self {
        Self {
            delay_days,
            template: template.to_string(),
            subject: subject.to_string(),
        }
    }
}

/// One A/B path through a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Variant {
    /// Filled from the catalog map key at load time.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub weight: f64,
    pub steps: Vec<Step>,
}

/// A drip-campaign definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SequenceDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: String,
    pub active: bool,
    pub variants: BTreeMap<String, Variant>,
}

impl SequenceDefinition {
    pub fn variant(&self, key: &str) -> Option<&Variant> {
        self.variants.get(key)
    }

    fn validate(&self) -> DripResult<()> {
        let fail = |msg: String| Err(DripError::Catalog(format!("sequence {}: {msg}", self.id)));

        if self.id.trim().is_empty() {
            return Err(DripError::Catalog("sequence id must not be empty".to_string()));
        }
        if self.variants.is_empty() {
            return fail("no variants defined".to_string());
        }
        for (key, variant) in &self.variants {
            if !variant.weight.is_finite() || variant.weight < 0.0 {
                return fail(format!("variant {key} has invalid weight {}", variant.weight));
            }
            if variant.steps.is_empty() {
                return fail(format!("variant {key} has no steps"));
            }
            if variant
                .steps
                .windows(2)
                .any(|pair| pair[1].delay_days < pair[0].delay_days)
            {
                return fail(format!("variant {key} has decreasing step delays"));
            }
            if let Some(step) = variant.steps.iter().find(|s| s.delay_days > MAX_DELAY_DAYS) {
                return fail(format!(
                    "variant {key} has delay {} days, above the {MAX_DELAY_DAYS} day limit",
                    step.delay_days
                ));
            }
            if variant.steps.iter().any(|s| s.template.trim().is_empty()) {
                return fail(format!("variant {key} has a step without a template"));
            }
        }
        if !self.variants.values().any(|v| v.weight > 0.0) {
            return fail("all variant weights are zero".to_string());
        }
        Ok(())
    }
}

/// Read-only mapping of sequence id to definition.
#[derive(Debug, Clone, Default)]
pub struct SequenceCatalog {
    sequences: BTreeMap<String, SequenceDefinition>,
}

impl SequenceCatalog {
    /// Validates every definition and fills variant keys from their map keys.
    pub fn new(definitions: Vec<SequenceDefinition>) -> DripResult<Self> {
        let mut sequences = BTreeMap::new();
        for mut def in definitions {
            for (key, variant) in def.variants.iter_mut() {
                variant.key = key.clone();
            }
            def.validate()?;
            if sequences.contains_key(&def.id) {
                return Err(DripError::Catalog(format!("duplicate sequence id {}", def.id)));
            }
            sequences.insert(def.id.clone(), def);
        }
        Ok(Self { sequences })
    }

    /// Parse a JSON array of sequence definitions.
    pub fn from_json_str(json: &str) -> DripResult<Self> {
        let definitions: Vec<SequenceDefinition> = serde_json::from_str(json)?;
        Self::new(definitions)
    }

    pub fn from_path(path: impl AsRef<Path>) -> DripResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json)?;
        info!(path = %path.display(), sequences = catalog.len(), "Loaded sequence catalog");
        Ok(catalog)
    }

    pub fn get(&self, sequence_id: &str) -> Option<&SequenceDefinition> {
        self.sequences.get(sequence_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &SequenceDefinition> {
        self.sequences.values()
    }

    pub fn active(&self) -> Vec<&SequenceDefinition> {
        self.sequences.values().filter(|s| s.active).collect()
    }

    /// Active sequences enrolled by the given trigger.
    pub fn for_trigger(&self, trigger: &str) -> Vec<&SequenceDefinition> {
        self.sequences
            .values()
            .filter(|s| s.active && s.trigger == trigger)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The production sequences shipped with the service.
    pub fn builtin() -> DripResult<Self> {
        Self::new(vec![
            sequence(
                "welcome_v1",
                "Welcome Sequence",
                "New subscriber onboarding with race content and a soft plan pitch.",
                "new_subscriber",
                true,
                vec![
                    variant(
                        "A",
                        "Editorial (slow build)",
                        50.0,
                        vec![
                            Step::new(0, "welcome_a", "Welcome to Gravel God"),
                            Step::new(3, "top_races", "The 10 races defining 2026"),
                            Step::new(7, "plan_pitch_soft", "What if you showed up race-ready?"),
                            Step::new(14, "social_proof", "How Sarah PR'd SBT by 40 minutes"),
                        ],
                    ),
                    variant(
                        "B",
                        "Direct (faster cadence)",
                        50.0,
                        vec![
                            Step::new(0, "welcome_b", "You're in. Here's what's next."),
                            Step::new(2, "top_races", "The races everyone's talking about"),
                            Step::new(
                                5,
                                "plan_pitch_direct",
                                "Custom Training Plan: $249, built for your race",
                            ),
                        ],
                    ),
                ],
            ),
            sequence(
                "nurture_v1",
                "Lead Nurture",
                "Race content drip for prep-kit leads with a gentle conversion push.",
                "prep_kit_download",
                true,
                vec![
                    variant(
                        "A",
                        "Content-heavy",
                        50.0,
                        vec![
                            Step::new(2, "race_prep_tips", "3 things most gravel racers get wrong"),
                            Step::new(
                                6,
                                "training_myth",
                                "The base-miles myth (and what actually works)",
                            ),
                            Step::new(10, "plan_pitch_soft", "Your race is coming. Are you ready?"),
                            Step::new(17, "social_proof", "From DNS to finish line: Mike's story"),
                        ],
                    ),
                    variant(
                        "B",
                        "Value-first",
                        50.0,
                        vec![
                            Step::new(2, "race_prep_tips", "Your race-day checklist (from a coach)"),
                            Step::new(5, "plan_pitch_direct", "Custom plan for your race: $249"),
                            Step::new(
                                12,
                                "social_proof",
                                "Why 90% of gravel DNFs are preventable",
                            ),
                        ],
                    ),
                ],
            ),
            sequence(
                "race_specific_v1",
                "Race-Specific Follow-up",
                "Targeted content for quiz-matched races plus a training plan pitch.",
                "quiz_completed",
                true,
                vec![variant(
                    "A",
                    "Standard",
                    100.0,
                    vec![
                        Step::new(
                            1,
                            "quiz_results_recap",
                            "Your top race matches (and what they demand)",
                        ),
                        Step::new(4, "race_deep_dive", "Inside {race_name}: what you need to know"),
                        Step::new(8, "plan_pitch_soft", "Train specifically for {race_name}"),
                        Step::new(
                            14,
                            "plan_pitch_direct",
                            "Your {race_name} plan, ready in 48 hours",
                        ),
                    ],
                )],
            ),
            sequence(
                "post_purchase_v1",
                "Post-Purchase Onboarding",
                "Onboarding flow, value reinforcement and NPS request after a purchase.",
                "plan_purchased",
                true,
                vec![variant(
                    "A",
                    "Standard",
                    100.0,
                    vec![
                        Step::new(0, "purchase_welcome", "Your training plan is ready"),
                        Step::new(3, "week1_tips", "Week 1: What to expect"),
                        Step::new(10, "checkin_week2", "How's the first week going?"),
                        Step::new(21, "progress_update", "3 weeks in: here's what's happening"),
                        Step::new(42, "nps_request", "Quick question about your plan"),
                    ],
                )],
            ),
            sequence(
                "win_back_v1",
                "Win-Back",
                "Re-engage leads that stayed cold for 30 days.",
                "lead_cold_30d",
                false,
                vec![
                    variant(
                        "A",
                        "Urgency",
                        50.0,
                        vec![
                            Step::new(0, "win_back_urgency", "Your race is getting closer"),
                            Step::new(
                                5,
                                "plan_pitch_direct",
                                "Last chance: custom plan for {race_name}",
                            ),
                        ],
                    ),
                    variant(
                        "B",
                        "Value recap",
                        50.0,
                        vec![
                            Step::new(0, "win_back_value", "Still thinking about {race_name}?"),
                            Step::new(7, "social_proof", "What other riders are saying"),
                        ],
                    ),
                ],
            ),
        ])
    }
}

fn sequence(
    id: &str,
    name: &str,
    description: &str,
    trigger: &str,
    active: bool,
    variants: Vec<Variant>,
) -> SequenceDefinition {
    SequenceDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        trigger: trigger.to_string(),
        active,
        variants: variants.into_iter().map(|v| (v.key.clone(), v)).collect(),
    }
}

fn variant(key: &str, name: &str, weight: f64, steps: Vec<Step>) -> Variant {
    Variant {
        key: key.to_string(),
        name: name.to_string(),
        weight,
        steps,
    }
}
