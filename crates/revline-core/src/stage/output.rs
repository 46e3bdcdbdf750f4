//! Typed output schemas for each pipeline stage.
//!
//! Generator payloads are validated here, at the orchestrator boundary, by
//! parsing them into the stage's declared type. A payload that fails to
//! parse is treated exactly like a generator failure. Nothing downstream
//! ever sees an unvalidated blob.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StageName;

/// `normalize` output: structured facts about the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVehicle {
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub trim: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub drivetrain: Option<String>,
    /// Assumptions the generator made where the caller was vague.
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// `strategy` output: the overall build direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStrategy {
    pub direction: String,
    #[serde(default)]
    pub priorities: Vec<String>,
    pub rationale: String,
    #[serde(default)]
    pub budget_notes: Option<String>,
}

/// One mutually-reinforcing modification grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModCombo {
    pub name: String,
    pub mods: Vec<String>,
    pub effect: String,
}

/// `synergy` output: combinations that work together, plus conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyReport {
    pub combos: Vec<ModCombo>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// One modification within an execution phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMod {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub estimated_cost: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One phase of the staged build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPhase {
    pub name: String,
    pub order: u32,
    pub mods: Vec<PlannedMod>,
    #[serde(default)]
    pub estimated_cost: Option<i64>,
}

/// `execution` output: the ordered phases. Serialized as a top-level JSON
/// array, matching the stage's array hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan(pub Vec<BuildPhase>);

/// `performance` output: estimated outcomes of the planned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    #[serde(default)]
    pub power_before: Option<i64>,
    #[serde(default)]
    pub power_after: Option<i64>,
    #[serde(default)]
    pub gains: Vec<String>,
    #[serde(default)]
    pub caveats: Vec<String>,
}

/// One sourcing suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSuggestion {
    pub part: String,
    pub vendor: String,
    #[serde(default)]
    pub estimated_price: Option<i64>,
    /// Note tied to the caller's city ("local dyno", "will-call pickup").
    #[serde(default)]
    pub local_note: Option<String>,
}

/// `sourcing` output: where to buy the planned parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcingPlan {
    pub suggestions: Vec<VendorSuggestion>,
}

/// `tone` output: the owner-facing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneSummary {
    pub headline: String,
    pub summary: String,
}

/// A validated stage output: the tagged union carried in progress events
/// and in the partial-build projection. Serializes as the bare payload (the
/// event's `step` field carries the stage).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Normalize(NormalizedVehicle),
    Strategy(BuildStrategy),
    Synergy(SynergyReport),
    Execution(ExecutionPlan),
    Performance(PerformanceEstimate),
    Sourcing(SourcingPlan),
    Tone(ToneSummary),
}

impl StageOutput {
    /// Validate a raw generator payload against `stage`'s schema.
    pub fn parse(stage: StageName, raw: &Value) -> Result<Self, serde_json::Error> {
        let raw = raw.clone();
        match stage {
            StageName::Normalize => serde_json::from_value(raw).map(Self::Normalize),
            StageName::Strategy => serde_json::from_value(raw).map(Self::Strategy),
            StageName::Synergy => serde_json::from_value(raw).map(Self::Synergy),
            StageName::Execution => serde_json::from_value(raw).map(Self::Execution),
            StageName::Performance => serde_json::from_value(raw).map(Self::Performance),
            StageName::Sourcing => serde_json::from_value(raw).map(Self::Sourcing),
            StageName::Tone => serde_json::from_value(raw).map(Self::Tone),
        }
    }

    /// Which stage produced this output.
    pub fn stage(&self) -> StageName {
        match self {
            Self::Normalize(_) => StageName::Normalize,
            Self::Strategy(_) => StageName::Strategy,
            Self::Synergy(_) => StageName::Synergy,
            Self::Execution(_) => StageName::Execution,
            Self::Performance(_) => StageName::Performance,
            Self::Sourcing(_) => StageName::Sourcing,
            Self::Tone(_) => StageName::Tone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_parses_minimal_payload() {
        let raw = json!({ "make": "Subaru", "model": "WRX" });
        let output = StageOutput::parse(StageName::Normalize, &raw).unwrap();
        assert_eq!(output.stage(), StageName::Normalize);
        match output {
            StageOutput::Normalize(v) => {
                assert_eq!(v.make, "Subaru");
                assert!(v.assumptions.is_empty());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn normalize_rejects_missing_required_fields() {
        let raw = json!({ "make": "Subaru" });
        assert!(StageOutput::parse(StageName::Normalize, &raw).is_err());
    }

    #[test]
    fn execution_parses_top_level_array() {
        let raw = json!([{
            "name": "Foundations",
            "order": 1,
            "mods": [{ "name": "coilovers", "category": "suspension" }],
            "estimated_cost": 2200,
        }]);
        let output = StageOutput::parse(StageName::Execution, &raw).unwrap();
        match output {
            StageOutput::Execution(plan) => {
                assert_eq!(plan.0.len(), 1);
                assert_eq!(plan.0[0].mods[0].name, "coilovers");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn execution_rejects_object_payload() {
        let raw = json!({ "phases": [] });
        assert!(StageOutput::parse(StageName::Execution, &raw).is_err());
    }

    #[test]
    fn tone_rejects_payload_for_other_stage() {
        // A valid synergy payload must not pass tone validation.
        let raw = json!({ "combos": [], "warnings": [] });
        assert!(StageOutput::parse(StageName::Tone, &raw).is_err());
    }

    #[test]
    fn stage_output_serializes_as_bare_payload() {
        let output = StageOutput::Tone(ToneSummary {
            headline: "A sharper street WRX".into(),
            summary: "Handling first, power later.".into(),
        });
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["headline"], "A sharper street WRX");
        // No enum tag in the wire form.
        assert!(value.get("Tone").is_none());
    }

    #[test]
    fn every_stage_validates_its_own_fixture() {
        for stage in StageName::ORDER {
            let fixture = fixture_for(stage);
            let output = StageOutput::parse(stage, &fixture)
                .unwrap_or_else(|e| panic!("fixture for {stage} failed: {e}"));
            assert_eq!(output.stage(), stage);
        }
    }

    fn fixture_for(stage: StageName) -> Value {
        match stage {
            StageName::Normalize => json!({ "make": "Mazda", "model": "MX-5", "year": 2016 }),
            StageName::Strategy => json!({
                "direction": "momentum car",
                "priorities": ["tires", "alignment"],
                "rationale": "grip before power",
            }),
            StageName::Synergy => json!({
                "combos": [{ "name": "grip package", "mods": ["tires", "sway bar"],
                             "effect": "flatter cornering" }],
            }),
            StageName::Execution => json!([{
                "name": "Phase 1", "order": 1,
                "mods": [{ "name": "200tw tires", "category": "tires" }],
            }]),
            StageName::Performance => json!({ "power_before": 155, "power_after": 160 }),
            StageName::Sourcing => json!({
                "suggestions": [{ "part": "tires", "vendor": "Tire Rack" }],
            }),
            StageName::Tone => json!({ "headline": "h", "summary": "s" }),
        }
    }
}
