//! Prompt assembly for each stage.
//!
//! Pure functions: deterministic output from the build request plus the
//! structured outputs of the stage's declared dependencies. The dependency
//! payloads are embedded whole, which is what pins the stage order.

use std::collections::BTreeMap;

use revline_store::models::NewBuild;

use super::output::StageOutput;
use super::StageName;

/// Per-stage system instruction handed to the generator.
pub fn system_instruction(stage: StageName) -> &'static str {
    match stage {
        StageName::Normalize => {
            "You are an automotive build planner. Extract structured vehicle \
             facts from the owner's description. Answer with JSON only."
        }
        StageName::Strategy => {
            "You are an automotive build planner. Choose one coherent build \
             direction for this vehicle and owner. Answer with JSON only."
        }
        StageName::Synergy => {
            "You are an automotive build planner. Group modifications that \
             reinforce each other and flag conflicts. Answer with JSON only."
        }
        StageName::Execution => {
            "You are an automotive build planner. Lay out ordered build \
             phases with concrete modifications. Answer with a JSON array only."
        }
        StageName::Performance => {
            "You are an automotive build planner. Estimate realistic \
             performance outcomes for the planned work. Answer with JSON only."
        }
        StageName::Sourcing => {
            "You are an automotive parts buyer. Suggest reputable vendors \
             for the planned parts. Answer with JSON only."
        }
        StageName::Tone => {
            "You are an automotive writer. Summarize the plan for the owner \
             in an encouraging, concrete voice. Answer with JSON only."
        }
    }
}

/// Assemble the prompt for `stage` from the request and the outputs of the
/// stage's dependencies.
///
/// The orchestrator's sequencing guarantees every declared dependency is
/// present in `outputs` by the time the stage runs.
pub fn build_stage_prompt(
    stage: StageName,
    request: &NewBuild,
    outputs: &BTreeMap<StageName, StageOutput>,
) -> Result<String, serde_json::Error> {
    let mut prompt = String::new();

    prompt.push_str(&format!("Vehicle: {}\n", request.vehicle));
    prompt.push_str(&format!("Owner goals: {}\n", request.goals));
    if let Some(budget) = request.budget {
        prompt.push_str(&format!("Budget: ${budget}\n"));
    }
    if !request.constraints.is_empty() {
        prompt.push_str(&format!("Constraints: {}\n", request.constraints.join("; ")));
    }
    // Sourcing localizes vendor suggestions to the caller's city.
    if stage == StageName::Sourcing {
        if let Some(city) = &request.city {
            prompt.push_str(&format!("Owner city: {city}\n"));
        }
    }

    for dep in stage.dependencies() {
        if let Some(output) = outputs.get(dep) {
            prompt.push_str(&format!(
                "\n{} stage output:\n{}\n",
                dep,
                serde_json::to_string(output)?
            ));
        }
    }

    prompt.push_str(&format!("\nTask: {}", stage_task(stage)));
    Ok(prompt)
}

fn stage_task(stage: StageName) -> &'static str {
    match stage {
        StageName::Normalize => {
            "normalize the vehicle description into make, model, year, trim, \
             engine, drivetrain, and any assumptions you had to make."
        }
        StageName::Strategy => {
            "propose the build direction, priorities, and rationale for this \
             vehicle and budget."
        }
        StageName::Synergy => {
            "identify modification combos that reinforce each other for this \
             strategy, with warnings for combinations to avoid."
        }
        StageName::Execution => {
            "produce the ordered build phases, each with named mods, \
             categories, and estimated costs."
        }
        StageName::Performance => {
            "estimate power before and after, the concrete gains, and the \
             caveats of the combined modifications."
        }
        StageName::Sourcing => {
            "suggest a vendor for each planned part, with estimated prices \
             and local options where the owner's city allows."
        }
        StageName::Tone => {
            "write the headline and owner-facing summary of this build plan."
        }
    }
}
