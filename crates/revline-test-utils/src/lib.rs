//! Shared test utilities for revline integration tests.
//!
//! Provides a scripted generator (canned responses, recorded requests),
//! valid per-stage payload fixtures, and fault-injecting store wrappers
//! for exercising the pipeline's failure asymmetry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use revline_core::StageName;
use revline_genai::{GenerateRequest, GenerateResponse, Generator, GeneratorError};
use revline_store::models::{BuildRecord, BuildStatus, NewBuild, TokenUsage};
use revline_store::{BuildStore, MemoryStore, StoreError, UsageStore};

// ===========================================================================
// Scripted generator
// ===========================================================================

/// A generator that replays a scripted sequence of responses and records
/// every request it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GenerateResponse, GeneratorError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_ok(&self, data: Value, tokens_used: i64) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(Ok(GenerateResponse { data, tokens_used }));
    }

    /// Queue a failure.
    pub fn push_err(&self, error: GeneratorError) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(Err(error));
    }

    /// Number of generate calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(request);
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Malformed("script exhausted".to_string())))
    }
}

/// A generator whose calls never complete. For cancellation tests; the
/// caller is expected to cancel around it.
pub struct HangingGenerator;

#[async_trait]
impl Generator for HangingGenerator {
    async fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Result<GenerateResponse, GeneratorError> {
        std::future::pending().await
    }
}

// ===========================================================================
// Stage payload fixtures
// ===========================================================================

/// A payload that validates against `stage`'s schema.
pub fn stage_fixture(stage: StageName) -> Value {
    match stage {
        StageName::Normalize => json!({
            "make": "Subaru",
            "model": "WRX",
            "year": 2015,
            "engine": "FA20DIT",
            "drivetrain": "AWD",
            "assumptions": ["stock turbo"],
        }),
        StageName::Strategy => json!({
            "direction": "street handling with track weekends",
            "priorities": ["suspension", "brakes", "tires"],
            "rationale": "grip and consistency before power",
        }),
        StageName::Synergy => json!({
            "combos": [{
                "name": "grip package",
                "mods": ["coilovers", "sway bars", "200tw tires"],
                "effect": "flatter, more predictable cornering",
            }],
            "warnings": ["avoid mixing spring rates across axles"],
        }),
        StageName::Execution => json!([
            {
                "name": "Phase 1: foundations",
                "order": 1,
                "mods": [
                    { "name": "coilovers", "category": "suspension", "estimated_cost": 2200 },
                    { "name": "brake pads", "category": "brakes", "estimated_cost": 300 },
                ],
                "estimated_cost": 2500,
            },
            {
                "name": "Phase 2: grip",
                "order": 2,
                "mods": [
                    { "name": "200tw tires", "category": "tires", "estimated_cost": 1100 },
                ],
                "estimated_cost": 1100,
            },
        ]),
        StageName::Performance => json!({
            "power_before": 268,
            "power_after": 275,
            "gains": ["2s faster lap pace from grip, not power"],
            "caveats": ["pad a more aggressive compound for track days"],
        }),
        StageName::Sourcing => json!({
            "suggestions": [
                { "part": "coilovers", "vendor": "Fortune Auto", "estimated_price": 2100 },
                { "part": "200tw tires", "vendor": "Tire Rack", "local_note": "local install" },
            ],
        }),
        StageName::Tone => json!({
            "headline": "A WRX that corners like it should",
            "summary": "Suspension and grip first; the power can wait.",
        }),
    }
}

/// Queue one valid fixture per stage with the given token costs, in
/// pipeline order. Panics if `costs` is shorter than the stage order.
pub fn script_full_run(generator: &ScriptedGenerator, costs: &[i64]) {
    for (stage, cost) in StageName::ORDER.into_iter().zip(costs) {
        generator.push_ok(stage_fixture(stage), *cost);
    }
}

// ===========================================================================
// Fault-injecting stores
// ===========================================================================

/// A build store that fails `upsert_stage_output` for one named stage and
/// delegates everything else to the wrapped [`MemoryStore`].
pub struct StageWriteFailStore {
    inner: Arc<MemoryStore>,
    fail_stage: String,
}

impl StageWriteFailStore {
    pub fn new(inner: Arc<MemoryStore>, fail_stage: StageName) -> Self {
        Self {
            inner,
            fail_stage: fail_stage.as_str().to_string(),
        }
    }
}

#[async_trait]
impl BuildStore for StageWriteFailStore {
    async fn create_build(&self, request: &NewBuild) -> Result<BuildRecord, StoreError> {
        self.inner.create_build(request).await
    }

    async fn get_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>, StoreError> {
        self.inner.get_build(build_id).await
    }

    async fn update_build_status(
        &self,
        build_id: Uuid,
        status: BuildStatus,
    ) -> Result<(), StoreError> {
        self.inner.update_build_status(build_id, status).await
    }

    async fn upsert_stage_output(
        &self,
        build_id: Uuid,
        stage: &str,
        output: &Value,
        tokens_cost: i64,
    ) -> Result<(), StoreError> {
        if stage == self.fail_stage {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected write failure for stage {stage}"
            )));
        }
        self.inner
            .upsert_stage_output(build_id, stage, output, tokens_cost)
            .await
    }

    async fn get_stage_outputs(
        &self,
        build_id: Uuid,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        self.inner.get_stage_outputs(build_id).await
    }
}

/// A usage store whose `increment` always fails, for exercising the
/// best-effort accounting path. Reads delegate to the wrapped store.
pub struct BrokenIncrementUsageStore {
    inner: Arc<MemoryStore>,
}

impl BrokenIncrementUsageStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl UsageStore for BrokenIncrementUsageStore {
    async fn get_or_create(&self, user_id: Uuid) -> Result<TokenUsage, StoreError> {
        self.inner.get_or_create(user_id).await
    }

    async fn increment(&self, _user_id: Uuid, _delta: i64) -> Result<(), StoreError> {
        Err(StoreError::Backend(anyhow::anyhow!(
            "injected usage accounting failure"
        )))
    }

    async fn reset_usage(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.inner.reset_usage(user_id).await
    }
}
