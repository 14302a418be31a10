//! Request orchestration
//!
//! Sequences access control, token gating, classification, model selection,
//! cache lookup, routed execution and the non-blocking side effects that
//! follow a served response.

mod best_effort;
pub mod collaborators;
pub mod envelope;
pub mod local;
mod pipeline;

pub use best_effort::best_effort;
pub use collaborators::{
    AccessPolicy, CacheKey, CachedEntry, CallerProfile, CallerResolver, GateDecision,
    ResponseCache, TokenGate, UsageLogger, UsageMetadata, UsageRecord,
};
pub use envelope::{Confidence, RequestOptions, ResponseEnvelope, infer_confidence};
pub use local::{
    AllowanceTokenGate, RoleAccessPolicy, StaticCallerResolver, StoreResponseCache, UsageLedger,
};
pub use pipeline::{Collaborators, DEFAULT_DEADLINE, Orchestrator};
