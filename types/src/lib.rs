//! Core domain types for the Exosphere client.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the SDK.

mod event;
mod graph;
mod ids;
mod run;

pub use event::{EventPayload, RunEvent, DEFAULT_EVENT_TYPE};
pub use graph::{
    EdgeDefinition, GraphDefinition, NodeDefinition, TriggerRequest, TriggerResponse,
    UpsertGraphResponse, UpsertNodeModelResponse,
};
pub use ids::{GraphId, RunId};
pub use run::{CancelOutcome, Run, RunStatus, RunStatusParseError};
