//! Wire documents for the flow protocol.
//!
//! Every round trip with the flow endpoint speaks the same document shape:
//! the server answers `POST {flow_path}` and `POST {action.href}` alike with
//! a [`FlowDocument`] describing the next state and its permitted actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ceremony::CeremonyError, state_name::StateName};

/// One state of a flow, as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    /// State name; selects the handler and the auto-step, if any.
    pub name: StateName,
    /// HTTP-ish status the server attached to this turn.
    pub status: u16,
    /// Flow-specific payload for rendering this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Permitted next operations, keyed by action name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, ActionDocument>,
    /// Anti-forgery token that must accompany every action invocation.
    pub csrf_token: String,
    /// Server-reported error for this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
}

/// Descriptor of one permitted action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDocument {
    /// Action name, repeated inside the descriptor.
    pub action: String,
    /// Endpoint the action posts to.
    pub href: String,
    /// Declared input fields with server-supplied defaults and bounds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputDocument>,
    /// Human-readable description; informational only.
    #[serde(default)]
    pub description: String,
}

/// Declared input field of an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDocument {
    /// Server-assigned default value; caller-supplied values win over it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whether the server requires this field.
    #[serde(default)]
    pub required: bool,
    /// Minimum accepted length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum accepted length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Field-level validation error from the previous turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
}

/// A domain error carried as data on states and inputs.
///
/// Domain errors are expected, recoverable, per-turn outcomes of the
/// conversation; they are never raised as Rust errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowError {
    /// Stable machine-readable code.
    pub code: String,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FlowError {
    /// Builds a synthetic error describing a failed credential ceremony.
    #[must_use]
    pub fn from_ceremony(error: &CeremonyError) -> Self {
        Self {
            code: error.to_string(),
            message: Some("credential ceremony failed".to_string()),
        }
    }
}

/// A light pointer recording which action produced a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    /// Name of the invoked action.
    pub name: String,
    /// Name of the state the action belonged to.
    pub related_state_name: StateName,
}
