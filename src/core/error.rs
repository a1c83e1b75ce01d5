//! Error types for nemabot.
//!
//! Everything that can go wrong is rejected where an identifier or a file enters
//! the crate. Stepping the network never fails.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NemabotError {
    /// A neuron identifier that the loaded wiring does not declare.
    #[error("unknown neuron: {0}")]
    UnknownNeuron(String),

    #[error("duplicate neuron declaration: {0}")]
    DuplicateNeuron(String),

    /// A synapse points at a neuron that was never declared.
    #[error("synapse {from} -> {to} targets an undeclared neuron")]
    UnknownSynapseTarget { from: String, to: String },

    #[error("unknown function group: {0}")]
    UnknownFunctionGroup(String),

    /// The group exists but none of its prefixes match the loaded wiring.
    #[error("function group {0:?} matches no neuron in this connectome")]
    EmptyFunctionGroup(String),

    #[error("invalid connectome constants: {0}")]
    InvalidConstants(&'static str),

    #[error("invalid simulation config: {0}")]
    InvalidConfig(&'static str),

    #[error("step log format error: {0}")]
    LogFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NemabotError>;
