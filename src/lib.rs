//! # nemabot
//!
//! A discrete-time activation engine for a worm connectome, driving a simulated
//! body.
//!
//! Neurons are integrate-and-fire records stepped in a shuffled order: a neuron
//! at or above threshold adds its synaptic weights into its targets and drops
//! to a hyperpolarized marker. Muscle activity is summed per body side into a
//! movement decision and mapped onto 17 body segments.
//!
//! ## Quick Start
//!
//! ```
//! use nemabot::prelude::*;
//!
//! let connectome = Connectome::sample().unwrap();
//! let mut sim = Simulation::new(connectome, SimConfig::default().with_seed(42)).unwrap();
//!
//! // Smell food for a few steps.
//! for _ in 0..10 {
//!     sim.tick(&SensoryInput::food(20.0));
//! }
//!
//! let snapshot = SimulationAdapter::new(&sim).snapshot();
//! assert_eq!(snapshot.step, 10);
//! ```
//!
//! ## Modules
//!
//! - [`connectome`]: Wiring, constants, and per-neuron state
//! - [`engine`]: The step loop and the `Simulation` facade
//! - [`motor`]: Left/right drive and the movement decision
//! - [`kinematics`]: Muscle activity to segment shape
//! - [`groups`]: Behavioral function groups
//! - [`world`]: Arena with food and obstacles
//! - [`storage`]: CSV and binary step logs
//! - [`observer`]: Read-only snapshots and neuron traces

#[path = "core/connectome.rs"]
pub mod connectome;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/groups.rs"]
pub mod groups;

#[path = "core/kinematics.rs"]
pub mod kinematics;

#[path = "core/motor.rs"]
pub mod motor;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/world.rs"]
pub mod world;

pub mod observer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::connectome::{Connectome, NeuronId, NeuronState, Thresholds};
    pub use crate::engine::{SensoryInput, SimConfig, Simulation, Stimulus, TraversalOrder};
    pub use crate::error::{NemabotError, Result};
    pub use crate::groups::{FunctionGroup, FunctionPanel};
    pub use crate::kinematics::{Segment, SEGMENT_COUNT};
    pub use crate::motor::{BodyPose, MotorCommand, MotorDrive, Travel, Turn};
    pub use crate::observer::{NeuronTrace, SimulationAdapter, SimulationSnapshot};
    pub use crate::storage::{BinaryStepLog, CsvStepLog, StepLogData, StepSink};
    pub use crate::world::{Arena, Controls, Senses};
}
