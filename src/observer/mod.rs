use serde::{Deserialize, Serialize};

use crate::connectome::NeuronId;
use crate::engine::{Simulation, Stimulus};
use crate::error::Result;
use crate::kinematics::Segment;
use crate::motor::{BodyPose, MotorCommand, MotorDrive};

/// A read-only snapshot of what the simulation is doing.
///
/// Snapshotting is on demand and allocates; the step loop is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub step: u64,
    pub pose: BodyPose,
    pub drive: MotorDrive,
    pub command: MotorCommand,
    pub stimulus: Stimulus,
    pub segments: Vec<Segment>,
    pub forced: Vec<String>,
    pub active_functions: Vec<String>,
    pub summary: NeuronSummary,
}

/// Population counts over committed activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NeuronSummary {
    pub neurons: usize,
    /// At or above threshold.
    pub active: usize,
    /// Sitting on the hyperpolarized marker.
    pub refractory: usize,
}

pub struct SimulationAdapter<'a> {
    sim: &'a Simulation,
}

impl<'a> SimulationAdapter<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let panel = self.sim.panel();
        SimulationSnapshot {
            step: self.sim.step_count(),
            pose: *self.sim.pose(),
            drive: self.sim.drive(),
            command: self.sim.command(),
            stimulus: self.sim.last_stimulus(),
            segments: self.sim.segments().to_vec(),
            forced: ids_to_names(self.sim, self.sim.forced().iter().copied()),
            active_functions: panel
                .groups()
                .iter()
                .enumerate()
                .filter(|(i, _)| panel.is_active(*i))
                .map(|(_, g)| g.name.clone())
                .collect(),
            summary: self.summary(),
        }
    }

    pub fn summary(&self) -> NeuronSummary {
        let t = self.sim.thresholds();
        let states = self.sim.connectome().states();
        NeuronSummary {
            neurons: states.len(),
            active: states.iter().filter(|s| s.current >= t.threshold).count(),
            refractory: states
                .iter()
                .filter(|s| s.current == t.hyperpolarized)
                .count(),
        }
    }
}

fn ids_to_names(sim: &Simulation, ids: impl Iterator<Item = NeuronId>) -> Vec<String> {
    ids.filter_map(|id| sim.connectome().name(id).map(|s| s.to_string()))
        .collect()
}

/// Per-neuron history for a watch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    #[serde(skip)]
    id: NeuronId,
    /// Committed `current` after each recorded step.
    pub values: Vec<f32>,
    /// Steps at which `current` crossed up through the threshold.
    pub activations: Vec<u64>,
}

/// Records the `current` series and rising edges of watched neurons.
///
/// A rising edge is a step after which `current >= threshold` while the
/// recorded sub-threshold `previous` is below it.
#[derive(Debug, Clone, Default)]
pub struct NeuronTrace {
    traces: Vec<Trace>,
    /// Oldest samples are dropped beyond this many. Zero keeps everything.
    capacity: usize,
}

impl NeuronTrace {
    pub fn new(capacity: usize) -> Self {
        Self {
            traces: Vec::new(),
            capacity,
        }
    }

    /// Add a neuron to the watch list. Watching twice is a no-op.
    pub fn watch(&mut self, sim: &Simulation, name: &str) -> Result<()> {
        let id = sim.connectome().require(name)?;
        if self.traces.iter().any(|t| t.id == id) {
            return Ok(());
        }
        self.traces.push(Trace {
            name: name.to_string(),
            id,
            values: Vec::new(),
            activations: Vec::new(),
        });
        Ok(())
    }

    pub fn unwatch(&mut self, name: &str) -> bool {
        let before = self.traces.len();
        self.traces.retain(|t| t.name != name);
        self.traces.len() != before
    }

    /// Sample every watched neuron. Call once after each step.
    pub fn record(&mut self, sim: &Simulation) {
        let threshold = sim.thresholds().threshold;
        let step = sim.step_count();
        for t in &mut self.traces {
            let current = sim.current(t.id);
            let previous = sim.previous(t.id);
            t.values.push(current);
            if current >= threshold && previous < threshold {
                t.activations.push(step);
            }
            if self.capacity > 0 && t.values.len() > self.capacity {
                let excess = t.values.len() - self.capacity;
                t.values.drain(..excess);
                // Keep only crossings inside the retained window.
                let oldest = (step + 1).saturating_sub(self.capacity as u64);
                t.activations.retain(|&s| s >= oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        for t in &mut self.traces {
            t.values.clear();
            t.activations.clear();
        }
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn get(&self, name: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.name == name)
    }
}
