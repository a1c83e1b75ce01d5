//! Static wiring diagram plus the per-neuron state table it drives.
//!
//! The wiring is loaded once (JSON or [`ConnectomeBuilder`]) and never changes.
//! Each neuron owns a fan-out list of `(target, weight)` synapses; firing a
//! neuron adds every weight to its target's `next` slot.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NemabotError, Result};

pub type NeuronId = usize;

/// Body wall muscle numbers that take part in locomotion and segment kinematics.
pub const BODY_MUSCLES: RangeInclusive<u8> = 7..=23;

/// Default 3-character muscle prefixes (vulval, ventral/dorsal left/right).
pub const DEFAULT_MUSCLE_PREFIXES: [&str; 5] = ["MVU", "MVL", "MDL", "MVR", "MDR"];

/// Identifier of the non-functional neuron in the reference wiring.
pub const DEFAULT_SENTINEL: &str = "MVULVA";

const SAMPLE_CONNECTOME: &str = include_str!("../../data/sample_connectome.json");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synapse {
    pub target: NeuronId,
    pub weight: f32,
}

/// The five-slot record kept for every neuron.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NeuronState {
    /// Value committed at the end of the previous step.
    pub current: f32,
    /// Value accumulated during the running step.
    pub next: f32,
    /// Last sub-threshold `current`, for rising-edge detection.
    pub previous: f32,
    // Vestigial: carried for record-shape compatibility only.
    pub fire_flag: f32,
    pub decay_counter: u32,
}

impl NeuronState {
    pub fn resting(value: f32) -> Self {
        Self {
            current: value,
            next: value,
            previous: value,
            fire_flag: 0.0,
            decay_counter: 0,
        }
    }
}

/// Scalar constants of the activation law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A neuron whose `current` reaches this value fires.
    pub threshold: f32,
    /// Lowest value a non-refractory neuron may hold.
    pub floor: f32,
    /// Marker assigned right after firing. Strictly below `floor`.
    pub hyperpolarized: f32,
    /// Value every slot takes when a run starts.
    pub resting: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            floor: -10.0,
            hyperpolarized: -15.0,
            resting: 0.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let all = [self.threshold, self.floor, self.hyperpolarized, self.resting];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(NemabotError::InvalidConstants("constants must be finite"));
        }
        if self.threshold <= 0.0 {
            return Err(NemabotError::InvalidConstants("threshold must be positive"));
        }
        if self.hyperpolarized >= self.floor {
            return Err(NemabotError::InvalidConstants(
                "hyperpolarized must be below floor",
            ));
        }
        if self.floor >= self.threshold {
            return Err(NemabotError::InvalidConstants("floor must be below threshold"));
        }
        if self.resting < self.floor || self.resting >= self.threshold {
            return Err(NemabotError::InvalidConstants(
                "resting must lie in [floor, threshold)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuscleGroup {
    DorsalLeft,
    VentralLeft,
    DorsalRight,
    VentralRight,
}

impl MuscleGroup {
    pub fn is_left(self) -> bool {
        matches!(self, MuscleGroup::DorsalLeft | MuscleGroup::VentralLeft)
    }

    pub fn prefix(self) -> &'static str {
        match self {
            MuscleGroup::DorsalLeft => "MDL",
            MuscleGroup::VentralLeft => "MVL",
            MuscleGroup::DorsalRight => "MDR",
            MuscleGroup::VentralRight => "MVR",
        }
    }

    /// Body muscle name for this group, e.g. `MDL07`.
    pub fn muscle_name(self, number: u8) -> String {
        format!("{}{number:02}", self.prefix())
    }

    /// Classify a body wall muscle by name. Head muscles are not grouped.
    pub fn classify(name: &str) -> Option<Self> {
        let group = match name.get(..3)? {
            "MDL" => MuscleGroup::DorsalLeft,
            "MVL" => MuscleGroup::VentralLeft,
            "MDR" => MuscleGroup::DorsalRight,
            "MVR" => MuscleGroup::VentralRight,
            _ => return None,
        };
        let digits = name.get(3..)?;
        if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number: u8 = digits.parse().ok()?;
        BODY_MUSCLES.contains(&number).then_some(group)
    }
}

/// On-disk shape of a wiring diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectomeFile {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(default = "default_muscle_prefixes")]
    pub muscle_prefixes: Vec<String>,
    #[serde(default)]
    pub sentinel: Option<String>,
    pub neurons: Vec<NeuronSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronSpec {
    pub name: String,
    #[serde(default)]
    pub synapses: Vec<(String, f32)>,
}

fn default_muscle_prefixes() -> Vec<String> {
    DEFAULT_MUSCLE_PREFIXES.iter().map(|s| s.to_string()).collect()
}

pub struct Connectome {
    thresholds: Thresholds,
    names: Vec<String>,
    index: HashMap<String, NeuronId>,
    fanout: Vec<Vec<Synapse>>,
    muscle: Vec<bool>,
    groups: Vec<Option<MuscleGroup>>,
    sentinel: Option<NeuronId>,
    states: Vec<NeuronState>,
}

impl Connectome {
    pub fn builder() -> ConnectomeBuilder {
        ConnectomeBuilder::new()
    }

    /// The bundled demonstration wiring.
    pub fn sample() -> Result<Self> {
        Self::from_json_str(SAMPLE_CONNECTOME)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ConnectomeFile = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let connectome = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            neurons = connectome.len(),
            synapses = connectome.synapse_count(),
            "connectome loaded"
        );
        Ok(connectome)
    }

    pub fn from_file(file: ConnectomeFile) -> Result<Self> {
        file.thresholds.validate()?;

        let mut index: HashMap<String, NeuronId> = HashMap::with_capacity(file.neurons.len());
        let mut names = Vec::with_capacity(file.neurons.len());
        for (id, spec) in file.neurons.iter().enumerate() {
            if index.insert(spec.name.clone(), id).is_some() {
                return Err(NemabotError::DuplicateNeuron(spec.name.clone()));
            }
            names.push(spec.name.clone());
        }

        let mut fanout = Vec::with_capacity(names.len());
        for spec in &file.neurons {
            let mut synapses = Vec::with_capacity(spec.synapses.len());
            for (target, weight) in &spec.synapses {
                let Some(&target_id) = index.get(target.as_str()) else {
                    return Err(NemabotError::UnknownSynapseTarget {
                        from: spec.name.clone(),
                        to: target.clone(),
                    });
                };
                synapses.push(Synapse {
                    target: target_id,
                    weight: *weight,
                });
            }
            fanout.push(synapses);
        }

        let muscle: Vec<bool> = names
            .iter()
            .map(|name| {
                name.get(..3)
                    .is_some_and(|p| file.muscle_prefixes.iter().any(|m| m == p))
            })
            .collect();
        let groups = names
            .iter()
            .zip(&muscle)
            .map(|(name, &is_muscle)| {
                if is_muscle {
                    MuscleGroup::classify(name)
                } else {
                    None
                }
            })
            .collect();

        // A sentinel absent from the wiring simply never matches.
        let sentinel = file
            .sentinel
            .as_deref()
            .and_then(|s| index.get(s).copied());

        let states = vec![NeuronState::resting(file.thresholds.resting); names.len()];

        Ok(Self {
            thresholds: file.thresholds,
            names,
            index,
            fanout,
            muscle,
            groups,
            sentinel,
            states,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Neuron names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, id: NeuronId) -> Option<&str> {
        self.names.get(id).map(|s| s.as_str())
    }

    pub fn id(&self, name: &str) -> Option<NeuronId> {
        self.index.get(name).copied()
    }

    /// Resolve a name, rejecting identifiers the wiring does not declare.
    pub fn require(&self, name: &str) -> Result<NeuronId> {
        self.id(name)
            .ok_or_else(|| NemabotError::UnknownNeuron(name.to_string()))
    }

    /// Ids whose name starts with `prefix`, in declaration order.
    pub fn ids_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = NeuronId> + 'a {
        self.names
            .iter()
            .enumerate()
            .filter(move |(_, name)| name.starts_with(prefix))
            .map(|(id, _)| id)
    }

    pub fn synapses(&self, id: NeuronId) -> &[Synapse] {
        &self.fanout[id]
    }

    pub fn synapse_count(&self) -> usize {
        self.fanout.iter().map(|f| f.len()).sum()
    }

    pub fn is_muscle(&self, id: NeuronId) -> bool {
        self.muscle[id]
    }

    pub fn muscle_group(&self, id: NeuronId) -> Option<MuscleGroup> {
        self.groups[id]
    }

    pub fn sentinel(&self) -> Option<NeuronId> {
        self.sentinel
    }

    pub fn is_sentinel(&self, id: NeuronId) -> bool {
        self.sentinel == Some(id)
    }

    pub fn state(&self, id: NeuronId) -> &NeuronState {
        &self.states[id]
    }

    pub fn states(&self) -> &[NeuronState] {
        &self.states
    }

    pub(crate) fn state_mut(&mut self, id: NeuronId) -> &mut NeuronState {
        &mut self.states[id]
    }

    /// Distribute this neuron's synaptic weights into its targets' `next` slots.
    pub fn fire(&mut self, id: NeuronId) {
        if self.is_sentinel(id) {
            return;
        }
        for syn in &self.fanout[id] {
            self.states[syn.target].next += syn.weight;
        }
    }

    /// Overwrite the `next` slot of one neuron.
    pub fn set_next(&mut self, id: NeuronId, value: f32) {
        if self.is_sentinel(id) {
            return;
        }
        self.states[id].next = value;
    }

    /// Put every record back at the resting value.
    pub fn reset(&mut self) {
        let resting = NeuronState::resting(self.thresholds.resting);
        self.states.fill(resting);
    }
}

/// Programmatic construction, mostly for tests and generated wirings.
#[derive(Debug, Clone)]
pub struct ConnectomeBuilder {
    file: ConnectomeFile,
}

impl ConnectomeBuilder {
    pub fn new() -> Self {
        Self {
            file: ConnectomeFile {
                thresholds: Thresholds::default(),
                muscle_prefixes: default_muscle_prefixes(),
                sentinel: Some(DEFAULT_SENTINEL.to_string()),
                neurons: Vec::new(),
            },
        }
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.file.thresholds = thresholds;
        self
    }

    pub fn sentinel(mut self, name: Option<&str>) -> Self {
        self.file.sentinel = name.map(str::to_string);
        self
    }

    pub fn neuron(mut self, name: &str, synapses: &[(&str, f32)]) -> Self {
        self.file.neurons.push(NeuronSpec {
            name: name.to_string(),
            synapses: synapses
                .iter()
                .map(|(t, w)| (t.to_string(), *w))
                .collect(),
        });
        self
    }

    pub fn build(self) -> Result<Connectome> {
        Connectome::from_file(self.file)
    }
}

impl Default for ConnectomeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Connectome {
        Connectome::builder()
            .neuron("ASHL", &[("AVAL", 5.0), ("AVBL", -2.0)])
            .neuron("AVAL", &[("MDL07", 3.0)])
            .neuron("AVBL", &[])
            .neuron("MDL07", &[])
            .neuron("MVULVA", &[("AVAL", 9.0)])
            .build()
            .unwrap()
    }

    #[test]
    fn fire_adds_weights_to_next() {
        let mut c = tiny();
        let ash = c.id("ASHL").unwrap();
        c.fire(ash);
        c.fire(ash);
        assert_eq!(c.state(c.id("AVAL").unwrap()).next, 10.0);
        assert_eq!(c.state(c.id("AVBL").unwrap()).next, -4.0);
        // Firing never touches the firing neuron's own current.
        assert_eq!(c.state(ash).current, 0.0);
    }

    #[test]
    fn sentinel_fire_and_set_are_noops() {
        let mut c = tiny();
        let vulva = c.id("MVULVA").unwrap();
        assert!(c.is_sentinel(vulva));
        c.fire(vulva);
        c.set_next(vulva, 99.0);
        assert!(c.states().iter().all(|s| s.next == 0.0));
    }

    #[test]
    fn muscle_classification_by_name() {
        let c = tiny();
        let mdl = c.id("MDL07").unwrap();
        assert!(c.is_muscle(mdl));
        assert_eq!(c.muscle_group(mdl), Some(MuscleGroup::DorsalLeft));
        assert!(!c.is_muscle(c.id("AVAL").unwrap()));
        // Vulval muscle is a muscle but belongs to no locomotion group.
        let vulva = c.id("MVULVA").unwrap();
        assert!(c.is_muscle(vulva));
        assert_eq!(c.muscle_group(vulva), None);

        assert_eq!(MuscleGroup::classify("MVR23"), Some(MuscleGroup::VentralRight));
        assert_eq!(MuscleGroup::classify("MDR01"), None);
        assert_eq!(MuscleGroup::classify("MD"), None);
        assert_eq!(MuscleGroup::classify("MDL7"), None);
        assert_eq!(MuscleGroup::classify("MDL+7"), None);
        assert_eq!(MuscleGroup::classify("MDL007"), None);
    }

    #[test]
    fn rejects_bad_wiring() {
        let dup = Connectome::builder()
            .neuron("AVAL", &[])
            .neuron("AVAL", &[])
            .build();
        assert!(matches!(dup, Err(NemabotError::DuplicateNeuron(n)) if n == "AVAL"));

        let dangling = Connectome::builder().neuron("AVAL", &[("NOPE", 1.0)]).build();
        assert!(matches!(
            dangling,
            Err(NemabotError::UnknownSynapseTarget { .. })
        ));

        let inverted = Connectome::builder()
            .thresholds(Thresholds {
                hyperpolarized: -5.0,
                ..Thresholds::default()
            })
            .neuron("AVAL", &[])
            .build();
        assert!(matches!(inverted, Err(NemabotError::InvalidConstants(_))));
    }

    #[test]
    fn reset_restores_resting_records() {
        let mut c = tiny();
        let aval = c.id("AVAL").unwrap();
        c.state_mut(aval).current = 42.0;
        c.state_mut(aval).decay_counter = 3;
        c.reset();
        assert_eq!(*c.state(aval), NeuronState::resting(0.0));
    }

    #[test]
    fn require_reports_unknown_names() {
        let c = tiny();
        assert!(c.require("AVAL").is_ok());
        assert!(matches!(c.require("XYZ"), Err(NemabotError::UnknownNeuron(n)) if n == "XYZ"));
    }

    #[test]
    fn sample_wiring_loads() {
        let c = Connectome::sample().unwrap();
        for name in ["ADFL", "ASJL", "FLPR", "OLQVL", "MDL07", "MVR23", "MVULVA"] {
            assert!(c.id(name).is_some(), "{name} missing");
        }
        let grouped = (0..c.len()).filter(|&id| c.muscle_group(id).is_some()).count();
        assert_eq!(grouped, 4 * BODY_MUSCLES.count());
        assert_eq!(c.thresholds().threshold, 30.0);
    }

    #[test]
    fn json_defaults_fill_missing_fields() {
        let c = Connectome::from_json_str(r#"{ "neurons": [ { "name": "AVAL" } ] }"#).unwrap();
        assert_eq!(*c.thresholds(), Thresholds::default());
        assert_eq!(c.sentinel(), None);
        assert!(c.synapses(0).is_empty());
    }
}
