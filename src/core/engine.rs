//! Activation engine and the `Simulation` facade.
//!
//! One `step()` is: pin forced neurons at threshold, walk every neuron in a
//! freshly drawn order (decay, fire, record history, clamp), commit `next`
//! into `current`, then derive the motor decision and segment shapes from the
//! committed muscle activity.
//!
//! The traversal order is observable: a neuron fired early in the walk feeds
//! targets that have not yet decided whether to decay this step. This is part
//! of the model and is kept as-is.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connectome::{Connectome, NeuronId, NeuronState, Thresholds};
use crate::error::{NemabotError, Result};
use crate::groups::FunctionPanel;
use crate::kinematics::{KinematicsParams, Segment, SegmentWiring, SEGMENT_COUNT};
use crate::motor::{BodyPose, MotorCommand, MotorDrive, MotorWiring, TurnRatios};
use crate::prng::Prng;
use crate::storage::StepSink;

/// Chemosensory neurons stimulated when food is sensed.
pub const FOOD_NEURONS: [&str; 8] = [
    "ADFL", "ADFR", "ASGR", "ASGL", "ASIL", "ASIR", "ASJR", "ASJL",
];

/// Mechanosensory neurons stimulated on touch.
pub const TOUCH_NEURONS: [&str; 10] = [
    "FLPR", "FLPL", "ASHL", "ASHR", "IL1VL", "IL1VR", "OLQDL", "OLQDR", "OLQVR", "OLQVL",
];

/// How the per-step neuron walk is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraversalOrder {
    /// Sort indices by `index ^ mask` for a random mask drawn each step.
    #[default]
    MaskedXor,
    /// Uniform Fisher-Yates shuffle each step.
    Shuffle,
    /// Declaration order every step. Fully deterministic.
    Declaration,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// PRNG seed. `None` seeds from the wall clock.
    pub seed: Option<u64>,
    pub traversal: TraversalOrder,
    /// Multiplier applied to `next` when a neuron received no net excitation.
    pub decay_factor: f32,
    /// Food level must exceed this to stimulate the chemosensory set.
    pub food_threshold: f32,
    /// Obstacle distance, exclusive on both ends, that counts as touch when
    /// touch neurons are enabled.
    pub touch_range: f32,
    pub turn_left_ratio: f32,
    pub turn_right_ratio: f32,
    pub heading_step_deg: f32,
    pub step_distance: f32,
    pub contraction_scale: f32,
    pub max_curvature_offset: f32,
    pub start_pose: BodyPose,
    /// Touch distance assumed before any world has reported one.
    pub initial_touch_distance: f32,
}

impl Default for SimConfig {
    /// Defaults:
    /// - masked-xor traversal, wall-clock seed
    /// - decay 0.9, food threshold 15, touch range 30
    /// - turn ratios 0.6 / 2.0, heading step 5 degrees, step distance 4
    /// - contraction scale 0.1, max curvature offset 30
    /// - start pose (960, 540) facing 0 degrees, initial touch distance 15
    fn default() -> Self {
        Self {
            seed: None,
            traversal: TraversalOrder::MaskedXor,
            decay_factor: 0.9,
            food_threshold: 15.0,
            touch_range: 30.0,
            turn_left_ratio: 0.6,
            turn_right_ratio: 2.0,
            heading_step_deg: 5.0,
            step_distance: 4.0,
            contraction_scale: 0.1,
            max_curvature_offset: 30.0,
            start_pose: BodyPose::new(960.0, 540.0, 0.0),
            initial_touch_distance: 15.0,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalOrder) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_start_pose(mut self, pose: BodyPose) -> Self {
        self.start_pose = pose;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(NemabotError::InvalidConfig("decay_factor must be in (0, 1]"));
        }
        if !self.food_threshold.is_finite() {
            return Err(NemabotError::InvalidConfig("food_threshold must be finite"));
        }
        if !(self.touch_range > 0.0) {
            return Err(NemabotError::InvalidConfig("touch_range must be > 0"));
        }
        if !(self.turn_left_ratio > 0.0 && self.turn_left_ratio < self.turn_right_ratio) {
            return Err(NemabotError::InvalidConfig(
                "turn ratios must satisfy 0 < left < right",
            ));
        }
        if !self.heading_step_deg.is_finite() || !self.step_distance.is_finite() {
            return Err(NemabotError::InvalidConfig(
                "heading_step_deg and step_distance must be finite",
            ));
        }
        if !(self.contraction_scale > 0.0 && self.contraction_scale <= 1.0) {
            return Err(NemabotError::InvalidConfig("contraction_scale must be in (0, 1]"));
        }
        if !self.max_curvature_offset.is_finite() {
            return Err(NemabotError::InvalidConfig("max_curvature_offset must be finite"));
        }
        Ok(())
    }

    pub fn turn_ratios(&self) -> TurnRatios {
        TurnRatios {
            left: self.turn_left_ratio,
            right: self.turn_right_ratio,
        }
    }

    pub fn kinematics(&self) -> KinematicsParams {
        KinematicsParams {
            contraction_scale: self.contraction_scale,
            max_curvature_offset: self.max_curvature_offset,
        }
    }
}

/// Environment readings for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensoryInput {
    pub food_level: f32,
    pub touch_active: bool,
    pub touch_distance: f32,
    pub touch_neurons_enabled: bool,
}

impl SensoryInput {
    pub fn food(level: f32) -> Self {
        Self {
            food_level: level,
            ..Self::quiet(f32::INFINITY)
        }
    }

    pub fn quiet(touch_distance: f32) -> Self {
        Self {
            food_level: 0.0,
            touch_active: false,
            touch_distance,
            touch_neurons_enabled: false,
        }
    }
}

/// Which sensory set, if any, an injection stimulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stimulus {
    #[default]
    None,
    Touch,
    Food,
}

/// Names of the neurons stimulated by touch and by food.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSets {
    pub touch: Vec<String>,
    pub food: Vec<String>,
}

impl Default for SensorSets {
    fn default() -> Self {
        Self {
            touch: TOUCH_NEURONS.iter().map(|s| s.to_string()).collect(),
            food: FOOD_NEURONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SensorWiring {
    touch: Vec<NeuronId>,
    food: Vec<NeuronId>,
}

impl SensorWiring {
    fn resolve(connectome: &Connectome, sets: &SensorSets) -> Result<Self> {
        let ids = |names: &[String]| -> Result<Vec<NeuronId>> {
            names.iter().map(|n| connectome.require(n)).collect()
        };
        Ok(Self {
            touch: ids(&sets.touch)?,
            food: ids(&sets.food)?,
        })
    }
}

/// A running network plus the body it drives.
pub struct Simulation {
    cfg: SimConfig,
    connectome: Connectome,
    rng: Prng,
    order: Vec<NeuronId>,

    forced: BTreeSet<NeuronId>,
    panel: FunctionPanel,

    sensors: SensorWiring,
    motor_wiring: MotorWiring,
    segment_wiring: SegmentWiring,

    drive: MotorDrive,
    command: MotorCommand,
    pose: BodyPose,
    segments: [Segment; SEGMENT_COUNT],
    last_stimulus: Stimulus,
    steps: u64,

    log: Option<Box<dyn StepSink>>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("neurons", &self.connectome.len())
            .field("steps", &self.steps)
            .field("forced", &self.forced.len())
            .field("pose", &self.pose)
            .field("logging", &self.log.is_some())
            .finish()
    }
}

impl Simulation {
    /// Build with the stock touch and food sets. Every sensory neuron must be
    /// declared by `connectome`.
    pub fn new(connectome: Connectome, cfg: SimConfig) -> Result<Self> {
        Self::with_sensor_sets(connectome, cfg, &SensorSets::default())
    }

    pub fn with_sensor_sets(
        connectome: Connectome,
        cfg: SimConfig,
        sets: &SensorSets,
    ) -> Result<Self> {
        cfg.validate()?;
        let sensors = SensorWiring::resolve(&connectome, sets)?;
        let rng = match cfg.seed {
            Some(seed) => Prng::new(seed),
            None => Prng::from_entropy(),
        };
        let motor_wiring = MotorWiring::resolve(&connectome);
        let segment_wiring = SegmentWiring::resolve(&connectome);
        Ok(Self {
            order: Vec::with_capacity(connectome.len()),
            cfg,
            rng,
            forced: BTreeSet::new(),
            panel: FunctionPanel::default(),
            sensors,
            motor_wiring,
            segment_wiring,
            drive: MotorDrive::default(),
            command: MotorCommand::STOP,
            pose: cfg.start_pose,
            segments: [Segment::default(); SEGMENT_COUNT],
            last_stimulus: Stimulus::None,
            steps: 0,
            log: None,
            connectome,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn connectome(&self) -> &Connectome {
        &self.connectome
    }

    pub fn thresholds(&self) -> &Thresholds {
        self.connectome.thresholds()
    }

    /// Start a fresh run: every neuron back at rest, body at the start pose,
    /// step counter at zero. The forced set and function panel are kept.
    ///
    /// An attached step log is finished and detached, so a log never holds
    /// rows from two runs. With a configured seed the traversal sequence
    /// restarts too.
    pub fn reset_for_new_run(&mut self) {
        if let Some(mut sink) = self.log.take() {
            if let Err(e) = sink.finish() {
                warn!(error = %e, "step log flush failed at run reset");
            }
        }
        self.connectome.reset();
        if let Some(seed) = self.cfg.seed {
            self.rng = Prng::new(seed);
        }
        self.drive = MotorDrive::default();
        self.command = MotorCommand::STOP;
        self.pose = self.cfg.start_pose;
        self.segments = [Segment::default(); SEGMENT_COUNT];
        self.last_stimulus = Stimulus::None;
        self.steps = 0;
        info!(neurons = self.connectome.len(), "run reset");
    }

    /// Sensory injection followed by one step.
    pub fn tick(&mut self, input: &SensoryInput) {
        self.inject_sensors(input);
        self.step();
    }

    /// Fire the touch set or the food set from `input`. Touch wins.
    ///
    /// Touch counts when `touch_active`, or when touch neurons are enabled and
    /// `touch_distance` lies strictly between 0 and the configured range.
    pub fn inject_sensors(&mut self, input: &SensoryInput) -> Stimulus {
        let near = input.touch_distance > 0.0 && input.touch_distance < self.cfg.touch_range;
        let stimulus = if input.touch_active || (input.touch_neurons_enabled && near) {
            for &id in &self.sensors.touch {
                self.connectome.fire(id);
            }
            Stimulus::Touch
        } else if input.food_level > self.cfg.food_threshold {
            for &id in &self.sensors.food {
                self.connectome.fire(id);
            }
            Stimulus::Food
        } else {
            Stimulus::None
        };
        self.last_stimulus = stimulus;
        stimulus
    }

    /// Advance the network one step and derive motion from it.
    pub fn step(&mut self) {
        self.apply_forcing();
        self.draw_order();
        self.propagate();
        self.commit();

        self.compute_motor_drive();
        self.compute_segments();
        self.steps += 1;
        self.write_log_row();
    }

    fn apply_forcing(&mut self) {
        let threshold = self.connectome.thresholds().threshold;
        for &id in &self.forced {
            let s = self.connectome.state_mut(id);
            s.current = threshold;
            s.next = threshold;
        }
    }

    fn draw_order(&mut self) {
        let n = self.connectome.len();
        match self.cfg.traversal {
            TraversalOrder::MaskedXor => self.rng.masked_order(n, &mut self.order),
            TraversalOrder::Shuffle => self.rng.shuffled_order(n, &mut self.order),
            TraversalOrder::Declaration => {
                self.order.clear();
                self.order.extend(0..n);
            }
        }
    }

    fn propagate(&mut self) {
        let t = *self.connectome.thresholds();
        let decay = self.cfg.decay_factor;
        for &id in &self.order {
            let fires = {
                let s = self.connectome.state_mut(id);
                if s.next > s.current {
                    s.decay_counter = 0;
                } else {
                    s.next *= decay;
                }
                if s.current >= t.threshold {
                    true
                } else {
                    s.previous = s.current;
                    false
                }
            };
            if fires && !self.connectome.is_muscle(id) {
                self.connectome.fire(id);
                self.connectome.state_mut(id).next = t.hyperpolarized;
            }
            clamp_to_floor(self.connectome.state_mut(id), &t);
        }
    }

    fn commit(&mut self) {
        let t = *self.connectome.thresholds();
        for id in 0..self.connectome.len() {
            let s = self.connectome.state_mut(id);
            clamp_to_floor(s, &t);
            s.current = s.next;
        }
    }

    /// Sum committed muscle activity per side, decide, and move the body.
    pub fn compute_motor_drive(&mut self) -> MotorCommand {
        self.drive = self.motor_wiring.drive(&self.connectome);
        self.command = self.drive.decide(self.cfg.turn_ratios());
        self.pose
            .apply(self.command, self.cfg.heading_step_deg, self.cfg.step_distance);
        self.command
    }

    pub fn compute_segments(&mut self) -> &[Segment; SEGMENT_COUNT] {
        self.segment_wiring
            .compute(&self.connectome, self.cfg.kinematics(), &mut self.segments);
        &self.segments
    }

    fn write_log_row(&mut self) {
        let Some(sink) = self.log.as_mut() else {
            return;
        };
        if let Err(e) = sink.record(self.steps, self.connectome.states()) {
            warn!(error = %e, step = self.steps, "step log write failed; logging disabled");
            self.log = None;
        }
    }

    // --- forced-active set ---

    /// Pin a neuron at threshold from the next step on.
    pub fn force(&mut self, name: &str) -> Result<NeuronId> {
        let id = self.connectome.require(name)?;
        self.forced.insert(id);
        Ok(id)
    }

    /// Unpin a neuron. Returns whether it was pinned.
    pub fn release(&mut self, name: &str) -> Result<bool> {
        let id = self.connectome.require(name)?;
        Ok(self.forced.remove(&id))
    }

    /// Flip a neuron's pin. Returns the new state.
    pub fn toggle_forced(&mut self, name: &str) -> Result<bool> {
        let id = self.connectome.require(name)?;
        if self.forced.remove(&id) {
            Ok(false)
        } else {
            self.forced.insert(id);
            Ok(true)
        }
    }

    pub fn is_forced(&self, id: NeuronId) -> bool {
        self.forced.contains(&id)
    }

    pub fn forced(&self) -> &BTreeSet<NeuronId> {
        &self.forced
    }

    pub fn clear_forced(&mut self) {
        self.forced.clear();
    }

    pub fn panel(&self) -> &FunctionPanel {
        &self.panel
    }

    /// Switch a function group and rebuild the forced set from every active
    /// group. Individually pinned neurons are dropped.
    pub fn set_function_active(&mut self, name: &str, active: bool) -> Result<()> {
        let index = self.panel.index_of(name)?;
        self.panel.set_active(index, active, &self.connectome)?;
        self.forced = self.panel.forced_set(&self.connectome);
        debug!(group = name, active, forced = self.forced.len(), "forced set rebuilt");
        Ok(())
    }

    // --- read-only views ---

    pub fn current(&self, id: NeuronId) -> f32 {
        self.connectome.state(id).current
    }

    pub fn previous(&self, id: NeuronId) -> f32 {
        self.connectome.state(id).previous
    }

    /// Committed activation by name.
    pub fn current_of(&self, name: &str) -> Result<f32> {
        Ok(self.current(self.connectome.require(name)?))
    }

    pub fn segments(&self) -> &[Segment; SEGMENT_COUNT] {
        &self.segments
    }

    pub fn drive(&self) -> MotorDrive {
        self.drive
    }

    pub fn command(&self) -> MotorCommand {
        self.command
    }

    pub fn pose(&self) -> &BodyPose {
        &self.pose
    }

    /// Mutable pose, for a world that constrains movement.
    pub fn pose_mut(&mut self) -> &mut BodyPose {
        &mut self.pose
    }

    pub fn last_stimulus(&self) -> Stimulus {
        self.last_stimulus
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    // --- step log ---

    /// Attach a step log. The header is written immediately.
    pub fn attach_log(&mut self, mut sink: Box<dyn StepSink>) -> Result<()> {
        sink.begin(self.connectome.names())?;
        self.log = Some(sink);
        Ok(())
    }

    /// Detach and flush the step log, if any.
    pub fn detach_log(&mut self) -> Result<()> {
        if let Some(mut sink) = self.log.take() {
            sink.finish()?;
        }
        Ok(())
    }

    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }
}

#[inline]
fn clamp_to_floor(s: &mut NeuronState, t: &Thresholds) {
    if s.next < t.floor && s.next != t.hyperpolarized {
        s.next = t.floor;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::connectome::ConnectomeBuilder;
    use crate::motor::Travel;

    fn declaration() -> SimConfig {
        SimConfig::default()
            .with_seed(1)
            .with_traversal(TraversalOrder::Declaration)
    }

    fn no_sensors() -> SensorSets {
        SensorSets {
            touch: Vec::new(),
            food: Vec::new(),
        }
    }

    fn small(wiring: ConnectomeBuilder) -> Simulation {
        Simulation::with_sensor_sets(wiring.build().unwrap(), declaration(), &no_sensors()).unwrap()
    }

    fn set(sim: &mut Simulation, name: &str, current: f32, next: f32) {
        let id = sim.connectome.id(name).unwrap();
        let s = sim.connectome.state_mut(id);
        s.current = current;
        s.next = next;
    }

    #[test]
    fn sample_builds_with_stock_sensors() {
        let sim = Simulation::new(Connectome::sample().unwrap(), declaration()).unwrap();
        assert_eq!(sim.step_count(), 0);
        assert_eq!(*sim.pose(), SimConfig::default().start_pose);
    }

    #[test]
    fn missing_sensory_neuron_is_rejected() {
        let c = Connectome::builder().neuron("ADFL", &[]).build().unwrap();
        assert!(matches!(
            Simulation::new(c, declaration()),
            Err(NemabotError::UnknownNeuron(_))
        ));
    }

    #[test]
    fn config_validation() {
        assert!(SimConfig::default().validate().is_ok());
        let mut cfg = SimConfig::default();
        cfg.decay_factor = 1.5;
        assert!(cfg.validate().is_err());
        let mut cfg = SimConfig::default();
        cfg.turn_left_ratio = 3.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_json_fills_defaults() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{"seed": 9, "traversal": "Declaration"}"#).unwrap();
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.traversal, TraversalOrder::Declaration);
        assert_eq!(cfg.decay_factor, 0.9);
    }

    #[test]
    fn firing_neuron_becomes_refractory() {
        let mut sim = small(Connectome::builder().neuron("A", &[("B", 4.0)]).neuron("B", &[]));
        set(&mut sim, "A", 31.0, 31.0);
        sim.step();
        assert_eq!(sim.current_of("A").unwrap(), -15.0);
        assert_eq!(sim.current_of("B").unwrap(), 4.0);
    }

    #[test]
    fn no_excitation_decays_by_factor() {
        let mut sim = small(Connectome::builder().neuron("A", &[]));
        set(&mut sim, "A", 20.0, 20.0);
        sim.step();
        assert!((sim.current_of("A").unwrap() - 18.0).abs() < 1e-5);
        sim.step();
        assert!((sim.current_of("A").unwrap() - 16.2).abs() < 1e-5);
    }

    #[test]
    fn negative_values_clamp_to_floor() {
        let mut sim = small(Connectome::builder().neuron("A", &[]));
        set(&mut sim, "A", 0.0, -40.0);
        sim.step();
        assert_eq!(sim.current_of("A").unwrap(), -10.0);
    }

    #[test]
    fn floor_holds_under_heavy_inhibition() {
        let c = Connectome::sample().unwrap();
        let mut sim = Simulation::new(c, SimConfig::default().with_seed(3)).unwrap();
        sim.set_function_active("Locomotion", true).unwrap();
        let t = *sim.thresholds();
        for i in 0..200 {
            let input = SensoryInput {
                food_level: if i % 3 == 0 { 20.0 } else { 0.0 },
                touch_active: i % 7 == 0,
                touch_distance: 15.0,
                touch_neurons_enabled: false,
            };
            sim.tick(&input);
            for s in sim.connectome().states() {
                assert!(
                    s.current >= t.floor || s.current == t.hyperpolarized,
                    "{}",
                    s.current
                );
            }
        }
    }

    #[test]
    fn forcing_pins_at_threshold() {
        let mut sim = small(Connectome::builder().neuron("A", &[("B", 2.0)]).neuron("B", &[]));
        sim.force("A").unwrap();
        sim.apply_forcing();
        let id = sim.connectome.id("A").unwrap();
        assert_eq!(sim.connectome.state(id).current, 30.0);
        assert_eq!(sim.connectome.state(id).next, 30.0);

        // Pinned neurons fire every step.
        sim.step();
        sim.step();
        assert_eq!(sim.current_of("B").unwrap(), 4.0);
    }

    #[test]
    fn muscles_never_fire() {
        let mut sim = small(Connectome::builder().neuron("MDL07", &[("B", 5.0)]).neuron("B", &[]));
        set(&mut sim, "MDL07", 40.0, 40.0);
        sim.step();
        assert_eq!(sim.current_of("B").unwrap(), 0.0);
        assert!((sim.current_of("MDL07").unwrap() - 36.0).abs() < 1e-5);
    }

    #[test]
    fn traversal_order_is_observable() {
        // B starts at 10. If B is visited before A fires, B decays first.
        let mut after = small(Connectome::builder().neuron("A", &[("B", 5.0)]).neuron("B", &[]));
        set(&mut after, "A", 30.0, 30.0);
        set(&mut after, "B", 10.0, 10.0);
        after.step();

        let mut before = small(Connectome::builder().neuron("B", &[]).neuron("A", &[("B", 5.0)]));
        set(&mut before, "A", 30.0, 30.0);
        set(&mut before, "B", 10.0, 10.0);
        before.step();

        assert_eq!(after.current_of("B").unwrap(), 15.0);
        assert_eq!(before.current_of("B").unwrap(), 14.0);
    }

    #[test]
    fn touch_takes_priority_over_food() {
        let mut sim = Simulation::new(Connectome::sample().unwrap(), declaration()).unwrap();
        let input = SensoryInput {
            food_level: 50.0,
            touch_active: true,
            touch_distance: 100.0,
            touch_neurons_enabled: false,
        };
        assert_eq!(sim.inject_sensors(&input), Stimulus::Touch);

        let near = SensoryInput {
            touch_active: false,
            touch_distance: 12.0,
            touch_neurons_enabled: true,
            ..input
        };
        assert_eq!(sim.inject_sensors(&near), Stimulus::Touch);

        let far = SensoryInput {
            touch_distance: 30.0,
            ..near
        };
        assert_eq!(sim.inject_sensors(&far), Stimulus::Food);

        assert_eq!(sim.inject_sensors(&SensoryInput::food(15.0)), Stimulus::None);
    }

    #[test]
    fn group_toggle_rebuilds_forced_set() {
        let mut sim = Simulation::new(Connectome::sample().unwrap(), declaration()).unwrap();
        sim.force("RIAL").unwrap();
        sim.set_function_active("Avoidance reflex", true).unwrap();
        let rial = sim.connectome().id("RIAL").unwrap();
        assert!(!sim.is_forced(rial));
        assert!(!sim.forced().is_empty());

        sim.set_function_active("Avoidance reflex", false).unwrap();
        assert!(sim.forced().is_empty());
        assert!(sim.force("NOPE").is_err());
    }

    #[test]
    fn toggle_and_release() {
        let mut sim = small(Connectome::builder().neuron("A", &[]));
        assert!(sim.toggle_forced("A").unwrap());
        assert!(!sim.toggle_forced("A").unwrap());
        sim.force("A").unwrap();
        assert!(sim.release("A").unwrap());
        assert!(!sim.release("A").unwrap());
    }

    #[test]
    fn same_seed_same_trajectory() {
        let run = || {
            let mut sim = Simulation::new(
                Connectome::sample().unwrap(),
                SimConfig::default().with_seed(99),
            )
            .unwrap();
            for _ in 0..60 {
                sim.tick(&SensoryInput::food(20.0));
            }
            (*sim.pose(), sim.connectome().states().to_vec())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reset_returns_to_rest() {
        let mut sim = Simulation::new(Connectome::sample().unwrap(), declaration()).unwrap();
        sim.force("AVBL").unwrap();
        for _ in 0..20 {
            sim.tick(&SensoryInput::food(20.0));
        }
        sim.reset_for_new_run();
        assert_eq!(sim.step_count(), 0);
        assert_eq!(sim.command(), MotorCommand::STOP);
        assert_eq!(*sim.pose(), sim.config().start_pose);
        assert!(sim.connectome().states().iter().all(|s| s.current == 0.0));
        assert_eq!(sim.forced().len(), 1);
    }

    #[test]
    fn quiet_network_stays_still() {
        let mut sim = Simulation::new(Connectome::sample().unwrap(), declaration()).unwrap();
        sim.step();
        assert_eq!(sim.command().travel, Travel::None);
        assert_eq!(*sim.pose(), sim.config().start_pose);
    }

    struct BrokenSink;

    impl StepSink for BrokenSink {
        fn begin(&mut self, _names: &[String]) -> io::Result<()> {
            Ok(())
        }

        fn record(&mut self, _step: u64, _states: &[NeuronState]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn finish(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct StepIndices(Arc<Mutex<Vec<u64>>>);

    impl StepSink for StepIndices {
        fn begin(&mut self, _names: &[String]) -> io::Result<()> {
            Ok(())
        }

        fn record(&mut self, step: u64, _states: &[NeuronState]) -> io::Result<()> {
            self.0.lock().unwrap().push(step);
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn run_reset_closes_the_step_log() {
        let mut sim = small(Connectome::builder().neuron("A", &[]));
        let rows = StepIndices::default();
        sim.attach_log(Box::new(rows.clone())).unwrap();
        for _ in 0..3 {
            sim.step();
        }
        sim.reset_for_new_run();
        assert!(!sim.is_logging());
        sim.step();
        sim.step();
        assert_eq!(*rows.0.lock().unwrap(), [1, 2, 3]);

        let next = StepIndices::default();
        sim.attach_log(Box::new(next.clone())).unwrap();
        sim.step();
        assert_eq!(*next.0.lock().unwrap(), [3]);
    }

    #[test]
    fn non_muscle_sentinel_still_goes_refractory() {
        let wiring = Connectome::builder()
            .sentinel(Some("S"))
            .neuron("S", &[("B", 4.0)])
            .neuron("B", &[]);
        let mut sim = small(wiring);
        set(&mut sim, "S", 31.0, 31.0);
        sim.step();
        assert_eq!(sim.current_of("S").unwrap(), -15.0);
        // The sentinel has no functional fan-out.
        assert_eq!(sim.current_of("B").unwrap(), 0.0);
    }

    #[test]
    fn log_failure_detaches_sink() {
        let mut sim = small(Connectome::builder().neuron("A", &[]));
        sim.attach_log(Box::new(BrokenSink)).unwrap();
        assert!(sim.is_logging());
        sim.step();
        assert!(!sim.is_logging());
        sim.step();
        assert_eq!(sim.step_count(), 2);
    }
}
