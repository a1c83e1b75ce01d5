//! Muscle activation to body segment shape.
//!
//! Each of the 17 body segments pairs the dorsal and ventral muscles with the
//! same number (07..=23). Mean activation shortens the segment; the dorsal minus
//! ventral imbalance bends it.

use serde::{Deserialize, Serialize};

use crate::connectome::{Connectome, MuscleGroup, NeuronId};

pub const SEGMENT_COUNT: usize = 17;

/// First body muscle number, mapped to segment 0.
const FIRST_MUSCLE: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Fraction of the resting segment length, in `(0, 1]`.
    pub length_factor: f32,
    /// Signed lateral offset; positive bends toward the dorsal side.
    pub curvature_offset: f32,
    /// Normalized activation in `[0, 1]`.
    pub contraction: f32,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            length_factor: 1.0,
            curvature_offset: 0.0,
            contraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicsParams {
    /// Length retained at full activation.
    pub contraction_scale: f32,
    pub max_curvature_offset: f32,
}

impl Default for KinematicsParams {
    fn default() -> Self {
        Self {
            contraction_scale: 0.1,
            max_curvature_offset: 30.0,
        }
    }
}

impl Segment {
    /// Shape of one segment from its dorsal and ventral mean activations.
    ///
    /// Contraction is normalized by `threshold`; the curvature offset is not.
    pub fn from_activation(
        dorsal_avg: f32,
        ventral_avg: f32,
        threshold: f32,
        params: KinematicsParams,
    ) -> Self {
        let raw = (dorsal_avg + ventral_avg) / 2.0;
        let normalized = raw.clamp(0.0, threshold) / threshold;
        Self {
            length_factor: 1.0 - normalized * (1.0 - params.contraction_scale),
            curvature_offset: params.max_curvature_offset * (dorsal_avg - ventral_avg),
            contraction: normalized,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SegmentMuscles {
    dorsal: [Option<NeuronId>; 2],
    ventral: [Option<NeuronId>; 2],
}

/// Muscle ids per segment, resolved once; absent muscles read as zero.
#[derive(Debug, Clone)]
pub struct SegmentWiring {
    muscles: [SegmentMuscles; SEGMENT_COUNT],
}

impl SegmentWiring {
    pub fn resolve(connectome: &Connectome) -> Self {
        let mut muscles = [SegmentMuscles::default(); SEGMENT_COUNT];
        for (i, seg) in muscles.iter_mut().enumerate() {
            let number = FIRST_MUSCLE + i as u8;
            let id = |g: MuscleGroup| connectome.id(&g.muscle_name(number));
            seg.dorsal = [id(MuscleGroup::DorsalLeft), id(MuscleGroup::DorsalRight)];
            seg.ventral = [id(MuscleGroup::VentralLeft), id(MuscleGroup::VentralRight)];
        }
        Self { muscles }
    }

    /// Recompute every segment from committed muscle activity.
    pub fn compute(
        &self,
        connectome: &Connectome,
        params: KinematicsParams,
        out: &mut [Segment; SEGMENT_COUNT],
    ) {
        let threshold = connectome.thresholds().threshold;
        let read = |id: Option<NeuronId>| id.map_or(0.0, |id| connectome.state(id).current);
        for (seg, m) in out.iter_mut().zip(&self.muscles) {
            let dorsal_avg = (read(m.dorsal[0]) + read(m.dorsal[1])) / 2.0;
            let ventral_avg = (read(m.ventral[0]) + read(m.ventral[1])) / 2.0;
            *seg = Segment::from_activation(dorsal_avg, ventral_avg, threshold, params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f32 = 30.0;

    #[test]
    fn resting_segment_keeps_full_length() {
        let s = Segment::from_activation(-4.0, 2.0, T, KinematicsParams::default());
        assert_eq!(s.length_factor, 1.0);
        assert_eq!(s.contraction, 0.0);
        assert_eq!(s.curvature_offset, 30.0 * -6.0);
    }

    #[test]
    fn saturated_segment_keeps_contraction_scale() {
        let s = Segment::from_activation(40.0, 35.0, T, KinematicsParams::default());
        assert!((s.length_factor - 0.1).abs() < 1e-6);
        assert_eq!(s.contraction, 1.0);
        // Not normalized by threshold.
        assert_eq!(s.curvature_offset, 30.0 * 5.0);
    }

    #[test]
    fn half_activation_is_linear() {
        let s = Segment::from_activation(15.0, 15.0, T, KinematicsParams::default());
        assert!((s.contraction - 0.5).abs() < 1e-6);
        assert!((s.length_factor - 0.55).abs() < 1e-6);
        assert_eq!(s.curvature_offset, 0.0);
    }

    #[test]
    fn missing_muscles_read_as_zero() {
        let mut c = Connectome::builder()
            .neuron("MDL07", &[])
            .neuron("MVL07", &[])
            .build()
            .unwrap();
        let mdl = c.id("MDL07").unwrap();
        c.state_mut(mdl).current = 20.0;

        let wiring = SegmentWiring::resolve(&c);
        let mut out = [Segment::default(); SEGMENT_COUNT];
        wiring.compute(&c, KinematicsParams::default(), &mut out);

        // dorsal = (20 + missing 0) / 2, ventral = 0
        assert_eq!(out[0].curvature_offset, 30.0 * 10.0);
        assert!((out[0].contraction - 5.0 / 30.0).abs() < 1e-6);
        assert!(out[1..].iter().all(|s| *s == Segment::default()));
    }
}
