//! Left/right motor drive and the discrete movement it selects.
//!
//! Muscle activity is summed per body side and reduced to one of a handful of
//! per-step actions: turn by a fixed increment, then step forward or backward.

use serde::{Deserialize, Serialize};

use crate::connectome::{Connectome, NeuronId};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorDrive {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Turn {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Travel {
    #[default]
    None,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorCommand {
    pub turn: Turn,
    pub travel: Travel,
}

impl MotorCommand {
    pub const STOP: Self = Self {
        turn: Turn::None,
        travel: Travel::None,
    };

    pub fn is_stop(&self) -> bool {
        *self == Self::STOP
    }
}

/// Ratio bounds that turn an imbalanced drive into a heading change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnRatios {
    /// `right / left` at or below this turns left.
    pub left: f32,
    /// `right / left` at or above this turns right.
    pub right: f32,
}

impl Default for TurnRatios {
    fn default() -> Self {
        Self {
            left: 0.6,
            right: 2.0,
        }
    }
}

impl MotorDrive {
    /// Pick the movement for this drive. First matching row wins.
    ///
    /// | drive                       | action                         |
    /// |-----------------------------|--------------------------------|
    /// | left == 0 and right == 0    | stop                           |
    /// | right <= 0 and left < 0     | ratio turn, then backward      |
    /// | right <= 0 and left >= 0    | turn right                     |
    /// | right >= 0 and left <= 0    | turn left                      |
    /// | right >= 0 and left > 0     | ratio turn, then forward       |
    /// | otherwise (NaN)             | stop                           |
    pub fn decide(&self, ratios: TurnRatios) -> MotorCommand {
        let (l, r) = (self.left, self.right);
        if l == 0.0 && r == 0.0 {
            MotorCommand::STOP
        } else if r <= 0.0 && l < 0.0 {
            MotorCommand {
                turn: ratio_turn(l, r, ratios),
                travel: Travel::Backward,
            }
        } else if r <= 0.0 && l >= 0.0 {
            MotorCommand {
                turn: Turn::Right,
                travel: Travel::None,
            }
        } else if r >= 0.0 && l <= 0.0 {
            MotorCommand {
                turn: Turn::Left,
                travel: Travel::None,
            }
        } else if r >= 0.0 && l > 0.0 {
            MotorCommand {
                turn: ratio_turn(l, r, ratios),
                travel: Travel::Forward,
            }
        } else {
            MotorCommand::STOP
        }
    }
}

fn ratio_turn(left: f32, right: f32, ratios: TurnRatios) -> Turn {
    if left == 0.0 {
        return Turn::None;
    }
    let ratio = right / left;
    if ratio <= ratios.left {
        Turn::Left
    } else if ratio >= ratios.right {
        Turn::Right
    } else {
        Turn::None
    }
}

/// Muscle ids per body side, resolved once from the wiring.
#[derive(Debug, Clone, Default)]
pub struct MotorWiring {
    left: Vec<NeuronId>,
    right: Vec<NeuronId>,
}

impl MotorWiring {
    pub fn resolve(connectome: &Connectome) -> Self {
        let mut wiring = Self::default();
        for id in 0..connectome.len() {
            match connectome.muscle_group(id) {
                Some(g) if g.is_left() => wiring.left.push(id),
                Some(_) => wiring.right.push(id),
                None => {}
            }
        }
        wiring
    }

    /// Sum committed muscle activity per side.
    pub fn drive(&self, connectome: &Connectome) -> MotorDrive {
        let sum = |ids: &[NeuronId]| -> f32 {
            ids.iter().map(|&id| connectome.state(id).current).sum()
        };
        MotorDrive {
            left: sum(&self.left),
            right: sum(&self.right),
        }
    }
}

/// Position and heading of the simulated body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPose {
    pub x: f32,
    pub y: f32,
    /// Degrees; positive turns right (screen coordinates, y grows downward).
    pub heading_deg: f32,
}

impl BodyPose {
    pub fn new(x: f32, y: f32, heading_deg: f32) -> Self {
        Self { x, y, heading_deg }
    }

    /// Rotate, then translate. Both are fixed per-step increments.
    pub fn apply(&mut self, cmd: MotorCommand, heading_step_deg: f32, step_distance: f32) {
        match cmd.turn {
            Turn::Left => self.heading_deg -= heading_step_deg,
            Turn::Right => self.heading_deg += heading_step_deg,
            Turn::None => {}
        }
        let sign = match cmd.travel {
            Travel::Forward => 1.0,
            Travel::Backward => -1.0,
            Travel::None => return,
        };
        let rad = self.heading_deg.to_radians();
        self.x += sign * step_distance * rad.cos();
        self.y += sign * step_distance * rad.sin();
    }
}
