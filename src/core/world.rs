//! A rectangular arena with food discs and square obstacles.
//!
//! The arena turns the body pose into sensory readings: a food level that
//! rises as the body approaches food (and holds for a while after contact),
//! touch while the body sits inside an obstacle, and the distance to the
//! nearest obstacle for distance-triggered touch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{SensoryInput, Simulation};
use crate::motor::BodyPose;
use crate::prng::Prng;

pub const WALL_THICKNESS: f32 = 10.0;
pub const BODY_RADIUS: f32 = 12.0;
pub const FOOD_RADIUS: f32 = 10.0;

/// Closer than this to a food disc counts as contact.
pub const CONTACT_RANGE: f32 = 20.0;
/// Food is smelled within this distance.
pub const SMELL_RANGE: f32 = 100.0;
/// Steps the contact level is held after touching food.
pub const FOOD_HOLD_STEPS: u32 = 10;
pub const CONTACT_FOOD_LEVEL: f32 = 20.0;

pub const OBSTACLE_MIN: u32 = 40;
pub const OBSTACLE_MAX: u32 = 90;
/// Side of an obstacle placed by hand.
pub const PLACED_OBSTACLE: f32 = 50.0;

const SCATTER_MARGIN: f32 = WALL_THICKNESS + 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Half-open: the right and bottom edges are outside.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }

    pub fn inflate(&self, by: f32) -> Rect {
        Rect::new(self.x - by, self.y - by, self.w + 2.0 * by, self.h + 2.0 * by)
    }

    /// Euclidean distance from a point to the rectangle; zero inside.
    pub fn distance_to(&self, px: f32, py: f32) -> f32 {
        let dx = (self.x - px).max(0.0).max(px - (self.x + self.w));
        let dy = (self.y - py).max(0.0).max(py - (self.y + self.h));
        dx.hypot(dy)
    }
}

/// What the arena reports for a body position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Senses {
    pub food_level: f32,
    pub touch: bool,
    /// Distance to the nearest obstacle edge, infinite with no obstacles.
    pub obstacle_distance: f32,
}

impl Default for Senses {
    fn default() -> Self {
        Self {
            food_level: 0.0,
            touch: false,
            obstacle_distance: f32::INFINITY,
        }
    }
}

/// Operator overrides applied on top of what the arena senses.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Controls {
    pub touch_neurons_enabled: bool,
    /// Replaces the sensed food level.
    pub food_override: Option<f32>,
    /// Forces touch on regardless of position.
    pub touch_override: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
    pub food: Vec<(f32, f32)>,
    pub obstacles: Vec<Rect>,
    food_timer: u32,
    #[serde(skip)]
    senses: Senses,
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            food: Vec::new(),
            obstacles: Vec::new(),
            food_timer: 0,
            senses: Senses::default(),
        }
    }

    /// An arena with `n_obstacles` non-overlapping obstacles and `n_food`
    /// food discs kept clear of obstacles and of each other. Placement gives up
    /// on an item after a bounded number of attempts.
    pub fn scatter(
        width: f32,
        height: f32,
        n_food: usize,
        n_obstacles: usize,
        rng: &mut Prng,
    ) -> Self {
        let mut arena = Self::new(width, height);
        let (left, top) = (SCATTER_MARGIN, SCATTER_MARGIN);
        let (right, bottom) = (width - SCATTER_MARGIN, height - SCATTER_MARGIN);

        'obstacles: for _ in 0..n_obstacles {
            for _ in 0..200 {
                let mut side = || {
                    rng.gen_range_usize(OBSTACLE_MIN as usize, OBSTACLE_MAX as usize + 1) as f32
                };
                let (w, h) = (side(), side());
                let x = rng.gen_range_f32(left, (right - w).max(left));
                let y = rng.gen_range_f32(top, (bottom - h).max(top));
                let r = Rect::new(x, y, w, h);
                if x + w > right || y + h > bottom {
                    continue;
                }
                if arena.obstacles.iter().any(|o| o.intersects(&r)) {
                    continue;
                }
                arena.obstacles.push(r);
                continue 'obstacles;
            }
            break;
        }

        'food: for _ in 0..n_food {
            for _ in 0..300 {
                let x = rng.gen_range_f32(left, right);
                let y = rng.gen_range_f32(top, bottom);
                let crowded = arena
                    .food
                    .iter()
                    .any(|&(fx, fy)| (x - fx).hypot(y - fy) < 2.0 * FOOD_RADIUS + 10.0);
                if crowded {
                    continue;
                }
                let blocked = arena
                    .obstacles
                    .iter()
                    .any(|o| o.inflate(FOOD_RADIUS + 10.0).contains(x, y));
                if blocked {
                    continue;
                }
                arena.food.push((x, y));
                continue 'food;
            }
            break;
        }

        debug!(
            food = arena.food.len(),
            obstacles = arena.obstacles.len(),
            "arena scattered"
        );
        arena
    }

    pub fn senses(&self) -> Senses {
        self.senses
    }

    /// Remove the food disc under the point, or place one there.
    pub fn toggle_food(&mut self, x: f32, y: f32) {
        if let Some(i) = self
            .food
            .iter()
            .position(|&(fx, fy)| (x - fx).hypot(y - fy) <= FOOD_RADIUS)
        {
            self.food.remove(i);
        } else {
            self.food.push((x, y));
        }
    }

    /// Remove the obstacle under the point, or place one centered on it.
    pub fn toggle_obstacle(&mut self, x: f32, y: f32) {
        if let Some(i) = self.obstacles.iter().position(|o| o.contains(x, y)) {
            self.obstacles.remove(i);
        } else {
            let half = PLACED_OBSTACLE / 2.0;
            self.obstacles
                .push(Rect::new(x - half, y - half, PLACED_OBSTACLE, PLACED_OBSTACLE));
        }
    }

    /// Keep the body inside the walls, and out of obstacles: a position that
    /// ends up inside one reverts to `prev`.
    pub fn constrain(&self, pose: &mut BodyPose, prev: (f32, f32)) {
        let inset = WALL_THICKNESS + BODY_RADIUS;
        pose.x = pose.x.clamp(inset, (self.width - inset).max(inset));
        pose.y = pose.y.clamp(inset, (self.height - inset).max(inset));
        if self.obstacles.iter().any(|o| o.contains(pose.x, pose.y)) {
            pose.x = prev.0;
            pose.y = prev.1;
        }
    }

    /// Read food, touch, and obstacle distance at a position. Advances the
    /// food hold timer.
    pub fn sense(&mut self, x: f32, y: f32) -> Senses {
        self.senses = Senses {
            food_level: self.sense_food(x, y),
            touch: self.obstacles.iter().any(|o| o.contains(x, y)),
            obstacle_distance: self
                .obstacles
                .iter()
                .map(|o| o.distance_to(x, y))
                .fold(f32::INFINITY, f32::min),
        };
        self.senses
    }

    fn sense_food(&mut self, x: f32, y: f32) -> f32 {
        if self.food_timer > 0 {
            self.food_timer -= 1;
            return CONTACT_FOOD_LEVEL;
        }
        let mut level: f32 = 0.0;
        for &(fx, fy) in &self.food {
            let d = (x - fx).hypot(y - fy);
            if d < CONTACT_RANGE {
                self.food_timer = FOOD_HOLD_STEPS;
                return CONTACT_FOOD_LEVEL;
            } else if d < SMELL_RANGE {
                level = level.max(((SMELL_RANGE - d).floor() / 5.0).floor());
            }
        }
        level
    }

    /// The sensory input the last reading implies, with overrides applied.
    pub fn input(&self, controls: &Controls) -> SensoryInput {
        SensoryInput {
            food_level: controls.food_override.unwrap_or(self.senses.food_level),
            touch_active: controls.touch_override || self.senses.touch,
            touch_distance: self.senses.obstacle_distance,
            touch_neurons_enabled: controls.touch_neurons_enabled,
        }
    }

    /// One world step: feed the last reading to the network, step it, keep
    /// the body in bounds, then sense at the new position.
    pub fn advance(&mut self, sim: &mut Simulation, controls: &Controls) -> Senses {
        let input = self.input(controls);
        let prev = (sim.pose().x, sim.pose().y);
        sim.tick(&input);
        self.constrain(sim.pose_mut(), prev);
        let pose = *sim.pose();
        self.sense(pose.x, pose.y)
    }

    /// Clear the food hold and take a fresh reading at `pose`.
    pub fn reset(&mut self, pose: &BodyPose) {
        self.food_timer = 0;
        self.sense(pose.x, pose.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectome::Connectome;
    use crate::engine::{SimConfig, Stimulus};

    #[test]
    fn rect_distance_and_containment() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(r.contains(10.0, 10.0));
        assert!(!r.contains(30.0, 15.0));
        assert_eq!(r.distance_to(15.0, 15.0), 0.0);
        assert_eq!(r.distance_to(0.0, 15.0), 10.0);
        assert_eq!(r.distance_to(33.0, 34.0), 5.0);
    }

    #[test]
    fn smell_scales_with_distance() {
        let mut a = Arena::new(400.0, 400.0);
        a.food.push((200.0, 200.0));
        assert_eq!(a.sense(200.0, 150.0).food_level, 10.0);
        assert_eq!(a.sense(200.0, 123.0).food_level, 4.0);
        assert_eq!(a.sense(200.0, 50.0).food_level, 0.0);
    }

    #[test]
    fn contact_holds_food_level() {
        let mut a = Arena::new(400.0, 400.0);
        a.food.push((200.0, 200.0));
        assert_eq!(a.sense(205.0, 200.0).food_level, 20.0);
        for _ in 0..FOOD_HOLD_STEPS {
            assert_eq!(a.sense(20.0, 20.0).food_level, 20.0);
        }
        assert_eq!(a.sense(20.0, 20.0).food_level, 0.0);
    }

    #[test]
    fn touch_and_obstacle_distance() {
        let mut a = Arena::new(400.0, 400.0);
        a.obstacles.push(Rect::new(100.0, 100.0, 50.0, 50.0));
        let s = a.sense(120.0, 120.0);
        assert!(s.touch);
        assert_eq!(s.obstacle_distance, 0.0);
        let s = a.sense(90.0, 120.0);
        assert!(!s.touch);
        assert_eq!(s.obstacle_distance, 10.0);
        assert_eq!(Arena::new(10.0, 10.0).sense(1.0, 1.0).obstacle_distance, f32::INFINITY);
    }

    #[test]
    fn constrain_clamps_and_reverts() {
        let mut a = Arena::new(200.0, 200.0);
        let mut pose = BodyPose::new(-50.0, 500.0, 0.0);
        a.constrain(&mut pose, (100.0, 100.0));
        assert_eq!((pose.x, pose.y), (22.0, 178.0));

        a.toggle_obstacle(100.0, 100.0);
        let mut pose = BodyPose::new(100.0, 100.0, 0.0);
        a.constrain(&mut pose, (60.0, 60.0));
        assert_eq!((pose.x, pose.y), (60.0, 60.0));
        a.toggle_obstacle(100.0, 100.0);
        assert!(a.obstacles.is_empty());
    }

    #[test]
    fn toggle_food_adds_and_removes() {
        let mut a = Arena::new(200.0, 200.0);
        a.toggle_food(50.0, 50.0);
        assert_eq!(a.food.len(), 1);
        a.toggle_food(55.0, 52.0);
        assert!(a.food.is_empty());
    }

    #[test]
    fn scatter_places_disjoint_items_inside() {
        let mut rng = Prng::new(17);
        let a = Arena::scatter(1920.0, 1080.0, 6, 6, &mut rng);
        assert_eq!(a.obstacles.len(), 6);
        assert_eq!(a.food.len(), 6);
        for (i, o) in a.obstacles.iter().enumerate() {
            assert!(o.x >= SCATTER_MARGIN && o.x + o.w <= 1920.0 - SCATTER_MARGIN);
            for p in &a.obstacles[i + 1..] {
                assert!(!o.intersects(p));
            }
        }
        for &(x, y) in &a.food {
            assert!(a.obstacles.iter().all(|o| !o.contains(x, y)));
        }
    }

    #[test]
    fn advance_feeds_sensed_food() {
        let cfg = SimConfig::default().with_seed(4);
        let mut sim = Simulation::new(Connectome::sample().unwrap(), cfg).unwrap();
        let mut a = Arena::new(1920.0, 1080.0);
        a.food.push((965.0, 540.0));
        a.reset(sim.pose());
        assert_eq!(a.senses().food_level, 20.0);

        a.advance(&mut sim, &Controls::default());
        assert_eq!(sim.last_stimulus(), Stimulus::Food);

        let touch = Controls {
            touch_override: true,
            ..Controls::default()
        };
        a.advance(&mut sim, &touch);
        assert_eq!(sim.last_stimulus(), Stimulus::Touch);
    }
}
