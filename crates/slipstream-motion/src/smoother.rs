//! Position and heading smoothing toward discrete network targets.

use std::f64::consts::{PI, TAU};

use glam::DVec2;

/// Tuning for [`TransformSmoother`].
#[derive(Debug, Clone)]
pub struct SmoothingConfig {
    /// Exponential convergence rate for position, per second.
    pub position_rate: f64,
    /// Exponential convergence rate for heading, per second.
    pub heading_rate: f64,
    /// Speed at which the momentum-derived heading is fully trusted.
    /// Below this the authoritative angle dominates proportionally.
    pub full_trust_speed: f64,
    /// Displacements shorter than this contribute no momentum heading.
    pub displacement_epsilon: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            position_rate: 12.0,
            heading_rate: 10.0,
            full_trust_speed: 30.0,
            displacement_epsilon: 1e-4,
        }
    }
}

/// Wraps an angle difference to the shortest arc in `(-π, π]`.
pub fn wrap_angle(diff: f64) -> f64 {
    let wrapped = (diff + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

/// Smooths one remote entity's transform.
///
/// Holds the last discrete target (position, heading, speed) and a
/// continuously updated rendered transform. Position converges via
/// `rendered += (target - rendered) · (1 - e^(-k·dt))`; the rendered
/// heading chases a blend of the authoritative angle and the direction of
/// travel between the two most recent targets, weighted by normalized
/// speed — at speed, momentum predicts visual attitude better than the
/// reported angle; near rest, displacement is too noisy to trust.
#[derive(Debug, Clone)]
pub struct TransformSmoother {
    config: SmoothingConfig,
    target_pos: DVec2,
    prev_target_pos: DVec2,
    target_angle: f64,
    target_speed: f64,
    rendered_pos: DVec2,
    rendered_angle: f64,
    initialized: bool,
}

impl TransformSmoother {
    /// Creates a smoother with the given tuning.
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            target_pos: DVec2::ZERO,
            prev_target_pos: DVec2::ZERO,
            target_angle: 0.0,
            target_speed: 0.0,
            rendered_pos: DVec2::ZERO,
            rendered_angle: 0.0,
            initialized: false,
        }
    }

    /// Records a new discrete target from the latest snapshot.
    ///
    /// The first target snaps the rendered transform directly — there is
    /// nothing sensible to interpolate from before any data has arrived.
    pub fn set_target(&mut self, x: f64, z: f64, angle: f64, speed: f64) {
        let pos = DVec2::new(x, z);
        if self.initialized {
            self.prev_target_pos = self.target_pos;
        } else {
            self.prev_target_pos = pos;
            self.rendered_pos = pos;
            self.rendered_angle = angle;
            self.initialized = true;
        }
        self.target_pos = pos;
        self.target_angle = angle;
        self.target_speed = speed;
    }

    /// Advances the rendered transform by `dt` seconds of frame time.
    pub fn advance(&mut self, dt: f64) {
        if !self.initialized || dt <= 0.0 {
            return;
        }

        let pos_blend = 1.0 - (-self.config.position_rate * dt).exp();
        self.rendered_pos += (self.target_pos - self.rendered_pos) * pos_blend;

        let desired = self.desired_heading();
        let heading_blend = 1.0 - (-self.config.heading_rate * dt).exp();
        self.rendered_angle =
            wrap_angle(self.rendered_angle + wrap_angle(desired - self.rendered_angle) * heading_blend);
    }

    /// The blended heading the rendered angle chases.
    fn desired_heading(&self) -> f64 {
        let displacement = self.target_pos - self.prev_target_pos;
        if displacement.length() <= self.config.displacement_epsilon {
            return self.target_angle;
        }

        let momentum_heading = displacement.y.atan2(displacement.x);
        let weight = (self.target_speed.abs() / self.config.full_trust_speed).clamp(0.0, 1.0);
        wrap_angle(self.target_angle + wrap_angle(momentum_heading - self.target_angle) * weight)
    }

    /// The current rendered position.
    pub fn rendered_position(&self) -> DVec2 {
        self.rendered_pos
    }

    /// The current rendered heading in radians.
    pub fn rendered_angle(&self) -> f64 {
        self.rendered_angle
    }

    /// The last discrete target position.
    pub fn target_position(&self) -> DVec2 {
        self.target_pos
    }
}

impl Default for TransformSmoother {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}
