//! Secondary pose effects: small state machines layered on the smoothed
//! transform. Currently the turbo nose-lift.

use glam::DVec2;

/// Tuning for [`BoostPose`].
#[derive(Debug, Clone)]
pub struct BoostPoseConfig {
    /// Pitch in radians the nose lifts to while boosting.
    pub max_pitch: f64,
    /// Rate the pitch rises at, radians per second.
    pub rise_rate: f64,
    /// Rate the pitch falls at, radians per second. Slower than the rise:
    /// the lift kicks in sharply and settles gently.
    pub fall_rate: f64,
    /// Minimum speed for the lift to engage while boosting.
    pub speed_threshold: f64,
    /// Distance from the entity origin back to the rotation anchor (the
    /// rear axle), in world units.
    pub anchor_offset: f64,
}

impl Default for BoostPoseConfig {
    fn default() -> Self {
        Self {
            max_pitch: 0.22,
            rise_rate: 3.0,
            fall_rate: 1.2,
            speed_threshold: 12.0,
            anchor_offset: 1.4,
        }
    }
}

/// Nose-lift pitch applied while a turbo boost is active above a speed
/// threshold.
///
/// A boolean-plus-threshold condition toggles the target pitch; the current
/// pitch approaches it with an asymmetric rate (rising faster than
/// falling), clamped so a single step never overshoots.
#[derive(Debug, Clone)]
pub struct BoostPose {
    config: BoostPoseConfig,
    pitch: f64,
}

impl BoostPose {
    /// Creates a pose at rest.
    pub fn new(config: BoostPoseConfig) -> Self {
        Self { config, pitch: 0.0 }
    }

    /// Advances the pitch by `dt` seconds given the entity's boost state
    /// and current speed.
    pub fn advance(&mut self, boost_active: bool, speed: f64, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let target = if boost_active && speed.abs() > self.config.speed_threshold {
            self.config.max_pitch
        } else {
            0.0
        };

        let rate = if target > self.pitch {
            self.config.rise_rate
        } else {
            self.config.fall_rate
        };
        let step = rate * dt;
        self.pitch += (target - self.pitch).clamp(-step, step);
    }

    /// The current pitch in radians.
    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Position correction keeping the pitch rotation visually anchored at
    /// the rear axle instead of the entity origin: the origin rises by
    /// `d·sin(pitch)` and shifts back along the facing direction by
    /// `d·(1 − cos(pitch))`.
    ///
    /// Must be recomputed from the *current* frame's `heading` every frame
    /// — a cached correction drifts as the entity turns. Returns the
    /// horizontal `(x, z)` shift and the vertical lift.
    pub fn anchored_offset(&self, heading: f64) -> (DVec2, f64) {
        let forward = DVec2::new(heading.cos(), heading.sin());
        let horizontal = -forward * (self.config.anchor_offset * (1.0 - self.pitch.cos()));
        let lift = self.config.anchor_offset * self.pitch.sin();
        (horizontal, lift)
    }
}

impl Default for BoostPose {
    fn default() -> Self {
        Self::new(BoostPoseConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boosting_pose() -> BoostPose {
        let mut pose = BoostPose::default();
        // Enough steps to saturate at max pitch.
        for _ in 0..100 {
            pose.advance(true, 50.0, 0.05);
        }
        pose
    }

    #[test]
    fn test_pitch_rises_while_boosting_above_threshold() {
        let mut pose = BoostPose::default();
        pose.advance(true, 50.0, 0.05);
        assert!(pose.pitch() > 0.0);
    }

    #[test]
    fn test_no_lift_below_speed_threshold() {
        let mut pose = BoostPose::default();
        pose.advance(true, 1.0, 0.05);
        assert_eq!(pose.pitch(), 0.0, "boost without speed must not lift");
    }

    #[test]
    fn test_pitch_never_overshoots_target() {
        let config = BoostPoseConfig::default();
        let max = config.max_pitch;
        let mut pose = BoostPose::new(config);

        // A huge dt would overshoot without the clamp.
        pose.advance(true, 50.0, 10.0);
        assert_eq!(pose.pitch(), max);

        pose.advance(false, 50.0, 10.0);
        assert_eq!(pose.pitch(), 0.0);
    }

    #[test]
    fn test_rise_is_faster_than_fall() {
        let mut rising = BoostPose::default();
        rising.advance(true, 50.0, 0.05);
        let rise_step = rising.pitch();

        let mut falling = boosting_pose();
        let start = falling.pitch();
        falling.advance(false, 50.0, 0.05);
        let fall_step = start - falling.pitch();

        assert!(
            rise_step > fall_step,
            "rise {rise_step} must outpace fall {fall_step}"
        );
    }

    #[test]
    fn test_anchor_correction_tracks_current_heading() {
        // Same pitch, two headings: the horizontal correction must rotate
        // with the heading (same magnitude, different direction).
        let pose = boosting_pose();

        let (h_east, lift_east) = pose.anchored_offset(0.0);
        let (h_north, lift_north) = pose.anchored_offset(std::f64::consts::FRAC_PI_2);

        assert!((lift_east - lift_north).abs() < 1e-12, "lift is heading-free");
        assert!((h_east.length() - h_north.length()).abs() < 1e-12);
        assert!(h_east.distance(h_north) > 1e-6, "direction must differ");

        // Facing +x, the shift points backward along -x.
        assert!(h_east.x < 0.0);
        assert!(h_east.y.abs() < 1e-12);
    }

    #[test]
    fn test_no_correction_at_rest() {
        let pose = BoostPose::default();
        let (horizontal, lift) = pose.anchored_offset(1.0);
        assert_eq!(horizontal, DVec2::ZERO);
        assert_eq!(lift, 0.0);
    }
}
