//! Object tracking: an aimed rotation layered between translation and local
//! rotation.
//!
//! `plane` rotates about local up so forward points toward the target's
//! projection onto the horizontal plane; `focus` points forward straight at
//! the target while trying to keep local up. The target is held as a weak
//! name reference: a missing target yields an identity layer until it
//! reappears, and destroying the target is a no-op for the tracker.
//!
//! The `t` parameter of `track-object` smooths enabling, disabling, and
//! reconfiguring the layer. Target *motion* is never smoothed; only the
//! transition between layer configurations is.

use std::time::Duration;

use glam::Quat;

use hackvr_protocol::{ObjectId, TrackMode};

use crate::math;

/// The active aim configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTarget {
    pub target: ObjectId,
    pub mode: TrackMode,
}

/// Per-object tracking layer with configuration blending.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLayer {
    config: Option<TrackTarget>,
    /// Rotation frozen at the last reconfigure, blended toward the live aim.
    prev: Quat,
    blend_started: Duration,
    blend_duration: f32,
}

impl Default for TrackLayer {
    fn default() -> Self {
        Self {
            config: None,
            prev: Quat::IDENTITY,
            blend_started: Duration::ZERO,
            blend_duration: 0.0,
        }
    }
}

impl TrackLayer {
    /// The current configuration, if tracking is engaged.
    pub fn config(&self) -> Option<&TrackTarget> {
        self.config.as_ref()
    }

    /// Install a new configuration (or `None` to disable), blending from the
    /// rotation the layer showed at `now`. `current` must be the sampled
    /// rotation at reconfigure time so the blend starts seamlessly.
    pub fn reconfigure(
        &mut self,
        config: Option<TrackTarget>,
        current: Quat,
        now: Duration,
        duration: f32,
    ) {
        self.prev = current;
        self.config = config;
        self.blend_started = now;
        self.blend_duration = duration.max(0.0);
    }

    /// Sample the layer. `live_aim` is the aim rotation computed against the
    /// target's current position (identity when disabled or the target is
    /// missing).
    pub fn sample(&self, live_aim: Quat, now: Duration) -> Quat {
        if self.blend_duration <= 0.0 {
            return live_aim;
        }
        let elapsed = now.saturating_sub(self.blend_started).as_secs_f32();
        let factor = (elapsed / self.blend_duration).clamp(0.0, 1.0);
        if factor >= 1.0 {
            return live_aim;
        }
        math::slerp(self.prev, live_aim, factor)
    }

    /// Compute the live aim for a target position expressed in the object's
    /// pre-rotation local frame (after the parent transform and the local
    /// translation, before `R_track`).
    pub fn aim(&self, target_local: Option<glam::Vec3>) -> Quat {
        let (Some(config), Some(local)) = (&self.config, target_local) else {
            return Quat::IDENTITY;
        };
        match config.mode {
            TrackMode::Plane => math::plane_aim(local),
            TrackMode::Focus => math::focus_aim(local),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
