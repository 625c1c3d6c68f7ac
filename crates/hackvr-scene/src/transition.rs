//! Per-channel transform transitions.
//!
//! Each object carries up to one in-flight transition per channel (pos, rot,
//! scale). The committed transform always holds the channel's *target*; an
//! active transition describes the path still being played toward it. A new
//! command on a channel cancels the old transition and restarts from the
//! interpolated value at command-receipt time. Time is viewer-monotonic,
//! supplied by the caller as a `Duration` since session start.

use std::time::Duration;

use glam::{Quat, Vec3};

use crate::math;

/// An in-flight interpolation from `start` toward the committed target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<T> {
    pub start: T,
    pub started_at: Duration,
    pub duration: f32,
}

impl<T: Copy> Transition<T> {
    /// Interpolation factor in `[0, 1]` at the given time.
    fn factor(&self, now: Duration) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.started_at).as_secs_f32();
        (elapsed / self.duration).clamp(0.0, 1.0)
    }

    fn finished(&self, now: Duration) -> bool {
        self.factor(now) >= 1.0
    }
}

/// The three independent transition channels of one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionSet {
    pub pos: Option<Transition<Vec3>>,
    pub rot: Option<Transition<Quat>>,
    pub scale: Option<Transition<Vec3>>,
}

impl TransitionSet {
    /// Current position given the committed target. At or past the end the
    /// channel equals the target exactly, not a lerp's last rounding.
    pub fn sample_pos(&self, target: Vec3, now: Duration) -> Vec3 {
        match &self.pos {
            Some(tr) => match tr.factor(now) {
                f if f >= 1.0 => target,
                f => tr.start.lerp(target, f),
            },
            None => target,
        }
    }

    /// Current rotation given the committed target, blended along the
    /// shortest arc.
    pub fn sample_rot(&self, target: Quat, now: Duration) -> Quat {
        match &self.rot {
            Some(tr) => match tr.factor(now) {
                f if f >= 1.0 => target,
                f => math::slerp(tr.start, target, f),
            },
            None => target,
        }
    }

    /// Current scale given the committed target.
    pub fn sample_scale(&self, target: Vec3, now: Duration) -> Vec3 {
        match &self.scale {
            Some(tr) => match tr.factor(now) {
                f if f >= 1.0 => target,
                f => tr.start.lerp(target, f),
            },
            None => target,
        }
    }

    /// Begin a position transition from the current interpolated value.
    /// `duration <= 0` snaps (no record). `old_target` is the committed value
    /// being replaced.
    pub fn begin_pos(&mut self, old_target: Vec3, now: Duration, duration: f32) {
        let start = self.sample_pos(old_target, now);
        self.pos = (duration > 0.0).then_some(Transition {
            start,
            started_at: now,
            duration,
        });
    }

    pub fn begin_rot(&mut self, old_target: Quat, now: Duration, duration: f32) {
        let start = self.sample_rot(old_target, now);
        self.rot = (duration > 0.0).then_some(Transition {
            start,
            started_at: now,
            duration,
        });
    }

    pub fn begin_scale(&mut self, old_target: Vec3, now: Duration, duration: f32) {
        let start = self.sample_scale(old_target, now);
        self.scale = (duration > 0.0).then_some(Transition {
            start,
            started_at: now,
            duration,
        });
    }

    /// Drop channels that have reached their target.
    pub fn retire_finished(&mut self, now: Duration) {
        if self.pos.is_some_and(|tr| tr.finished(now)) {
            self.pos = None;
        }
        if self.rot.is_some_and(|tr| tr.finished(now)) {
            self.rot = None;
        }
        if self.scale.is_some_and(|tr| tr.finished(now)) {
            self.scale = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
