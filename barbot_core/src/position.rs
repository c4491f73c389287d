//! Millimetre ↔ micro-step conversion and target clamping.
//!
//! The axis is driven in micro-steps but every committed target lands on a
//! whole full step; a motor parked mid micro-step loses holding torque and
//! drifts between runs.

/// Fixed conversion between rail millimetres and motor micro-steps.
#[derive(Debug, Clone, Copy)]
pub struct StepConverter {
    microsteps: u32,
    fullsteps_per_mm: f32,
    max_position_mm: f32,
}

impl StepConverter {
    pub fn new(microsteps: u32, fullsteps_per_mm: f32, max_position_mm: f32) -> Self {
        Self {
            microsteps: microsteps.max(1),
            fullsteps_per_mm,
            max_position_mm,
        }
    }

    /// Micro-steps per full step.
    #[inline]
    pub fn microsteps(&self) -> i64 {
        i64::from(self.microsteps)
    }

    #[inline]
    pub fn max_position_mm(&self) -> f32 {
        self.max_position_mm
    }

    /// Round to full steps so a finished move never rests in a micro-step.
    #[inline]
    pub fn mm_to_steps(&self, mm: f32) -> i64 {
        self.microsteps() * (self.fullsteps_per_mm * mm).round() as i64
    }

    #[inline]
    pub fn steps_to_mm(&self, steps: i64) -> f32 {
        steps as f32 / (self.microsteps as f32 * self.fullsteps_per_mm)
    }

    /// Clamp a requested target below the end of the rail.
    #[inline]
    pub fn clamp_mm(&self, mm: f32) -> f32 {
        mm.min(self.max_position_mm)
    }

    /// Clamped target in micro-steps, always a whole full step.
    #[inline]
    pub fn target_steps(&self, mm: f32) -> i64 {
        self.mm_to_steps(self.clamp_mm(mm))
    }

    /// Micro-steps per second for a speed in mm/s.
    #[inline]
    pub fn speed_steps(&self, mm_per_s: f32) -> f32 {
        mm_per_s * self.microsteps as f32 * self.fullsteps_per_mm
    }
}
