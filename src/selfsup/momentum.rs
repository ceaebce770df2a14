//! Momentum teacher: schedule, gradient-isolated encoder, weight sync
//!
//! The teacher is a distinct type whose parameters are excluded from
//! gradient computation at construction and mutated only by the momentum
//! copy rule — never by an optimizer.

use crate::selfsup::encoder::Encoder;
use crate::train::{CallbackAction, CallbackContext, TrainerCallback};
use crate::Tensor;
use std::fmt;
use std::rc::Rc;

/// Momentum value source: a constant, a per-step table, or a function of
/// the step index. Values must lie in `[0, 1)`.
#[derive(Clone)]
pub enum MomentumSchedule {
    /// One momentum for every step.
    Constant(f32),
    /// Per-step momenta; steps past the end clamp to the last entry.
    PerStep(Vec<f32>),
    /// Step index to momentum.
    Indexed(Rc<dyn Fn(usize) -> f32>),
}

impl MomentumSchedule {
    /// The momentum for a given global step.
    ///
    /// # Panics
    ///
    /// Panics when the schedule yields a value outside `[0, 1)` or the
    /// per-step table is empty.
    pub fn value_at(&self, step: usize) -> f32 {
        let value = match self {
            MomentumSchedule::Constant(m) => *m,
            MomentumSchedule::PerStep(table) => {
                assert!(!table.is_empty(), "per-step momentum table is empty");
                table[step.min(table.len() - 1)]
            }
            MomentumSchedule::Indexed(f) => f(step),
        };
        assert!(
            (0.0..1.0).contains(&value),
            "momentum must be in [0, 1), got {value} at step {step}"
        );
        value
    }
}

impl fmt::Debug for MomentumSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MomentumSchedule::Constant(m) => write!(f, "Constant({m})"),
            MomentumSchedule::PerStep(t) => write!(f, "PerStep(len={})", t.len()),
            MomentumSchedule::Indexed(_) => write!(f, "Indexed(..)"),
        }
    }
}

/// In-place momentum copy: `teacher = m * teacher + (1 - m) * student`.
///
/// Touches parameter data only; no gradient is read or written.
pub fn ema_update(teacher: &[Tensor], student: &[Tensor], momentum: f32) {
    assert!(
        (0.0..1.0).contains(&momentum),
        "momentum must be in [0, 1), got {momentum}"
    );
    assert_eq!(
        teacher.len(),
        student.len(),
        "teacher/student parameter count mismatch"
    );
    for (t, s) in teacher.iter().zip(student.iter()) {
        assert_eq!(t.len(), s.len(), "teacher/student parameter shape mismatch");
        let s_data = s.data();
        let mut t_data = t.data_mut();
        for (tv, &sv) in t_data.iter_mut().zip(s_data.iter()) {
            *tv = momentum * *tv + (1.0 - momentum) * sv;
        }
    }
}

/// A gradient-isolated encoder.
///
/// Construction disables gradient tracking on every parameter, before any
/// forward pass. The public surface offers forwarding and read access; the
/// only mutation is [`momentum_update`](TeacherEncoder::momentum_update).
pub struct TeacherEncoder {
    inner: Rc<dyn Encoder>,
}

impl TeacherEncoder {
    /// Wrap an encoder, detaching all of its parameters from gradient
    /// computation and discarding any gradients already present.
    pub fn new(encoder: Rc<dyn Encoder>) -> Self {
        for param in encoder.params() {
            param.set_requires_grad(false);
            param.zero_grad();
        }
        Self { inner: encoder }
    }

    /// Forward through the teacher. The output carries no tape: with every
    /// parameter excluded from gradient tracking, no backward op attaches.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        self.inner.forward(x)
    }

    /// Read access to the parameters (for synchronization and inspection).
    pub fn params(&self) -> Vec<Tensor> {
        self.inner.params()
    }

    /// Feature dimensionality.
    pub fn embed_dim(&self) -> usize {
        self.inner.embed_dim()
    }

    /// Apply the momentum copy rule from the student's parameters.
    pub fn momentum_update(&self, student_params: &[Tensor], momentum: f32) {
        ema_update(&self.params(), student_params, momentum);
    }
}

/// Trainer callback that synchronizes the teacher after every optimizer
/// step, at the momentum given by the schedule.
pub struct EmaWeightSync {
    student: Vec<Tensor>,
    teacher: Rc<TeacherEncoder>,
    schedule: MomentumSchedule,
}

impl EmaWeightSync {
    /// Create the synchronization callback.
    pub fn new(
        student: Vec<Tensor>,
        teacher: Rc<TeacherEncoder>,
        schedule: MomentumSchedule,
    ) -> Self {
        Self {
            student,
            teacher,
            schedule,
        }
    }
}

impl TrainerCallback for EmaWeightSync {
    fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let momentum = self.schedule.value_at(ctx.global_step.saturating_sub(1));
        self.teacher.momentum_update(&self.student, momentum);
        CallbackAction::Continue
    }

    fn name(&self) -> &'static str {
        "EmaWeightSync"
    }
}
