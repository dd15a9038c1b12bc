use glam::DVec3;

/// Conservative sign classification of a scalar field over a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalClass {
    /// f > 0 everywhere in the box.
    Positive,
    /// f < 0 everywhere in the box.
    Negative,
    /// The sign could not be proven uniform.
    Ambiguous,
}

/// Scalar-field handle consumed by the octree builder.
///
/// Implementations must be total: they may return NaN, which the builder
/// treats as "outside" (for `value`) or as a skipped sample (for `derivs`),
/// but they must not panic. `Positive`/`Negative` from `interval` are trusted
/// to prune whole subtrees, so they must only be returned when the sign is
/// uniform over the entire box; `Ambiguous` is always safe.
pub trait Evaluator {
    /// f at a point.
    fn value(&self, p: DVec3) -> f64;

    /// Conservative sign of f over `[lo, hi]`.
    fn interval(&self, lo: DVec3, hi: DVec3) -> IntervalClass;

    /// f and its gradient at a point. The gradient need not be normalized;
    /// the caller normalizes (and drops zero or NaN gradients).
    fn derivs(&self, p: DVec3) -> (f64, DVec3);
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn value(&self, p: DVec3) -> f64 {
        (**self).value(p)
    }

    fn interval(&self, lo: DVec3, hi: DVec3) -> IntervalClass {
        (**self).interval(lo, hi)
    }

    fn derivs(&self, p: DVec3) -> (f64, DVec3) {
        (**self).derivs(p)
    }
}

/// Adapts a plain distance function `Fn(DVec3) -> f64` to [`Evaluator`].
///
/// Gradients come from central differencing. The interval test compares the
/// field's magnitude at the box center against the padded half-diagonal, which
/// is sound for Lipschitz-1 signed distance fields; for fields that over- or
/// understate distance it degrades to `Ambiguous` answers, never to wrong
/// ones, as long as the Lipschitz bound holds.
pub struct DistanceField<F> {
    f: F,
    delta: f64,
}

/// Padding on the half-diagonal pruning test.
const PRUNE_PAD: f64 = 1.01;

impl<F: Fn(DVec3) -> f64> DistanceField<F> {
    pub fn new(f: F) -> Self {
        Self { f, delta: 1e-4 }
    }

    /// Override the central-difference step.
    pub fn with_gradient_step(f: F, delta: f64) -> Self {
        Self { f, delta }
    }
}

impl<F: Fn(DVec3) -> f64> Evaluator for DistanceField<F> {
    fn value(&self, p: DVec3) -> f64 {
        (self.f)(p)
    }

    fn interval(&self, lo: DVec3, hi: DVec3) -> IntervalClass {
        let center = 0.5 * (lo + hi);
        let half_diag = 0.5 * (hi - lo).length();
        let d = (self.f)(center);
        if d > PRUNE_PAD * half_diag {
            IntervalClass::Positive
        } else if d < -PRUNE_PAD * half_diag {
            IntervalClass::Negative
        } else {
            IntervalClass::Ambiguous
        }
    }

    fn derivs(&self, p: DVec3) -> (f64, DVec3) {
        (
            (self.f)(p),
            central_gradient(&self.f, p, self.delta),
        )
    }
}

/// Central-difference gradient estimate with step `delta`.
pub fn central_gradient(f: impl Fn(DVec3) -> f64, p: DVec3, delta: f64) -> DVec3 {
    let h = 0.5 * delta;
    let dx = DVec3::new(h, 0.0, 0.0);
    let dy = DVec3::new(0.0, h, 0.0);
    let dz = DVec3::new(0.0, 0.0, h);
    DVec3::new(
        f(p + dx) - f(p - dx),
        f(p + dy) - f(p - dy),
        f(p + dz) - f(p - dz),
    ) / delta
}
