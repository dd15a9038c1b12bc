use glam::DVec3;
use nalgebra::{Matrix4, Vector4};

/// Singular values below `RANK_CUTOFF * sigma_max` are treated as zero.
const RANK_CUTOFF: f64 = 1e-10;

/// Least-squares accumulator for plane samples, solved by SVD pseudo-inverse.
///
/// Each sample `(p, n, v)` constrains the field near the surface: moving a
/// point `x` off the sample plane changes the predicted field value `w` as
/// `w = n·(x - p) + v`, which contributes the row `[n | -1] · [x; w] =
/// n·p - v` to an overdetermined system. The spatial dimension is a runtime
/// parameter (the same accumulator serves 1D, 2D, and 3D problems), and the
/// value coordinate `w` rides along as one extra axis; coordinates beyond
/// `dim` in any argument are ignored.
///
/// Projections (`sub`, `solve_constrained`) fix a subset of the coordinates
/// and absorb them into the right-hand side, yielding a lower-dimensional
/// problem over the remaining ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Qef {
    /// Spatial dimensionality of the problem (0..=3).
    dim: usize,
    /// Whether the value coordinate is still part of the unknowns.
    value_axis: bool,
    /// Value the `w` coordinate was fixed at, when `value_axis` is false.
    held_value: f64,
    ata: Matrix4<f64>,
    atb: Vector4<f64>,
    btb: f64,
    /// Running sum of `[p; v]` over all samples.
    mass: Vector4<f64>,
    samples: u32,
}

/// Result of a QEF solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    /// Minimizing position; coordinates beyond the problem dimension are 0.
    pub position: DVec3,
    /// Field value at the solution.
    pub value: f64,
    /// Exact residual `‖A·[x; w] - b‖²`.
    pub error: f64,
    /// Independent constraint directions, excluding the value axis.
    pub rank: usize,
}

impl Qef {
    /// An empty accumulator over `dim` spatial axes plus the value axis.
    pub fn new(dim: usize) -> Self {
        assert!((1..=3).contains(&dim), "QEF dimension must be 1..=3");
        Self {
            dim,
            value_axis: true,
            held_value: 0.0,
            ata: Matrix4::zeros(),
            atb: Vector4::zeros(),
            btb: 0.0,
            mass: Vector4::zeros(),
            samples: 0,
        }
    }

    /// Number of coordinates still being solved for.
    fn active(&self) -> usize {
        self.dim + self.value_axis as usize
    }

    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    /// Average of the accumulated `[p; v]` samples; zero when empty.
    fn center(&self) -> Vector4<f64> {
        if self.samples == 0 {
            Vector4::zeros()
        } else {
            self.mass / self.samples as f64
        }
    }

    /// Accumulate one plane sample. Only valid on an unprojected problem.
    pub fn insert(&mut self, p: DVec3, n: DVec3, v: f64) {
        debug_assert!(self.value_axis, "insert after the value axis was fixed");
        let p = [p.x, p.y, p.z];
        let n = [n.x, n.y, n.z];

        let mut row = Vector4::zeros();
        let mut beta = -v;
        for a in 0..self.dim {
            row[a] = n[a];
            beta += n[a] * p[a];
        }
        row[self.dim] = -1.0;

        self.ata += row * row.transpose();
        self.atb += row * beta;
        self.btb += beta * beta;
        for a in 0..self.dim {
            self.mass[a] += p[a];
        }
        self.mass[self.dim] += v;
        self.samples += 1;
    }

    /// `‖A·x - b‖²` at a candidate (padded) solution vector.
    fn residual(&self, x: &Vector4<f64>) -> f64 {
        let e = (x.transpose() * self.ata * x)[0] - 2.0 * x.dot(&self.atb) + self.btb;
        e.max(0.0)
    }

    /// Pseudo-inverse step: the least-squares minimizer closest to `x0`.
    ///
    /// Returns the solution vector and the number of singular values above
    /// the rank cutoff. Coordinates beyond the active block stay at zero.
    fn minimize(&self, x0: Vector4<f64>) -> (Vector4<f64>, usize) {
        let svd = self.ata.svd(true, true);
        let sigma_max = svd.singular_values.max();
        let eps = RANK_CUTOFF * sigma_max;
        let rank = svd.rank(eps);
        let rhs = self.atb - self.ata * x0;
        match svd.solve(&rhs, eps) {
            Ok(dx) => (x0 + dx, rank),
            Err(_) => (x0, rank),
        }
    }

    fn solution_at(&self, x: Vector4<f64>, svd_rank: usize) -> Solution {
        let mut position = [0.0; 3];
        position[..self.dim].copy_from_slice(&x.as_slice()[..self.dim]);
        Solution {
            position: DVec3::from_array(position),
            value: if self.value_axis {
                x[self.dim]
            } else {
                self.held_value
            },
            error: self.residual(&x),
            rank: svd_rank - (self.value_axis && svd_rank > 0) as usize,
        }
    }

    /// Minimum-norm least-squares solution.
    pub fn solve(&self) -> Solution {
        let (x, rank) = self.minimize(Vector4::zeros());
        self.solution_at(x, rank)
    }

    /// The least-squares minimizer closest to `(target, target_value)`.
    ///
    /// Along fully constrained directions this is the unique solution; along
    /// unconstrained ones the target wins.
    pub fn solve_toward(&self, target: DVec3, target_value: f64) -> Solution {
        let (x, rank) = self.minimize(self.pad_target(target, target_value));
        self.solution_at(x, rank)
    }

    /// Ridge-regularized solve: `(AᵀA + wI)⁻¹ (Aᵀb + w·[target; value])`.
    ///
    /// With `weight > 0` the system is almost always nonsingular; if inversion
    /// still fails the mass point is returned with rank 0.
    pub fn solve_regularized(&self, target: DVec3, target_value: f64, weight: f64) -> Solution {
        let x0 = self.pad_target(target, target_value);
        let mut m = self.ata;
        for a in 0..self.active() {
            m[(a, a)] += weight;
        }
        // Inactive padding coordinates get a unit diagonal so they do not
        // make the 4x4 singular; their right-hand side is zero.
        for a in self.active()..4 {
            m[(a, a)] = 1.0;
        }
        match m.try_inverse() {
            Some(inv) => {
                let x = inv * (self.atb + weight * x0);
                let svd = self.ata.svd(false, false);
                let rank = svd.rank(RANK_CUTOFF * svd.singular_values.max());
                self.solution_at(x, rank)
            }
            None => self.solution_at(self.center(), 0),
        }
    }

    fn pad_target(&self, target: DVec3, target_value: f64) -> Vector4<f64> {
        let t = [target.x, target.y, target.z];
        let mut x0 = Vector4::zeros();
        for a in 0..self.dim {
            x0[a] = t[a];
        }
        if self.value_axis {
            x0[self.dim] = target_value;
        }
        x0
    }

    /// Project onto a coordinate subset.
    ///
    /// `mask` is a bitset over the `dim + 1` active coordinates with the
    /// value axis as the highest bit. Removed coordinates are fixed at the
    /// mass-point (and mean-value) entries and folded into the right-hand
    /// side; kept spatial coordinates are compacted downward, so the
    /// projected problem's solutions live in its own 0-based coordinates.
    pub fn sub(&self, mask: u8) -> Qef {
        debug_assert!(self.value_axis);
        let keep_value = mask & (1 << self.dim) != 0;
        self.project(mask, keep_value, self.center())
    }

    fn project(&self, keep_spatial: u8, keep_value: bool, fixed: Vector4<f64>) -> Qef {
        let kept: Vec<usize> = (0..self.dim)
            .filter(|a| keep_spatial & (1 << a) != 0)
            .chain((self.value_axis && keep_value).then_some(self.dim))
            .collect();
        let removed: Vec<usize> = (0..self.active()).filter(|a| !kept.contains(a)).collect();

        let mut out = Qef {
            dim: kept.len() - keep_value as usize,
            value_axis: keep_value,
            held_value: if self.value_axis && !keep_value {
                fixed[self.dim]
            } else {
                self.held_value
            },
            ata: Matrix4::zeros(),
            atb: Vector4::zeros(),
            btb: self.btb,
            mass: Vector4::zeros(),
            samples: self.samples,
        };

        for (i, &ki) in kept.iter().enumerate() {
            for (j, &kj) in kept.iter().enumerate() {
                out.ata[(i, j)] = self.ata[(ki, kj)];
            }
            out.atb[i] = self.atb[ki];
            for &r in &removed {
                out.atb[i] -= self.ata[(ki, r)] * fixed[r];
            }
            out.mass[i] = self.mass[ki];
        }
        for &r in &removed {
            out.btb -= 2.0 * self.atb[r] * fixed[r];
            for &s in &removed {
                out.btb += fixed[r] * self.ata[(r, s)] * fixed[s];
            }
        }
        out
    }

    /// Solve with coordinates pinned to the box boundary.
    ///
    /// `code` has one base-3 digit per spatial axis (least significant digit
    /// is X): 0 pins the axis at `lo`, 1 at `hi`, 2 leaves it free. Free
    /// coordinates solve toward the target; pinned ones are re-expanded into
    /// the returned position.
    pub fn solve_constrained(
        &self,
        code: u32,
        lo: DVec3,
        hi: DVec3,
        target: DVec3,
        target_value: f64,
    ) -> Solution {
        let lo = [lo.x, lo.y, lo.z];
        let hi = [hi.x, hi.y, hi.z];
        let t = [target.x, target.y, target.z];

        let mut keep_spatial = 0u8;
        let mut fixed = Vector4::zeros();
        for a in 0..self.dim {
            match (code / 3u32.pow(a as u32)) % 3 {
                0 => fixed[a] = lo[a],
                1 => fixed[a] = hi[a],
                _ => keep_spatial |= 1 << a,
            }
        }

        let q = self.project(keep_spatial, self.value_axis, fixed);

        // Compact the target into the projected coordinates.
        let mut sub_target = [0.0; 3];
        let mut i = 0;
        for a in 0..self.dim {
            if keep_spatial & (1 << a) != 0 {
                sub_target[i] = t[a];
                i += 1;
            }
        }
        let sol = q.solve_toward(DVec3::from_array(sub_target), target_value);

        // Re-expand pinned coordinates.
        let s = [sol.position.x, sol.position.y, sol.position.z];
        let mut position = [0.0; 3];
        let mut i = 0;
        for a in 0..self.dim {
            if keep_spatial & (1 << a) != 0 {
                position[a] = s[i];
                i += 1;
            } else {
                position[a] = fixed[a];
            }
        }
        Solution {
            position: DVec3::from_array(position),
            ..sol
        }
    }

    /// Solve, guaranteeing the returned position lies inside `[lo, hi]`.
    ///
    /// Tries the unconstrained solve toward the box center first; if that
    /// escapes the box, every boundary cell (face, edge, corner) is solved
    /// with the escaping coordinates pinned, and the best contained candidate
    /// wins: lowest error, then highest rank, then lexicographically smallest
    /// position. `corner_values` (field values at the `2^dim` box corners)
    /// supply the value-axis target as their mean. Falls back to the clamped
    /// mass point if every candidate is rejected.
    pub fn solve_bounded(&self, lo: DVec3, hi: DVec3, corner_values: &[f64]) -> Solution {
        let target = 0.5 * (lo + hi);
        let target_value = if self.value_axis && !corner_values.is_empty() {
            corner_values.iter().sum::<f64>() / corner_values.len() as f64
        } else {
            0.0
        };

        let sol = self.solve_toward(target, target_value);
        if self.in_box(sol.position, lo, hi) {
            return sol;
        }

        let mut best: Option<Solution> = None;
        let interior = 3u32.pow(self.dim as u32) - 1;
        for code in 0..interior {
            let sol = self.solve_constrained(code, lo, hi, target, target_value);
            if !self.in_box(sol.position, lo, hi) {
                continue;
            }
            let better = match &best {
                None => true,
                Some(b) => {
                    (sol.error, std::cmp::Reverse(sol.rank)) < (b.error, std::cmp::Reverse(b.rank))
                        || (sol.error == b.error
                            && sol.rank == b.rank
                            && lex_less(sol.position, b.position))
                }
            };
            if better {
                best = Some(sol);
            }
        }

        best.unwrap_or_else(|| {
            // Mass point, clamped into the box.
            let c = self.center();
            let lo = [lo.x, lo.y, lo.z];
            let hi = [hi.x, hi.y, hi.z];
            let mut p = [0.0; 3];
            for a in 0..self.dim {
                p[a] = c[a].clamp(lo[a], hi[a]);
            }
            let x = self.pad_target(
                DVec3::from_array(p),
                if self.value_axis { c[self.dim] } else { 0.0 },
            );
            Solution {
                rank: 0,
                ..self.solution_at(x, 0)
            }
        })
    }

    fn in_box(&self, p: DVec3, lo: DVec3, hi: DVec3) -> bool {
        let p = [p.x, p.y, p.z];
        let lo = [lo.x, lo.y, lo.z];
        let hi = [hi.x, hi.y, hi.z];
        (0..self.dim).all(|a| {
            let eps = 1e-9 * (hi[a] - lo[a]).abs().max(1.0);
            p[a] >= lo[a] - eps && p[a] <= hi[a] + eps
        })
    }
}

fn lex_less(a: DVec3, b: DVec3) -> bool {
    (a.x, a.y, a.z) < (b.x, b.y, b.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPS: f64 = 1e-9;

    /// Two coplanar samples with a shared normal: an underconstrained sheet.
    fn flat_sheet() -> Qef {
        let mut q = Qef::new(2);
        q.insert(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 0.0);
        q.insert(DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 0.0);
        q
    }

    #[test]
    fn flat_sheet_minimum_norm() {
        let sol = flat_sheet().solve();
        assert_abs_diff_eq!(sol.position.x, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_eq!(sol.rank, 0);
    }

    #[test]
    fn flat_sheet_takes_target_on_surface() {
        let sol = flat_sheet().solve_toward(DVec3::new(1.0, 0.0, 0.0), 0.0);
        assert_abs_diff_eq!(sol.position.x, 1.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_eq!(sol.rank, 0);
    }

    #[test]
    fn flat_sheet_splits_position_and_value_targets() {
        // Asking for value 1 on a sheet where value tracks the Y coordinate
        // walks halfway up.
        let sol = flat_sheet().solve_toward(DVec3::new(1.0, 0.0, 0.0), 1.0);
        assert_abs_diff_eq!(sol.position.x, 1.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_eq!(sol.rank, 0);
    }

    #[test]
    fn line_fully_constrained() {
        let mut q = Qef::new(1);
        q.insert(DVec3::new(1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), 3.0);
        q.insert(DVec3::new(4.0, 0.0, 0.0), DVec3::new(-0.5, 0.0, 0.0), 3.0);

        let sol = q.solve();
        assert_abs_diff_eq!(sol.position.x, 2.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 4.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_eq!(sol.rank, 1);

        // A fully constrained system ignores the target.
        let sol = q.solve_toward(DVec3::new(-97.0, 0.0, 0.0), 103.0);
        assert_abs_diff_eq!(sol.position.x, 2.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 4.0, epsilon = EPS);
        assert_eq!(sol.rank, 1);
    }

    #[test]
    fn sub_with_full_mask_is_identity() {
        let q = flat_sheet();
        let full = q.sub(0b111);
        let a = q.solve();
        let b = full.solve();
        assert_abs_diff_eq!(a.position.x, b.position.x, epsilon = EPS);
        assert_abs_diff_eq!(a.position.y, b.position.y, epsilon = EPS);
        assert_abs_diff_eq!(a.value, b.value, epsilon = EPS);
        assert_abs_diff_eq!(a.error, b.error, epsilon = EPS);
        assert_eq!(a.rank, b.rank);
    }

    #[test]
    fn sub_projects_onto_x() {
        // Keep only X (and the value axis): Y is fixed at the mass point.
        let q = flat_sheet().sub(0b101);
        let sol = q.solve_toward(DVec3::new(10.0, 0.0, 0.0), 0.0);
        assert_abs_diff_eq!(sol.position.x, 10.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
    }

    #[test]
    fn constrained_corners_and_edges() {
        let q = flat_sheet();
        let lo = DVec3::new(1.0, 0.0, 0.0);
        let hi = DVec3::new(2.0, 1.0, 0.0);
        let zero = DVec3::ZERO;

        // Both axes pinned low: the lower-left corner.
        let sol = q.solve_constrained(0, lo, hi, zero, 0.0);
        assert_abs_diff_eq!(sol.position.x, 1.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 0.0, epsilon = EPS);

        // X pinned high, Y low: the lower-right corner.
        let sol = q.solve_constrained(1, lo, hi, zero, 0.0);
        assert_abs_diff_eq!(sol.position.x, 2.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);

        // X free with a target, Y pinned low.
        let sol = q.solve_constrained(2, lo, hi, DVec3::new(0.75, 0.0, 0.0), 0.0);
        assert_abs_diff_eq!(sol.position.x, 0.75, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);

        // X pinned low, Y free: the value target pulls the sheet up with it.
        let sol = q.solve_constrained(6, lo, hi, DVec3::new(0.75, 0.75, 0.0), 0.75);
        assert_abs_diff_eq!(sol.position.x, 1.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.75, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 0.75, epsilon = EPS);

        // X pinned high, Y free with conflicting position and value targets:
        // the solver splits the difference.
        let sol = q.solve_constrained(7, lo, hi, DVec3::new(0.75, 0.75, 0.0), 0.25);
        assert_abs_diff_eq!(sol.position.x, 2.0, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 0.5, epsilon = EPS);
    }

    #[test]
    fn bounded_flat_sheet_centers() {
        let q = flat_sheet();
        let lo = DVec3::new(1.0, 0.0, 0.0);
        let hi = DVec3::new(2.0, 1.0, 0.0);
        let sol = q.solve_bounded(lo, hi, &[0.0, 0.0, 1.0, 1.0]);
        assert_abs_diff_eq!(sol.position.x, 1.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.value, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
    }

    #[test]
    fn bounded_solution_stays_in_box() {
        // Three planes meeting outside the box force the constrained path.
        let mut q = Qef::new(3);
        q.insert(DVec3::new(2.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), 0.0);
        q.insert(DVec3::new(0.0, 2.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 0.0);
        q.insert(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 0.0, 1.0), 0.0);

        let lo = DVec3::ZERO;
        let hi = DVec3::ONE;
        let sol = q.sub(0b0111).solve_bounded(lo, hi, &[0.0; 8]);
        for a in 0..3 {
            assert!(sol.position[a] >= lo[a] - EPS && sol.position[a] <= hi[a] + EPS);
        }
    }

    #[test]
    fn spatial_projection_recovers_sharp_corner() {
        // Three orthogonal planes through (0.5, 0.5, 0.5), values all zero:
        // the spatial sub-problem pins the corner exactly.
        let mut q = Qef::new(3);
        q.insert(DVec3::new(0.5, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), 0.0);
        q.insert(DVec3::new(0.0, 0.5, 0.0), DVec3::new(0.0, 1.0, 0.0), 0.0);
        q.insert(DVec3::new(0.0, 0.0, 0.5), DVec3::new(0.0, 0.0, 1.0), 0.0);

        let sol = q.sub(0b0111).solve_bounded(DVec3::ZERO, DVec3::ONE, &[0.0; 8]);
        assert_abs_diff_eq!(sol.position.x, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.y, 0.5, epsilon = EPS);
        assert_abs_diff_eq!(sol.position.z, 0.5, epsilon = EPS);
        assert_eq!(sol.rank, 3);
    }

    #[test]
    fn planar_samples_have_rank_one_and_keep_target() {
        // Samples on the plane z = 1 with identical normals.
        let mut q = Qef::new(3);
        let n = DVec3::new(0.0, 0.0, 1.0);
        q.insert(DVec3::new(0.0, 0.0, 1.0), n, 0.0);
        q.insert(DVec3::new(0.3, -0.2, 1.0), n, 0.0);
        q.insert(DVec3::new(-0.4, 0.8, 1.0), n, 0.0);

        let spatial = q.sub(0b0111);
        let sol = spatial.solve();
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = EPS);
        assert_eq!(sol.rank, 1);

        // With a positive weight the regularized solve reproduces any target
        // that already satisfies the constraints.
        let target = DVec3::new(0.25, -0.75, 1.0);
        let sol = spatial.solve_regularized(target, 0.0, 0.1);
        assert_abs_diff_eq!(sol.position.x, target.x, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.position.y, target.y, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.position.z, target.z, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.error, 0.0, epsilon = 1e-6);
    }
}
