//! Difference-bound matrices for clock zones.
//!
//! A zone over clocks `x1..xn` is a conjunction of constraints
//! `xi - xj <= c` (or `<`), stored as an `(n+1)x(n+1)` matrix where index 0
//! is the reference clock fixed at value 0. Bounds are packed into an `i32`
//! as `(c << 1) | weak`, with `weak = 1` for `<=` and `0` for `<`; larger
//! packed values are looser bounds, so `min` tightens and addition of packed
//! bounds composes constraints.

use crate::model::RelOp;

/// Packed bound representing `< inf`.
pub const INF: i32 = i32::MAX;

/// Packed non-strict bound `<= c`.
#[inline]
pub fn le(c: i32) -> i32 {
    (c << 1) | 1
}

/// Packed strict bound `< c`.
#[inline]
pub fn lt(c: i32) -> i32 {
    c << 1
}

#[inline]
fn bound_add(a: i32, b: i32) -> i32 {
    if a == INF || b == INF {
        INF
    } else {
        // Constants add; the result is weak only if both are weak.
        ((a >> 1) + (b >> 1)) << 1 | (a & b & 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dbm {
    dim: usize,
    m: Vec<i32>,
}

impl Dbm {
    /// The zone where every clock equals zero.
    pub fn zero(clocks: usize) -> Self {
        let dim = clocks + 1;
        Self {
            dim,
            m: vec![le(0); dim * dim],
        }
    }

    #[inline]
    fn at(&self, i: usize, j: usize) -> i32 {
        self.m[i * self.dim + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, b: i32) {
        self.m[i * self.dim + j] = b;
    }

    pub fn is_empty(&self) -> bool {
        self.at(0, 0) < le(0)
    }

    /// Floyd-Warshall shortest paths; an inconsistent zone shows up as a
    /// negative cycle on the diagonal.
    pub fn canonicalize(&mut self) {
        let dim = self.dim;
        for k in 0..dim {
            for i in 0..dim {
                for j in 0..dim {
                    let via = bound_add(self.at(i, k), self.at(k, j));
                    if via < self.at(i, j) {
                        self.set(i, j, via);
                    }
                }
            }
        }
        for i in 0..dim {
            if self.at(i, i) < le(0) {
                // Mark empty canonically.
                self.set(0, 0, lt(0));
                return;
            }
        }
    }

    /// Intersect with `xi - xj <bound>` without re-canonicalizing.
    fn and_raw(&mut self, i: usize, j: usize, b: i32) {
        if b < self.at(i, j) {
            self.set(i, j, b);
        }
    }

    /// Intersect with an atomic constraint `clock op val`. The caller is
    /// expected to canonicalize afterwards. `Ne` is rejected at parse time.
    pub fn constrain(&mut self, clock: usize, op: RelOp, val: i32) {
        let i = clock + 1;
        match op {
            RelOp::Lt => self.and_raw(i, 0, lt(val)),
            RelOp::Le => self.and_raw(i, 0, le(val)),
            RelOp::Gt => self.and_raw(0, i, lt(-val)),
            RelOp::Ge => self.and_raw(0, i, le(-val)),
            RelOp::Eq => {
                self.and_raw(i, 0, le(val));
                self.and_raw(0, i, le(-val));
            }
            RelOp::Ne => unreachable!("`!=` on clocks is rejected by the model parser"),
        }
    }

    /// Let time elapse: drop every upper bound on individual clocks.
    pub fn up(&mut self) {
        for i in 1..self.dim {
            self.set(i, 0, INF);
        }
    }

    /// Reset `clock` to the constant `val`. Assumes canonical form.
    pub fn reset(&mut self, clock: usize, val: i32) {
        let i = clock + 1;
        for j in 0..self.dim {
            if j != i {
                self.set(i, j, bound_add(le(val), self.at(0, j)));
                self.set(j, i, bound_add(self.at(j, 0), le(-val)));
            }
        }
        self.set(i, i, le(0));
    }

    /// Classic k-extrapolation: bounds above `k` are abstracted to infinity
    /// and bounds below `-k` are clamped, keeping the zone graph finite.
    /// Assumes canonical form; leaves the matrix canonical.
    pub fn extrapolate(&mut self, k: i32) {
        let mut changed = false;
        for i in 0..self.dim {
            for j in 0..self.dim {
                if i == j {
                    continue;
                }
                let b = self.at(i, j);
                if b != INF && b > le(k) {
                    self.set(i, j, INF);
                    changed = true;
                } else if b < lt(-k) {
                    self.set(i, j, lt(-k));
                    changed = true;
                }
            }
        }
        if changed {
            self.canonicalize();
        }
    }

    /// Lower/upper packed bounds of a single clock, for display.
    pub fn clock_bounds(&self, clock: usize) -> (i32, i32) {
        let i = clock + 1;
        (self.at(0, i), self.at(i, 0))
    }
}
