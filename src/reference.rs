//! Lightweight handles for BDD nodes.
//!
//! A [`Ref`] packs a node index and a complement flag into a single `i32`:
//! negative values denote the negation of the function rooted at the index.
//! Negation is therefore free, and the terminal `0` is simply the negation
//! of the terminal `1`.

use std::fmt::{Display, Formatter};
use std::ops::Neg;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Ref(i32);

impl Ref {
    /// A positive (non-complemented) reference to the node at `index`.
    pub(crate) const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(&self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Index of the referenced node, ignoring the complement flag.
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// Sign-folded representation used for hashing: `2*index + negated`.
    pub(crate) const fn unsigned(self) -> u32 {
        (self.0.unsigned_abs() << 1) | (self.0 < 0) as u32
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_involution() {
        let r = Ref::positive(7);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 7);
    }

    #[test]
    fn test_unsigned_distinguishes_sign() {
        let r = Ref::positive(3);
        assert_ne!(r.unsigned(), (-r).unsigned());
    }
}
