use std::fmt::Debug;
use std::hash::Hash;

/// Wrapping sequence number compared with half-range arithmetic.
///
/// `a` is newer than `b` when it is ahead by at most half the number space,
/// so comparisons stay correct across the wrap from `MAX` back to zero.
pub trait Sequence: Copy + Eq + Hash + Debug + Default {
    const HALF_RANGE: Self;

    fn greater_than(self, other: Self) -> bool;

    #[inline]
    fn less_than(self, other: Self) -> bool {
        other.greater_than(self)
    }

    fn next(self) -> Self;
    fn prev(self) -> Self;

    /// Moves `count` steps into the past, wrapping.
    fn back(self, count: u32) -> Self;

    /// Number of steps from `older` to `self`, wrapping.
    fn distance(self, older: Self) -> u32;

    fn slot(self, capacity: usize) -> usize;
}

macro_rules! impl_sequence {
    ($ty:ty) => {
        impl Sequence for $ty {
            const HALF_RANGE: Self = <$ty>::MAX / 2 + 1;

            #[inline]
            fn greater_than(self, other: Self) -> bool {
                ((self > other) && (self - other <= Self::HALF_RANGE))
                    || ((self < other) && (other - self > Self::HALF_RANGE))
            }

            #[inline]
            fn next(self) -> Self {
                self.wrapping_add(1)
            }

            #[inline]
            fn prev(self) -> Self {
                self.wrapping_sub(1)
            }

            #[inline]
            fn back(self, count: u32) -> Self {
                self.wrapping_sub(count as $ty)
            }

            #[inline]
            fn distance(self, older: Self) -> u32 {
                self.wrapping_sub(older) as u32
            }

            #[inline]
            fn slot(self, capacity: usize) -> usize {
                self as usize % capacity
            }
        }
    };
}

impl_sequence!(u16);
impl_sequence!(u32);

#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    s1.greater_than(s2)
}

#[inline]
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    s1.less_than(s2)
}

#[inline]
pub fn frame_greater_than(f1: u32, f2: u32) -> bool {
    f1.greater_than(f2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u16::MAX));
        assert!(!sequence_greater_than(u16::MAX, 0));
        assert!(sequence_less_than(u16::MAX, 0));
        assert!(!sequence_greater_than(5, 5));
        assert!(!sequence_less_than(5, 5));
    }

    #[test]
    fn half_range_boundary_u16() {
        assert!(sequence_greater_than(32768, 0));
        assert!(!sequence_greater_than(32769, 0));
        assert!(sequence_greater_than(0, 32769));
        assert!(!sequence_greater_than(0, 32768));
    }

    #[test]
    fn exhaustive_antisymmetry_u16() {
        for a in (0..=u16::MAX).step_by(7) {
            for offset in [1u16, 2, 100, 32767, 32768, 32769, 65535] {
                let b = a.wrapping_add(offset);
                let forward = b.greater_than(a);
                let backward = a.greater_than(b);
                assert!(!(forward && backward), "a={a} b={b}");
                assert!(forward || backward, "a={a} b={b}");
            }
            assert!(!a.greater_than(a));
        }
    }

    #[test]
    fn every_step_forward_is_newer_u16() {
        let mut seq: u16 = 65000;
        for _ in 0..2000 {
            let next = seq.next();
            assert!(next.greater_than(seq));
            assert!(seq.less_than(next));
            assert_eq!(next.distance(seq), 1);
            seq = next;
        }
    }

    #[test]
    fn test_frame_comparison() {
        assert!(frame_greater_than(1, 0));
        assert!(frame_greater_than(0, u32::MAX));
        assert!(!frame_greater_than(u32::MAX, 0));
        assert!(frame_greater_than(u32::MAX / 2 + 1, 0));
        assert!(!frame_greater_than(u32::MAX / 2 + 2, 0));
    }

    #[test]
    fn back_and_distance_wrap() {
        assert_eq!(3u16.back(5), 65534);
        assert_eq!(3u16.distance(65534), 5);
        assert_eq!(10u32.back(20), u32::MAX - 9);
        assert_eq!(3u16.slot(256), 3);
        assert_eq!(65535u16.slot(256), 255);
    }
}
