//! Per-voxel attribute reducers.
//!
//! Each attribute of a voxel is folded independently: continuous values
//! (position, color, intensity) by [`MeanReducer`], categorical values
//! (classification) by [`ModeReducer`].

/// Folds the values of one attribute over the points of a voxel.
pub trait Reducer {
    type Input;
    type Output;

    /// Start from the first point's value.
    fn seed(value: Self::Input) -> Self;

    /// Fold in one more point.
    fn add(&mut self, value: Self::Input);

    /// Reduce to a single value; `count` is the number of points folded in.
    fn finish(&self, count: u32) -> Self::Output;
}

/// Component-wise running sum, finished as the arithmetic mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanReducer<const N: usize> {
    sum: [f32; N],
}

impl<const N: usize> Reducer for MeanReducer<N> {
    type Input = [f32; N];
    type Output = [f32; N];

    #[inline]
    fn seed(value: [f32; N]) -> Self {
        Self { sum: value }
    }

    #[inline]
    fn add(&mut self, value: [f32; N]) {
        for (s, v) in self.sum.iter_mut().zip(value) {
            *s += v;
        }
    }

    fn finish(&self, count: u32) -> [f32; N] {
        let count_f = count as f32;
        self.sum.map(|s| s / count_f)
    }
}

/// Frequency table finished as the most common value.
///
/// Values are kept in first-seen order, so ties go to the value that appeared
/// first in the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeReducer {
    counts: Vec<(u8, u32)>,
}

impl Reducer for ModeReducer {
    type Input = u8;
    type Output = u8;

    fn seed(value: u8) -> Self {
        Self {
            counts: vec![(value, 1)],
        }
    }

    fn add(&mut self, value: u8) {
        match self.counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, c)) => *c += 1,
            None => self.counts.push((value, 1)),
        }
    }

    fn finish(&self, _count: u32) -> u8 {
        let mut best = self.counts[0];
        for &(value, count) in &self.counts[1..] {
            if count > best.1 {
                best = (value, count);
            }
        }
        best.0
    }
}
