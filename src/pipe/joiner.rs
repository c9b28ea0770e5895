use super::Pipe;
use crate::error::{IndexError, Result};

/// 逐位置对齐的两条流拉链合并。
pub struct Joiner<A, B> {
    left: A,
    right: B,
}

impl<A: Pipe, B: Pipe> Joiner<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self { left, right }
    }

    pub fn left(&mut self) -> &mut A {
        &mut self.left
    }

    pub fn right(&mut self) -> &mut B {
        &mut self.right
    }
}

impl<A: Pipe, B: Pipe> Pipe for Joiner<A, B> {
    type Item = (A::Item, B::Item);

    fn len(&self) -> usize {
        self.left.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        if self.left.len() != self.right.len() {
            return Err(IndexError::invariant(format!(
                "joined streams differ in length: {} vs {}",
                self.left.len(),
                self.right.len()
            )));
        }
        self.left.begin_read()?;
        self.right.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.left.end_read()?;
        self.right.end_read()
    }

    fn at_end(&self) -> bool {
        self.left.at_end()
    }

    fn current(&mut self) -> Result<Self::Item> {
        Ok((self.left.current()?, self.right.current()?))
    }

    fn advance(&mut self) -> Result<()> {
        self.left.advance()?;
        self.right.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{collect, Source};

    #[test]
    fn zips_in_lockstep() {
        let a = [1u8, 2, 3];
        let b = [10u32, 20, 30];
        let mut j = Joiner::new(Source::new(&a), Source::new(&b));
        assert_eq!(collect(&mut j).unwrap(), vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn length_mismatch_is_an_invariant_violation() {
        let a = [1u8, 2, 3];
        let b = [10u32];
        let mut j = Joiner::new(Source::new(&a), Source::new(&b));
        let err = j.begin_read().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);
    }
}
