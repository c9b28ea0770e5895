use super::Pipe;
use crate::error::Result;
use crate::storage::Record;

/// 逐元素经 `f` 变换。
pub struct Filter<P, F> {
    up: P,
    f: F,
}

impl<P: Pipe, F> Filter<P, F> {
    pub fn new(up: P, f: F) -> Self {
        Self { up, f }
    }
}

impl<P, F, U> Pipe for Filter<P, F>
where
    P: Pipe,
    F: Fn(P::Item) -> U,
    U: Record,
{
    type Item = U;

    fn len(&self) -> usize {
        self.up.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.up.at_end()
    }

    fn current(&mut self) -> Result<U> {
        Ok((self.f)(self.up.current()?))
    }

    fn advance(&mut self) -> Result<()> {
        self.up.advance()
    }
}

/// 给每个元素配上其下标。
pub struct Counter<P> {
    up: P,
    pos: u64,
}

impl<P: Pipe> Counter<P> {
    pub fn new(up: P) -> Self {
        Self { up, pos: 0 }
    }
}

impl<P: Pipe> Pipe for Counter<P> {
    type Item = (u64, P::Item);

    fn len(&self) -> usize {
        self.up.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.up.at_end()
    }

    fn current(&mut self) -> Result<Self::Item> {
        Ok((self.pos, self.up.current()?))
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        self.up.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{collect, Source};

    #[test]
    fn counter_restarts_from_zero() {
        let data = [5u8, 6, 7];
        let mut c = Counter::new(Source::new(&data));
        let expect = vec![(0, 5), (1, 6), (2, 7)];
        assert_eq!(collect(&mut c).unwrap(), expect);
        assert_eq!(collect(&mut c).unwrap(), expect);
    }

    #[test]
    fn filter_projects_pairs() {
        let data = [(1u32, 10u8), (2, 20)];
        let mut f = Filter::new(Source::new(&data), |(a, b): (u32, u8)| a + u32::from(b));
        assert_eq!(collect(&mut f).unwrap(), vec![11, 22]);
    }
}
