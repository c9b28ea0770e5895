use super::{read_past_end, Pipe};
use crate::error::Result;
use crate::storage::Record;

/// 借用切片上的管道。
#[derive(Debug, Clone)]
pub struct Source<'a, T> {
    data: &'a [T],
    pos: usize,
}

impl<'a, T: Record> Source<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<T: Record> Pipe for Source<'_, T> {
    type Item = T;

    fn len(&self) -> usize {
        self.data.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn current(&mut self) -> Result<T> {
        self.data.get(self.pos).copied().ok_or_else(read_past_end)
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }
}
