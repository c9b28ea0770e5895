use crate::error::Result;
use crate::pipe::{read_past_end, Pipe, Sink};

use super::Record;

/// 行为与分页 [`super::ExtVec`] 一致的内存缓冲。
#[derive(Debug, Clone, Default)]
pub struct MemVec<T> {
    data: Vec<T>,
    pos: usize,
}

impl<T: Record> MemVec<T> {
    pub fn new() -> Self {
        Self { data: Vec::new(), pos: 0 }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Record> Pipe for MemVec<T> {
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

impl<T: Record> Sink<T> for MemVec<T> {
    fn begin_write(&mut self) -> Result<()> {
        self.data.clear();
        self.pos = 0;
        Ok(())
    }

    fn push(&mut self, value: T) -> Result<()> {
        self.data.push(value);
        Ok(())
    }

    fn end_write(&mut self) -> Result<()> {
        Ok(())
    }
}
