use super::Pipe;
use crate::error::Result;
use crate::storage::Record;

/// [`Shifter`] 如何处理落在上游之外的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// 保持上游长度，用 [`Record::blank`] 填充
    Blank,
    /// 直接丢弃，流变短 `|delta|` 个元素
    Omit,
}

/// 第 `i` 个元素是上游的第 `i + delta` 个。
///
/// 使用 [`Boundary::Omit`] 时结果从零重新编号：正向平移得到上游的后缀，
/// 负向平移得到前缀。
pub struct Shifter<P> {
    up: P,
    delta: isize,
    boundary: Boundary,
    pos: usize,
    up_pos: usize,
}

impl<P: Pipe> Shifter<P> {
    pub fn new(up: P, delta: isize, boundary: Boundary) -> Self {
        Self { up, delta, boundary, pos: 0, up_pos: 0 }
    }

    /// 输出位置 `pos` 对应的上游下标（若有）。
    fn source_index(&self, pos: usize) -> Option<usize> {
        let n = self.up.len();
        let src = match (self.boundary, self.delta >= 0) {
            (Boundary::Blank, _) | (Boundary::Omit, true) => pos as isize + self.delta,
            (Boundary::Omit, false) => pos as isize,
        };
        (src >= 0 && (src as usize) < n).then_some(src as usize)
    }

    fn seek_upstream(&mut self, target: usize) -> Result<()> {
        while self.up_pos < target {
            self.up.advance()?;
            self.up_pos += 1;
        }
        Ok(())
    }

    /// 负向平移挤出末尾的上游元素，按原顺序。
    /// 须在平移后的流读到末尾之后调用。
    pub fn dropped_tail(&mut self) -> Result<Vec<P::Item>> {
        if self.delta >= 0 {
            return Ok(Vec::new());
        }
        let n = self.up.len();
        let start = n.saturating_sub(self.delta.unsigned_abs());
        self.seek_upstream(start)?;
        let mut tail = Vec::with_capacity(n - start);
        while !self.up.at_end() {
            tail.push(self.up.current()?);
            self.up.advance()?;
            self.up_pos += 1;
        }
        Ok(tail)
    }
}

impl<P: Pipe> Pipe for Shifter<P> {
    type Item = P::Item;

    fn len(&self) -> usize {
        let n = self.up.len();
        match self.boundary {
            Boundary::Blank => n,
            Boundary::Omit => n.saturating_sub(self.delta.unsigned_abs()),
        }
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        self.up_pos = 0;
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    fn current(&mut self) -> Result<P::Item> {
        match self.source_index(self.pos) {
            Some(src) => {
                self.seek_upstream(src)?;
                self.up.current()
            }
            None => Ok(P::Item::blank()),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{collect, Source};

    const DATA: [u8; 5] = [1, 2, 3, 4, 5];

    fn shifted(delta: isize, boundary: Boundary) -> Vec<u8> {
        collect(&mut Shifter::new(Source::new(&DATA), delta, boundary)).unwrap()
    }

    #[test]
    fn blank_boundary_keeps_length() {
        assert_eq!(shifted(2, Boundary::Blank), vec![3, 4, 5, 0, 0]);
        assert_eq!(shifted(-1, Boundary::Blank), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn omit_boundary_shortens() {
        assert_eq!(shifted(2, Boundary::Omit), vec![3, 4, 5]);
        assert_eq!(shifted(-2, Boundary::Omit), vec![1, 2, 3]);
        assert!(shifted(7, Boundary::Omit).is_empty());
    }

    #[test]
    fn negative_shift_reports_dropped_tail() {
        let mut s = Shifter::new(Source::new(&DATA), -2, Boundary::Blank);
        s.begin_read().unwrap();
        while s.next_item().unwrap().is_some() {}
        assert_eq!(s.dropped_tail().unwrap(), vec![4, 5]);
    }
}
