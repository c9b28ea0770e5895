use std::collections::VecDeque;

use super::Pipe;
use crate::error::Result;
use crate::storage::Record;

/// [`Echoer`] 在位置 `i` 给出哪 `W` 个元素。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `up[i-W+1..=i]`，前端补空白
    Trailing,
    /// `up[i..i+W]`，越过末尾补空白
    Leading,
}

/// 在每个位置输出上游相邻元素的定长窗口，旧元素在前。
/// 最多缓存 `W` 个上游元素。
pub struct Echoer<P: Pipe, const W: usize> {
    up: P,
    window: Window,
    buf: VecDeque<P::Item>,
    buf_start: usize,
    pulled: usize,
    pos: usize,
}

impl<P: Pipe, const W: usize> Echoer<P, W> {
    pub fn new(up: P, window: Window) -> Self {
        Self { up, window, buf: VecDeque::with_capacity(W + 1), buf_start: 0, pulled: 0, pos: 0 }
    }

    pub fn trailing(up: P) -> Self {
        Self::new(up, Window::Trailing)
    }

    pub fn leading(up: P) -> Self {
        Self::new(up, Window::Leading)
    }

    fn pull(&mut self) -> Result<()> {
        let v = self.up.current()?;
        self.up.advance()?;
        self.buf.push_back(v);
        self.pulled += 1;
        Ok(())
    }
}

impl<P: Pipe, const W: usize> Pipe for Echoer<P, W> {
    type Item = [P::Item; W];

    fn len(&self) -> usize {
        self.up.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.buf.clear();
        self.buf_start = 0;
        self.pulled = 0;
        self.pos = 0;
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    fn current(&mut self) -> Result<Self::Item> {
        let n = self.up.len();
        let mut out = [P::Item::blank(); W];
        match self.window {
            Window::Trailing => {
                while self.pulled <= self.pos && self.pulled < n {
                    self.pull()?;
                    if self.buf.len() > W {
                        self.buf.pop_front();
                    }
                }
                let skip = W - self.buf.len();
                for (slot, v) in out[skip..].iter_mut().zip(self.buf.iter()) {
                    *slot = *v;
                }
            }
            Window::Leading => {
                while self.buf_start < self.pos && !self.buf.is_empty() {
                    self.buf.pop_front();
                    self.buf_start += 1;
                }
                // 调用方未读取就跳过的位置
                while self.pulled < self.pos.min(n) {
                    self.up.advance()?;
                    self.pulled += 1;
                }
                if self.buf.is_empty() {
                    self.buf_start = self.pulled;
                }
                while self.pulled < n.min(self.pos + W) {
                    self.pull()?;
                }
                for (slot, v) in out.iter_mut().zip(self.buf.iter()) {
                    *slot = *v;
                }
            }
        }
        Ok(out)
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

    const DATA: [u32; 4] = [1, 2, 3, 4];

    #[test]
    fn trailing_pairs() {
        let mut e: Echoer<_, 2> = Echoer::trailing(Source::new(&DATA));
        assert_eq!(collect(&mut e).unwrap(), vec![[0, 1], [1, 2], [2, 3], [3, 4]]);
    }

    #[test]
    fn leading_triples() {
        let mut e: Echoer<_, 3> = Echoer::leading(Source::new(&DATA));
        assert_eq!(
            collect(&mut e).unwrap(),
            vec![[1, 2, 3], [2, 3, 4], [3, 4, 0], [4, 0, 0]]
        );
    }

    #[test]
    fn leading_survives_skipped_positions() {
        let mut e: Echoer<_, 2> = Echoer::leading(Source::new(&DATA));
        e.begin_read().unwrap();
        e.advance().unwrap();
        e.advance().unwrap();
        assert_eq!(e.current().unwrap(), [3, 4]);
        e.advance().unwrap();
        assert_eq!(e.current().unwrap(), [4, 0]);
    }

    #[test]
    fn window_wider_than_stream() {
        let mut e: Echoer<_, 3> = Echoer::trailing(Source::new(&DATA[..1]));
        assert_eq!(collect(&mut e).unwrap(), vec![[0, 0, 1]]);
    }
}
