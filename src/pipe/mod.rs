//! 惰性、可重启的单遍流水线。
//!
//! [`Pipe`] 是定长记录序列上的游标，长度事先已知。组合子包裹上游管道，
//! 逐元素变换；除排序阶段外不物化任何数据。
//! 整个管道图从最后一级拉取驱动：`begin_read` 重置所有阶段，
//! 之后用 `current`/`advance` 走一遍。

mod echoer;
mod filter;
mod joiner;
mod sampler;
mod shifter;
mod sorter;
mod source;

pub use echoer::{Echoer, Window};
pub use filter::{Counter, Filter};
pub use joiner::Joiner;
pub use sampler::Sampler;
pub use shifter::{Boundary, Shifter};
pub use sorter::{Mapper, Sorter};
pub use source::Source;

use crate::error::{IndexError, Result};
use crate::storage::Record;

pub trait Pipe {
    type Item: Record;

    /// 完整一遍产出的元素个数。
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 游标回到首元素，并重启上游各阶段。
    fn begin_read(&mut self) -> Result<()>;

    /// 释放读取期间占用的资源。
    fn end_read(&mut self) -> Result<()> {
        Ok(())
    }

    fn at_end(&self) -> bool;

    /// 游标处的元素。分页阶段可能在此阻塞，[`Pipe::advance`] 中从不阻塞。
    fn current(&mut self) -> Result<Self::Item>;

    fn advance(&mut self) -> Result<()>;

    fn next_item(&mut self) -> Result<Option<Self::Item>> {
        if self.at_end() {
            return Ok(None);
        }
        let v = self.current()?;
        self.advance()?;
        Ok(Some(v))
    }
}

/// 物化阶段的写入端。
pub trait Sink<T: Record> {
    /// 丢弃原有内容。
    fn begin_write(&mut self) -> Result<()>;
    fn push(&mut self, value: T) -> Result<()>;
    /// 刷出；之后内容可作为管道读回。
    fn end_write(&mut self) -> Result<()>;
}

impl<P: Pipe + ?Sized> Pipe for &mut P {
    type Item = P::Item;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn begin_read(&mut self) -> Result<()> {
        (**self).begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        (**self).end_read()
    }

    fn at_end(&self) -> bool {
        (**self).at_end()
    }

    fn current(&mut self) -> Result<Self::Item> {
        (**self).current()
    }

    fn advance(&mut self) -> Result<()> {
        (**self).advance()
    }
}

/// 把 `src` 全部写入 `dst`，返回搬运的元素数。
pub fn pump<P, S>(src: &mut P, dst: &mut S) -> Result<usize>
where
    P: Pipe + ?Sized,
    S: Sink<P::Item> + ?Sized,
{
    src.begin_read()?;
    dst.begin_write()?;
    let mut n = 0usize;
    while let Some(v) = src.next_item()? {
        dst.push(v)?;
        n += 1;
    }
    dst.end_write()?;
    src.end_read()?;
    if n != src.len() {
        return Err(IndexError::invariant(format!(
            "pipe announced {} elements but yielded {n}",
            src.len()
        )));
    }
    Ok(n)
}

/// 把整条管道读入内存。
pub fn collect<P: Pipe + ?Sized>(src: &mut P) -> Result<Vec<P::Item>> {
    let mut out = Vec::new();
    out.try_reserve_exact(src.len())
        .map_err(|_| IndexError::Allocation { requested: src.len() })?;
    src.begin_read()?;
    while let Some(v) = src.next_item()? {
        out.push(v);
    }
    src.end_read()?;
    Ok(out)
}

pub(crate) fn read_past_end() -> IndexError {
    IndexError::invariant("read past the end of a pipe")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemVec;

    #[test]
    fn pump_moves_everything() {
        let data = [3u32, 1, 4, 1, 5];
        let mut src = Source::new(&data);
        let mut dst = MemVec::new();
        assert_eq!(pump(&mut src, &mut dst).unwrap(), 5);
        assert_eq!(dst.as_slice(), &data);
    }

    #[test]
    fn borrowed_pipes_compose() {
        let data = [1u8, 2, 3];
        let mut src = Source::new(&data);
        {
            let mut doubled = Filter::new(&mut src, |x: u8| x * 2);
            assert_eq!(collect(&mut doubled).unwrap(), vec![2, 4, 6]);
        }
        // 借用它的阶段释放后源管道可再次使用
        assert_eq!(collect(&mut src).unwrap(), vec![1, 2, 3]);
    }
}
