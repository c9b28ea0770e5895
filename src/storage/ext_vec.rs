use std::collections::VecDeque;
use std::marker::PhantomData;

use super::page::PageFrame;
use super::paged::{PagedFile, PageTicket};
use super::Record;
use crate::error::{IndexError, Result};
use crate::pipe::{read_past_end, Pipe, Sink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Writing,
    Reading,
}

/// 分页存储上的记录向量。
///
/// 写入时每次填满一个页帧后异步写回，每个条带至多一个未完成的写。
/// 读取时在游标前方为每个条带预取至多一页，只有游标所在的页尚未到达时才阻塞。
pub struct ExtVec<T: Record> {
    file: PagedFile,
    per_page: usize,
    len: usize,
    mode: Mode,
    wframe: Option<PageFrame>,
    writes: VecDeque<PageTicket>,
    pos: usize,
    rframe: Option<PageFrame>,
    ahead: VecDeque<(u64, PageTicket)>,
    next_fetch: u64,
    _marker: PhantomData<T>,
}

impl<T: Record> ExtVec<T> {
    /// 包装 `file`；页大小向下取整到整数条记录。
    pub fn new(file: PagedFile) -> Result<Self> {
        let per_page = file.page_bytes() / T::WIDTH;
        if per_page == 0 {
            return Err(IndexError::invalid(format!(
                "page of {} bytes cannot hold a {}-byte record",
                file.page_bytes(),
                T::WIDTH
            )));
        }
        Ok(Self {
            file,
            per_page,
            len: 0,
            mode: Mode::Idle,
            wframe: None,
            writes: VecDeque::new(),
            pos: 0,
            rframe: None,
            ahead: VecDeque::new(),
            next_fetch: 0,
            _marker: PhantomData,
        })
    }

    pub fn records_per_page(&self) -> usize {
        self.per_page
    }

    pub fn pages(&self) -> u64 {
        ((self.len + self.per_page - 1) / self.per_page) as u64
    }

    fn page_len(&self, page: u64) -> usize {
        let start = page as usize * self.per_page;
        (self.len - start).min(self.per_page) * T::WIDTH
    }

    fn retire_write(&mut self) -> Result<()> {
        if let Some(t) = self.writes.pop_front() {
            let frame = self.file.await_page(t)?;
            self.file.release_frame(frame);
        }
        Ok(())
    }

    fn flush_frame(&mut self, used: usize) -> Result<()> {
        if let Some(mut frame) = self.wframe.take() {
            frame.truncate(used * T::WIDTH);
            let t = self.file.write_page(frame)?;
            self.writes.push_back(t);
            while self.writes.len() > self.file.stripes() {
                self.retire_write()?;
            }
        }
        Ok(())
    }

    fn drop_reads(&mut self) -> Result<()> {
        if let Some(f) = self.rframe.take() {
            self.file.release_frame(f);
        }
        let mut first_err = None;
        while let Some((_, t)) = self.ahead.pop_front() {
            match self.file.await_page(t) {
                Ok(f) => self.file.release_frame(f),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn prefetch(&mut self) -> Result<()> {
        let pages = self.pages();
        while self.ahead.len() < self.file.stripes() && self.next_fetch < pages {
            let p = self.next_fetch;
            let t = self.file.read_page(p, self.page_len(p))?;
            self.ahead.push_back((p, t));
            self.next_fetch += 1;
        }
        Ok(())
    }

    fn load_page(&mut self, page: u64) -> Result<()> {
        if let Some(f) = self.rframe.take() {
            self.file.release_frame(f);
        }
        if self.ahead.front().map(|&(p, _)| p) != Some(page) {
            // 非顺序前进，从 `page` 重新开始预读
            self.drop_reads()?;
            self.next_fetch = page;
        }
        self.prefetch()?;
        let (_, t) = self
            .ahead
            .pop_front()
            .ok_or_else(|| IndexError::invariant(format!("page {page} was never requested")))?;
        let frame = self.file.await_page(t)?;
        self.rframe = Some(frame);
        self.prefetch()
    }
}

impl<T: Record> Sink<T> for ExtVec<T> {
    fn begin_write(&mut self) -> Result<()> {
        self.drop_reads()?;
        if let Some(f) = self.wframe.take() {
            self.file.release_frame(f);
        }
        while !self.writes.is_empty() {
            self.retire_write()?;
        }
        self.len = 0;
        self.mode = Mode::Writing;
        Ok(())
    }

    fn push(&mut self, value: T) -> Result<()> {
        if self.mode != Mode::Writing {
            return Err(IndexError::invariant("push on a vector that is not being written"));
        }
        let slot = self.len % self.per_page;
        if self.wframe.is_none() {
            let page = (self.len / self.per_page) as u64;
            self.wframe = Some(self.file.alloc_frame(page, self.per_page * T::WIDTH)?);
        }
        if let Some(frame) = self.wframe.as_mut() {
            value.encode(&mut frame.bytes_mut()[slot * T::WIDTH..(slot + 1) * T::WIDTH]);
        }
        self.len += 1;
        if slot + 1 == self.per_page {
            self.flush_frame(self.per_page)?;
        }
        Ok(())
    }

    fn end_write(&mut self) -> Result<()> {
        if self.mode != Mode::Writing {
            return Ok(());
        }
        let used = self.len % self.per_page;
        if used > 0 {
            self.flush_frame(used)?;
        }
        while !self.writes.is_empty() {
            self.retire_write()?;
        }
        self.mode = Mode::Idle;
        log::trace!("external vector sealed: {} records on {} pages", self.len, self.pages());
        Ok(())
    }
}

impl<T: Record> Pipe for ExtVec<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.len
    }

    fn begin_read(&mut self) -> Result<()> {
        if self.mode == Mode::Writing {
            self.end_write()?;
        }
        self.drop_reads()?;
        self.pos = 0;
        self.next_fetch = 0;
        self.mode = Mode::Reading;
        self.prefetch()
    }

    fn end_read(&mut self) -> Result<()> {
        self.mode = Mode::Idle;
        self.drop_reads()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len
    }

    fn current(&mut self) -> Result<T> {
        if self.mode != Mode::Reading || self.pos >= self.len {
            return Err(read_past_end());
        }
        let page = (self.pos / self.per_page) as u64;
        if self.rframe.as_ref().map(PageFrame::page) != Some(page) {
            self.load_page(page)?;
        }
        let slot = self.pos % self.per_page;
        let frame = self.rframe.as_ref().ok_or_else(read_past_end)?;
        Ok(T::decode(&frame.bytes()[slot * T::WIDTH..(slot + 1) * T::WIDTH]))
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }
}

impl<T: Record> Drop for ExtVec<T> {
    fn drop(&mut self) {
        if let Some(f) = self.wframe.take() {
            self.file.release_frame(f);
        }
        if let Some(f) = self.rframe.take() {
            self.file.release_frame(f);
        }
        // 未完成的传输由 PagedFile::drop 收尾
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::pipe::{collect, pump, Source};
    use crate::storage::{External, Storage};

    fn storage(page: usize, stripes: usize) -> External {
        External::new(BuildConfig::default().with_page_size(page).with_stripes(stripes)).unwrap()
    }

    #[test]
    fn roundtrip_with_partial_last_page() {
        let ext = storage(40, 3);
        let mut v: ExtVec<u64> = ext.buffer().unwrap();
        assert_eq!(v.records_per_page(), 5);
        let data: Vec<u64> = (0..23).map(|i| i * 7 + 1).collect();
        pump(&mut Source::new(&data), &mut v).unwrap();
        assert_eq!(v.len(), 23);
        assert_eq!(v.pages(), 5);
        assert_eq!(collect(&mut v).unwrap(), data);
        // 重启后读到相同内容
        assert_eq!(collect(&mut v).unwrap(), data);
    }

    #[test]
    fn records_wider_than_page_are_rejected() {
        let ext = storage(8, 1);
        let r: Result<ExtVec<(u64, u64)>> = ext.buffer();
        assert!(r.is_err());
    }

    #[test]
    fn rewriting_replaces_contents() {
        let ext = storage(16, 2);
        let mut v: ExtVec<(u32, u16)> = ext.buffer().unwrap();
        let first: Vec<(u32, u16)> = (0..10).map(|i| (i, i as u16)).collect();
        pump(&mut Source::new(&first), &mut v).unwrap();
        let second = vec![(99u32, 1u16), (98, 2)];
        pump(&mut Source::new(&second), &mut v).unwrap();
        assert_eq!(collect(&mut v).unwrap(), second);
    }

    #[test]
    fn empty_vector_reads_nothing() {
        let ext = storage(64, 2);
        let mut v: ExtVec<u8> = ext.buffer().unwrap();
        v.begin_write().unwrap();
        v.end_write().unwrap();
        v.begin_read().unwrap();
        assert!(v.at_end());
        assert!(v.current().is_err());
        v.end_read().unwrap();
    }
}
