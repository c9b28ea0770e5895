use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam::channel::{self, Receiver};

use super::io::{Completion, IoService, Op, Request};
use super::page::{PageFrame, PageStatus};
use crate::alloc::{BlockAlloc, ClassPool};
use crate::error::{IndexError, Result};

/// 一次构建中所有分页文件共享的页帧缓冲池。
pub type FramePool = Arc<Mutex<ClassPool<u8>>>;

/// 一次未完成页传输的句柄。
///
/// 票据只在签发时的代内有效；重复等待或在 [`PagedFile::cancel`] 之后等待都会被拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    slot: u32,
    generation: u32,
}

struct InFlight {
    page: u64,
    rx: Receiver<Completion>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    inflight: Option<InFlight>,
}

/// 定长页轮转条带化到 `k` 个后备文件上的文件。
///
/// 第 `p` 页位于条带 `p % k`，字节偏移 `(p / k) * page_bytes`。
pub struct PagedFile {
    io: Arc<IoService>,
    stripes: Vec<Arc<File>>,
    page_bytes: usize,
    frames: FramePool,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
}

impl PagedFile {
    pub fn create(
        io: Arc<IoService>,
        frames: FramePool,
        page_bytes: usize,
        dir: Option<&Path>,
    ) -> Result<Self> {
        if page_bytes == 0 {
            return Err(IndexError::invalid("page size must be positive"));
        }
        let stripes = (0..io.stripes())
            .map(|_| {
                let f = match dir {
                    Some(d) => tempfile::tempfile_in(d)?,
                    None => tempfile::tempfile()?,
                };
                Ok(Arc::new(f))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { io, stripes, page_bytes, frames, slots: Vec::new(), free_slots: Vec::new() })
    }

    pub fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    /// 已发出但尚未等待的传输数。
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.inflight.is_some()).count()
    }

    /// 从池中为 `page` 取一个 `len` 字节的页帧。
    /// 不同记录宽度的页帧落在不同的尺寸等级。
    pub fn alloc_frame(&self, page: u64, len: usize) -> Result<PageFrame> {
        if len > self.page_bytes {
            return Err(IndexError::invalid(format!(
                "frame of {len} bytes exceeds page size {}",
                self.page_bytes
            )));
        }
        let buf = self
            .frames
            .lock()
            .map_err(|_| IndexError::invariant("frame pool lock poisoned"))?
            .allocate(len)?;
        Ok(PageFrame::new(page, buf, len))
    }

    pub fn release_frame(&self, frame: PageFrame) {
        if let Ok(mut pool) = self.frames.lock() {
            pool.deallocate(frame.into_buffer());
        }
    }

    /// 开始读取 `page` 的 `len` 字节；只有文件最后一页的 `len` 会小于页大小。
    pub fn read_page(&mut self, page: u64, len: usize) -> Result<PageTicket> {
        let mut frame = self.alloc_frame(page, len)?;
        frame.set_status(PageStatus::PendingRead);
        self.submit(Op::Read, frame)
    }

    /// 开始把 `frame` 写回它的页。
    pub fn write_page(&mut self, mut frame: PageFrame) -> Result<PageTicket> {
        frame.set_status(PageStatus::PendingWrite);
        self.submit(Op::Write, frame)
    }

    fn submit(&mut self, op: Op, frame: PageFrame) -> Result<PageTicket> {
        let k = self.stripes.len() as u64;
        let page = frame.page();
        let stripe = (page % k) as usize;
        let offset = (page / k) * self.page_bytes as u64;
        let (tx, rx) = channel::bounded(1);
        let req = Request { file: Arc::clone(&self.stripes[stripe]), offset, op, frame, reply: tx };
        self.io.submit(stripe, req)?;

        let slot = match self.free_slots.pop() {
            Some(s) => s,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.inflight = Some(InFlight { page, rx });
        Ok(PageTicket { slot, generation: entry.generation })
    }

    /// 阻塞到 `ticket` 对应的传输完成并交回页帧；传输失败时返回 [`IndexError::Io`]。
    pub fn await_page(&mut self, ticket: PageTicket) -> Result<PageFrame> {
        let slot = self
            .slots
            .get_mut(ticket.slot as usize)
            .filter(|s| s.generation == ticket.generation && s.inflight.is_some())
            .ok_or_else(|| IndexError::invariant("stale or already awaited page ticket"))?;
        let inflight = slot.inflight.take().ok_or_else(|| IndexError::invariant("empty ticket slot"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(ticket.slot);

        let done = inflight.rx.recv().map_err(|_| {
            IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("I/O worker dropped page {}", inflight.page),
            ))
        })?;
        match done.result {
            Ok(()) => Ok(done.frame),
            Err(e) => {
                self.release_frame(done.frame);
                Err(IndexError::Io(e))
            }
        }
    }

    /// 等待所有未完成的传输，把页帧还给池，并作废已签发的票据。
    pub fn cancel(&mut self) {
        let mut cancelled = 0usize;
        for i in 0..self.slots.len() {
            let inflight = self.slots[i].inflight.take();
            self.slots[i].generation = self.slots[i].generation.wrapping_add(1);
            if let Some(inflight) = inflight {
                cancelled += 1;
                self.free_slots.push(i as u32);
                if let Ok(done) = inflight.rx.recv() {
                    self.release_frame(done.frame);
                }
            }
        }
        if cancelled > 0 {
            log::warn!("cancelled {} pending page transfers", cancelled);
        }
    }
}

impl Drop for PagedFile {
    fn drop(&mut self) {
        if self.pending() > 0 {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(stripes: usize, page_bytes: usize) -> PagedFile {
        let io = Arc::new(IoService::start(stripes).unwrap());
        let pool = Arc::new(Mutex::new(ClassPool::new(4, page_bytes)));
        PagedFile::create(io, pool, page_bytes, None).unwrap()
    }

    #[test]
    fn pages_roundtrip_across_stripes() {
        let mut pf = setup(3, 32);
        let mut tickets = Vec::new();
        for p in 0..7u64 {
            let mut f = pf.alloc_frame(p, 32).unwrap();
            f.bytes_mut().fill(p as u8 + 1);
            assert!(f.is_dirty());
            tickets.push(pf.write_page(f).unwrap());
        }
        for t in tickets {
            let f = pf.await_page(t).unwrap();
            assert_eq!(f.status(), PageStatus::Ready);
            assert!(!f.is_dirty());
            pf.release_frame(f);
        }

        // 逆序读取，完成顺序可能乱序
        let tickets: Vec<_> = (0..7u64).rev().map(|p| (p, pf.read_page(p, 32).unwrap())).collect();
        for (p, t) in tickets {
            let f = pf.await_page(t).unwrap();
            assert_eq!(f.page(), p);
            assert!(f.bytes().iter().all(|&b| b == p as u8 + 1));
            pf.release_frame(f);
        }
        assert_eq!(pf.pending(), 0);
    }

    #[test]
    fn short_last_page() {
        let mut pf = setup(2, 16);
        let mut f = pf.alloc_frame(0, 16).unwrap();
        f.bytes_mut().copy_from_slice(&[9; 16]);
        let t0 = pf.write_page(f).unwrap();
        let mut f = pf.alloc_frame(1, 16).unwrap();
        f.truncate(5);
        f.bytes_mut().copy_from_slice(&[1, 2, 3, 4, 5]);
        let t1 = pf.write_page(f).unwrap();
        for t in [t0, t1] {
            let f = pf.await_page(t).unwrap();
            pf.release_frame(f);
        }

        let t = pf.read_page(1, 5).unwrap();
        let f = pf.await_page(t).unwrap();
        assert_eq!(f.bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn reading_unwritten_page_is_io_error() {
        let mut pf = setup(1, 64);
        let t = pf.read_page(4, 64).unwrap();
        let err = pf.await_page(t).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn stale_ticket_is_rejected() {
        let mut pf = setup(1, 8);
        let f = pf.alloc_frame(0, 8).unwrap();
        let t = pf.write_page(f).unwrap();
        let f = pf.await_page(t).unwrap();
        pf.release_frame(f);
        let err = pf.await_page(t).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);

        let t = pf.read_page(0, 8).unwrap();
        pf.cancel();
        assert_eq!(pf.pending(), 0);
        assert!(pf.await_page(t).is_err());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let pf = setup(1, 8);
        assert!(pf.alloc_frame(0, 9).is_err());
    }
}
