use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::page::{PageFrame, PageStatus};
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Read,
    Write,
}

pub(crate) struct Request {
    pub file: Arc<File>,
    pub offset: u64,
    pub op: Op,
    pub frame: PageFrame,
    pub reply: Sender<Completion>,
}

pub(crate) struct Completion {
    pub frame: PageFrame,
    pub result: io::Result<()>,
}

struct Lane {
    tx: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
}

/// 每个条带一个 I/O 工作线程。
///
/// 同一条带的请求按提交顺序处理；不同条带各自推进，页的完成顺序不定。
pub struct IoService {
    lanes: Vec<Lane>,
}

impl IoService {
    pub fn start(stripes: usize) -> Result<Self> {
        let mut lanes = Vec::with_capacity(stripes);
        for i in 0..stripes {
            let (tx, rx) = channel::unbounded::<Request>();
            let worker = thread::Builder::new()
                .name(format!("seqindex-io-{i}"))
                .spawn(move || serve(rx))?;
            lanes.push(Lane { tx: Some(tx), worker: Some(worker) });
        }
        log::debug!("started {} I/O lanes", stripes);
        Ok(Self { lanes })
    }

    pub fn stripes(&self) -> usize {
        self.lanes.len()
    }

    pub(crate) fn submit(&self, stripe: usize, req: Request) -> Result<()> {
        let lane = self
            .lanes
            .get(stripe)
            .and_then(|l| l.tx.as_ref())
            .ok_or_else(|| IndexError::invariant(format!("no I/O lane for stripe {stripe}")))?;
        lane.send(req).map_err(|_| {
            IndexError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "I/O worker has exited"))
        })
    }
}

impl Drop for IoService {
    fn drop(&mut self) {
        for lane in &mut self.lanes {
            lane.tx.take();
        }
        for lane in &mut self.lanes {
            if let Some(worker) = lane.worker.take() {
                if worker.join().is_err() {
                    log::warn!("I/O worker panicked");
                }
            }
        }
    }
}

fn serve(rx: Receiver<Request>) {
    for req in rx.iter() {
        let Request { file, offset, op, mut frame, reply } = req;
        let result = match op {
            Op::Read => read_at(&file, offset, frame.bytes_mut()),
            Op::Write => write_at(&file, offset, frame.bytes()),
        };
        if result.is_ok() {
            frame.set_status(PageStatus::Ready);
        }
        // 请求方可能已经不在，此时直接丢弃页帧
        let _ = reply.send(Completion { frame, result });
    }
}

fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let mut f = file;
    f.seek(SeekFrom::Start(offset))?;
    f.read_exact(buf)
}

fn write_at(file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    let mut f = file;
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(buf)
}
