//! 分页外存。
//!
//! 大的构建阶段把数据放在 [`ExtVec`] 中：定长 [`Record`] 组成的向量，
//! 分布在定长页上，页轮转条带化到多个后备文件，由后台 I/O 线程搬运。
//! 借助 [`Storage`] 能力，同一算法既可在内存（[`InMemory`]）上运行，
//! 也可在分页文件（[`External`]）上运行。

mod ext_vec;
mod io;
mod mem_vec;
mod page;
mod paged;
mod record;

pub use ext_vec::ExtVec;
pub use io::IoService;
pub use mem_vec::MemVec;
pub use page::{PageFrame, PageStatus};
pub use paged::{FramePool, PageTicket, PagedFile};
pub use record::Record;

use std::sync::{Arc, Mutex};

use crate::alloc::{ClassPool, PoolStats};
use crate::config::BuildConfig;
use crate::error::{IndexError, Result};
use crate::pipe::{Pipe, Sink};

/// 物化阶段：作为写入端写一次，之后可作为管道读任意多次。
pub trait Buffer<T: Record>: Pipe<Item = T> + Sink<T> {}

impl<T: Record, B: Pipe<Item = T> + Sink<T>> Buffer<T> for B {}

/// 构建阶段存放中间数据的地方。克隆只共享底层资源。
pub trait Storage: Clone {
    type Buf<T: Record>: Buffer<T>;

    fn buffer<T: Record>(&self) -> Result<Self::Buf<T>>;

    /// 排序阶段写出有序段之前可在内存中保留多少条 `width` 字节的记录；
    /// `None` 表示从不写出。
    fn sort_capacity(&self, width: usize) -> Option<usize>;
}

/// 全部放在内存中。
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemory;

impl Storage for InMemory {
    type Buf<T: Record> = MemVec<T>;

    fn buffer<T: Record>(&self) -> Result<MemVec<T>> {
        Ok(MemVec::new())
    }

    fn sort_capacity(&self, _width: usize) -> Option<usize> {
        None
    }
}

struct ExternalInner {
    cfg: BuildConfig,
    io: Arc<IoService>,
    frames: FramePool,
}

/// 一次构建所用的分页存储：I/O 线程、页帧池和配置。
///
/// 克隆后共享同一组线程和池。后备文件是匿名临时文件，随缓冲一起消失。
#[derive(Clone)]
pub struct External {
    inner: Arc<ExternalInner>,
}

impl External {
    pub fn new(cfg: BuildConfig) -> Result<Self> {
        cfg.validate()?;
        let io = Arc::new(IoService::start(cfg.stripes)?);
        let frames = Arc::new(Mutex::new(ClassPool::new(cfg.pool_granularity, cfg.page_size)));
        log::debug!(
            "paged storage: {} byte pages over {} stripes, {} byte sort budget",
            cfg.page_size,
            cfg.stripes,
            cfg.memory_budget
        );
        Ok(Self { inner: Arc::new(ExternalInner { cfg, io, frames }) })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.inner.cfg
    }

    pub fn pool_stats(&self) -> Result<PoolStats> {
        let pool = self
            .inner
            .frames
            .lock()
            .map_err(|_| IndexError::invariant("frame pool lock poisoned"))?;
        Ok(pool.stats())
    }
}

impl Storage for External {
    type Buf<T: Record> = ExtVec<T>;

    fn buffer<T: Record>(&self) -> Result<ExtVec<T>> {
        let file = PagedFile::create(
            Arc::clone(&self.inner.io),
            Arc::clone(&self.inner.frames),
            self.inner.cfg.page_size,
            self.inner.cfg.temp_dir.as_deref(),
        )?;
        ExtVec::new(file)
    }

    fn sort_capacity(&self, width: usize) -> Option<usize> {
        Some((self.inner.cfg.memory_budget / width.max(1)).max(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{collect, pump, Source};

    #[test]
    fn frames_are_recycled_across_buffers() {
        let ext = External::new(BuildConfig::default().with_page_size(64).with_stripes(2)).unwrap();
        let data: Vec<u32> = (0..100).collect();
        for _ in 0..3 {
            let mut v: ExtVec<u32> = ext.buffer().unwrap();
            pump(&mut Source::new(&data), &mut v).unwrap();
            assert_eq!(collect(&mut v).unwrap(), data);
        }
        let stats = ext.pool_stats().unwrap();
        assert!(stats.hits > 0);
        assert!(stats.pooled > 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(External::new(BuildConfig::default().with_stripes(0)).is_err());
    }
}
