//! 块复用的池分配器。
//!
//! 构建过程反复申请和释放大量等长的临时缓冲（页帧、基数排序的键数组）。
//! 池把释放的块按尺寸挂在空闲链上，稳定运行时不再触及堆。

pub mod pool;

pub use pool::{BlockAlloc, ClassPool, HeapAlloc, PoolStats, SinglePool};
