use crate::error::{IndexError, Result};

/// 类型化块的来源。
///
/// 块是一个空的 `Vec<T>`，`capacity() >= len`；调用方填充后
/// 经 [`BlockAlloc::deallocate`] 归还。
pub trait BlockAlloc<T> {
    fn allocate(&mut self, len: usize) -> Result<Vec<T>>;
    fn deallocate(&mut self, block: Vec<T>);
}

/// 所有池的最终上级：全局堆。内存耗尽时返回错误而不是中止。
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAlloc;

impl<T> BlockAlloc<T> for HeapAlloc {
    fn allocate(&mut self, len: usize) -> Result<Vec<T>> {
        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| IndexError::Allocation { requested: len })?;
        Ok(v)
    }

    fn deallocate(&mut self, block: Vec<T>) {
        drop(block);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// 由空闲链满足的请求数
    pub hits: u64,
    /// 转交上级的请求数
    pub misses: u64,
    /// 当前挂在空闲链上的块数
    pub pooled: usize,
}

/// 单一块长的池。
///
/// 恰为 `block_len` 个元素的请求会被复用；其他长度直接转交上级，不入池。
pub struct SinglePool<T, P = HeapAlloc> {
    block_len: usize,
    free: Vec<Vec<T>>,
    parent: P,
    stats: PoolStats,
}

impl<T> SinglePool<T, HeapAlloc> {
    pub fn new(block_len: usize) -> Self {
        Self::with_parent(block_len, HeapAlloc)
    }
}

impl<T, P: BlockAlloc<T>> SinglePool<T, P> {
    pub fn with_parent(block_len: usize, parent: P) -> Self {
        Self { block_len, free: Vec::new(), parent, stats: PoolStats::default() }
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats { pooled: self.free.len(), ..self.stats }
    }

    /// 一次释放所有挂起的块。
    pub fn reset(&mut self) {
        self.free.clear();
    }
}

impl<T, P: BlockAlloc<T>> BlockAlloc<T> for SinglePool<T, P> {
    fn allocate(&mut self, len: usize) -> Result<Vec<T>> {
        if len != self.block_len {
            return self.parent.allocate(len);
        }
        match self.free.pop() {
            Some(block) => {
                self.stats.hits += 1;
                Ok(block)
            }
            None => {
                self.stats.misses += 1;
                self.parent.allocate(len)
            }
        }
    }

    fn deallocate(&mut self, mut block: Vec<T>) {
        if block.capacity() >= self.block_len && self.block_len > 0 {
            block.clear();
            self.free.push(block);
        } else {
            self.parent.deallocate(block);
        }
    }
}

/// 每个尺寸等级一条空闲链的池。
///
/// 请求的等级为 `ceil(len / 2^granularity)`；块按等级向上取整分配，
/// 因此同一等级的任意块都能满足该等级的任意请求。
/// 超过 `ceiling` 个元素的请求转交上级，不入池。
pub struct ClassPool<T, P = HeapAlloc> {
    granularity: u32,
    ceiling: usize,
    classes: Vec<Vec<Vec<T>>>,
    parent: P,
    stats: PoolStats,
}

impl<T> ClassPool<T, HeapAlloc> {
    pub fn new(granularity: u32, ceiling: usize) -> Self {
        Self::with_parent(granularity, ceiling, HeapAlloc)
    }
}

impl<T, P: BlockAlloc<T>> ClassPool<T, P> {
    pub fn with_parent(granularity: u32, ceiling: usize, parent: P) -> Self {
        Self { granularity, ceiling, classes: Vec::new(), parent, stats: PoolStats::default() }
    }

    fn class_of(&self, len: usize) -> usize {
        let unit = 1usize << self.granularity;
        (len + unit - 1) >> self.granularity
    }

    pub fn stats(&self) -> PoolStats {
        let pooled = self.classes.iter().map(Vec::len).sum();
        PoolStats { pooled, ..self.stats }
    }

    pub fn reset(&mut self) {
        self.classes.clear();
    }
}

impl<T, P: BlockAlloc<T>> BlockAlloc<T> for ClassPool<T, P> {
    fn allocate(&mut self, len: usize) -> Result<Vec<T>> {
        if len == 0 || len > self.ceiling {
            return self.parent.allocate(len);
        }
        let class = self.class_of(len);
        if let Some(block) = self.classes.get_mut(class).and_then(Vec::pop) {
            self.stats.hits += 1;
            return Ok(block);
        }
        self.stats.misses += 1;
        self.parent.allocate(class << self.granularity)
    }

    fn deallocate(&mut self, mut block: Vec<T>) {
        let cap = block.capacity();
        if cap == 0 || cap > self.ceiling.max(self.class_of(self.ceiling) << self.granularity) {
            self.parent.deallocate(block);
            return;
        }
        // 向下取整，保证挂起的块覆盖整个等级
        let class = cap >> self.granularity;
        if class == 0 {
            self.parent.deallocate(block);
            return;
        }
        if self.classes.len() <= class {
            self.classes.resize_with(class + 1, Vec::new);
        }
        block.clear();
        self.classes[class].push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pool_recycles_blocks() {
        let mut pool: SinglePool<u32> = SinglePool::new(64);
        let mut a = pool.allocate(64).unwrap();
        assert!(a.capacity() >= 64);
        a.extend(0..64);
        let ptr = a.as_ptr();
        pool.deallocate(a);
        assert_eq!(pool.stats().pooled, 1);

        let b = pool.allocate(64).unwrap();
        assert!(b.is_empty());
        assert_eq!(b.as_ptr(), ptr);
        let s = pool.stats();
        assert_eq!((s.hits, s.misses), (1, 1));
    }

    #[test]
    fn single_pool_passes_other_sizes_through() {
        let mut pool: SinglePool<u8> = SinglePool::new(16);
        let odd = pool.allocate(3).unwrap();
        assert!(odd.capacity() >= 3);
        pool.deallocate(odd);
        assert_eq!(pool.stats().pooled, 0);
        assert_eq!(pool.stats().misses, 0);
    }

    #[test]
    fn class_pool_rounds_to_class() {
        let mut pool: ClassPool<u8> = ClassPool::new(4, 1024);
        let a = pool.allocate(17).unwrap();
        assert!(a.capacity() >= 32);
        pool.deallocate(a);

        // 20 与 17 同一等级
        let b = pool.allocate(20).unwrap();
        assert!(b.capacity() >= 20);
        assert_eq!(pool.stats().hits, 1);

        // 较小的等级不复用较大的块
        pool.deallocate(b);
        let c = pool.allocate(5).unwrap();
        assert!(c.capacity() >= 5);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn class_pool_ceiling_falls_back_to_parent() {
        let mut pool: ClassPool<u64> = ClassPool::new(3, 64);
        let big = pool.allocate(1000).unwrap();
        assert!(big.capacity() >= 1000);
        pool.deallocate(big);
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn reset_drops_free_lists() {
        let mut pool: ClassPool<u8> = ClassPool::new(2, 256);
        for len in [4, 8, 12, 100] {
            let b = pool.allocate(len).unwrap();
            pool.deallocate(b);
        }
        assert_eq!(pool.stats().pooled, 4);
        pool.reset();
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn heap_exhaustion_is_an_error() {
        let mut heap = HeapAlloc;
        let err = BlockAlloc::<u64>::allocate(&mut heap, usize::MAX).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Allocation);
    }
}
