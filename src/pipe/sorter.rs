use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{collect, read_past_end, Pipe, Sink};
use crate::error::{IndexError, Result};
use crate::storage::{Record, Storage};

enum State<T, K, B> {
    Fresh,
    Memory { data: Vec<T>, pos: usize },
    Runs { runs: Vec<B>, heap: BinaryHeap<Reverse<(K, usize)>> },
}

/// 物化阶段：按 `key` 稳定排序后输出上游。
///
/// 第一次 `begin_read` 时消费上游，之后的重启直接重放排序结果。
/// 存储限定了排序预算且输入放不下时，按预算切成有序段写入存储缓冲，
/// 再用堆归并；键相等时取较早的段，保证归并稳定。
pub struct Sorter<P: Pipe, K, F, S: Storage> {
    up: P,
    key: F,
    storage: S,
    state: State<P::Item, K, S::Buf<P::Item>>,
    emitted: usize,
}

impl<P, K, F, S> Sorter<P, K, F, S>
where
    P: Pipe,
    K: Ord + Copy,
    F: Fn(&P::Item) -> K,
    S: Storage,
{
    pub fn new(up: P, key: F, storage: S) -> Self {
        Self { up, key, storage, state: State::Fresh, emitted: 0 }
    }

    /// 写出的有序段数；内存排序时为 0。
    pub fn runs(&self) -> usize {
        match &self.state {
            State::Runs { runs, .. } => runs.len(),
            _ => 0,
        }
    }

    fn materialize(&mut self) -> Result<()> {
        let n = self.up.len();
        match self.storage.sort_capacity(P::Item::WIDTH) {
            Some(cap) if n > cap => self.form_runs(cap),
            _ => {
                let mut data = collect(&mut self.up)?;
                let key = &self.key;
                data.sort_by(|a, b| key(a).cmp(&key(b)));
                self.state = State::Memory { data, pos: 0 };
                Ok(())
            }
        }
    }

    fn form_runs(&mut self, cap: usize) -> Result<()> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(cap)
            .map_err(|_| IndexError::Allocation { requested: cap })?;
        let mut runs = Vec::new();

        self.up.begin_read()?;
        while !self.up.at_end() {
            buf.clear();
            while buf.len() < cap {
                match self.up.next_item()? {
                    Some(v) => buf.push(v),
                    None => break,
                }
            }
            let key = &self.key;
            buf.sort_by(|a, b| key(a).cmp(&key(b)));
            let mut run = self.storage.buffer::<P::Item>()?;
            run.begin_write()?;
            for v in buf.iter() {
                run.push(*v)?;
            }
            run.end_write()?;
            runs.push(run);
        }
        self.up.end_read()?;

        log::debug!("sorter spilled {} records into {} runs", self.up.len(), runs.len());
        self.state = State::Runs { runs, heap: BinaryHeap::new() };
        Ok(())
    }

    fn start_merge(&mut self) -> Result<()> {
        let key = &self.key;
        if let State::Runs { runs, heap } = &mut self.state {
            heap.clear();
            for (i, run) in runs.iter_mut().enumerate() {
                run.begin_read()?;
                if !run.at_end() {
                    heap.push(Reverse((key(&run.current()?), i)));
                }
            }
        }
        Ok(())
    }
}

impl<P, K, F, S> Pipe for Sorter<P, K, F, S>
where
    P: Pipe,
    K: Ord + Copy,
    F: Fn(&P::Item) -> K,
    S: Storage,
{
    type Item = P::Item;

    fn len(&self) -> usize {
        self.up.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.emitted = 0;
        if matches!(self.state, State::Fresh) {
            self.materialize()?;
        }
        let in_memory = match &mut self.state {
            State::Memory { pos, .. } => {
                *pos = 0;
                true
            }
            State::Runs { .. } => false,
            State::Fresh => return Err(IndexError::invariant("sorter failed to materialize")),
        };
        if in_memory {
            Ok(())
        } else {
            self.start_merge()
        }
    }

    fn end_read(&mut self) -> Result<()> {
        if let State::Runs { runs, .. } = &mut self.state {
            for run in runs.iter_mut() {
                run.end_read()?;
            }
        }
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.emitted >= self.up.len()
    }

    fn current(&mut self) -> Result<P::Item> {
        match &mut self.state {
            State::Memory { data, pos } => data.get(*pos).copied().ok_or_else(read_past_end),
            State::Runs { runs, heap } => {
                let &Reverse((_, i)) = heap.peek().ok_or_else(read_past_end)?;
                runs[i].current()
            }
            State::Fresh => Err(read_past_end()),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.emitted += 1;
        let key = &self.key;
        match &mut self.state {
            State::Memory { pos, .. } => *pos += 1,
            State::Runs { runs, heap } => {
                if let Some(Reverse((_, i))) = heap.pop() {
                    runs[i].advance()?;
                    if !runs[i].at_end() {
                        heap.push(Reverse((key(&runs[i].current()?), i)));
                    }
                }
            }
            State::Fresh => {}
        }
        Ok(())
    }
}

/// 把每个元素放到其键给出的下标处。
///
/// 键必须是 `0..len` 的排列。内存中直接散列放置，受限存储上按键排序；
/// 键越界、重复或缺失都视为不变量被破坏。
pub struct Mapper<P: Pipe, F, S: Storage> {
    sorter: Sorter<P, usize, F, S>,
    placed: Option<Vec<P::Item>>,
    pos: usize,
}

impl<P, F, S> Mapper<P, F, S>
where
    P: Pipe,
    F: Fn(&P::Item) -> usize,
    S: Storage,
{
    pub fn new(up: P, key: F, storage: S) -> Self {
        Self { sorter: Sorter::new(up, key, storage), placed: None, pos: 0 }
    }

    pub fn inner(&mut self) -> &mut P {
        &mut self.sorter.up
    }

    fn fits_in_memory(&self) -> bool {
        match self.sorter.storage.sort_capacity(P::Item::WIDTH) {
            Some(cap) => self.sorter.len() <= cap,
            None => true,
        }
    }

    fn scatter(&mut self) -> Result<Vec<P::Item>> {
        let n = self.sorter.up.len();
        let mut out = Vec::new();
        out.try_reserve_exact(n).map_err(|_| IndexError::Allocation { requested: n })?;
        out.resize(n, P::Item::blank());
        let mut seen = vec![false; n];
        let up = &mut self.sorter.up;
        let key = &self.sorter.key;
        up.begin_read()?;
        while let Some(v) = up.next_item()? {
            let k = key(&v);
            match seen.get_mut(k) {
                Some(s) if !*s => {
                    *s = true;
                    out[k] = v;
                }
                _ => return Err(IndexError::invariant(format!("mapper key {k} is not a permutation of 0..{n}"))),
            }
        }
        up.end_read()?;
        Ok(out)
    }
}

impl<P, F, S> Pipe for Mapper<P, F, S>
where
    P: Pipe,
    F: Fn(&P::Item) -> usize,
    S: Storage,
{
    type Item = P::Item;

    fn len(&self) -> usize {
        self.sorter.len()
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        if self.placed.is_none() && self.fits_in_memory() {
            self.placed = Some(self.scatter()?);
        }
        match self.placed {
            Some(_) => Ok(()),
            None => self.sorter.begin_read(),
        }
    }

    fn end_read(&mut self) -> Result<()> {
        match self.placed {
            Some(_) => Ok(()),
            None => self.sorter.end_read(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    fn current(&mut self) -> Result<P::Item> {
        if let Some(placed) = &self.placed {
            return placed.get(self.pos).copied().ok_or_else(read_past_end);
        }
        let v = self.sorter.current()?;
        let k = (self.sorter.key)(&v);
        if k != self.pos {
            return Err(IndexError::invariant(format!(
                "mapper expected key {} but found {k}",
                self.pos
            )));
        }
        Ok(v)
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        match self.placed {
            Some(_) => Ok(()),
            None => self.sorter.advance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::error::ErrorKind;
    use crate::pipe::{collect, Source};
    use crate::storage::{External, InMemory};

    fn tiny_external() -> External {
        // 每段 4 个 (u32, u32)
        External::new(BuildConfig::default().with_page_size(64).with_memory_budget(32)).unwrap()
    }

    fn scrambled(n: u32) -> Vec<(u32, u32)> {
        (0..n).map(|i| ((i * 7 + 3) % 5, i)).collect()
    }

    #[test]
    fn in_memory_sort_is_stable() {
        let data = scrambled(20);
        let mut s = Sorter::new(Source::new(&data), |&(k, _): &(u32, u32)| k, InMemory);
        let out = collect(&mut s).unwrap();
        let mut expect = data.clone();
        expect.sort_by_key(|&(k, _)| k);
        assert_eq!(out, expect);
        assert_eq!(s.runs(), 0);
    }

    #[test]
    fn spilled_sort_matches_in_memory_sort() {
        let data = scrambled(37);
        let mut s = Sorter::new(Source::new(&data), |&(k, _): &(u32, u32)| k, tiny_external());
        let out = collect(&mut s).unwrap();
        assert!(s.runs() > 1);
        let mut expect = data.clone();
        expect.sort_by_key(|&(k, _)| k);
        assert_eq!(out, expect);
        // 重放不再读取上游
        assert_eq!(collect(&mut s).unwrap(), expect);
    }

    #[test]
    fn one_run_per_budget_slice() {
        let data = scrambled(37);
        let mut s = Sorter::new(Source::new(&data), |&(k, _): &(u32, u32)| k, tiny_external());
        s.begin_read().unwrap();
        s.end_read().unwrap();
        // 每段 4 条记录
        assert_eq!(s.runs(), 10);
        let mut sorted = collect(&mut s).unwrap();
        sorted.dedup();
        assert_eq!(sorted.len(), 37);
    }

    #[test]
    fn mapper_places_by_key() {
        let data = [(2usize, b'c'), (0, b'a'), (1, b'b')];
        for ext in [false, true] {
            let out = if ext {
                let storage = External::new(BuildConfig::default().with_page_size(64).with_memory_budget(16)).unwrap();
                collect(&mut Mapper::new(Source::new(&data), |&(k, _): &(usize, u8)| k, storage)).unwrap()
            } else {
                collect(&mut Mapper::new(Source::new(&data), |&(k, _): &(usize, u8)| k, InMemory)).unwrap()
            };
            assert_eq!(out, vec![(0, b'a'), (1, b'b'), (2, b'c')]);
        }
    }

    #[test]
    fn mapper_rejects_non_permutation() {
        let data = [(1usize, 0u8), (1, 1), (0, 2)];
        let mut m = Mapper::new(Source::new(&data), |&(k, _): &(usize, u8)| k, InMemory);
        let err = m.begin_read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);

        let storage = External::new(BuildConfig::default().with_page_size(64).with_memory_budget(16)).unwrap();
        let mut m = Mapper::new(Source::new(&data), |&(k, _): &(usize, u8)| k, storage);
        let err = collect(&mut m).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }
}
