//! DC3（skew）线性时间后缀数组构建，全部由管道阶段组成。
//!
//! 同一份实现通过 [`Storage`] 在内存或分页外存上运行。元组排序在内存中是
//! 逐位的基数排序；在外存上交给 [`Sorter`]，超出内存预算时自动分段归并。
//! 其余阶段都是顺序流。
//!
//! 文本在内部以 `u64` 表示，符号整体加一，`0` 留作越界填充（比任何真实
//! 符号和秩都小）。

use crate::error::{IndexError, Result};
use crate::pipe::{collect, pump, Counter, Echoer, Filter, Joiner, Pipe, Sampler, Sink, Sorter, Source};
use crate::radix::lsd_order;
use crate::sa::direct::comparison_sort;
use crate::storage::{Record, Storage};
use crate::symbol::{Sequence, Symbol};

/// 不超过该长度的（子）问题直接比较排序
const BASE_CASE: usize = 64;

/// 基数排序每一位允许的最小字母表上限
const RADIX_SIGMA: usize = 1 << 16;

const T0: usize = 0;
const T1: usize = 1;
const R0: usize = 2;
const R1: usize = 3;
const R2: usize = 4;

/// 位置 i 的合并信息：`[t_i, t_{i+1}, r_i, r_{i+1}, r_{i+2}]`，
/// 其中 `r` 为模 3 余 1/2 位置的秩（模 3 余 0 的位置与越界处为 0）。
type Info = (u64, [u64; 5]);

/// 取样三元组 `(i, [t_i, t_{i+1}, t_{i+2}])` 按三个符号排序
const TRIPLE_DIGITS: [fn(&(u64, [u64; 3])) -> u64; 3] = [|&(_, t)| t[0], |&(_, t)| t[1], |&(_, t)| t[2]];
/// `(位置, 值)` 按位置排序
const BY_POSITION: [fn(&(u64, u64)) -> u64; 1] = [|&(i, _)| i];
/// 余 1 段在前、余 2 段在后，段内按位置
const BY_CLASS: [fn(&(u64, u64)) -> u64; 2] = [|&(i, _)| i % 3, |&(i, _)| i / 3];
/// 非取样位置的排序键 `(t_i, r_{i+1})`
const MOD0_DIGITS: [fn(&Info) -> u64; 2] = [|&(_, f)| f[T0], |&(_, f)| f[R1]];
/// 取样位置按自身的秩
const MOD12_DIGITS: [fn(&Info) -> u64; 1] = [|&(_, f)| f[R0]];

/// 在末尾追加至多一个固定元素。
struct WithDummy<P: Pipe> {
    up: P,
    dummy: Option<P::Item>,
    pos: usize,
}

impl<P: Pipe> Pipe for WithDummy<P> {
    type Item = P::Item;

    fn len(&self) -> usize {
        self.up.len() + usize::from(self.dummy.is_some())
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    fn current(&mut self) -> Result<P::Item> {
        if self.pos < self.up.len() {
            return self.up.current();
        }
        self.dummy.ok_or_else(crate::pipe::read_past_end)
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        if self.pos <= self.up.len() {
            self.up.advance()?;
        }
        Ok(())
    }
}

/// 把按位置排好的 (位置, 秩) 流展开成长度为 n 的秩序列，模 3 余 0 的位置补 0。
struct Expand<P> {
    up: P,
    n: usize,
    pos: usize,
}

impl<P: Pipe<Item = (u64, u64)>> Pipe for Expand<P> {
    type Item = u64;

    fn len(&self) -> usize {
        self.n
    }

    fn begin_read(&mut self) -> Result<()> {
        self.pos = 0;
        self.up.begin_read()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.n
    }

    fn current(&mut self) -> Result<u64> {
        if self.pos % 3 == 0 {
            return Ok(0);
        }
        let (p, r) = self.up.current()?;
        if p != self.pos as u64 {
            return Err(IndexError::invariant(format!(
                "sample rank for position {} found at {p}",
                self.pos
            )));
        }
        Ok(r)
    }

    fn advance(&mut self) -> Result<()> {
        if self.pos % 3 != 0 {
            self.up.advance()?;
        }
        self.pos += 1;
        Ok(())
    }
}

/// 组合出每个位置的 [`Info`]。
fn info_stream<'a, A, B>(text: &'a mut A, rank12: &'a mut B, n: usize) -> impl Pipe<Item = Info> + 'a
where
    A: Pipe<Item = u64> + 'a,
    B: Pipe<Item = (u64, u64)> + 'a,
{
    let symbols = Counter::new(Echoer::<_, 2>::leading(text));
    let ranks = Echoer::<_, 3>::leading(Expand { up: rank12, n, pos: 0 });
    Filter::new(Joiner::new(symbols, ranks), |((i, t), r): ((u64, [u64; 2]), [u64; 3])| {
        (i, [t[0], t[1], r[0], r[1], r[2]])
    })
}

/// 模 3 余 0 的后缀 a 是否排在余 1/2 的后缀 b 之前。两者不可能相等。
fn mod0_first(a: &Info, b: &Info) -> bool {
    let (fa, fb) = (&a.1, &b.1);
    if b.0 % 3 == 1 {
        (fa[T0], fa[R1]) < (fb[T0], fb[R1])
    } else {
        (fa[T0], fa[T1], fa[R2]) < (fb[T0], fb[T1], fb[R2])
    }
}

fn merge<A, B, O>(s0: &mut A, s12: &mut B, out: &mut O) -> Result<()>
where
    A: Pipe<Item = Info>,
    B: Pipe<Item = Info>,
    O: Sink<u64>,
{
    s0.begin_read()?;
    s12.begin_read()?;
    out.begin_write()?;
    loop {
        let take_s0 = match (s0.at_end(), s12.at_end()) {
            (true, true) => break,
            (false, true) => true,
            (true, false) => false,
            (false, false) => mod0_first(&s0.current()?, &s12.current()?),
        };
        if take_s0 {
            out.push(s0.current()?.0)?;
            s0.advance()?;
        } else {
            out.push(s12.current()?.0)?;
            s12.advance()?;
        }
    }
    out.end_write()?;
    s0.end_read()?;
    s12.end_read()
}

/// 按 `digits`（高位在前）稳定排序 `up`，结果写入新缓冲。
fn sort_stage<P, S, const D: usize>(
    mut up: P,
    digits: [fn(&P::Item) -> u64; D],
    storage: &S,
) -> Result<S::Buf<P::Item>>
where
    P: Pipe,
    S: Storage,
{
    let key = move |x: &P::Item| digits.map(|d| d(x));
    let mut out = storage.buffer()?;
    if storage.sort_capacity(P::Item::WIDTH).is_some() {
        pump(&mut Sorter::new(up, key, storage.clone()), &mut out)?;
        return Ok(out);
    }

    let items = collect(&mut up)?;
    let max_sigma = items.len().saturating_mul(4).max(RADIX_SIGMA);
    match lsd_order(&items, &digits, max_sigma)? {
        Some(order) => {
            out.begin_write()?;
            for i in order {
                out.push(items[i])?;
            }
            out.end_write()?;
        }
        None => {
            pump(&mut Sorter::new(Source::new(&items), key, storage.clone()), &mut out)?;
        }
    }
    Ok(out)
}

fn base_case<P: Pipe<Item = u64>, S: Storage>(text: &mut P, storage: &S) -> Result<S::Buf<u64>> {
    let t = collect(text)?;
    let sa: Vec<u64> = comparison_sort(&t).into_iter().map(|p| p as u64).collect();
    let mut out = storage.buffer()?;
    pump(&mut Source::new(&sa), &mut out)?;
    Ok(out)
}

/// 对 `text`（符号均 ≥ 1）递归构建后缀数组。
fn skew<S: Storage>(text: &mut S::Buf<u64>, storage: &S, depth: usize) -> Result<S::Buf<u64>> {
    let n = text.len();
    if n <= BASE_CASE {
        return base_case(text, storage);
    }

    // n ≡ 1 (mod 3) 时补一个位置 n 的全零三元组，保证余 1 段末尾唯一
    let dummy = n % 3 == 1;
    let n1 = (n + 1) / 3 + usize::from(dummy);
    let n12 = n1 + n / 3;
    if n12 >= n {
        return Err(IndexError::invariant(format!("skew recursion does not shrink: {n12} >= {n}")));
    }

    // 1. 取样位置的三元组排序并命名
    let mut named: S::Buf<(u64, u64)> = storage.buffer()?;
    let names = {
        let sample = WithDummy {
            up: Sampler::new(Counter::new(Echoer::<_, 3>::leading(&mut *text)), 3, 0b110)?,
            dummy: dummy.then_some((n as u64, [0u64; 3])),
            pos: 0,
        };
        let mut sorted = sort_stage(sample, TRIPLE_DIGITS, storage)?;
        sorted.begin_read()?;
        named.begin_write()?;
        let mut name = 0u64;
        let mut last = None;
        while let Some((i, t)) = sorted.next_item()? {
            if last != Some(t) {
                name += 1;
                last = Some(t);
            }
            named.push((i, name))?;
        }
        named.end_write()?;
        sorted.end_read()?;
        name
    };
    log::debug!("skew depth {}: n={}, samples={}, names={}", depth, n, n12, names);

    // 2. 取样位置的秩，按位置排列
    let mut rank12: S::Buf<(u64, u64)> = if names as usize == n12 {
        sort_stage(&mut named, BY_POSITION, storage)?
    } else {
        // 余 1 段在前、余 2 段在后拼成缩减串，递归排序
        let mut reduced: S::Buf<u64> = storage.buffer()?;
        {
            let by_class = sort_stage(&mut named, BY_CLASS, storage)?;
            pump(&mut Filter::new(by_class, |(_, name): (u64, u64)| name), &mut reduced)?;
        }
        drop(named);
        let mut sa_r = skew(&mut reduced, storage, depth + 1)?;
        drop(reduced);

        let n1 = n1 as u64;
        let ranked = Filter::new(Counter::new(&mut sa_r), move |(k, j): (u64, u64)| {
            let p = if j < n1 { 3 * j + 1 } else { 3 * (j - n1) + 2 };
            (p, k + 1)
        });
        sort_stage(ranked, BY_POSITION, storage)?
    };

    // 3. 非取样位置按 (t_i, r_{i+1}) 排序；取样位置按秩排序
    let mut s0: S::Buf<Info> = {
        let mod0 = Sampler::new(info_stream(&mut *text, &mut rank12, n), 3, 0b001)?;
        sort_stage(mod0, MOD0_DIGITS, storage)?
    };
    let mut s12: S::Buf<Info> = {
        let mod12 = Sampler::new(info_stream(&mut *text, &mut rank12, n), 3, 0b110)?;
        sort_stage(mod12, MOD12_DIGITS, storage)?
    };
    drop(rank12);

    // 4. 归并
    let mut sa: S::Buf<u64> = storage.buffer()?;
    merge(&mut s0, &mut s12, &mut sa)?;
    if sa.len() != n {
        return Err(IndexError::invariant(format!("skew merge produced {} of {n} suffixes", sa.len())));
    }
    Ok(sa)
}

/// DC3 入口：返回写在 `storage` 上的后缀数组。
pub fn skew_buffer<T: Symbol, S: Storage>(seq: &Sequence<'_, T>, storage: &S) -> Result<S::Buf<u64>> {
    if seq.is_empty() {
        return Err(IndexError::invalid("skew construction needs a non-empty sequence"));
    }
    let mut text: S::Buf<u64> = storage.buffer()?;
    pump(&mut Filter::new(Source::new(seq.symbols()), |c: T| c.ordinal() as u64 + 1), &mut text)?;
    skew(&mut text, storage, 0)
}

/// DC3 入口：读回内存中的后缀数组。
pub fn skew_suffix_array<T: Symbol, S: Storage>(seq: &Sequence<'_, T>, storage: &S) -> Result<Vec<usize>> {
    let mut sa = skew_buffer(seq, storage)?;
    Ok(collect(&mut sa)?.into_iter().map(|p| p as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::storage::{External, InMemory};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_text(rng: &mut StdRng, len: usize, sigma: u8) -> Vec<u8> {
        (0..len).map(|_| rng.gen_range(0..sigma)).collect()
    }

    #[test]
    fn matches_comparison_sort_in_memory() {
        let mut rng = StdRng::seed_from_u64(7);
        for &sigma in &[1u8, 2, 4, 26] {
            for len in [1, 2, 3, 64, 65, 66, 67, 100, 301, 1000] {
                let text = random_text(&mut rng, len, sigma);
                let seq = Sequence::new(&text, sigma as usize).unwrap();
                let sa = skew_suffix_array(&seq, &InMemory).unwrap();
                assert_eq!(sa, comparison_sort(&text), "len={} sigma={}", len, sigma);
            }
        }
    }

    #[test]
    fn recursion_on_repetitive_text() {
        // 全同字符使每一层的命名都不唯一
        let text = vec![0u8; 700];
        let seq = Sequence::new(&text, 1).unwrap();
        assert_eq!(skew_suffix_array(&seq, &InMemory).unwrap(), comparison_sort(&text));

        let text: Vec<u8> = b"abcab".iter().cycle().take(500).map(|c| c - b'a').collect();
        let seq = Sequence::new(&text, 3).unwrap();
        assert_eq!(skew_suffix_array(&seq, &InMemory).unwrap(), comparison_sort(&text));
    }

    #[test]
    fn external_matches_in_memory() {
        let cfg = BuildConfig::default()
            .with_page_size(256)
            .with_stripes(3)
            .with_memory_budget(4096);
        let storage = External::new(cfg).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for len in [70, 500, 2000] {
            let text = random_text(&mut rng, len, 4);
            let seq = Sequence::new(&text, 4).unwrap();
            let ext = skew_suffix_array(&seq, &storage).unwrap();
            assert_eq!(ext, skew_suffix_array(&seq, &InMemory).unwrap());
        }
    }

    #[test]
    fn radix_and_merge_sorts_order_mod0_alike() {
        let mut rng = StdRng::seed_from_u64(5);
        let items: Vec<Info> = (0..1200u64)
            .map(|i| (3 * i, [rng.gen_range(1..5), 0, 0, rng.gen_range(0..900), 0]))
            .collect();
        let storage = External::new(BuildConfig::default().with_page_size(256).with_memory_budget(2048)).unwrap();

        let radix = collect(&mut sort_stage(Source::new(&items), MOD0_DIGITS, &InMemory).unwrap()).unwrap();
        let merged = collect(&mut sort_stage(Source::new(&items), MOD0_DIGITS, &storage).unwrap()).unwrap();
        assert_eq!(radix, merged);

        let mut expect = items.clone();
        expect.sort_by_key(|&(_, f)| (f[T0], f[R1]));
        assert_eq!(radix, expect);
    }

    #[test]
    fn wide_symbols_fall_back_to_comparison_sort() {
        let text: Vec<u32> = vec![4_000_000_000, 7, 4_000_000_000, 7, 3, 0, 4_000_000_000, 7];
        let text: Vec<u32> = text.iter().cycle().take(300).copied().collect();
        let seq = Sequence::new(&text, 4_000_000_001).unwrap();
        assert_eq!(skew_suffix_array(&seq, &InMemory).unwrap(), comparison_sort(&text));
    }

    #[test]
    fn empty_input_is_rejected() {
        let seq = Sequence::<u8>::new(&[], 4).unwrap();
        let err = skew_suffix_array(&seq, &InMemory).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }
}
