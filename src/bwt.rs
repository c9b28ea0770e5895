//! Burrows–Wheeler 变换。
//!
//! `bwt[i] = text[sa[i] - 1]`。`sa[i] = 0` 的那一行（哨兵行）没有前驱，
//! 该位置存放循环意义下的前驱 `text[n-1]`，行号单独记录；
//! [`Bwt::get`] 在哨兵行返回 `None`。

use crate::error::{IndexError, Result};
use crate::pipe::{collect, pump, Boundary, Counter, Filter, Joiner, Mapper, Pipe, Shifter, Source};
use crate::sa::SuffixArray;
use crate::storage::Storage;
use crate::symbol::{Sequence, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bwt<T> {
    symbols: Vec<T>,
    sentinel: usize,
}

impl<T: Symbol> Bwt<T> {
    /// 由存储的符号与哨兵行组装，哨兵行必须在范围内（空变换除外）。
    pub fn from_parts(symbols: Vec<T>, sentinel: usize) -> Result<Self> {
        if !symbols.is_empty() && sentinel >= symbols.len() {
            return Err(IndexError::invalid(format!(
                "sentinel row {sentinel} outside a transform of length {}",
                symbols.len()
            )));
        }
        Ok(Self { symbols, sentinel })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn sentinel(&self) -> usize {
        self.sentinel
    }

    /// 第 i 行的前驱符号，哨兵行为 `None`
    pub fn get(&self, i: usize) -> Option<T> {
        if i == self.sentinel {
            return None;
        }
        self.symbols.get(i).copied()
    }

    /// 存储的全部符号，哨兵行为 `text[n-1]`。
    pub fn symbols(&self) -> &[T] {
        &self.symbols
    }

    /// LF 映射还原原文。
    ///
    /// 以 `text[n-1]` 开头的后缀中，最短的那个（仅一个字符）排在最前，
    /// 所以 `LF(r) = C[c] + [text[n-1] == c] + rank_c(r)`，其中 `rank_c`
    /// 不计哨兵行。从后缀 n-1 所在行出发走 n-1 步，最后必须回到哨兵行。
    pub fn invert(&self) -> Result<Vec<T>> {
        let n = self.symbols.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let sigma = self.symbols.iter().map(|c| c.ordinal()).max().map_or(0, |m| m + 1);
        let last = self.symbols[self.sentinel];

        let mut c_table = vec![0usize; sigma + 1];
        for &c in &self.symbols {
            c_table[c.ordinal() + 1] += 1;
        }
        for k in 1..=sigma {
            c_table[k] += c_table[k - 1];
        }

        // occ[r]：哨兵行以外、r 之前与 L[r] 相同的符号个数
        let mut seen = vec![0usize; sigma];
        let mut occ = vec![0usize; n];
        for (r, &c) in self.symbols.iter().enumerate() {
            if r == self.sentinel {
                continue;
            }
            occ[r] = seen[c.ordinal()];
            seen[c.ordinal()] += 1;
        }
        let lf = |r: usize| {
            let c = self.symbols[r];
            c_table[c.ordinal()] + usize::from(c == last) + occ[r]
        };

        let mut text = vec![last; n];
        let mut r = c_table[last.ordinal()];
        for p in (0..n - 1).rev() {
            if r == self.sentinel {
                return Err(IndexError::invariant(format!("LF walk reached the sentinel row early at {p}")));
            }
            text[p] = self.symbols[r];
            r = lf(r);
        }
        if r != self.sentinel {
            return Err(IndexError::invariant(format!(
                "LF walk ended at row {r}, expected sentinel row {}",
                self.sentinel
            )));
        }
        Ok(text)
    }
}

fn check_lengths<T: Symbol>(seq: &Sequence<'_, T>, sa: &SuffixArray) -> Result<()> {
    if sa.len() != seq.len() {
        return Err(IndexError::invalid(format!(
            "suffix array has {} entries for a sequence of length {}",
            sa.len(),
            seq.len()
        )));
    }
    Ok(())
}

/// 直接由文本与后缀数组构建。
pub fn build_bwt<T: Symbol>(seq: &Sequence<'_, T>, sa: &SuffixArray) -> Result<Bwt<T>> {
    check_lengths(seq, sa)?;
    let text = seq.symbols();
    let n = text.len();
    let mut symbols = Vec::with_capacity(n);
    let mut sentinel = 0;
    for (i, &p) in sa.iter().enumerate() {
        if p == 0 {
            sentinel = i;
            symbols.push(text[n - 1]);
        } else {
            symbols.push(text[p - 1]);
        }
    }
    Ok(Bwt { symbols, sentinel })
}

/// 以管道阶段构建：
/// 1. `Counter` + `Mapper` 把后缀数组翻成按文本位置排列的秩；
/// 2. `Shifter(-1, Blank)` 让位置 p 看到 `text[p-1]`；
/// 3. `Joiner` 配对 (秩, 前驱符号)，再由 `Mapper` 按秩排列；
/// 4. 秩为 0 号位置的行即哨兵行，填入移位时被挤出的 `text[n-1]`。
pub fn build_bwt_piped<T: Symbol, S: Storage>(
    seq: &Sequence<'_, T>,
    sa: &SuffixArray,
    storage: &S,
) -> Result<Bwt<T>> {
    check_lengths(seq, sa)?;
    if seq.is_empty() {
        return Ok(Bwt { symbols: Vec::new(), sentinel: 0 });
    }

    let mut sa_buf: S::Buf<u64> = storage.buffer()?;
    pump(&mut Filter::new(Source::new(&sa[..]), |p: usize| p as u64), &mut sa_buf)?;
    let mut text_buf: S::Buf<T> = storage.buffer()?;
    pump(&mut Source::new(seq.symbols()), &mut text_buf)?;

    let ranks = Filter::new(
        Mapper::new(Counter::new(&mut sa_buf), |&(_, p): &(u64, u64)| p as usize, storage.clone()),
        |(k, _): (u64, u64)| k,
    );
    let shifted = Shifter::new(&mut text_buf, -1, Boundary::Blank);
    let mut by_rank = Mapper::new(Joiner::new(ranks, shifted), |&(k, _): &(u64, T)| k as usize, storage.clone());

    let sentinel = {
        let ranks = by_rank.inner().left();
        ranks.begin_read()?;
        let r = ranks.current()?;
        ranks.end_read()?;
        r
    };
    let last = {
        let shifter = by_rank.inner().right();
        shifter.begin_read()?;
        let tail = shifter.dropped_tail()?;
        shifter.end_read()?;
        tail.first().copied().ok_or_else(|| IndexError::invariant("shifter dropped no symbol"))?
    };

    let mut patched = Filter::new(Counter::new(&mut by_rank), move |(row, (_, c)): (u64, (u64, T))| {
        if row == sentinel {
            last
        } else {
            c
        }
    });
    let mut out: S::Buf<T> = storage.buffer()?;
    pump(&mut patched, &mut out)?;
    let symbols = collect(&mut out)?;
    log::debug!("piped BWT of {} symbols, sentinel row {}", symbols.len(), sentinel);
    Ok(Bwt { symbols, sentinel: sentinel as usize })
}
