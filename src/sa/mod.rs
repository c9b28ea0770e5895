//! 后缀数组构建。
//!
//! 提供三种算法：直接比较排序（[`direct`]）、Manber–Myers 倍增
//! （[`doubling`]）和基于管道的 DC3（[`skew`]）。DC3 可在内存或分页外存上运行。

pub mod direct;
pub mod doubling;
pub mod skew;

use std::cmp::Ordering;
use std::ops::{Deref, Range};

use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;
use crate::error::{IndexError, Result};
use crate::lcp::{SparseLcpTree, TreeNode};
use crate::storage::{External, InMemory};
use crate::symbol::{Sequence, Symbol};

/// 后缀数组构建算法。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Algorithm {
    ComparisonSort,
    Doubling,
    #[default]
    Skew,
    /// 分页外存上的 DC3
    ExternalSkew(BuildConfig),
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::ComparisonSort => "comparison-sort",
            Algorithm::Doubling => "doubling",
            Algorithm::Skew => "skew",
            Algorithm::ExternalSkew(_) => "external-skew",
        }
    }
}

/// 后缀数组：`positions[k]` 为字典序第 k 小的后缀的起始位置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixArray {
    positions: Vec<usize>,
}

impl SuffixArray {
    /// 由已知的后缀数组构造，校验它是 `0..n` 的排列。
    pub fn from_vec(positions: Vec<usize>) -> Result<Self> {
        if !is_permutation(&positions) {
            return Err(IndexError::invalid("suffix array is not a permutation"));
        }
        Ok(Self { positions })
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.positions
    }

    /// 逆后缀数组（rank）：`inv[sa[k]] = k`。
    pub fn inverse(&self) -> Vec<usize> {
        let mut inv = vec![0; self.positions.len()];
        for (k, &p) in self.positions.iter().enumerate() {
            inv[p] = k;
        }
        inv
    }

    /// 以 `pattern` 为前缀的后缀在后缀数组中的区间；无匹配时为空区间。
    pub fn equal_range<T: Symbol>(&self, text: &[T], pattern: &[T]) -> Range<usize> {
        let sa = &self.positions;
        // 下界：第一个 >= pattern 的后缀
        let lower = partition(sa, text, pattern, |ord| ord == Ordering::Less);
        // 上界：第一个前缀大于 pattern 的后缀
        let upper = partition(sa, text, pattern, |ord| ord != Ordering::Greater);
        lower..upper.max(lower)
    }

    /// 与 [`equal_range`](Self::equal_range) 结果相同，借助 LCP 树减少字符比较。
    ///
    /// 二分时保留左右边界与 pattern 的公共前缀长度 l、r。取较大的一侧，
    /// 由树查出该边界与中点后缀的 LCP：与 l（或 r）不等时中点的次序可直接推出，
    /// 相等时才从该长度处继续比较文本。每个字符至多被比较一次，
    /// 总代价 O(|pattern| + log n) 次比较加 O(log n) 次树查询。
    pub fn equal_range_lcpe<T: Symbol, N: TreeNode>(
        &self,
        text: &[T],
        pattern: &[T],
        tree: &SparseLcpTree<N>,
    ) -> Result<Range<usize>> {
        let sa = &self.positions;
        if tree.rows() != sa.len() {
            return Err(IndexError::invalid(format!(
                "LCP tree over {} rows for a suffix array of {}",
                tree.rows(),
                sa.len()
            )));
        }
        let lower = partition_lcpe(sa, text, pattern, tree, |ord| ord == Ordering::Less)?;
        let upper = partition_lcpe(sa, text, pattern, tree, |ord| ord != Ordering::Greater)?;
        Ok(lower..upper.max(lower))
    }
}

impl Deref for SuffixArray {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.positions
    }
}

/// 后缀 `suf` 的前 |pattern| 个字符与 pattern 比较，从已知相同的 `start` 处起，
/// 返回比较结果与公共前缀长度。
fn compare_from<T: Symbol>(text: &[T], suf: usize, pattern: &[T], start: usize) -> (Ordering, usize) {
    let s = &text[suf..];
    let mut k = start;
    while k < pattern.len() {
        match s.get(k) {
            None => return (Ordering::Less, k),
            Some(c) if *c != pattern[k] => return (c.cmp(&pattern[k]), k),
            Some(_) => k += 1,
        }
    }
    (Ordering::Equal, k)
}

/// 二分查找第一个不满足 `pred` 的位置，利用左右边界的公共前缀（mlr）跳过已比较字符。
fn partition<T: Symbol>(sa: &[usize], text: &[T], pattern: &[T], pred: impl Fn(Ordering) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, sa.len());
    let (mut llcp, mut rlcp) = (0usize, 0usize);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (ord, l) = compare_from(text, sa[mid], pattern, llcp.min(rlcp));
        if pred(ord) {
            lo = mid + 1;
            llcp = l;
        } else {
            hi = mid;
            rlcp = l;
        }
    }
    lo
}

/// 二分边界上的后缀与 pattern 的比较结果及公共前缀长度。
#[derive(Debug, Clone, Copy)]
struct Bound {
    ord: Ordering,
    lcp: usize,
}

/// 已知边界 `x` 与中点后缀的 LCP 为 `m` 时推出中点与 pattern 的比较；
/// `left` 表示边界在中点之前。`m == x.lcp` 且未比完时无法推出。
fn infer(x: Bound, m: usize, left: bool, plen: usize) -> Option<(Ordering, usize)> {
    if m > x.lcp || (m == x.lcp && x.lcp == plen) {
        Some((x.ord, x.lcp))
    } else if m < x.lcp {
        // 中点在第 m 个字符处与边界分开，而边界在此处与 pattern 相同
        Some((if left { Ordering::Greater } else { Ordering::Less }, m))
    } else {
        None
    }
}

fn partition_lcpe<T: Symbol, N: TreeNode>(
    sa: &[usize],
    text: &[T],
    pattern: &[T],
    tree: &SparseLcpTree<N>,
    pred: impl Fn(Ordering) -> bool,
) -> Result<usize> {
    let (mut lo, mut hi) = (0usize, sa.len());
    // left 对应行 lo-1，right 对应行 hi
    let (mut left, mut right): (Option<Bound>, Option<Bound>) = (None, None);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let l = left.map_or(0, |b| b.lcp);
        let r = right.map_or(0, |b| b.lcp);
        let known = match (left, right) {
            (Some(x), _) if l >= r && l > 0 => infer(x, tree.range_min(lo, mid + 1)?.lcp(), true, pattern.len()),
            (_, Some(x)) if r > l => infer(x, tree.range_min(mid + 1, hi + 1)?.lcp(), false, pattern.len()),
            _ => None,
        };
        let (ord, lcp) = match known {
            Some(v) => v,
            None => compare_from(text, sa[mid], pattern, l.max(r)),
        };
        if pred(ord) {
            lo = mid + 1;
            left = Some(Bound { ord, lcp });
        } else {
            hi = mid;
            right = Some(Bound { ord, lcp });
        }
    }
    Ok(lo)
}

pub fn is_permutation(sa: &[usize]) -> bool {
    let mut seen = vec![false; sa.len()];
    for &p in sa {
        match seen.get_mut(p) {
            Some(s) if !*s => *s = true,
            _ => return false,
        }
    }
    true
}

/// 相邻后缀严格递增。
pub fn is_sorted<T: Symbol>(text: &[T], sa: &[usize]) -> bool {
    sa.windows(2).all(|w| text[w[0]..] < text[w[1]..])
}

/// 按 `alg` 构建 `seq` 的后缀数组，结果总会校验为排列。
///
/// 比较排序与倍增法接受空序列；DC3 要求非空。
pub fn build_suffix_array<T: Symbol>(seq: &Sequence<'_, T>, alg: &Algorithm) -> Result<SuffixArray> {
    let started = std::time::Instant::now();
    let positions = match alg {
        Algorithm::ComparisonSort => direct::comparison_sort(seq.symbols()),
        Algorithm::Doubling => doubling::doubling(seq.symbols(), seq.sigma())?,
        Algorithm::Skew => skew::skew_suffix_array(seq, &InMemory)?,
        Algorithm::ExternalSkew(cfg) => {
            let storage = External::new(cfg.clone())?;
            let sa = skew::skew_suffix_array(seq, &storage)?;
            log::debug!("frame pool after build: {:?}", storage.pool_stats()?);
            sa
        }
    };
    if positions.len() != seq.len() || !is_permutation(&positions) {
        return Err(IndexError::invariant(format!("{} produced an invalid suffix array", alg.name())));
    }
    log::info!(
        "suffix array of {} symbols built with {} in {:.2?}",
        seq.len(),
        alg.name(),
        started.elapsed()
    );
    Ok(SuffixArray { positions })
}
