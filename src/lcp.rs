//! LCP 数组与稀疏 RMQ 树。
//!
//! `lcp[i]` 是后缀 `sa[i-1]` 与 `sa[i]` 的最长公共前缀长度，`lcp[0] = 0`。
//! 树建在 `lcp[1..n)` 上：第 0 层是叶子，第 k+1 层的节点 j 是第 k 层节点
//! `2j`、`2j+1` 中的较小者（落单的末节点直接上提）。

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::sa::SuffixArray;
use crate::symbol::{Sequence, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LcpArray {
    values: Vec<usize>,
}

impl LcpArray {
    pub fn into_vec(self) -> Vec<usize> {
        self.values
    }

    pub fn from_vec(values: Vec<usize>) -> Self {
        Self { values }
    }
}

impl Deref for LcpArray {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.values
    }
}

/// Kasai 算法，O(n)。
///
/// 按文本顺序访问后缀 p，与其在后缀数组中的前一个后缀比较；
/// 相邻两步之间公共前缀长度至多减一，因此总比较次数线性。
pub fn kasai<T: Symbol>(text: &[T], sa: &SuffixArray) -> Result<LcpArray> {
    let n = text.len();
    if sa.len() != n {
        return Err(IndexError::invalid(format!(
            "suffix array has {} entries for a text of length {n}",
            sa.len()
        )));
    }
    let rank = sa.inverse();
    let mut lcp = vec![0usize; n];
    let mut h = 0usize;
    for p in 0..n {
        let r = rank[p];
        if r == 0 {
            h = 0;
            continue;
        }
        let q = sa[r - 1];
        while p + h < n && q + h < n && text[p + h] == text[q + h] {
            h += 1;
        }
        lcp[r] = h;
        h = h.saturating_sub(1);
    }
    Ok(LcpArray { values: lcp })
}

/// 树节点：携带最小 LCP 及其所在的 LCP 下标。
pub trait TreeNode: Copy {
    fn leaf(lcp: usize, pos: usize, sa: &[usize]) -> Self;
    fn lcp(&self) -> usize;
    fn pos(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainNode {
    pub lcp: usize,
    pub pos: usize,
}

impl TreeNode for PlainNode {
    fn leaf(lcp: usize, pos: usize, _sa: &[usize]) -> Self {
        Self { lcp, pos }
    }

    fn lcp(&self) -> usize {
        self.lcp
    }

    fn pos(&self) -> usize {
        self.pos
    }
}

/// 额外记录 `sa[pos]`，查询直接得到代表后缀，无需回查后缀数组。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridNode {
    pub lcp: usize,
    pub pos: usize,
    pub suffix: usize,
}

impl TreeNode for HybridNode {
    fn leaf(lcp: usize, pos: usize, sa: &[usize]) -> Self {
        Self { lcp, pos, suffix: sa[pos] }
    }

    fn lcp(&self) -> usize {
        self.lcp
    }

    fn pos(&self) -> usize {
        self.pos
    }
}

/// 相等时取左侧
#[inline]
fn min_node<N: TreeNode>(left: N, right: N) -> N {
    if right.lcp() < left.lcp() {
        right
    } else {
        left
    }
}

fn min_opt<N: TreeNode>(left: Option<N>, right: Option<N>) -> Option<N> {
    match (left, right) {
        (Some(l), Some(r)) => Some(min_node(l, r)),
        (l, None) => l,
        (None, r) => r,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseLcpTree<N> {
    levels: Vec<Vec<N>>,
    /// 对应 LCP 数组长度 n；叶子数为 n-1
    n: usize,
}

struct LevelBuilder<N> {
    levels: Vec<Vec<N>>,
    pending: Vec<Option<N>>,
}

impl<N: TreeNode> LevelBuilder<N> {
    /// 二进制计数：某层攒够两个节点就向上一层进位。
    fn push(&mut self, mut level: usize, mut node: N) {
        loop {
            if self.levels.len() == level {
                self.levels.push(Vec::new());
                self.pending.push(None);
            }
            self.levels[level].push(node);
            match self.pending[level].take() {
                Some(left) => {
                    node = min_node(left, node);
                    level += 1;
                }
                None => {
                    self.pending[level] = Some(node);
                    return;
                }
            }
        }
    }

    /// 把各层落单的末节点上提，直到只剩根。
    fn finish(mut self) -> Vec<Vec<N>> {
        let mut level = 0;
        while level < self.levels.len() {
            if self.levels[level].len() > 1 {
                if let Some(left) = self.pending[level].take() {
                    self.push(level + 1, left);
                }
            }
            level += 1;
        }
        self.levels
    }
}

impl<N: TreeNode> SparseLcpTree<N> {
    pub fn build(lcp: &LcpArray, sa: &[usize]) -> Result<Self> {
        let n = lcp.len();
        if sa.len() != n {
            return Err(IndexError::invalid(format!("LCP array of {n} entries, suffix array of {}", sa.len())));
        }
        let mut builder = LevelBuilder { levels: Vec::new(), pending: Vec::new() };
        for (i, &v) in lcp.iter().enumerate().skip(1) {
            builder.push(0, N::leaf(v, i, sa));
        }
        let tree = Self { levels: builder.finish(), n };
        log::debug!("LCP tree over {} leaves, depth {}", n.saturating_sub(1), tree.depth());
        Ok(tree)
    }

    /// 树的层数（含叶子层）；空树为 0。
    pub fn depth(&self) -> usize {
        let leaves = self.n.saturating_sub(1);
        if leaves == 0 {
            0
        } else {
            (usize::BITS - (leaves - 1).leading_zeros()) as usize + 1
        }
    }

    /// 对应的 LCP 数组长度，即后缀数组的行数。
    pub fn rows(&self) -> usize {
        self.n
    }

    pub fn root(&self) -> Option<&N> {
        self.levels.last().and_then(|top| top.first())
    }

    /// LCP 下标区间 `[lo, hi)` 上的最小值节点（相等取最左），
    /// 要求 `1 <= lo < hi <= n`。自底向上 O(log n)。
    pub fn range_min(&self, lo: usize, hi: usize) -> Result<N> {
        if lo == 0 || lo >= hi || hi > self.n {
            return Err(IndexError::invalid(format!(
                "LCP range [{lo}, {hi}) outside [1, {})",
                self.n
            )));
        }
        let (mut l, mut r) = (lo - 1, hi - 1);
        let (mut best_l, mut best_r) = (None, None);
        let mut level = 0;
        while l < r {
            let nodes = &self.levels[level];
            if l % 2 == 1 {
                best_l = min_opt(best_l, Some(nodes[l]));
                l += 1;
            }
            if r % 2 == 1 {
                r -= 1;
                best_r = min_opt(Some(nodes[r]), best_r);
            }
            l /= 2;
            r /= 2;
            level += 1;
        }
        min_opt(best_l, best_r).ok_or_else(|| IndexError::invariant("empty LCP range after validation"))
    }
}

impl SparseLcpTree<HybridNode> {
    /// 后缀数组行 `lo-1..hi` 的最长公共前缀及一个代表后缀。
    pub fn lcp(&self, lo: usize, hi: usize) -> Result<(usize, usize)> {
        let node = self.range_min(lo, hi)?;
        Ok((node.lcp, node.suffix))
    }
}

/// 由后缀数组计算 LCP 数组与混合稀疏树。
pub fn build_lcp_tree<T: Symbol>(
    seq: &Sequence<'_, T>,
    sa: &SuffixArray,
) -> Result<(LcpArray, SparseLcpTree<HybridNode>)> {
    let lcp = kasai(seq.symbols(), sa)?;
    let tree = SparseLcpTree::build(&lcp, sa)?;
    Ok((lcp, tree))
}
