//! 构建完成的只读索引：后缀数组、LCP 及其稀疏树、BWT，以及可选的 q-gram 索引。

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::bwt::{build_bwt, build_bwt_piped, Bwt};
use crate::error::{IndexError, Result};
use crate::lcp::{kasai, HybridNode, LcpArray, PlainNode, SparseLcpTree};
use crate::qgram::QGramIndex;
use crate::sa::{build_suffix_array, Algorithm, SuffixArray};
use crate::shape::Shape;
use crate::storage::External;
use crate::symbol::{Sequence, Symbol};

/// 构建选项。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub algorithm: Algorithm,
    /// 为 `Some` 时同时构建 q-gram 索引
    pub shape: Option<Shape>,
    /// LCP 树节点是否携带后缀位置
    pub hybrid_tree: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { algorithm: Algorithm::default(), shape: None, hybrid_tree: true }
    }
}

impl IndexOptions {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_hybrid_tree(mut self, hybrid: bool) -> Self {
        self.hybrid_tree = hybrid;
        self
    }
}

#[derive(Debug, Clone)]
pub enum LcpTree {
    Plain(SparseLcpTree<PlainNode>),
    Hybrid(SparseLcpTree<HybridNode>),
}

impl LcpTree {
    fn build(lcp: &LcpArray, sa: &SuffixArray, hybrid: bool) -> Result<Self> {
        Ok(if hybrid {
            LcpTree::Hybrid(SparseLcpTree::build(lcp, sa)?)
        } else {
            LcpTree::Plain(SparseLcpTree::build(lcp, sa)?)
        })
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, LcpTree::Hybrid(_))
    }

    pub fn depth(&self) -> usize {
        match self {
            LcpTree::Plain(t) => t.depth(),
            LcpTree::Hybrid(t) => t.depth(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Index<T> {
    text: Vec<T>,
    sigma: usize,
    options: IndexOptions,
    sa: SuffixArray,
    lcp: LcpArray,
    tree: LcpTree,
    bwt: Bwt<T>,
    qgrams: Option<QGramIndex>,
}

impl<T: Symbol> Index<T> {
    pub fn build(seq: &Sequence<'_, T>, opts: &IndexOptions) -> Result<Self> {
        log::info!("building index over {} symbols (alphabet {})", seq.len(), seq.sigma());
        let sa = build_suffix_array(seq, &opts.algorithm)?;

        let lcp = kasai(seq.symbols(), &sa)?;
        let tree = LcpTree::build(&lcp, &sa, opts.hybrid_tree)?;
        log::info!("LCP array and {} tree built", if tree.is_hybrid() { "hybrid" } else { "plain" });

        let bwt = match &opts.algorithm {
            Algorithm::ExternalSkew(cfg) => build_bwt_piped(seq, &sa, &External::new(cfg.clone())?)?,
            _ => build_bwt(seq, &sa)?,
        };
        log::info!("BWT built, sentinel row {}", bwt.sentinel());

        let qgrams = match &opts.shape {
            Some(shape) => {
                let idx = QGramIndex::build(seq, shape)?;
                log::info!("q-gram index built with {} positions", idx.positions().len());
                Some(idx)
            }
            None => None,
        };

        Ok(Self {
            text: seq.symbols().to_vec(),
            sigma: seq.sigma(),
            options: opts.clone(),
            sa,
            lcp,
            tree,
            bwt,
            qgrams,
        })
    }

    /// 由持久化的各部分组装；原文由 BWT 还原，LCP 树重新构建。
    pub(crate) fn from_parts(
        sigma: usize,
        options: IndexOptions,
        sa: SuffixArray,
        lcp: LcpArray,
        bwt: Bwt<T>,
        qgrams: Option<QGramIndex>,
    ) -> Result<Self> {
        let text = bwt.invert()?;
        if sa.len() != text.len() || lcp.len() != text.len() {
            return Err(IndexError::invalid(format!(
                "stored arrays disagree in length: text {}, suffix array {}, LCP {}",
                text.len(),
                sa.len(),
                lcp.len()
            )));
        }
        if !text.is_empty() && sa[bwt.sentinel()] != 0 {
            return Err(IndexError::invalid("BWT sentinel row does not hold suffix 0"));
        }
        let tree = LcpTree::build(&lcp, &sa, options.hybrid_tree)?;
        Ok(Self { text, sigma, options, sa, lcp, tree, bwt, qgrams })
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &[T] {
        &self.text
    }

    pub fn sigma(&self) -> usize {
        self.sigma
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn suffix_array(&self) -> &SuffixArray {
        &self.sa
    }

    pub fn lcp_array(&self) -> &LcpArray {
        &self.lcp
    }

    pub fn lcp_tree(&self) -> &LcpTree {
        &self.tree
    }

    pub fn bwt(&self) -> &Bwt<T> {
        &self.bwt
    }

    pub fn qgrams(&self) -> Option<&QGramIndex> {
        self.qgrams.as_ref()
    }

    /// q-gram 哈希为 `h` 的窗口起点；未构建 q-gram 索引时报错。
    pub fn occurrences(&self, h: u64) -> Result<&[usize]> {
        self.qgrams
            .as_ref()
            .ok_or_else(|| IndexError::invalid("index was built without a q-gram shape"))?
            .occurrences(h)
    }

    /// LCP 下标 `[lo, hi)` 上的最小 LCP 及其代表后缀。
    pub fn lcp(&self, lo: usize, hi: usize) -> Result<(usize, usize)> {
        match &self.tree {
            LcpTree::Hybrid(t) => t.lcp(lo, hi),
            LcpTree::Plain(t) => {
                let node = t.range_min(lo, hi)?;
                Ok((node.lcp, self.sa[node.pos]))
            }
        }
    }

    /// 以 `pattern` 为前缀的后缀在后缀数组中的区间，由 LCP 树加速二分。
    pub fn equal_range(&self, pattern: &[T]) -> Result<Range<usize>> {
        match &self.tree {
            LcpTree::Plain(t) => self.sa.equal_range_lcpe(&self.text, pattern, t),
            LcpTree::Hybrid(t) => self.sa.equal_range_lcpe(&self.text, pattern, t),
        }
    }

    /// `pattern` 的全部出现位置，升序。
    pub fn find(&self, pattern: &[T]) -> Result<Vec<usize>> {
        let range = self.equal_range(pattern)?;
        let mut hits = self.sa[range].to_vec();
        hits.sort_unstable();
        Ok(hits)
    }

    pub fn count(&self, pattern: &[T]) -> Result<usize> {
        Ok(self.equal_range(pattern)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::util::dna;

    fn dna_index(text: &[u8], opts: &IndexOptions) -> Index<u8> {
        let codes = dna::encode(text).unwrap();
        Index::build(&Sequence::new(&codes, dna::SIGMA).unwrap(), opts).unwrap()
    }

    #[test]
    fn index_is_send_and_sync() {
        fn assert_send_sync<X: Send + Sync>() {}
        assert_send_sync::<Index<u8>>();
        assert_send_sync::<Index<u32>>();
    }

    #[test]
    fn internal_and_external_agree() {
        let text = b"mississippi";
        let ext = IndexOptions::default().with_algorithm(Algorithm::ExternalSkew(
            BuildConfig::default().with_page_size(64).with_memory_budget(128),
        ));
        let a = Index::build(&Sequence::bytes(text), &IndexOptions::default()).unwrap();
        let b = Index::build(&Sequence::bytes(text), &ext).unwrap();
        assert_eq!(a.suffix_array(), b.suffix_array());
        assert_eq!(a.lcp_array(), b.lcp_array());
        assert_eq!(a.bwt(), b.bwt());
    }

    #[test]
    fn queries() {
        let opts = IndexOptions::default().with_shape(Shape::ungapped(2, dna::SIGMA).unwrap());
        let idx = dna_index(b"CTGAACCCTAAACCCT", &opts);
        assert_eq!(idx.find(&dna::encode(b"AACCC").unwrap()).unwrap(), vec![3, 10]);
        assert_eq!(idx.count(&dna::encode(b"CC").unwrap()).unwrap(), 4);
        assert!(idx.find(&dna::encode(b"GG").unwrap()).unwrap().is_empty());
        assert_eq!(idx.count(&[]).unwrap(), idx.len());
        assert_eq!(idx.occurrences(5).unwrap(), &[5, 6, 12, 13]);

        let (min, suffix) = idx.lcp(1, idx.len()).unwrap();
        assert_eq!(min, 0);
        assert!(suffix < idx.len());
    }

    #[test]
    fn plain_and_hybrid_trees_answer_alike() {
        let hybrid = dna_index(b"ACGTTGCAACGTAGGACGT", &IndexOptions::default());
        let plain = dna_index(b"ACGTTGCAACGTAGGACGT", &IndexOptions::default().with_hybrid_tree(false));
        assert!(hybrid.lcp_tree().is_hybrid());
        assert!(!plain.lcp_tree().is_hybrid());
        for lo in 1..hybrid.len() {
            for hi in lo + 1..=hybrid.len() {
                assert_eq!(hybrid.lcp(lo, hi).unwrap(), plain.lcp(lo, hi).unwrap());
            }
        }
    }

    #[test]
    fn tree_search_matches_plain_binary_search() {
        let mut x: u32 = 17;
        let mut next = move |m: u32| {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (x >> 16) % m
        };
        let text: Vec<u8> = (0..600).map(|_| b"ACGT"[next(4) as usize]).collect();
        for opts in [IndexOptions::default(), IndexOptions::default().with_hybrid_tree(false)] {
            let idx = dna_index(&text, &opts);
            for _ in 0..200 {
                let start = next(idx.len() as u32) as usize;
                let len = next(12) as usize;
                let mut pattern = idx.text()[start..(start + len).min(idx.len())].to_vec();
                if next(3) == 0 {
                    pattern.push(next(4) as u8);
                }
                let range = idx.equal_range(&pattern).unwrap();
                assert_eq!(range, idx.suffix_array().equal_range(idx.text(), &pattern), "{:?}", pattern);
                assert_eq!(idx.count(&pattern).unwrap(), range.len());
            }
        }
    }

    #[test]
    fn occurrences_need_a_shape() {
        let idx = dna_index(b"ACGT", &IndexOptions::default());
        assert!(idx.occurrences(0).is_err());
        assert!(idx.qgrams().is_none());
    }
}
