//! q-gram 直接寻址索引。
//!
//! 与基数排序同样的两遍做法：先统计每个哈希桶的大小，做一次前缀和得到
//! `bucket_offsets`，再按文本顺序把窗口起点散布到各桶。桶内位置保持升序。

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::radix::exclusive_prefix_sum;
use crate::shape::Shape;
use crate::symbol::{Sequence, Symbol};

/// 桶数组长度 `σ^weight + 1`，必须能放进内存
fn bucket_table(shape: &Shape) -> Result<Vec<usize>> {
    let buckets = usize::try_from(shape.code_count())
        .ok()
        .and_then(|c| c.checked_add(1))
        .ok_or(IndexError::Allocation { requested: usize::MAX })?;
    let mut table = Vec::new();
    table
        .try_reserve_exact(buckets)
        .map_err(|_| IndexError::Allocation { requested: buckets })?;
    table.resize(buckets, 0);
    Ok(table)
}

fn check_alphabet<T: Symbol>(seq: &Sequence<'_, T>, shape: &Shape) -> Result<()> {
    if seq.sigma() != shape.sigma() {
        return Err(IndexError::invalid(format!(
            "sequence alphabet of size {} does not match shape alphabet of size {}",
            seq.sigma(),
            shape.sigma()
        )));
    }
    Ok(())
}

/// 序列集合中的一个位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqPos {
    pub seq: usize,
    pub offset: usize,
}

/// 单条序列时 `P = usize`，序列集合时 `P = SeqPos`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QGramIndex<P = usize> {
    shape: Shape,
    bucket_offsets: Vec<usize>,
    positions: Vec<P>,
}

impl QGramIndex<usize> {
    pub fn build<T: Symbol>(seq: &Sequence<'_, T>, shape: &Shape) -> Result<Self> {
        Self::build_from(std::slice::from_ref(seq), shape, |_, p| p)
    }
}

impl QGramIndex<SeqPos> {
    /// 索引多条序列；短于形状跨度的序列没有窗口，直接跳过。
    pub fn build_set<T: Symbol>(seqs: &[Sequence<'_, T>], shape: &Shape) -> Result<Self> {
        Self::build_from(seqs, shape, |seq, offset| SeqPos { seq, offset })
    }
}

impl<P: Copy> QGramIndex<P> {
    fn build_from<T: Symbol>(
        seqs: &[Sequence<'_, T>],
        shape: &Shape,
        make: impl Fn(usize, usize) -> P,
    ) -> Result<Self> {
        for seq in seqs {
            check_alphabet(seq, shape)?;
        }
        let mut offsets = bucket_table(shape)?;
        for seq in seqs {
            for h in shape.hasher(seq.symbols())? {
                offsets[h as usize] += 1;
            }
        }
        let total = exclusive_prefix_sum(&mut offsets);

        let mut positions: Vec<Option<P>> = Vec::new();
        positions
            .try_reserve_exact(total)
            .map_err(|_| IndexError::Allocation { requested: total })?;
        positions.resize(total, None);
        let mut cursor = offsets.clone();
        for (i, seq) in seqs.iter().enumerate() {
            for (p, h) in shape.hasher(seq.symbols())?.enumerate() {
                let slot = &mut cursor[h as usize];
                positions[*slot] = Some(make(i, p));
                *slot += 1;
            }
        }
        let positions = positions
            .into_iter()
            .collect::<Option<Vec<P>>>()
            .ok_or_else(|| IndexError::invariant("q-gram scatter left a slot empty"))?;

        log::debug!(
            "q-gram index: {} windows over {} buckets (span {}, weight {})",
            total,
            shape.code_count(),
            shape.span(),
            shape.weight()
        );
        Ok(Self { shape: shape.clone(), bucket_offsets: offsets, positions })
    }

    /// 从持久化的各部分重建，校验桶数组单调且与位置数一致。
    pub fn from_parts(shape: Shape, bucket_offsets: Vec<usize>, positions: Vec<P>) -> Result<Self> {
        let expected = usize::try_from(shape.code_count()).ok().and_then(|c| c.checked_add(1));
        if expected != Some(bucket_offsets.len())
            || bucket_offsets.first() != Some(&0)
            || bucket_offsets.last() != Some(&positions.len())
            || bucket_offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(IndexError::invalid("q-gram bucket offsets do not describe the position array"));
        }
        Ok(Self { shape, bucket_offsets, positions })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn bucket_offsets(&self) -> &[usize] {
        &self.bucket_offsets
    }

    pub fn positions(&self) -> &[P] {
        &self.positions
    }

    fn bucket(&self, h: u64) -> Result<usize> {
        if h >= self.shape.code_count() {
            return Err(IndexError::invalid(format!(
                "hash {h} outside [0, {})",
                self.shape.code_count()
            )));
        }
        Ok(h as usize)
    }

    /// 哈希为 `h` 的全部窗口起点。
    pub fn occurrences(&self, h: u64) -> Result<&[P]> {
        let b = self.bucket(h)?;
        Ok(&self.positions[self.bucket_offsets[b]..self.bucket_offsets[b + 1]])
    }

    pub fn bucket_count(&self, h: u64) -> Result<usize> {
        let b = self.bucket(h)?;
        Ok(self.bucket_offsets[b + 1] - self.bucket_offsets[b])
    }

    pub fn occurrences_of<T: Symbol>(&self, window: &[T]) -> Result<&[P]> {
        self.occurrences(self.shape.hash(window)?)
    }

    /// 参与位置上以 `prefix` 开头的窗口，按哈希序排列。
    pub fn prefix_occurrences<T: Symbol>(&self, prefix: &[T]) -> Result<&[P]> {
        let range = self.shape.hash_prefix(prefix)?;
        let lo = self.bucket_offsets[range.start as usize];
        let hi = self.bucket_offsets[range.end as usize];
        Ok(&self.positions[lo..hi])
    }
}

/// 每个 q-gram 出现在哪些序列中，各出现几次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QGramCounts {
    shape: Shape,
    bucket_offsets: Vec<usize>,
    /// (序列号, 次数)，桶内按序列号升序
    entries: Vec<(usize, usize)>,
}

impl QGramCounts {
    pub fn build<T: Symbol>(seqs: &[Sequence<'_, T>], shape: &Shape) -> Result<Self> {
        for seq in seqs {
            check_alphabet(seq, shape)?;
        }
        let mut offsets = bucket_table(shape)?;
        // 每个桶最近一次出现在哪条序列
        let mut last_seq = vec![usize::MAX; offsets.len()];
        for (i, seq) in seqs.iter().enumerate() {
            for h in shape.hasher(seq.symbols())? {
                let h = h as usize;
                if last_seq[h] != i {
                    last_seq[h] = i;
                    offsets[h] += 1;
                }
            }
        }
        let total = exclusive_prefix_sum(&mut offsets);

        let mut entries = vec![(0usize, 0usize); total];
        let mut cursor = offsets.clone();
        last_seq.fill(usize::MAX);
        for (i, seq) in seqs.iter().enumerate() {
            for h in shape.hasher(seq.symbols())? {
                let h = h as usize;
                if last_seq[h] != i {
                    last_seq[h] = i;
                    entries[cursor[h]] = (i, 1);
                    cursor[h] += 1;
                } else {
                    entries[cursor[h] - 1].1 += 1;
                }
            }
        }
        Ok(Self { shape: shape.clone(), bucket_offsets: offsets, entries })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn counts(&self, h: u64) -> Result<&[(usize, usize)]> {
        if h >= self.shape.code_count() {
            return Err(IndexError::invalid(format!(
                "hash {h} outside [0, {})",
                self.shape.code_count()
            )));
        }
        let b = h as usize;
        Ok(&self.entries[self.bucket_offsets[b]..self.bucket_offsets[b + 1]])
    }

    pub fn counts_of<T: Symbol>(&self, window: &[T]) -> Result<&[(usize, usize)]> {
        self.counts(self.shape.hash(window)?)
    }
}

/// 单条序列的 q-gram 索引。
pub fn build_qgram_index<T: Symbol>(seq: &Sequence<'_, T>, shape: &Shape) -> Result<QGramIndex> {
    QGramIndex::build(seq, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::dna;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn ctgaaccc_fixture() {
        let text = dna::encode(b"CTGAACCCTAAACCCT").unwrap();
        let seq = Sequence::new(&text, dna::SIGMA).unwrap();
        let shape = Shape::ungapped(2, dna::SIGMA).unwrap();
        let idx = build_qgram_index(&seq, &shape).unwrap();
        assert_eq!(idx.positions(), &[3, 9, 10, 4, 11, 5, 6, 12, 13, 0, 7, 14, 2, 8, 1]);
        assert_eq!(
            idx.bucket_offsets(),
            &[0, 3, 5, 5, 5, 5, 9, 9, 12, 13, 13, 13, 13, 14, 14, 15, 15]
        );
        let cc = dna::encode(b"CC").unwrap();
        assert_eq!(idx.occurrences_of(&cc).unwrap(), &[5, 6, 12, 13]);
        assert_eq!(idx.bucket_count(3).unwrap(), 0);
        assert!(idx.occurrences(16).is_err());
    }

    #[test]
    fn completeness_both_ways() {
        let mut rng = StdRng::seed_from_u64(21);
        let text: Vec<u8> = (0..400).map(|_| rng.gen_range(0..4)).collect();
        let seq = Sequence::new(&text, 4).unwrap();
        for shape in [Shape::ungapped(3, 4).unwrap(), Shape::gapped("11011", 4).unwrap()] {
            let idx = QGramIndex::build(&seq, &shape).unwrap();
            assert_eq!(idx.positions().len(), text.len() - shape.span() + 1);
            for p in 0..=text.len() - shape.span() {
                let h = shape.hash(&text[p..]).unwrap();
                assert!(idx.occurrences(h).unwrap().contains(&p));
            }
            for h in 0..shape.code_count() {
                let occ = idx.occurrences(h).unwrap();
                assert!(occ.windows(2).all(|w| w[0] < w[1]));
                for &p in occ {
                    assert_eq!(shape.hash(&text[p..]).unwrap(), h);
                }
            }
        }
    }

    #[test]
    fn prefix_queries_cover_buckets() {
        let text = dna::encode(b"ACGTACGGACCA").unwrap();
        let seq = Sequence::new(&text, 4).unwrap();
        let shape = Shape::ungapped(3, 4).unwrap();
        let idx = QGramIndex::build(&seq, &shape).unwrap();
        let mut hits = idx.prefix_occurrences(&dna::encode(b"AC").unwrap()).unwrap().to_vec();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 4, 8]);
        assert_eq!(idx.prefix_occurrences::<u8>(&[]).unwrap().len(), idx.positions().len());
    }

    #[test]
    fn string_set_positions() {
        let a = dna::encode(b"ACGT").unwrap();
        let b = dna::encode(b"A").unwrap();
        let c = dna::encode(b"TACG").unwrap();
        let seqs: Vec<_> = [&a, &b, &c].iter().map(|s| Sequence::new(s.as_slice(), 4).unwrap()).collect();
        let shape = Shape::ungapped(2, 4).unwrap();
        let idx = QGramIndex::build_set(&seqs, &shape).unwrap();
        assert_eq!(idx.positions().len(), 3 + 3);
        let ac = idx.occurrences_of(&dna::encode(b"AC").unwrap()).unwrap();
        assert_eq!(ac, &[SeqPos { seq: 0, offset: 0 }, SeqPos { seq: 2, offset: 1 }]);
    }

    #[test]
    fn counts_per_sequence() {
        let a = dna::encode(b"AAAC").unwrap();
        let b = dna::encode(b"CAAG").unwrap();
        let seqs = [Sequence::new(&a, 4).unwrap(), Sequence::new(&b, 4).unwrap()];
        let shape = Shape::ungapped(2, 4).unwrap();
        let counts = QGramCounts::build(&seqs, &shape).unwrap();
        let aa = dna::encode(b"AA").unwrap();
        assert_eq!(counts.counts_of(&aa).unwrap(), &[(0, 2), (1, 1)]);
        assert_eq!(counts.counts_of(&dna::encode(b"AG").unwrap()).unwrap(), &[(1, 1)]);
        assert!(counts.counts_of(&dna::encode(b"GG").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn alphabet_mismatch_is_rejected() {
        let seq = Sequence::bytes(b"ACGT");
        let shape = Shape::ungapped(2, 4).unwrap();
        assert!(QGramIndex::build(&seq, &shape).is_err());
    }

    #[test]
    fn parts_are_validated() {
        let shape = Shape::ungapped(1, 2).unwrap();
        assert!(QGramIndex::from_parts(shape.clone(), vec![0, 1, 2], vec![1usize, 0]).is_ok());
        assert!(QGramIndex::from_parts(shape.clone(), vec![0, 2, 1], vec![1usize, 0]).is_err());
        assert!(QGramIndex::from_parts(shape, vec![0, 2], vec![1usize, 0]).is_err());
    }
}
