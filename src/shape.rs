//! q-gram 形状与滚动哈希。
//!
//! 形状描述窗口中哪些偏移参与哈希。窗口的哈希是参与位置上的符号序号
//! 按 σ 进制拼成的整数，首个参与位置为最高位：
//! `hash = Σ code(w[o_j]) · σ^(weight-1-j)`。

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// 参与位置，严格递增，首元素为 0
    offsets: Vec<usize>,
    span: usize,
    sigma: u64,
    /// σ^(weight-1)
    left_factor: u64,
    /// σ^weight，不同哈希值的个数
    code_count: u64,
}

fn pow(sigma: u64, exp: usize) -> Result<u64> {
    u32::try_from(exp)
        .ok()
        .and_then(|e| sigma.checked_pow(e))
        .ok_or_else(|| IndexError::invalid(format!("alphabet size {sigma} to the power {exp} overflows u64")))
}

impl Shape {
    /// 连续形状：长度为 `q` 的窗口全部参与。
    pub fn ungapped(q: usize, sigma: usize) -> Result<Self> {
        Self::from_offsets((0..q).collect(), sigma)
    }

    /// 由 `1`（参与）和 `0`（间隔）组成的模式，例如 `"1101"`。
    /// 首尾必须是 `1`。
    pub fn gapped(pattern: &str, sigma: usize) -> Result<Self> {
        if !pattern.starts_with('1') || !pattern.ends_with('1') {
            return Err(IndexError::invalid(format!("shape {pattern:?} must start and end with '1'")));
        }
        let mut offsets = Vec::new();
        for (i, c) in pattern.chars().enumerate() {
            match c {
                '1' => offsets.push(i),
                '0' => {}
                other => {
                    return Err(IndexError::invalid(format!("unexpected {other:?} in shape {pattern:?}")));
                }
            }
        }
        Self::from_offsets(offsets, sigma)
    }

    pub fn from_offsets(offsets: Vec<usize>, sigma: usize) -> Result<Self> {
        if sigma == 0 {
            return Err(IndexError::invalid("alphabet size must be positive"));
        }
        match offsets.first() {
            None => return Err(IndexError::invalid("shape needs at least one relevant position")),
            Some(&first) if first != 0 => {
                return Err(IndexError::invalid("shape must start at offset 0"));
            }
            Some(_) => {}
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(IndexError::invalid(format!("shape offsets {offsets:?} are not increasing")));
        }
        let sigma = sigma as u64;
        let weight = offsets.len();
        let code_count = pow(sigma, weight)?;
        let left_factor = pow(sigma, weight - 1)?;
        let span = offsets[weight - 1] + 1;
        Ok(Self { offsets, span, sigma, left_factor, code_count })
    }

    /// 窗口覆盖的总长度。
    pub fn span(&self) -> usize {
        self.span
    }

    /// 参与哈希的位置个数。
    pub fn weight(&self) -> usize {
        self.offsets.len()
    }

    pub fn sigma(&self) -> usize {
        self.sigma as usize
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn is_ungapped(&self) -> bool {
        self.span == self.offsets.len()
    }

    pub fn code_count(&self) -> u64 {
        self.code_count
    }

    fn code<T: Symbol>(&self, c: T) -> Result<u64> {
        let o = c.ordinal() as u64;
        if o >= self.sigma {
            return Err(IndexError::invalid(format!(
                "symbol {o} outside alphabet of size {}",
                self.sigma
            )));
        }
        Ok(o)
    }

    /// 窗口 `window[..span]` 的哈希。
    pub fn hash<T: Symbol>(&self, window: &[T]) -> Result<u64> {
        if window.len() < self.span {
            return Err(IndexError::invalid(format!(
                "window of {} symbols is shorter than the shape span {}",
                window.len(),
                self.span
            )));
        }
        let mut h = 0u64;
        for &o in &self.offsets {
            h = h * self.sigma + self.code(window[o])?;
        }
        Ok(h)
    }

    /// 连续形状窗口右移一位后的哈希：去掉 `outgoing`，追加 `incoming`。
    pub fn hash_next<T: Symbol>(&self, prev: u64, outgoing: T, incoming: T) -> Result<u64> {
        if !self.is_ungapped() {
            return Err(IndexError::invalid("hash_next needs an ungapped shape; use a QGramHasher"));
        }
        if prev >= self.code_count {
            return Err(IndexError::invalid(format!("hash {prev} outside [0, {})", self.code_count)));
        }
        let out = self.code(outgoing)?;
        let inc = self.code(incoming)?;
        // prev 的最高位就是 outgoing
        let rest = prev
            .checked_sub(out * self.left_factor)
            .ok_or_else(|| IndexError::invalid(format!("hash {prev} does not start with symbol {out}")))?;
        Ok(rest * self.sigma + inc)
    }

    /// 以 `prefix`（参与位置上的前若干个符号）开头的全部哈希值，连续区间。
    pub fn hash_prefix<T: Symbol>(&self, prefix: &[T]) -> Result<Range<u64>> {
        let k = prefix.len();
        if k > self.weight() {
            return Err(IndexError::invalid(format!(
                "prefix of {k} symbols longer than shape weight {}",
                self.weight()
            )));
        }
        let mut h = 0u64;
        for &c in prefix {
            h = h * self.sigma + self.code(c)?;
        }
        let scale = pow(self.sigma, self.weight() - k)?;
        Ok(h * scale..(h + 1) * scale)
    }

    /// 哈希值还原为参与位置上的符号序号。
    pub fn unhash(&self, mut h: u64) -> Result<Vec<usize>> {
        if h >= self.code_count {
            return Err(IndexError::invalid(format!("hash {h} outside [0, {})", self.code_count)));
        }
        let mut out = vec![0usize; self.weight()];
        for slot in out.iter_mut().rev() {
            *slot = (h % self.sigma) as usize;
            h /= self.sigma;
        }
        Ok(out)
    }

    /// 枚举 `text` 所有完整窗口的哈希。
    pub fn hasher<'a, T: Symbol>(&'a self, text: &'a [T]) -> Result<QGramHasher<'a, T>> {
        if let Some(c) = text.iter().find(|c| c.ordinal() as u64 >= self.sigma) {
            return Err(IndexError::invalid(format!(
                "symbol {} outside alphabet of size {}",
                c.ordinal(),
                self.sigma
            )));
        }
        let mut blocks: Vec<Block> = Vec::new();
        for &o in &self.offsets {
            match blocks.last_mut() {
                Some(b) if b.offset + b.len == o => b.len += 1,
                _ => blocks.push(Block { offset: o, len: 1, factor: 1, scale: 1, hash: 0 }),
            }
        }
        for b in &mut blocks {
            b.factor = pow(self.sigma, b.len - 1)?;
            b.scale = b.factor * self.sigma;
        }
        let mut hasher = QGramHasher { shape: self, text, blocks, pos: 0 };
        if text.len() >= self.span {
            hasher.load_first();
        }
        Ok(hasher)
    }
}

/// 形状中一段连续的参与位置。
#[derive(Debug, Clone)]
struct Block {
    offset: usize,
    len: usize,
    /// σ^(len-1)
    factor: u64,
    /// σ^len
    scale: u64,
    hash: u64,
}

/// 依次产出 `text` 中每个完整窗口的哈希。
///
/// 每段连续参与位置各自滚动，每步 O(段数)；连续形状只有一段。
#[derive(Debug, Clone)]
pub struct QGramHasher<'a, T> {
    shape: &'a Shape,
    text: &'a [T],
    blocks: Vec<Block>,
    pos: usize,
}

impl<'a, T: Symbol> QGramHasher<'a, T> {
    fn load_first(&mut self) {
        let sigma = self.shape.sigma;
        for b in &mut self.blocks {
            b.hash = self.text[b.offset..b.offset + b.len]
                .iter()
                .fold(0, |h, c| h * sigma + c.ordinal() as u64);
        }
    }

    fn roll(&mut self) {
        let sigma = self.shape.sigma;
        let p = self.pos;
        for b in &mut self.blocks {
            let out = self.text[p - 1 + b.offset].ordinal() as u64;
            let inc = self.text[p + b.offset + b.len - 1].ordinal() as u64;
            b.hash = (b.hash - out * b.factor) * sigma + inc;
        }
    }

    /// 下一个窗口的起始位置。
    pub fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        (self.text.len() + 1).saturating_sub(self.shape.span + self.pos)
    }
}

impl<'a, T: Symbol> Iterator for QGramHasher<'a, T> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.remaining() == 0 {
            return None;
        }
        if self.pos > 0 {
            self.roll();
        }
        self.pos += 1;
        Some(self.blocks.iter().fold(0, |h, b| h * b.scale + b.hash))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl<'a, T: Symbol> ExactSizeIterator for QGramHasher<'a, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn ungapped_hash_is_base_sigma() {
        let s = Shape::ungapped(3, 4).unwrap();
        assert_eq!(s.span(), 3);
        assert_eq!(s.weight(), 3);
        assert_eq!(s.code_count(), 64);
        assert_eq!(s.hash(&[1u8, 2, 3]).unwrap(), 16 + 2 * 4 + 3);
        assert_eq!(s.unhash(27).unwrap(), vec![1, 2, 3]);
        assert!(s.hash(&[1u8, 2]).is_err());
        assert!(s.hash(&[1u8, 2, 4]).is_err());
    }

    #[test]
    fn rolling_equals_fresh() {
        let mut rng = StdRng::seed_from_u64(5);
        let text: Vec<u8> = (0..300).map(|_| rng.gen_range(0..4)).collect();
        for q in [1, 2, 5, 12] {
            let s = Shape::ungapped(q, 4).unwrap();
            let mut h = s.hash(&text).unwrap();
            for p in 1..=text.len() - q {
                h = s.hash_next(h, text[p - 1], text[p + q - 1]).unwrap();
                assert_eq!(h, s.hash(&text[p..]).unwrap(), "q={} p={}", q, p);
            }
        }
    }

    #[test]
    fn gapped_hasher_equals_fresh() {
        let mut rng = StdRng::seed_from_u64(9);
        let text: Vec<u16> = (0..200).map(|_| rng.gen_range(0..5)).collect();
        for pattern in ["1", "101", "1101", "1100111", "10001"] {
            let s = Shape::gapped(pattern, 5).unwrap();
            let rolled: Vec<u64> = s.hasher(&text).unwrap().collect();
            assert_eq!(rolled.len(), text.len() - s.span() + 1);
            for (p, &h) in rolled.iter().enumerate() {
                assert_eq!(h, s.hash(&text[p..]).unwrap(), "shape {} p={}", pattern, p);
            }
        }
    }

    #[test]
    fn gapped_layout() {
        let s = Shape::gapped("1101", 4).unwrap();
        assert_eq!(s.offsets(), &[0, 1, 3]);
        assert_eq!((s.span(), s.weight()), (4, 3));
        assert!(!s.is_ungapped());
        assert_eq!(s.hash(&[1u8, 2, 0, 3]).unwrap(), 16 + 8 + 3);
        assert!(s.hash_next(0, 0u8, 0u8).is_err());
    }

    #[test]
    fn malformed_shapes() {
        assert!(Shape::gapped("0110", 4).is_err());
        assert!(Shape::gapped("1x1", 4).is_err());
        assert!(Shape::gapped("", 4).is_err());
        assert!(Shape::from_offsets(vec![0, 2, 2], 4).is_err());
        assert!(Shape::from_offsets(vec![1, 2], 4).is_err());
        assert!(Shape::ungapped(0, 4).is_err());
        // 4^32 = 2^64 no longer fits
        assert!(Shape::ungapped(32, 4).is_err());
        assert!(Shape::ungapped(31, 4).is_ok());
    }

    #[test]
    fn prefix_ranges() {
        let s = Shape::ungapped(3, 4).unwrap();
        assert_eq!(s.hash_prefix::<u8>(&[]).unwrap(), 0..64);
        assert_eq!(s.hash_prefix(&[2u8]).unwrap(), 32..48);
        assert_eq!(s.hash_prefix(&[2u8, 1]).unwrap(), 36..40);
        assert_eq!(s.hash_prefix(&[2u8, 1, 3]).unwrap(), 39..40);
        assert!(s.hash_prefix(&[0u8; 4]).is_err());
    }

    #[test]
    fn short_text_has_no_windows() {
        let s = Shape::ungapped(4, 4).unwrap();
        assert_eq!(s.hasher(&[0u8, 1, 2]).unwrap().count(), 0);
        assert_eq!(s.hasher(&[0u8, 1, 2, 3]).unwrap().len(), 1);
    }
}
