//! 定长字母表上的符号与序列。

use crate::error::{IndexError, Result};
use crate::storage::Record;

/// 可作为文本字符的整数类型；`ordinal()` 即其在字母表中的序号。
pub trait Symbol: Record + Ord + Sync {
    fn ordinal(self) -> usize;
    fn from_ordinal(o: usize) -> Self;
}

macro_rules! symbol {
    ($($t:ty),*) => {$(
        impl Symbol for $t {
            #[inline]
            fn ordinal(self) -> usize {
                self as usize
            }

            #[inline]
            fn from_ordinal(o: usize) -> Self {
                o as $t
            }
        }
    )*};
}

symbol!(u8, u16, u32, u64, usize);

/// 调用方持有的文本，附带字母表大小。构建期间只读引用，不复制。
#[derive(Debug, Clone, Copy)]
pub struct Sequence<'a, T> {
    symbols: &'a [T],
    sigma: usize,
}

impl<'a, T: Symbol> Sequence<'a, T> {
    /// 校验每个符号都落在 `[0, sigma)` 内。空序列在此处合法，
    /// 由具体的构建算法决定是否接受。
    pub fn new(symbols: &'a [T], sigma: usize) -> Result<Self> {
        if sigma == 0 {
            return Err(IndexError::invalid("alphabet size must be positive"));
        }
        if let Some((pos, c)) = symbols.iter().enumerate().find(|(_, c)| c.ordinal() >= sigma) {
            return Err(IndexError::invalid(format!(
                "symbol {} at position {pos} outside alphabet of size {sigma}",
                c.ordinal()
            )));
        }
        Ok(Self { symbols, sigma })
    }

    pub fn symbols(&self) -> &'a [T] {
        self.symbols
    }

    pub fn sigma(&self) -> usize {
        self.sigma
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<'a> Sequence<'a, u8> {
    /// 以全部 256 个字节值为字母表。
    pub fn bytes(symbols: &'a [u8]) -> Self {
        Self { symbols, sigma: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_symbols_outside_alphabet() {
        let err = Sequence::new(&[0u8, 1, 4], 4).unwrap_err();
        assert!(err.to_string().contains("position 2"));
        assert!(Sequence::new(&[0u16, 3], 4).is_ok());
        assert!(Sequence::<u8>::new(&[], 0).is_err());
    }
}
