//! 四字母 DNA 字母表：A=0, C=1, G=2, T=3。

use crate::error::{IndexError, Result};

pub const SIGMA: usize = 4;

#[inline]
pub fn to_code(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn from_code(c: u8) -> u8 {
    match c {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'N',
    }
}

/// 去掉空白并统一为大写，U 视为 T。
pub fn normalize(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|&b| match b.to_ascii_uppercase() {
            b'U' => b'T',
            up => up,
        })
        .collect()
}

/// 编码为 0..4；遇到 ACGT 以外的字符报错。
pub fn encode(seq: &[u8]) -> Result<Vec<u8>> {
    seq.iter()
        .enumerate()
        .map(|(i, &b)| {
            to_code(b).ok_or_else(|| {
                IndexError::invalid(format!("non-ACGT character {:?} at position {i}", char::from(b)))
            })
        })
        .collect()
}

pub fn decode(codes: &[u8]) -> Vec<u8> {
    codes.iter().map(|&c| from_code(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codes = encode(b"acgtU").unwrap();
        assert_eq!(codes, vec![0, 1, 2, 3, 3]);
        assert_eq!(decode(&codes), b"ACGTT".to_vec());
    }

    #[test]
    fn rejects_ambiguous_bases() {
        let err = encode(b"ACNT").unwrap_err();
        assert!(err.to_string().contains("position 2"));
        assert_eq!(from_code(9), b'N');
    }

    #[test]
    fn normalize_strips_whitespace() {
        assert_eq!(normalize(b"ac g\nu"), b"ACGT".to_vec());
    }
}
