use super::Pipe;
use crate::error::{IndexError, Result};

/// 保留下标模 `modulus` 落在指定剩余类中的元素，
/// 例如差分覆盖中 `i % 3 != 0` 的位置。
pub struct Sampler<P> {
    up: P,
    modulus: usize,
    residues: u64,
    up_pos: usize,
    emitted: usize,
}

impl<P: Pipe> Sampler<P> {
    /// `residues` 是位掩码：第 `r` 位保留 `i % modulus == r` 的下标。
    pub fn new(up: P, modulus: usize, residues: u64) -> Result<Self> {
        if modulus == 0 || modulus > 64 {
            return Err(IndexError::invalid(format!("sampler modulus {modulus} not in 1..=64")));
        }
        Ok(Self { up, modulus, residues, up_pos: 0, emitted: 0 })
    }

    fn keeps(&self, i: usize) -> bool {
        (self.residues >> (i % self.modulus)) & 1 == 1
    }

    fn skip_dropped(&mut self) -> Result<()> {
        let n = self.up.len();
        while self.up_pos < n && !self.keeps(self.up_pos) {
            self.up.advance()?;
            self.up_pos += 1;
        }
        Ok(())
    }
}

impl<P: Pipe> Pipe for Sampler<P> {
    type Item = P::Item;

    fn len(&self) -> usize {
        let n = self.up.len();
        let per_cycle = (0..self.modulus).filter(|&r| self.keeps(r)).count();
        let tail = (0..n % self.modulus).filter(|&r| self.keeps(r)).count();
        n / self.modulus * per_cycle + tail
    }

    fn begin_read(&mut self) -> Result<()> {
        self.up_pos = 0;
        self.emitted = 0;
        self.up.begin_read()?;
        self.skip_dropped()
    }

    fn end_read(&mut self) -> Result<()> {
        self.up.end_read()
    }

    fn at_end(&self) -> bool {
        self.emitted >= self.len()
    }

    fn current(&mut self) -> Result<P::Item> {
        self.up.current()
    }

    fn advance(&mut self) -> Result<()> {
        self.up.advance()?;
        self.up_pos += 1;
        self.emitted += 1;
        self.skip_dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{collect, Source};

    #[test]
    fn keeps_selected_residues() {
        let data: Vec<u32> = (0..8).collect();
        let mut s = Sampler::new(Source::new(&data), 3, 0b110).unwrap();
        assert_eq!(s.len(), 5);
        assert_eq!(collect(&mut s).unwrap(), vec![1, 2, 4, 5, 7]);

        let mut s = Sampler::new(Source::new(&data), 3, 0b001).unwrap();
        assert_eq!(collect(&mut s).unwrap(), vec![0, 3, 6]);
    }
}
