use crate::error::Result;
use crate::radix::radix_pass;
use crate::symbol::Symbol;

/// 倍增构建的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoublingState {
    Uninitialized,
    /// 已按首字符分桶
    SortedByFirstSymbol,
    /// 已按前 `h` 个字符排好，下一轮得到 `2h` 序
    Doubling { h: usize },
    Sorted,
}

/// Manber–Myers 倍增法，O(n log n)。
///
/// 先用一轮基数排序按首字符分桶；之后每一轮利用"后缀 i 的 2h 序
/// 由 (i 的 h 序, i+h 的 h 序) 决定"，按桶顺序扫描 h 序中的后缀 i+h，
/// 把 i 移到其所在桶的下一个空位，同时用 `b2h` 标出新子桶的起点。
/// 所有桶都是单元素时结束。
pub struct Doubling<'a, T> {
    text: &'a [T],
    sigma: usize,
    state: DoublingState,
    /// 当前序下的后缀数组
    pos: Vec<usize>,
    /// 轮内：后缀 → 所在桶首 / 新位置
    prm: Vec<usize>,
    count: Vec<usize>,
    /// 桶首标记，`bh[n]` 为哨兵
    bh: Vec<bool>,
    b2h: Vec<bool>,
}

impl<'a, T: Symbol> Doubling<'a, T> {
    pub fn new(text: &'a [T], sigma: usize) -> Self {
        Self {
            text,
            sigma,
            state: DoublingState::Uninitialized,
            pos: Vec::new(),
            prm: Vec::new(),
            count: Vec::new(),
            bh: Vec::new(),
            b2h: Vec::new(),
        }
    }

    pub fn state(&self) -> DoublingState {
        self.state
    }

    fn all_singletons(&self) -> bool {
        self.bh[..self.text.len()].iter().all(|&b| b)
    }

    /// 推进一个阶段。
    pub fn step(&mut self) -> Result<DoublingState> {
        let n = self.text.len();
        self.state = match self.state {
            DoublingState::Uninitialized => {
                let unsorted: Vec<usize> = (0..n).collect();
                self.pos = vec![0; n];
                radix_pass(&mut self.pos, &unsorted, self.text, &mut self.count, self.sigma)?;
                self.bh = vec![false; n + 1];
                for i in 0..n {
                    self.bh[i] = i == 0 || self.text[self.pos[i]] != self.text[self.pos[i - 1]];
                }
                self.bh[n] = true;
                self.b2h = vec![false; n + 1];
                self.prm = vec![0; n];
                self.count = vec![0; n];
                DoublingState::SortedByFirstSymbol
            }
            DoublingState::SortedByFirstSymbol => {
                if self.all_singletons() {
                    DoublingState::Sorted
                } else {
                    DoublingState::Doubling { h: 1 }
                }
            }
            DoublingState::Doubling { h } => {
                self.round(h);
                log::trace!("doubling round h={} done", h);
                if self.all_singletons() || 2 * h >= n {
                    DoublingState::Sorted
                } else {
                    DoublingState::Doubling { h: 2 * h }
                }
            }
            DoublingState::Sorted => DoublingState::Sorted,
        };
        Ok(self.state)
    }

    /// 从 h 序得到 2h 序。要求 `h < n`。
    fn round(&mut self, h: usize) {
        let n = self.text.len();
        let Self { pos, prm, count, bh, b2h, .. } = self;

        let mut head = 0;
        for i in 0..n {
            if bh[i] {
                head = i;
                count[i] = 0;
            }
            prm[pos[i]] = head;
        }
        b2h.fill(false);

        // 长度为 h 的后缀在其桶内最小
        let d = n - h;
        let e = prm[d];
        prm[d] = e + count[e];
        count[e] += 1;
        b2h[prm[d]] = true;

        let mut l = 0;
        while l < n {
            let mut r = l + 1;
            while !bh[r] {
                r += 1;
            }
            for k in l..r {
                if let Some(d) = pos[k].checked_sub(h) {
                    let e = prm[d];
                    prm[d] = e + count[e];
                    count[e] += 1;
                    b2h[prm[d]] = true;
                }
            }
            // 同一批移入同一旧桶的后缀彼此相等，只保留第一个子桶首标记
            for k in l..r {
                if let Some(d) = pos[k].checked_sub(h) {
                    if b2h[prm[d]] {
                        let mut f = prm[d] + 1;
                        while !bh[f] && b2h[f] {
                            b2h[f] = false;
                            f += 1;
                        }
                    }
                }
            }
            l = r;
        }

        for i in 0..n {
            pos[prm[i]] = i;
            if b2h[i] {
                bh[i] = true;
            }
        }
    }

    /// 运行到结束并返回后缀数组。
    pub fn run(mut self) -> Result<Vec<usize>> {
        while self.step()? != DoublingState::Sorted {}
        Ok(self.pos)
    }
}

/// 便捷入口：倍增法构建后缀数组。
pub fn doubling<T: Symbol>(text: &[T], sigma: usize) -> Result<Vec<usize>> {
    Doubling::new(text, sigma).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::direct::comparison_sort;

    fn make_text(len: usize, sigma: u32) -> Vec<u8> {
        let mut x: u32 = 1_234_567;
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            v.push(((x >> 16) % sigma) as u8);
        }
        v
    }

    #[test]
    fn walks_through_states() {
        let text = [1u8, 0, 1, 0, 1];
        let mut d = Doubling::new(&text, 2);
        assert_eq!(d.state(), DoublingState::Uninitialized);
        assert_eq!(d.step().unwrap(), DoublingState::SortedByFirstSymbol);
        assert_eq!(d.step().unwrap(), DoublingState::Doubling { h: 1 });
        while d.step().unwrap() != DoublingState::Sorted {}
        assert_eq!(d.run().unwrap(), comparison_sort(&text));
    }

    #[test]
    fn matches_comparison_sort_on_small_random_texts() {
        for sigma in [1, 2, 4, 6] {
            for len in 0..=40 {
                let text = make_text(len, sigma);
                let sa = doubling(&text, sigma as usize).unwrap();
                assert_eq!(sa, comparison_sort(&text), "mismatch on len={} sigma={}", len, sigma);
            }
        }
    }

    #[test]
    fn periodic_texts() {
        for text in [&b"aaaaaaaaaaaa"[..], b"abababababa", b"abcabcabcabc"] {
            assert_eq!(doubling(text, 256).unwrap(), comparison_sort(text));
        }
    }
}
