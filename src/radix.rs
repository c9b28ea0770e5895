//! 基数排序的单轮计数分配（稳定）。
//!
//! 倍增法按首字符分桶、DC3 的元组排序、q-gram 索引的桶偏移都依赖同一套
//! "计数 → 前缀和 → 分配"流程。

use crate::alloc::{BlockAlloc, SinglePool};
use crate::error::{IndexError, Result};
use crate::symbol::Symbol;

/// 将 `counts[0..len)` 原地改写为排他前缀和，返回总数。
pub fn exclusive_prefix_sum(counts: &mut [usize]) -> usize {
    let mut sum = 0usize;
    for c in counts.iter_mut() {
        let v = *c;
        *c = sum;
        sum += v;
    }
    sum
}

fn check_lengths(sorted: &[usize], unsorted: &[usize]) -> Result<()> {
    if sorted.len() != unsorted.len() {
        return Err(IndexError::invalid(format!(
            "radix pass output has {} slots for {} inputs",
            sorted.len(),
            unsorted.len()
        )));
    }
    Ok(())
}

/// 按 `key[a]` 对 `unsorted` 中的下标做一轮稳定计数排序，结果写入 `sorted`。
/// `counts` 作为可复用的计数缓冲，长度会被调整为 `sigma`。
pub fn radix_pass<K: Symbol>(
    sorted: &mut [usize],
    unsorted: &[usize],
    key: &[K],
    counts: &mut Vec<usize>,
    sigma: usize,
) -> Result<()> {
    radix_pass_shifted(sorted, unsorted, key, counts, sigma, 0)
}

/// 同 [`radix_pass`]，但按 `key[a + shift]` 排序。
/// 越界（`a + shift >= key.len()`）的下标视为最小，按输入顺序连续放在最前面。
pub fn radix_pass_shifted<K: Symbol>(
    sorted: &mut [usize],
    unsorted: &[usize],
    key: &[K],
    counts: &mut Vec<usize>,
    sigma: usize,
    shift: usize,
) -> Result<()> {
    check_lengths(sorted, unsorted)?;
    counts.clear();
    counts
        .try_reserve_exact(sigma)
        .map_err(|_| IndexError::Allocation { requested: sigma })?;
    counts.resize(sigma, 0);

    let mut short = 0usize;
    for &a in unsorted {
        match key.get(a + shift) {
            Some(c) => {
                let o = c.ordinal();
                if o >= sigma {
                    return Err(IndexError::invalid(format!(
                        "symbol {o} at position {} outside alphabet of size {sigma}",
                        a + shift
                    )));
                }
                counts[o] += 1;
            }
            None => short += 1,
        }
    }
    exclusive_prefix_sum(counts);

    let mut head = 0usize;
    for &a in unsorted {
        match key.get(a + shift) {
            Some(c) => {
                let o = c.ordinal();
                sorted[short + counts[o]] = a;
                counts[o] += 1;
            }
            None => {
                sorted[head] = a;
                head += 1;
            }
        }
    }
    Ok(())
}

/// 多位 LSD 基数排序：`digits` 高位在前，从最低位起逐位做稳定的 [`radix_pass`]，
/// 返回 `items` 的下标次序。
///
/// 每一位的字母表取该位最大值加一；超过 `max_sigma` 时返回 `None`，
/// 调用方应改用比较排序。各位的键数组长度相同，由一个 [`SinglePool`] 轮转复用。
pub fn lsd_order<T>(items: &[T], digits: &[fn(&T) -> u64], max_sigma: usize) -> Result<Option<Vec<usize>>> {
    let n = items.len();
    let mut order: Vec<usize> = (0..n).collect();
    let mut scratch = vec![0usize; n];
    let mut counts = Vec::new();
    let mut keys: SinglePool<u64> = SinglePool::new(n);

    for digit in digits.iter().rev() {
        let mut key = keys.allocate(n)?;
        key.extend(items.iter().map(digit));
        let max = key.iter().copied().max().unwrap_or(0);
        let sigma = match usize::try_from(max).ok().and_then(|m| m.checked_add(1)) {
            Some(s) if s <= max_sigma => s,
            _ => {
                log::debug!("digit alphabet {} exceeds {}, radix order skipped", max, max_sigma);
                return Ok(None);
            }
        };
        radix_pass(&mut scratch, &order, &key, &mut counts, sigma)?;
        std::mem::swap(&mut order, &mut scratch);
        keys.deallocate(key);
    }
    log::trace!("lsd order of {} items: key pool {:?}", n, keys.stats());
    Ok(Some(order))
}
