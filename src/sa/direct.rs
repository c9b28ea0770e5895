use rayon::prelude::*;

use crate::symbol::Symbol;

/// 超过该长度时改用 rayon 并行排序
const PAR_SORT_THRESHOLD: usize = 100_000;

/// 直接比较排序：对恒等排列按完整后缀做比较排序。
/// 最坏 O(n² log n)，但实现简单，作为其它算法的对照基准。
pub fn comparison_sort<T: Symbol>(text: &[T]) -> Vec<usize> {
    let mut sa: Vec<usize> = (0..text.len()).collect();
    // 后缀两两不同，不稳定排序即可
    if sa.len() > PAR_SORT_THRESHOLD {
        sa.par_sort_unstable_by(|&a, &b| text[a..].cmp(&text[b..]));
    } else {
        sa.sort_unstable_by(|&a, &b| text[a..].cmp(&text[b..]));
    }
    sa
}
