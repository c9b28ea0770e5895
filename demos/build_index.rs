//! 演示如何在 library 模式下构建并查询索引。
//!
//! 运行方式：
//! ```bash
//! cargo run --example build_index
//! ```

use seqindex::index::{Index, IndexOptions};
use seqindex::persist;
use seqindex::sa::Algorithm;
use seqindex::shape::Shape;
use seqindex::symbol::Sequence;
use seqindex::util::dna;
use seqindex::BuildConfig;

fn main() -> anyhow::Result<()> {
    // 1. 参考序列
    let reference = b"ACGTACGTAGCTGATCGTAGCTAGCTAGCTGATCGTAGCTAGCTAGCTGAT";
    let codes = dna::encode(reference)?;
    let seq = Sequence::new(&codes, dna::SIGMA)?;
    println!("参考长度: {} bp", seq.len());

    // 2. 在分页外存上构建（小页面，演示用）
    let cfg = BuildConfig::default().with_page_size(4096).with_memory_budget(1 << 16);
    let opts = IndexOptions::default()
        .with_algorithm(Algorithm::ExternalSkew(cfg))
        .with_shape(Shape::gapped("11011", dna::SIGMA)?);
    let idx = Index::build(&seq, &opts)?;
    println!("BWT 哨兵行: {}", idx.bwt().sentinel());
    println!("LCP 树深度: {}", idx.lcp_tree().depth());

    // 3. 精确匹配
    let pattern = b"GCTGATCG";
    let hits = idx.find(&dna::encode(pattern)?)?;
    println!("'{}' 出现于 {:?}", String::from_utf8_lossy(pattern), hits);

    // 4. q-gram 查询
    let shape = opts.shape.as_ref().map(Shape::weight).unwrap_or(0);
    let query = dna::encode(b"AGCTA")?;
    if let Some(q) = idx.qgrams() {
        println!("权重 {} 的形状下 AG?TA 出现于 {:?}", shape, q.occurrences_of(&query)?);
    }

    // 5. 落盘再读回
    let dir = tempfile::tempdir()?;
    let prefix = dir.path().join("demo");
    let manifest = persist::save(&idx, &prefix)?;
    let loaded: Index<u8> = persist::load(&prefix)?;
    println!("读回 {} 个符号（构建于 {}）", loaded.len(), manifest.created);
    assert_eq!(dna::decode(loaded.text()), reference.to_vec());
    Ok(())
}
