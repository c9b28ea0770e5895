//! # seqindex
//!
//! 定长字母表序列的全文索引引擎。
//!
//! 本 crate 从一条（或一组）序列构建：
//!
//! - **后缀数组**：比较排序、Manber–Myers 倍增、以及基于管道的 DC3（可在分页外存上运行）
//! - **LCP 数组**与稀疏 RMQ 树（普通 / 混合节点）
//! - **BWT**：直接构建或管道构建，附带哨兵行，可由 LF 映射还原原文
//! - **q-gram 索引**：连续或带间隔的形状，滚动哈希，直接寻址桶
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use seqindex::index::{Index, IndexOptions};
//! use seqindex::shape::Shape;
//! use seqindex::symbol::Sequence;
//! use seqindex::util::dna;
//!
//! let codes = dna::encode(b"CTGAACCCTAAACCCT").unwrap();
//! let seq = Sequence::new(&codes, dna::SIGMA).unwrap();
//! let opts = IndexOptions::default().with_shape(Shape::ungapped(2, dna::SIGMA).unwrap());
//! let idx = Index::build(&seq, &opts).unwrap();
//!
//! let hits = idx.find(&dna::encode(b"ACCC").unwrap()).unwrap();
//! println!("Found {} occurrences", hits.len());
//! ```
//!
//! ## 模块说明
//!
//! - [`alloc`] — 块复用的池分配器
//! - [`storage`] — 分页外存、条带化后台 I/O、`Storage` 能力
//! - [`pipe`] — 惰性流水线与各类组合子
//! - [`radix`] — 稳定的计数排序一趟与多位 LSD 排序
//! - [`sa`] — 后缀数组构建
//! - [`lcp`] — Kasai LCP 与稀疏 RMQ 树
//! - [`bwt`] — Burrows–Wheeler 变换
//! - [`shape`] / [`qgram`] — 形状、滚动哈希与 q-gram 索引
//! - [`index`] / [`persist`] — 完整索引及其落盘格式
//! - [`util`] — DNA 编码 / 解码

pub mod alloc;
pub mod bwt;
pub mod config;
pub mod error;
pub mod index;
pub mod lcp;
pub mod persist;
pub mod pipe;
pub mod qgram;
pub mod radix;
pub mod sa;
pub mod shape;
pub mod storage;
pub mod symbol;
pub mod util;

pub use config::BuildConfig;
pub use error::{ErrorKind, IndexError, Result};
