//! 构建完成的索引在磁盘上的布局。
//!
//! 输出前缀为 `p` 时：
//!
//! * `p.sa`、`p.lcp`、`p.bwt`：一字节元素宽度（1、2、4 或 8，取能容纳最大值的
//!   最小宽度），随后是小端元素。
//! * `p.qgram`（仅在有形状时）：宽度字节、小端 `u64` 的桶偏移个数、
//!   各偏移，最后是位置。
//! * `p.manifest`：bincode 编码的 [`IndexManifest`]。
//!
//! 原文不单独存储，加载时由 BWT 还原。

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bwt::Bwt;
use crate::error::{IndexError, Result};
use crate::index::{Index, IndexOptions};
use crate::lcp::LcpArray;
use crate::qgram::QGramIndex;
use crate::sa::SuffixArray;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub len: usize,
    pub sigma: usize,
    /// 构建时符号类型的字节宽度
    pub symbol_width: usize,
    pub options: IndexOptions,
    pub sentinel: usize,
    /// RFC 3339 格式的构建时间
    pub created: String,
}

/// 在 `prefix` 后追加 `.ext`，保留名字中原有的点。
pub fn artifact_path(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn width_for(max: u64) -> usize {
    match max {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xffff_ffff => 4,
        _ => 8,
    }
}

fn write_elements<W: Write>(w: &mut W, width: usize, values: impl Iterator<Item = u64>) -> Result<()> {
    for v in values {
        w.write_all(&v.to_le_bytes()[..width])?;
    }
    Ok(())
}

/// 写出宽度标记和各元素。
pub fn write_array<W: Write>(w: &mut W, values: &[u64]) -> Result<()> {
    let width = width_for(values.iter().copied().max().unwrap_or(0));
    w.write_all(&[width as u8])?;
    write_elements(w, width, values.iter().copied())
}

fn read_width<R: Read>(r: &mut R) -> Result<usize> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    match tag[0] {
        1 | 2 | 4 | 8 => Ok(tag[0] as usize),
        other => Err(IndexError::invalid(format!("unknown element width tag {other}"))),
    }
}

fn decode_elements(bytes: &[u8], width: usize) -> Result<Vec<u64>> {
    if bytes.len() % width != 0 {
        return Err(IndexError::invalid(format!(
            "{} bytes of payload are not a whole number of {width}-byte elements",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(|chunk| {
            let mut le = [0u8; 8];
            le[..width].copy_from_slice(chunk);
            u64::from_le_bytes(le)
        })
        .collect())
}

/// 读取 [`write_array`] 写出的数组；元素个数由剩余长度推出。
pub fn read_array<R: Read>(r: &mut R) -> Result<Vec<u64>> {
    let width = read_width(r)?;
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    decode_elements(&bytes, width)
}

fn to_usize(values: Vec<u64>) -> Result<Vec<usize>> {
    values
        .into_iter()
        .map(|v| usize::try_from(v).map_err(|_| IndexError::invalid(format!("stored value {v} does not fit usize"))))
        .collect()
}

fn save_array(path: &Path, values: &[u64]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_array(&mut w, values)?;
    w.flush()?;
    Ok(())
}

fn load_array(path: &Path) -> Result<Vec<u64>> {
    read_array(&mut BufReader::new(File::open(path)?))
}

fn save_qgrams(path: &Path, idx: &QGramIndex) -> Result<()> {
    let offsets = idx.bucket_offsets();
    let positions = idx.positions();
    let max = offsets.iter().chain(positions).copied().max().unwrap_or(0);
    let width = width_for(max as u64);
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&[width as u8])?;
    w.write_all(&(offsets.len() as u64).to_le_bytes())?;
    write_elements(&mut w, width, offsets.iter().map(|&v| v as u64))?;
    write_elements(&mut w, width, positions.iter().map(|&v| v as u64))?;
    w.flush()?;
    Ok(())
}

fn load_qgrams(path: &Path, options: &IndexOptions) -> Result<Option<QGramIndex>> {
    let Some(shape) = options.shape.clone() else {
        return Ok(None);
    };
    let mut r = BufReader::new(File::open(path)?);
    let width = read_width(&mut r)?;
    let mut count = [0u8; 8];
    r.read_exact(&mut count)?;
    let count = usize::try_from(u64::from_le_bytes(count))
        .map_err(|_| IndexError::invalid("q-gram offset count does not fit usize"))?;
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    let split = count
        .checked_mul(width)
        .filter(|&b| b <= bytes.len())
        .ok_or_else(|| IndexError::invalid("q-gram file is shorter than its offset table"))?;
    let offsets = to_usize(decode_elements(&bytes[..split], width)?)?;
    let positions = to_usize(decode_elements(&bytes[split..], width)?)?;
    QGramIndex::from_parts(shape, offsets, positions).map(Some)
}

/// 把 `index` 的各部分写到 `prefix` 旁边。
pub fn save<T: Symbol>(index: &Index<T>, prefix: &Path) -> Result<IndexManifest> {
    let sa: Vec<u64> = index.suffix_array().iter().map(|&p| p as u64).collect();
    save_array(&artifact_path(prefix, "sa"), &sa)?;
    let lcp: Vec<u64> = index.lcp_array().iter().map(|&v| v as u64).collect();
    save_array(&artifact_path(prefix, "lcp"), &lcp)?;
    let bwt: Vec<u64> = index.bwt().symbols().iter().map(|c| c.ordinal() as u64).collect();
    save_array(&artifact_path(prefix, "bwt"), &bwt)?;
    if let Some(q) = index.qgrams() {
        save_qgrams(&artifact_path(prefix, "qgram"), q)?;
    }

    let manifest = IndexManifest {
        len: index.len(),
        sigma: index.sigma(),
        symbol_width: T::WIDTH,
        options: index.options().clone(),
        sentinel: index.bwt().sentinel(),
        created: chrono::Utc::now().to_rfc3339(),
    };
    let mut f = BufWriter::new(File::create(artifact_path(prefix, "manifest"))?);
    bincode::serialize_into(&mut f, &manifest)?;
    f.flush()?;
    log::info!("index of {} symbols saved under {}", manifest.len, prefix.display());
    Ok(manifest)
}

pub fn load_manifest(prefix: &Path) -> Result<IndexManifest> {
    let f = BufReader::new(File::open(artifact_path(prefix, "manifest"))?);
    Ok(bincode::deserialize_from(f)?)
}

/// 读取 [`save`] 保存的索引；符号类型必须与构建时一致。
pub fn load<T: Symbol>(prefix: &Path) -> Result<Index<T>> {
    let manifest = load_manifest(prefix)?;
    if manifest.symbol_width != T::WIDTH {
        return Err(IndexError::invalid(format!(
            "index was built over {}-byte symbols, not {}-byte",
            manifest.symbol_width,
            T::WIDTH
        )));
    }

    let sa = SuffixArray::from_vec(to_usize(load_array(&artifact_path(prefix, "sa"))?)?)?;
    let lcp = LcpArray::from_vec(to_usize(load_array(&artifact_path(prefix, "lcp"))?)?);
    let symbols = load_array(&artifact_path(prefix, "bwt"))?
        .into_iter()
        .map(|v| {
            if v < manifest.sigma as u64 {
                Ok(T::from_ordinal(v as usize))
            } else {
                Err(IndexError::invalid(format!("stored BWT symbol {v} outside alphabet")))
            }
        })
        .collect::<Result<Vec<T>>>()?;
    if symbols.len() != manifest.len {
        return Err(IndexError::invalid(format!(
            "manifest records {} symbols, BWT file holds {}",
            manifest.len,
            symbols.len()
        )));
    }
    let bwt = Bwt::from_parts(symbols, manifest.sentinel)?;
    let qgrams = load_qgrams(&artifact_path(prefix, "qgram"), &manifest.options)?;

    log::info!("loaded index of {} symbols built {}", manifest.len, manifest.created);
    Index::from_parts(manifest.sigma, manifest.options, sa, lcp, bwt, qgrams)
}
