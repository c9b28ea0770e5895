use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// 外存（分页）构建的调优参数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// 页大小（字节），一页总是容纳整数条记录
    pub page_size: usize,
    /// 页条带化分布的后备文件数，同时是预取深度
    pub stripes: usize,
    /// 排序阶段写出有序段之前可占用的内存字节数
    pub memory_budget: usize,
    /// 后备文件目录，`None` 时用系统临时目录
    pub temp_dir: Option<PathBuf>,
    /// 页帧池尺寸等级宽度的 log2
    pub pool_granularity: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            page_size: 1 << 20,
            stripes: 2,
            memory_budget: 256 << 20,
            temp_dir: None,
            pool_granularity: 12,
        }
    }
}

impl BuildConfig {
    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    pub fn with_stripes(mut self, stripes: usize) -> Self {
        self.stripes = stripes;
        self
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(IndexError::invalid("page size must be positive"));
        }
        if self.stripes == 0 {
            return Err(IndexError::invalid("at least one stripe is required"));
        }
        if self.memory_budget == 0 {
            return Err(IndexError::invalid("memory budget must be positive"));
        }
        if self.pool_granularity >= usize::BITS {
            return Err(IndexError::invalid(format!(
                "pool granularity 2^{} does not fit in usize",
                self.pool_granularity
            )));
        }
        Ok(())
    }
}
