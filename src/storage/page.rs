/// 页帧在 I/O 生命周期中所处的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// 新分配，内容并非来自磁盘
    Clean,
    PendingRead,
    PendingWrite,
    /// 上一次传输已完成
    Ready,
}

/// 绑定到页号的页大小缓冲。
///
/// 传输进行期间页帧本身随请求移交，等待票据之前无法观察其内容。
#[derive(Debug)]
pub struct PageFrame {
    page: u64,
    data: Vec<u8>,
    status: PageStatus,
    dirty: bool,
}

impl PageFrame {
    pub(crate) fn new(page: u64, mut data: Vec<u8>, len: usize) -> Self {
        data.clear();
        data.resize(len, 0);
        Self { page, data, status: PageStatus::Clean, dirty: false }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    /// 截短页帧，用于最后一个不满的页。
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub(crate) fn set_status(&mut self, status: PageStatus) {
        self.status = status;
        if status == PageStatus::Ready {
            self.dirty = false;
        }
    }

    pub(crate) fn into_buffer(self) -> Vec<u8> {
        self.data
    }
}
