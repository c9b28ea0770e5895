use std::fmt::Debug;

/// 可存放在页上的定长值。
///
/// 编码为小端、`WIDTH` 字节。`blank()` 是填充用的值，
/// 用于平移出界的位置和越过末尾的窗口槽位。
pub trait Record: Copy + Debug + Send + 'static {
    const WIDTH: usize;

    fn blank() -> Self;
    fn encode(&self, out: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! int_record {
    ($($t:ty),*) => {$(
        impl Record for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            #[inline]
            fn blank() -> Self {
                0
            }

            #[inline]
            fn encode(&self, out: &mut [u8]) {
                out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn decode(buf: &[u8]) -> Self {
                let mut b = [0u8; std::mem::size_of::<$t>()];
                b.copy_from_slice(&buf[..Self::WIDTH]);
                <$t>::from_le_bytes(b)
            }
        }
    )*};
}

int_record!(u8, u16, u32, u64);

// usize 按 u64 存储，文件可在不同平台间通用
impl Record for usize {
    const WIDTH: usize = 8;

    #[inline]
    fn blank() -> Self {
        0
    }

    #[inline]
    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&(*self as u64).to_le_bytes());
    }

    #[inline]
    fn decode(buf: &[u8]) -> Self {
        u64::decode(buf) as usize
    }
}

impl<A: Record, B: Record> Record for (A, B) {
    const WIDTH: usize = A::WIDTH + B::WIDTH;

    fn blank() -> Self {
        (A::blank(), B::blank())
    }

    fn encode(&self, out: &mut [u8]) {
        self.0.encode(&mut out[..A::WIDTH]);
        self.1.encode(&mut out[A::WIDTH..]);
    }

    fn decode(buf: &[u8]) -> Self {
        (A::decode(&buf[..A::WIDTH]), B::decode(&buf[A::WIDTH..]))
    }
}

impl<A: Record, B: Record, C: Record> Record for (A, B, C) {
    const WIDTH: usize = A::WIDTH + B::WIDTH + C::WIDTH;

    fn blank() -> Self {
        (A::blank(), B::blank(), C::blank())
    }

    fn encode(&self, out: &mut [u8]) {
        self.0.encode(&mut out[..A::WIDTH]);
        self.1.encode(&mut out[A::WIDTH..A::WIDTH + B::WIDTH]);
        self.2.encode(&mut out[A::WIDTH + B::WIDTH..]);
    }

    fn decode(buf: &[u8]) -> Self {
        (
            A::decode(&buf[..A::WIDTH]),
            B::decode(&buf[A::WIDTH..A::WIDTH + B::WIDTH]),
            C::decode(&buf[A::WIDTH + B::WIDTH..]),
        )
    }
}

impl<T: Record, const N: usize> Record for [T; N] {
    const WIDTH: usize = T::WIDTH * N;

    fn blank() -> Self {
        [T::blank(); N]
    }

    fn encode(&self, out: &mut [u8]) {
        for (v, chunk) in self.iter().zip(out.chunks_exact_mut(T::WIDTH)) {
            v.encode(chunk);
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut out = [T::blank(); N];
        for (v, chunk) in out.iter_mut().zip(buf.chunks_exact(T::WIDTH)) {
            *v = T::decode(chunk);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_add_up() {
        assert_eq!(<(u64, [u32; 3])>::WIDTH, 20);
        assert_eq!(<(u8, u16, usize)>::WIDTH, 11);
    }

    #[test]
    fn nested_record_layout_is_little_endian() {
        let v: (u16, [u8; 2]) = (0x0102, [7, 9]);
        let mut buf = [0u8; 4];
        v.encode(&mut buf);
        assert_eq!(buf, [0x02, 0x01, 7, 9]);
        assert_eq!(<(u16, [u8; 2])>::decode(&buf), v);
    }

    #[test]
    fn usize_is_stored_as_eight_bytes() {
        let mut buf = [0xffu8; 8];
        123usize.encode(&mut buf);
        assert_eq!(buf, 123u64.to_le_bytes());
    }
}
