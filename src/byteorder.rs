pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
    )+ }
}

impl_num_le!(u8, i8, u16, i16, u32, i32);

impl<T: WriteBytesLe, const N: usize> WriteBytesLe for [T; N] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

/// Implements [`WriteBytesLe`] for a fieldless `#[repr(u16)]` enum.
#[macro_export]
macro_rules! impl_u16_enum {
    ($t:ty) => {
        impl $crate::byteorder::WriteBytesLe for $t {
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as u16).to_le_bytes())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::byteorder::WriteBytesLe;
    use hlacd_macros::ToBytes;

    #[derive(Clone, Copy)]
    #[repr(u16)]
    enum Tag {
        Pcm = 1,
    }

    impl_u16_enum!(Tag);

    #[derive(ToBytes)]
    struct Mini {
        tag: Tag,
        a: u16,
        b: u32,
        id: [u8; 4],
    }

    #[test]
    fn to_bytes_little_endian() {
        let s = Mini {
            tag: Tag::Pcm,
            a: 0x1234,
            b: 0xABCDEF01,
            id: *b"TEST",
        };

        let mut out = Vec::new();
        s.write_le(&mut out);

        let expected = [
            0x01, 0x00, 0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, b'T', b'E', b'S', b'T',
        ];
        assert_eq!(&out[..], &expected);
    }
}
