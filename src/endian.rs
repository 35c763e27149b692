use core::fmt::Debug;

/// Little endian integer as stored on disk, usable inside `#[repr(C, packed)]` layouts
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Little<T: Copy + Default + PartialEq>(T);

macro_rules! define {
    ($type:ty) => {
        impl Little<$type> {
            #[inline]
            pub fn to_ne(self) -> $type {
                <$type>::from_le(self.0)
            }
        }

        impl From<$type> for Little<$type> {
            #[inline]
            fn from(t: $type) -> Self {
                Self(<$type>::to_le(t))
            }
        }

        impl From<Little<$type>> for $type {
            #[inline]
            fn from(le: Little<$type>) -> $type {
                le.to_ne()
            }
        }

        impl Debug for Little<$type> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{:#x}", self.to_ne())
            }
        }
    };
}

macro_rules! define_read {
    ($type:ty) => {
        impl Little<$type> {
            /// Decodes the leading bytes of a raw buffer
            pub(crate) fn read(bytes: &[u8]) -> $type {
                let mut array = [0u8; core::mem::size_of::<$type>()];
                array.copy_from_slice(&bytes[..core::mem::size_of::<$type>()]);
                <$type>::from_le_bytes(array)
            }
        }
    };
}

define!(u16);
define!(u32);
define!(u64);
define_read!(u16);
define_read!(u32);
