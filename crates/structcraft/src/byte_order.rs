//! Byte order modes and the width/alignment rules they imply.

/// Encoding mode of a record. Maps every [crate::scalar::ScalarKind] to a width and alignment.
///
/// The standard modes use fixed widths and never pad between members. [ByteOrder::Native] uses
/// the platform's endianness, its C `long` width and natural alignment, like a C compiler laying
/// out a struct (alignment is relative to the start of each segment, no trailing padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
    /// Network order: big-endian with standard sizes.
    Network,
}

#[cfg(feature = "serde")]
impl From<crate::serde::ByteOrderDef> for ByteOrder {
    fn from(value: crate::serde::ByteOrderDef) -> Self {
        match value {
            crate::serde::ByteOrderDef::Native => ByteOrder::Native,
            crate::serde::ByteOrderDef::Little => ByteOrder::Little,
            crate::serde::ByteOrderDef::Big => ByteOrder::Big,
            crate::serde::ByteOrderDef::Network => ByteOrder::Network,
        }
    }
}

impl ByteOrder {
    /// Format prefix in the `struct` module convention.
    pub fn code(self) -> char {
        match self {
            ByteOrder::Native => '@',
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::Network => '!',
        }
    }

    pub fn is_little_endian(self) -> bool {
        match self {
            ByteOrder::Native => cfg!(target_endian = "little"),
            ByteOrder::Little => true,
            ByteOrder::Big | ByteOrder::Network => false,
        }
    }

    /// True for the modes with fixed widths and no alignment padding.
    pub fn is_standard(self) -> bool {
        self != ByteOrder::Native
    }

    /// Width of a C `long` in this mode.
    pub fn long_width(self) -> usize {
        match self {
            ByteOrder::Native => std::mem::size_of::<std::os::raw::c_long>(),
            _ => 4,
        }
    }
}

/// Rounds `offset` up to the next multiple of `align`.
pub fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        return offset;
    }

    offset.div_ceil(align) * align
}
