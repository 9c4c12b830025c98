//! Kernel index width
//!
//! Launches whose element count fits the narrow limit index with `u32`,
//! everything else with `u64`. The choice changes nothing observable except
//! the launch counters.

use std::fmt;

use crate::device::DeviceQueue;
use crate::error::Result;

/// Integer width of a launch's element indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    /// 32-bit indices
    Narrow,
    /// 64-bit indices
    Wide,
}

impl IndexWidth {
    pub const fn bits(self) -> u32 {
        match self {
            Self::Narrow => 32,
            Self::Wide => 64,
        }
    }
}

impl fmt::Display for IndexWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// Index types a kernel can be instantiated with
pub trait IndexType: sealed::Sealed + Copy + Ord + Send + Sync + fmt::Debug + fmt::Display + 'static {
    const WIDTH: IndexWidth;

    /// Conversion from a host index known to be in range
    fn from_usize(i: usize) -> Self;

    fn as_usize(self) -> usize;
}

impl IndexType for u32 {
    const WIDTH: IndexWidth = IndexWidth::Narrow;

    #[inline]
    fn from_usize(i: usize) -> Self {
        debug_assert!(i <= u32::MAX as usize);
        i as u32
    }

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }
}

impl IndexType for u64 {
    const WIDTH: IndexWidth = IndexWidth::Wide;

    #[inline]
    fn from_usize(i: usize) -> Self {
        i as u64
    }

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }
}

/// Narrow indices when `count` fits both `narrow_limit` and `u32`.
pub const fn select_index_width(count: u64, narrow_limit: u64) -> IndexWidth {
    let limit = if narrow_limit < u32::MAX as u64 {
        narrow_limit
    } else {
        u32::MAX as u64
    };
    if count <= limit {
        IndexWidth::Narrow
    } else {
        IndexWidth::Wide
    }
}

/// Launch `kernel(i)` for `i` in `[0, count)` with indices of `width`.
pub(crate) fn launch_indexed<K>(
    queue: &DeviceQueue,
    kernel_name: &'static str,
    width: IndexWidth,
    count: usize,
    kernel: K,
) -> Result<()>
where
    K: Fn(usize) + Sync,
{
    match width {
        IndexWidth::Narrow => queue.launch_parallel_for(kernel_name, u32::from_usize(count), |i: u32| {
            kernel(i.as_usize())
        }),
        IndexWidth::Wide => queue.launch_parallel_for(kernel_name, u64::from_usize(count), |i: u64| {
            kernel(i.as_usize())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_of_the_narrow_range() {
        let limit = u32::MAX as u64;
        assert_eq!(select_index_width(0, limit), IndexWidth::Narrow);
        assert_eq!(select_index_width(limit, limit), IndexWidth::Narrow);
        assert_eq!(select_index_width(limit + 1, limit), IndexWidth::Wide);
    }

    #[test]
    fn lowered_limit_moves_the_boundary() {
        assert_eq!(select_index_width(16, 16), IndexWidth::Narrow);
        assert_eq!(select_index_width(17, 16), IndexWidth::Wide);
    }

    #[test]
    fn limit_above_u32_is_clamped() {
        assert_eq!(select_index_width(u32::MAX as u64 + 1, u64::MAX), IndexWidth::Wide);
    }

    #[test]
    fn index_types_report_their_width() {
        assert_eq!(<u32 as IndexType>::WIDTH.bits(), 32);
        assert_eq!(<u64 as IndexType>::WIDTH.bits(), 64);
        assert_eq!(IndexWidth::Wide.to_string(), "u64");
        assert_eq!(u64::from_usize(7).as_usize(), 7);
    }
}
