//! Element types and trivial relocatability

use crate::space::Space;

/// A value type that can live in any space and be moved between spaces.
///
/// `TRIVIALLY_RELOCATABLE` says that a bitwise copy of a value, leaving the
/// source untouched, produces a valid independent value. The relocation
/// engine then moves ranges with a single byte copy and never runs `Clone`
/// or `Drop`. Everything else goes through staging buffers with element-wise
/// construction.
///
/// `BUILTIN_OPERATORS` marks primitive operands whose arithmetic, comparison
/// and logical operators cannot be user-defined. Only these make the built-in
/// operation objects address oblivious (see [`super::builtin`]).
///
/// # Safety
///
/// `TRIVIALLY_RELOCATABLE = true` is only sound for types that are `Copy` in
/// spirit: no owned resources, no interior pointers into themselves. Prefer
/// the [`trivially_relocatable!`](crate::trivially_relocatable) macro, which
/// checks `Copy` at compile time, and
/// [`staged_element!`](crate::staged_element) for everything else.
pub unsafe trait Element: Clone + Send + Sync + 'static {
    /// Byte copies are equivalent to construct + copy + destroy.
    const TRIVIALLY_RELOCATABLE: bool = false;

    /// Operators on this type are the language built-ins.
    const BUILTIN_OPERATORS: bool = false;
}

/// Whether `T` can be moved from `src` to `dst` with one bulk byte copy.
pub const fn is_trivially_relocatable<T: Element>(src: Space, dst: Space) -> bool {
    T::TRIVIALLY_RELOCATABLE && src.shares_byte_layout_with(dst)
}

macro_rules! builtin_elements {
    ($($ty:ty),+ $(,)?) => {
        $(
            unsafe impl Element for $ty {
                const TRIVIALLY_RELOCATABLE: bool = true;
                const BUILTIN_OPERATORS: bool = true;
            }
        )+
    };
}

builtin_elements!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char);

unsafe impl Element for () {
    const TRIVIALLY_RELOCATABLE: bool = true;
}

unsafe impl<T: Element, const N: usize> Element for [T; N] {
    const TRIVIALLY_RELOCATABLE: bool = T::TRIVIALLY_RELOCATABLE;
}

unsafe impl<A: Element, B: Element> Element for (A, B) {
    const TRIVIALLY_RELOCATABLE: bool = A::TRIVIALLY_RELOCATABLE && B::TRIVIALLY_RELOCATABLE;
}

unsafe impl<A: Element, B: Element, C: Element> Element for (A, B, C) {
    const TRIVIALLY_RELOCATABLE: bool =
        A::TRIVIALLY_RELOCATABLE && B::TRIVIALLY_RELOCATABLE && C::TRIVIALLY_RELOCATABLE;
}

unsafe impl<T: Element> Element for Option<T> {
    const TRIVIALLY_RELOCATABLE: bool = T::TRIVIALLY_RELOCATABLE;
}

unsafe impl Element for String {}

unsafe impl<T: Element> Element for Vec<T> {}

unsafe impl<T: Element> Element for Box<T> {}

/// Declare `Copy` types as trivially relocatable elements.
///
/// ```rust
/// use strata_dispatch::trivially_relocatable;
///
/// #[derive(Clone, Copy)]
/// struct Particle {
///     position: [f32; 3],
///     mass: f32,
/// }
///
/// trivially_relocatable!(Particle);
/// ```
#[macro_export]
macro_rules! trivially_relocatable {
    ($($ty:ty),+ $(,)?) => {
        $(
            const _: fn() = || {
                fn assert_copy<T: ::core::marker::Copy>() {}
                assert_copy::<$ty>();
            };
            unsafe impl $crate::Element for $ty {
                const TRIVIALLY_RELOCATABLE: bool = true;
            }
        )+
    };
}

/// Declare types that must be relocated element by element through staging.
///
/// ```rust
/// use strata_dispatch::staged_element;
///
/// #[derive(Clone)]
/// struct Label {
///     text: String,
/// }
///
/// staged_element!(Label);
/// ```
#[macro_export]
macro_rules! staged_element {
    ($($ty:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::Element for $ty {}
        )+
    };
}
