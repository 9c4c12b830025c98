//! Compile-time capabilities of elements and callables
//!
//! - [`element`]: which element types relocate with a byte copy
//! - [`ops`]: callable traits and the copy/obliviousness flags
//! - [`builtin`]: operation objects with registry-derived obliviousness

pub mod builtin;
pub mod element;
pub mod ops;

pub use builtin::BuiltinOp;
pub use element::{is_trivially_relocatable, Element};
pub use ops::{
    allow_copied_arguments, can_copy_arguments, is_input_address_oblivious, not_fn, requires_stable_address,
    AlwaysTrue, BinaryOp, Callable, CopiedArguments, NotFn, OpCapabilities, UnaryOp,
};
