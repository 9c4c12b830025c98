//! Built-in operation objects and the address-obliviousness registry
//!
//! The operation objects below are address oblivious exactly when their
//! operands use the language's own operators, which is what
//! [`Element::BUILTIN_OPERATORS`] records. A user type with an overloaded
//! `Add` may inspect where its operands live, so `Plus` over that type stays
//! address dependent.
//!
//! None of these types set `CAN_COPY_ARGUMENTS`: obliviousness is reported,
//! the explicit opt-in is still required for copying.

use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Rem, Sub};

use super::element::Element;
use super::ops::{BinaryOp, Callable, UnaryOp};

/// Operation kinds known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    Plus,
    Minus,
    Multiplies,
    Divides,
    Modulus,
    Negate,
    Identity,
    EqualTo,
    NotEqualTo,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    BitAnd,
    BitOr,
    BitXor,
    Maximum,
    Minimum,
}

/// Operations whose result depends only on operand values.
pub const ADDRESS_OBLIVIOUS_OPS: &[BuiltinOp] = &[
    BuiltinOp::Plus,
    BuiltinOp::Minus,
    BuiltinOp::Multiplies,
    BuiltinOp::Divides,
    BuiltinOp::Modulus,
    BuiltinOp::Negate,
    BuiltinOp::Identity,
    BuiltinOp::EqualTo,
    BuiltinOp::NotEqualTo,
    BuiltinOp::Less,
    BuiltinOp::LessEqual,
    BuiltinOp::Greater,
    BuiltinOp::GreaterEqual,
    BuiltinOp::LogicalAnd,
    BuiltinOp::LogicalOr,
    BuiltinOp::LogicalNot,
    BuiltinOp::BitAnd,
    BuiltinOp::BitOr,
    BuiltinOp::BitXor,
    BuiltinOp::Maximum,
    BuiltinOp::Minimum,
];

/// Registry lookup: `op` applied to operands with built-in operators.
pub const fn is_oblivious(op: BuiltinOp, operands_builtin: bool) -> bool {
    if !operands_builtin {
        return false;
    }
    let mut i = 0;
    while i < ADDRESS_OBLIVIOUS_OPS.len() {
        if ADDRESS_OBLIVIOUS_OPS[i] as u8 == op as u8 {
            return true;
        }
        i += 1;
    }
    false
}

macro_rules! binary_builtin {
    ($(#[$doc:meta])* $name:ident, $op:ident, $bound:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element + $bound<Output = T>> Callable<(T, T)> for $name {
            type Output = T;
            const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::$op, T::BUILTIN_OPERATORS);
        }

        impl<T: Element + $bound<Output = T>> BinaryOp<T, T> for $name {
            #[inline]
            fn combine(&self, $a: &T, $b: &T) -> T {
                $body
            }
        }
    };
}

macro_rules! comparison_builtin {
    ($(#[$doc:meta])* $name:ident, $op:ident, $bound:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element + $bound> Callable<(T, T)> for $name {
            type Output = bool;
            const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::$op, T::BUILTIN_OPERATORS);
        }

        impl<T: Element + $bound> BinaryOp<T, T> for $name {
            #[inline]
            fn combine(&self, $a: &T, $b: &T) -> bool {
                $body
            }
        }
    };
}

binary_builtin!(
    /// `a + b`
    Plus, Plus, Add, |a, b| a.clone() + b.clone()
);
binary_builtin!(
    /// `a - b`
    Minus, Minus, Sub, |a, b| a.clone() - b.clone()
);
binary_builtin!(
    /// `a * b`
    Multiplies, Multiplies, Mul, |a, b| a.clone() * b.clone()
);
binary_builtin!(
    /// `a / b`
    Divides, Divides, Div, |a, b| a.clone() / b.clone()
);
binary_builtin!(
    /// `a % b`
    Modulus, Modulus, Rem, |a, b| a.clone() % b.clone()
);
binary_builtin!(BitAndOp, BitAnd, BitAnd, |a, b| a.clone() & b.clone());
binary_builtin!(BitOrOp, BitOr, BitOr, |a, b| a.clone() | b.clone());
binary_builtin!(BitXorOp, BitXor, BitXor, |a, b| a.clone() ^ b.clone());

comparison_builtin!(EqualTo, EqualTo, PartialEq, |a, b| a == b);
comparison_builtin!(NotEqualTo, NotEqualTo, PartialEq, |a, b| a != b);
comparison_builtin!(Less, Less, PartialOrd, |a, b| a < b);
comparison_builtin!(LessEqual, LessEqual, PartialOrd, |a, b| a <= b);
comparison_builtin!(Greater, Greater, PartialOrd, |a, b| a > b);
comparison_builtin!(GreaterEqual, GreaterEqual, PartialOrd, |a, b| a >= b);

/// The larger operand; `a` on ties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maximum;

impl<T: Element + PartialOrd> Callable<(T, T)> for Maximum {
    type Output = T;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::Maximum, T::BUILTIN_OPERATORS);
}

impl<T: Element + PartialOrd> BinaryOp<T, T> for Maximum {
    #[inline]
    fn combine(&self, a: &T, b: &T) -> T {
        if a < b {
            b.clone()
        } else {
            a.clone()
        }
    }
}

/// The smaller operand; `a` on ties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Minimum;

impl<T: Element + PartialOrd> Callable<(T, T)> for Minimum {
    type Output = T;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::Minimum, T::BUILTIN_OPERATORS);
}

impl<T: Element + PartialOrd> BinaryOp<T, T> for Minimum {
    #[inline]
    fn combine(&self, a: &T, b: &T) -> T {
        if b < a {
            b.clone()
        } else {
            a.clone()
        }
    }
}

/// `-x`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Negate;

impl<T: Element + Neg<Output = T>> Callable<(T,)> for Negate {
    type Output = T;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::Negate, T::BUILTIN_OPERATORS);
}

impl<T: Element + Neg<Output = T>> UnaryOp<T> for Negate {
    #[inline]
    fn apply(&self, x: &T) -> T {
        -x.clone()
    }
}

/// Returns its argument unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl<T: Element> Callable<(T,)> for Identity {
    type Output = T;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::Identity, T::BUILTIN_OPERATORS);
}

impl<T: Element> UnaryOp<T> for Identity {
    #[inline]
    fn apply(&self, x: &T) -> T {
        x.clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalAnd;

impl Callable<(bool, bool)> for LogicalAnd {
    type Output = bool;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::LogicalAnd, true);
}

impl BinaryOp<bool, bool> for LogicalAnd {
    #[inline]
    fn combine(&self, a: &bool, b: &bool) -> bool {
        *a && *b
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalOr;

impl Callable<(bool, bool)> for LogicalOr {
    type Output = bool;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::LogicalOr, true);
}

impl BinaryOp<bool, bool> for LogicalOr {
    #[inline]
    fn combine(&self, a: &bool, b: &bool) -> bool {
        *a || *b
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalNot;

impl Callable<(bool,)> for LogicalNot {
    type Output = bool;
    const INPUT_ADDRESS_OBLIVIOUS: bool = is_oblivious(BuiltinOp::LogicalNot, true);
}

impl UnaryOp<bool> for LogicalNot {
    #[inline]
    fn apply(&self, x: &bool) -> bool {
        !*x
    }
}
