//! Callable traits and address obliviousness
//!
//! A transform callable receives references to its inputs. The batched kernel
//! hands it references into per-tile copies instead of the original storage,
//! which is only correct when the callable ignores where its arguments live.
//! That property cannot be inferred for arbitrary code, so it is carried as
//! associated constants that default to `false`.
//!
//! ```text
//! Callable<Args>                 CAN_COPY_ARGUMENTS   INPUT_ADDRESS_OBLIVIOUS
//! ├── closure Fn(&T) -> R        false                false
//! ├── allow_copied_arguments(f)  true                 true
//! ├── builtin::Plus over i32     false                true  (registry)
//! └── not_fn(g)                  = g                  = g
//! ```

/// Metadata shared by unary and binary callables; `Args` is `(T,)` or `(A, B)`.
pub trait Callable<Args>: Send + Sync {
    /// Result of one invocation
    type Output;

    /// Explicit opt-in: the callable may run on copies of its arguments.
    const CAN_COPY_ARGUMENTS: bool = false;

    /// The callable's result does not depend on the input addresses.
    const INPUT_ADDRESS_OBLIVIOUS: bool = Self::CAN_COPY_ARGUMENTS;
}

/// A callable over one input element
pub trait UnaryOp<T>: Callable<(T,)> {
    fn apply(&self, x: &T) -> Self::Output;
}

/// A callable over two input elements
pub trait BinaryOp<A, B>: Callable<(A, B)> {
    fn combine(&self, a: &A, b: &B) -> Self::Output;
}

impl<T, R, F> Callable<(T,)> for F
where
    F: Fn(&T) -> R + Send + Sync,
{
    type Output = R;
}

impl<T, R, F> UnaryOp<T> for F
where
    F: Fn(&T) -> R + Send + Sync,
{
    #[inline]
    fn apply(&self, x: &T) -> R {
        self(x)
    }
}

impl<A, B, R, F> Callable<(A, B)> for F
where
    F: Fn(&A, &B) -> R + Send + Sync,
{
    type Output = R;
}

impl<A, B, R, F> BinaryOp<A, B> for F
where
    F: Fn(&A, &B) -> R + Send + Sync,
{
    #[inline]
    fn combine(&self, a: &A, b: &B) -> R {
        self(a, b)
    }
}

/// `can_copy_arguments(F, Args...)`: true only for an explicit opt-in.
pub const fn can_copy_arguments<F: Callable<Args>, Args>() -> bool {
    F::CAN_COPY_ARGUMENTS
}

/// `is_input_address_oblivious(F, Args...)`: opt-in, allowlisted built-in, or forwarded by an adapter.
pub const fn is_input_address_oblivious<F: Callable<Args>, Args>() -> bool {
    F::INPUT_ADDRESS_OBLIVIOUS
}

/// Whether a launch must hand the callable the original element addresses.
pub const fn requires_stable_address<F: Callable<Args>, Args>() -> bool {
    !can_copy_arguments::<F, Args>()
}

/// Both flags of a callable, captured for logging and inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCapabilities {
    pub can_copy_arguments: bool,
    pub input_address_oblivious: bool,
}

impl OpCapabilities {
    pub const fn of<F: Callable<Args>, Args>() -> Self {
        Self {
            can_copy_arguments: F::CAN_COPY_ARGUMENTS,
            input_address_oblivious: F::INPUT_ADDRESS_OBLIVIOUS,
        }
    }
}

/// Wrapper proclaiming that `F` does not depend on argument addresses.
#[derive(Debug, Clone, Copy)]
pub struct CopiedArguments<F>(F);

impl<F> CopiedArguments<F> {
    pub fn into_inner(self) -> F {
        self.0
    }
}

/// Allow `f` to be called on arbitrary copies of its arguments.
///
/// ```rust
/// use strata_dispatch::capability::{allow_copied_arguments, can_copy_arguments};
///
/// let double = allow_copied_arguments(|x: &i32| x * 2);
/// fn check<F: strata_dispatch::capability::Callable<(i32,)>>(_: &F) -> bool {
///     can_copy_arguments::<F, (i32,)>()
/// }
/// assert!(check(&double));
/// ```
pub fn allow_copied_arguments<F>(f: F) -> CopiedArguments<F> {
    CopiedArguments(f)
}

impl<Args, F: Callable<Args>> Callable<Args> for CopiedArguments<F> {
    type Output = F::Output;
    const CAN_COPY_ARGUMENTS: bool = true;
    const INPUT_ADDRESS_OBLIVIOUS: bool = true;
}

impl<T, F: UnaryOp<T>> UnaryOp<T> for CopiedArguments<F> {
    #[inline]
    fn apply(&self, x: &T) -> Self::Output {
        self.0.apply(x)
    }
}

impl<A, B, F: BinaryOp<A, B>> BinaryOp<A, B> for CopiedArguments<F> {
    #[inline]
    fn combine(&self, a: &A, b: &B) -> Self::Output {
        self.0.combine(a, b)
    }
}

/// Logical negation of a predicate; forwards the wrapped predicate's flags.
#[derive(Debug, Clone, Copy)]
pub struct NotFn<G>(G);

/// Negate a predicate.
pub fn not_fn<G>(g: G) -> NotFn<G> {
    NotFn(g)
}

impl<Args, G: Callable<Args, Output = bool>> Callable<Args> for NotFn<G> {
    type Output = bool;
    const CAN_COPY_ARGUMENTS: bool = G::CAN_COPY_ARGUMENTS;
    const INPUT_ADDRESS_OBLIVIOUS: bool = G::INPUT_ADDRESS_OBLIVIOUS;
}

impl<T, G: UnaryOp<T, Output = bool>> UnaryOp<T> for NotFn<G> {
    #[inline]
    fn apply(&self, x: &T) -> bool {
        !self.0.apply(x)
    }
}

impl<A, B, G: BinaryOp<A, B, Output = bool>> BinaryOp<A, B> for NotFn<G> {
    #[inline]
    fn combine(&self, a: &A, b: &B) -> bool {
        !self.0.combine(a, b)
    }
}

/// Predicate accepting every element; the unconditional transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrue;

impl<T> Callable<(T,)> for AlwaysTrue {
    type Output = bool;
    const CAN_COPY_ARGUMENTS: bool = true;
}

impl<T> UnaryOp<T> for AlwaysTrue {
    #[inline]
    fn apply(&self, _: &T) -> bool {
        true
    }
}
