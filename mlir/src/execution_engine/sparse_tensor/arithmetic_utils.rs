/*!
This header is not part of the public API. It is placed in the includes directory only because that's required by the implementations of template-classes.

This file is part of the lightweight runtime support library for sparse tensor manipulations.  The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/ArithmeticUtils.h>
*/

/*
Overflow checking functions.

These functions use assertions to ensure correctness with respect to overflow/underflow.  They only guarantee that *if* they return an answer then that answer is correct.  When debug assertions are disabled, they use the standard unchecked implementations.
*/

use std::fmt::Debug;

/**
A version of `as` which checks for overflow/underflow.  The check is skipped in release builds, where the conversion truncates like `as` would.
*/
#[must_use]
#[inline]
pub fn check_overflow_cast<To, From>(x: From) -> To
where
    From: Copy + Debug,
    To: TryFrom<From> + TruncatingFrom<From>
{
    if cfg!(debug_assertions) {
        match To::try_from(x) {
            Ok(y) => y,
            Err(_) => panic!("Cast would overflow: {:?}", x)
        }
    } else {
        To::truncating_from(x)
    }
}

/// The unchecked conversion used by `check_overflow_cast` in release builds.
pub trait TruncatingFrom<T> {
    fn truncating_from(x: T) -> Self;
}

macro_rules! impl_truncating_from {
    ($($from:ty => [$($to:ty),*]);* $(;)?) => {
        $($(
            impl TruncatingFrom<$from> for $to {
                #[inline]
                fn truncating_from(x: $from) -> Self {
                    x as $to
                }
            }
        )*)*
    };
}

impl_truncating_from! {
    u64 => [u8, u16, u32, u64, usize, i64];
    usize => [u8, u16, u32, u64, usize, i64];
    u8 => [u64, usize];
    u16 => [u64, usize];
    u32 => [u64, usize];
    i64 => [u64, usize]
}

/**
A version of `usize::try_from(x)` for the runtime's `u64` sizes.  The engine assumes a 64-bit host, so this never fails there.
*/
#[must_use]
#[inline]
pub fn to_usize(x: u64) -> usize {
    check_overflow_cast::<usize, u64>(x)
}

/// A version of `lhs * rhs` which checks for overflow in debug builds.
#[must_use]
#[inline]
pub fn checked_mul(lhs: u64, rhs: u64) -> u64 {
    debug_assert!(
        lhs == 0 || rhs <= u64::MAX / lhs,
        "Integer overflow: {} * {}", lhs, rhs
    );
    lhs.wrapping_mul(rhs)
}
