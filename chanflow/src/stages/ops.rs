//! Ready-made arithmetic stages.

use super::MapStage;
use std::fmt::Display;

/// Numbers the arithmetic stages accept.
///
/// Both operations are total: integers wrap on overflow regardless of the
/// build profile, floats follow IEEE 754.
pub trait Arithmetic: Copy + Display + Send + Sync + 'static {
    /// `self * rhs`, wrapping for integers.
    #[must_use]
    fn total_mul(self, rhs: Self) -> Self;

    /// `self + rhs`, wrapping for integers.
    #[must_use]
    fn total_add(self, rhs: Self) -> Self;
}

macro_rules! wrapping_arithmetic {
    ($($ty:ty),*) => {$(
        impl Arithmetic for $ty {
            fn total_mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            fn total_add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
        }
    )*};
}

macro_rules! float_arithmetic {
    ($($ty:ty),*) => {$(
        impl Arithmetic for $ty {
            fn total_mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn total_add(self, rhs: Self) -> Self {
                self + rhs
            }
        }
    )*};
}

wrapping_arithmetic!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
float_arithmetic!(f32, f64);

/// Multiplies every element by `factor`. Named `multiply_by_{factor}`.
pub fn multiply_by<T>(factor: T) -> MapStage<T, T, impl Fn(T) -> T + Send + Sync + 'static>
where
    T: Arithmetic,
{
    MapStage::new(format!("multiply_by_{factor}"), move |value: T| value.total_mul(factor))
}

/// Adds `amount` to every element. Named `add_{amount}`.
pub fn add<T>(amount: T) -> MapStage<T, T, impl Fn(T) -> T + Send + Sync + 'static>
where
    T: Arithmetic,
{
    MapStage::new(format!("add_{amount}"), move |value: T| value.total_add(amount))
}

/// Forwards every element unchanged.
#[must_use]
pub fn identity<T>() -> MapStage<T, T, fn(T) -> T>
where
    T: Send + 'static,
{
    MapStage::new("identity", std::convert::identity::<T> as fn(T) -> T)
}
