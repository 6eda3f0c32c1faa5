/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field value types for FAST messages.
//!
//! This module provides:
//! - [`Value`]: the tagged variant over every wire-representable scalar type
//! - [`Decimal`]: the FAST exponent/mantissa pair
//!
//! A field value travels between the message adapter and the wire codec as a
//! [`Value`]; type checking happens once, at the adapter boundary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// FAST decimal value.
///
/// A decimal is transferred as two independent integers: a base-10 exponent
/// and a mantissa. The logical value is `mantissa * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Decimal {
    /// Base-10 exponent.
    pub exponent: i32,
    /// Mantissa.
    pub mantissa: i64,
}

impl Decimal {
    /// Decimal zero (`0 * 10^0`).
    pub const ZERO: Self = Self {
        exponent: 0,
        mantissa: 0,
    };

    /// Creates a new decimal from exponent and mantissa.
    #[inline]
    #[must_use]
    pub const fn new(exponent: i32, mantissa: i64) -> Self {
        Self { exponent, mantissa }
    }

    /// Converts to a [`rust_decimal::Decimal`].
    ///
    /// # Returns
    /// `None` if the value does not fit the 96-bit decimal representation.
    #[must_use]
    pub fn to_decimal(&self) -> Option<rust_decimal::Decimal> {
        if self.exponent <= 0 {
            let scale = u32::try_from(-i64::from(self.exponent)).ok()?;
            rust_decimal::Decimal::try_from_i128_with_scale(i128::from(self.mantissa), scale).ok()
        } else {
            let factor = 10i128.checked_pow(u32::try_from(self.exponent).ok()?)?;
            let scaled = i128::from(self.mantissa).checked_mul(factor)?;
            rust_decimal::Decimal::try_from_i128_with_scale(scaled, 0).ok()
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}e{}", self.mantissa, self.exponent)
    }
}

/// Enumeration of wire-representable FAST field values.
///
/// This is the exhaustive set of scalar types a FAST field can carry.
/// Aggregate structures (groups, sequences) are not values; they are
/// navigated through the message adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// Signed 64-bit integer.
    Int64(i64),
    /// ASCII string (7-bit characters on the wire).
    Ascii(String),
    /// Unicode string (length-prefixed UTF-8 on the wire).
    Unicode(String),
    /// Raw byte vector (length-prefixed on the wire).
    Bytes(Bytes),
    /// Decimal exponent/mantissa pair.
    Decimal(Decimal),
}

impl Value {
    /// Returns a short name for the value's type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::UInt32(_) => "uInt32",
            Self::Int32(_) => "int32",
            Self::UInt64(_) => "uInt64",
            Self::Int64(_) => "int64",
            Self::Ascii(_) => "ascii",
            Self::Unicode(_) => "unicode",
            Self::Bytes(_) => "byteVector",
            Self::Decimal(_) => "decimal",
        }
    }

    /// Returns true if the value is one of the four integer variants.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::UInt32(_) | Self::Int32(_) | Self::UInt64(_) | Self::Int64(_)
        )
    }

    /// Returns the value as a u32, if it is a UInt32 variant.
    #[must_use]
    pub const fn as_u32(&self) -> Option<u32> {
        match self {
            Self::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an i32, if it is an Int32 variant.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a u64, if it is a UInt64 variant.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an i64, if it is an Int64 variant.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is a string variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ascii(s) | Self::Unicode(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a byte slice, if it is a Bytes variant.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a decimal, if it is a Decimal variant.
    #[must_use]
    pub const fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Widens any integer variant to i128 for overflow-free arithmetic.
    #[must_use]
    pub fn to_i128(&self) -> Option<i128> {
        match self {
            Self::UInt32(v) => Some(i128::from(*v)),
            Self::Int32(v) => Some(i128::from(*v)),
            Self::UInt64(v) => Some(i128::from(*v)),
            Self::Int64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Ascii(s) | Self::Unicode(s) => write!(f, "{}", s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Decimal(d) => write!(f, "{}", d),
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Ascii(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}
