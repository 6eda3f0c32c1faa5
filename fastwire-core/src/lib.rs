/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fastwire Core
//!
//! Core types, values, and error definitions for the fastwire FAST
//! (FIX Adapted for STreaming) codec.
//!
//! This crate provides the fundamental building blocks used across all
//! fastwire crates:
//! - **Error types**: Unified error handling with `thiserror`, including the
//!   dynamic error codes (D5, D7, D9, ...) defined by the FAST specification
//! - **Value types**: [`Value`], the tagged variant over every
//!   wire-representable scalar, and the FAST [`Decimal`] pair

pub mod error;
pub mod value;

pub use error::{BindError, DecodeError, EncodeError, FastError, Result, TemplateError};
pub use value::{Decimal, Value};
