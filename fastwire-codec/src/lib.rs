/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fastwire Codec
//!
//! FAST (FIX Adapted for STreaming) wire codec for the fastwire crates.
//!
//! FAST is a binary encoding protocol used for high-performance market data
//! feeds. It uses stop-bit encoding, presence maps, and field operators to
//! achieve high compression ratios.
//!
//! ## Features
//!
//! - **Stop-bit encoding**: Efficient integer, string, and vector forms
//! - **Presence maps**: One bit stream per scope, emitted before its fields
//! - **Field operators**: Constant, Default, Copy, Increment, Delta, Tail
//! - **Message adapter**: Structural aggregates or a visitor interface
//! - **Drivers**: Template-directed [`Encoder`] and [`Decoder`]

pub mod decoder;
pub mod dictionary;
pub mod encoder;
pub mod message;
pub mod operators;
pub mod pmap;
pub mod reader;
pub mod trace;
pub mod writer;

pub use decoder::Decoder;
pub use dictionary::{Dictionary, DictionaryState};
pub use encoder::Encoder;
pub use message::{Aggregate, Attribute, DynamicMessage, FastMessage, FieldDescriptor};
pub use pmap::PresenceMap;
pub use reader::Reader;
pub use writer::Writer;
