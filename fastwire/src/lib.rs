/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fastwire
//!
//! A FAST (FIX Adapted for STreaming) protocol codec for Rust.
//!
//! FAST is a bandwidth-efficient binary encoding used in financial market
//! data distribution. Messages are encoded and decoded under the direction
//! of *templates* describing the fields, their types, and their per-field
//! operators (constant, default, copy, increment, delta, tail).
//!
//! ## Quick Start
//!
//! ```rust
//! use fastwire::prelude::*;
//!
//! let template = Template::new(1, "Quote")
//!     .push(Instruction::new(1, "Symbol", FieldType::AsciiString).with_operator(Operator::Copy))
//!     .push(Instruction::new(2, "Price", FieldType::Decimal).with_operator(Operator::Delta));
//! let registry = TemplateRegistry::new([template]).unwrap();
//!
//! let encoder = Encoder::new(Vec::new(), registry.clone());
//! let mut msg = DynamicMessage::from_aggregate(
//!     1,
//!     Aggregate::new()
//!         .with_value("Symbol", Value::Ascii("EURUSD".into()))
//!         .with_value("Price", Decimal::new(-4, 10435)),
//! );
//! encoder.encode(&mut msg).unwrap();
//!
//! let wire = encoder.into_sink();
//! let decoder = Decoder::new(wire.as_slice(), registry);
//! let mut decoded = DynamicMessage::new(0);
//! decoder.decode(&mut decoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Values, decimals, and error definitions
//! - [`template`]: Template model, instructions, and the linked registry
//! - [`codec`]: Wire primitives, presence maps, operators, and the drivers

pub mod core {
    //! Values, decimals, and error definitions.
    pub use fastwire_core::*;
}

pub mod template {
    //! Template model, instructions, and the linked registry.
    pub use fastwire_template::*;
}

pub mod codec {
    //! Wire primitives, presence maps, operators, and the drivers.
    pub use fastwire_codec::*;
}

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use fastwire_codec::{
        Aggregate, Attribute, Decoder, DynamicMessage, Encoder, FastMessage, FieldDescriptor,
        PresenceMap,
    };
    pub use fastwire_core::{
        BindError, DecodeError, Decimal, EncodeError, FastError, Result, TemplateError, Value,
    };
    pub use fastwire_template::{
        FieldType, Instruction, Operator, Presence, Template, TemplateRegistry,
    };
}

pub use prelude::*;
