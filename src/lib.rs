#![doc = include_str!("../README.md")]

mod decoder;

pub mod alphabet;
pub mod data;
pub mod error;
pub mod format;
pub mod varint;

pub use self::decoder::Decoder;
pub use self::decoder::DecoderBuilder;
pub use self::data::Flag;
pub use self::data::Flags;
pub use self::data::Header;
pub use self::data::Record;
pub use self::data::SequenceType;
pub use self::data::Size;
pub use self::error::Error;
pub use self::format::Projection;

cfg_if::cfg_if! {
    if #[cfg(feature = "arc")] {
        pub(crate) use std::sync::Arc as Rc;
    } else {
        pub(crate) use std::rc::Rc;
    }
}
