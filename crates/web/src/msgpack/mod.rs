//! A MessagePack codec over [`Value`](crate::Value).
//!
//! Integers are written in the smallest representation that holds them,
//! strings and binary payloads use the narrowest length prefix, and maps are
//! written in key order. Extension types are not supported.
//!
//! ```
//! use quill_web::Value;
//! use quill_web::msgpack;
//!
//! let value: Value = [("foo", "bar")].into_iter().collect();
//! let packed = msgpack::pack(&value).unwrap();
//! assert_eq!(&packed[..], b"\x81\xa3foo\xa3bar");
//! assert_eq!(msgpack::unpack(&packed).unwrap(), value);
//! ```

mod decoder;
mod encoder;

pub use decoder::{DecodeError, decode_one, unpack};
pub use encoder::{EncodeError, pack};

pub(crate) mod marker {
    pub const NIL: u8 = 0xC0;
    pub const NEVER_USED: u8 = 0xC1;
    pub const FALSE: u8 = 0xC2;
    pub const TRUE: u8 = 0xC3;

    pub const BIN8: u8 = 0xC4;
    pub const BIN16: u8 = 0xC5;
    pub const BIN32: u8 = 0xC6;

    pub const EXT8: u8 = 0xC7;
    pub const EXT16: u8 = 0xC8;
    pub const EXT32: u8 = 0xC9;

    pub const FLOAT32: u8 = 0xCA;
    pub const FLOAT64: u8 = 0xCB;

    pub const UINT8: u8 = 0xCC;
    pub const UINT16: u8 = 0xCD;
    pub const UINT32: u8 = 0xCE;
    pub const UINT64: u8 = 0xCF;

    pub const INT8: u8 = 0xD0;
    pub const INT16: u8 = 0xD1;
    pub const INT32: u8 = 0xD2;
    pub const INT64: u8 = 0xD3;

    pub const FIXEXT1: u8 = 0xD4;
    pub const FIXEXT16: u8 = 0xD8;

    pub const STR8: u8 = 0xD9;
    pub const STR16: u8 = 0xDA;
    pub const STR32: u8 = 0xDB;

    pub const ARRAY16: u8 = 0xDC;
    pub const ARRAY32: u8 = 0xDD;

    pub const MAP16: u8 = 0xDE;
    pub const MAP32: u8 = 0xDF;

    pub const FIXMAP: u8 = 0x80;
    pub const FIXARRAY: u8 = 0x90;
    pub const FIXSTR: u8 = 0xA0;
    pub const NEGATIVE_FIXINT: u8 = 0xE0;
}
