//! The XDR (External Data Representation) module defines data structures and methods
//! for serializing/deserializing data according to RFC 1832 standard.
//!
//! XDR provides machine-independent data representation format,
//! which is critical for network protocols like NFS.
//!
//! All data structures that require serialization/deserialization
//! for network transmission must implement the `Serialize`/`Deserialize`
//! traits below, typically via the `*Struct!`/`*Enum!`/`*BoolUnion!` macros.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};

pub mod mount;
pub mod nfs3;
pub mod portmap;
pub mod rpc;

/// Type alias for the standard endianness used in XDR serialization (Big Endian).
pub type XDREndian = BigEndian;

/// Encodes a value to its XDR wire representation.
pub trait Serialize {
    /// Serializes the implementing type to the provided writer.
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Decodes a value from its XDR wire representation, in place.
pub trait Deserialize {
    /// Deserializes data from the provided reader into the implementing type.
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads one `T` from `src` by deserializing into its `Default` value.
///
/// Convenient at call sites that need an owned value rather than an
/// in-place update, e.g. `let prog: u32 = deserialize(&mut input)?;`.
pub fn deserialize<T: Default + Deserialize, R: Read>(src: &mut R) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

/// Macro for implementing XDR enum serialization/deserialization as a plain
/// 32-bit integer, keyed off the enum's `FromPrimitive`/`ToPrimitive` derive.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                use byteorder::WriteBytesExt;
                let v = num_traits::ToPrimitive::to_u32(self).expect("enum fits in u32");
                dest.write_u32::<$crate::xdr::XDREndian>(v)
            }
        }
    };
}

#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                use byteorder::ReadBytesExt;
                let r: u32 = src.read_u32::<$crate::xdr::XDREndian>()?;
                match num_traits::FromPrimitive::from_u32(r) {
                    Some(p) => {
                        *self = p;
                        Ok(())
                    }
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid value for {}: {}", stringify!($t), r),
                    )),
                }
            }
        }
    };
}

/// Serializes each named field of a struct in declaration order.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($element:ident),*) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $($crate::xdr::Serialize::serialize(&self.$element, dest)?;)*
                Ok(())
            }
        }
    };
}

/// Deserializes each named field of a struct in declaration order.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($element:ident),*) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $($crate::xdr::Deserialize::deserialize(&mut self.$element, src)?;)*
                Ok(())
            }
        }
    };
}

/// Serializes an XDR "optional" union: a `bool` discriminant followed by the
/// payload only when the variant carries one.
///
/// # Example
/// ```ignore
/// enum pre_op_attr {
///     Void,
///     attributes(wcc_attr),
/// }
/// SerializeBoolUnion!(pre_op_attr, attributes, wcc_attr);
/// DeserializeBoolUnion!(pre_op_attr, attributes, wcc_attr);
/// ```
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeBoolUnion {
    ($t:ident, $enumcase:ident, $enumtype:ty) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                match self {
                    $t::Void => $crate::xdr::Serialize::serialize(&false, dest),
                    $t::$enumcase(v) => {
                        $crate::xdr::Serialize::serialize(&true, dest)?;
                        $crate::xdr::Serialize::serialize(v, dest)
                    }
                }
            }
        }
    };
}

#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeBoolUnion {
    ($t:ident, $enumcase:ident, $enumtype:ty) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let present: bool = $crate::xdr::deserialize(src)?;
                if present {
                    let value: $enumtype = $crate::xdr::deserialize(src)?;
                    *self = $t::$enumcase(value);
                } else {
                    *self = $t::Void;
                }
                Ok(())
            }
        }
    };
}

/// Booleans are serialized as 4-byte big endian integers where 0 is false
/// and any non-zero value is true.
impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self as u32)
    }
}
impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()? > 0;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(*self)
    }
}
impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for i64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i64::<XDREndian>(*self)
    }
}
impl Deserialize for i64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i64::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self)
    }
}
impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XDREndian>(*self)
    }
}
impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XDREndian>()?;
        Ok(())
    }
}

/// Fixed-size arrays are serialized as their raw bytes without a length
/// prefix: their length is already known to both ends from the type.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_all(self)
    }
}
impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)
    }
}

/// Variable-length opaque data: a 4-byte length prefix, the bytes
/// themselves, then zero-padding out to a multiple of 4 bytes.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        let length = self.len() as u32;
        length.serialize(dest)?;
        dest.write_all(self)?;
        let pad = ((4 - length % 4) % 4) as usize;
        let zeros: [u8; 4] = [0, 0, 0, 0];
        if pad > 0 {
            dest.write_all(&zeros[..pad])?;
        }
        Ok(())
    }
}
impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length: u32 = deserialize(src)?;
        self.resize(length as usize, 0);
        src.read_exact(self)?;
        let pad = ((4 - length % 4) % 4) as usize;
        let mut zeros: [u8; 4] = [0, 0, 0, 0];
        src.read_exact(&mut zeros[..pad])?;
        Ok(())
    }
}

/// Variable-length vectors of 32-bit integers: a 4-byte length prefix
/// followed by that many 4-byte elements.
impl Serialize for Vec<u32> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        let length = self.len() as u32;
        length.serialize(dest)?;
        for i in self {
            i.serialize(dest)?;
        }
        Ok(())
    }
}
impl Deserialize for Vec<u32> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length: u32 = deserialize(src)?;
        self.resize(length as usize, 0);
        for i in self {
            i.deserialize(src)?;
        }
        Ok(())
    }
}

// Re-export the macros for `use crate::xdr::{SerializeStruct, ...}` callers.
pub use crate::DeserializeBoolUnion;
pub use crate::DeserializeEnum;
pub use crate::DeserializeStruct;
pub use crate::SerializeBoolUnion;
pub use crate::SerializeEnum;
pub use crate::SerializeStruct;
