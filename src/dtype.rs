//! Canonical element-type modeling for chunk payloads.
//!
//! `Dtype` enumerates the numeric kinds this crate knows how to interpret
//! chunk bytes as; `Endianness` tracks byte order independently, since HDF5
//! stores it per-attribute rather than baked into the type name the way e.g.
//! Rust's `i32`/`u32` are.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A numeric element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Dtype {
    /// Width of a single element, in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Dtype::I8 | Dtype::U8 => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
        }
    }

    /// The canonical (numpy-style) name used on the wire and in diagnostics.
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Dtype::I8 => "int8",
            Dtype::U8 => "uint8",
            Dtype::I16 => "int16",
            Dtype::U16 => "uint16",
            Dtype::I32 => "int32",
            Dtype::U32 => "uint32",
            Dtype::I64 => "int64",
            Dtype::U64 => "uint64",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
        }
    }

    /// Parse a canonical dtype name, as found in HDF5 metadata or config.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "int8" => Dtype::I8,
            "uint8" => Dtype::U8,
            "int16" => Dtype::I16,
            "uint16" => Dtype::U16,
            "int32" => Dtype::I32,
            "uint32" => Dtype::U32,
            "int64" => Dtype::I64,
            "uint64" => Dtype::U64,
            "float32" => Dtype::F32,
            "float64" => Dtype::F64,
            other => {
                return Err(Error::InvalidInput(format!("unrecognized dtype: {other}")));
            }
        })
    }

    /// Whether this dtype is a floating-point kind (relevant for NaN policy).
    pub const fn is_float(self) -> bool {
        matches!(self, Dtype::F32 | Dtype::F64)
    }
}

/// Byte order of a stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
    /// Whatever the host's native order is; resolved to `Little`/`Big` when
    /// serialized onto the wire (§4.4).
    Native,
}

impl Endianness {
    /// Resolve to `Little` or `Big`, mapping `Native` to the host's order.
    pub const fn resolved(self) -> ResolvedEndianness {
        match self {
            Endianness::Little => ResolvedEndianness::Little,
            Endianness::Big => ResolvedEndianness::Big,
            Endianness::Native => {
                if cfg!(target_endian = "little") {
                    ResolvedEndianness::Little
                } else {
                    ResolvedEndianness::Big
                }
            }
        }
    }
}

/// A byte order with no `Native` case, as required by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedEndianness {
    Little,
    Big,
}

impl ResolvedEndianness {
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            ResolvedEndianness::Little => "little",
            ResolvedEndianness::Big => "big",
        }
    }
}
