//! Binary layouts of the primitive types that can be read from foreign memory.
//!
//! Every type has a fixed width and a little-endian encoding. The name table
//! (`int8` .. `rect`) is the wire format shared by every view and test fixture.
//!
//! Two interfaces are offered over the same encodings:
//! - the dynamic one ([`encode`], [`decode`], [`Value`]), selected by
//!   [`PrimitiveType`] or its name;
//! - the static one, the [`Primitive`] trait, used by typed view accessors.
//!
//! Buffer lengths that do not match the type width are programmer errors and panic.

use std::{fmt, str::FromStr};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use xmem_common::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Bool,
    Char,
    Pointer,
    Xyz,
    Orient,
    Rect,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 16] = [
        PrimitiveType::Int8,
        PrimitiveType::Uint8,
        PrimitiveType::Int16,
        PrimitiveType::Uint16,
        PrimitiveType::Int32,
        PrimitiveType::Uint32,
        PrimitiveType::Int64,
        PrimitiveType::Uint64,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
        PrimitiveType::Bool,
        PrimitiveType::Char,
        PrimitiveType::Pointer,
        PrimitiveType::Xyz,
        PrimitiveType::Orient,
        PrimitiveType::Rect,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Uint8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Uint16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Uint32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Uint64 => "uint64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Char => "char",
            PrimitiveType::Pointer => "pointer",
            PrimitiveType::Xyz => "xyz",
            PrimitiveType::Orient => "orient",
            PrimitiveType::Rect => "rect",
        }
    }

    /// Encoded size in bytes.
    pub const fn width(self) -> usize {
        match self {
            PrimitiveType::Int8
            | PrimitiveType::Uint8
            | PrimitiveType::Bool
            | PrimitiveType::Char => 1,
            PrimitiveType::Int16 | PrimitiveType::Uint16 => 2,
            PrimitiveType::Int32 | PrimitiveType::Uint32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64
            | PrimitiveType::Uint64
            | PrimitiveType::Float64
            | PrimitiveType::Pointer => 8,
            PrimitiveType::Xyz | PrimitiveType::Orient => 12,
            PrimitiveType::Rect => 16,
        }
    }

    pub fn from_name(name: &str) -> Option<PrimitiveType> {
        PrimitiveType::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PrimitiveType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrimitiveType::from_name(s)
            .ok_or_else(|| Error::invalid_arg("primitive type", format!("unknown name '{s}'")))
    }
}

/// Three `float32` coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Three `float32` angles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orient {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Four `int32` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A single byte character, kept as the raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Char(pub u8);

/// A pointer-sized value in the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pointer(pub u64);

/// A decoded primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Char(u8),
    Pointer(u64),
    Xyz(Xyz),
    Orient(Orient),
    Rect(Rect),
}

impl Value {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Int8(_) => PrimitiveType::Int8,
            Value::Uint8(_) => PrimitiveType::Uint8,
            Value::Int16(_) => PrimitiveType::Int16,
            Value::Uint16(_) => PrimitiveType::Uint16,
            Value::Int32(_) => PrimitiveType::Int32,
            Value::Uint32(_) => PrimitiveType::Uint32,
            Value::Int64(_) => PrimitiveType::Int64,
            Value::Uint64(_) => PrimitiveType::Uint64,
            Value::Float32(_) => PrimitiveType::Float32,
            Value::Float64(_) => PrimitiveType::Float64,
            Value::Bool(_) => PrimitiveType::Bool,
            Value::Char(_) => PrimitiveType::Char,
            Value::Pointer(_) => PrimitiveType::Pointer,
            Value::Xyz(_) => PrimitiveType::Xyz,
            Value::Orient(_) => PrimitiveType::Orient,
            Value::Rect(_) => PrimitiveType::Rect,
        }
    }
}

/// Encodes `value` as `ty`.
///
/// # Panics
///
/// If the variant of `value` does not belong to `ty`.
pub fn encode(ty: PrimitiveType, value: &Value) -> Vec<u8> {
    let mut out = vec![0u8; ty.width()];
    encode_into(ty, value, &mut out);
    out
}

/// Decodes one `ty` from `bytes`.
///
/// # Panics
///
/// If `bytes.len()` is not the width of `ty`.
pub fn decode(ty: PrimitiveType, bytes: &[u8]) -> Value {
    assert_eq!(
        bytes.len(),
        ty.width(),
        "{ty} needs {} bytes, got {}",
        ty.width(),
        bytes.len()
    );
    match ty {
        PrimitiveType::Int8 => Value::Int8(i8::decode_le(bytes)),
        PrimitiveType::Uint8 => Value::Uint8(u8::decode_le(bytes)),
        PrimitiveType::Int16 => Value::Int16(i16::decode_le(bytes)),
        PrimitiveType::Uint16 => Value::Uint16(u16::decode_le(bytes)),
        PrimitiveType::Int32 => Value::Int32(i32::decode_le(bytes)),
        PrimitiveType::Uint32 => Value::Uint32(u32::decode_le(bytes)),
        PrimitiveType::Int64 => Value::Int64(i64::decode_le(bytes)),
        PrimitiveType::Uint64 => Value::Uint64(u64::decode_le(bytes)),
        PrimitiveType::Float32 => Value::Float32(f32::decode_le(bytes)),
        PrimitiveType::Float64 => Value::Float64(f64::decode_le(bytes)),
        PrimitiveType::Bool => Value::Bool(bool::decode_le(bytes)),
        PrimitiveType::Char => Value::Char(Char::decode_le(bytes).0),
        PrimitiveType::Pointer => Value::Pointer(Pointer::decode_le(bytes).0),
        PrimitiveType::Xyz => Value::Xyz(Xyz::decode_le(bytes)),
        PrimitiveType::Orient => Value::Orient(Orient::decode_le(bytes)),
        PrimitiveType::Rect => Value::Rect(Rect::decode_le(bytes)),
    }
}

/// Encodes `values` back to back; every value must be a `ty`.
pub fn encode_array(ty: PrimitiveType, values: &[Value]) -> Vec<u8> {
    let mut out = vec![0u8; ty.width() * values.len()];
    for (value, chunk) in values.iter().zip(out.chunks_exact_mut(ty.width())) {
        encode_into(ty, value, chunk);
    }
    out
}

/// Decodes `count` consecutive values of `ty`.
///
/// # Panics
///
/// If `bytes.len()` is not `ty.width() * count`.
pub fn decode_array(ty: PrimitiveType, bytes: &[u8], count: usize) -> Vec<Value> {
    assert_eq!(
        bytes.len(),
        ty.width() * count,
        "{count} x {ty} needs {} bytes, got {}",
        ty.width() * count,
        bytes.len()
    );
    bytes
        .chunks_exact(ty.width())
        .map(|chunk| decode(ty, chunk))
        .collect()
}

/// [`decode`] by type name.
///
/// # Panics
///
/// If `name` is not in the type table.
pub fn decode_named(name: &str, bytes: &[u8]) -> Value {
    decode(lookup(name), bytes)
}

/// [`encode`] by type name.
///
/// # Panics
///
/// If `name` is not in the type table.
pub fn encode_named(name: &str, value: &Value) -> Vec<u8> {
    encode(lookup(name), value)
}

fn lookup(name: &str) -> PrimitiveType {
    PrimitiveType::from_name(name).unwrap_or_else(|| panic!("unknown primitive type '{name}'"))
}

fn encode_into(ty: PrimitiveType, value: &Value, out: &mut [u8]) {
    assert_eq!(
        value.primitive_type(),
        ty,
        "cannot encode {value:?} as {ty}"
    );
    match *value {
        Value::Int8(v) => v.encode_le(out),
        Value::Uint8(v) => v.encode_le(out),
        Value::Int16(v) => v.encode_le(out),
        Value::Uint16(v) => v.encode_le(out),
        Value::Int32(v) => v.encode_le(out),
        Value::Uint32(v) => v.encode_le(out),
        Value::Int64(v) => v.encode_le(out),
        Value::Uint64(v) => v.encode_le(out),
        Value::Float32(v) => v.encode_le(out),
        Value::Float64(v) => v.encode_le(out),
        Value::Bool(v) => v.encode_le(out),
        Value::Char(v) => Char(v).encode_le(out),
        Value::Pointer(v) => Pointer(v).encode_le(out),
        Value::Xyz(v) => v.encode_le(out),
        Value::Orient(v) => v.encode_le(out),
        Value::Rect(v) => v.encode_le(out),
    }
}

/// A Rust type with a fixed-width little-endian layout from the type table.
///
/// `encode_le` and `decode_le` receive a slice of exactly `TYPE.width()` bytes.
pub trait Primitive: Copy + Sized {
    const TYPE: PrimitiveType;

    fn encode_le(&self, out: &mut [u8]);

    fn decode_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive_le {
    ($t:ty, $kind:ident, $read:ident, $write:ident) => {
        impl Primitive for $t {
            const TYPE: PrimitiveType = PrimitiveType::$kind;

            #[inline]
            fn encode_le(&self, out: &mut [u8]) {
                LittleEndian::$write(out, *self);
            }

            #[inline]
            fn decode_le(bytes: &[u8]) -> Self {
                LittleEndian::$read(bytes)
            }
        }
    };
}

impl_primitive_le!(i16, Int16, read_i16, write_i16);
impl_primitive_le!(u16, Uint16, read_u16, write_u16);
impl_primitive_le!(i32, Int32, read_i32, write_i32);
impl_primitive_le!(u32, Uint32, read_u32, write_u32);
impl_primitive_le!(i64, Int64, read_i64, write_i64);
impl_primitive_le!(u64, Uint64, read_u64, write_u64);
impl_primitive_le!(f32, Float32, read_f32, write_f32);
impl_primitive_le!(f64, Float64, read_f64, write_f64);

impl Primitive for i8 {
    const TYPE: PrimitiveType = PrimitiveType::Int8;

    fn encode_le(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }

    fn decode_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}

impl Primitive for u8 {
    const TYPE: PrimitiveType = PrimitiveType::Uint8;

    fn encode_le(&self, out: &mut [u8]) {
        out[0] = *self;
    }

    fn decode_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Primitive for bool {
    const TYPE: PrimitiveType = PrimitiveType::Bool;

    fn encode_le(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }

    fn decode_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Primitive for Char {
    const TYPE: PrimitiveType = PrimitiveType::Char;

    fn encode_le(&self, out: &mut [u8]) {
        out[0] = self.0;
    }

    fn decode_le(bytes: &[u8]) -> Self {
        Char(bytes[0])
    }
}

impl Primitive for Pointer {
    const TYPE: PrimitiveType = PrimitiveType::Pointer;

    fn encode_le(&self, out: &mut [u8]) {
        LittleEndian::write_u64(out, self.0);
    }

    fn decode_le(bytes: &[u8]) -> Self {
        Pointer(LittleEndian::read_u64(bytes))
    }
}

impl Primitive for Xyz {
    const TYPE: PrimitiveType = PrimitiveType::Xyz;

    fn encode_le(&self, out: &mut [u8]) {
        LittleEndian::write_f32_into(&[self.x, self.y, self.z], out);
    }

    fn decode_le(bytes: &[u8]) -> Self {
        let mut v = [0f32; 3];
        LittleEndian::read_f32_into(bytes, &mut v);
        Xyz {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

impl Primitive for Orient {
    const TYPE: PrimitiveType = PrimitiveType::Orient;

    fn encode_le(&self, out: &mut [u8]) {
        LittleEndian::write_f32_into(&[self.pitch, self.roll, self.yaw], out);
    }

    fn decode_le(bytes: &[u8]) -> Self {
        let mut v = [0f32; 3];
        LittleEndian::read_f32_into(bytes, &mut v);
        Orient {
            pitch: v[0],
            roll: v[1],
            yaw: v[2],
        }
    }
}

impl Primitive for Rect {
    const TYPE: PrimitiveType = PrimitiveType::Rect;

    fn encode_le(&self, out: &mut [u8]) {
        LittleEndian::write_i32_into(&[self.left, self.top, self.right, self.bottom], out);
    }

    fn decode_le(bytes: &[u8]) -> Self {
        let mut v = [0i32; 4];
        LittleEndian::read_i32_into(bytes, &mut v);
        Rect {
            left: v[0],
            top: v[1],
            right: v[2],
            bottom: v[3],
        }
    }
}

/// Encodes a statically typed value.
pub fn encode_typed<T: Primitive>(value: T) -> Vec<u8> {
    let mut out = vec![0u8; T::TYPE.width()];
    value.encode_le(&mut out);
    out
}

/// Decodes a statically typed value; `bytes` must be exactly one width long.
pub fn decode_typed<T: Primitive>(bytes: &[u8]) -> T {
    assert_eq!(bytes.len(), T::TYPE.width());
    T::decode_le(bytes)
}
