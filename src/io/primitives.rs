//! Little-endian wire primitives shared by all codecs.

use crate::error::{Result, StreamError};
use crate::types::{Complex32, Complex64, ImageElement, MetaContainer};
use std::io::{Read, Write};

pub fn write_u16(stream: &mut dyn Write, value: u16) -> Result<()> {
    stream.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_u64(stream: &mut dyn Write, value: u64) -> Result<()> {
    stream.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_u16(stream: &mut dyn Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u64(stream: &mut dyn Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read exactly `len` bytes without trusting `len` for preallocation.
pub fn read_bytes(stream: &mut dyn Read, len: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(StreamError::Serialization(format!(
            "truncated payload: expected {} bytes, got {}",
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

/// Length-prefixed UTF-8 string
pub fn write_string(stream: &mut dyn Write, value: &str) -> Result<()> {
    write_u64(stream, value.len() as u64)?;
    stream.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_string(stream: &mut dyn Read) -> Result<String> {
    let len = read_u64(stream)?;
    let bytes = read_bytes(stream, len)?;
    String::from_utf8(bytes).map_err(|e| StreamError::Serialization(e.to_string()))
}

/// Optional metadata as length-prefixed JSON; a zero length means none.
pub fn write_meta(stream: &mut dyn Write, meta: Option<&MetaContainer>) -> Result<()> {
    let serialized = match meta {
        Some(meta) => serde_json::to_string(meta)?,
        None => String::new(),
    };
    write_string(stream, &serialized)
}

pub fn read_meta(stream: &mut dyn Read) -> Result<Option<MetaContainer>> {
    let serialized = read_string(stream)?;
    if serialized.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&serialized)?))
}

/// Element types with a fixed little-endian encoding.
pub trait WireElement: ImageElement {
    const SIZE: usize;

    fn put(self, buf: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! wire_scalar {
    ($($ty:ty),*) => {
        $(impl WireElement for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn put(self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn take(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        })*
    };
}

wire_scalar!(u16, i16, u32, i32, f32, f64);

macro_rules! wire_complex {
    ($($ty:ty => $part:ty),*) => {
        $(impl WireElement for $ty {
            const SIZE: usize = 2 * std::mem::size_of::<$part>();

            fn put(self, buf: &mut Vec<u8>) {
                self.re.put(buf);
                self.im.put(buf);
            }

            fn take(bytes: &[u8]) -> Self {
                let half = std::mem::size_of::<$part>();
                <$ty>::new(<$part>::take(&bytes[..half]), <$part>::take(&bytes[half..]))
            }
        })*
    };
}

wire_complex!(Complex32 => f32, Complex64 => f64);

pub fn write_elements<T: WireElement>(stream: &mut dyn Write, data: &[T]) -> Result<()> {
    let mut buf = Vec::with_capacity(data.len() * T::SIZE);
    for &value in data {
        value.put(&mut buf);
    }
    stream.write_all(&buf)?;
    Ok(())
}

pub fn read_elements<T: WireElement>(stream: &mut dyn Read, count: usize) -> Result<Vec<T>> {
    let bytes = read_bytes(stream, (count * T::SIZE) as u64)?;
    Ok(bytes.chunks_exact(T::SIZE).map(T::take).collect())
}
