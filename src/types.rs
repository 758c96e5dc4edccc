//! Core data types for reconstream
//!
//! This module contains the message envelope that flows through every channel
//! and the typed payloads the built-in codecs understand.
//!
//! # Main Types
//!
//! - [`Message`] - Move-only envelope around an opaque typed payload
//! - [`MetaContainer`] - Optional key/value metadata attached to a message
//! - [`Image`] - N-dimensional image payload with an [`ImageHeader`]
//! - [`ImageDataType`] - Element type tag stored in the image header

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;

/// Complex single precision sample
pub type Complex32 = Complex<f32>;

/// Complex double precision sample
pub type Complex64 = Complex<f64>;

/// Metadata attached to a message: each key maps to an ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaContainer(BTreeMap<String, Vec<String>>);

impl MetaContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `key`
    pub fn append(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.entry(key.into()).or_default().push(value.to_string());
    }

    /// Replace all values of `key` with a single value
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), vec![value.to_string()]);
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values stored under `key`
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The unit of data moving through a pipeline.
///
/// A message owns exactly one payload of any `Send` type. It cannot be cloned;
/// stages take it by value and either forward it or consume it.
pub struct Message {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
    meta: Option<MetaContainer>,
}

impl Message {
    /// Wrap a payload without metadata
    pub fn new<T: Any + Send>(payload: T) -> Self {
        Self {
            payload: Box::new(payload),
            type_name: type_name::<T>(),
            meta: None,
        }
    }

    /// Attach metadata
    pub fn with_meta(mut self, meta: MetaContainer) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Whether the payload is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrow the payload as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Take the payload as a `T`, handing the message back if the type differs.
    pub fn downcast<T: Any>(self) -> Result<(T, Option<MetaContainer>), Message> {
        let Message {
            payload,
            type_name,
            meta,
        } = self;
        match payload.downcast::<T>() {
            Ok(value) => Ok((*value, meta)),
            Err(payload) => Err(Message {
                payload,
                type_name,
                meta,
            }),
        }
    }

    /// Rust type name of the payload, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn meta(&self) -> Option<&MetaContainer> {
        self.meta.as_ref()
    }

    pub fn meta_mut(&mut self) -> &mut Option<MetaContainer> {
        &mut self.meta
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .field("meta", &self.meta)
            .finish()
    }
}

/// Element type tag stored in [`ImageHeader::data_type`].
///
/// The numeric values follow the ISMRMRD data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ImageDataType {
    U16 = 1,
    I16 = 2,
    U32 = 3,
    I32 = 4,
    F32 = 5,
    F64 = 6,
    Complex32 = 7,
    Complex64 = 8,
}

impl ImageDataType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::U16),
            2 => Some(Self::I16),
            3 => Some(Self::U32),
            4 => Some(Self::I32),
            5 => Some(Self::F32),
            6 => Some(Self::F64),
            7 => Some(Self::Complex32),
            8 => Some(Self::Complex64),
            _ => None,
        }
    }

    /// Size of one element in bytes
    pub fn element_size(self) -> usize {
        match self {
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 | Self::Complex32 => 8,
            Self::Complex64 => 16,
        }
    }
}

/// Fixed header describing an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub version: u16,
    pub data_type: u16,
    pub flags: u64,
    /// Samples along x, y, z
    pub matrix_size: [u16; 3],
    pub channels: u16,
    pub slice: u16,
    pub image_index: u16,
    pub image_series_index: u16,
}

impl ImageHeader {
    pub const VERSION: u16 = 1;

    /// Header for an image of `matrix_size` x `channels` elements of type `T`
    pub fn new<T: ImageElement>(matrix_size: [u16; 3], channels: u16) -> Self {
        Self {
            version: Self::VERSION,
            data_type: T::DATA_TYPE as u16,
            flags: 0,
            matrix_size,
            channels,
            slice: 0,
            image_index: 0,
            image_series_index: 0,
        }
    }

    /// Number of elements the data array must contain
    pub fn element_count(&self) -> usize {
        self.matrix_size.iter().map(|&d| d as usize).product::<usize>() * self.channels as usize
    }
}

/// Marker for the element types an [`Image`] can carry.
pub trait ImageElement: Copy + Send + PartialEq + fmt::Debug + 'static {
    const DATA_TYPE: ImageDataType;
}

macro_rules! image_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl ImageElement for $ty {
            const DATA_TYPE: ImageDataType = ImageDataType::$tag;
        })*
    };
}

image_element! {
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
    Complex32 => Complex32,
    Complex64 => Complex64,
}

/// Image payload: header plus `element_count()` samples, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T: ImageElement> {
    pub header: ImageHeader,
    pub data: Vec<T>,
}

impl<T: ImageElement> Image<T> {
    /// Build an image, checking that `data` matches the header dimensions.
    pub fn new(mut header: ImageHeader, data: Vec<T>) -> crate::Result<Self> {
        header.data_type = T::DATA_TYPE as u16;
        if header.element_count() != data.len() {
            return Err(crate::StreamError::failed(format!(
                "image of {:?} x {} channels needs {} elements, got {}",
                header.matrix_size,
                header.channels,
                header.element_count(),
                data.len()
            )));
        }
        Ok(Self { header, data })
    }

    /// Length of one readout line (first matrix dimension)
    pub fn line_length(&self) -> usize {
        self.header.matrix_size[0] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_downcast() {
        let msg = Message::new(42u32);
        assert!(msg.is::<u32>());
        assert_eq!(msg.downcast_ref::<u32>(), Some(&42));

        let msg = match msg.downcast::<String>() {
            Ok(_) => panic!("u32 payload must not downcast to String"),
            Err(msg) => msg,
        };
        let (value, meta) = msg.downcast::<u32>().unwrap();
        assert_eq!(value, 42);
        assert!(meta.is_none());
    }

    #[test]
    fn test_message_meta_survives_failed_downcast() {
        let mut meta = MetaContainer::new();
        meta.set("ImageComment", "test");
        let msg = Message::new("text".to_string()).with_meta(meta);

        let msg = msg.downcast::<u8>().unwrap_err();
        assert_eq!(msg.meta().and_then(|m| m.get("ImageComment")), Some("test"));
    }

    #[test]
    fn test_meta_container_append() {
        let mut meta = MetaContainer::new();
        meta.append("Flags", 1);
        meta.append("Flags", 2);
        assert_eq!(meta.get("Flags"), Some("1"));
        assert_eq!(meta.get_all("Flags"), &["1".to_string(), "2".to_string()]);
        assert!(meta.get_all("Missing").is_empty());
    }

    #[test]
    fn test_image_dimension_check() {
        let header = ImageHeader::new::<f32>([4, 2, 1], 2);
        assert_eq!(header.element_count(), 16);
        assert!(Image::new(header, vec![0.0f32; 16]).is_ok());
        assert!(Image::new(header, vec![0.0f32; 15]).is_err());
    }

    #[test]
    fn test_image_new_sets_data_type() {
        let header = ImageHeader::new::<f32>([2, 1, 1], 1);
        let image = Image::new(header, vec![Complex32::new(1.0, 0.0); 2]).unwrap();
        assert_eq!(image.header.data_type, ImageDataType::Complex32 as u16);
    }

    #[test]
    fn test_data_type_codes() {
        for code in 1..=8u16 {
            let ty = ImageDataType::from_u16(code).unwrap();
            assert_eq!(ty as u16, code);
        }
        assert!(ImageDataType::from_u16(0).is_none());
        assert_eq!(ImageDataType::Complex64.element_size(), 16);
    }
}
