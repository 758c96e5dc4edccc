//! Image codec (message id 1022).
//!
//! Layout: header fields, length-prefixed JSON metadata, then the raw element
//! data, all little-endian.

use crate::error::{Result, StreamError};
use crate::io::primitives::{
    read_elements, read_meta, read_u16, read_u64, write_elements, write_meta, write_u16,
    write_u64, WireElement,
};
use crate::io::{Reader, Writer, IMAGE};
use crate::types::{
    Complex32, Complex64, Image, ImageDataType, ImageHeader, MetaContainer, Message,
};
use std::io::{Read, Write};

fn write_header(stream: &mut dyn Write, header: &ImageHeader) -> Result<()> {
    write_u16(stream, header.version)?;
    write_u16(stream, header.data_type)?;
    write_u64(stream, header.flags)?;
    for dim in header.matrix_size {
        write_u16(stream, dim)?;
    }
    write_u16(stream, header.channels)?;
    write_u16(stream, header.slice)?;
    write_u16(stream, header.image_index)?;
    write_u16(stream, header.image_series_index)
}

fn read_header(stream: &mut dyn Read) -> Result<ImageHeader> {
    Ok(ImageHeader {
        version: read_u16(stream)?,
        data_type: read_u16(stream)?,
        flags: read_u64(stream)?,
        matrix_size: [read_u16(stream)?, read_u16(stream)?, read_u16(stream)?],
        channels: read_u16(stream)?,
        slice: read_u16(stream)?,
        image_index: read_u16(stream)?,
        image_series_index: read_u16(stream)?,
    })
}

fn write_image<T: WireElement>(
    stream: &mut dyn Write,
    image: &Image<T>,
    meta: Option<&MetaContainer>,
) -> Result<()> {
    // Fields are public; the element type and length are authoritative
    let mut header = image.header;
    header.data_type = T::DATA_TYPE as u16;
    if header.element_count() != image.data.len() {
        return Err(StreamError::Serialization(format!(
            "image header {:?} x {} channels describes {} elements, data has {}",
            header.matrix_size,
            header.channels,
            header.element_count(),
            image.data.len()
        )));
    }
    write_u16(stream, IMAGE)?;
    write_header(stream, &header)?;
    write_meta(stream, meta)?;
    write_elements(stream, &image.data)
}

fn read_image<T: WireElement>(
    stream: &mut dyn Read,
    header: ImageHeader,
    meta: Option<MetaContainer>,
) -> Result<Message> {
    let data = read_elements::<T>(stream, header.element_count())?;
    let message = Message::new(Image { header, data });
    Ok(match meta {
        Some(meta) => message.with_meta(meta),
        None => message,
    })
}

/// Writes `Image<T>` payloads for every supported element type.
#[derive(Debug, Default)]
pub struct ImageWriter;

macro_rules! for_each_element {
    ($mac:ident) => {
        $mac!(f32, f64, Complex32, Complex64, u16, i16, u32, i32)
    };
}

impl Writer for ImageWriter {
    fn accepts(&self, message: &Message) -> bool {
        macro_rules! any_image {
            ($($ty:ty),*) => { false $(|| message.is::<Image<$ty>>())* };
        }
        for_each_element!(any_image)
    }

    fn write(&self, stream: &mut dyn Write, message: Message) -> Result<()> {
        let mut message = message;
        macro_rules! try_write {
            ($($ty:ty),*) => {
                $(message = match message.downcast::<Image<$ty>>() {
                    Ok((image, meta)) => return write_image(stream, &image, meta.as_ref()),
                    Err(message) => message,
                };)*
            };
        }
        for_each_element!(try_write);
        Err(StreamError::Serialization(format!(
            "ImageWriter cannot write {}",
            message.type_name()
        )))
    }
}

/// Reads image frames, producing `Image<T>` for the header's data type.
#[derive(Debug, Default)]
pub struct ImageReader;

impl Reader for ImageReader {
    fn slot(&self) -> u16 {
        IMAGE
    }

    fn read(&self, stream: &mut dyn Read) -> Result<Message> {
        let header = read_header(stream)?;
        let meta = read_meta(stream)?;
        let data_type = ImageDataType::from_u16(header.data_type).ok_or_else(|| {
            StreamError::Serialization(format!("unknown image data type {}", header.data_type))
        })?;
        match data_type {
            ImageDataType::U16 => read_image::<u16>(stream, header, meta),
            ImageDataType::I16 => read_image::<i16>(stream, header, meta),
            ImageDataType::U32 => read_image::<u32>(stream, header, meta),
            ImageDataType::I32 => read_image::<i32>(stream, header, meta),
            ImageDataType::F32 => read_image::<f32>(stream, header, meta),
            ImageDataType::F64 => read_image::<f64>(stream, header, meta),
            ImageDataType::Complex32 => read_image::<Complex32>(stream, header, meta),
            ImageDataType::Complex64 => read_image::<Complex64>(stream, header, meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageElement;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn round_trip(message: Message) -> Message {
        let writer = ImageWriter;
        assert!(writer.accepts(&message));
        let mut buf = Vec::new();
        writer.write(&mut buf, message).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u16(&mut cursor).unwrap(), IMAGE);
        ImageReader.read(&mut cursor).unwrap()
    }

    fn image_of<T: ImageElement>(data: Vec<T>) -> Image<T> {
        let header = ImageHeader::new::<T>([data.len() as u16, 1, 1], 1);
        Image::new(header, data).unwrap()
    }

    #[test]
    fn test_rejects_non_images() {
        assert!(!ImageWriter.accepts(&Message::new("text".to_string())));
        let err = ImageWriter
            .write(&mut Vec::new(), Message::new(3u8))
            .unwrap_err();
        assert!(matches!(err, StreamError::Serialization(_)));
    }

    #[test]
    fn test_meta_and_header_round_trip() {
        let mut image = image_of(vec![1u16, 2, 3, 4]);
        image.header.slice = 3;
        image.header.image_series_index = 9;
        let mut meta = MetaContainer::new();
        meta.append("ImageComment", "GT");

        let back = round_trip(Message::new(image.clone()).with_meta(meta.clone()));
        assert_eq!(back.meta(), Some(&meta));
        let (decoded, _) = back.downcast::<Image<u16>>().unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_element_type_wins_over_stale_header_tag() {
        let mut image = image_of(vec![1.5f32, -2.0]);
        image.header.data_type = ImageDataType::U16 as u16;

        let (back, _) = round_trip(Message::new(image))
            .downcast::<Image<f32>>()
            .unwrap();
        assert_eq!(back.data, vec![1.5, -2.0]);
        assert_eq!(back.header.data_type, ImageDataType::F32 as u16);
    }

    #[test]
    fn test_mismatched_dimensions_are_not_written() {
        let mut image = image_of(vec![1u32, 2, 3]);
        image.header.matrix_size = [4, 1, 1];

        let mut buf = Vec::new();
        let err = ImageWriter
            .write(&mut buf, Message::new(image))
            .unwrap_err();
        assert!(matches!(err, StreamError::Serialization(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_data_type() {
        let mut buf = Vec::new();
        let mut header = ImageHeader::new::<f32>([1, 1, 1], 1);
        header.data_type = 99;
        write_header(&mut buf, &header).unwrap();
        write_meta(&mut buf, None).unwrap();
        assert!(ImageReader.read(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_truncated_data() {
        let mut buf = Vec::new();
        ImageWriter
            .write(&mut buf, Message::new(image_of(vec![1i32, 2, 3])))
            .unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = Cursor::new(buf);
        read_u16(&mut cursor).unwrap();
        assert!(ImageReader.read(&mut cursor).is_err());
    }

    proptest! {
        #[test]
        fn test_f32_bits_preserved(bits in prop::collection::vec(any::<u32>(), 1..64)) {
            let data: Vec<f32> = bits.iter().map(|b| f32::from_bits(*b)).collect();
            let (back, _) = round_trip(Message::new(image_of(data)))
                .downcast::<Image<f32>>()
                .unwrap();
            let back_bits: Vec<u32> = back.data.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(back_bits, bits);
        }

        #[test]
        fn test_complex64_bits_preserved(
            parts in prop::collection::vec((any::<u64>(), any::<u64>()), 1..32)
        ) {
            let data: Vec<Complex64> = parts
                .iter()
                .map(|(re, im)| Complex64::new(f64::from_bits(*re), f64::from_bits(*im)))
                .collect();
            let (back, _) = round_trip(Message::new(image_of(data)))
                .downcast::<Image<Complex64>>()
                .unwrap();
            let back_parts: Vec<(u64, u64)> = back
                .data
                .iter()
                .map(|c| (c.re.to_bits(), c.im.to_bits()))
                .collect();
            prop_assert_eq!(back_parts, parts);
        }

        #[test]
        fn test_integer_images_preserved(
            signed in prop::collection::vec(any::<i16>(), 1..64),
            unsigned in prop::collection::vec(any::<u32>(), 1..64),
        ) {
            let (back, _) = round_trip(Message::new(image_of(signed.clone())))
                .downcast::<Image<i16>>()
                .unwrap();
            prop_assert_eq!(back.data, signed);

            let (back, _) = round_trip(Message::new(image_of(unsigned.clone())))
                .downcast::<Image<u32>>()
                .unwrap();
            prop_assert_eq!(back.data, unsigned);
        }
    }
}
