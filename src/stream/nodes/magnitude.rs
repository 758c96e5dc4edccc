//! MagnitudeGadget - complex images to real magnitude images.

use crate::error::{Result, StreamError};
use crate::stream::node::PureGadget;
use crate::stream::nodes::fft::with_meta;
use crate::types::{Complex32, Complex64, Image, Message};

#[derive(Debug, Default)]
pub struct MagnitudeGadget;

impl PureGadget for MagnitudeGadget {
    fn name(&self) -> &str {
        "MagnitudeGadget"
    }

    fn process(&self, message: Message) -> Result<Message> {
        let message = match message.downcast::<Image<Complex32>>() {
            Ok((image, meta)) => {
                let data: Vec<f32> = image.data.iter().map(|c| c.norm()).collect();
                return Ok(with_meta(Message::new(Image::new(image.header, data)?), meta));
            }
            Err(message) => message,
        };
        match message.downcast::<Image<Complex64>>() {
            Ok((image, meta)) => {
                let data: Vec<f64> = image.data.iter().map(|c| c.norm()).collect();
                Ok(with_meta(Message::new(Image::new(image.header, data)?), meta))
            }
            Err(message) => Err(StreamError::failed(format!(
                "MagnitudeGadget expects complex images, got {}",
                message.type_name()
            ))),
        }
    }
}
