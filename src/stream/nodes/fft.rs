//! ImageFftGadget - inverse FFT of complex images along the readout dimension.
//!
//! Each line of `matrix_size[0]` samples is transformed independently with
//! orthonormal scaling (`1/sqrt(n)`), so k-space lines become image lines.

use crate::error::{Result, StreamError};
use crate::stream::node::PureGadget;
use crate::types::{Complex32, Complex64, Image, Message};
use rustfft::num_complex::Complex;
use rustfft::{FftNum, FftPlanner};
use std::sync::Mutex;

pub struct ImageFftGadget {
    planner32: Mutex<FftPlanner<f32>>,
    planner64: Mutex<FftPlanner<f64>>,
}

impl Default for ImageFftGadget {
    fn default() -> Self {
        Self {
            planner32: Mutex::new(FftPlanner::new()),
            planner64: Mutex::new(FftPlanner::new()),
        }
    }
}

impl ImageFftGadget {
    pub fn new() -> Self {
        Self::default()
    }
}

fn inverse_lines<T: FftNum>(planner: &Mutex<FftPlanner<T>>, data: &mut [Complex<T>], n: usize) -> Result<()> {
    if n == 0 || data.is_empty() {
        return Ok(());
    }
    if data.len() % n != 0 {
        return Err(StreamError::failed(format!(
            "image of {} samples is not a whole number of {}-sample lines",
            data.len(),
            n
        )));
    }
    let fft = planner
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .plan_fft_inverse(n);
    fft.process(data);

    let scale = T::from_f64(1.0 / (n as f64).sqrt())
        .ok_or_else(|| StreamError::failed("FFT scale not representable"))?;
    for value in data.iter_mut() {
        *value = *value * scale;
    }
    Ok(())
}

impl PureGadget for ImageFftGadget {
    fn name(&self) -> &str {
        "ImageFftGadget"
    }

    fn process(&self, message: Message) -> Result<Message> {
        let message = match message.downcast::<Image<Complex32>>() {
            Ok((mut image, meta)) => {
                let n = image.line_length();
                inverse_lines(&self.planner32, &mut image.data, n)?;
                return Ok(with_meta(Message::new(image), meta));
            }
            Err(message) => message,
        };
        match message.downcast::<Image<Complex64>>() {
            Ok((mut image, meta)) => {
                let n = image.line_length();
                inverse_lines(&self.planner64, &mut image.data, n)?;
                Ok(with_meta(Message::new(image), meta))
            }
            Err(message) => Err(StreamError::failed(format!(
                "ImageFftGadget expects complex images, got {}",
                message.type_name()
            ))),
        }
    }
}

pub(crate) fn with_meta(message: Message, meta: Option<crate::types::MetaContainer>) -> Message {
    match meta {
        Some(meta) => message.with_meta(meta),
        None => message,
    }
}
