// 该文件是 Yunjing （云镜） 项目的一部分。
// src/frame.rs - HWC 浮点图像数组
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyShape(usize, usize),
  #[error("PNG 编码错误: {0}")]
  Encode(#[from] image::ImageError),
}

/// 形状为 (H, W, 3) 的 float32 图像，按行优先存储，取值范围 0-255
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
  data: Box<[f32]>,
  height: usize,
  width: usize,
}

impl ImageArray {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0f32; RGB_CHANNELS * height * width].into_boxed_slice();
    Self {
      data,
      height,
      width,
    }
  }

  pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self, FrameError> {
    if height == 0 || width == 0 {
      return Err(FrameError::EmptyShape(height, width));
    }
    let expected = RGB_CHANNELS * height * width;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      data: data.into_boxed_slice(),
      height,
      width,
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> (usize, usize, usize) {
    (self.height, self.width, RGB_CHANNELS)
  }

  pub fn as_hwc(&self) -> &[f32] {
    &self.data
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    let width = self.width as u32;
    let height = self.height as u32;
    let data = &self.data;

    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = (y as usize * self.width + x as usize) * RGB_CHANNELS;
      Rgb([
        to_u8(data[idx]),
        to_u8(data[idx + 1]),
        to_u8(data[idx + 2]),
      ])
    })
  }

  /// 无损 PNG 编码，避免压缩伪影影响检测
  pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
    let image = self.to_rgb_image();
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
  }
}

impl AsMut<[f32]> for ImageArray {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl From<&RgbImage> for ImageArray {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&v| v as f32).collect::<Vec<_>>();
    Self {
      data: data.into_boxed_slice(),
      height: height as usize,
      width: width as usize,
    }
  }
}

impl From<RgbImage> for ImageArray {
  fn from(image: RgbImage) -> Self {
    Self::from(&image)
  }
}

fn to_u8(value: f32) -> u8 {
  if value.is_nan() {
    0
  } else {
    value.round().clamp(0.0, 255.0) as u8
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_vec_checks_length() {
    let err = ImageArray::from_vec(2, 2, vec![0.0; 11]).unwrap_err();
    assert!(matches!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    ));
    assert!(matches!(
      ImageArray::from_vec(0, 4, vec![]),
      Err(FrameError::EmptyShape(0, 4))
    ));
  }

  #[test]
  fn rgb_image_conversion_keeps_pixel_layout() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, Rgb([10, 20, 30]));
    let array = ImageArray::from(&image);
    assert_eq!(array.shape(), (2, 3, 3));
    let idx = (1 * 3 + 2) * 3;
    assert_eq!(&array.as_hwc()[idx..idx + 3], &[10.0, 20.0, 30.0]);
    assert_eq!(array.to_rgb_image(), image);
  }

  #[test]
  fn out_of_range_samples_are_clamped() {
    let array = ImageArray::from_vec(1, 1, vec![-5.0, 127.6, 300.0]).unwrap();
    assert_eq!(array.to_rgb_image().get_pixel(0, 0), &Rgb([0, 128, 255]));
  }

  #[test]
  fn png_encoding_is_lossless() {
    let mut array = ImageArray::with_shape(4, 5);
    for (i, v) in array.as_mut().iter_mut().enumerate() {
      *v = (i % 256) as f32;
    }
    let png = array.encode_png().unwrap();
    assert_eq!(&png[1..4], b"PNG");
    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
      .unwrap()
      .to_rgb8();
    assert_eq!(ImageArray::from(decoded), array);
  }
}
