// 该文件是 Yunjing （云镜） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ImageArray, table::ImageTable};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme mismatch: {0}")]
  SchemaMismatch(String),
  #[error("I/O error: {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("Image loading error: {0}: {1}")]
  ImageLoadError(PathBuf, image::ImageError),
}

/// 单个图像文件，`image:///path/to/file.png`
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch(url.scheme().to_string()));
    }

    let path = urlencoding::decode(url.path())
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| url.path().to_string());
    Ok(Self::new(path))
  }
}

impl ImageFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 解码为 RGB 三通道，带 alpha 或灰度的图像也会被转换
  pub fn read(&self) -> Result<ImageArray, ImageFileInputError> {
    let reader = ImageReader::open(&self.path)
      .map_err(|e| ImageFileInputError::IoError(self.path.clone(), e))?
      .with_guessed_format()
      .map_err(|e| ImageFileInputError::IoError(self.path.clone(), e))?;
    let image = reader
      .decode()
      .map_err(|e| ImageFileInputError::ImageLoadError(self.path.clone(), e))?
      .to_rgb8();
    Ok(ImageArray::from(image))
  }

  /// 读取并追加到表中，对应 `LOAD IMAGE 'path' INTO table`
  pub fn load_into(&self, table: &mut ImageTable) -> Result<(), ImageFileInputError> {
    let image = self.read()?;
    info!(
      "加载图像 {} ({}x{})",
      self.path.display(),
      image.width(),
      image.height()
    );
    table.push(self.path.to_string_lossy(), image);
    Ok(())
  }
}

/// 按顺序加载多个文件，任一失败即返回错误
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Result<ImageTable, ImageFileInputError> {
  let mut table = ImageTable::new();
  for path in paths {
    ImageFileInput::new(path.as_ref()).load_into(&mut table)?;
  }
  Ok(table)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage, Rgba, RgbaImage};

  #[test]
  fn loads_png_and_jpeg_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("a.png");
    let jpg = dir.path().join("b.jpeg");
    RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])).save(&png).unwrap();
    RgbImage::from_pixel(8, 6, Rgb([200, 200, 200])).save(&jpg).unwrap();

    let table = load_images(&[&png, &jpg]).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.names()[0], png.to_string_lossy());
    assert_eq!(table.data()[0].shape(), (3, 4, 3));
    assert_eq!(table.data()[1].shape(), (6, 8, 3));
    assert_eq!(&table.data()[0].as_hwc()[..3], &[1.0, 2.0, 3.0]);
  }

  #[test]
  fn alpha_channel_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgba.png");
    RgbaImage::from_pixel(2, 2, Rgba([9, 8, 7, 128])).save(&path).unwrap();
    let image = ImageFileInput::new(&path).read().unwrap();
    assert_eq!(image.channels(), 3);
    assert_eq!(&image.as_hwc()[..3], &[9.0, 8.0, 7.0]);
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = ImageFileInput::new("/nonexistent/x.png").read().unwrap_err();
    assert!(matches!(err, ImageFileInputError::IoError(_, _)));
  }

  #[test]
  fn from_url_checks_scheme_and_decodes_path() {
    let url = Url::parse("image:///tmp/my%20photo.png").unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.path(), Path::new("/tmp/my photo.png"));

    let url = Url::parse("gvision:///").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch(_))
    ));
  }
}
