// 该文件是 Yunjing （云镜） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, SourceImage, draw::Draw},
  table::DetectionRow,
};

pub const ANNOTATED_SUFFIX: &str = "_annotated";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输出文件 {path} 只能保存一张图像，实际 {count} 张")]
  FixedTargetBatch { path: PathBuf, count: usize },
  #[error("输出文件 {0} 已写入，拒绝覆盖")]
  FixedTargetReused(PathBuf),
}

/// `P.ext` -> `P_annotated.ext`，与原图放在同一目录
pub fn annotated_path(source: &Path) -> PathBuf {
  annotated_path_with_suffix(source, ANNOTATED_SUFFIX)
}

fn annotated_path_with_suffix(source: &Path, suffix: &str) -> PathBuf {
  let stem = source
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();
  let name = match source.extension() {
    Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
    None => format!("{}{}", stem, suffix),
  };
  source.with_file_name(name)
}

enum SaveTarget {
  /// 固定输出路径
  File(PathBuf),
  /// 在来源路径上追加后缀
  Suffix(String),
}

/// `image:///out/result.png` 写入固定文件；
/// `image:///?suffix=_annotated` 在每张原图旁写入带后缀的副本
pub struct SaveImageFileOutput {
  target: SaveTarget,
  written: AtomicBool,
  draw: Draw,
  #[cfg(feature = "directory_record")]
  record: Option<crate::output::Record>,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let suffix = uri
      .query_pairs()
      .find(|(k, _)| k == "suffix")
      .map(|(_, v)| v.into_owned());
    let path = uri.path();

    let output = match suffix {
      Some(suffix) => Self::beside_source(&suffix),
      None if path.is_empty() || path == "/" => Self::beside_source(ANNOTATED_SUFFIX),
      None => Self::to_file(path),
    };

    #[cfg(feature = "directory_record")]
    let output = if uri.query_pairs().any(|(k, _)| k == "record") {
      output.with_record(crate::output::Record::default())
    } else {
      output
    };

    Ok(output)
  }
}

impl SaveImageFileOutput {
  pub fn to_file(path: impl Into<PathBuf>) -> Self {
    Self::with_target(SaveTarget::File(path.into()))
  }

  pub fn beside_source(suffix: &str) -> Self {
    Self::with_target(SaveTarget::Suffix(suffix.to_string()))
  }

  fn with_target(target: SaveTarget) -> Self {
    Self {
      target,
      written: AtomicBool::new(false),
      draw: Draw::default(),
      #[cfg(feature = "directory_record")]
      record: None,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  #[cfg(feature = "directory_record")]
  pub fn with_record(mut self, record: crate::output::Record) -> Self {
    self.record = Some(record);
    self
  }

  /// 固定输出文件只接受一张图像
  pub fn check_batch(&self, count: usize) -> Result<(), SaveImageFileError> {
    match &self.target {
      SaveTarget::File(path) if count > 1 => Err(SaveImageFileError::FixedTargetBatch {
        path: path.clone(),
        count,
      }),
      _ => Ok(()),
    }
  }

  pub fn output_path(&self, source: &Path) -> PathBuf {
    match &self.target {
      SaveTarget::File(path) => path.clone(),
      SaveTarget::Suffix(suffix) => annotated_path_with_suffix(source, suffix),
    }
  }

  fn save_image(&self, image: image::RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;

    info!("保存图像到文件: {}", path.display());

    Ok(())
  }
}

impl Render<SourceImage<'_>, DetectionRow> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &SourceImage<'_>,
    result: &DetectionRow,
  ) -> Result<(), Self::Error> {
    let path = self.output_path(Path::new(frame.path));
    if matches!(self.target, SaveTarget::File(_)) && self.written.swap(true, Ordering::SeqCst) {
      return Err(SaveImageFileError::FixedTargetReused(path));
    }
    let mut image = frame.image.to_rgb_image();
    let drawn = self.draw.draw_detections_on_image(&mut image, result);
    if drawn < result.len() {
      warn!(
        "{}: {} 个检测框中有 {} 个无法绘制",
        frame.path,
        result.len(),
        result.len() - drawn
      );
    }
    self.save_image(image, &path)?;

    #[cfg(feature = "directory_record")]
    {
      if let Some(record) = &self.record {
        record.record(result, &path)?;
      }
    }

    Ok(())
  }
}
