// 该文件是 Yunjing （云镜） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::table::DetectionRow;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 24.0;
const LABEL_OFFSET: i32 = 10; // 文字底边距边框上沿
const BOX_THICKNESS: i32 = 3;
const BOX_COLOR: [u8; 3] = [207, 248, 64];
const LABEL_COLOR: [u8; 3] = [255, 49, 49];

// 内置字体 DejaVu Sans，许可见 assets/font-LICENSE.txt
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  thickness: i32,
  box_color: [u8; 3],
  label_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    let font = FontArc::try_from_slice(EMBEDDED_FONT)
      .map_err(|e| warn!("内置字体加载失败，只绘制边框: {}", e))
      .ok();
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
    }
  }
}

impl Draw {
  /// 用外部 TrueType/OpenType 字体替换内置字体
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| {
      std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}: {}", path.display(), e),
      )
    })?;
    info!("加载标签字体: {}", path.display());
    self.font = Some(font);
    Ok(self)
  }

  /// 像素坐标 [x1, y1, x2, y2]，坐标截断为整数；退化的框被跳过
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str) -> bool {
    if bbox.iter().any(|v| !v.is_finite()) {
      return false;
    }
    let [x1, y1, x2, y2] = bbox.map(|v| v as i32);
    if x2 <= x1 || y2 <= y1 {
      debug!("跳过退化边框 {:?}", bbox);
      return false;
    }

    let color = Rgb(self.box_color);
    let half = self.thickness / 2;
    for t in 0..self.thickness {
      // 线宽沿原边框内外对称展开
      let offset = t - half;
      let width = x2 - x1 + 1 + 2 * offset;
      let height = y2 - y1 + 1 + 2 * offset;
      if width <= 0 || height <= 0 {
        continue;
      }
      let rect = Rect::at(x1 - offset, y1 - offset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if let Some(font) = &self.font {
      let text_y = (y1 - LABEL_OFFSET - self.font_size as i32).max(0);
      draw_text_mut(
        image,
        Rgb(self.label_color),
        x1.max(0),
        text_y,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
    true
  }

  /// 在图像上绘制一行检测结果，返回实际绘制的框数
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, row: &DetectionRow) -> usize {
    row
      .name
      .iter()
      .zip(row.bounds.iter())
      .filter(|(label, bbox)| self.draw_bbox_with_label(image, bbox, label))
      .count()
  }
}
