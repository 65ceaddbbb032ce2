// 该文件是 Yunjing （云镜） 项目的一部分。
// src/table.rs - 表格输入输出
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

use std::fmt;

use thiserror::Error;

use crate::{frame::ImageArray, model::DetectResult};

#[derive(Error, Debug)]
pub enum TableError {
  #[error("列长度不一致: name {names}, score {scores}, bounds {bounds}")]
  RaggedRow {
    names: usize,
    scores: usize,
    bounds: usize,
  },
}

/// 列元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdArrayType {
  Str,
  Float32,
}

/// 列描述，`None` 表示该维度长度可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
  pub name: &'static str,
  pub kind: NdArrayType,
  pub shape: Vec<Option<usize>>,
}

impl ColumnSchema {
  pub fn new(name: &'static str, kind: NdArrayType, shape: &[Option<usize>]) -> Self {
    Self {
      name,
      kind,
      shape: shape.to_vec(),
    }
  }
}

/// 已加载的图像表，对应 `LOAD IMAGE ... INTO` 建立的表
#[derive(Debug, Clone, Default)]
pub struct ImageTable {
  names: Vec<String>,
  data: Vec<ImageArray>,
}

impl ImageTable {
  pub const DATA_COLUMN: &'static str = "data";
  pub const NAME_COLUMN: &'static str = "name";

  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, name: impl Into<String>, image: ImageArray) {
    self.names.push(name.into());
    self.data.push(image);
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn data(&self) -> &[ImageArray] {
    &self.data
  }

  pub fn rows(&self) -> impl Iterator<Item = (&str, &ImageArray)> {
    self.names.iter().map(String::as_str).zip(self.data.iter())
  }
}

/// 单张图像的检测结果，三列等长并按下标对齐
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionRow {
  pub name: Vec<String>,
  pub score: Vec<f32>,
  pub bounds: Vec<[f32; 4]>,
}

impl DetectionRow {
  /// 三列长度必须一致
  pub fn check_aligned(&self) -> Result<(), TableError> {
    if self.name.len() != self.score.len() || self.name.len() != self.bounds.len() {
      return Err(TableError::RaggedRow {
        names: self.name.len(),
        scores: self.score.len(),
        bounds: self.bounds.len(),
      });
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.name.len()
  }

  pub fn is_empty(&self) -> bool {
    self.name.is_empty()
  }
}

impl From<DetectResult> for DetectionRow {
  fn from(result: DetectResult) -> Self {
    let mut row = DetectionRow {
      name: Vec::with_capacity(result.len()),
      score: Vec::with_capacity(result.len()),
      bounds: Vec::with_capacity(result.len()),
    };
    for item in result.items.into_vec() {
      row.name.push(item.name);
      row.score.push(item.score);
      row.bounds.push(item.bbox);
    }
    row
  }
}

/// 检测输出表，每张输入图像一行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionTable {
  rows: Vec<DetectionRow>,
}

impl DetectionTable {
  pub const COLUMNS: [&'static str; 3] = ["name", "score", "bounds"];

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn rows(&self) -> &[DetectionRow] {
    &self.rows
  }

  pub fn row(&self, index: usize) -> Option<&DetectionRow> {
    self.rows.get(index)
  }
}

impl FromIterator<DetectionRow> for DetectionTable {
  fn from_iter<I: IntoIterator<Item = DetectionRow>>(iter: I) -> Self {
    Self {
      rows: iter.into_iter().collect(),
    }
  }
}

impl FromIterator<DetectResult> for DetectionTable {
  fn from_iter<I: IntoIterator<Item = DetectResult>>(iter: I) -> Self {
    iter.into_iter().map(DetectionRow::from).collect()
  }
}

impl fmt::Display for DetectionTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{:>4}  {}", "", Self::COLUMNS.join("  "))?;
    for (idx, row) in self.rows.iter().enumerate() {
      let bounds = row
        .bounds
        .iter()
        .map(|b| format!("[{:.1}, {:.1}, {:.1}, {:.1}]", b[0], b[1], b[2], b[3]))
        .collect::<Vec<_>>();
      let scores = row
        .score
        .iter()
        .map(|s| format!("{:.3}", s))
        .collect::<Vec<_>>();
      writeln!(
        f,
        "{:>4}  {:?}  [{}]  [{}]",
        idx,
        row.name,
        scores.join(", "),
        bounds.join(", ")
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn detect_result_becomes_aligned_row() {
    let result = DetectResult::from(vec![
      DetectItem {
        name: "cat".into(),
        score: 0.5,
        bbox: [1.0, 2.0, 3.0, 4.0],
      },
      DetectItem {
        name: "dog".into(),
        score: 0.25,
        bbox: [5.0, 6.0, 7.0, 8.0],
      },
    ]);
    let row = DetectionRow::from(result);
    assert_eq!(row.name, vec!["cat", "dog"]);
    assert_eq!(row.score, vec![0.5, 0.25]);
    assert_eq!(row.bounds[1], [5.0, 6.0, 7.0, 8.0]);
  }

  #[test]
  fn empty_result_gives_three_empty_columns() {
    let table: DetectionTable = vec![DetectResult::default()].into_iter().collect();
    assert_eq!(table.len(), 1);
    let row = table.row(0).unwrap();
    assert!(row.name.is_empty() && row.score.is_empty() && row.bounds.is_empty());
  }

  #[test]
  fn converted_rows_are_aligned() {
    assert!(DetectionRow::default().check_aligned().is_ok());
  }

  #[test]
  fn ragged_rows_are_rejected() {
    let row = DetectionRow {
      name: vec!["a".into()],
      score: vec![],
      bounds: vec![[0.0; 4]],
    };
    let err = row.check_aligned().unwrap_err();
    assert!(matches!(
      err,
      TableError::RaggedRow {
        names: 1,
        scores: 0,
        bounds: 1
      }
    ));
  }

  #[test]
  fn image_table_keeps_load_order() {
    let mut table = ImageTable::new();
    table.push("a.png", ImageArray::with_shape(1, 1));
    table.push("b.png", ImageArray::with_shape(2, 2));
    let names: Vec<_> = table.rows().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
    assert_eq!(table.data()[1].shape(), (2, 2, 3));
  }

  #[test]
  fn display_lists_one_line_per_row() {
    let table: DetectionTable = vec![DetectResult::default(), DetectResult::default()]
      .into_iter()
      .collect();
    let text = table.to_string();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("name  score  bounds"));
  }
}
