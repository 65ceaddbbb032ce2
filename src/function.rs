// 该文件是 Yunjing （云镜） 项目的一部分。
// src/function.rs - 表函数与函数目录
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

use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  frame::ImageArray,
  model::{GoogleCloudVision, GoogleCloudVisionError, vision_api::VisionClient},
  table::{ColumnSchema, DetectionTable, ImageTable, NdArrayType, TableError},
  task::{BatchStrategy, SequentialBatch},
};

#[derive(Error, Debug)]
pub enum FunctionError {
  #[error("Google Cloud Vision 错误: {0}")]
  GoogleCloudVision(#[from] GoogleCloudVisionError),
  #[error("函数不存在: {0}")]
  NotFound(String),
  #[error("输出行数 {actual} 与输入行数 {expected} 不一致")]
  RowCountMismatch { expected: usize, actual: usize },
  #[error("输出表错误: {0}")]
  Table(#[from] TableError),
}

/// 函数元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionProperties {
  pub cacheable: bool,
  pub function_type: &'static str,
  pub batchable: bool,
}

impl Default for FunctionProperties {
  fn default() -> Self {
    Self {
      cacheable: false,
      function_type: "",
      batchable: true,
    }
  }
}

/// 接受一列图像、返回一张表的函数
pub trait TableFunction {
  fn name(&self) -> &str;

  fn input_signature(&self) -> Vec<ColumnSchema> {
    vec![ColumnSchema::new(
      ImageTable::DATA_COLUMN,
      NdArrayType::Float32,
      &[None, None, Some(3)],
    )]
  }

  fn output_signature(&self) -> Vec<ColumnSchema>;

  fn properties(&self) -> FunctionProperties {
    FunctionProperties::default()
  }

  fn forward(&self, frames: &[ImageArray]) -> Result<DetectionTable, FunctionError>;
}

fn detection_signature() -> Vec<ColumnSchema> {
  vec![
    ColumnSchema::new("name", NdArrayType::Str, &[None]),
    ColumnSchema::new("score", NdArrayType::Float32, &[None]),
    ColumnSchema::new("bounds", NdArrayType::Float32, &[None]),
  ]
}

/// 由闭包构造的表函数
pub struct FnTableFunction<F> {
  name: String,
  f: F,
}

pub fn table_fn<F>(name: &str, f: F) -> FnTableFunction<F>
where
  F: Fn(&[ImageArray]) -> Result<DetectionTable, FunctionError>,
{
  FnTableFunction {
    name: name.to_string(),
    f,
  }
}

impl<F> TableFunction for FnTableFunction<F>
where
  F: Fn(&[ImageArray]) -> Result<DetectionTable, FunctionError>,
{
  fn name(&self) -> &str {
    &self.name
  }

  fn output_signature(&self) -> Vec<ColumnSchema> {
    detection_signature()
  }

  fn forward(&self, frames: &[ImageArray]) -> Result<DetectionTable, FunctionError> {
    (self.f)(frames)
  }
}

/// Google Cloud Vision 目标检测表函数
///
/// 输入: `data` 列，每行一张 (H, W, 3) float32 图像
///
/// 输出: `name`、`score`、`bounds` 三列，每张输入图像一行
pub struct GoogleCloudVisionObjectDetector<C, S = SequentialBatch> {
  model: GoogleCloudVision<C>,
  strategy: S,
}

impl<C: VisionClient> GoogleCloudVisionObjectDetector<C, SequentialBatch> {
  pub fn new(model: GoogleCloudVision<C>) -> Self {
    Self {
      model,
      strategy: SequentialBatch,
    }
  }
}

impl<C: VisionClient, S: BatchStrategy> GoogleCloudVisionObjectDetector<C, S> {
  pub fn with_strategy<T: BatchStrategy>(self, strategy: T) -> GoogleCloudVisionObjectDetector<C, T> {
    GoogleCloudVisionObjectDetector {
      model: self.model,
      strategy,
    }
  }
}

impl<C: VisionClient + Sync, S: BatchStrategy> TableFunction for GoogleCloudVisionObjectDetector<C, S> {
  fn name(&self) -> &str {
    "GoogleCloudVisionObjectDetector"
  }

  fn output_signature(&self) -> Vec<ColumnSchema> {
    detection_signature()
  }

  fn properties(&self) -> FunctionProperties {
    FunctionProperties {
      cacheable: true,
      function_type: "object_detection",
      batchable: true,
    }
  }

  fn forward(&self, frames: &[ImageArray]) -> Result<DetectionTable, FunctionError> {
    info!("{}: 处理 {} 张图像", self.name(), frames.len());
    let now = Instant::now();
    let results = self.strategy.run_batch(&self.model, frames)?;
    info!("{}: 完成，耗时: {:.2?}", self.name(), now.elapsed());
    Ok(results.into_iter().collect())
  }
}

/// 已注册的表函数，名称不区分大小写
#[derive(Default)]
pub struct FunctionCatalog {
  functions: HashMap<String, Box<dyn TableFunction>>,
}

impl FunctionCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// 注册函数，同名函数会被替换并返回
  pub fn create_or_replace(
    &mut self,
    name: &str,
    function: Box<dyn TableFunction>,
  ) -> Option<Box<dyn TableFunction>> {
    let key = name.to_lowercase();
    info!("注册函数 {} -> {}", key, function.name());
    let previous = self.functions.insert(key, function);
    if previous.is_some() {
      warn!("函数 {} 已存在，已替换", name);
    }
    previous
  }

  pub fn drop_function(&mut self, name: &str) -> bool {
    self.functions.remove(&name.to_lowercase()).is_some()
  }

  pub fn get(&self, name: &str) -> Option<&dyn TableFunction> {
    self.functions.get(&name.to_lowercase()).map(|f| f.as_ref())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.functions.contains_key(&name.to_lowercase())
  }

  /// 对表的 `data` 列调用函数，相当于 `SELECT name(data) FROM table`
  pub fn call(&self, name: &str, table: &ImageTable) -> Result<DetectionTable, FunctionError> {
    let function = self
      .get(name)
      .ok_or_else(|| FunctionError::NotFound(name.to_string()))?;
    let output = function.forward(table.data())?;
    if output.len() != table.len() {
      return Err(FunctionError::RowCountMismatch {
        expected: table.len(),
        actual: output.len(),
      });
    }
    for row in output.rows() {
      row.check_aligned()?;
    }
    Ok(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::table::DetectionRow;

  fn one_empty_row_each() -> FnTableFunction<impl Fn(&[ImageArray]) -> Result<DetectionTable, FunctionError>> {
    table_fn("empty", |frames| {
      Ok(frames.iter().map(|_| DetectionRow::default()).collect())
    })
  }

  fn table_of(count: usize) -> ImageTable {
    let mut table = ImageTable::new();
    for i in 0..count {
      table.push(format!("{i}.png"), ImageArray::with_shape(2, 2));
    }
    table
  }

  #[test]
  fn catalog_calls_registered_function_by_name() {
    let mut catalog = FunctionCatalog::new();
    assert!(catalog.create_or_replace("Empty_Detect", Box::new(one_empty_row_each())).is_none());
    assert!(catalog.contains("empty_detect"));

    let output = catalog.call("EMPTY_DETECT", &table_of(3)).unwrap();
    assert_eq!(output.len(), 3);
  }

  #[test]
  fn catalog_replaces_and_drops() {
    let mut catalog = FunctionCatalog::new();
    catalog.create_or_replace("f", Box::new(one_empty_row_each()));
    assert!(catalog.create_or_replace("f", Box::new(one_empty_row_each())).is_some());
    assert!(catalog.drop_function("f"));
    assert!(matches!(
      catalog.call("f", &table_of(1)),
      Err(FunctionError::NotFound(_))
    ));
  }

  #[test]
  fn catalog_rejects_wrong_row_count() {
    let mut catalog = FunctionCatalog::new();
    catalog.create_or_replace(
      "short",
      Box::new(table_fn("short", |_| Ok(DetectionTable::default()))),
    );
    assert!(matches!(
      catalog.call("short", &table_of(2)),
      Err(FunctionError::RowCountMismatch {
        expected: 2,
        actual: 0
      })
    ));
  }

  #[test]
  fn catalog_rejects_ragged_rows() {
    let mut catalog = FunctionCatalog::new();
    catalog.create_or_replace(
      "ragged",
      Box::new(table_fn("ragged", |frames| {
        Ok(
          frames
            .iter()
            .map(|_| DetectionRow {
              name: vec!["cat".into()],
              score: vec![],
              bounds: vec![[0.0; 4]],
            })
            .collect(),
        )
      })),
    );
    assert!(matches!(
      catalog.call("ragged", &table_of(2)),
      Err(FunctionError::Table(TableError::RaggedRow {
        names: 1,
        scores: 0,
        bounds: 1
      }))
    ));
  }

  #[test]
  fn default_input_signature_is_rgb_data_column() {
    let signature = one_empty_row_each().input_signature();
    assert_eq!(signature.len(), 1);
    assert_eq!(signature[0].name, "data");
    assert_eq!(signature[0].kind, NdArrayType::Float32);
    assert_eq!(signature[0].shape, vec![None, None, Some(3)]);
  }
}
