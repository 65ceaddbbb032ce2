// 该文件是 Yunjing （云镜） 项目的一部分。
// src/output/directory_record.rs - 检测结果文本记录
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

use tracing::debug;

use crate::table::DetectionRow;

/// 将一行检测结果写到同名 `.txt` 文件，每个目标一行:
/// `name, score, x1, y1, x2, y2`
#[derive(Debug, Clone, Default)]
pub struct Record;

impl Record {
  pub fn format(&self, row: &DetectionRow) -> String {
    row
      .name
      .iter()
      .zip(row.score.iter())
      .zip(row.bounds.iter())
      .map(|((name, score), bbox)| {
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          name, score, bbox[0], bbox[1], bbox[2], bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn record(&self, row: &DetectionRow, path: &Path) -> Result<(), std::io::Error> {
    let target = path.with_extension("txt");
    debug!("写入检测记录: {}", target.display());
    std::fs::write(target, self.format(row))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_line_per_detection() {
    let row = DetectionRow {
      name: vec!["bicycle".into(), "person".into()],
      score: vec![0.95, 0.5],
      bounds: vec![[10.0, 10.0, 40.0, 40.0], [0.0, 1.0, 2.0, 3.0]],
    };
    let text = Record.format(&row);
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(
      lines,
      vec![
        "bicycle, 0.9500, 10.0000, 10.0000, 40.0000, 40.0000",
        "person, 0.5000, 0.0000, 1.0000, 2.0000, 3.0000",
      ]
    );
  }

  #[test]
  fn record_replaces_extension() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("bike_annotated.png");
    Record.record(&DetectionRow::default(), &image_path).unwrap();
    let text = std::fs::read_to_string(dir.path().join("bike_annotated.txt")).unwrap();
    assert!(text.is_empty());
  }
}
