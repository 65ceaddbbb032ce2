// 该文件是 Yunjing （云镜） 项目的一部分。
// src/bin/gvision_obj_detect.rs - 云端目标检测示例
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use yunjing::{
  FromUrl,
  function::{FunctionCatalog, GoogleCloudVisionObjectDetector, TableFunction},
  input::ImageFileInput,
  model::GoogleCloudVisionBuilder,
  output::{Render, SaveImageFileOutput, SourceImage, draw::Draw},
  table::ImageTable,
  task::BoundedParallelBatch,
};

const FUNCTION_NAME: &str = "gvision_obj_detect";

/// 调用 Google Cloud Vision 检测图像中的物体，并在原图旁保存标注副本
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型，例如 gvision:///?config=evadb.yml&max_results=20
  #[arg(long, value_name = "MODEL", default_value = "gvision:///")]
  pub model: Url,
  /// 输出方式，默认在原图旁写入 *_annotated.* 副本
  #[arg(long, value_name = "OUTPUT", default_value = "image:///?suffix=_annotated")]
  pub output: Url,
  /// 标签字体文件（TTF/OTF），不指定时使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 并发请求数，1 表示逐张顺序请求
  #[arg(long, value_name = "COUNT", default_value_t = 1)]
  pub workers: usize,
  /// 输入图像，文件路径或 image:///path 形式
  #[arg(value_name = "IMAGE", required = true)]
  pub inputs: Vec<String>,
}

fn open_input(source: &str) -> Result<ImageFileInput> {
  if source.starts_with("image:") {
    let url = Url::parse(source)?;
    Ok(ImageFileInput::from_url(&url)?)
  } else {
    Ok(ImageFileInput::new(source))
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测模型: {}", args.model);
  info!("输出方式: {}", args.output);
  info!("输入图像: {} 张", args.inputs.len());

  // 凭据在这里解析，缺失时不会发出任何网络请求
  let model = GoogleCloudVisionBuilder::from_url(&args.model)?.build()?;
  let detector = GoogleCloudVisionObjectDetector::new(model);
  let function: Box<dyn TableFunction> = if args.workers > 1 {
    Box::new(detector.with_strategy(BoundedParallelBatch::new(args.workers)?))
  } else {
    Box::new(detector)
  };

  let mut catalog = FunctionCatalog::new();
  catalog.create_or_replace(FUNCTION_NAME, function);

  let mut table = ImageTable::new();
  for source in &args.inputs {
    open_input(source)?.load_into(&mut table)?;
  }

  let draw = match &args.font {
    Some(font) => Draw::default().with_font_file(font)?,
    None => Draw::default(),
  };
  let output = SaveImageFileOutput::from_url(&args.output)?.with_draw(draw);
  // 在请求远程接口之前检查输出方式
  output.check_batch(table.len())?;

  info!("开始检测...");
  let now = std::time::Instant::now();
  let detections = catalog.call(FUNCTION_NAME, &table)?;
  info!("检测完成，耗时: {:.2?}", now.elapsed());
  info!("检测结果:\n{}", detections);

  for ((path, image), row) in table.rows().zip(detections.rows()) {
    output.render_result(&SourceImage { path, image }, row)?;
  }

  info!("处理完成!");
  Ok(())
}
