// 该文件是 Yunjing （云镜） 项目的一部分。
// src/model/gcloud_vision.rs - Google Cloud Vision 目标检测模型
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{ConfigError, Credentials, ProviderChain},
  frame::{FrameError, ImageArray},
  model::{
    DetectItem, DetectResult, Model,
    vision_api::{
      LocalizedObjectAnnotation, NormalizedVertex, RestVisionClient, VisionApiError, VisionClient,
    },
  },
};

// 顶点顺时针排列，0 为左上角，2 为右下角
const TOP_LEFT_VERTEX: usize = 0;
const BOTTOM_RIGHT_VERTEX: usize = 2;

#[derive(Error, Debug)]
pub enum GoogleCloudVisionError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("远程接口错误: {0}")]
  Api(#[from] VisionApiError),
  #[error("图像编码错误: {0}")]
  Encode(#[from] FrameError),
  #[error("边界多边形顶点不足: 需要至少 {expected} 个, 实际 {actual} 个")]
  MalformedPolygon { expected: usize, actual: usize },
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 由归一化顶点计算像素坐标边界框 [x1, y1, x2, y2]
pub fn bbox_from_normalized_vertices(
  vertices: &[NormalizedVertex],
  width: usize,
  height: usize,
) -> Result<[f32; 4], GoogleCloudVisionError> {
  if vertices.len() <= BOTTOM_RIGHT_VERTEX {
    return Err(GoogleCloudVisionError::MalformedPolygon {
      expected: BOTTOM_RIGHT_VERTEX + 1,
      actual: vertices.len(),
    });
  }

  let (w, h) = (width as f32, height as f32);
  let top_left = vertices[TOP_LEFT_VERTEX];
  let bottom_right = vertices[BOTTOM_RIGHT_VERTEX];

  Ok([
    top_left.x * w,
    top_left.y * h,
    bottom_right.x * w,
    bottom_right.y * h,
  ])
}

pub struct GoogleCloudVision<C> {
  client: C,
}

impl<C: VisionClient> GoogleCloudVision<C> {
  pub fn with_client(client: C) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &C {
    &self.client
  }

  pub fn postprocess(
    annotations: Vec<LocalizedObjectAnnotation>,
    width: usize,
    height: usize,
  ) -> Result<DetectResult, GoogleCloudVisionError> {
    let items = annotations
      .into_iter()
      .map(|annotation| {
        let bbox = bbox_from_normalized_vertices(
          &annotation.bounding_poly.normalized_vertices,
          width,
          height,
        )?;
        Ok(DetectItem {
          name: annotation.name,
          score: annotation.score,
          bbox,
        })
      })
      .collect::<Result<Vec<_>, GoogleCloudVisionError>>()?;

    debug!("检测结果: {:?}", items);
    Ok(DetectResult::from(items))
  }
}

impl<C: VisionClient> Model for GoogleCloudVision<C> {
  type Input = ImageArray;
  type Output = DetectResult;
  type Error = GoogleCloudVisionError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (height, width, _) = input.shape();
    debug!("编码输入图像 {}x{}", width, height);
    let png = input.encode_png()?;

    debug!("请求远程目标定位");
    let annotations = self.client.localize_objects(&png).map_err(|e| {
      error!("远程目标定位失败: {}", e);
      e
    })?;

    let result = Self::postprocess(annotations, width, height)?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

/// 例如 `gvision:///?config=evadb.yml&endpoint=https://vision.googleapis.com&max_results=20`
pub struct GoogleCloudVisionBuilder {
  providers: Option<ProviderChain>,
  config: Option<PathBuf>,
  endpoint: Option<String>,
  max_results: Option<u32>,
}

impl FromUrlWithScheme for GoogleCloudVisionBuilder {
  const SCHEME: &'static str = "gvision";
}

impl FromUrl for GoogleCloudVisionBuilder {
  type Error = GoogleCloudVisionError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GoogleCloudVisionError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = Self::new();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "config" => builder.config = Some(PathBuf::from(value.as_ref())),
        "endpoint" => builder.endpoint = Some(value.to_string()),
        "max_results" => {
          let max_results = value.parse::<u32>().map_err(|_| {
            GoogleCloudVisionError::ModelPathError(format!("max_results 不是有效整数: {}", value))
          })?;
          builder.max_results = Some(max_results);
        }
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl Default for GoogleCloudVisionBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl GoogleCloudVisionBuilder {
  pub fn new() -> Self {
    Self {
      providers: None,
      config: None,
      endpoint: None,
      max_results: None,
    }
  }

  /// 替换默认的凭据来源（配置文件 + 环境变量）
  pub fn providers(mut self, providers: ProviderChain) -> Self {
    self.providers = Some(providers);
    self
  }

  pub fn config(mut self, config: Option<PathBuf>) -> Self {
    self.config = config;
    self
  }

  pub fn endpoint(mut self, endpoint: Option<String>) -> Self {
    self.endpoint = endpoint;
    self
  }

  pub fn max_results(mut self, max_results: Option<u32>) -> Self {
    self.max_results = max_results;
    self
  }

  fn resolve_credentials(&mut self) -> Result<Credentials, GoogleCloudVisionError> {
    let providers = match self.providers.take() {
      Some(providers) => providers,
      None => ProviderChain::standard(self.config.as_deref())?,
    };
    let credentials = Credentials::resolve(&providers).map_err(|e| {
      error!("{}", e);
      e
    })?;
    info!("凭据已解析, 项目: {}", credentials.project_id);
    Ok(credentials)
  }

  /// 先解析凭据，再创建 REST 客户端
  pub fn build(self) -> Result<GoogleCloudVision<RestVisionClient>, GoogleCloudVisionError> {
    let endpoint = self.endpoint.clone();
    let max_results = self.max_results;
    self.build_with(move |credentials| {
      let client = RestVisionClient::new(credentials).with_max_results(max_results);
      match endpoint {
        Some(endpoint) => client.with_endpoint(&endpoint),
        None => client,
      }
    })
  }

  /// 凭据缺失时不会调用 `connect`
  pub fn build_with<C, F>(mut self, connect: F) -> Result<GoogleCloudVision<C>, GoogleCloudVisionError>
  where
    C: VisionClient,
    F: FnOnce(Credentials) -> C,
  {
    let credentials = self.resolve_credentials()?;
    Ok(GoogleCloudVision::with_client(connect(credentials)))
  }
}
