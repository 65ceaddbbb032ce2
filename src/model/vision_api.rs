// 该文件是 Yunjing （云镜） 项目的一部分。
// src/model/vision_api.rs - Google Cloud Vision REST 接口
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

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Credentials;

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com";
pub const OBJECT_LOCALIZATION: &str = "OBJECT_LOCALIZATION";
const ANNOTATE_PATH: &str = "/v1/images:annotate";
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

#[derive(Error, Debug)]
pub enum VisionApiError {
  #[error("HTTP 请求失败: {0}")]
  Http(#[from] reqwest::Error),
  #[error("服务端返回 HTTP {status}: {body}")]
  Status { status: u16, body: String },
  #[error("Vision API 错误 {code}: {message}")]
  Api { code: i32, message: String },
  #[error("响应解析失败: {0}")]
  Json(#[from] serde_json::Error),
  #[error("响应格式错误: {0}")]
  Malformed(String),
}

// ---- 请求 ----

#[derive(Debug, Clone, Serialize)]
pub struct BatchAnnotateImagesRequest {
  pub requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotateImageRequest {
  pub image: RequestImage,
  pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestImage {
  /// base64 编码的图像字节
  pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_results: Option<u32>,
}

impl BatchAnnotateImagesRequest {
  pub fn object_localization(image: &[u8], max_results: Option<u32>) -> Self {
    Self {
      requests: vec![AnnotateImageRequest {
        image: RequestImage {
          content: general_purpose::STANDARD.encode(image),
        },
        features: vec![Feature {
          kind: OBJECT_LOCALIZATION.to_string(),
          max_results,
        }],
      }],
    }
  }
}

// ---- 响应 ----
// proto3 JSON 会省略零值字段，所以几乎所有字段都需要默认值

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchAnnotateImagesResponse {
  #[serde(default)]
  pub responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateImageResponse {
  #[serde(default)]
  pub localized_object_annotations: Vec<LocalizedObjectAnnotation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<ApiStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
  #[serde(default)]
  pub code: i32,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedObjectAnnotation {
  #[serde(default)]
  pub mid: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub language_code: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub score: f32,
  #[serde(default)]
  pub bounding_poly: BoundingPoly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingPoly {
  #[serde(default)]
  pub normalized_vertices: Vec<NormalizedVertex>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVertex {
  #[serde(default)]
  pub x: f32,
  #[serde(default)]
  pub y: f32,
}

impl LocalizedObjectAnnotation {
  /// 由左上角和右下角构造四边形（顺时针，从左上角开始）
  pub fn with_box(name: &str, score: f32, top_left: (f32, f32), bottom_right: (f32, f32)) -> Self {
    let (x1, y1) = top_left;
    let (x2, y2) = bottom_right;
    Self {
      name: name.to_string(),
      score,
      bounding_poly: BoundingPoly {
        normalized_vertices: vec![
          NormalizedVertex { x: x1, y: y1 },
          NormalizedVertex { x: x2, y: y1 },
          NormalizedVertex { x: x2, y: y2 },
          NormalizedVertex { x: x1, y: y2 },
        ],
      },
      ..Default::default()
    }
  }
}

impl BatchAnnotateImagesResponse {
  /// 取出单张图像的检测结果，服务端的逐图错误转为 [`VisionApiError::Api`]
  pub fn into_single(self) -> Result<Vec<LocalizedObjectAnnotation>, VisionApiError> {
    let response = self
      .responses
      .into_iter()
      .next()
      .ok_or_else(|| VisionApiError::Malformed("响应中没有 responses[0]".to_string()))?;

    if let Some(ApiStatus { code, message }) = response.error
      && code != 0
    {
      return Err(VisionApiError::Api { code, message });
    }

    Ok(response.localized_object_annotations)
  }
}

/// 目标定位服务
pub trait VisionClient {
  fn localize_objects(&self, image: &[u8]) -> Result<Vec<LocalizedObjectAnnotation>, VisionApiError>;
}

impl<C: VisionClient + ?Sized> VisionClient for &C {
  fn localize_objects(&self, image: &[u8]) -> Result<Vec<LocalizedObjectAnnotation>, VisionApiError> {
    (**self).localize_objects(image)
  }
}

impl<C: VisionClient + ?Sized> VisionClient for Box<C> {
  fn localize_objects(&self, image: &[u8]) -> Result<Vec<LocalizedObjectAnnotation>, VisionApiError> {
    (**self).localize_objects(image)
  }
}

/// 基于 `images:annotate` REST 接口的阻塞客户端，不设置超时和重试
pub struct RestVisionClient {
  client: reqwest::blocking::Client,
  endpoint: String,
  credentials: Credentials,
  max_results: Option<u32>,
}

impl RestVisionClient {
  pub fn new(credentials: Credentials) -> Self {
    Self {
      client: reqwest::blocking::Client::new(),
      endpoint: DEFAULT_ENDPOINT.to_string(),
      credentials,
      max_results: None,
    }
  }

  pub fn with_endpoint(mut self, endpoint: &str) -> Self {
    self.endpoint = endpoint.trim_end_matches('/').to_string();
    self
  }

  pub fn with_max_results(mut self, max_results: Option<u32>) -> Self {
    self.max_results = max_results;
    self
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  fn annotate_url(&self) -> String {
    format!(
      "{}{}?key={}",
      self.endpoint,
      ANNOTATE_PATH,
      urlencoding::encode(&self.credentials.api_key)
    )
  }
}

impl VisionClient for RestVisionClient {
  fn localize_objects(&self, image: &[u8]) -> Result<Vec<LocalizedObjectAnnotation>, VisionApiError> {
    let body = BatchAnnotateImagesRequest::object_localization(image, self.max_results);
    debug!(
      "提交目标定位请求: {}{}, 图像大小 {} 字节",
      self.endpoint,
      ANNOTATE_PATH,
      image.len()
    );

    let response = self
      .client
      .post(self.annotate_url())
      .header(USER_PROJECT_HEADER, &self.credentials.project_id)
      .json(&body)
      .send()?;

    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
      error!("Vision API 返回 HTTP {}", status);
      return Err(VisionApiError::Status {
        status: status.as_u16(),
        body: text,
      });
    }

    let parsed: BatchAnnotateImagesResponse = serde_json::from_str(&text)?;
    let annotations = parsed.into_single()?;
    debug!("收到 {} 个目标标注", annotations.len());
    Ok(annotations)
  }
}
