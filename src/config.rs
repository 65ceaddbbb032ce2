// 该文件是 Yunjing （云镜） 项目的一部分。
// src/config.rs - 凭据与配置解析
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
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

pub const THIRD_PARTY_SECTION: &str = "third_party";
pub const API_KEY_NAME: &str = "GOOGLE_CLOUD_API_KEY";
pub const PROJECT_ID_NAME: &str = "GOOGLE_CLOUD_PROJECT_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("配置文件解析错误: {0}: {1}")]
  Parse(PathBuf, serde_yaml::Error),
  #[error(
    "缺少凭据 {missing:?}: 请在配置文件 ({section}, <KEY>) 中设置，或设置同名环境变量"
  )]
  MissingCredential {
    section: &'static str,
    missing: Vec<&'static str>,
  },
}

/// 凭据查找源，按 (节, 键) 返回非空值
pub trait CredentialProvider {
  fn lookup(&self, section: &str, key: &str) -> Option<String>;
}

/// YAML 配置文件，形如
///
/// ```yaml
/// third_party:
///   GOOGLE_CLOUD_API_KEY: "..."
///   GOOGLE_CLOUD_PROJECT_ID: "..."
/// ```
#[derive(Debug, Default, Clone)]
pub struct YamlConfigProvider {
  root: serde_yaml::Value,
}

impl YamlConfigProvider {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let content =
      std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    content
      .parse()
      .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
  }
}

impl FromStr for YamlConfigProvider {
  type Err = serde_yaml::Error;

  fn from_str(content: &str) -> Result<Self, Self::Err> {
    // 空文件视为没有任何配置
    if content.trim().is_empty() {
      return Ok(Self::default());
    }
    let root = serde_yaml::from_str(content)?;
    Ok(Self { root })
  }
}

impl CredentialProvider for YamlConfigProvider {
  fn lookup(&self, section: &str, key: &str) -> Option<String> {
    let value = self.root.get(section)?.get(key)?;
    let text = match value {
      serde_yaml::Value::String(s) => s.clone(),
      serde_yaml::Value::Number(n) => n.to_string(),
      _ => return None,
    };
    non_empty(text)
  }
}

/// 进程环境变量，忽略节名
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvProvider;

impl CredentialProvider for EnvProvider {
  fn lookup(&self, _section: &str, key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(non_empty)
  }
}

/// 固定键值表，主要用于测试和嵌入调用
#[derive(Debug, Default, Clone)]
pub struct MapProvider {
  values: HashMap<String, String>,
}

impl MapProvider {
  pub fn with(mut self, key: &str, value: &str) -> Self {
    self.values.insert(key.to_string(), value.to_string());
    self
  }
}

impl CredentialProvider for MapProvider {
  fn lookup(&self, _section: &str, key: &str) -> Option<String> {
    self.values.get(key).cloned().and_then(non_empty)
  }
}

fn non_empty(value: String) -> Option<String> {
  if value.trim().is_empty() {
    None
  } else {
    Some(value)
  }
}

/// 按顺序查询各个来源，第一个非空值胜出
#[derive(Default)]
pub struct ProviderChain {
  providers: Vec<Box<dyn CredentialProvider + Send + Sync>>,
}

impl ProviderChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_provider(mut self, provider: impl CredentialProvider + Send + Sync + 'static) -> Self {
    self.providers.push(Box::new(provider));
    self
  }

  /// 配置文件（可选）优先，其次是环境变量
  pub fn standard(config: Option<&Path>) -> Result<Self, ConfigError> {
    let mut chain = Self::new();
    if let Some(path) = config {
      chain = chain.with_provider(YamlConfigProvider::from_file(path)?);
    }
    Ok(chain.with_provider(EnvProvider))
  }

  pub fn len(&self) -> usize {
    self.providers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.providers.is_empty()
  }
}

impl CredentialProvider for ProviderChain {
  fn lookup(&self, section: &str, key: &str) -> Option<String> {
    self
      .providers
      .iter()
      .enumerate()
      .find_map(|(idx, provider)| {
        let value = provider.lookup(section, key);
        if value.is_some() {
          debug!("凭据 {} 由第 {} 个来源提供", key, idx);
        }
        value
      })
  }
}

/// Google Cloud 凭据
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub api_key: String,
  pub project_id: String,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("api_key", &"<redacted>")
      .field("project_id", &self.project_id)
      .finish()
  }
}

impl Credentials {
  pub fn resolve(provider: &impl CredentialProvider) -> Result<Self, ConfigError> {
    let api_key = provider.lookup(THIRD_PARTY_SECTION, API_KEY_NAME);
    let project_id = provider.lookup(THIRD_PARTY_SECTION, PROJECT_ID_NAME);

    match (api_key, project_id) {
      (Some(api_key), Some(project_id)) => Ok(Self {
        api_key,
        project_id,
      }),
      (api_key, project_id) => {
        let mut missing = Vec::new();
        if api_key.is_none() {
          missing.push(API_KEY_NAME);
        }
        if project_id.is_none() {
          missing.push(PROJECT_ID_NAME);
        }
        Err(ConfigError::MissingCredential {
          section: THIRD_PARTY_SECTION,
          missing,
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const YAML: &str = r#"
core:
  catalog: evadb.db
third_party:
  GOOGLE_CLOUD_API_KEY: "file-key"
  GOOGLE_CLOUD_PROJECT_ID: ""
"#;

  #[test]
  fn yaml_lookup_reads_third_party_section() {
    let provider = YAML.parse::<YamlConfigProvider>().unwrap();
    assert_eq!(
      provider.lookup(THIRD_PARTY_SECTION, API_KEY_NAME).as_deref(),
      Some("file-key")
    );
    // 空字符串视为未设置
    assert_eq!(provider.lookup(THIRD_PARTY_SECTION, PROJECT_ID_NAME), None);
    assert_eq!(provider.lookup("core", API_KEY_NAME), None);
  }

  #[test]
  fn yaml_tolerates_empty_documents_and_sections() {
    let provider = "".parse::<YamlConfigProvider>().unwrap();
    assert_eq!(provider.lookup(THIRD_PARTY_SECTION, API_KEY_NAME), None);
    let provider = "third_party:\n".parse::<YamlConfigProvider>().unwrap();
    assert_eq!(provider.lookup(THIRD_PARTY_SECTION, API_KEY_NAME), None);
  }

  #[test]
  fn chain_falls_through_to_later_provider() {
    let chain = ProviderChain::new()
      .with_provider(YAML.parse::<YamlConfigProvider>().unwrap())
      .with_provider(MapProvider::default().with(PROJECT_ID_NAME, "env-project"));

    let credentials = Credentials::resolve(&chain).unwrap();
    assert_eq!(credentials.api_key, "file-key");
    assert_eq!(credentials.project_id, "env-project");
  }

  #[test]
  fn chain_prefers_first_provider() {
    let chain = ProviderChain::new()
      .with_provider(MapProvider::default().with(API_KEY_NAME, "first"))
      .with_provider(MapProvider::default().with(API_KEY_NAME, "second"));
    assert_eq!(
      chain.lookup(THIRD_PARTY_SECTION, API_KEY_NAME).as_deref(),
      Some("first")
    );
  }

  #[test]
  fn missing_credentials_are_all_reported() {
    let err = Credentials::resolve(&ProviderChain::new()).unwrap_err();
    match err {
      ConfigError::MissingCredential { missing, .. } => {
        assert_eq!(missing, vec![API_KEY_NAME, PROJECT_ID_NAME]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn debug_output_hides_api_key() {
    let credentials = Credentials {
      api_key: "secret".into(),
      project_id: "proj".into(),
    };
    let text = format!("{credentials:?}");
    assert!(!text.contains("secret"));
    assert!(text.contains("proj"));
  }

  #[test]
  fn standard_chain_reads_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(YAML.as_bytes()).unwrap();
    let chain = ProviderChain::standard(Some(file.path())).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(
      chain.lookup(THIRD_PARTY_SECTION, API_KEY_NAME).as_deref(),
      Some("file-key")
    );
  }

  #[test]
  fn standard_chain_rejects_missing_file() {
    let err = ProviderChain::standard(Some(Path::new("/nonexistent/evadb.yml")));
    assert!(matches!(err, Err(ConfigError::Io(_, _))));
  }

  #[test]
  fn standard_chain_falls_back_to_environment() {
    // 本模块中只有这个测试修改这两个环境变量
    unsafe {
      std::env::set_var(API_KEY_NAME, "env-key");
      std::env::set_var(PROJECT_ID_NAME, "env-project");
    }

    let from_env = Credentials::resolve(&ProviderChain::standard(None).unwrap());

    // 配置文件中的非空值优先，空值回落到环境变量
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(YAML.as_bytes()).unwrap();
    let mixed = Credentials::resolve(&ProviderChain::standard(Some(file.path())).unwrap());

    unsafe {
      std::env::remove_var(API_KEY_NAME);
      std::env::remove_var(PROJECT_ID_NAME);
    }

    let from_env = from_env.unwrap();
    assert_eq!(from_env.api_key, "env-key");
    assert_eq!(from_env.project_id, "env-project");

    let mixed = mixed.unwrap();
    assert_eq!(mixed.api_key, "file-key");
    assert_eq!(mixed.project_id, "env-project");
  }
}
