//! 从源文件名提取卫星标识与拍摄时间
//!
//! 提取是全函数：无法识别的部分以 `None` 表示，从不返回错误。

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{8}T[0-9]{6}Z").unwrap());

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub const DEFAULT_SATELLITES: [&str; 4] = ["GOES-16", "GOES-17", "GOES-18", "GOES-19"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub satellite: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// 元数据提取器，卫星注册表按顺序匹配
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    satellites: Vec<String>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SATELLITES.iter().map(|s| s.to_string()).collect())
    }
}

impl MetadataExtractor {
    pub fn new(satellites: Vec<String>) -> Self {
        Self { satellites }
    }

    pub fn satellites(&self) -> &[String] {
        &self.satellites
    }

    pub fn extract(&self, filename: &str) -> SceneMetadata {
        SceneMetadata {
            satellite: self.extract_satellite(filename),
            captured_at: extract_timestamp(filename),
        }
    }

    /// 大小写不敏感的包含匹配，返回注册表中的规范写法
    pub fn extract_satellite(&self, filename: &str) -> Option<String> {
        let haystack = filename.to_uppercase();
        self.satellites
            .iter()
            .find(|s| !s.is_empty() && haystack.contains(&s.to_uppercase()))
            .cloned()
    }
}

/// 只看第一个匹配，解析失败时不会继续尝试后续匹配
pub fn extract_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let token = TIMESTAMP_RE.find(filename)?;
    NaiveDateTime::parse_from_str(token.as_str(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
