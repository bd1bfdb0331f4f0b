use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// 解码前的类型名过滤器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 反序列化任意类型名是经典的远程代码执行入口；必须在实例化任何值之前，
///   仅凭类型名做出放行判断。
///
/// ## 契约（What）
/// - 拒绝列表优先：命中 `deny` 的类型名一律拒绝；
/// - `allow` 非空时是排他的：只有命中 `allow` 的类型名被放行；为空时放行所有未被拒绝的类型；
/// - 模式以 `*` 结尾表示前缀匹配（`com.example.*` 匹配 `com.example.User`），否则为精确匹配。
///
/// ## 注意事项（Trade-offs）
/// - 匹配为线性扫描，列表规模预期在百条以内。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl TypeFilter {
    /// 放行所有类型的过滤器。
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.allow.push(pattern.into());
        self
    }

    pub fn deny(mut self, pattern: impl Into<String>) -> Self {
        self.deny.push(pattern.into());
        self
    }

    /// 类型名是否被放行。
    pub fn permits(&self, type_name: &str) -> bool {
        if self.deny.iter().any(|pattern| matches(pattern, type_name)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|pattern| matches(pattern, type_name))
    }

    /// 放行时返回 `Ok`，否则返回 [`CodecError::Denied`]。
    pub fn check(&self, type_name: &str) -> Result<(), CodecError> {
        if self.permits(type_name) {
            Ok(())
        } else {
            Err(CodecError::Denied {
                type_name: type_name.to_owned(),
            })
        }
    }
}

fn matches(pattern: &str, type_name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => type_name.starts_with(prefix),
        None => pattern == type_name,
    }
}
