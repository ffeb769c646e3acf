use std::collections::HashMap;

use serde_json::Value;

use crate::engine::ExecuteOptions;
use crate::error::{Result, RuleError};

/// 参数绑定器
///
/// 运行期参数键统一大写后，按编译结果要求的输入名裁剪出绑定子集。
/// 两个键大写后冲突时不作保证，后写入者生效。
pub struct ParameterBinder {
    normalized: HashMap<String, Value>,
}

impl ParameterBinder {
    pub fn new(params: &HashMap<String, Value>) -> Self {
        let normalized = params
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.clone()))
            .collect();
        Self { normalized }
    }

    /// 绑定所需输入
    ///
    /// 缺失输入按选项注入默认值，否则报 MissingArguments（缺失集合排序后给出）。
    /// 多余的参数被静默丢弃。
    pub fn bind(
        &self,
        rule: &str,
        inputs: &[String],
        options: &ExecuteOptions,
    ) -> Result<HashMap<String, Value>> {
        let mut missing: Vec<String> = inputs
            .iter()
            .filter(|name| !self.normalized.contains_key(*name))
            .cloned()
            .collect();

        if !missing.is_empty() && !options.set_default_arg {
            missing.sort();
            return Err(RuleError::MissingArguments {
                rule: rule.to_string(),
                missing,
            });
        }

        let mut bindings = HashMap::with_capacity(inputs.len());
        for name in inputs {
            let value = self
                .normalized
                .get(name)
                .cloned()
                .unwrap_or_else(|| options.default_arg.clone());
            bindings.insert(name.clone(), value);
        }
        Ok(bindings)
    }
}
