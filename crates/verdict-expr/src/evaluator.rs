use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// 表达式求值器契约
///
/// 规则引擎只依赖这个 trait：编译表达式文本，得到所需输入名，再以绑定值求值。
/// 具体语法完全由实现方决定。
pub trait ExpressionEvaluator: Send + Sync {
    /// Marker prefix required by the evaluator's syntax, if any.
    /// A spreadsheet-style evaluator returns `Some("=")`; callers prepend it
    /// to expression text that lacks it before compiling.
    fn expression_marker(&self) -> Option<&'static str> {
        None
    }

    /// Compile expression text into an invokable form.
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpression>>;
}

/// A compiled expression exposing its required inputs.
pub trait CompiledExpression: Send + Sync + std::fmt::Debug {
    /// Required input names: uppercased, deduplicated, in first-appearance order.
    fn inputs(&self) -> &[String];

    /// Evaluate against bound values. Bindings are keyed by the uppercased
    /// input names reported by `inputs`.
    fn invoke(&self, bindings: &HashMap<String, Value>) -> Result<Value>;
}
