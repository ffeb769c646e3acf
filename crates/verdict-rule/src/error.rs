use thiserror::Error;
use verdict_expr::ExprError;

/// 规则层统一错误类型
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Duplicate rule name: {0}")]
    DuplicateRuleName(String),

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Rule '{rule}' is missing arguments: {missing:?}")]
    MissingArguments { rule: String, missing: Vec<String> },

    #[error("Condition of rule '{rule}' returned non-boolean value: {value}")]
    ConditionReturnValue {
        rule: String,
        value: serde_json::Value,
    },

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Malformed action call: {0}")]
    MalformedCall(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Dispatch timeout after {0:?}")]
    DispatchTimeout(std::time::Duration),

    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, RuleError>;
