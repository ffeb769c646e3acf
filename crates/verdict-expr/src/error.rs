use thiserror::Error;

/// 表达式层统一错误类型
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Eval error: {0}")]
    Eval(String),

    #[error("Value conversion error: {0}")]
    Convert(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ExprError>;
