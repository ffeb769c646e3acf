pub mod binder;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod functions;
pub mod model;
pub mod parser;

pub use binder::ParameterBinder;
pub use dispatch::{parse_action_calls, ActionCall, ActionDispatcher};
pub use engine::{ExecuteOptions, RuleEngine};
pub use error::{Result, RuleError};
pub use functions::register_builtin_functions;
pub use model::{Rule, RuleSet, RuleStatus};
pub use parser::RuleParser;

pub use verdict_expr::{
    CompiledExpression, ExprEngine, ExpressionEvaluator, FunctionRegistry,
};
