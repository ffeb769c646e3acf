use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use verdict_expr::{CompiledExpression, ExprEngine, ExpressionEvaluator, FunctionRegistry};

use crate::binder::ParameterBinder;
use crate::dispatch::ActionDispatcher;
use crate::error::{Result, RuleError};
use crate::model::{Rule, RuleSet, RuleStatus};
use crate::parser;

/// 执行选项
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// 首个触发后停止迭代
    pub stop_on_first_trigger: bool,

    /// 缺失参数时注入默认值而不是报错
    pub set_default_arg: bool,

    /// 注入的默认值
    pub default_arg: Value,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            stop_on_first_trigger: true,
            set_default_arg: false,
            default_arg: Value::Null,
        }
    }
}

/// 规则执行引擎
///
/// 持有规则集合与表达式求值器，按插入顺序评估规则并应用触发策略。
pub struct RuleEngine {
    rules: RuleSet,
    evaluator: Arc<dyn ExpressionEvaluator>,
    require_bool: bool,
}

impl RuleEngine {
    /// 默认引擎：rhai 适配器 + 进程级函数表
    pub fn new() -> Self {
        Self::with_evaluator(Arc::new(ExprEngine::new()))
    }

    pub fn with_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            rules: RuleSet::new(),
            evaluator,
            require_bool: true,
        }
    }

    pub fn from_rules(rules: RuleSet, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            rules,
            evaluator,
            require_bool: true,
        }
    }

    /// 条件是否必须返回布尔值；关闭后按真值性判定
    pub fn require_bool(mut self, require: bool) -> Self {
        self.require_bool = require;
        self
    }

    /// 注册业务函数到进程级函数表
    pub fn register_function<F>(name: &str, func: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        FunctionRegistry::global().register(name, func);
    }

    /// 解析规则文本，累积到既有规则集
    pub fn parse_str(&mut self, text: &str) -> Result<()> {
        parser::parse_into(&mut self.rules, text)
    }

    /// 以程序方式插入单条规则
    pub fn add_rule(
        &mut self,
        name: impl Into<String>,
        condition: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<()> {
        parser::add_rule(&mut self.rules, name, condition, action)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// 按插入顺序迭代规则（用于检查执行后的状态）
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// 以默认选项执行全部规则
    pub fn execute(&mut self, params: &HashMap<String, Value>) -> Result<bool> {
        self.execute_with(params, &ExecuteOptions::default())
    }

    /// 按插入顺序执行全部规则
    ///
    /// 任一编译、绑定或求值失败立即中止本次调用，已评估的规则保留状态。
    /// 返回 true 当且仅当至少一条规则触发。
    pub fn execute_with(
        &mut self,
        params: &HashMap<String, Value>,
        options: &ExecuteOptions,
    ) -> Result<bool> {
        let binder = ParameterBinder::new(params);
        let evaluator = self.evaluator.clone();
        let require_bool = self.require_bool;
        let mut any_triggered = false;

        for rule in self.rules.iter_mut() {
            let (condition_value, action_value) =
                evaluate_rule(evaluator.as_ref(), rule, &binder, options, require_bool)?;
            debug!(rule_name = %rule.name, condition = %condition_value, "Condition evaluated");

            if rule.triggered() {
                any_triggered = true;
                let result_value = action_value.clone().unwrap_or(Value::Null);
                info!(
                    rule_name = %rule.name,
                    result = %result_value,
                    "Rule triggered"
                );
                if options.stop_on_first_trigger {
                    debug!("Stop on first trigger");
                    break;
                }
            }
        }

        Ok(any_triggered)
    }

    /// 评估单条规则，返回（条件值，动作值）
    pub fn execute_rule(
        &mut self,
        name: &str,
        params: &HashMap<String, Value>,
        options: &ExecuteOptions,
    ) -> Result<(Value, Option<Value>)> {
        let binder = ParameterBinder::new(params);
        let evaluator = self.evaluator.clone();
        let require_bool = self.require_bool;
        let rule = self
            .rules
            .get_mut(name)
            .ok_or_else(|| RuleError::RuleNotFound(name.to_string()))?;
        evaluate_rule(evaluator.as_ref(), rule, &binder, options, require_bool)
    }

    /// 并发派发模式
    ///
    /// 条件仍按插入顺序串行评估；触发规则的动作行被拆成 `name(args)` 调用单元，
    /// 由派发器并发执行（见 dispatch 模块）。
    pub async fn execute_concurrent(
        &mut self,
        params: &HashMap<String, Value>,
        options: &ExecuteOptions,
        dispatcher: &ActionDispatcher,
    ) -> Result<bool> {
        let binder = ParameterBinder::new(params);
        let evaluator = self.evaluator.clone();
        let require_bool = self.require_bool;
        let mut any_triggered = false;

        for rule in self.rules.iter_mut() {
            let condition_value = evaluate_text(
                evaluator.as_ref(),
                &rule.name,
                &rule.condition_text(),
                &binder,
                options,
            )?;
            let triggered = condition_holds(&rule.name, &condition_value, require_bool)?;
            rule.status = if triggered {
                RuleStatus::Triggered
            } else {
                RuleStatus::NotTriggered
            };

            if triggered {
                any_triggered = true;
                let results = dispatcher.dispatch_rule(rule, params).await?;
                info!(
                    rule_name = %rule.name,
                    results = results.len(),
                    "Rule triggered (concurrent dispatch)"
                );
                if options.stop_on_first_trigger {
                    break;
                }
            }
        }

        Ok(any_triggered)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

// 编译 → 绑定 → 求值；条件成立时再评估动作
fn evaluate_rule(
    evaluator: &dyn ExpressionEvaluator,
    rule: &mut Rule,
    binder: &ParameterBinder,
    options: &ExecuteOptions,
    require_bool: bool,
) -> Result<(Value, Option<Value>)> {
    let condition_value = evaluate_text(
        evaluator,
        &rule.name,
        &rule.condition_text(),
        binder,
        options,
    )?;
    let triggered = condition_holds(&rule.name, &condition_value, require_bool)?;
    rule.status = if triggered {
        RuleStatus::Triggered
    } else {
        RuleStatus::NotTriggered
    };

    if !triggered {
        return Ok((condition_value, None));
    }

    let action_value = evaluate_text(
        evaluator,
        &rule.name,
        &rule.action_text(),
        binder,
        options,
    )?;
    Ok((condition_value, Some(action_value)))
}

fn evaluate_text(
    evaluator: &dyn ExpressionEvaluator,
    rule_name: &str,
    text: &str,
    binder: &ParameterBinder,
    options: &ExecuteOptions,
) -> Result<Value> {
    let text = apply_marker(evaluator, text);
    let compiled = evaluator.compile(&text)?;
    let bindings = binder.bind(rule_name, compiled.inputs(), options)?;
    Ok(compiled.invoke(&bindings)?)
}

// 缺少求值器要求的表达式前缀时补上
fn apply_marker(evaluator: &dyn ExpressionEvaluator, text: &str) -> String {
    match evaluator.expression_marker() {
        Some(marker) if !text.starts_with(marker) => format!("{}{}", marker, text),
        _ => text.to_string(),
    }
}

fn condition_holds(rule_name: &str, value: &Value, require_bool: bool) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other if require_bool => Err(RuleError::ConditionReturnValue {
            rule: rule_name.to_string(),
            value: other.clone(),
        }),
        other => Ok(truthy(other)),
    }
}

// 真值性沿用原始语义：false/0/空串/空集合/null 为假
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
