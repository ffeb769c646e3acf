use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use verdict_expr::{BusinessFn, FunctionRegistry};

use crate::error::{Result, RuleError};
use crate::model::Rule;

/// 动作调用单元：`name(args)` 形式，不支持嵌套调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    /// 函数名（大写）
    pub name: String,

    /// 原始参数文本
    pub raw_args: String,
}

/// 把动作行按括号拆成调用单元
pub fn parse_action_calls(line: &str) -> Result<Vec<ActionCall>> {
    let mut calls = Vec::new();
    let mut rest = line;

    while let Some(open) = rest.find('(') {
        let head = rest[..open].trim();
        let name = head
            .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .next()
            .unwrap_or("");
        if name.is_empty() {
            return Err(RuleError::MalformedCall(line.to_string()));
        }

        let close = match rest[open + 1..].find(')') {
            Some(i) => open + 1 + i,
            None => return Err(RuleError::MalformedCall(line.to_string())),
        };

        calls.push(ActionCall {
            name: name.to_uppercase(),
            raw_args: rest[open + 1..close].trim().to_string(),
        });
        rest = &rest[close + 1..];
    }

    if calls.is_empty() {
        return Err(RuleError::MalformedCall(line.to_string()));
    }
    Ok(calls)
}

// 参数文本：JSON 标量、单引号字符串，或大小写不敏感的参数引用
fn parse_args(raw: &str, rule: &str, params: &HashMap<String, Value>) -> Result<Vec<Value>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    for piece in raw.split(',') {
        let piece = piece.trim();
        if let Ok(value) = serde_json::from_str::<Value>(piece) {
            args.push(value);
        } else if piece.len() >= 2 && piece.starts_with('\'') && piece.ends_with('\'') {
            args.push(Value::String(piece[1..piece.len() - 1].to_string()));
        } else if let Some(value) = params.get(&piece.to_uppercase()) {
            args.push(value.clone());
        } else {
            return Err(RuleError::MissingArguments {
                rule: rule.to_string(),
                missing: vec![piece.to_uppercase()],
            });
        }
    }
    Ok(args)
}

/// 并发动作派发器
///
/// 同一条触发规则的动作调用并发执行；规则之间仍按插入顺序串行。
/// 失败策略为快速失败：第一个出错的调用使整个动作步骤失败，
/// 其余兄弟任务被中止，部分结果不对外暴露。
pub struct ActionDispatcher {
    registry: Arc<FunctionRegistry>,
    timeout: Option<Duration>,
}

impl ActionDispatcher {
    /// 使用进程级函数表
    pub fn new() -> Self {
        Self::with_registry(FunctionRegistry::global())
    }

    pub fn with_registry(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// 为单条规则的动作步骤设置显式超时（默认不限时）
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 并发执行一条规则的全部动作调用，按派发顺序返回结果
    pub async fn dispatch_rule(
        &self,
        rule: &Rule,
        params: &HashMap<String, Value>,
    ) -> Result<Vec<Value>> {
        let normalized: HashMap<String, Value> = params
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.clone()))
            .collect();

        // 先解析全部调用并解析函数名，任何任务启动前发现未知函数即报错
        let mut units: Vec<(BusinessFn, Vec<Value>)> = Vec::new();
        for line in &rule.actions {
            for call in parse_action_calls(line)? {
                let func = self
                    .registry
                    .get(&call.name)
                    .ok_or_else(|| RuleError::UnknownFunction(call.name.clone()))?;
                let args = parse_args(&call.raw_args, &rule.name, &normalized)?;
                units.push((func, args));
            }
        }

        debug!(rule_name = %rule.name, calls = units.len(), "Dispatching action calls");

        let total = units.len();
        let mut set = JoinSet::new();
        for (idx, (func, args)) in units.into_iter().enumerate() {
            set.spawn_blocking(move || {
                let result = func(&args);
                (idx, result)
            });
        }

        let join_all = async {
            let mut results: Vec<Option<Value>> = vec![None; total];
            while let Some(joined) = set.join_next().await {
                let (idx, result) = joined.map_err(|e| RuleError::Dispatch(e.to_string()))?;
                match result {
                    Ok(value) => results[idx] = Some(value),
                    Err(e) => {
                        warn!(rule_name = %rule.name, error = %e, "Action call failed, aborting siblings");
                        return Err(RuleError::Dispatch(e.to_string()));
                    }
                }
            }
            Ok(results
                .into_iter()
                .map(|r| r.unwrap_or(Value::Null))
                .collect::<Vec<_>>())
        };

        let results = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, join_all)
                .await
                .map_err(|_| RuleError::DispatchTimeout(limit))??,
            None => join_all.await?,
        };

        info!(rule_name = %rule.name, results = results.len(), "Action calls completed");
        Ok(results)
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn triggered_rule(actions: &[&str]) -> Rule {
        let mut rule = Rule::new("r");
        rule.actions = actions.iter().map(|s| s.to_string()).collect();
        rule
    }

    #[test]
    fn test_parse_action_calls_splits_on_parens() {
        let calls = parse_action_calls("order_more(50) notify('ops')").unwrap();
        assert_eq!(
            calls,
            vec![
                ActionCall {
                    name: "ORDER_MORE".to_string(),
                    raw_args: "50".to_string(),
                },
                ActionCall {
                    name: "NOTIFY".to_string(),
                    raw_args: "'ops'".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_action_calls_rejects_garbage() {
        assert!(parse_action_calls("no call here").is_err());
        assert!(parse_action_calls("(50)").is_err());
        assert!(parse_action_calls("broken(50").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_preserves_call_order() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("double", |args: &[Value]| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * 2))
        });
        let dispatcher = ActionDispatcher::with_registry(registry);

        let rule = triggered_rule(&["double(2) double(21)", "double(100)"]);
        let results = dispatcher.dispatch_rule(&rule, &HashMap::new()).await.unwrap();
        assert_eq!(results, vec![json!(4), json!(42), json!(200)]);
    }

    #[tokio::test]
    async fn test_dispatch_resolves_parameter_references() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("double", |args: &[Value]| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * 2))
        });
        let dispatcher = ActionDispatcher::with_registry(registry);

        let mut params = HashMap::new();
        params.insert("products_in_stock".to_string(), json!(10));

        let rule = triggered_rule(&["double(products_in_stock)"]);
        let results = dispatcher.dispatch_rule(&rule, &params).await.unwrap();
        assert_eq!(results, vec![json!(20)]);
    }

    #[tokio::test]
    async fn test_dispatch_string_and_literal_args() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("tag", |args: &[Value]| {
            let label = args.first().and_then(Value::as_str).unwrap_or("?");
            let n = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(format!("{label}:{n}")))
        });
        let dispatcher = ActionDispatcher::with_registry(registry);

        let rule = triggered_rule(&["tag('ops', 3) tag(\"audit\", 4)"]);
        let results = dispatcher.dispatch_rule(&rule, &HashMap::new()).await.unwrap();
        assert_eq!(results, vec![json!("ops:3"), json!("audit:4")]);
    }

    #[tokio::test]
    async fn test_unknown_function_fails_before_spawning() {
        let dispatcher = ActionDispatcher::with_registry(Arc::new(FunctionRegistry::new()));
        let rule = triggered_rule(&["missing(1)"]);

        let err = dispatcher
            .dispatch_rule(&rule, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownFunction(name) if name == "MISSING"));
    }

    #[tokio::test]
    async fn test_dispatch_fails_fast_without_partial_results() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("ok", |_: &[Value]| Ok(json!("fine")));
        registry.register("explode", |_: &[Value]| Err(anyhow::anyhow!("boom")));
        let dispatcher = ActionDispatcher::with_registry(registry);

        let rule = triggered_rule(&["ok() explode() ok()"]);
        let err = dispatcher
            .dispatch_rule(&rule, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Dispatch(message) if message.contains("boom")));
    }

    #[tokio::test]
    async fn test_unresolvable_argument_reports_missing() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("double", |_: &[Value]| Ok(json!(0)));
        let dispatcher = ActionDispatcher::with_registry(registry);

        let rule = triggered_rule(&["double(absent_param)"]);
        let err = dispatcher
            .dispatch_rule(&rule, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuleError::MissingArguments { missing, .. } if missing == vec!["ABSENT_PARAM"]
        ));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_is_explicit() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register("slow", |_: &[Value]| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(json!("done"))
        });
        let dispatcher =
            ActionDispatcher::with_registry(registry).timeout(Duration::from_millis(20));

        let rule = triggered_rule(&["slow()"]);
        let err = dispatcher
            .dispatch_rule(&rule, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::DispatchTimeout(_)));
    }
}
