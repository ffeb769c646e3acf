use serde_json::Value;
use tracing::{debug, error, info, warn};

use verdict_expr::FunctionRegistry;

/// 注册所有内置函数
pub fn register_builtin_functions(registry: &FunctionRegistry) {
    register_log_functions(registry);
    register_text_functions(registry);
    register_math_functions(registry);
}

/// 注册日志函数
fn register_log_functions(registry: &FunctionRegistry) {
    // log(level, message)
    registry.register("log", |args: &[Value]| {
        let level = args.first().and_then(Value::as_str).unwrap_or("info");
        let message = args.get(1).and_then(Value::as_str).unwrap_or_default();
        match level {
            "debug" => debug!("{}", message),
            "info" => info!("{}", message),
            "warn" => warn!("{}", message),
            "error" => error!("{}", message),
            _ => info!("{}", message),
        }
        Ok(Value::Null)
    });

    // debug(message)
    registry.register("debug", |args: &[Value]| {
        debug!("{}", join_display(args));
        Ok(Value::Null)
    });

    // info(message)
    registry.register("info", |args: &[Value]| {
        info!("{}", join_display(args));
        Ok(Value::Null)
    });

    // warn(message)
    registry.register("warn", |args: &[Value]| {
        warn!("{}", join_display(args));
        Ok(Value::Null)
    });

    // error(message)
    registry.register("error", |args: &[Value]| {
        error!("{}", join_display(args));
        Ok(Value::Null)
    });
}

/// 注册文本函数
fn register_text_functions(registry: &FunctionRegistry) {
    // concat(a, b, ...)
    registry.register("concat", |args: &[Value]| {
        let mut out = String::new();
        for arg in args {
            match arg {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        Ok(Value::String(out))
    });
}

/// 注册数值函数
fn register_math_functions(registry: &FunctionRegistry) {
    // round(x, digits?)
    registry.register("round", |args: &[Value]| {
        let x = args
            .first()
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("round expects a number"))?;
        let digits = args.get(1).and_then(Value::as_u64).unwrap_or(0) as i32;
        let factor = 10f64.powi(digits);
        Ok(serde_json::json!((x * factor).round() / factor))
    });
}

fn join_display(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
