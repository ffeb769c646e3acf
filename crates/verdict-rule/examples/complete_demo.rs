use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use verdict_rule::{
    register_builtin_functions, ActionDispatcher, ExecuteOptions, FunctionRegistry, RuleEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 verdict - 业务规则引擎完整演示\n");

    register_builtin_functions(&FunctionRegistry::global());
    RuleEngine::register_function("order_more", |args: &[Value]| {
        let n = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(format!("you ordered {} new items", n)))
    });
    RuleEngine::register_function("notify", |args: &[Value]| {
        let channel = args.first().and_then(Value::as_str).unwrap_or("ops");
        println!("   -> 通知渠道 {}", channel);
        Ok(Value::Null)
    });

    println!("{}", "=".repeat(60));
    println!("示例 1: 解析并执行规则文本");
    println!("{}", "=".repeat(60));

    let mut engine = RuleEngine::new();
    engine.parse_str(
        r#"
rule "order new items"
when
    products_in_stock < 20
then
    order_more(50)
end

rule "stock is healthy"
when
    products_in_stock >= 20
then
    log("info", "no reorder needed")
end
"#,
    )?;

    let mut params = HashMap::new();
    params.insert("products_in_stock".to_string(), json!(10));

    let triggered = engine.execute(&params)?;
    println!("✅ 触发: {}", triggered);
    for rule in engine.iter() {
        println!("   {} -> {:?}", rule.name, rule.status);
    }

    println!("\n{}", "=".repeat(60));
    println!("示例 2: 缺失参数与默认值");
    println!("{}", "=".repeat(60));

    let empty = HashMap::new();
    match engine.execute(&empty) {
        Err(e) => println!("✅ 预期错误: {}", e),
        Ok(_) => println!("⚠️ 不应该成功"),
    }

    let options = ExecuteOptions {
        set_default_arg: true,
        default_arg: json!(0),
        ..Default::default()
    };
    let triggered = engine.execute_with(&empty, &options)?;
    println!("✅ 注入默认值后触发: {}", triggered);

    println!("\n{}", "=".repeat(60));
    println!("示例 3: 并发动作派发");
    println!("{}", "=".repeat(60));

    let mut engine = RuleEngine::new();
    engine.add_rule(
        "restock and notify",
        "products_in_stock < 20",
        "order_more(50) notify('ops')",
    )?;

    let dispatcher = ActionDispatcher::new().timeout(Duration::from_secs(5));
    let triggered = engine
        .execute_concurrent(&params, &ExecuteOptions::default(), &dispatcher)
        .await?;
    println!("✅ 并发派发触发: {}", triggered);

    Ok(())
}
