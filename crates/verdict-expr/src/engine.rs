use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rhai::{Dynamic, EvalAltResult, Scope, AST};
use serde_json::Value;
use tracing::error;

use crate::error::{ExprError, Result};
use crate::evaluator::{CompiledExpression, ExpressionEvaluator};
use crate::normalize::normalize_expression;
use crate::registry::{BusinessFn, FunctionRegistry};

type RhaiFnResult = std::result::Result<Dynamic, Box<EvalAltResult>>;

/// rhai 求值适配器
///
/// 为每个函数表版本构建一个引擎快照；已编译的表达式持有构建时的快照，
/// 之后编译的表达式使用最新快照。
pub struct ExprEngine {
    registry: Arc<FunctionRegistry>,
    // Engine snapshot for the current registry version
    engine: RwLock<Option<(u64, Arc<rhai::Engine>)>>,
    // Cache compiled expressions: source text -> compiled form
    expr_cache: RwLock<HashMap<String, CachedExpr>>,
}

#[derive(Clone)]
struct CachedExpr {
    version: u64,
    engine: Arc<rhai::Engine>,
    ast: AST,
    inputs: Arc<Vec<String>>,
}

impl ExprEngine {
    pub fn new() -> Self {
        Self::with_registry(FunctionRegistry::global())
    }

    pub fn with_registry(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            engine: RwLock::new(None),
            expr_cache: RwLock::new(HashMap::new()),
        }
    }

    fn engine_for(&self, version: u64) -> Arc<rhai::Engine> {
        if let Ok(cached) = self.engine.read() {
            if let Some((v, engine)) = cached.as_ref() {
                if *v == version {
                    return engine.clone();
                }
            }
        }

        let built = Arc::new(self.build_engine());
        match self.engine.write() {
            Ok(mut cached) => *cached = Some((version, built.clone())),
            Err(_) => error!("Failed to acquire write lock for engine cache"),
        }
        built
    }

    fn build_engine(&self) -> rhai::Engine {
        let mut engine = rhai::Engine::new();

        // Safety: limit max operations
        engine.set_max_operations(100_000);

        // Redirect print() to tracing::info!
        engine.on_print(|x| {
            tracing::info!("SCRIPT: {}", x);
        });

        // Built-in clock, named like every other uppercased alias
        engine.register_fn("NOW_MS", || chrono::Utc::now().timestamp_millis());

        for (alias, func) in self.registry.snapshot() {
            register_business_fn(&mut engine, &alias, func);
        }

        engine
    }
}

impl Default for ExprEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for ExprEngine {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpression>> {
        let version = self.registry.version();

        if let Ok(cache) = self.expr_cache.read() {
            if let Some(hit) = cache.get(text) {
                if hit.version == version {
                    return Ok(Box::new(RhaiExpr::from_cached(hit)));
                }
            }
        }

        let normalized = normalize_expression(text);
        let engine = self.engine_for(version);
        let ast = engine
            .compile_expression(&normalized.text)
            .map_err(|e| ExprError::Compile(e.to_string()))?;

        let cached = CachedExpr {
            version,
            engine,
            ast,
            inputs: Arc::new(normalized.inputs),
        };
        match self.expr_cache.write() {
            Ok(mut cache) => {
                cache.insert(text.to_string(), cached.clone());
            }
            Err(_) => error!("Failed to acquire write lock for expression cache"),
        }

        Ok(Box::new(RhaiExpr::from_cached(&cached)))
    }
}

struct RhaiExpr {
    engine: Arc<rhai::Engine>,
    ast: AST,
    inputs: Arc<Vec<String>>,
}

impl std::fmt::Debug for RhaiExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiExpr")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl RhaiExpr {
    fn from_cached(cached: &CachedExpr) -> Self {
        Self {
            engine: cached.engine.clone(),
            ast: cached.ast.clone(),
            inputs: cached.inputs.clone(),
        }
    }
}

impl CompiledExpression for RhaiExpr {
    fn inputs(&self) -> &[String] {
        self.inputs.as_slice()
    }

    fn invoke(&self, bindings: &HashMap<String, Value>) -> Result<Value> {
        let mut scope = Scope::new();
        for (name, value) in bindings {
            let dynamic =
                rhai::serde::to_dynamic(value).map_err(|e| ExprError::Convert(e.to_string()))?;
            scope.push_dynamic(name.clone(), dynamic);
        }

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| ExprError::Eval(e.to_string()))?;

        rhai::serde::from_dynamic::<Value>(&result).map_err(|e| ExprError::Convert(e.to_string()))
    }
}

fn register_business_fn(engine: &mut rhai::Engine, alias: &str, func: BusinessFn) {
    // rhai has no variadic registration; cover arities 0 through 6 with
    // Dynamic parameters so one BusinessFn answers them all.
    let f = func.clone();
    engine.register_fn(alias, move || -> RhaiFnResult { call_business_fn(&f, vec![]) });
    let f = func.clone();
    engine.register_fn(alias, move |a: Dynamic| -> RhaiFnResult {
        call_business_fn(&f, vec![a])
    });
    let f = func.clone();
    engine.register_fn(alias, move |a: Dynamic, b: Dynamic| -> RhaiFnResult {
        call_business_fn(&f, vec![a, b])
    });
    let f = func.clone();
    engine.register_fn(alias, move |a: Dynamic, b: Dynamic, c: Dynamic| -> RhaiFnResult {
        call_business_fn(&f, vec![a, b, c])
    });
    let f = func.clone();
    engine.register_fn(
        alias,
        move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| -> RhaiFnResult {
            call_business_fn(&f, vec![a, b, c, d])
        },
    );
    let f = func.clone();
    engine.register_fn(
        alias,
        move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic| -> RhaiFnResult {
            call_business_fn(&f, vec![a, b, c, d, e])
        },
    );
    let f = func;
    engine.register_fn(
        alias,
        move |a: Dynamic,
              b: Dynamic,
              c: Dynamic,
              d: Dynamic,
              e: Dynamic,
              g: Dynamic|
              -> RhaiFnResult { call_business_fn(&f, vec![a, b, c, d, e, g]) },
    );
}

fn call_business_fn(func: &BusinessFn, args: Vec<Dynamic>) -> RhaiFnResult {
    let mut values = Vec::with_capacity(args.len());
    for arg in &args {
        values.push(rhai::serde::from_dynamic::<Value>(arg)?);
    }
    let rvalue = func(&values).map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;
    rhai::serde::to_dynamic(rvalue)
}
