use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, error};

/// 注册进函数表的业务函数
pub type BusinessFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

static GLOBAL: Lazy<Arc<FunctionRegistry>> = Lazy::new(|| Arc::new(FunctionRegistry::new()));

/// 业务函数表
///
/// 别名统一大写存储；重复注册覆盖旧值（最后注册生效）。每次注册递增版本号，
/// 求值适配器据此重建引擎快照，使之后编译的表达式看到最新函数，
/// 已编译的表达式保留编译时的快照。
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, BusinessFn>>,
    version: AtomicU64,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
        }
    }

    /// 进程级共享实例
    pub fn global() -> Arc<FunctionRegistry> {
        GLOBAL.clone()
    }

    /// 注册业务函数，别名大小写不敏感
    pub fn register<F>(&self, name: &str, func: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let alias = name.to_uppercase();
        match self.functions.write() {
            Ok(mut functions) => {
                functions.insert(alias.clone(), Arc::new(func));
                self.version.fetch_add(1, Ordering::SeqCst);
                debug!(alias = %alias, "Function registered");
            }
            Err(_) => {
                error!("Failed to acquire write lock for register");
            }
        }
    }

    /// 按别名查找（大小写不敏感）
    pub fn get(&self, name: &str) -> Option<BusinessFn> {
        match self.functions.read() {
            Ok(functions) => functions.get(&name.to_uppercase()).cloned(),
            Err(_) => {
                error!("Failed to acquire read lock for get");
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 当前版本号，随每次注册递增
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// 当前全部注册项的快照
    pub fn snapshot(&self) -> Vec<(String, BusinessFn)> {
        match self.functions.read() {
            Ok(functions) => functions
                .iter()
                .map(|(alias, func)| (alias.clone(), func.clone()))
                .collect(),
            Err(_) => {
                error!("Failed to acquire read lock for snapshot");
                Vec::new()
            }
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_get() {
        let registry = FunctionRegistry::new();
        registry.register("order_more", |args: &[Value]| Ok(json!(args.len())));

        assert!(registry.contains("ORDER_MORE"));
        assert!(registry.contains("order_more"));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_reregister_overwrites() {
        let registry = FunctionRegistry::new();
        registry.register("f", |_: &[Value]| Ok(json!("first")));
        registry.register("F", |_: &[Value]| Ok(json!("second")));

        let func = registry.get("f").unwrap();
        assert_eq!(func(&[]).unwrap(), json!("second"));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_version_bumps_on_register() {
        let registry = FunctionRegistry::new();
        let before = registry.version();
        registry.register("f", |_: &[Value]| Ok(json!(1)));
        registry.register("g", |_: &[Value]| Ok(json!(2)));
        assert_eq!(registry.version(), before + 2);
    }
}
