use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, RuleError};

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// 规则名称（集合内唯一，大小写敏感）
    pub name: String,

    /// 条件表达式行
    pub conditions: Vec<String>,

    /// 动作表达式行
    pub actions: Vec<String>,

    /// 触发状态
    pub status: RuleStatus,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            actions: Vec::new(),
            status: RuleStatus::Unevaluated,
        }
    }

    /// 条件文本：多行以单个空格连接
    pub fn condition_text(&self) -> String {
        self.conditions.join(" ")
    }

    /// 动作文本：多行以单个空格连接
    pub fn action_text(&self) -> String {
        self.actions.join(" ")
    }

    /// 最近一次评估是否触发
    pub fn triggered(&self) -> bool {
        self.status == RuleStatus::Triggered
    }
}

/// 触发状态（三态）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 尚未评估
    #[default]
    Unevaluated,

    /// 条件为假
    NotTriggered,

    /// 条件为真
    Triggered,
}

impl RuleStatus {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            RuleStatus::Unevaluated => None,
            RuleStatus::NotTriggered => Some(false),
            RuleStatus::Triggered => Some(true),
        }
    }
}

/// 规则集合：按插入顺序迭代，名称唯一
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入规则；名称冲突返回 DuplicateRuleName
    pub fn insert(&mut self, rule: Rule) -> Result<()> {
        if self.index.contains_key(&rule.name) {
            return Err(RuleError::DuplicateRuleName(rule.name.clone()));
        }
        self.index.insert(rule.name.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&i| &self.rules[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Rule> {
        let i = self.index.get(name).copied()?;
        self.rules.get_mut(i)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.rules.iter_mut()
    }
}
