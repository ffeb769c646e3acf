use tracing::debug;

use crate::error::{Result, RuleError};
use crate::model::{Rule, RuleSet};

/// 解析状态（三态机）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    None,
    Condition,
    Action,
}

/// 规则文本解析器
///
/// 逐行消费文本，不做前瞻。同一文本可包含多个 rule 块；
/// 多次调用 parse_str 累积到同一个 RuleSet，重名检查跨调用生效。
#[derive(Debug, Default)]
pub struct RuleParser {
    rules: RuleSet,
}

impl RuleParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析规则文本块
    pub fn parse_str(&mut self, text: &str) -> Result<()> {
        parse_into(&mut self.rules, text)
    }

    /// 以程序方式插入单条规则，重名检查与文本解析一致
    pub fn add_rule(
        &mut self,
        name: impl Into<String>,
        condition: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<()> {
        add_rule(&mut self.rules, name, condition, action)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    pub fn into_rules(self) -> RuleSet {
        self.rules
    }
}

pub(crate) fn add_rule(
    rules: &mut RuleSet,
    name: impl Into<String>,
    condition: impl Into<String>,
    action: impl Into<String>,
) -> Result<()> {
    let mut rule = Rule::new(name);
    rule.conditions.push(condition.into());
    rule.actions.push(action.into());
    rules.insert(rule)
}

pub(crate) fn parse_into(rules: &mut RuleSet, text: &str) -> Result<()> {
    let mut current: Option<String> = None;
    let mut mode = ParseMode::None;
    let mut seen_then = false;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lowered = line.to_lowercase();

        if is_rule_header(&lowered) {
            mode = ParseMode::None;
            seen_then = false;
            let name = match line.split_once(char::is_whitespace) {
                Some((_, rest)) => strip_quotes(rest.trim()),
                None => {
                    return Err(RuleError::Syntax {
                        line: lineno + 1,
                        message: "rule header is missing a name".to_string(),
                    })
                }
            };
            debug!(rule_name = %name, "Rule header");
            rules.insert(Rule::new(name.clone()))?;
            current = Some(name);
        } else if lowered == "when" {
            mode = ParseMode::Condition;
        } else if lowered == "then" {
            if seen_then {
                return Err(RuleError::Syntax {
                    line: lineno + 1,
                    message: "'then' appears twice before 'end'".to_string(),
                });
            }
            seen_then = true;
            mode = ParseMode::Action;
        } else if lowered == "end" {
            mode = ParseMode::None;
            seen_then = false;
        } else if let Some(name) = current.as_deref() {
            if let Some(rule) = rules.get_mut(name) {
                match mode {
                    ParseMode::Condition => rule.conditions.push(line.to_string()),
                    ParseMode::Action => rule.actions.push(line.to_string()),
                    ParseMode::None => {}
                }
            }
        }
    }

    Ok(())
}

fn is_rule_header(lowered: &str) -> bool {
    lowered == "rule" || (lowered.starts_with("rule") && lowered[4..].starts_with(char::is_whitespace))
}

// 剥掉一层首尾双引号，不做反转义
fn strip_quotes(name: &str) -> String {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        name[1..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleStatus;

    const RULES: &str = r#"
rule "order new items"
when
    products_in_stock < 20
then
    order_more(50)
end
"#;

    #[test]
    fn test_parse_single_rule() {
        let mut parser = RuleParser::new();
        parser.parse_str(RULES).unwrap();

        assert_eq!(parser.rules().len(), 1);
        let rule = parser.rules().get("order new items").unwrap();
        assert_eq!(rule.conditions, vec!["products_in_stock < 20"]);
        assert_eq!(rule.actions, vec!["order_more(50)"]);
        assert_eq!(rule.status, RuleStatus::Unevaluated);
    }

    #[test]
    fn test_parse_keeps_header_order() {
        let text = r#"
rule "c"
when
    x > 1
then
    f(1)
end
rule "a"
when
    x > 2
then
    f(2)
end
rule "b"
when
    x > 3
then
    f(3)
end
"#;
        let mut parser = RuleParser::new();
        parser.parse_str(text).unwrap();

        let names: Vec<&str> = parser.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let text = "RULE \"a\"\nWHEN\n x > 1\nTHEN\n f()\nEND";
        let mut parser = RuleParser::new();
        parser.parse_str(text).unwrap();

        let rule = parser.rules().get("a").unwrap();
        assert_eq!(rule.conditions, vec!["x > 1"]);
        assert_eq!(rule.actions, vec!["f()"]);
    }

    #[test]
    fn test_unquoted_name_kept_as_written() {
        let mut parser = RuleParser::new();
        parser.parse_str("rule reorder\nwhen\n x\nthen\n f()\nend").unwrap();
        assert!(parser.rules().contains("reorder"));
    }

    #[test]
    fn test_only_one_quote_layer_stripped() {
        let mut parser = RuleParser::new();
        parser
            .parse_str("rule \"\"a\"\"\nwhen\n x\nthen\n f()\nend")
            .unwrap();
        assert!(parser.rules().contains("\"a\""));
    }

    #[test]
    fn test_duplicate_rule_name_fails_and_keeps_first() {
        let mut parser = RuleParser::new();
        parser.parse_str(RULES).unwrap();

        let err = parser.parse_str(RULES).unwrap_err();
        assert!(matches!(err, RuleError::DuplicateRuleName(name) if name == "order new items"));

        // 首次出现的规则保持不变
        assert_eq!(parser.rules().len(), 1);
        let rule = parser.rules().get("order new items").unwrap();
        assert_eq!(rule.conditions, vec!["products_in_stock < 20"]);
    }

    #[test]
    fn test_second_then_before_end_fails() {
        let text = r#"
rule "a"
when
    x > 1
then
    f(1)
then
    f(2)
end
"#;
        let mut parser = RuleParser::new();
        let err = parser.parse_str(text).unwrap_err();
        assert!(matches!(err, RuleError::Syntax { line: 7, .. }));
    }

    #[test]
    fn test_lines_outside_blocks_are_ignored() {
        let text = r#"
this line is ignored
rule "a"
also ignored, no when yet
when
    x > 1
then
    f()
end
ignored again
"#;
        let mut parser = RuleParser::new();
        parser.parse_str(text).unwrap();

        let rule = parser.rules().get("a").unwrap();
        assert_eq!(rule.conditions, vec!["x > 1"]);
        assert_eq!(rule.actions, vec!["f()"]);
    }

    #[test]
    fn test_accumulates_across_calls() {
        let mut parser = RuleParser::new();
        parser.parse_str(RULES).unwrap();
        parser
            .parse_str("rule \"b\"\nwhen\n x\nthen\n f()\nend")
            .unwrap();
        assert_eq!(parser.rules().len(), 2);
    }

    #[test]
    fn test_add_rule_checks_duplicates() {
        let mut parser = RuleParser::new();
        parser
            .add_rule("a", "products_in_stock < 20", "order_more(50)")
            .unwrap();
        assert!(parser
            .add_rule("a", "products_in_stock < 5", "order_more(10)")
            .is_err());

        let rule = parser.rules().get("a").unwrap();
        assert_eq!(rule.conditions, vec!["products_in_stock < 20"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let mut first = RuleParser::new();
        first.parse_str(RULES).unwrap();
        let mut second = RuleParser::new();
        second.parse_str(RULES).unwrap();

        let lhs: Vec<_> = first
            .rules()
            .iter()
            .map(|r| (r.name.clone(), r.conditions.clone(), r.actions.clone()))
            .collect();
        let rhs: Vec<_> = second
            .rules()
            .iter()
            .map(|r| (r.name.clone(), r.conditions.clone(), r.actions.clone()))
            .collect();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_rule_header_without_name_fails() {
        let mut parser = RuleParser::new();
        let err = parser.parse_str("rule\nwhen\n x\nthen\n f()\nend").unwrap_err();
        assert!(matches!(err, RuleError::Syntax { line: 1, .. }));
    }
}
