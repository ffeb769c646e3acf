use std::collections::HashSet;

// Keywords must keep their case so rhai still recognizes them.
const KEYWORDS: &[&str] = &[
    "true", "false", "if", "else", "let", "const", "fn", "return", "while",
    "loop", "for", "in", "do", "until", "switch", "break", "continue",
    "throw", "try", "catch", "this",
];

/// Normalized expression text plus the input names it requires.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedExpr {
    pub text: String,
    pub inputs: Vec<String>,
}

/// Uppercase every identifier outside string literals and collect the
/// required input names in one pass.
///
/// The original evaluator resolved names case-insensitively, which is why
/// inputs and parameters are uppercased at the boundary; rhai is
/// case-sensitive, so the source is rewritten instead. An identifier followed
/// by `(` is a function call, not an input; identifiers after `.` are member
/// accesses and stay as written.
pub fn normalize_expression(source: &str) -> NormalizedExpr {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut inputs = Vec::new();
    let mut seen = HashSet::new();
    let mut prev_non_space = '\0';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            // String/char literal: copy verbatim, honoring escapes
            let quote = c;
            out.push(c);
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                out.push(d);
                i += 1;
                if d == '\\' && i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                } else if d == quote {
                    break;
                }
            }
            prev_non_space = quote;
        } else if c.is_ascii_digit() {
            // Number literal, including underscores, decimals and exponents
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                out.push(chars[i]);
                i += 1;
            }
            prev_non_space = '0';
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            // Look past whitespace for a call parenthesis
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let is_call = j < chars.len() && chars[j] == '(';
            let is_member = prev_non_space == '.';

            if is_member || KEYWORDS.contains(&ident.as_str()) {
                out.push_str(&ident);
            } else {
                let upper = ident.to_uppercase();
                if !is_call && seen.insert(upper.clone()) {
                    inputs.push(upper.clone());
                }
                out.push_str(&upper);
            }
            prev_non_space = 'a';
        } else {
            if !c.is_whitespace() {
                prev_non_space = c;
            }
            out.push(c);
            i += 1;
        }
    }

    NormalizedExpr { text: out, inputs }
}
