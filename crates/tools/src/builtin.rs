//! Built-in tools.
//!
//! A small set of local tools that need no credentials, exposed through
//! a [`ToolSource`] like any external catalog would be.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use tandem_core::error::ToolError;
use tandem_core::tool::{ToolDescriptor, ToolExecutor, ToolSource};

/// Source providing the built-in tools.
pub struct BuiltinSource;

#[async_trait]
impl ToolSource for BuiltinSource {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(vec![
            ToolDescriptor {
                name: "calculator".into(),
                description: "Evaluate a mathematical expression. Supports +, -, *, /, parentheses, and decimal numbers.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                        }
                    },
                    "required": ["expression"]
                }),
                executor: Arc::new(CalculatorExecutor),
            },
            ToolDescriptor {
                name: "current_time".into(),
                description: "Get the current date and time (UTC).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {}
                }),
                executor: Arc::new(CurrentTimeExecutor),
            },
        ])
    }
}

struct CurrentTimeExecutor;

#[async_trait]
impl ToolExecutor for CurrentTimeExecutor {
    async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let now = chrono::Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339(),
            "unix": now.timestamp(),
        }))
    }
}

struct CalculatorExecutor;

#[async_trait]
impl ToolExecutor for CalculatorExecutor {
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason,
        })?;

        // Format integers without the trailing .0
        let formatted = if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            value.to_string()
        };

        Ok(json!({ "result": value, "formatted": formatted }))
    }
}

// ── Expression evaluator ──────────────────────────────────────────────────
//
// Grammar:
//   expr    = term (('+' | '-') term)*
//   term    = unary (('*' | '/') unary)*
//   unary   = '-' unary | primary
//   primary = NUMBER | '(' expr ')'

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = Parser {
        tokens: tokenize(expr)?,
        pos: 0,
    };
    let value = parser.expr()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some(tok) => Err(format!("unexpected trailing token {tok:?}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Tok::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Tok::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Tok::Close);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = literal
                    .parse()
                    .map_err(|_| format!("invalid number: {literal}"))?;
                tokens.push(Tok::Num(num));
            }
            c => return Err(format!("unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut left = self.term()?;
        while let Some(Tok::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = if op == '+' { left + right } else { left - right };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut left = self.unary()?;
        while let Some(Tok::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let right = self.unary()?;
            if op == '/' {
                if right == 0.0 {
                    return Err("division by zero".into());
                }
                left /= right;
            } else {
                left *= right;
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if let Some(Tok::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Open) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Tok::Close) => Ok(value),
                    _ => Err("expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("unexpected token {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
    }

    #[test]
    fn division_and_decimals() {
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("3.14 * 2").unwrap(), 6.28);
    }

    #[test]
    fn unary_negation() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("--4").unwrap(), 4.0);
    }

    #[test]
    fn rejected_inputs() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("2 ^ 3").is_err());
        assert!(evaluate("(1 + 2").is_err());
    }

    #[tokio::test]
    async fn calculator_executes() {
        let executor = CalculatorExecutor;
        let out = executor
            .execute(serde_json::json!({"expression": "2 + 3"}))
            .await
            .unwrap();
        assert_eq!(out["result"], 5.0);
        assert_eq!(out["formatted"], "5");
    }

    #[tokio::test]
    async fn calculator_missing_argument() {
        let executor = CalculatorExecutor;
        let err = executor.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn calculator_eval_error_is_execution_failure() {
        let executor = CalculatorExecutor;
        let err = executor
            .execute(serde_json::json!({"expression": "1 / 0"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn current_time_reports_utc() {
        let executor = CurrentTimeExecutor;
        let out = executor.execute(serde_json::json!({})).await.unwrap();
        assert!(out["utc"].as_str().is_some());
        assert!(out["unix"].as_i64().unwrap() > 1_700_000_000);
    }

    #[tokio::test]
    async fn source_lists_both_tools() {
        let source = BuiltinSource;
        let tools = source.discover().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["calculator", "current_time"]);
    }
}
