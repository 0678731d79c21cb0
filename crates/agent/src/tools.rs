use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A named capability the workflow can invoke. Implementations return their
/// payload as JSON; failures are surfaced through `ToolOutcome`, never
/// propagated to the end user.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// Result of one tool invocation as recorded in the turn transcript.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self { success: true, result, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::String("Tool execution failed".to_string()),
            error: Some(error.into()),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `name: description` lines for the tool section of the system prompt.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch by name. A missing tool or a failing execution both come back
    /// as a failed outcome.
    pub async fn execute(&self, name: &str, input: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutcome::failed(format!("Tool '{name}' not found"));
        };
        match tool.execute(input).await {
            Ok(result) => ToolOutcome::ok(result),
            Err(error) => ToolOutcome::failed(error.to_string()),
        }
    }
}

/// Arithmetic over `+ - * / ( )` and decimal numbers. The expression is
/// sanitized to that character set before parsing.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Performs mathematical calculations"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("calculator input requires an `expression` string"))?;

        let sanitized = sanitize_expression(expression)?;
        let value = Parser::new(&sanitized).evaluate()?;
        Ok(serde_json::json!({ "expression": expression, "value": value }))
    }
}

fn sanitize_expression(expression: &str) -> Result<String> {
    let sanitized: String = expression
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.'))
        .collect();
    if sanitized.is_empty() {
        bail!("expression contains no valid characters");
    }
    Ok(sanitized)
}

/// Recursive-descent evaluator: expr := term (('+'|'-') term)*,
/// term := factor (('*'|'/') factor)*, factor := number | '-' factor |
/// '(' expr ')'.
struct Parser<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), position: 0 }
    }

    fn evaluate(mut self) -> Result<f64> {
        let value = self.expression()?;
        if self.position != self.input.len() {
            bail!("unexpected trailing input at position {}", self.position);
        }
        if !value.is_finite() {
            bail!("expression did not evaluate to a finite number");
        }
        Ok(value)
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.position += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.position += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.position += 1;
                    value *= self.factor()?;
                }
                b'/' => {
                    self.position += 1;
                    value /= self.factor()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        match self.peek() {
            Some(b'-') => {
                self.position += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.position += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    bail!("unbalanced parentheses");
                }
                self.position += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            other => bail!("unexpected token {:?}", other.map(char::from)),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == b'.' {
                self.position += 1;
            } else {
                break;
            }
        }
        let literal = std::str::from_utf8(&self.input[start..self.position])?;
        literal.parse::<f64>().map_err(|_| anyhow!("invalid number literal `{literal}`"))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }
}
