//! Calculator tool: evaluates arithmetic expressions.
//!
//! Supports `+ - * / % ^`, parentheses, unary minus and decimal numbers.
//! `^` is right-associative and binds tighter than unary minus, so
//! `-2^2` is `-4`.

use async_trait::async_trait;
use std::iter::Peekable;
use std::str::Chars;
use turngraph_core::error::ToolError;
use turngraph_core::tool::{InvocationContext, Tool, ToolArgs};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, and decimals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    fn accepts_context(&self) -> bool {
        false
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        _context: Option<&InvocationContext>,
    ) -> Result<serde_json::Value, ToolError> {
        let expr = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        })?;

        Ok(serde_json::Value::String(format_number(value)))
    }
}

/// Integers print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut eval = Evaluator {
        chars: expr.chars().peekable(),
        depth: 0,
    };
    let value = eval.sum()?;
    eval.skip_ws();
    match eval.chars.peek() {
        None => Ok(value),
        Some(c) => Err(format!("unexpected '{c}'")),
    }
}

/// Nesting bound for parentheses, unary minus and exponents.
const MAX_DEPTH: usize = 256;

struct Evaluator<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl Evaluator<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    /// Consume `op` if it is the next non-space character.
    fn eat(&mut self, op: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&op).is_some()
    }

    // sum = product (('+' | '-') product)*
    fn sum(&mut self) -> Result<f64, String> {
        let mut acc = self.product()?;
        loop {
            if self.eat('+') {
                acc += self.product()?;
            } else if self.eat('-') {
                acc -= self.product()?;
            } else {
                return Ok(acc);
            }
        }
    }

    // product = signed (('*' | '/' | '%') signed)*
    fn product(&mut self) -> Result<f64, String> {
        let mut acc = self.signed()?;
        loop {
            if self.eat('*') {
                acc *= self.signed()?;
            } else if self.eat('/') {
                let rhs = self.signed()?;
                if rhs == 0.0 {
                    return Err("division by zero".into());
                }
                acc /= rhs;
            } else if self.eat('%') {
                let rhs = self.signed()?;
                if rhs == 0.0 {
                    return Err("modulo by zero".into());
                }
                acc %= rhs;
            } else {
                return Ok(acc);
            }
        }
    }

    // signed = '-' signed | power
    //
    // Every recursive rule passes through here, so this is where depth is
    // bounded.
    fn signed(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".into());
        }
        self.depth += 1;
        let value = if self.eat('-') {
            self.signed().map(|v| -v)
        } else {
            self.power()
        };
        self.depth -= 1;
        value
    }

    // power = atom ('^' signed)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.signed()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // atom = NUMBER | '(' sum ')'
    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let inner = self.sum()?;
            if !self.eat(')') {
                return Err("expected ')'".into());
            }
            return Ok(inner);
        }

        self.skip_ws();
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        match (literal.is_empty(), self.chars.peek()) {
            (true, Some(c)) => Err(format!("unexpected '{c}'")),
            (true, None) => Err("unexpected end of expression".into()),
            (false, _) => literal
                .parse()
                .map_err(|_| format!("invalid number '{literal}'")),
        }
    }
}
