use crate::error::CoreError;
use crate::model::TaskStatus;

use super::eval::EvalContext;
use super::Value;

/// Hand-rolled recursive-descent parser/evaluator for the `${{ }}` grammar. One
/// instance is created per expression; it borrows the context and the evaluating
/// task's dependency list for the duration of the parse.
pub struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    ctx: &'a dyn EvalContext,
    deps: &'a [String],
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, ctx: &'a dyn EvalContext, deps: &'a [String]) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            ctx,
            deps,
        }
    }

    pub fn expect_end(&mut self) -> Result<(), CoreError> {
        self.skip_ws();
        if self.pos < self.chars.len() {
            return Err(CoreError::Expression(format!(
                "unexpected trailing input at offset {}",
                self.pos
            )));
        }
        Ok(())
    }

    pub fn parse_expr(&mut self) -> Result<Value, CoreError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Value, CoreError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.consume_op("||") {
                let right = self.parse_and()?;
                left = Value::Bool(left.to_bool() || right.to_bool());
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, CoreError> {
        let mut left = self.parse_comp()?;
        loop {
            self.skip_ws();
            if self.consume_op("&&") {
                let right = self.parse_comp()?;
                left = Value::Bool(left.to_bool() && right.to_bool());
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_comp(&mut self) -> Result<Value, CoreError> {
        let left = self.parse_value()?;
        self.skip_ws();
        if self.consume_op("==") {
            let right = self.parse_value()?;
            return Ok(Value::Bool(eq_ci(&left, &right)));
        }
        if self.consume_op("!=") {
            let right = self.parse_value()?;
            return Ok(Value::Bool(!eq_ci(&left, &right)));
        }
        Ok(left)
    }

    fn parse_value(&mut self) -> Result<Value, CoreError> {
        self.skip_ws();
        match self.peek() {
            Some('\'') | Some('"') => self.parse_string_literal(),
            Some(c) if c.is_ascii_digit() => self.parse_int_literal(),
            Some('-') if self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                self.parse_int_literal()
            }
            _ => self.parse_ident_led(),
        }
    }

    fn parse_string_literal(&mut self) -> Result<Value, CoreError> {
        let quote = self.next().unwrap();
        let mut s = String::new();
        loop {
            match self.next() {
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
                None => return Err(CoreError::Expression("unterminated string literal".into())),
            }
        }
        Ok(Value::Str(s))
    }

    fn parse_int_literal(&mut self) -> Result<Value, CoreError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| CoreError::Expression(format!("invalid integer literal '{text}'")))
    }

    fn parse_ident_led(&mut self) -> Result<Value, CoreError> {
        let ident = self.read_ident();
        if ident.is_empty() {
            return Err(CoreError::Expression(format!(
                "unexpected character at offset {}",
                self.pos
            )));
        }
        let lower = ident.to_lowercase();
        if lower == "true" {
            return Ok(Value::Bool(true));
        }
        if lower == "false" {
            return Ok(Value::Bool(false));
        }
        self.skip_ws();
        if self.peek() == Some('(') {
            return self.parse_function(&lower);
        }
        if self.peek() == Some('.') {
            return self.parse_reference(&ident);
        }
        Err(CoreError::Expression(format!("unresolvable identifier '{ident}'")))
    }

    fn parse_function(&mut self, name: &str) -> Result<Value, CoreError> {
        self.expect_char('(')?;
        match name {
            "success" => {
                self.expect_char(')')?;
                Ok(Value::Bool(self.ctx_success()))
            }
            "failure" => {
                self.expect_char(')')?;
                Ok(Value::Bool(self.ctx_failure()))
            }
            "always" => {
                self.expect_char(')')?;
                Ok(Value::Bool(true))
            }
            "cancelled" => {
                self.expect_char(')')?;
                Ok(Value::Bool(self.ctx.is_cancelled()))
            }
            "contains" => {
                let (a, b) = self.parse_two_args()?;
                Ok(Value::Bool(
                    a.to_display_string()
                        .to_lowercase()
                        .contains(&b.to_display_string().to_lowercase()),
                ))
            }
            "startswith" => {
                let (a, b) = self.parse_two_args()?;
                Ok(Value::Bool(
                    a.to_display_string()
                        .to_lowercase()
                        .starts_with(&b.to_display_string().to_lowercase()),
                ))
            }
            "endswith" => {
                let (a, b) = self.parse_two_args()?;
                Ok(Value::Bool(
                    a.to_display_string()
                        .to_lowercase()
                        .ends_with(&b.to_display_string().to_lowercase()),
                ))
            }
            "equals" => {
                let (a, b) = self.parse_two_args()?;
                Ok(Value::Bool(eq_ci(&a, &b)))
            }
            "isempty" => {
                let a = self.parse_one_arg()?;
                Ok(Value::Bool(a.to_display_string().is_empty()))
            }
            "isnotempty" => {
                let a = self.parse_one_arg()?;
                Ok(Value::Bool(!a.to_display_string().is_empty()))
            }
            "fromjson" => self.parse_from_json(),
            other => Err(CoreError::Expression(format!("unknown function '{other}'"))),
        }
    }

    fn parse_one_arg(&mut self) -> Result<Value, CoreError> {
        let a = self.parse_value()?;
        self.expect_char(')')?;
        Ok(a)
    }

    fn parse_two_args(&mut self) -> Result<(Value, Value), CoreError> {
        let a = self.parse_value()?;
        self.skip_ws();
        self.expect_char(',')?;
        let b = self.parse_value()?;
        self.expect_char(')')?;
        Ok((a, b))
    }

    fn parse_from_json(&mut self) -> Result<Value, CoreError> {
        let inner = self.parse_expr()?;
        self.expect_char(')')?;
        let json: serde_json::Value = match &inner {
            Value::Json(v) => v.clone(),
            other => match serde_json::from_str(&other.to_display_string()) {
                Ok(v) => v,
                Err(_) => return Ok(Value::empty()),
            },
        };
        self.skip_ws();
        if self.peek() == Some('.') {
            self.pos += 1;
            let path = self.read_path();
            Ok(navigate_json(&json, &path))
        } else {
            Ok(Value::Json(json))
        }
    }

    /// Parse a dotted reference path already positioned at `.`.
    fn parse_reference(&mut self, prefix: &str) -> Result<Value, CoreError> {
        self.pos += 1; // consume '.'
        let rest = self.read_path();
        let lower_prefix = prefix.to_lowercase();
        match lower_prefix.as_str() {
            "tasks" => {
                let mut parts = rest.splitn(2, '.');
                let id = parts.next().unwrap_or_default();
                let property = parts.next().unwrap_or_default().to_lowercase();
                Ok(self.task_property(id, &property))
            }
            "env" => Ok(Value::Str(self.ctx.env_var(&rest).unwrap_or_default())),
            "workflow" => Ok(Value::Str(
                self.ctx.workflow_field(&rest.to_lowercase()).unwrap_or_default(),
            )),
            "matrix" => match self.ctx.matrix_value(&rest) {
                Some(v) => Ok(Value::Str(v)),
                None => Ok(Value::Str(format!("${{{{ matrix.{rest} }}}}"))),
            },
            "params" => Ok(Value::Str(self.ctx.param(&rest).unwrap_or_default())),
            other => Err(CoreError::Expression(format!("unknown reference prefix '{other}'"))),
        }
    }

    fn task_property(&self, id: &str, property: &str) -> Value {
        let Some(result) = self.ctx.task_result(id) else {
            return Value::empty();
        };
        match property {
            "output" => Value::Str(result.output),
            "stderr" => Value::Str(result.stderr),
            "exitcode" => Value::Str(result.exit_code.map(|c| c.to_string()).unwrap_or_default()),
            "status" => Value::Str(status_str(result.status).to_string()),
            "duration" => Value::Int(result.duration_ms as i64),
            "issuccess" => Value::Bool(result.status == TaskStatus::Succeeded && result.exit_code.unwrap_or(0) == 0),
            "isfailed" => Value::Bool(result.status.is_failed()),
            "wasskipped" => Value::Bool(result.status == TaskStatus::Skipped),
            _ => Value::empty(),
        }
    }

    fn ctx_success(&self) -> bool {
        if self.deps.is_empty() {
            return true;
        }
        self.deps.iter().all(|d| {
            self.ctx
                .task_result(d)
                .map(|r| r.status == TaskStatus::Succeeded)
                .unwrap_or(false)
        })
    }

    fn ctx_failure(&self) -> bool {
        self.deps.iter().any(|d| {
            self.ctx
                .task_result(d)
                .map(|r| r.status.is_failed())
                .unwrap_or(false)
        })
    }

    // --- low-level scanning helpers ---

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn consume_op(&mut self, op: &str) -> bool {
        let op_chars: Vec<char> = op.chars().collect();
        if self.chars[self.pos..].starts_with(op_chars.as_slice()) {
            self.pos += op_chars.len();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), CoreError> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CoreError::Expression(format!(
                "expected '{expected}' at offset {}",
                self.pos
            )))
        }
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Read a dotted/bracketed path (`foo.bar[0].baz`) until whitespace, a closing
    /// delimiter, or an operator boundary.
    fn read_path(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']' || c == '-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn eq_ci(a: &Value, b: &Value) -> bool {
    a.to_display_string().to_lowercase() == b.to_display_string().to_lowercase()
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Succeeded => "succeeded",
        TaskStatus::Failed => "failed",
        TaskStatus::TimedOut => "timedout",
        TaskStatus::Skipped => "skipped",
        TaskStatus::Cancelled => "cancelled",
    }
}

enum PathSeg {
    Key(String),
    Index(usize),
}

fn split_path(path: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    let mut cur = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !cur.is_empty() {
                    segs.push(PathSeg::Key(std::mem::take(&mut cur)));
                }
            }
            '[' => {
                if !cur.is_empty() {
                    segs.push(PathSeg::Key(std::mem::take(&mut cur)));
                }
                let mut digits = String::new();
                for d in chars.by_ref() {
                    if d == ']' {
                        break;
                    }
                    digits.push(d);
                }
                if let Ok(idx) = digits.parse::<usize>() {
                    segs.push(PathSeg::Index(idx));
                }
            }
            other => cur.push(other),
        }
    }
    if !cur.is_empty() {
        segs.push(PathSeg::Key(cur));
    }
    segs
}

/// Navigate a parsed JSON value along a dotted/bracketed path. A non-index segment
/// applied to an array yields empty (decision recorded in SPEC_FULL.md).
fn navigate_json(root: &serde_json::Value, path: &str) -> Value {
    if path.is_empty() {
        return Value::Json(root.clone());
    }
    let mut current = root;
    for seg in split_path(path) {
        let next = match (&seg, current) {
            (PathSeg::Key(k), serde_json::Value::Object(map)) => map.get(k),
            (PathSeg::Index(i), serde_json::Value::Array(arr)) => arr.get(*i),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::empty(),
        }
    }
    Value::Json(current.clone())
}
