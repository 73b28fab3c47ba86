//! Statement parser for the in-memory store
//!
//! Covers the statement subset the ledger layer emits and nothing more:
//! CREATE/DROP TABLE, INSERT, UPDATE, DELETE and single-table SELECT with
//! AND-joined predicates, aggregates, GROUP BY, HAVING, ORDER BY and LIMIT.

use pesa_core::{FunctionKind, GatewayError, GatewayResult, Value};

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(String),
    Str(String),
    Sym(&'static str),
}

pub(crate) fn syntax_error(detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::rejected(format!("Syntax error: {}", detail))
}

fn tokenize(sql: &str) -> GatewayResult<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() || c == ';' {
            i += 1;
            continue;
        }

        if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(syntax_error("unterminated string literal")),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        text.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
            continue;
        }

        let negative_number =
            c == '-' && chars.get(i + 1).map_or(false, |next| next.is_ascii_digit());
        if c.is_ascii_digit() || negative_number {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
            continue;
        }

        let pair: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let double = match pair.as_str() {
            ">=" => Some(">="),
            "<=" => Some("<="),
            "!=" => Some("!="),
            "<>" => Some("<>"),
            "==" => Some("=="),
            _ => None,
        };
        if let Some(sym) = double {
            tokens.push(Token::Sym(sym));
            i += 2;
            continue;
        }

        let single = match c {
            '(' => "(",
            ')' => ")",
            ',' => ",",
            '*' => "*",
            '=' => "=",
            '<' => "<",
            '>' => ">",
            other => return Err(syntax_error(format!("unexpected character '{}'", other))),
        };
        tokens.push(Token::Sym(single));
        i += 1;
    }

    Ok(tokens)
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_sym(sym: &str) -> Option<Self> {
        match sym {
            "=" | "==" => Some(CmpOp::Eq),
            "!=" | "<>" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub(crate) fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ordering == Equal,
            CmpOp::Ne => ordering != Equal,
            CmpOp::Lt => ordering == Less,
            CmpOp::Le => ordering != Greater,
            CmpOp::Gt => ordering == Greater,
            CmpOp::Ge => ordering != Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Condition {
    Compare { column: String, op: CmpOp, value: Value },
    IsNull { column: String, negated: bool },
}

impl Condition {
    pub(crate) fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. } | Condition::IsNull { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SelectItem {
    Star,
    Column {
        name: String,
        alias: Option<String>,
    },
    Aggregate {
        function: FunctionKind,
        /// `None` for `*`.
        argument: Option<String>,
        alias: Option<String>,
    },
}

impl SelectItem {
    pub(crate) fn output_name(&self) -> String {
        match self {
            SelectItem::Star => "*".to_string(),
            SelectItem::Column { name, alias } => alias.clone().unwrap_or_else(|| name.clone()),
            SelectItem::Aggregate {
                function,
                argument,
                alias,
            } => alias.clone().unwrap_or_else(|| {
                format!("{}({})", function.sql_name(), argument.as_deref().unwrap_or("*"))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HavingOperand {
    Aggregate {
        function: FunctionKind,
        argument: Option<String>,
    },
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HavingCondition {
    pub operand: HavingOperand,
    pub op: CmpOp,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Select {
    pub items: Vec<SelectItem>,
    pub table: String,
    pub filter: Vec<Condition>,
    pub group_by: Option<String>,
    /// AND-joined.
    pub having: Vec<HavingCondition>,
    /// Column or alias, and whether descending.
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Select {
    pub(crate) fn functions(&self) -> Vec<FunctionKind> {
        let mut kinds: Vec<FunctionKind> = self
            .items
            .iter()
            .filter_map(|item| match item {
                SelectItem::Aggregate { function, .. } => Some(*function),
                _ => None,
            })
            .collect();
        for condition in &self.having {
            if let HavingOperand::Aggregate { function, .. } = &condition.operand {
                kinds.push(*function);
            }
        }
        kinds
    }

    pub(crate) fn is_aggregate(&self) -> bool {
        self.group_by.is_some()
            || self
                .items
                .iter()
                .any(|item| matches!(item, SelectItem::Aggregate { .. }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Create {
        table: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    Drop {
        table: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Vec<Condition>,
    },
    Delete {
        table: String,
        filter: Vec<Condition>,
    },
    Select(Select),
}

// ============================================================================
// PARSER
// ============================================================================

const TABLE_CONSTRAINTS: &[&str] = &["PRIMARY", "FOREIGN", "CHECK", "UNIQUE", "CONSTRAINT"];

pub(crate) fn parse(sql: &str) -> GatewayResult<Statement> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
    };
    let statement = parser.statement()?;
    if let Some(token) = parser.peek() {
        return Err(syntax_error(format!("unexpected trailing input near {:?}", token)));
    }
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> GatewayResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> GatewayResult<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(sym))
        }
    }

    fn unexpected(&self, wanted: &str) -> GatewayError {
        match self.peek() {
            Some(Token::Word(w)) | Some(Token::Number(w)) | Some(Token::Str(w)) => {
                syntax_error(format!("expected {} near '{}'", wanted, w))
            }
            Some(Token::Sym(s)) => syntax_error(format!("expected {} near '{}'", wanted, s)),
            None => syntax_error(format!("expected {} at end of input", wanted)),
        }
    }

    fn identifier(&mut self) -> GatewayResult<String> {
        match self.peek() {
            Some(Token::Word(w)) => {
                let word = w.clone();
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn literal(&mut self) -> GatewayResult<Value> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Number(n)) => parse_number(&n),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Value::Bool(false)),
            Some(other) => Err(syntax_error(format!("expected literal, found {:?}", other))),
            None => Err(syntax_error("expected literal at end of input")),
        }
    }

    fn statement(&mut self) -> GatewayResult<Statement> {
        if self.eat_keyword("CREATE") {
            self.create()
        } else if self.eat_keyword("DROP") {
            self.drop_table()
        } else if self.eat_keyword("INSERT") {
            self.insert()
        } else if self.eat_keyword("UPDATE") {
            self.update()
        } else if self.eat_keyword("DELETE") {
            self.delete()
        } else if self.eat_keyword("SELECT") {
            self.select().map(Statement::Select)
        } else {
            Err(self.unexpected("statement"))
        }
    }

    fn create(&mut self) -> GatewayResult<Statement> {
        self.expect_keyword("TABLE")?;
        let if_not_exists = if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let table = self.identifier()?;
        self.expect_sym("(")?;

        let mut columns = Vec::new();
        loop {
            // Each definition runs to the next top-level comma.
            let first = self.identifier()?;
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    None => return Err(syntax_error("unterminated column list")),
                    Some(Token::Sym("(")) => depth += 1,
                    Some(Token::Sym(")")) if depth == 0 => break,
                    Some(Token::Sym(")")) => depth -= 1,
                    Some(Token::Sym(",")) if depth == 0 => break,
                    _ => {}
                }
                self.pos += 1;
            }
            if !TABLE_CONSTRAINTS
                .iter()
                .any(|kw| first.eq_ignore_ascii_case(kw))
            {
                columns.push(first);
            }
            if self.eat_sym(",") {
                continue;
            }
            self.expect_sym(")")?;
            break;
        }

        Ok(Statement::Create {
            table,
            columns,
            if_not_exists,
        })
    }

    fn drop_table(&mut self) -> GatewayResult<Statement> {
        self.expect_keyword("TABLE")?;
        let if_exists = if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let table = self.identifier()?;
        Ok(Statement::Drop { table, if_exists })
    }

    fn insert(&mut self) -> GatewayResult<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.identifier()?;
        self.expect_sym("(")?;
        let mut columns = vec![self.identifier()?];
        while self.eat_sym(",") {
            columns.push(self.identifier()?);
        }
        self.expect_sym(")")?;
        self.expect_keyword("VALUES")?;

        let mut rows = Vec::new();
        loop {
            self.expect_sym("(")?;
            let mut values = vec![self.literal()?];
            while self.eat_sym(",") {
                values.push(self.literal()?);
            }
            self.expect_sym(")")?;
            if values.len() != columns.len() {
                return Err(syntax_error(format!(
                    "{} values for {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            rows.push(values);
            if !self.eat_sym(",") {
                break;
            }
        }

        Ok(Statement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn update(&mut self) -> GatewayResult<Statement> {
        let table = self.identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.identifier()?;
            self.expect_sym("=")?;
            assignments.push((column, self.literal()?));
            if !self.eat_sym(",") {
                break;
            }
        }
        let filter = self.where_clause()?;
        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    fn delete(&mut self) -> GatewayResult<Statement> {
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.where_clause()?;
        Ok(Statement::Delete { table, filter })
    }

    fn select(&mut self) -> GatewayResult<Select> {
        let mut items = vec![self.select_item()?];
        while self.eat_sym(",") {
            items.push(self.select_item()?);
        }
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.where_clause()?;

        let group_by = if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            Some(self.identifier()?)
        } else {
            None
        };

        let mut having = Vec::new();
        if self.eat_keyword("HAVING") {
            having.push(self.having_condition()?);
            while self.eat_keyword("AND") {
                having.push(self.having_condition()?);
            }
        }

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.identifier()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            Some((column, descending))
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            match self.advance() {
                Some(Token::Number(n)) => Some(
                    n.parse::<usize>()
                        .map_err(|_| syntax_error(format!("invalid LIMIT '{}'", n)))?,
                ),
                _ => return Err(syntax_error("expected number after LIMIT")),
            }
        } else {
            None
        };

        Ok(Select {
            items,
            table,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    /// `FUNC(arg)` if the upcoming tokens form one.
    fn aggregate_call(&mut self) -> GatewayResult<Option<(FunctionKind, Option<String>)>> {
        let function = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(Token::Word(w)), Some(Token::Sym("("))) => match w.parse::<FunctionKind>() {
                Ok(function) => function,
                Err(_) => return Err(syntax_error(format!("unknown function '{}'", w))),
            },
            _ => return Ok(None),
        };
        self.pos += 2;
        let argument = if self.eat_sym("*") {
            None
        } else {
            Some(self.identifier()?)
        };
        self.expect_sym(")")?;
        Ok(Some((function, argument)))
    }

    fn alias(&mut self) -> GatewayResult<Option<String>> {
        if self.eat_keyword("AS") {
            self.identifier().map(Some)
        } else {
            Ok(None)
        }
    }

    fn select_item(&mut self) -> GatewayResult<SelectItem> {
        if self.eat_sym("*") {
            return Ok(SelectItem::Star);
        }
        if let Some((function, argument)) = self.aggregate_call()? {
            let alias = self.alias()?;
            return Ok(SelectItem::Aggregate {
                function,
                argument,
                alias,
            });
        }
        let name = self.identifier()?;
        let alias = self.alias()?;
        Ok(SelectItem::Column { name, alias })
    }

    fn comparison_op(&mut self) -> GatewayResult<CmpOp> {
        match self.advance() {
            Some(Token::Sym(sym)) => {
                CmpOp::from_sym(sym).ok_or_else(|| syntax_error(format!("unexpected '{}'", sym)))
            }
            other => Err(syntax_error(format!("expected comparison, found {:?}", other))),
        }
    }

    fn where_clause(&mut self) -> GatewayResult<Vec<Condition>> {
        if !self.eat_keyword("WHERE") {
            return Ok(Vec::new());
        }
        let mut conditions = vec![self.condition()?];
        while self.eat_keyword("AND") {
            conditions.push(self.condition()?);
        }
        if self.peek_keyword("OR") {
            return Err(syntax_error("OR predicates are not supported"));
        }
        Ok(conditions)
    }

    fn condition(&mut self) -> GatewayResult<Condition> {
        let column = self.identifier()?;
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Condition::IsNull { column, negated });
        }
        let op = self.comparison_op()?;
        let value = self.literal()?;
        Ok(Condition::Compare { column, op, value })
    }

    fn having_condition(&mut self) -> GatewayResult<HavingCondition> {
        let operand = match self.aggregate_call()? {
            Some((function, argument)) => HavingOperand::Aggregate { function, argument },
            None => HavingOperand::Name(self.identifier()?),
        };
        let op = self.comparison_op()?;
        let value = match self.literal()? {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            other => {
                return Err(syntax_error(format!(
                    "HAVING expects a number, found {}",
                    other.type_name()
                )))
            }
        };
        Ok(HavingCondition { operand, op, value })
    }
}

fn parse_number(text: &str) -> GatewayResult<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| syntax_error(format!("invalid number '{}'", text)))
}

// =============================================================================
// TESTS
// =============================================================================
