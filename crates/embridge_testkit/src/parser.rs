//! Parser for the test query dialect.
//!
//! Supported statements:
//! - `CREATE NODE TABLE name(col TYPE, ..., PRIMARY KEY(col))`
//! - `CREATE ([var]:table {prop: expr, ...})`
//! - `MATCH (var:table) [WHERE pred [AND pred]...] RETURN items [ORDER BY expr [DESC]] [LIMIT n]`
//! - `RETURN items`
//!
//! Statements may be chained with `;`.

use crate::lexer::{tokenize, Token};
use embridge_engine::Value;
use std::collections::BTreeSet;

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Param(String),
    List(Vec<Expr>),
    Property { var: String, prop: String },
    Var(String),
    CountStar,
}

impl Expr {
    /// Default output column name.
    pub(crate) fn column_name(&self) -> String {
        match self {
            Expr::Literal(Value::String(s)) => s.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::Param(p) => format!("${p}"),
            Expr::List(items) => {
                let inner: Vec<_> = items.iter().map(Expr::column_name).collect();
                format!("[{}]", inner.join(","))
            }
            Expr::Property { var, prop } => format!("{var}.{prop}"),
            Expr::Var(var) => var.clone(),
            Expr::CountStar => "COUNT_STAR()".to_string(),
        }
    }

    fn collect_params(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Param(p) => {
                out.insert(p.clone());
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_params(out)),
            _ => {}
        }
    }
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `left op right`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub left: Expr,
    pub op: CmpOp,
    pub right: Expr,
}

/// One `RETURN` item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Projection {
    pub expr: Expr,
    pub name: String,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    CreateTable {
        name: String,
        columns: Vec<(String, String)>,
        primary_key: String,
    },
    CreateNode {
        var: Option<String>,
        table: String,
        properties: Vec<(String, Expr)>,
    },
    Match {
        var: String,
        table: String,
        filter: Vec<Predicate>,
        projections: Vec<Projection>,
        order_by: Option<(Expr, bool)>,
        limit: Option<Expr>,
    },
    Return {
        projections: Vec<Projection>,
    },
}

impl Statement {
    /// Whether the statement modifies the catalog.
    pub(crate) fn is_write(&self) -> bool {
        matches!(self, Statement::CreateTable { .. } | Statement::CreateNode { .. })
    }

    /// Parameter names referenced by the statement.
    pub(crate) fn params(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match self {
            Statement::CreateTable { .. } => {}
            Statement::CreateNode { properties, .. } => {
                properties.iter().for_each(|(_, e)| e.collect_params(&mut out));
            }
            Statement::Match {
                filter,
                projections,
                limit,
                ..
            } => {
                for p in filter {
                    p.left.collect_params(&mut out);
                    p.right.collect_params(&mut out);
                }
                projections.iter().for_each(|p| p.expr.collect_params(&mut out));
                if let Some(limit) = limit {
                    limit.collect_params(&mut out);
                }
            }
            Statement::Return { projections } => {
                projections.iter().for_each(|p| p.expr.collect_params(&mut out));
            }
        }
        out
    }
}

/// Parses `;`-separated statements.
pub(crate) fn parse(input: &str) -> Result<Vec<Statement>, String> {
    let tokens = tokenize(input).map_err(|e| format!("Parser exception: {e}"))?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    loop {
        while parser.eat(&Token::Semicolon) {}
        if parser.peek().is_none() {
            break;
        }
        statements.push(parser.statement()?);
        if parser.peek().is_some() && !parser.eat(&Token::Semicolon) {
            return Err(parser.unexpected("';' or end of input"));
        }
    }
    if statements.is_empty() {
        return Err("Parser exception: Query is empty.".to_string());
    }
    Ok(statements)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> String {
        let found = self
            .peek()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "EOF".to_string());
        format!("Parser exception: Invalid input <{found}>: expected {expected}")
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{token}'")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), String> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(kw))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn statement(&mut self) -> Result<Statement, String> {
        if self.eat_keyword("CREATE") {
            if self.eat_keyword("NODE") {
                self.create_table()
            } else {
                self.create_node()
            }
        } else if self.eat_keyword("MATCH") {
            self.match_statement()
        } else if self.eat_keyword("RETURN") {
            Ok(Statement::Return {
                projections: self.projections()?,
            })
        } else {
            Err(self.unexpected("CREATE, MATCH or RETURN"))
        }
    }

    fn create_table(&mut self) -> Result<Statement, String> {
        self.expect_keyword("TABLE")?;
        let name = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut columns = Vec::new();
        let mut primary_key = None;
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                self.expect(&Token::LParen)?;
                primary_key = Some(self.ident()?);
                self.expect(&Token::RParen)?;
            } else {
                let column = self.ident()?;
                let ty = self.ident()?.to_ascii_uppercase();
                columns.push((column, ty));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        // tolerate stray closing parentheses
        while self.eat(&Token::RParen) {}
        let primary_key = primary_key.ok_or_else(|| {
            format!("Parser exception: Node table {name} requires a PRIMARY KEY.")
        })?;
        Ok(Statement::CreateTable {
            name,
            columns,
            primary_key,
        })
    }

    fn create_node(&mut self) -> Result<Statement, String> {
        self.expect(&Token::LParen)?;
        let var = match self.peek() {
            Some(Token::Ident(_)) => Some(self.ident()?),
            _ => None,
        };
        self.expect(&Token::Colon)?;
        let table = self.ident()?;
        let mut properties = Vec::new();
        if self.eat(&Token::LBrace) {
            if !self.eat(&Token::RBrace) {
                loop {
                    let key = self.ident()?;
                    self.expect(&Token::Colon)?;
                    properties.push((key, self.expr()?));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace)?;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Statement::CreateNode {
            var,
            table,
            properties,
        })
    }

    fn match_statement(&mut self) -> Result<Statement, String> {
        self.expect(&Token::LParen)?;
        let var = self.ident()?;
        self.expect(&Token::Colon)?;
        let table = self.ident()?;
        self.expect(&Token::RParen)?;

        let mut filter = Vec::new();
        if self.eat_keyword("WHERE") {
            loop {
                filter.push(self.predicate()?);
                if !self.eat_keyword("AND") {
                    break;
                }
            }
        }

        self.expect_keyword("RETURN")?;
        let projections = self.projections()?;

        let mut order_by = None;
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let expr = self.expr()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            order_by = Some((expr, descending));
        }

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Statement::Match {
            var,
            table,
            filter,
            projections,
            order_by,
            limit,
        })
    }

    fn predicate(&mut self) -> Result<Predicate, String> {
        let left = self.expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.pos += 1;
        let right = self.expr()?;
        Ok(Predicate { left, op, right })
    }

    fn projections(&mut self) -> Result<Vec<Projection>, String> {
        let mut projections = Vec::new();
        loop {
            let expr = self.expr()?;
            let name = if self.eat_keyword("AS") {
                self.ident()?
            } else {
                expr.column_name()
            };
            projections.push(Projection { expr, name });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(projections)
    }

    fn expr(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int64(i))),
            Some(Token::Float(d)) => Ok(Expr::Literal(Value::Double(d))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Param(p)) => Ok(Expr::Param(p)),
            Some(Token::Minus) => match self.peek().cloned() {
                Some(Token::Int(i)) => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Int64(-i)))
                }
                Some(Token::Float(d)) => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Double(-d)))
                }
                _ => Err(self.unexpected("a number")),
            },
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket)?;
                }
                Ok(Expr::List(items))
            }
            Some(Token::Ident(word)) => {
                if word.eq_ignore_ascii_case("TRUE") {
                    Ok(Expr::Literal(Value::Bool(true)))
                } else if word.eq_ignore_ascii_case("FALSE") {
                    Ok(Expr::Literal(Value::Bool(false)))
                } else if word.eq_ignore_ascii_case("NULL") {
                    Ok(Expr::Literal(Value::Null))
                } else if word.eq_ignore_ascii_case("COUNT") && self.eat(&Token::LParen) {
                    self.expect(&Token::Star)?;
                    self.expect(&Token::RParen)?;
                    Ok(Expr::CountStar)
                } else if self.eat(&Token::Dot) {
                    let prop = self.ident()?;
                    Ok(Expr::Property { var: word, prop })
                } else {
                    Ok(Expr::Var(word))
                }
            }
            other => {
                if other.is_some() {
                    self.pos -= 1;
                }
                Err(self.unexpected("an expression"))
            }
        }
    }
}
