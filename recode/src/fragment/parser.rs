//! Recursive-descent parser producing [`Stmt`] lists.
//!
//! Errors raised while looking at the end-of-input token are reported as
//! [`ParseErrorKind::Incomplete`](super::error::ParseErrorKind::Incomplete):
//! more source could still turn them into a valid program.

use super::ast::{BinOp, CmpOp, CompFor, CompKind, Expr, FPart, Handler, Stmt, StmtKind, UnaryOp};
use super::error::ParseError;
use super::lexer::{Tok, Token, tokenize};
use super::value::Value;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const UNSUPPORTED: &[&str] = &["class", "with", "global", "nonlocal", "del", "from", "yield"];

const AUG_OPS: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("//=", BinOp::FloorDiv),
    ("%=", BinOp::Mod),
    ("**=", BinOp::Pow),
];

/// Parse a whole fragment into top-level statements.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.program()
}

/// Parse a standalone expression (used for f-string fields).
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokenize(source.trim())?);
    let expr = parser.expr_list()?;
    while parser.peek() == &Tok::Newline {
        parser.advance();
    }
    if parser.peek() != &Tok::Eof {
        return Err(parser.error("invalid syntax"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
    last_line: usize,
    loop_depth: usize,
    def_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        let last = tokens.last().map_or(1, |t| t.line);
        Self {
            tokens,
            pos: 0,
            eof: Token {
                tok: Tok::Eof,
                line: last,
                end_line: last,
            },
            last_line: 1,
            loop_depth: 0,
            def_depth: 0,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Tok {
        &self.current().tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map_or(&self.eof.tok, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.current().line
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.tok != Tok::Eof {
            self.pos += 1;
        }
        if !matches!(token.tok, Tok::Newline | Tok::Indent | Tok::Dedent | Tok::Eof) {
            self.last_line = token.end_line;
        }
        token
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.current();
        if token.tok == Tok::Eof {
            ParseError::incomplete(format!("unexpected end of input: {message}"), token.line)
        } else {
            ParseError::invalid(message.to_string(), token.line)
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{op}'")))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{kw}'")))
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                Tok::Indent => return Err(self.error("unexpected indent")),
                Tok::Dedent => return Err(self.error("unexpected dedent")),
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Name(kw) => match kw.as_str() {
                "if" => self.if_stmt()?,
                "for" => self.for_stmt()?,
                "while" => self.while_stmt()?,
                "try" => self.try_stmt()?,
                "def" => self.def_stmt(false)?,
                "async" => {
                    self.advance();
                    if !self.is_keyword("def") {
                        return Err(self.error("only 'async def' is supported"));
                    }
                    self.def_stmt(true)?
                }
                kw if UNSUPPORTED.contains(&kw) => {
                    return Err(self.error(&format!("unsupported statement '{kw}'")));
                }
                _ => return self.simple_stmts(),
            },
            _ => return self.simple_stmts(),
        };
        Ok(vec![Stmt {
            kind,
            line,
            end_line: self.last_line,
        }])
    }

    fn simple_stmts(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.simple_stmt()?;
            stmts.push(Stmt {
                kind,
                line,
                end_line: self.last_line,
            });
            if !self.eat_op(";") || matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
        }
        if self.peek() == &Tok::Newline {
            self.advance();
            Ok(stmts)
        } else {
            Err(self.error("invalid syntax"))
        }
    }

    fn simple_stmt(&mut self) -> Result<StmtKind, ParseError> {
        if let Tok::Name(kw) = self.peek().clone() {
            match kw.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(StmtKind::Pass);
                }
                "break" | "continue" => {
                    if self.loop_depth == 0 {
                        return Err(self.error(&format!("'{kw}' outside loop")));
                    }
                    self.advance();
                    return Ok(if kw == "break" {
                        StmtKind::Break
                    } else {
                        StmtKind::Continue
                    });
                }
                "return" => {
                    if self.def_depth == 0 {
                        return Err(self.error("'return' outside function"));
                    }
                    self.advance();
                    let value = if self.starts_expr() {
                        Some(self.expr_list()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Return(value));
                }
                "raise" => {
                    self.advance();
                    let value = if self.starts_expr() {
                        Some(self.expr()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Raise(value));
                }
                "import" => {
                    self.advance();
                    return self.import_names();
                }
                "assert" => {
                    self.advance();
                    let test = self.expr()?;
                    let msg = if self.eat_op(",") {
                        Some(self.expr()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Assert { test, msg });
                }
                kw if UNSUPPORTED.contains(&kw) => {
                    return Err(self.error(&format!("unsupported statement '{kw}'")));
                }
                _ => {}
            }
        }
        self.expr_or_assign()
    }

    fn import_names(&mut self) -> Result<StmtKind, ParseError> {
        let mut names = Vec::new();
        loop {
            let mut module = self.identifier()?;
            while self.eat_op(".") {
                module.push('.');
                module.push_str(&self.identifier()?);
            }
            let alias = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push((module, alias));
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn expr_or_assign(&mut self) -> Result<StmtKind, ParseError> {
        let first = self.expr_list()?;
        if self.is_op("=") {
            let mut targets = vec![first];
            let value = loop {
                self.expect_op("=")?;
                let next = self.expr_list()?;
                if !self.is_op("=") {
                    break next;
                }
                targets.push(next);
            };
            for target in &targets {
                self.check_target(target)?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }
        if let Tok::Op(op) = self.peek() {
            if let Some((_, bin)) = AUG_OPS.iter().find(|(sym, _)| sym == op) {
                let op = *bin;
                if !matches!(
                    first,
                    Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. }
                ) {
                    return Err(self.error("illegal expression for augmented assignment"));
                }
                self.advance();
                let value = self.expr_list()?;
                return Ok(StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                });
            }
        }
        if self.eat_op(":") {
            // Annotated assignment; the annotation is parsed and dropped.
            self.check_target(&first)?;
            self.expr()?;
            if self.eat_op("=") {
                let value = self.expr_list()?;
                return Ok(StmtKind::Assign {
                    targets: vec![first],
                    value,
                });
            }
            return Ok(StmtKind::Pass);
        }
        Ok(StmtKind::Expr(first))
    }

    fn check_target(&self, target: &Expr) -> Result<(), ParseError> {
        match target {
            Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. } => Ok(()),
            Expr::Tuple(items) | Expr::List(items) if !items.is_empty() => {
                items.iter().try_for_each(|item| self.check_target(item))
            }
            _ => Err(ParseError::invalid(
                "cannot assign to expression",
                self.last_line,
            )),
        }
    }

    fn suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_op(":")?;
        if self.peek() != &Tok::Newline {
            return self.simple_stmts();
        }
        self.advance();
        if self.peek() != &Tok::Indent {
            return Err(self.error("expected an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Dedent => {
                    self.advance();
                    break;
                }
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.loop_depth += 1;
        let body = self.suite();
        self.loop_depth -= 1;
        body
    }

    fn if_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword("if")?;
        let mut branches = vec![(self.expr()?, self.suite()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                branches.push((self.expr()?, self.suite()?));
            } else if self.eat_keyword("else") {
                orelse = self.suite()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword("for")?;
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.expr_list()?;
        let body = self.loop_body()?;
        if self.is_keyword("else") {
            return Err(self.error("'for ... else' is not supported"));
        }
        Ok(StmtKind::For { target, iter, body })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword("while")?;
        let test = self.expr()?;
        let body = self.loop_body()?;
        if self.is_keyword("else") {
            return Err(self.error("'while ... else' is not supported"));
        }
        Ok(StmtKind::While { test, body })
    }

    fn try_stmt(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword("try")?;
        let body = self.suite()?;
        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            let mut kinds = Vec::new();
            let mut name = None;
            if !self.is_op(":") {
                let clause = self.expr()?;
                collect_handler_kinds(&clause, &mut kinds);
                if self.eat_keyword("as") {
                    name = Some(self.identifier()?);
                }
            }
            let body = self.suite()?;
            handlers.push(Handler { kinds, name, body });
        }
        let finally = if self.eat_keyword("finally") {
            self.suite()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finally.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        if self.is_keyword("else") {
            return Err(self.error("'try ... else' is not supported"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            finally,
        })
    }

    fn def_stmt(&mut self, is_async: bool) -> Result<StmtKind, ParseError> {
        self.expect_keyword("def")?;
        let name = self.identifier()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.is_op(")") {
            if self.eat_op("**") || self.eat_op("*") {
                if self.is_op(",") || self.is_op(")") {
                    self.eat_op(",");
                    continue;
                }
            }
            params.push(self.identifier()?);
            if self.eat_op(":") {
                self.expr()?;
            }
            if self.eat_op("=") {
                self.expr()?;
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expr()?;
        }
        let saved_loops = std::mem::take(&mut self.loop_depth);
        self.def_depth += 1;
        let body = self.suite();
        self.def_depth -= 1;
        self.loop_depth = saved_loops;
        Ok(StmtKind::FunctionDef {
            name,
            is_async,
            params,
            body: body?,
        })
    }

    /// Whether the current token can begin an expression.
    fn starts_expr(&self) -> bool {
        match self.peek() {
            Tok::Name(n) => {
                !KEYWORDS.contains(&n.as_str())
                    || matches!(n.as_str(), "True" | "False" | "None" | "not" | "lambda")
            }
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr(_) => true,
            Tok::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+"),
            _ => false,
        }
    }

    /// Comma-separated expressions; more than one (or a trailing comma) forms a tuple.
    fn expr_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.expr()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expr() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    /// Assignment targets of `for` loops and comprehensions.
    fn target_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.arith()?;
        let target = if self.is_op(",") {
            let mut items = vec![first];
            while self.eat_op(",") {
                if self.is_keyword("in") {
                    break;
                }
                items.push(self.arith()?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        self.check_target(&target)?;
        Ok(target)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("lambda") {
            let mut params = Vec::new();
            while !self.is_op(":") {
                params.push(self.identifier()?);
                if self.eat_op("=") {
                    self.expr()?;
                }
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(":")?;
            let body = self.expr()?;
            return Ok(Expr::Lambda {
                params,
                body: Box::new(body),
            });
        }
        let body = self.or_test()?;
        if self.eat_keyword("if") {
            let test = self.or_test()?;
            self.expect_keyword("else")?;
            let orelse = self.expr()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_test(&mut self) -> Result<Expr, ParseError> {
        let first = self.and_test()?;
        if !self.is_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.and_test()?);
        }
        Ok(Expr::Or(values))
    }

    fn and_test(&mut self) -> Result<Expr, ParseError> {
        let first = self.not_test()?;
        if !self.is_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.not_test()?);
        }
        Ok(Expr::And(values))
    }

    fn not_test(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            let operand = self.not_test()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.arith()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek().clone() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::NotEq,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::LtE,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::GtE,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && matches!(self.peek_at(1), Tok::Name(m) if m == "in") => {
                    self.advance();
                    CmpOp::NotIn
                }
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_at(1), Tok::Name(m) if m == "not") {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Tok::Op("-") => UnaryOp::Neg,
            Tok::Op("+") => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_op(".") {
                let attr = self.identifier()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, func: Expr) -> Result<Expr, ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.is_op(")") {
            if self.is_op("*") || self.is_op("**") {
                return Err(self.error("star arguments are not supported"));
            }
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Tok::Name(name), Tok::Op("=")) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.is_keyword("for") {
                    args.push(self.comprehension(CompKind::Generator, arg, None)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> Result<Expr, ParseError> {
        let lower = if self.is_op(":") {
            None
        } else {
            Some(self.expr_list()?)
        };
        if !self.eat_op(":") {
            return lower.ok_or_else(|| self.error("invalid subscript"));
        }
        let upper = if self.is_op(":") || self.is_op("]") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat_op(":") && !self.is_op("]") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice {
            lower: lower.map(Box::new),
            upper,
            step,
        })
    }

    fn comprehension(
        &mut self,
        kind: CompKind,
        elt: Expr,
        value: Option<Expr>,
    ) -> Result<Expr, ParseError> {
        let mut clauses = Vec::new();
        while self.eat_keyword("for") {
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.eat_keyword("if") {
                conditions.push(self.or_test()?);
            }
            clauses.push(CompFor {
                target,
                iter,
                conditions,
            });
        }
        Ok(Expr::Comp {
            kind,
            elt: Box::new(elt),
            value: value.map(Box::new),
            clauses,
        })
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Tok::Name(name) => match name.as_str() {
                "True" | "False" | "None" => {
                    self.advance();
                    Ok(Expr::Const(match name.as_str() {
                        "True" => Value::Bool(true),
                        "False" => Value::Bool(false),
                        _ => Value::None,
                    }))
                }
                kw if KEYWORDS.contains(&kw) => Err(self.error("invalid syntax")),
                _ => {
                    self.advance();
                    Ok(Expr::Name(name))
                }
            },
            Tok::Int(i) => {
                self.advance();
                Ok(Expr::Const(Value::Int(i)))
            }
            Tok::Float(f) => {
                self.advance();
                Ok(Expr::Const(Value::Float(f)))
            }
            Tok::Str(_) | Tok::FStr(_) => self.strings(),
            Tok::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.is_keyword("for") {
                    let comp = self.comprehension(CompKind::Generator, first, None)?;
                    self.expect_op(")")?;
                    return Ok(comp);
                }
                if !self.is_op(",") {
                    self.expect_op(")")?;
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op(")") {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                if self.is_keyword("for") {
                    let comp = self.comprehension(CompKind::List, first, None)?;
                    self.expect_op("]")?;
                    return Ok(comp);
                }
                let items = self.rest_of_items(first, "]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.advance();
                if self.eat_op("}") {
                    return Ok(Expr::Dict(Vec::new()));
                }
                let first = self.expr()?;
                if self.eat_op(":") {
                    let value = self.expr()?;
                    if self.is_keyword("for") {
                        let comp = self.comprehension(CompKind::Dict, first, Some(value))?;
                        self.expect_op("}")?;
                        return Ok(comp);
                    }
                    let mut pairs = vec![(first, value)];
                    while self.eat_op(",") {
                        if self.is_op("}") {
                            break;
                        }
                        let key = self.expr()?;
                        self.expect_op(":")?;
                        pairs.push((key, self.expr()?));
                    }
                    self.expect_op("}")?;
                    return Ok(Expr::Dict(pairs));
                }
                if self.is_keyword("for") {
                    let comp = self.comprehension(CompKind::Set, first, None)?;
                    self.expect_op("}")?;
                    return Ok(comp);
                }
                let items = self.rest_of_items(first, "}")?;
                Ok(Expr::Set(items))
            }
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn rest_of_items(&mut self, first: Expr, close: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op(close) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op(close)?;
        Ok(items)
    }

    /// Adjacent string literals concatenate; any f-string makes the whole run formatted.
    fn strings(&mut self) -> Result<Expr, ParseError> {
        let mut parts = Vec::new();
        let mut formatted = false;
        loop {
            let line = self.line();
            match self.peek().clone() {
                Tok::Str(s) => {
                    self.advance();
                    parts.push(FPart::Lit(s));
                }
                Tok::FStr(raw) => {
                    self.advance();
                    formatted = true;
                    parts.extend(fstring_parts(&raw, line)?);
                }
                _ => break,
            }
        }
        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text = parts
            .into_iter()
            .map(|part| match part {
                FPart::Lit(s) => s,
                FPart::Field { .. } => String::new(),
            })
            .collect::<String>();
        Ok(Expr::Const(Value::Str(text)))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn collect_handler_kinds(clause: &Expr, kinds: &mut Vec<String>) {
    match clause {
        Expr::Name(name) => kinds.push(name.clone()),
        Expr::Attribute { value, attr } => match value.as_ref() {
            Expr::Name(base) => kinds.push(format!("{base}.{attr}")),
            _ => kinds.push(attr.clone()),
        },
        Expr::Tuple(items) => {
            for item in items {
                collect_handler_kinds(item, kinds);
            }
        }
        _ => {}
    }
}

fn fstring_parts(raw: &str, line: usize) -> Result<Vec<FPart>, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(ParseError::invalid(
                    "f-string: single '}' is not allowed",
                    line,
                ));
            }
            '{' => {
                let (end, field) = fstring_field(&chars, i + 1, line)?;
                if !literal.is_empty() {
                    parts.push(FPart::Lit(std::mem::take(&mut literal)));
                }
                parts.push(field);
                i = end + 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(FPart::Lit(literal));
    }
    Ok(parts)
}

/// Parse one `{expr[!r][:spec]}` field starting after the brace; returns the closing index.
fn fstring_field(chars: &[char], start: usize, line: usize) -> Result<(usize, FPart), ParseError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut colon = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
        } else {
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '}' if depth > 0 => depth -= 1,
                '}' => break,
                ':' if depth == 0 && colon.is_none() => colon = Some(i),
                _ => {}
            }
        }
        i += 1;
    }
    if i >= chars.len() {
        return Err(ParseError::invalid("f-string: expecting '}'", line));
    }
    let expr_end = colon.unwrap_or(i);
    let mut expr_text: String = chars[start..expr_end].iter().collect();
    let spec = colon.map(|c| chars[c + 1..i].iter().collect::<String>());
    let mut repr = false;
    let trimmed = expr_text.trim_end().to_string();
    if let Some(stripped) = trimmed.strip_suffix("!r") {
        repr = true;
        expr_text = stripped.to_string();
    } else if let Some(stripped) = trimmed.strip_suffix("!s") {
        expr_text = stripped.to_string();
    }
    if expr_text.trim().is_empty() {
        return Err(ParseError::invalid(
            "f-string: empty expression not allowed",
            line,
        ));
    }
    let expr = parse_expression(&expr_text)
        .map_err(|err| ParseError::invalid(format!("f-string: {}", err.message), line))?;
    Ok((
        i,
        FPart::Field {
            expr: Box::new(expr),
            repr,
            spec,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_program(src).expect("parse")
    }

    #[test]
    fn records_line_ranges_of_compound_statements() {
        let stmts = parse("x = 1\nfor i in range(3):\n    x += i\n\nprint(x)\n");
        let ranges: Vec<_> = stmts.iter().map(|s| (s.line, s.end_line)).collect();
        assert_eq!(ranges, vec![(1, 1), (2, 3), (5, 5)]);
    }

    #[test]
    fn open_block_header_is_incomplete() {
        let err = parse_program("if ready:\n").expect_err("incomplete");
        assert!(err.is_incomplete());
        let err = parse_program("run(\"go\",").expect_err("incomplete");
        assert!(err.is_incomplete());
    }

    #[test]
    fn dangling_operator_is_invalid() {
        let err = parse_program("x = 1 +\n").expect_err("invalid");
        assert!(!err.is_incomplete());
    }

    #[test]
    fn return_outside_def_is_invalid() {
        let err = parse_program("return 5\n").expect_err("invalid");
        assert!(err.message.contains("outside function"));
        parse("def f(a, b=1):\n    return a\n");
    }

    #[test]
    fn unsupported_statements_are_rejected() {
        for src in ["class A:\n    pass\n", "with x as y:\n    pass\n", "global g\n"] {
            let err = parse_program(src).expect_err("unsupported");
            assert!(!err.is_incomplete(), "{src}");
        }
    }

    #[test]
    fn comprehension_and_ternary_parse() {
        let stmts = parse("ys = [x * 2 for x in xs if x > 1]\nz = a if ok else b\n");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign { value: Expr::Comp { kind: CompKind::List, .. }, .. }
        ));
    }

    #[test]
    fn fstring_fields_are_parsed() {
        let stmts = parse("s = f\"{name!r} has {count:.2f} {{x}}\"\n");
        let StmtKind::Assign { value: Expr::FString(parts), .. } = &stmts[0].kind else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3], FPart::Lit(" {x}".into()));
    }

    #[test]
    fn semicolons_split_simple_statements() {
        let stmts = parse("a = 1; b = 2\n");
        assert_eq!(stmts.len(), 2);
        assert_eq!((stmts[1].line, stmts[1].end_line), (1, 1));
    }
}
