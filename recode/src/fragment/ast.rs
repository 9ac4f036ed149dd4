//! Syntax tree of the fragment language.

use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// First source line of the statement (1-based).
    pub line: usize,
    /// Last source line of the statement, including any nested body.
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Handler>,
        finally: Vec<Stmt>,
    },
    FunctionDef {
        name: String,
        is_async: bool,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Raise(Option<Expr>),
    Import(Vec<(String, Option<String>)>),
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    /// Exception names listed by the clause; empty for a bare `except:`.
    pub kinds: Vec<String>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    List,
    Set,
    Dict,
    /// Generator expressions are evaluated eagerly into a list.
    Generator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompFor {
    pub target: Expr,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Lit(String),
    Field {
        expr: Box<Expr>,
        repr: bool,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    FString(Vec<FPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comp {
        kind: CompKind,
        elt: Box<Expr>,
        /// Value expression of a dict comprehension.
        value: Option<Box<Expr>>,
        clauses: Vec<CompFor>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
}

impl Expr {
    /// Pre-order visit of this expression and every sub-expression.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Const(_) | Expr::Name(_) => {}
            Expr::FString(parts) => {
                for part in parts {
                    if let FPart::Field { expr, .. } = part {
                        expr.walk(visit);
                    }
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) | Expr::And(items)
            | Expr::Or(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Dict(pairs) => {
                for (k, v) in pairs {
                    k.walk(visit);
                    v.walk(visit);
                }
            }
            Expr::Comp {
                elt,
                value,
                clauses,
                ..
            } => {
                elt.walk(visit);
                if let Some(value) = value {
                    value.walk(visit);
                }
                for clause in clauses {
                    clause.target.walk(visit);
                    clause.iter.walk(visit);
                    for cond in &clause.conditions {
                        cond.walk(visit);
                    }
                }
            }
            Expr::Attribute { value, .. } => value.walk(visit),
            Expr::Subscript { value, index } => {
                value.walk(visit);
                index.walk(visit);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    part.walk(visit);
                }
            }
            Expr::Call { func, args, kwargs } => {
                func.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
                for (_, arg) in kwargs {
                    arg.walk(visit);
                }
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Compare { left, ops } => {
                left.walk(visit);
                for (_, right) in ops {
                    right.walk(visit);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                test.walk(visit);
                body.walk(visit);
                orelse.walk(visit);
            }
            Expr::Lambda { body, .. } => body.walk(visit),
        }
    }
}

impl Stmt {
    /// Expressions held directly by this statement (not by nested bodies).
    pub fn own_exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Expr(e) => vec![e],
            StmtKind::Assign { targets, value } => targets.iter().chain([value]).collect(),
            StmtKind::AugAssign { target, value, .. } => vec![target, value],
            StmtKind::If { branches, .. } => branches.iter().map(|(test, _)| test).collect(),
            StmtKind::For { target, iter, .. } => vec![target, iter],
            StmtKind::While { test, .. } => vec![test],
            StmtKind::Return(e) | StmtKind::Raise(e) => e.iter().collect(),
            StmtKind::Assert { test, msg } => [test].into_iter().chain(msg).collect(),
            StmtKind::Try { .. }
            | StmtKind::FunctionDef { .. }
            | StmtKind::Import(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass => Vec::new(),
        }
    }

    /// Nested statement bodies, in source order.
    pub fn bodies(&self) -> Vec<&[Stmt]> {
        match &self.kind {
            StmtKind::If { branches, orelse } => branches
                .iter()
                .map(|(_, body)| body.as_slice())
                .chain([orelse.as_slice()])
                .collect(),
            StmtKind::For { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::FunctionDef { body, .. } => vec![body.as_slice()],
            StmtKind::Try {
                body,
                handlers,
                finally,
            } => [body.as_slice()]
                .into_iter()
                .chain(handlers.iter().map(|h| h.body.as_slice()))
                .chain([finally.as_slice()])
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order visit of this statement and all nested statements.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Stmt)) {
        visit(self);
        for body in self.bodies() {
            for stmt in body {
                stmt.walk(visit);
            }
        }
    }
}

/// True if any statement defines a function or uses `lambda`.
pub fn contains_definition(stmts: &[Stmt]) -> bool {
    let mut found = false;
    for stmt in stmts {
        stmt.walk(&mut |s: &Stmt| {
            if matches!(s.kind, StmtKind::FunctionDef { .. }) {
                found = true;
            }
            for expr in s.own_exprs() {
                expr.walk(&mut |e: &Expr| {
                    if matches!(e, Expr::Lambda { .. }) {
                        found = true;
                    }
                });
            }
        });
    }
    found
}
