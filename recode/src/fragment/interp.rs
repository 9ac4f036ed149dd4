//! Tree-walking interpreter over a working copy of the namespace.

use std::collections::BTreeMap;

use super::Primitive;
use super::ast::{CompFor, CompKind, Expr, FPart, Handler, Stmt, StmtKind, UnaryOp};
use super::builtins::{call_builtin, call_re, is_builtin, re_attribute};
use super::error::{ErrorKind, EvalError};
use super::methods::{Args, call_method, format_value, is_mutating};
use super::ops::{binary, compare, dict_insert, get_item, item_mut, set_insert, set_item, slice};
use super::value::Value;

enum Flow {
    Normal,
    Break,
    Continue,
}

/// A bound variable plus the evaluated subscript keys leading into it.
type Place = (String, Vec<Value>);

pub(crate) struct Interpreter<'a> {
    scope: BTreeMap<String, Value>,
    primitive_name: &'a str,
    primitive: &'a mut dyn Primitive,
    output: String,
    actions: Vec<String>,
    iterations: usize,
    max_iterations: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        scope: BTreeMap<String, Value>,
        primitive_name: &'a str,
        primitive: &'a mut dyn Primitive,
        max_iterations: usize,
    ) -> Self {
        Self {
            scope,
            primitive_name,
            primitive,
            output: String::new(),
            actions: Vec::new(),
            iterations: 0,
            max_iterations,
        }
    }

    pub(crate) fn run(&mut self, program: &[Stmt]) -> Result<(), EvalError> {
        self.exec_block(program).map(|_| ())
    }

    /// Working scope, raw printed output, and the primitive actions issued.
    pub(crate) fn into_parts(self) -> (BTreeMap<String, Value>, String, Vec<String>) {
        (self.scope, self.output, self.actions)
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        self.iterations += 1;
        if self.iterations > self.max_iterations {
            return Err(EvalError::new(
                ErrorKind::Runtime,
                format!(
                    "loop iteration limit of {} exceeded",
                    self.max_iterations
                ),
            ));
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let updated = binary(*op, &current, &rhs)?;
                self.assign(target, updated)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For { target, iter, body } => {
                for item in self.eval(iter)?.iterate()? {
                    self.assign(target, item)?;
                    if let Flow::Break = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::While { test, body } => loop {
                self.tick()?;
                if !self.eval(test)?.truthy() {
                    break;
                }
                if let Flow::Break = self.exec_block(body)? {
                    break;
                }
            },
            StmtKind::Try {
                body,
                handlers,
                finally,
            } => return self.exec_try(body, handlers, finally),
            StmtKind::FunctionDef { name, .. } => {
                return Err(EvalError::new(
                    ErrorKind::Syntax,
                    format!("definition of '{name}' is not allowed in a fragment"),
                ));
            }
            StmtKind::Return(_) => {
                return Err(EvalError::new(
                    ErrorKind::Syntax,
                    "'return' outside function".to_string(),
                ));
            }
            StmtKind::Raise(expr) => return Err(self.raise(expr.as_ref())?),
            StmtKind::Import(modules) => {
                for (module, alias) in modules {
                    if module != "re" {
                        return Err(EvalError::new(
                            ErrorKind::ModuleNotFound,
                            format!("No module named '{module}'"),
                        ));
                    }
                    let bound = alias.clone().unwrap_or_else(|| module.clone());
                    self.scope.insert(bound, Value::Module(module.clone()));
                }
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test)?.truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg)?.to_display(),
                        None => String::new(),
                    };
                    return Err(EvalError::new(ErrorKind::Assertion, message));
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        finally: &[Stmt],
    ) -> Result<Flow, EvalError> {
        let mut result = self.exec_block(body);
        if let Err(err) = &result {
            let handler = handlers.iter().find(|h| {
                h.kinds.is_empty() || h.kinds.iter().any(|k| err.kind.caught_by(k))
            });
            if let Some(handler) = handler {
                if let Some(name) = &handler.name {
                    self.scope
                        .insert(name.clone(), Value::Str(err.message.clone()));
                }
                result = self.exec_block(&handler.body);
            }
        }
        match self.exec_block(finally)? {
            Flow::Normal => result,
            flow => Ok(flow),
        }
    }

    fn raise(&mut self, expr: Option<&Expr>) -> Result<EvalError, EvalError> {
        let exception_name = |name: &str| name.ends_with("Error") || name.ends_with("Exception");
        let Some(expr) = expr else {
            return Ok(EvalError::new(
                ErrorKind::Runtime,
                "No active exception to reraise".to_string(),
            ));
        };
        match expr {
            Expr::Call { func, args, .. } => {
                if let Expr::Name(kind) = func.as_ref() {
                    if exception_name(kind) {
                        let message = match args.first() {
                            Some(arg) => self.eval(arg)?.to_display(),
                            None => String::new(),
                        };
                        return Ok(EvalError::new(ErrorKind::from_name(kind), message));
                    }
                }
            }
            Expr::Name(kind) if exception_name(kind) => {
                return Ok(EvalError::new(ErrorKind::from_name(kind), String::new()));
            }
            _ => {}
        }
        self.eval(expr)?;
        Ok(EvalError::type_error(
            "exceptions must derive from BaseException",
        ))
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), EvalError> {
        match target {
            Expr::Name(name) => {
                self.scope.insert(name.clone(), value);
                Ok(())
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                let items = value.iterate()?;
                if items.len() != targets.len() {
                    let message = if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    };
                    return Err(EvalError::value_error(message));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Expr::Subscript {
                value: container,
                index,
            } => {
                if matches!(index.as_ref(), Expr::Slice { .. }) {
                    return Err(EvalError::type_error("slice assignment is not supported"));
                }
                match self.resolve_place(container)? {
                    Some((name, path)) => {
                        let key = self.eval(index)?;
                        let slot = self.place_mut(&name, &path)?;
                        set_item(slot, key, value)
                    }
                    None => {
                        let mut temporary = self.eval(container)?;
                        let key = self.eval(index)?;
                        set_item(&mut temporary, key, value)
                    }
                }
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object)?;
                Err(EvalError::new(
                    ErrorKind::Attribute,
                    format!(
                        "'{}' object attribute '{attr}' is read-only",
                        object.type_name()
                    ),
                ))
            }
            _ => Err(EvalError::new(
                ErrorKind::Syntax,
                "cannot assign to expression".to_string(),
            )),
        }
    }

    /// Resolve `name[k1][k2]...` rooted at a bound variable. Nothing is evaluated
    /// when the root is not a bound name.
    fn resolve_place(&mut self, expr: &Expr) -> Result<Option<Place>, EvalError> {
        match expr {
            Expr::Name(name) if self.scope.contains_key(name) => {
                Ok(Some((name.clone(), Vec::new())))
            }
            Expr::Subscript { value, index } if !matches!(index.as_ref(), Expr::Slice { .. }) => {
                let Some((name, mut path)) = self.resolve_place(value)? else {
                    return Ok(None);
                };
                path.push(self.eval(index)?);
                Ok(Some((name, path)))
            }
            _ => Ok(None),
        }
    }

    fn read_place(&self, name: &str, path: &[Value]) -> Result<Value, EvalError> {
        let mut current = self
            .scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::unbound_name(name))?;
        for key in path {
            current = get_item(&current, key)?;
        }
        Ok(current)
    }

    fn place_mut(&mut self, name: &str, path: &[Value]) -> Result<&mut Value, EvalError> {
        let mut slot = self
            .scope
            .get_mut(name)
            .ok_or_else(|| EvalError::unbound_name(name))?;
        for key in path {
            slot = item_mut(slot, key)?;
        }
        Ok(slot)
    }

    fn write_place(&mut self, name: &str, path: &[Value], value: Value) -> Result<(), EvalError> {
        match path.split_last() {
            None => {
                self.scope.insert(name.to_string(), value);
                Ok(())
            }
            Some((last, parents)) => {
                let slot = self.place_mut(name, parents)?;
                set_item(slot, last.clone(), value)
            }
        }
    }

    /// Name resolution: bound variables first, then the registered callables.
    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        if name == self.primitive_name || is_builtin(name) {
            return Ok(Value::Builtin(name.to_string()));
        }
        if name == "re" {
            return Ok(Value::Module(name.to_string()));
        }
        Err(EvalError::unbound_name(name))
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_keywords(
        &mut self,
        kwargs: &[(String, Expr)],
    ) -> Result<Vec<(String, Value)>, EvalError> {
        kwargs
            .iter()
            .map(|(name, e)| Ok((name.clone(), self.eval(e)?)))
            .collect()
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> Result<Option<Value>, EvalError> {
        expr.map(|e| self.eval(e)).transpose()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(text) => out.push_str(text),
                        FPart::Field { expr, repr, spec } => {
                            let value = self.eval(expr)?;
                            let value = if *repr {
                                Value::Str(value.repr())
                            } else {
                                value
                            };
                            out.push_str(&format_value(&value, spec.as_deref())?);
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::Set(items) => {
                let mut out = Vec::with_capacity(items.len());
                for value in self.eval_all(items)? {
                    set_insert(&mut out, value);
                }
                Ok(Value::Set(out))
            }
            Expr::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict_insert(&mut out, key, value);
                }
                Ok(Value::Dict(out))
            }
            Expr::Comp {
                kind,
                elt,
                value,
                clauses,
            } => self.eval_comp(*kind, elt, value.as_deref(), clauses),
            Expr::Attribute { value, attr } => match self.eval(value)? {
                Value::Module(module) => re_attribute(attr).ok_or_else(|| {
                    EvalError::new(
                        ErrorKind::Attribute,
                        format!("module '{module}' has no attribute '{attr}'"),
                    )
                }),
                other => Err(EvalError::new(
                    ErrorKind::Attribute,
                    format!("'{}' object has no attribute '{attr}'", other.type_name()),
                )),
            },
            Expr::Subscript { value, index } => {
                let container = self.eval(value)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let lower = self.eval_opt(lower.as_deref())?;
                    let upper = self.eval_opt(upper.as_deref())?;
                    let step = self.eval_opt(step.as_deref())?;
                    return slice(&container, lower, upper, step);
                }
                let key = self.eval(index)?;
                get_item(&container, &key)
            }
            Expr::Slice { .. } => Err(EvalError::new(
                ErrorKind::Syntax,
                "slice outside of a subscript".to_string(),
            )),
            Expr::Call { func, args, kwargs } => self.call(func, args, kwargs),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Compare { left, ops } => {
                let mut current = self.eval(left)?;
                for (op, right) in ops {
                    let right = self.eval(right)?;
                    if !compare(*op, &current, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    current = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(values) => {
                let mut last = Value::Bool(true);
                for value in values {
                    last = self.eval(value)?;
                    if !last.truthy() {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Or(values) => {
                let mut last = Value::Bool(false);
                for value in values {
                    last = self.eval(value)?;
                    if last.truthy() {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Lambda { .. } => Err(EvalError::new(
                ErrorKind::Syntax,
                "lambda is not allowed in a fragment".to_string(),
            )),
        }
    }

    fn eval_comp(
        &mut self,
        kind: CompKind,
        elt: &Expr,
        value: Option<&Expr>,
        clauses: &[CompFor],
    ) -> Result<Value, EvalError> {
        // Comprehension variables do not leak into the enclosing scope.
        let mut names = Vec::new();
        for clause in clauses {
            target_names(&clause.target, &mut names);
        }
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|name| {
                let old = self.scope.get(&name).cloned();
                (name, old)
            })
            .collect();

        let mut items = Vec::new();
        let mut pairs = Vec::new();
        let result = self.comp_level(clauses, elt, value, &mut items, &mut pairs);

        for (name, old) in saved {
            match old {
                Some(old) => {
                    self.scope.insert(name, old);
                }
                None => {
                    self.scope.remove(&name);
                }
            }
        }
        result?;

        Ok(match kind {
            CompKind::List | CompKind::Generator => Value::List(items),
            CompKind::Set => {
                let mut unique = Vec::with_capacity(items.len());
                for item in items {
                    set_insert(&mut unique, item);
                }
                Value::Set(unique)
            }
            CompKind::Dict => Value::Dict(pairs),
        })
    }

    fn comp_level(
        &mut self,
        clauses: &[CompFor],
        elt: &Expr,
        value: Option<&Expr>,
        items: &mut Vec<Value>,
        pairs: &mut Vec<(Value, Value)>,
    ) -> Result<(), EvalError> {
        let Some((clause, rest)) = clauses.split_first() else {
            match value {
                Some(value) => {
                    let key = self.eval(elt)?;
                    let value = self.eval(value)?;
                    dict_insert(pairs, key, value);
                }
                None => items.push(self.eval(elt)?),
            }
            return Ok(());
        };
        for item in self.eval(&clause.iter)?.iterate()? {
            self.assign(&clause.target, item)?;
            let mut keep = true;
            for cond in &clause.conditions {
                if !self.eval(cond)?.truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.comp_level(rest, elt, value, items, pairs)?;
            }
        }
        Ok(())
    }

    fn call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, EvalError> {
        if let Expr::Attribute { value, attr } = func {
            return self.invoke_method(value, attr, args, kwargs);
        }
        let callee = self.eval(func)?;
        let positional = self.eval_all(args)?;
        let keywords = self.eval_keywords(kwargs)?;
        match callee {
            Value::Builtin(name) if name == self.primitive_name => {
                self.call_primitive(positional, keywords)
            }
            Value::Builtin(name) if name == "print" => self.print(positional, keywords),
            Value::Builtin(name) => call_builtin(&name, positional, keywords),
            other => Err(EvalError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn invoke_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, EvalError> {
        let place = self.resolve_place(receiver)?;
        let mut target = match &place {
            Some((name, path)) => self.read_place(name, path)?,
            None => self.eval(receiver)?,
        };
        let positional = self.eval_all(args)?;
        let keywords = self.eval_keywords(kwargs)?;
        if let Value::Module(_) = target {
            return call_re(method, positional, keywords);
        }
        let result = call_method(&mut target, method, positional, keywords)?;
        if is_mutating(method) {
            if let Some((name, path)) = place {
                self.write_place(&name, &path, target)?;
            }
        }
        Ok(result)
    }

    fn call_primitive(
        &mut self,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        let name = self.primitive_name;
        let args = Args::new(name, positional, keywords);
        args.check(0, 1)?;
        let action = match args.arg(0, "action") {
            Some(Value::Str(action)) => action.clone(),
            Some(other) => {
                return Err(EvalError::type_error(format!(
                    "{name}() argument must be str, not {}",
                    other.type_name()
                )));
            }
            None => {
                return Err(EvalError::type_error(format!(
                    "{name}() missing 1 required positional argument: 'action'"
                )));
            }
        };
        self.actions.push(action.clone());
        match self.primitive.perform(&action) {
            Ok(observation) => {
                self.output.push_str(&observation);
                self.output.push('\n');
                Ok(Value::Str(observation))
            }
            Err(err) => Err(EvalError::new(ErrorKind::from_name(&err.kind), err.message)),
        }
    }

    fn print(
        &mut self,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Result<Value, EvalError> {
        let args = Args::new("print", positional, keywords);
        args.reject_keywords(&["sep", "end", "file", "flush"])?;
        let text_option = |key: &str, default: &str| match args.keyword(key) {
            None | Some(Value::None) => Ok(default.to_string()),
            Some(Value::Str(s)) => Ok(s.clone()),
            Some(other) => Err(EvalError::type_error(format!(
                "{key} must be None or a string, not {}",
                other.type_name()
            ))),
        };
        let sep = text_option("sep", " ")?;
        let end = text_option("end", "\n")?;
        let line = args
            .positional()
            .iter()
            .map(Value::to_display)
            .collect::<Vec<_>>()
            .join(&sep);
        self.output.push_str(&line);
        self.output.push_str(&end);
        Ok(Value::None)
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(|| {
            EvalError::new(ErrorKind::Runtime, "integer overflow".to_string())
        }),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        (UnaryOp::Pos, Value::Int(i)) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(f)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (op, other) => Err(EvalError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            other.type_name()
        ))),
    }
}

fn target_names(target: &Expr, out: &mut Vec<String>) {
    match target {
        Expr::Name(name) => out.push(name.clone()),
        Expr::Tuple(items) | Expr::List(items) => {
            for item in items {
                target_names(item, out);
            }
        }
        _ => {}
    }
}
