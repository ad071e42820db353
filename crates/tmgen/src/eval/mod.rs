//! partial evaluation
//!
//! [Context::partial_eval] reduces an [Expr] as far as the bound names allow. Whatever can be
//! resolved becomes [Expr::Literal], the rest is kept as an expression (with resolved parts
//! substituted inline) so it can be re-serialized for downstream tools.
//!
//! Bound names:
//! - `global.*`: resolved globals of the current directory
//! - `terramate.*`: metadata of the current stack / project
//! - `tm_*` functions (see [functions::Functions::standard])
//!
//! Any other root name (`var.x`, `local.y`, `module.z`...) and any other function call is left
//! unresolved. For-expression variables and the splat element are tracked as locals.
mod error;
pub mod functions;
mod operators;

pub use error::{EvalError, FunctionError};
pub use functions::Functions;

use crate::ast::{
    self, Binary, Conditional, Expr, ForExpr, FuncCall, Index, ObjectItem, ObjectKey,
    Splat, Traversal, Traverser, Unary,
};
use crate::globals::Globals;
use crate::project_path::ProjectPath;
use crate::tokens::is_identifier;
use crate::value::Value;
use crate::vendor::VendorResolver;
use indexmap::IndexMap;

/// Name bound to the current element while evaluating the `each` part of a splat
const SPLAT_ELEMENT: &str = "";

/// Bindings for partial evaluation
pub struct Context<'a> {
    functions: &'a Functions,
    globals: Option<&'a Globals>,
    metadata: Option<&'a Value>,
    vendor: Option<VendorBinding<'a>>,
}

/// Binds `tm_vendor` to a resolver. Results are relative to `file_dir`.
struct VendorBinding<'a> {
    resolver: &'a dyn VendorResolver,
    file_dir: ProjectPath,
}

impl<'a> Context<'a> {
    /// A context with only functions bound
    pub fn new(functions: &'a Functions) -> Self {
        Self {
            functions,
            globals: None,
            metadata: None,
            vendor: None,
        }
    }

    pub fn with_globals(mut self, globals: &'a Globals) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn with_metadata(mut self, metadata: &'a Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_vendor(mut self, resolver: &'a dyn VendorResolver, file_dir: ProjectPath) -> Self {
        self.vendor = Some(VendorBinding { resolver, file_dir });
        self
    }

    pub fn partial_eval(&self, expr: &Expr) -> Result<Expr, EvalError> {
        Evaluator::new(self).eval(expr)
    }

    /// Evaluates an expression that must resolve completely
    pub fn eval_value(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.partial_eval(expr)?
            .into_value()
            .map_err(|unresolved| EvalError::Unresolved(unresolved.to_string()))
    }
}

struct Local {
    name: String,
    /// `None` shadows outer names without providing a value
    value: Option<Value>,
}

struct Evaluator<'c, 'a> {
    ctx: &'c Context<'a>,
    locals: Vec<Local>,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    fn new(ctx: &'c Context<'a>) -> Self {
        Self {
            ctx,
            locals: vec![],
        }
    }

    fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().rev().find(|local| local.name == name)
    }

    fn with_locals<T>(&mut self, locals: Vec<Local>, f: impl FnOnce(&mut Self) -> T) -> T {
        let depth = self.locals.len();
        self.locals.extend(locals);
        let result = f(self);
        self.locals.truncate(depth);
        result
    }

    fn eval(&mut self, expr: &Expr) -> Result<Expr, EvalError> {
        match expr {
            Expr::Literal(_) => Ok(expr.clone()),
            Expr::Template(parts) => self.eval_template(parts),
            // a single interpolation yields the value itself, not its string form
            Expr::TemplateWrap(inner) => Ok(match self.eval(inner)? {
                resolved @ Expr::Literal(_) => resolved,
                unresolved => Expr::TemplateWrap(Box::new(unresolved)),
            }),
            Expr::Unary(unary) => {
                let operand = self.eval(&unary.expr)?;
                match operand {
                    Expr::Literal(value) => Ok(operators::unary(unary.operator, value)?.into()),
                    operand => Ok(Expr::Unary(Box::new(Unary {
                        operator: unary.operator,
                        expr: operand,
                    }))),
                }
            }
            Expr::Binary(binary) => {
                let lhs = self.eval(&binary.lhs)?;
                let rhs = self.eval(&binary.rhs)?;
                match (lhs, rhs) {
                    (Expr::Literal(lhs), Expr::Literal(rhs)) => {
                        Ok(operators::binary(binary.operator, lhs, rhs)?.into())
                    }
                    (lhs, rhs) => Ok(Expr::Binary(Box::new(Binary {
                        lhs,
                        operator: binary.operator,
                        rhs,
                    }))),
                }
            }
            Expr::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(collapse_tuple(items))
            }
            Expr::Object(items) => self.eval_object(items),
            Expr::Conditional(cond) => self.eval_conditional(cond),
            Expr::FuncCall(call) => self.eval_call(call),
            Expr::Index(index) => {
                let collection = self.eval(&index.collection)?;
                let key = self.eval(&index.key)?;
                match (collection, key) {
                    (Expr::Literal(collection), Expr::Literal(key)) => {
                        Ok(index_value(&collection, &key)?.into())
                    }
                    (collection, key) => Ok(Expr::Index(Box::new(Index { collection, key }))),
                }
            }
            Expr::Splat(splat) => self.eval_splat(splat),
            Expr::ScopeTraversal(traversal) => self.eval_scope_traversal(traversal),
            Expr::RelativeTraversal(relative) => {
                let source = self.eval(&relative.source)?;
                apply_steps(source, &relative.traversal.0)
            }
            Expr::Parens(inner) => Ok(match self.eval(inner)? {
                resolved @ Expr::Literal(_) => resolved,
                unresolved => Expr::Parens(Box::new(unresolved)),
            }),
            Expr::For(forexpr) => self.eval_for(forexpr),
            Expr::AnonSymbol => match self.local(SPLAT_ELEMENT) {
                Some(Local {
                    value: Some(element),
                    ..
                }) => Ok(element.clone().into()),
                _ => Ok(Expr::AnonSymbol),
            },
        }
    }

    fn eval_template(&mut self, parts: &[Expr]) -> Result<Expr, EvalError> {
        let mut evaluated = vec![];
        for part in parts {
            match self.eval(part)? {
                Expr::Literal(value) => {
                    let text = value
                        .to_template_string()
                        .ok_or(EvalError::TemplateInterpolation(value.type_name()))?;
                    ast::push_literal(&mut evaluated, text);
                }
                unresolved => evaluated.push(unresolved),
            }
        }

        if evaluated.is_empty() {
            return Ok(Expr::Literal(Value::String(String::new())));
        }
        if evaluated.len() == 1 && evaluated[0].as_value().is_some() {
            return Ok(evaluated.remove(0));
        }
        Ok(Expr::Template(evaluated))
    }

    fn eval_object(&mut self, items: &[ObjectItem]) -> Result<Expr, EvalError> {
        let mut evaluated: Vec<(ObjectKey, Expr)> = Vec::with_capacity(items.len());

        for item in items {
            let key = match &item.key {
                ObjectKey::Ident(ident) => ObjectKey::Ident(ident.clone()),
                ObjectKey::Expr(key) => match self.eval(key)? {
                    Expr::Literal(value) => {
                        let key = value.to_template_string().ok_or(EvalError::TypeMismatch {
                            expected: "string",
                            found: value.type_name(),
                        })?;
                        if is_identifier(&key) {
                            ObjectKey::Ident(key)
                        } else {
                            ObjectKey::Expr(Expr::Literal(key.into()))
                        }
                    }
                    unresolved => ObjectKey::Expr(unresolved),
                },
            };
            evaluated.push((key, self.eval(&item.value)?));
        }

        let resolved = evaluated.iter().all(|(key, value)| {
            matches!(key, ObjectKey::Ident(_) | ObjectKey::Expr(Expr::Literal(_)))
                && matches!(value, Expr::Literal(_))
        });

        if !resolved {
            return Ok(Expr::Object(
                evaluated
                    .into_iter()
                    .map(|(key, value)| ObjectItem { key, value })
                    .collect(),
            ));
        }

        let mut object = IndexMap::with_capacity(evaluated.len());
        for (key, value) in evaluated {
            let key = match key {
                ObjectKey::Ident(ident) => ident,
                ObjectKey::Expr(Expr::Literal(Value::String(key))) => key,
                _ => unreachable!("object keys are resolved strings"),
            };
            if let Expr::Literal(value) = value {
                object.insert(key, value);
            }
        }
        Ok(Expr::Literal(Value::Object(object)))
    }

    fn eval_conditional(&mut self, cond: &Conditional) -> Result<Expr, EvalError> {
        match self.eval(&cond.condition)? {
            Expr::Literal(Value::Boolean(true)) => self.eval(&cond.true_expr),
            Expr::Literal(Value::Boolean(false)) => self.eval(&cond.false_expr),
            Expr::Literal(other) => Err(EvalError::TypeMismatch {
                expected: "bool",
                found: other.type_name(),
            }),
            condition => Ok(Expr::Conditional(Box::new(Conditional {
                condition,
                true_expr: self.eval(&cond.true_expr)?,
                false_expr: self.eval(&cond.false_expr)?,
            }))),
        }
    }

    fn eval_call(&mut self, call: &FuncCall) -> Result<Expr, EvalError> {
        let is_library_call = call.name.starts_with("tm_");
        if is_library_call
            && call.name != functions::VENDOR_FUNCTION
            && self.ctx.functions.get(&call.name).is_none()
        {
            return Err(EvalError::UndefinedFunction(call.name.clone()));
        }

        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let unresolved = || {
            Ok(Expr::FuncCall(FuncCall {
                name: call.name.clone(),
                args: args.clone(),
                expand_final: call.expand_final,
            }))
        };

        if !is_library_call || args.iter().any(|arg| arg.as_value().is_none()) {
            return unresolved();
        }

        let mut values: Vec<Value> = args.iter().filter_map(Expr::as_value).cloned().collect();
        if call.expand_final {
            match values.pop() {
                Some(Value::Array(expanded)) => values.extend(expanded),
                Some(other) => {
                    return Err(EvalError::Function {
                        name: call.name.clone(),
                        source: FunctionError::ExpandNonList(other.type_name()),
                    })
                }
                None => {}
            }
        }

        if call.name == functions::VENDOR_FUNCTION {
            return match &self.ctx.vendor {
                Some(vendor) => Ok(Value::String(vendor_path(vendor, values)?).into()),
                // substituted later, once the file being generated is known
                None => unresolved(),
            };
        }

        let Some(func) = self.ctx.functions.get(&call.name) else {
            return Err(EvalError::UndefinedFunction(call.name.clone()));
        };

        tracing::trace!(function = %call.name, "calling");
        func.call(values)
            .map(Expr::Literal)
            .map_err(|source| EvalError::Function {
                name: call.name.clone(),
                source,
            })
    }

    fn eval_splat(&mut self, splat: &Splat) -> Result<Expr, EvalError> {
        let elements = match self.eval(&splat.source)? {
            Expr::Literal(Value::Null) => vec![],
            Expr::Literal(Value::Array(elements)) => elements,
            Expr::Literal(single) => vec![single],
            source => {
                let each = self.with_locals(vec![splat_element(None)], |this| this.eval(&splat.each))?;
                return Ok(Expr::Splat(Box::new(Splat { source, each })));
            }
        };

        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(self.with_locals(vec![splat_element(Some(element))], |this| {
                this.eval(&splat.each)
            })?);
        }
        Ok(collapse_tuple(items))
    }

    fn eval_scope_traversal(&mut self, traversal: &Traversal) -> Result<Expr, EvalError> {
        let Some(root) = traversal.root_name() else {
            return Ok(Expr::ScopeTraversal(traversal.clone()));
        };

        if let Some(local) = self.local(root) {
            return match &local.value {
                Some(value) => apply_steps(value.clone().into(), traversal.steps()),
                None => Ok(Expr::ScopeTraversal(traversal.clone())),
            };
        }

        match root {
            "global" => {
                let globals = self
                    .ctx
                    .globals
                    .ok_or(EvalError::UnavailableNamespace("global"))?;

                let Some(name) = traversal.first_key() else {
                    // `global` on its own is the object of all globals
                    let all = globals_object(globals);
                    let all = self.resolve_spliced(&all)?;
                    return apply_steps(all, traversal.steps());
                };

                let expr = globals
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownGlobal(name.to_string()))?;
                let expr = self.resolve_spliced(expr)?;
                apply_steps(expr, &traversal.steps()[1..])
            }
            "terramate" => {
                let metadata = self
                    .ctx
                    .metadata
                    .ok_or(EvalError::UnavailableNamespace("terramate"))?;

                let mut current = metadata;
                for step in traversal.steps() {
                    current = get_step(current, step).map_err(|_| {
                        EvalError::UnknownMetadata(Expr::ScopeTraversal(traversal.clone()).to_string())
                    })?;
                }
                Ok(current.clone().into())
            }
            _ => Ok(Expr::ScopeTraversal(traversal.clone())),
        }
    }

    /// Re-evaluates a partially evaluated global where it is consumed, so bindings missing at
    /// definition time (`tm_vendor`) apply. Locals of the consumer are not visible to it.
    fn resolve_spliced(&self, expr: &Expr) -> Result<Expr, EvalError> {
        match expr {
            Expr::Literal(_) => Ok(expr.clone()),
            partial => Ok(Evaluator::new(self.ctx).eval(partial)?.into_operand()),
        }
    }

    fn eval_for(&mut self, forexpr: &ForExpr) -> Result<Expr, EvalError> {
        let collection = self.eval(&forexpr.collection)?;

        if let Expr::Literal(collection) = &collection {
            if let Some(resolved) = self.eval_for_resolved(forexpr, collection)? {
                return Ok(resolved);
            }
        }

        // keep the comprehension, evaluating its parts with the loop variables unknown
        let mut shadowed = vec![Local {
            name: forexpr.value_var.clone(),
            value: None,
        }];
        if let Some(key_var) = &forexpr.key_var {
            shadowed.push(Local {
                name: key_var.clone(),
                value: None,
            });
        }

        self.with_locals(shadowed, |this| -> Result<Expr, EvalError> {
            Ok(Expr::For(Box::new(ForExpr {
                key_var: forexpr.key_var.clone(),
                value_var: forexpr.value_var.clone(),
                collection,
                key_expr: forexpr.key_expr.as_ref().map(|e| this.eval(e)).transpose()?,
                value_expr: this.eval(&forexpr.value_expr)?,
                grouping: forexpr.grouping,
                condition: forexpr.condition.as_ref().map(|e| this.eval(e)).transpose()?,
            })))
        })
    }

    /// Runs a comprehension over a resolved collection. `None` when some part of the body does
    /// not resolve.
    fn eval_for_resolved(
        &mut self,
        forexpr: &ForExpr,
        collection: &Value,
    ) -> Result<Option<Expr>, EvalError> {
        let entries: Vec<(Value, Value)> = match collection {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::Integer(i as i64), item.clone()))
                .collect(),
            Value::Object(object) => object
                .iter()
                .map(|(key, value)| (Value::String(key.clone()), value.clone()))
                .collect(),
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: "list or object",
                    found: other.type_name(),
                })
            }
        };

        let mut list = vec![];
        let mut object: IndexMap<String, Value> = IndexMap::new();

        for (key, value) in entries {
            let mut locals = vec![Local {
                name: forexpr.value_var.clone(),
                value: Some(value),
            }];
            if let Some(key_var) = &forexpr.key_var {
                locals.push(Local {
                    name: key_var.clone(),
                    value: Some(key),
                });
            }

            match self.with_locals(locals, |this| this.eval_iteration(forexpr))? {
                Iteration::Skipped => {}
                Iteration::Unresolved => return Ok(None),
                Iteration::Produced(None, value) => list.push(value),
                Iteration::Produced(Some(key), value) => {
                    let key = key.to_template_string().ok_or(EvalError::TypeMismatch {
                        expected: "string",
                        found: key.type_name(),
                    })?;

                    if forexpr.grouping {
                        if let Value::Array(group) =
                            object.entry(key).or_insert_with(|| Value::Array(vec![]))
                        {
                            group.push(value);
                        }
                    } else if object.contains_key(&key) {
                        return Err(EvalError::DuplicateKey(key));
                    } else {
                        object.insert(key, value);
                    }
                }
            }
        }

        Ok(Some(match forexpr.key_expr {
            Some(_) => Value::Object(object).into(),
            None => Value::Array(list).into(),
        }))
    }

    fn eval_iteration(&mut self, forexpr: &ForExpr) -> Result<Iteration, EvalError> {
        if let Some(condition) = &forexpr.condition {
            match self.eval(condition)? {
                Expr::Literal(Value::Boolean(true)) => {}
                Expr::Literal(Value::Boolean(false)) => return Ok(Iteration::Skipped),
                Expr::Literal(other) => {
                    return Err(EvalError::TypeMismatch {
                        expected: "bool",
                        found: other.type_name(),
                    })
                }
                _ => return Ok(Iteration::Unresolved),
            }
        }

        let key = match &forexpr.key_expr {
            Some(key_expr) => match self.eval(key_expr)? {
                Expr::Literal(key) => Some(key),
                _ => return Ok(Iteration::Unresolved),
            },
            None => None,
        };

        match self.eval(&forexpr.value_expr)? {
            Expr::Literal(value) => Ok(Iteration::Produced(key, value)),
            _ => Ok(Iteration::Unresolved),
        }
    }
}

enum Iteration {
    Skipped,
    Unresolved,
    /// optional key (object comprehensions) and value
    Produced(Option<Value>, Value),
}

fn splat_element(value: Option<Value>) -> Local {
    Local {
        name: SPLAT_ELEMENT.to_string(),
        value,
    }
}

fn collapse_tuple(items: Vec<Expr>) -> Expr {
    if items.iter().all(|item| item.as_value().is_some()) {
        return Expr::Literal(Value::Array(
            items.into_iter().filter_map(|item| item.into_value().ok()).collect(),
        ));
    }
    Expr::Tuple(items)
}

fn globals_object(globals: &Globals) -> Expr {
    let mut object = IndexMap::new();
    let mut items = vec![];
    for (name, expr) in globals.iter() {
        if let Expr::Literal(value) = expr {
            object.insert(name.to_string(), value.clone());
        }
        items.push(ObjectItem {
            key: ObjectKey::Ident(name.to_string()),
            value: expr.clone(),
        });
    }

    if object.len() == items.len() {
        Expr::Literal(Value::Object(object))
    } else {
        Expr::Object(items)
    }
}

fn vendor_path(vendor: &VendorBinding, args: Vec<Value>) -> Result<String, EvalError> {
    let [Value::String(reference)] = args.as_slice() else {
        return Err(EvalError::Function {
            name: functions::VENDOR_FUNCTION.to_string(),
            source: FunctionError::Invalid("expects a single string argument".into()),
        });
    };

    let path = vendor
        .resolver
        .resolve_vendor_ref(reference)
        .map_err(|source| EvalError::Vendor {
            reference: reference.clone(),
            source,
        })?;
    Ok(path.relative_to(&vendor.file_dir))
}

/// Follows traversal steps from an evaluated expression
///
/// Steps into literal objects and lists of a partially evaluated expression are taken where
/// possible, otherwise they are appended for re-serialization.
fn apply_steps(mut current: Expr, steps: &[Traverser]) -> Result<Expr, EvalError> {
    for step in steps {
        current = match current {
            Expr::Literal(value) => get_step(&value, step)?.clone().into(),
            Expr::Object(mut items) => {
                let key = step_key(step);
                let position = key
                    .as_deref()
                    .and_then(|key| items.iter().position(|item| object_key_is(&item.key, key)));
                let dynamic_keys = items
                    .iter()
                    .any(|item| matches!(&item.key, ObjectKey::Expr(key) if key.as_value().is_none()));

                match (position, key) {
                    (Some(position), _) => items.swap_remove(position).value,
                    (None, Some(key)) if !dynamic_keys => {
                        return Err(EvalError::MissingAttribute(key))
                    }
                    _ => ast::push_step(Expr::Object(items), step.clone()),
                }
            }
            Expr::Tuple(mut items) => match step {
                Traverser::Index(Value::Integer(index))
                    if usize::try_from(*index).is_ok_and(|i| i < items.len()) =>
                {
                    items.swap_remove(*index as usize)
                }
                _ => ast::push_step(Expr::Tuple(items), step.clone()),
            },
            other => ast::push_step(other.into_operand(), step.clone()),
        };
    }
    Ok(current)
}

fn step_key(step: &Traverser) -> Option<String> {
    match step {
        Traverser::Attr(name) => Some(name.clone()),
        Traverser::Index(key) => key.to_template_string(),
        Traverser::Root(_) => None,
    }
}

fn object_key_is(key: &ObjectKey, name: &str) -> bool {
    match key {
        ObjectKey::Ident(ident) => ident == name,
        ObjectKey::Expr(Expr::Literal(Value::String(s))) => s == name,
        ObjectKey::Expr(_) => false,
    }
}

fn get_step<'v>(value: &'v Value, step: &Traverser) -> Result<&'v Value, EvalError> {
    match step {
        Traverser::Attr(name) => match value {
            Value::Object(object) => object
                .get(name)
                .ok_or_else(|| EvalError::MissingAttribute(name.clone())),
            other => Err(EvalError::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        },
        Traverser::Index(key) => index_value_ref(value, key),
        Traverser::Root(name) => unreachable!("root step `{name}` inside a traversal"),
    }
}

fn index_value(collection: &Value, key: &Value) -> Result<Value, EvalError> {
    index_value_ref(collection, key).cloned()
}

fn index_value_ref<'v>(collection: &'v Value, key: &Value) -> Result<&'v Value, EvalError> {
    match collection {
        Value::Array(items) => {
            let index = match key {
                Value::Integer(int) => *int,
                Value::Decimal(dec) if dec.fract() == 0.0 => *dec as i64,
                Value::String(s) => s.parse().map_err(|_| EvalError::TypeMismatch {
                    expected: "number",
                    found: "string",
                })?,
                other => {
                    return Err(EvalError::TypeMismatch {
                        expected: "number",
                        found: other.type_name(),
                    })
                }
            };
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or(EvalError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })
        }
        Value::Object(object) => {
            let key = key.to_template_string().ok_or(EvalError::TypeMismatch {
                expected: "string",
                found: key.type_name(),
            })?;
            object
                .get(&key)
                .ok_or(EvalError::MissingAttribute(key))
        }
        other => Err(EvalError::TypeMismatch {
            expected: "list or object",
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use crate::vendor::VendorDir;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Expr {
        parse_expression(source).unwrap()
    }

    fn globals() -> Globals {
        [
            ("a", Expr::Literal(Value::Integer(1))),
            ("b", Expr::Literal("x".into())),
            ("partial", expr("var.prefix")),
        ]
        .into_iter()
        .collect()
    }

    fn partial_eval(source: &str) -> Result<Expr, EvalError> {
        let functions = Functions::standard();
        let globals = globals();
        Context::new(&functions)
            .with_globals(&globals)
            .partial_eval(&expr(source))
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        let functions = Functions::standard();
        let globals = globals();
        Context::new(&functions)
            .with_globals(&globals)
            .eval_value(&expr(source))
    }

    #[test]
    fn partial_substitution_reaches_unresolved_calls() {
        let result = partial_eval("global.a + unknown_fn(global.b)").unwrap();
        assert_eq!(result, expr(r#"1 + unknown_fn("x")"#));
        assert_eq!(result.to_string(), r#"1 + unknown_fn("x")"#);
    }

    #[test]
    fn templates() {
        assert_eq!(eval(r#""${global.a}-${global.b}""#).unwrap(), "1-x".into());
        assert_eq!(
            partial_eval(r#""${global.b}-${var.env}""#).unwrap(),
            expr(r#""x-${var.env}""#)
        );
        // a single interpolation keeps the value type
        assert_eq!(eval(r#""${global.a}""#).unwrap(), Value::Integer(1));
        assert!(matches!(
            eval(r#""a${[1]}""#),
            Err(EvalError::TemplateInterpolation("list"))
        ));
    }

    #[test]
    fn conditionals_are_lazy() {
        assert_eq!(eval("true ? global.a : global.missing").unwrap(), Value::Integer(1));
        assert_eq!(eval("global.a > 1 ? tm_nope() : global.b").unwrap(), "x".into());
        assert_eq!(
            partial_eval("var.enabled ? global.a : 2").unwrap(),
            expr("var.enabled ? 1 : 2")
        );
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(eval("2 * 3 + 1").unwrap(), Value::Integer(7));
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("10 - 2 - 3").unwrap(), Value::Integer(5));
        assert_eq!(eval("24 / 4 / 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("(10 - 2) * 3").unwrap(), Value::Integer(24));
        assert_eq!(eval("1 == 1 && 2 > 1").unwrap(), Value::Boolean(true));
        assert_eq!(eval("false && true || true").unwrap(), Value::Boolean(true));
        assert_eq!(eval("!false && global.a == 1").unwrap(), Value::Boolean(true));
        assert_eq!(eval("-global.a + 3").unwrap(), Value::Integer(2));
    }

    #[test]
    fn compound_conditions() {
        assert_eq!(eval(r#"1 > 2 ? "yes" : "no""#).unwrap(), "no".into());
        assert_eq!(eval("global.a + 1 > 1 ? global.b : 0").unwrap(), "x".into());
        assert_eq!(
            eval(r#"global.a == 1 && global.b == "x" ? 1 + 1 : 0"#).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(eval("false ? 1 : global.a > 0 ? 2 : 3").unwrap(), Value::Integer(2));
        assert_eq!(
            partial_eval("var.x > global.a ? 1 : 2").unwrap(),
            expr("var.x > 1 ? 1 : 2")
        );
    }

    #[test]
    fn comprehensions_and_splats() {
        assert_eq!(
            eval("[for x in [1, 2, 3] : x * 2 if x > 1]").unwrap(),
            vec![4i64, 6].into()
        );
        assert_eq!(
            eval(r#"{for k, v in {a = 1, b = 2} : "${k}_key" => v + global.a}"#).unwrap(),
            Value::Object(
                [
                    ("a_key".to_string(), Value::Integer(2)),
                    ("b_key".to_string(), Value::Integer(3))
                ]
                .into_iter()
                .collect()
            )
        );
        assert_eq!(
            eval(r#"{for v in ["a", "b", "a"] : v => v...}"#).unwrap(),
            Value::Object(
                [
                    ("a".to_string(), vec!["a", "a"].into()),
                    ("b".to_string(), vec!["b"].into())
                ]
                .into_iter()
                .collect()
            )
        );
        assert!(matches!(
            eval(r#"{for v in ["a", "a"] : v => v}"#),
            Err(EvalError::DuplicateKey(key)) if key == "a"
        ));
        assert_eq!(
            partial_eval("[for x in var.list : x + global.a]").unwrap(),
            expr("[for x in var.list : x + 1]")
        );
        assert_eq!(eval("[{ v = 1 }, { v = 2 }][*].v").unwrap(), vec![1i64, 2].into());
    }

    #[test]
    fn foreign_names_are_kept() {
        assert_eq!(partial_eval("var.x.y").unwrap(), expr("var.x.y"));
        assert_eq!(partial_eval("upper(global.b)").unwrap(), expr(r#"upper("x")"#));
        assert_eq!(partial_eval("global.partial").unwrap(), expr("var.prefix"));
        assert!(matches!(
            eval("var.x"),
            Err(EvalError::Unresolved(rendered)) if rendered == "var.x"
        ));
    }

    #[test]
    fn errors() {
        assert!(matches!(
            eval("tm_nope(1)"),
            Err(EvalError::UndefinedFunction(name)) if name == "tm_nope"
        ));
        assert!(matches!(
            eval("global.missing"),
            Err(EvalError::UnknownGlobal(name)) if name == "missing"
        ));
        assert!(matches!(
            eval("global.b * 2"),
            Err(EvalError::BinaryTypeMismatch { .. })
        ));
        assert!(matches!(
            eval("tm_upper()"),
            Err(EvalError::Function { name, .. }) if name == "tm_upper"
        ));

        let functions = Functions::standard();
        assert!(matches!(
            Context::new(&functions).eval_value(&expr("global.a")),
            Err(EvalError::UnavailableNamespace("global"))
        ));
    }

    #[test]
    fn function_calls() {
        assert_eq!(eval("tm_upper(global.b)").unwrap(), "X".into());
        assert_eq!(eval("tm_max([3, global.a, 2]...)").unwrap(), Value::Integer(3));
    }

    #[test]
    fn vendor_calls() {
        let source = r#"tm_vendor("github.com/org/repo?ref=v1")"#;
        assert_eq!(partial_eval(source).unwrap(), expr(source));

        let functions = Functions::standard();
        let vendor = VendorDir::default();
        let ctx = Context::new(&functions).with_vendor(&vendor, ProjectPath::new("/stacks/app"));
        assert_eq!(
            ctx.eval_value(&expr(source)).unwrap(),
            "../../modules/github.com/org/repo/v1".into()
        );
    }
}
