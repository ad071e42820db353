//! built-in function library
//!
//! Every function is pure and total over the parameter types declared in its [FuncDef]. Argument
//! count and types are checked before the function body runs.
use super::FunctionError;
use crate::value::Value;
use indexmap::IndexMap;

pub type FuncArgs = Vec<Value>;
pub type Func = fn(FuncArgs) -> Result<Value, FunctionError>;

/// Name of the vendoring function, bound by the evaluation context rather than this library
pub const VENDOR_FUNCTION: &str = "tm_vendor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    String,
    Number,
    Bool,
    List,
    Object,
    /// string, list or object
    HasLength,
}

impl ParamType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::String => matches!(value, Value::String(_)),
            ParamType::Number => value.is_number(),
            ParamType::Bool => matches!(value, Value::Boolean(_)),
            ParamType::List => matches!(value, Value::Array(_)),
            ParamType::Object => matches!(value, Value::Object(_)),
            ParamType::HasLength => {
                matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Object => "object",
            ParamType::HasLength => "string, list or object",
        }
    }
}

/// Function definition: parameters and the implementation
#[derive(Debug, Clone)]
pub struct FuncDef {
    func: Func,
    params: Vec<ParamType>,
    optional: Vec<ParamType>,
    variadic: Option<ParamType>,
}

impl FuncDef {
    pub fn builder() -> FuncDefBuilder {
        FuncDefBuilder::default()
    }

    pub fn call(&self, args: FuncArgs) -> Result<Value, FunctionError> {
        let min = self.params.len();
        let max = min + self.optional.len();

        if args.len() < min || (self.variadic.is_none() && args.len() > max) {
            let expected = match (self.variadic, self.optional.len()) {
                (Some(_), _) => format!("at least {min}"),
                (None, 0) => min.to_string(),
                (None, _) => format!("{min} to {max}"),
            };
            return Err(FunctionError::Arity {
                expected,
                got: args.len(),
            });
        }

        for (index, arg) in args.iter().enumerate() {
            let expected = self
                .params
                .iter()
                .chain(&self.optional)
                .nth(index)
                .or(self.variadic.as_ref())
                .copied()
                .unwrap_or(ParamType::Any);

            if !expected.accepts(arg) {
                return Err(FunctionError::ArgumentType {
                    index,
                    expected: expected.name(),
                    got: arg.type_name(),
                });
            }
        }

        (self.func)(args)
    }
}

#[derive(Debug, Default)]
pub struct FuncDefBuilder {
    params: Vec<ParamType>,
    optional: Vec<ParamType>,
    variadic: Option<ParamType>,
}

impl FuncDefBuilder {
    pub fn param(mut self, param: ParamType) -> Self {
        self.params.push(param);
        self
    }

    pub fn optional_param(mut self, param: ParamType) -> Self {
        self.optional.push(param);
        self
    }

    pub fn variadic_param(mut self, param: ParamType) -> Self {
        self.variadic = Some(param);
        self
    }

    pub fn build(self, func: Func) -> FuncDef {
        FuncDef {
            func,
            params: self.params,
            optional: self.optional,
            variadic: self.variadic,
        }
    }
}

/// A named set of functions
#[derive(Debug, Clone, Default)]
pub struct Functions(IndexMap<String, FuncDef>);

impl Functions {
    pub fn declare(&mut self, name: impl Into<String>, func: FuncDef) {
        self.0.insert(name.into(), func);
    }

    pub fn get(&self, name: &str) -> Option<&FuncDef> {
        self.0.get(name)
    }

    /// The `tm_` function library
    pub fn standard() -> Self {
        use ParamType::*;

        let mut functions = Functions::default();
        let mut declare = |name: &str, builder: FuncDefBuilder, func: Func| {
            functions.declare(name, builder.build(func))
        };

        // strings
        declare("tm_upper", FuncDef::builder().param(String), |args| {
            Ok(string(&args, 0)?.to_uppercase().into())
        });
        declare("tm_lower", FuncDef::builder().param(String), |args| {
            Ok(string(&args, 0)?.to_lowercase().into())
        });
        declare("tm_title", FuncDef::builder().param(String), title);
        declare("tm_trimspace", FuncDef::builder().param(String), |args| {
            Ok(string(&args, 0)?.trim().into())
        });
        declare("tm_chomp", FuncDef::builder().param(String), |args| {
            Ok(string(&args, 0)?.trim_end_matches(['\n', '\r']).into())
        });
        declare(
            "tm_replace",
            FuncDef::builder().param(String).param(String).param(String),
            |args| {
                let (s, search, replacement) = (string(&args, 0)?, string(&args, 1)?, string(&args, 2)?);
                if search.is_empty() {
                    return Ok(s.into());
                }
                Ok(s.replace(search, replacement).into())
            },
        );
        declare(
            "tm_split",
            FuncDef::builder().param(String).param(String),
            |args| {
                let (separator, s) = (string(&args, 0)?, string(&args, 1)?);
                if separator.is_empty() {
                    return Err(FunctionError::Invalid("separator must not be empty".into()));
                }
                Ok(Value::from(s.split(separator).collect::<Vec<_>>()))
            },
        );
        declare("tm_join", FuncDef::builder().param(String).param(List), join);
        declare(
            "tm_substr",
            FuncDef::builder().param(String).param(Number).param(Number),
            substr,
        );
        declare(
            "tm_startswith",
            FuncDef::builder().param(String).param(String),
            |args| Ok(string(&args, 0)?.starts_with(string(&args, 1)?).into()),
        );
        declare(
            "tm_endswith",
            FuncDef::builder().param(String).param(String),
            |args| Ok(string(&args, 0)?.ends_with(string(&args, 1)?).into()),
        );
        declare(
            "tm_format",
            FuncDef::builder().param(String).variadic_param(Any),
            format,
        );

        // numbers
        declare("tm_floor", FuncDef::builder().param(Number), |args| {
            Ok(Value::number(number(&args, 0)?.floor()))
        });
        declare("tm_ceil", FuncDef::builder().param(Number), |args| {
            Ok(Value::number(number(&args, 0)?.ceil()))
        });
        declare("tm_abs", FuncDef::builder().param(Number), |args| {
            match &args[0] {
                Value::Integer(int) => Ok(int
                    .checked_abs()
                    .map_or(Value::Decimal((*int as f64).abs()), Value::Integer)),
                other => Ok(Value::Decimal(other.as_f64().unwrap_or_default().abs())),
            }
        });
        declare(
            "tm_max",
            FuncDef::builder().param(Number).variadic_param(Number),
            |args| extremum(args, |a, b| b > a),
        );
        declare(
            "tm_min",
            FuncDef::builder().param(Number).variadic_param(Number),
            |args| extremum(args, |a, b| b < a),
        );

        // collections
        declare("tm_concat", FuncDef::builder().variadic_param(List), |args| {
            Ok(Value::Array(args.into_iter().flat_map(list_items).collect()))
        });
        declare("tm_length", FuncDef::builder().param(HasLength), |args| {
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(object) => object.len(),
                _ => 0,
            };
            Ok(Value::Integer(len as i64))
        });
        declare("tm_keys", FuncDef::builder().param(Object), |args| {
            Ok(Value::from(sorted(object(&args, 0)?).into_iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()))
        });
        declare("tm_values", FuncDef::builder().param(Object), |args| {
            Ok(Value::from(sorted(object(&args, 0)?).into_iter().map(|(_, v)| v.clone()).collect::<Vec<_>>()))
        });
        declare("tm_merge", FuncDef::builder().variadic_param(Any), merge);
        declare(
            "tm_contains",
            FuncDef::builder().param(List).param(Any),
            |args| {
                let needle = &args[1];
                Ok(list(&args, 0)?.iter().any(|item| item.loosely_equals(needle)).into())
            },
        );
        declare(
            "tm_element",
            FuncDef::builder().param(List).param(Number),
            |args| {
                let items = list(&args, 0)?;
                let index = integer(&args, 1)?;
                if items.is_empty() {
                    return Err(FunctionError::Invalid("cannot use element on an empty list".into()));
                }
                if index < 0 {
                    return Err(FunctionError::Invalid("index must not be negative".into()));
                }
                Ok(items[index as usize % items.len()].clone())
            },
        );
        declare("tm_flatten", FuncDef::builder().param(List), |args| {
            let mut flat = vec![];
            flatten_into(list(&args, 0)?, &mut flat);
            Ok(Value::Array(flat))
        });
        declare("tm_distinct", FuncDef::builder().param(List), |args| {
            let mut distinct: Vec<Value> = vec![];
            for item in list(&args, 0)? {
                if !distinct.contains(item) {
                    distinct.push(item.clone());
                }
            }
            Ok(Value::Array(distinct))
        });
        declare("tm_reverse", FuncDef::builder().param(List), |args| {
            Ok(Value::Array(list(&args, 0)?.iter().rev().cloned().collect()))
        });
        declare(
            "tm_range",
            FuncDef::builder()
                .param(Number)
                .optional_param(Number)
                .optional_param(Number),
            range,
        );
        declare(
            "tm_lookup",
            FuncDef::builder()
                .param(Object)
                .param(String)
                .optional_param(Any),
            |args| {
                let key = string(&args, 1)?;
                match (object(&args, 0)?.get(key), args.get(2)) {
                    (Some(value), _) => Ok(value.clone()),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(FunctionError::Invalid(format!(
                        "key `{key}` does not exist and no default was given"
                    ))),
                }
            },
        );
        declare("tm_coalesce", FuncDef::builder().variadic_param(Any), |args| {
            args.into_iter()
                .find(|arg| !matches!(arg, Value::Null) && arg.as_str() != Some(""))
                .ok_or_else(|| FunctionError::Invalid("no non-null, non-empty argument".into()))
        });

        // conversion
        declare("tm_tostring", FuncDef::builder().param(Any), |args| {
            match &args[0] {
                Value::Null => Ok(Value::Null),
                value => value.to_template_string().map(Value::String).ok_or(
                    FunctionError::ArgumentType {
                        index: 0,
                        expected: "string, number or bool",
                        got: value.type_name(),
                    },
                ),
            }
        });
        declare("tm_tonumber", FuncDef::builder().param(Any), |args| {
            match &args[0] {
                value @ (Value::Null | Value::Integer(_) | Value::Decimal(_)) => Ok(value.clone()),
                Value::String(s) => parse_number(s),
                value => Err(FunctionError::ArgumentType {
                    index: 0,
                    expected: "string or number",
                    got: value.type_name(),
                }),
            }
        });
        declare("tm_jsonencode", FuncDef::builder().param(Any), |args| {
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|err| FunctionError::Invalid(err.to_string()))
        });

        functions
    }
}

fn string(args: &[Value], index: usize) -> Result<&str, FunctionError> {
    args[index].as_str().ok_or(FunctionError::ArgumentType {
        index,
        expected: "string",
        got: args[index].type_name(),
    })
}

fn number(args: &[Value], index: usize) -> Result<f64, FunctionError> {
    args[index].as_f64().ok_or(FunctionError::ArgumentType {
        index,
        expected: "number",
        got: args[index].type_name(),
    })
}

fn integer(args: &[Value], index: usize) -> Result<i64, FunctionError> {
    match &args[index] {
        Value::Integer(int) => Ok(*int),
        Value::Decimal(dec) if dec.fract() == 0.0 => Ok(*dec as i64),
        other => Err(FunctionError::ArgumentType {
            index,
            expected: "whole number",
            got: other.type_name(),
        }),
    }
}

fn list(args: &[Value], index: usize) -> Result<&[Value], FunctionError> {
    match &args[index] {
        Value::Array(items) => Ok(items),
        other => Err(FunctionError::ArgumentType {
            index,
            expected: "list",
            got: other.type_name(),
        }),
    }
}

fn object(args: &[Value], index: usize) -> Result<&IndexMap<String, Value>, FunctionError> {
    match &args[index] {
        Value::Object(object) => Ok(object),
        other => Err(FunctionError::ArgumentType {
            index,
            expected: "object",
            got: other.type_name(),
        }),
    }
}

fn list_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn sorted(object: &IndexMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = object.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
}

fn title(args: FuncArgs) -> Result<Value, FunctionError> {
    let mut titled = String::new();
    let mut word_start = true;
    for c in string(&args, 0)?.chars() {
        if word_start && c.is_alphabetic() {
            titled.extend(c.to_uppercase());
        } else {
            titled.push(c);
        }
        word_start = c.is_whitespace();
    }
    Ok(titled.into())
}

fn join(args: FuncArgs) -> Result<Value, FunctionError> {
    let separator = string(&args, 0)?;
    let parts = list(&args, 1)?
        .iter()
        .map(|item| {
            item.to_template_string().ok_or(FunctionError::ArgumentType {
                index: 1,
                expected: "list of strings",
                got: item.type_name(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(separator).into())
}

fn substr(args: FuncArgs) -> Result<Value, FunctionError> {
    let chars: Vec<char> = string(&args, 0)?.chars().collect();
    let len = chars.len() as i64;
    let mut offset = integer(&args, 1)?;
    let length = integer(&args, 2)?;

    if offset < 0 {
        offset += len;
    }
    let offset = offset.clamp(0, len);
    let end = if length < 0 {
        len
    } else {
        offset.saturating_add(length).min(len)
    };

    Ok(chars[offset as usize..end as usize]
        .iter()
        .collect::<String>()
        .into())
}

/// `%s`, `%d` and `%v` consume one argument each, `%%` is a literal percent sign
fn format(args: FuncArgs) -> Result<Value, FunctionError> {
    let pattern = string(&args, 0)?;
    let mut values = args[1..].iter();
    let mut out = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let verb = chars
            .next()
            .ok_or_else(|| FunctionError::Invalid("format ends with a lone `%`".into()))?;
        if verb == '%' {
            out.push('%');
            continue;
        }

        let value = values
            .next()
            .ok_or_else(|| FunctionError::Invalid(format!("not enough arguments for `%{verb}`")))?;
        match verb {
            'd' => match value {
                Value::Integer(int) => out.push_str(&int.to_string()),
                Value::Decimal(dec) if dec.fract() == 0.0 => out.push_str(&(*dec as i64).to_string()),
                other => {
                    return Err(FunctionError::Invalid(format!(
                        "`%d` requires a whole number, got {}",
                        other.type_name()
                    )))
                }
            },
            's' => match value.to_template_string() {
                Some(s) => out.push_str(&s),
                None => {
                    return Err(FunctionError::Invalid(format!(
                        "`%s` cannot format {}",
                        value.type_name()
                    )))
                }
            },
            'v' => match value.to_template_string() {
                Some(s) => out.push_str(&s),
                None => out.push_str(
                    &serde_json::to_string(value)
                        .map_err(|err| FunctionError::Invalid(err.to_string()))?,
                ),
            },
            other => return Err(FunctionError::Invalid(format!("unsupported verb `%{other}`"))),
        }
    }

    if values.next().is_some() {
        return Err(FunctionError::Invalid("too many arguments for format".into()));
    }
    Ok(out.into())
}

fn extremum(args: FuncArgs, replaces: fn(f64, f64) -> bool) -> Result<Value, FunctionError> {
    let mut best = args[0].clone();
    for (index, candidate) in args.iter().enumerate().skip(1) {
        let current = number(&args, index)?;
        if replaces(best.as_f64().unwrap_or_default(), current) {
            best = candidate.clone();
        }
    }
    Ok(best)
}

fn merge(args: FuncArgs) -> Result<Value, FunctionError> {
    let mut merged = IndexMap::new();
    for (index, arg) in args.into_iter().enumerate() {
        match arg {
            Value::Null => {}
            Value::Object(object) => merged.extend(object),
            other => {
                return Err(FunctionError::ArgumentType {
                    index,
                    expected: "object",
                    got: other.type_name(),
                })
            }
        }
    }
    Ok(Value::Object(merged))
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(nested) => flatten_into(nested, out),
            other => out.push(other.clone()),
        }
    }
}

const MAX_RANGE: usize = 1024;

fn range(args: FuncArgs) -> Result<Value, FunctionError> {
    let (start, limit, step) = match args.len() {
        1 => (0.0, number(&args, 0)?, 1.0),
        2 => (number(&args, 0)?, number(&args, 1)?, 1.0),
        _ => (number(&args, 0)?, number(&args, 1)?, number(&args, 2)?),
    };

    if step == 0.0 {
        return Err(FunctionError::Invalid("step must not be zero".into()));
    }
    if (step > 0.0 && start > limit) || (step < 0.0 && start < limit) {
        return Err(FunctionError::Invalid(
            "step moves away from the limit".into(),
        ));
    }

    let mut items = vec![];
    let mut current = start;
    while (step > 0.0 && current < limit) || (step < 0.0 && current > limit) {
        if items.len() >= MAX_RANGE {
            return Err(FunctionError::Invalid(format!(
                "more than {MAX_RANGE} elements requested"
            )));
        }
        items.push(Value::number(current));
        current += step;
    }
    Ok(Value::Array(items))
}

fn parse_number(s: &str) -> Result<Value, FunctionError> {
    if let Ok(int) = s.parse::<i64>() {
        return Ok(Value::Integer(int));
    }
    s.parse::<f64>()
        .ok()
        .filter(|dec| dec.is_finite())
        .map(Value::Decimal)
        .ok_or_else(|| FunctionError::Invalid(format!("cannot convert `{s}` to a number")))
}
