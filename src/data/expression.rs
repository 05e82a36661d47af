//! Evaluation of GL style expressions against feature data.
//!
//! The runtime evaluates expressions in two places: popup/tooltip bindings
//! (rendered to text when a feature is clicked or hovered) and the headless
//! engine, which uses the same evaluator for filters and data-driven paint
//! values. The supported subset covers lookups (`get`, `has`, `id`,
//! `feature-state`), conversions (`to-string`, `to-number`, `to-boolean`,
//! `number-format`), `concat`, conditionals (`case`, `match`, `coalesce`),
//! comparisons and boolean logic. Unknown operators evaluate to `null`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// What a popup or tooltip shows for a feature: a property name or an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Property(String),
    Expression(Value),
}

impl Binding {
    /// Renders the binding for a feature's properties
    pub fn render(&self, properties: &Map<String, Value>) -> String {
        match self {
            Binding::Property(name) => properties.get(name).map(display).unwrap_or_default(),
            Binding::Expression(expr) => {
                let ctx = EvalContext::new(properties);
                display(&evaluate(expr, &ctx))
            }
        }
    }
}

/// Inputs an expression can read
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub properties: &'a Map<String, Value>,
    pub feature_state: Option<&'a Map<String, Value>>,
    pub id: Option<&'a Value>,
    pub zoom: Option<f64>,
}

impl<'a> EvalContext<'a> {
    pub fn new(properties: &'a Map<String, Value>) -> Self {
        Self {
            properties,
            feature_state: None,
            id: None,
            zoom: None,
        }
    }

    pub fn with_state(mut self, state: &'a Map<String, Value>) -> Self {
        self.feature_state = Some(state);
        self
    }

    pub fn with_id(mut self, id: Option<&'a Value>) -> Self {
        self.id = id;
        self
    }
}

/// Base value plus hover override for one paint property.
///
/// Both halves are stored explicitly; the conditional written to the engine is
/// produced by [`HoverPaint::to_expression`] at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverPaint {
    pub base: Value,
    pub hover: Value,
}

impl HoverPaint {
    pub fn new(base: Value, hover: Value) -> Self {
        Self { base, hover }
    }

    /// `["case", ["boolean", ["feature-state", key], false], hover, base]`
    pub fn to_expression(&self, state_key: &str) -> Value {
        json!([
            "case",
            ["boolean", ["feature-state", state_key], false],
            self.hover,
            self.base
        ])
    }
}

/// Style default of common paint properties, used as the non-hover branch
/// when a layer leaves the property unset
pub fn paint_default(name: &str) -> Option<Value> {
    let value = match name {
        "fill-color" | "line-color" | "circle-color" | "circle-stroke-color" | "fill-extrusion-color"
        | "text-color" | "icon-color" => json!("#000000"),
        "fill-opacity" | "line-opacity" | "circle-opacity" | "circle-stroke-opacity"
        | "fill-extrusion-opacity" | "text-opacity" | "icon-opacity" | "raster-opacity"
        | "heatmap-opacity" => json!(1),
        "line-width" => json!(1),
        "circle-radius" => json!(5),
        "circle-stroke-width" | "fill-extrusion-height" | "text-halo-width" | "icon-halo-width" => json!(0),
        "text-halo-color" | "icon-halo-color" => json!("rgba(0, 0, 0, 0)"),
        _ => return None,
    };
    Some(value)
}

/// Text shown for a value in popups and tooltips
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Formats a number the way JavaScript's `String(number)` does for common values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `number-format` with en-US grouping and fraction digit limits
pub fn number_format(n: f64, min_fraction: usize, max_fraction: usize) -> String {
    let max_fraction = max_fraction.max(min_fraction);
    let fixed = format!("{:.*}", max_fraction, n);
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (fixed.clone(), String::new()),
    };

    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < min_fraction {
        frac.push('0');
    }

    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(d) => ("-", d.to_string()),
        None => ("", int_part),
    };
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if sign == "-" && grouped.chars().all(|c| c == '0' || c == ',') && frac.chars().all(|c| c == '0') {
        ""
    } else {
        sign
    };

    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a)?.partial_cmp(&to_number(b)?),
    }
}

/// Evaluates an expression. Non-array values and arrays that do not start with an
/// operator name are literals.
pub fn evaluate(expr: &Value, ctx: &EvalContext<'_>) -> Value {
    let items = match expr {
        Value::Array(items) => items,
        other => return other.clone(),
    };
    let (op, args) = match items.split_first() {
        Some((Value::String(op), args)) => (op.as_str(), args),
        _ => return expr.clone(),
    };
    let arg = |i: usize| args.get(i).map(|a| evaluate(a, ctx)).unwrap_or(Value::Null);

    match op {
        "literal" => args.first().cloned().unwrap_or(Value::Null),
        "get" => match (arg(0), args.get(1)) {
            (Value::String(key), None) => ctx.properties.get(&key).cloned().unwrap_or(Value::Null),
            (Value::String(key), Some(_)) => match arg(1) {
                Value::Object(obj) => obj.get(&key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            _ => Value::Null,
        },
        "has" => match arg(0) {
            Value::String(key) => Value::Bool(ctx.properties.contains_key(&key)),
            _ => Value::Bool(false),
        },
        "id" => ctx.id.cloned().unwrap_or(Value::Null),
        "properties" => Value::Object(ctx.properties.clone()),
        "zoom" => ctx.zoom.map(number).unwrap_or(Value::Null),
        "feature-state" => match (arg(0), ctx.feature_state) {
            (Value::String(key), Some(state)) => state.get(&key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "concat" => Value::String(args.iter().map(|a| display(&evaluate(a, ctx))).collect()),
        "to-string" => Value::String(display(&arg(0))),
        "to-number" => {
            for a in args {
                if let Some(n) = to_number(&evaluate(a, ctx)) {
                    return number(n);
                }
            }
            Value::Null
        }
        "to-boolean" => Value::Bool(truthy(&arg(0))),
        "number-format" => {
            let n = to_number(&arg(0)).unwrap_or(f64::NAN);
            let options = match arg(1) {
                Value::Object(o) => o,
                _ => Map::new(),
            };
            let digits = |key: &str, default: usize| {
                options
                    .get(key)
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize)
                    .unwrap_or(default)
            };
            let min = digits("min-fraction-digits", 0);
            let max = digits("max-fraction-digits", 3.max(min));
            if n.is_finite() {
                Value::String(number_format(n, min, max))
            } else {
                Value::String(format_number(n))
            }
        }
        "boolean" | "string" | "number" => {
            for a in args {
                let v = evaluate(a, ctx);
                let matches = match op {
                    "boolean" => v.is_boolean(),
                    "string" => v.is_string(),
                    _ => v.is_number(),
                };
                if matches {
                    return v;
                }
            }
            Value::Null
        }
        "coalesce" => args
            .iter()
            .map(|a| evaluate(a, ctx))
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null),
        "case" => {
            let mut chunks = args.chunks_exact(2);
            for pair in chunks.by_ref() {
                if truthy(&evaluate(&pair[0], ctx)) {
                    return evaluate(&pair[1], ctx);
                }
            }
            chunks
                .remainder()
                .first()
                .map(|fallback| evaluate(fallback, ctx))
                .unwrap_or(Value::Null)
        }
        "match" => {
            let input = arg(0);
            let rest = &args[args.len().min(1)..];
            let mut chunks = rest.chunks_exact(2);
            for pair in chunks.by_ref() {
                let hit = match &pair[0] {
                    Value::Array(labels) => labels.iter().any(|l| values_equal(l, &input)),
                    label => values_equal(label, &input),
                };
                if hit {
                    return evaluate(&pair[1], ctx);
                }
            }
            chunks
                .remainder()
                .first()
                .map(|fallback| evaluate(fallback, ctx))
                .unwrap_or(Value::Null)
        }
        "==" => Value::Bool(values_equal(&arg(0), &arg(1))),
        "!=" => Value::Bool(!values_equal(&arg(0), &arg(1))),
        "<" => Value::Bool(compare(&arg(0), &arg(1)) == Some(std::cmp::Ordering::Less)),
        "<=" => Value::Bool(matches!(
            compare(&arg(0), &arg(1)),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        ">" => Value::Bool(compare(&arg(0), &arg(1)) == Some(std::cmp::Ordering::Greater)),
        ">=" => Value::Bool(matches!(
            compare(&arg(0), &arg(1)),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),
        "!" => Value::Bool(!truthy(&arg(0))),
        "all" => Value::Bool(args.iter().all(|a| truthy(&evaluate(a, ctx)))),
        "any" => Value::Bool(args.iter().any(|a| truthy(&evaluate(a, ctx)))),
        "in" => {
            let needle = arg(0);
            match arg(1) {
                Value::Array(haystack) => Value::Bool(haystack.iter().any(|v| values_equal(v, &needle))),
                Value::String(s) => Value::Bool(needle.as_str().map(|n| s.contains(n)).unwrap_or(false)),
                _ => Value::Bool(false),
            }
        }
        "upcase" => Value::String(display(&arg(0)).to_uppercase()),
        "downcase" => Value::String(display(&arg(0)).to_lowercase()),
        "+" | "*" => {
            let values: Option<Vec<f64>> = args.iter().map(|a| to_number(&evaluate(a, ctx))).collect();
            match values {
                Some(v) if op == "+" => number(v.iter().sum()),
                Some(v) => number(v.iter().product()),
                None => Value::Null,
            }
        }
        "-" | "/" => match (to_number(&arg(0)), args.get(1).map(|_| to_number(&arg(1)))) {
            (Some(a), None) if op == "-" => number(-a),
            (Some(a), Some(Some(b))) if op == "-" => number(a - b),
            (Some(a), Some(Some(b))) => number(a / b),
            _ => Value::Null,
        },
        _ => {
            log::debug!("unsupported expression operator '{}'", op);
            Value::Null
        }
    }
}

/// Evaluates a filter expression; a missing filter passes everything
pub fn filter_passes(filter: Option<&Value>, ctx: &EvalContext<'_>) -> bool {
    match filter {
        None | Some(Value::Null) => true,
        Some(f) => truthy(&evaluate(f, ctx)),
    }
}
