//! Expression compiler: turns filter, order and select expressions into
//! [`QueryParameters`].
//!
//! Supported filter shapes:
//! ```text
//! filter   := flag | '!' flag | equality | filter '&&' filter
//! flag     := x.member
//! equality := x.member '==' constant | constant '==' x.member
//! ```
//! This conjunctive subset is all the wire protocol can express; anything
//! else is rejected with the offending subexpression.

use std::collections::BTreeSet;

use serde_json::Value as Json;

use crate::expr::{Expr, Function};
use crate::params::{row_to_json, Projector, QueryParameters, Row};
use crate::types::{ModuleDescriptor, Property, Value, WikiError, WikiResult};

/// Wire value of a boolean flag that is switched on.
pub const FLAG_MARKER: &str = "";

/// Map a member name to the name the API uses for it.
pub fn wire_name(member: &str) -> String {
    let lower = member.to_lowercase();
    match lower.as_str() {
        "value" => "*".to_string(),
        "defaultvalue" => "default".to_string(),
        _ => lower,
    }
}

/// Whether `name` can be used as a member name.
///
/// `default` is reserved: it is the wire form of `defaultValue`.
pub fn is_legal_member(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.eq_ignore_ascii_case("default")
}

fn unsupported(expr: &Expr) -> WikiError {
    WikiError::UnsupportedExpression(expr.to_string())
}

/// Compiles query clauses against one module's descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionCompiler<'m> {
    module: &'m ModuleDescriptor,
}

impl<'m> ExpressionCompiler<'m> {
    pub fn new(module: &'m ModuleDescriptor) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &'m ModuleDescriptor {
        self.module
    }

    /// Compile a `where` predicate on top of `previous`.
    ///
    /// Conjunctions are compiled left operand first, so parameter order
    /// follows a left-to-right reading of the predicate.
    pub fn compile_filter(
        &self,
        predicate: &Expr,
        previous: &QueryParameters,
    ) -> WikiResult<QueryParameters> {
        match predicate {
            Expr::Member { name, .. } if predicate.as_parameter_member().is_some() => {
                let (wire, _) = self.resolve(name)?;
                Ok(previous.with_filter_value(wire, FLAG_MARKER))
            }
            Expr::Not { operand } => match operand.as_parameter_member() {
                Some(name) => {
                    self.resolve(name)?;
                    // absence encodes "false"
                    Ok(previous.clone())
                }
                None => Err(unsupported(predicate)),
            },
            Expr::Equal { left, right } => {
                let (name, value) = member_equals_constant(left, right)
                    .or_else(|| member_equals_constant(right, left))
                    .ok_or_else(|| unsupported(predicate))?;
                let (wire, property) = self.resolve(name)?;
                property
                    .check(value)
                    .map_err(|reason| WikiError::InvalidValue {
                        property: name.to_string(),
                        reason,
                    })?;
                Ok(match value.to_wire() {
                    Some(v) => previous.with_filter_value(wire, v),
                    None => previous.clone(),
                })
            }
            Expr::And { left, right } => {
                let after_left = self.compile_filter(left, previous)?;
                self.compile_filter(right, &after_left)
            }
            _ => Err(unsupported(predicate)),
        }
    }

    /// Compile an `orderby` key selector on top of `previous`.
    pub fn compile_order(
        &self,
        key: &Expr,
        previous: &QueryParameters,
        ascending: bool,
    ) -> WikiResult<QueryParameters> {
        let key_name = match key {
            Expr::Identity => None,
            Expr::Member { target, name } => {
                if !matches!(**target, Expr::Identity) {
                    return Err(WikiError::Configuration(format!(
                        "order key must be a member of the query parameter: {key}"
                    )));
                }
                Some(self.resolve(name)?.0)
            }
            _ => return Err(unsupported(key)),
        };
        Ok(previous.with_sort(key_name, ascending))
    }

    /// Compile a `select` projection on top of `previous`.
    ///
    /// Fetching is narrowed to the properties the projection reads, unless
    /// the root parameter is used in any way other than as the receiver of
    /// a member access, in which case all properties are fetched.
    pub fn compile_projection(
        &self,
        selector: &Expr,
        previous: &QueryParameters,
    ) -> WikiResult<QueryParameters> {
        let mut used = UsedProperties::default();
        used.gather(selector);

        let mut wire_names = BTreeSet::new();
        for name in &used.names {
            wire_names.insert(self.resolve(name)?.0);
        }

        let properties = if used.used_directly {
            None
        } else {
            Some(wire_names)
        };

        let projector = match selector {
            Expr::Identity => Projector::identity(),
            _ => {
                let node = compile_node(selector);
                Projector::new(move |row| node(row))
            }
        };
        Ok(previous.with_select(properties, projector))
    }

    /// Compile a projection whose declared result has the module's own shape.
    ///
    /// Such a projection can only be the identity, and the declared shape
    /// must match the module's properties: the protocol cannot reshape rows
    /// without an explicit selection.
    pub fn compile_identity_projection(
        &self,
        selector: &Expr,
        previous: &QueryParameters,
        declared_shape: &[Property],
    ) -> WikiResult<QueryParameters> {
        if !matches!(selector, Expr::Identity) {
            return Err(WikiError::Configuration(format!(
                "select returning the module's own shape has to be identity: {selector}"
            )));
        }

        let expected = shape(&self.module.properties);
        let found = shape(declared_shape);
        if expected != found {
            return Err(WikiError::ShapeMismatch {
                expected: describe_shape(&expected),
                found: describe_shape(&found),
            });
        }

        Ok(previous.clone())
    }

    /// Resolve a member name to its wire name and declared property.
    fn resolve(&self, member: &str) -> WikiResult<(String, &'m Property)> {
        if !is_legal_member(member) {
            return Err(WikiError::UnsupportedExpression(format!(
                "illegal member name '{member}'"
            )));
        }
        let wire = wire_name(member);
        let property = self
            .module
            .property(&wire)
            .ok_or_else(|| WikiError::UnknownProperty {
                module: self.module.name.clone(),
                property: member.to_string(),
            })?;
        Ok((wire, property))
    }
}

/// `x.member == constant` in that operand order.
fn member_equals_constant<'e>(left: &'e Expr, right: &'e Expr) -> Option<(&'e str, &'e Value)> {
    let name = left.as_parameter_member()?;
    match right {
        Expr::Constant { value } => Some((name, value)),
        _ => None,
    }
}

fn shape(properties: &[Property]) -> BTreeSet<(String, String)> {
    properties
        .iter()
        .map(|p| (p.name.to_lowercase(), p.ty.to_string()))
        .collect()
}

fn describe_shape(shape: &BTreeSet<(String, String)>) -> String {
    let fields: Vec<String> = shape.iter().map(|(n, t)| format!("{n}: {t}")).collect();
    format!("{{{}}}", fields.join(", "))
}

/// Properties read by a projection.
#[derive(Debug, Default)]
struct UsedProperties {
    names: BTreeSet<String>,
    used_directly: bool,
}

impl UsedProperties {
    fn gather(&mut self, expr: &Expr) {
        match expr {
            Expr::Identity => self.used_directly = true,
            Expr::Member { target, name } => {
                if matches!(**target, Expr::Identity) {
                    self.names.insert(name.clone());
                } else {
                    self.gather(target);
                }
            }
            Expr::Constant { .. } => {}
            Expr::Not { operand } => self.gather(operand),
            Expr::Equal { left, right }
            | Expr::NotEqual { left, right }
            | Expr::And { left, right }
            | Expr::Or { left, right } => {
                self.gather(left);
                self.gather(right);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| self.gather(a)),
            Expr::Record { fields } => fields.iter().for_each(|(_, e)| self.gather(e)),
        }
    }
}

type Node = Box<dyn Fn(&Row) -> Json + Send + Sync>;

/// Compile a projection body once into a tree of closures.
fn compile_node(expr: &Expr) -> Node {
    match expr {
        Expr::Identity => Box::new(row_to_json),
        Expr::Member { target, name } => {
            let key = wire_name(name);
            if matches!(**target, Expr::Identity) {
                Box::new(move |row| {
                    row.get(&key)
                        .map(|v| Json::String(v.clone()))
                        .unwrap_or(Json::Null)
                })
            } else {
                let target = compile_node(target);
                Box::new(move |row| target(row).get(&key).cloned().unwrap_or(Json::Null))
            }
        }
        Expr::Constant { value } => {
            let json = value_to_json(value);
            Box::new(move |_| json.clone())
        }
        Expr::Not { operand } => {
            let operand = compile_node(operand);
            Box::new(move |row| Json::Bool(!truthy(&operand(row))))
        }
        Expr::Equal { left, right } => {
            let (left, right) = (compile_node(left), compile_node(right));
            Box::new(move |row| Json::Bool(text(&left(row)) == text(&right(row))))
        }
        Expr::NotEqual { left, right } => {
            let (left, right) = (compile_node(left), compile_node(right));
            Box::new(move |row| Json::Bool(text(&left(row)) != text(&right(row))))
        }
        Expr::And { left, right } => {
            let (left, right) = (compile_node(left), compile_node(right));
            Box::new(move |row| Json::Bool(truthy(&left(row)) && truthy(&right(row))))
        }
        Expr::Or { left, right } => {
            let (left, right) = (compile_node(left), compile_node(right));
            Box::new(move |row| Json::Bool(truthy(&left(row)) || truthy(&right(row))))
        }
        Expr::Call { function, args } => {
            let function = *function;
            let args: Vec<Node> = args.iter().map(compile_node).collect();
            Box::new(move |row| {
                let values: Vec<Json> = args.iter().map(|a| a(row)).collect();
                call(function, &values)
            })
        }
        Expr::Record { fields } => {
            let fields: Vec<(String, Node)> = fields
                .iter()
                .map(|(n, e)| (n.clone(), compile_node(e)))
                .collect();
            Box::new(move |row| {
                Json::Object(fields.iter().map(|(n, f)| (n.clone(), f(row))).collect())
            })
        }
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        other => other.to_wire().map(Json::String).unwrap_or(Json::Null),
    }
}

/// Flags in result rows are present-or-absent attributes, so any present value is true.
fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn text(value: &Json) -> Option<String> {
    match value {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn call(function: Function, args: &[Json]) -> Json {
    match function {
        Function::Lower => args
            .first()
            .and_then(text)
            .map(|s| Json::String(s.to_lowercase()))
            .unwrap_or(Json::Null),
        Function::Upper => args
            .first()
            .and_then(text)
            .map(|s| Json::String(s.to_uppercase()))
            .unwrap_or(Json::Null),
        Function::Length => {
            let len = match args.first() {
                Some(Json::String(s)) => s.chars().count(),
                Some(Json::Array(items)) => items.len(),
                Some(Json::Object(map)) => map.len(),
                _ => 0,
            };
            Json::from(len)
        }
        Function::Concat => Json::String(args.iter().filter_map(text).collect()),
    }
}
