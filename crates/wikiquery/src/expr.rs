//! Query expression trees.
//!
//! Callers describe filters, sort keys and projections as a closed tree of
//! [`Expr`] nodes. The root parameter of the query (the row being filtered,
//! sorted or projected) is [`Expr::Identity`]; everything else hangs off it.
//!
//! ```text
//! x.enabled && x.category == "X"
//!   And(Member(Identity, enabled), Equal(Member(Identity, category), Constant("X")))
//! ```

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// A node of a query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// The query's root parameter.
    Identity,
    /// Member access `target.name`.
    Member { target: Box<Expr>, name: String },
    /// A literal.
    Constant { value: Value },
    /// Logical negation.
    Not { operand: Box<Expr> },
    Equal { left: Box<Expr>, right: Box<Expr> },
    NotEqual { left: Box<Expr>, right: Box<Expr> },
    And { left: Box<Expr>, right: Box<Expr> },
    Or { left: Box<Expr>, right: Box<Expr> },
    /// Call of a built-in projection function.
    Call { function: Function, args: Vec<Expr> },
    /// Construction of a new record from named fields.
    Record { fields: Vec<(String, Expr)> },
}

/// Built-in functions usable inside projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Lower,
    Upper,
    Length,
    Concat,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::Length => "length",
            Function::Concat => "concat",
        }
    }
}

impl Expr {
    /// The root parameter.
    pub fn param() -> Self {
        Expr::Identity
    }

    /// Member access on the root parameter.
    pub fn member(name: impl Into<String>) -> Self {
        Expr::Identity.field(name)
    }

    /// Member access on this expression.
    pub fn field(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant {
            value: value.into(),
        }
    }

    pub fn negate(self) -> Self {
        Expr::Not {
            operand: Box::new(self),
        }
    }

    pub fn equals(self, other: impl Into<Expr>) -> Self {
        Expr::Equal {
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn not_equals(self, other: impl Into<Expr>) -> Self {
        Expr::NotEqual {
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn call(function: Function, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::Record {
            fields: fields.into_iter().map(|(n, e)| (n.into(), e)).collect(),
        }
    }

    /// If this is a member access directly on the root parameter, its name.
    pub fn as_parameter_member(&self) -> Option<&str> {
        match self {
            Expr::Member { target, name } if matches!(**target, Expr::Identity) => Some(name),
            _ => None,
        }
    }

    fn is_binary(&self) -> bool {
        matches!(
            self,
            Expr::Equal { .. } | Expr::NotEqual { .. } | Expr::And { .. } | Expr::Or { .. }
        )
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.negate()
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant { value }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::constant(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::constant(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::constant(value)
    }
}

/// Parenthesize binary operands so the printed text reads unambiguously.
fn operand(f: &mut std::fmt::Formatter<'_>, e: &Expr) -> std::fmt::Result {
    if e.is_binary() {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}

fn binary(f: &mut std::fmt::Formatter<'_>, left: &Expr, op: &str, right: &Expr) -> std::fmt::Result {
    operand(f, left)?;
    write!(f, " {op} ")?;
    operand(f, right)
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Identity => write!(f, "x"),
            Expr::Member { target, name } => {
                operand(f, target)?;
                write!(f, ".{name}")
            }
            Expr::Constant { value } => write!(f, "{value}"),
            Expr::Not { operand: inner } => {
                write!(f, "!")?;
                operand(f, inner)
            }
            Expr::Equal { left, right } => binary(f, left, "==", right),
            Expr::NotEqual { left, right } => binary(f, left, "!=", right),
            Expr::And { left, right } => binary(f, left, "&&", right),
            Expr::Or { left, right } => binary(f, left, "||", right),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Record { fields } => {
                write!(f, "{{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Expr::member("enabled").and(Expr::member("category").equals("X"));
        assert_eq!(e.to_string(), r#"x.enabled && (x.category == "X")"#);

        let e = !Expr::member("redirect");
        assert_eq!(e.to_string(), "!x.redirect");

        let e = Expr::record([("id", Expr::member("id")), ("n", Expr::call(Function::Length, vec![Expr::param()]))]);
        assert_eq!(e.to_string(), "{ id: x.id, n: length(x) }");
    }

    #[test]
    fn test_parameter_member() {
        assert_eq!(Expr::member("title").as_parameter_member(), Some("title"));
        assert_eq!(Expr::member("a").field("b").as_parameter_member(), None);
        assert_eq!(Expr::param().as_parameter_member(), None);
    }

    #[test]
    fn test_serde_shape() {
        let e = Expr::member("ns").equals(Expr::constant(0i64));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "equal");
        assert_eq!(json["left"]["kind"], "member");
        assert_eq!(json["right"]["value"]["type"], "int");

        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }
}
