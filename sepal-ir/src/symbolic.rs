//! Symbolic integer expressions over graph-level symbols.
//!
//! Sizes, strides and iteration ranges are expressions over free symbols
//! bound (or not) in a graph's symbol table. The resolver is the only
//! consumer-facing operation: it either produces a compile-time constant or
//! reports that the expression cannot be resolved.
use sepal_utils::Id;
use std::collections::HashMap;
use std::fmt;
use std::ops;

/// A possibly-parametric integer expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymExpr {
    Int(i64),
    Sym(Id),
    Add(Box<SymExpr>, Box<SymExpr>),
    Sub(Box<SymExpr>, Box<SymExpr>),
    Mul(Box<SymExpr>, Box<SymExpr>),
    Div(Box<SymExpr>, Box<SymExpr>),
}

impl SymExpr {
    pub fn sym<S: Into<Id>>(name: S) -> Self {
        SymExpr::Sym(name.into())
    }

    /// The literal value if this expression is already a constant.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SymExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Resolve to a constant given literal bindings for free symbols.
    ///
    /// Returns `None` when any free symbol is unbound or the expression does
    /// not simplify to an integer (e.g. division by zero). Side-effect free.
    pub fn resolve(&self, bindings: &HashMap<Id, i64>) -> Option<i64> {
        match self {
            SymExpr::Int(v) => Some(*v),
            SymExpr::Sym(s) => bindings.get(s).copied(),
            SymExpr::Add(a, b) => Some(a.resolve(bindings)? + b.resolve(bindings)?),
            SymExpr::Sub(a, b) => Some(a.resolve(bindings)? - b.resolve(bindings)?),
            SymExpr::Mul(a, b) => Some(a.resolve(bindings)? * b.resolve(bindings)?),
            SymExpr::Div(a, b) => {
                let denom = b.resolve(bindings)?;
                if denom == 0 {
                    None
                } else {
                    Some(a.resolve(bindings)? / denom)
                }
            }
        }
    }

    /// Free symbols appearing in this expression.
    pub fn free_symbols(&self) -> Vec<Id> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<Id>) {
        match self {
            SymExpr::Int(_) => {}
            SymExpr::Sym(s) => {
                if !out.contains(s) {
                    out.push(*s);
                }
            }
            SymExpr::Add(a, b)
            | SymExpr::Sub(a, b)
            | SymExpr::Mul(a, b)
            | SymExpr::Div(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }
}

impl From<i64> for SymExpr {
    fn from(v: i64) -> Self {
        SymExpr::Int(v)
    }
}

impl From<&str> for SymExpr {
    fn from(s: &str) -> Self {
        SymExpr::Sym(s.into())
    }
}

impl From<Id> for SymExpr {
    fn from(id: Id) -> Self {
        SymExpr::Sym(id)
    }
}

impl ops::Add for SymExpr {
    type Output = SymExpr;
    fn add(self, rhs: SymExpr) -> SymExpr {
        SymExpr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for SymExpr {
    type Output = SymExpr;
    fn sub(self, rhs: SymExpr) -> SymExpr {
        SymExpr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for SymExpr {
    type Output = SymExpr;
    fn mul(self, rhs: SymExpr) -> SymExpr {
        SymExpr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for SymExpr {
    type Output = SymExpr;
    fn div(self, rhs: SymExpr) -> SymExpr {
        SymExpr::Div(Box::new(self), Box::new(rhs))
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymExpr::Int(v) => write!(f, "{v}"),
            SymExpr::Sym(s) => write!(f, "{s}"),
            SymExpr::Add(a, b) => write!(f, "({a} + {b})"),
            SymExpr::Sub(a, b) => write!(f, "({a} - {b})"),
            SymExpr::Mul(a, b) => write!(f, "({a} * {b})"),
            SymExpr::Div(a, b) => write!(f, "({a} / {b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, i64)]) -> HashMap<Id, i64> {
        pairs.iter().map(|(k, v)| (Id::from(*k), *v)).collect()
    }

    #[test]
    fn constants_resolve_without_bindings() {
        let e = SymExpr::from(6) * SymExpr::from(7);
        assert_eq!(e.resolve(&HashMap::new()), Some(42));
    }

    #[test]
    fn bound_symbols_resolve() {
        let e = SymExpr::sym("N") * SymExpr::sym("M") + SymExpr::from(1);
        assert_eq!(e.resolve(&bindings(&[("N", 4), ("M", 8)])), Some(33));
    }

    #[test]
    fn unbound_symbol_is_unresolved() {
        let e = SymExpr::sym("N") * SymExpr::from(2);
        assert_eq!(e.resolve(&bindings(&[("M", 8)])), None);
    }

    #[test]
    fn division_by_zero_is_unresolved() {
        let e = SymExpr::from(8) / SymExpr::sym("Z");
        assert_eq!(e.resolve(&bindings(&[("Z", 0)])), None);
        assert_eq!(e.resolve(&bindings(&[("Z", 2)])), Some(4));
    }

    #[test]
    fn free_symbols_are_deduplicated() {
        let e = SymExpr::sym("N") * SymExpr::sym("N") + SymExpr::sym("M");
        assert_eq!(e.free_symbols(), vec![Id::from("N"), Id::from("M")]);
    }
}
