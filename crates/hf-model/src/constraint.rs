//! Named constraints over the time horizon.

use crate::expr::Expr;
use hf_core::ConstraintId;
use std::fmt;

/// How the body compares with zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `body == 0`
    Eq,
    /// `body <= 0`
    Le,
    /// `body >= 0`
    Ge,
}

impl Relation {
    /// Amount by which `residual` violates the relation (0 when satisfied).
    pub fn violation(self, residual: f64) -> f64 {
        match self {
            Relation::Eq => residual.abs(),
            Relation::Le => residual.max(0.0),
            Relation::Ge => (-residual).max(0.0),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Eq => "==",
            Relation::Le => "<=",
            Relation::Ge => ">=",
        })
    }
}

/// Nodes at which a constraint is enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every discretization node.
    Path,
    /// Node 0 only.
    Initial,
    /// Last node only.
    Final,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub(crate) id: ConstraintId,
    pub(crate) name: String,
    pub(crate) body: Expr,
    pub(crate) relation: Relation,
    pub(crate) scope: Scope,
}

impl Constraint {
    pub fn id(&self) -> ConstraintId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {} 0", self.name, self.body, self.relation)
    }
}
