//! Variable/constraint registry and the immutable model it builds.

use crate::constraint::{Constraint, Relation, Scope};
use crate::error::{ModelError, ModelResult};
use crate::expr::{Expr, Snapshot};
use crate::objective::{Objective, ObjectiveTerm};
use crate::regime::{Formulation, Stiffness};
use crate::variable::{Bounds, ContinuousVariable, Guess, Role};
use hf_core::{ConstraintId, VarId};
use std::collections::{HashMap, HashSet};

/// Descriptive data attached to a model for reporting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelMetadata {
    pub formulation: Option<Formulation>,
    pub stiffness: Option<Stiffness>,
    /// Physical parameters used, as `(name, value)` pairs.
    pub parameters: Vec<(String, f64)>,
}

impl ModelMetadata {
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Mutable registry used to assemble a [`DynamicModel`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    tf: f64,
    variables: Vec<ContinuousVariable>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
    metadata: ModelMetadata,
    by_name: HashMap<String, VarId>,
    constraint_names: HashSet<String>,
    initial_values: Vec<Option<f64>>,
}

impl ModelBuilder {
    /// Start a model over `[0, tf]`.
    pub fn new(name: impl Into<String>, tf: f64) -> ModelResult<Self> {
        if !tf.is_finite() || tf <= 0.0 {
            return Err(ModelError::horizon(tf));
        }
        Ok(Self {
            name: name.into(),
            tf,
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: None,
            metadata: ModelMetadata::default(),
            by_name: HashMap::new(),
            constraint_names: HashSet::new(),
            initial_values: Vec::new(),
        })
    }

    pub fn tf(&self) -> f64 {
        self.tf
    }

    /// Declare a state, control or coefficient variable.
    pub fn declare(&mut self, name: &str, role: Role, bounds: Bounds) -> ModelResult<VarId> {
        if role.is_derivative() {
            return Err(ModelError::UnknownRole {
                what: format!("'{name}': derivative variables are declared with link_derivative"),
            });
        }
        self.push_variable(name, role, bounds, None)
    }

    /// Declare `name` as the time derivative of `base`.
    pub fn link_derivative(&mut self, base: VarId, name: &str, bounds: Bounds) -> ModelResult<VarId> {
        let base_var = self.lookup(base)?;
        let role = match base_var.role {
            Role::State | Role::Control => Role::FirstDerivative,
            Role::FirstDerivative => Role::SecondDerivative,
            Role::SecondDerivative | Role::Coefficient => {
                return Err(ModelError::UnknownRole {
                    what: format!(
                        "'{}' ({}) cannot be differentiated",
                        base_var.name, base_var.role
                    ),
                });
            }
        };
        self.push_variable(name, role, bounds, Some(base))
    }

    fn push_variable(
        &mut self,
        name: &str,
        role: Role,
        bounds: Bounds,
        derivative_of: Option<VarId>,
    ) -> ModelResult<VarId> {
        if self.by_name.contains_key(name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        bounds.validate(name)?;
        let id = VarId::from_index(self.variables.len());
        self.variables.push(ContinuousVariable {
            id,
            name: name.to_string(),
            role,
            bounds,
            guess: None,
            derivative_of,
        });
        self.initial_values.push(None);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_path(&mut self, name: &str, body: Expr, relation: Relation) -> ModelResult<ConstraintId> {
        self.push_constraint(name, body, relation, Scope::Path)
    }

    pub fn add_initial(&mut self, name: &str, body: Expr, relation: Relation) -> ModelResult<ConstraintId> {
        self.push_constraint(name, body, relation, Scope::Initial)
    }

    pub fn add_final(&mut self, name: &str, body: Expr, relation: Relation) -> ModelResult<ConstraintId> {
        self.push_constraint(name, body, relation, Scope::Final)
    }

    fn push_constraint(
        &mut self,
        name: &str,
        body: Expr,
        relation: Relation,
        scope: Scope,
    ) -> ModelResult<ConstraintId> {
        if !self.constraint_names.insert(name.to_string()) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        if let Some(unknown) = body
            .variables()
            .into_iter()
            .find(|id| id.index() >= self.variables.len())
        {
            self.constraint_names.remove(name);
            return Err(ModelError::UnknownVariable {
                what: format!("{unknown} in constraint '{name}'"),
            });
        }
        let id = ConstraintId::from_index(self.constraints.len());
        self.constraints.push(Constraint {
            id,
            name: name.to_string(),
            body,
            relation,
            scope,
        });
        Ok(id)
    }

    /// Add `var(0) == value` and seed the variable's guess with `value`.
    pub fn fix_initial(&mut self, var: VarId, value: f64) -> ModelResult<ConstraintId> {
        let name = self.lookup(var)?.name.clone();
        if !value.is_finite() {
            return Err(ModelError::InvalidParameter {
                what: format!("initial value of '{name}' is {value}"),
            });
        }
        let id = self.add_initial(&format!("{name}_initial"), Expr::var(var) - value, Relation::Eq)?;
        let slot = var.index();
        self.initial_values[slot] = Some(value);
        if self.variables[slot].guess.is_none() {
            self.variables[slot].guess = Some(Guess::Constant(value));
        }
        Ok(id)
    }

    pub fn set_guess(&mut self, var: VarId, guess: Guess) -> ModelResult<()> {
        let name = self.lookup(var)?.name.clone();
        guess.validate(&name)?;
        self.variables[var.index()].guess = Some(guess);
        Ok(())
    }

    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = Some(objective);
    }

    pub fn set_metadata(&mut self, metadata: ModelMetadata) {
        self.metadata = metadata;
    }

    pub fn var(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn variable(&self, id: VarId) -> Option<&ContinuousVariable> {
        self.variables.get(id.index())
    }

    /// Expression for the variable called `name`.
    pub fn expr(&self, name: &str) -> ModelResult<Expr> {
        self.var(name)
            .map(Expr::var)
            .ok_or_else(|| ModelError::UnknownVariable {
                what: name.to_string(),
            })
    }

    fn lookup(&self, id: VarId) -> ModelResult<&ContinuousVariable> {
        self.variables
            .get(id.index())
            .ok_or_else(|| ModelError::UnknownVariable {
                what: id.to_string(),
            })
    }

    pub fn build(self) -> ModelResult<DynamicModel> {
        let objective = self.objective.ok_or(ModelError::MissingObjective)?;
        if let Some(unknown) = objective
            .terms()
            .iter()
            .flat_map(|term| match term {
                ObjectiveTerm::Terminal(e) | ObjectiveTerm::Integral(e) => e.variables(),
            })
            .find(|id| id.index() >= self.variables.len())
        {
            return Err(ModelError::UnknownVariable {
                what: format!("{unknown} in objective"),
            });
        }
        tracing::debug!(
            model = %self.name,
            tf = self.tf,
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            "model built"
        );
        Ok(DynamicModel {
            name: self.name,
            tf: self.tf,
            variables: self.variables,
            constraints: self.constraints,
            objective,
            metadata: self.metadata,
            by_name: self.by_name,
            initial_values: self.initial_values,
        })
    }
}

/// A complete optimal-control problem over a fixed horizon.
#[derive(Clone, Debug)]
pub struct DynamicModel {
    name: String,
    tf: f64,
    variables: Vec<ContinuousVariable>,
    constraints: Vec<Constraint>,
    objective: Objective,
    metadata: ModelMetadata,
    by_name: HashMap<String, VarId>,
    initial_values: Vec<Option<f64>>,
}

impl DynamicModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tf(&self) -> f64 {
        self.tf
    }

    pub fn variables(&self) -> &[ContinuousVariable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn var(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn variable(&self, id: VarId) -> Option<&ContinuousVariable> {
        self.variables.get(id.index())
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// Value fixed by `fix_initial`, if any.
    pub fn initial_value(&self, id: VarId) -> Option<f64> {
        self.initial_values.get(id.index()).copied().flatten()
    }

    /// Values at `t = 0`: declared initial values where fixed, else the
    /// variable's guess at the start of the horizon.
    pub fn initial_point(&self) -> Vec<f64> {
        self.variables
            .iter()
            .map(|v| self.initial_value(v.id).unwrap_or_else(|| v.guess_at(0.0)))
            .collect()
    }

    /// Residual of every initial-scope constraint at [`Self::initial_point`].
    pub fn initial_residuals(&self) -> Vec<(String, f64)> {
        let point = self.initial_point();
        let ctx = Snapshot {
            time: 0.0,
            values: &point,
        };
        self.constraints
            .iter()
            .filter(|c| c.scope == Scope::Initial)
            .map(|c| (c.name.clone(), c.body.eval(&ctx)))
            .collect()
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ModelBuilder {
        ModelBuilder::new("test", 1.0).unwrap()
    }

    #[test]
    fn rejects_bad_horizon() {
        assert!(matches!(
            ModelBuilder::new("m", 0.0),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(ModelBuilder::new("m", f64::NAN).is_err());
    }

    #[test]
    fn duplicate_names_fail() {
        let mut b = builder();
        b.declare("x", Role::State, Bounds::free()).unwrap();
        let err = b.declare("x", Role::Control, Bounds::free()).unwrap_err();
        assert_eq!(err, ModelError::DuplicateName { name: "x".into() });

        let x = b.var("x").unwrap();
        b.add_path("c", Expr::var(x), Relation::Le).unwrap();
        assert!(matches!(
            b.add_final("c", Expr::var(x), Relation::Eq),
            Err(ModelError::DuplicateName { .. })
        ));
    }

    #[test]
    fn derivative_roles_follow_base() {
        let mut b = builder();
        let x = b.declare("x", Role::State, Bounds::free()).unwrap();
        let v = b.link_derivative(x, "v", Bounds::free()).unwrap();
        let a = b.link_derivative(v, "a", Bounds::free()).unwrap();
        assert_eq!(b.variable(v).unwrap().role(), Role::FirstDerivative);
        assert_eq!(b.variable(a).unwrap().role(), Role::SecondDerivative);
        assert_eq!(b.variable(a).unwrap().derivative_of(), Some(v));

        assert!(matches!(
            b.link_derivative(a, "jerk", Bounds::free()),
            Err(ModelError::UnknownRole { .. })
        ));
        let c = b.declare("c0", Role::Coefficient, Bounds::free()).unwrap();
        assert!(matches!(
            b.link_derivative(c, "dc0", Bounds::free()),
            Err(ModelError::UnknownRole { .. })
        ));
    }

    #[test]
    fn derivative_role_cannot_be_declared_directly() {
        let mut b = builder();
        assert!(matches!(
            b.declare("v", Role::FirstDerivative, Bounds::free()),
            Err(ModelError::UnknownRole { .. })
        ));
    }

    #[test]
    fn crossed_bounds_fail_on_declare() {
        let mut b = builder();
        assert!(matches!(
            b.declare("x", Role::State, Bounds::between(1.0, -1.0)),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(b.var("x").is_none());
    }

    #[test]
    fn missing_objective_fails() {
        let mut b = builder();
        b.declare("x", Role::State, Bounds::free()).unwrap();
        assert_eq!(b.build().unwrap_err(), ModelError::MissingObjective);
    }

    #[test]
    fn unknown_variable_in_constraint_fails() {
        let mut b = builder();
        let stray = Expr::var(VarId::from_index(7));
        assert!(matches!(
            b.add_path("bad", stray, Relation::Eq),
            Err(ModelError::UnknownVariable { .. })
        ));
        assert!(b.expr("nope").is_err());
    }

    #[test]
    fn fix_initial_seeds_guess_and_residual() {
        let mut b = builder();
        let x = b.declare("x", Role::State, Bounds::between(0.0, 1.0)).unwrap();
        let u = b.declare("u", Role::Control, Bounds::free()).unwrap();
        b.fix_initial(x, 0.25).unwrap();
        b.set_guess(u, Guess::Linear { start: 1.0, end: 2.0 }).unwrap();
        b.set_objective(Objective::maximize_terminal(Expr::var(x)));
        let m = b.build().unwrap();

        assert_eq!(m.initial_value(x), Some(0.25));
        assert_eq!(m.variable(x).unwrap().guess(), Some(&Guess::Constant(0.25)));
        assert_eq!(m.initial_point(), vec![0.25, 1.0]);
        let residuals = m.initial_residuals();
        assert_eq!(residuals, vec![("x_initial".to_string(), 0.0)]);
    }

    #[test]
    fn fix_initial_rejects_non_finite() {
        let mut b = builder();
        let x = b.declare("x", Role::State, Bounds::free()).unwrap();
        assert!(b.fix_initial(x, f64::INFINITY).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ids_follow_declaration_order(n in 1_usize..20) {
                let mut b = ModelBuilder::new("p", 1.0).unwrap();
                for i in 0..n {
                    let id = b.declare(&format!("x{i}"), Role::State, Bounds::free()).unwrap();
                    prop_assert_eq!(id.index(), i);
                }
                for i in 0..n {
                    prop_assert_eq!(b.var(&format!("x{i}")).map(|id| id.index()), Some(i));
                }
            }

            #[test]
            fn bounds_validation_matches_order(l in -10.0_f64..10.0, u in -10.0_f64..10.0) {
                let mut b = ModelBuilder::new("p", 1.0).unwrap();
                let res = b.declare("x", Role::Control, Bounds::between(l, u));
                prop_assert_eq!(res.is_ok(), l <= u);
            }
        }
    }
}
