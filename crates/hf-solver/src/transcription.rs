//! Forward-difference transcription of a [`DynamicModel`] into an NLP.
//!
//! Columns are node-major: every time-varying variable of node 0, then node
//! 1, and so on, followed by one column per coefficient. Rows are the
//! derivative links, then the model's constraints in declaration order at
//! the nodes their scope selects.

use crate::error::{SolverError, SolverResult};
use crate::nlp::{NlpProblem, RowKind, bound_violation, max_violation};
use crate::trajectory::Trajectory;
use hf_core::{VarId, uniform_grid};
use hf_model::{DynamicModel, EvalContext, Expr, ObjectiveSense, ObjectiveTerm, Relation, Scope};

/// Where each model variable lives in the NLP vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnLayout {
    n_nodes: usize,
    per_node: usize,
    /// Per variable: position within a node, or index among coefficients.
    slots: Vec<Slot>,
    coefficients: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Node(usize),
    Coefficient(usize),
}

impl ColumnLayout {
    /// Layout for `n_nodes` intervals (`n_nodes + 1` points).
    pub fn new(model: &DynamicModel, n_nodes: usize) -> Self {
        let (mut per_node, mut coefficients) = (0, 0);
        let slots = model
            .variables()
            .iter()
            .map(|v| {
                if v.role().is_time_varying() {
                    per_node += 1;
                    Slot::Node(per_node - 1)
                } else {
                    coefficients += 1;
                    Slot::Coefficient(coefficients - 1)
                }
            })
            .collect();
        Self {
            n_nodes,
            per_node,
            slots,
            coefficients,
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn num_columns(&self) -> usize {
        self.per_node * (self.n_nodes + 1) + self.coefficients
    }

    /// Column of `var` at `node`; coefficients ignore the node.
    pub fn column(&self, var: VarId, node: usize) -> usize {
        match self.slots[var.index()] {
            Slot::Node(k) => node * self.per_node + k,
            Slot::Coefficient(k) => self.per_node * (self.n_nodes + 1) + k,
        }
    }
}

/// Variable values of one node, read straight from the NLP vector.
struct NodeView<'a> {
    layout: &'a ColumnLayout,
    x: &'a [f64],
    node: usize,
    time: f64,
}

impl EvalContext for NodeView<'_> {
    fn time(&self) -> f64 {
        self.time
    }

    fn value(&self, var: VarId) -> f64 {
        self.x[self.layout.column(var, self.node)]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RowSpec {
    /// `(base[i+1] − base[i]) / Δt − deriv[i]`
    Link {
        base: VarId,
        deriv: VarId,
        node: usize,
    },
    /// A model constraint at one node; `negate` turns `≥ 0` into `≤ 0`.
    Constraint {
        index: usize,
        node: usize,
        negate: bool,
    },
}

/// A model discretized on a uniform grid.
pub struct TranscribedNlp<'m> {
    model: &'m DynamicModel,
    layout: ColumnLayout,
    times: Vec<f64>,
    dt: f64,
    rows: Vec<RowSpec>,
    /// Sorted variables of each constraint body, for second derivatives.
    constraint_vars: Vec<Vec<VarId>>,
    term_vars: Vec<Vec<VarId>>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    start: Vec<f64>,
    /// `+1` to minimize, `−1` to maximize.
    sign: f64,
}

impl<'m> TranscribedNlp<'m> {
    pub fn new(model: &'m DynamicModel, n_nodes: usize) -> SolverResult<Self> {
        if n_nodes == 0 {
            return Err(SolverError::ProblemSetup {
                what: "n_nodes must be at least 1".into(),
            });
        }
        let tf = model.tf();
        let times = uniform_grid(tf, n_nodes)?;
        let dt = tf / n_nodes as f64;
        let layout = ColumnLayout::new(model, n_nodes);

        let mut rows = Vec::new();
        for v in model.variables() {
            if let Some(base) = v.derivative_of() {
                rows.extend((0..n_nodes).map(|node| RowSpec::Link {
                    base,
                    deriv: v.id(),
                    node,
                }));
            }
        }
        for (index, c) in model.constraints().iter().enumerate() {
            let negate = c.relation() == Relation::Ge;
            let nodes = match c.scope() {
                Scope::Path => 0..=n_nodes,
                Scope::Initial => 0..=0,
                Scope::Final => n_nodes..=n_nodes,
            };
            rows.extend(nodes.map(|node| RowSpec::Constraint {
                index,
                node,
                negate,
            }));
        }

        let n = layout.num_columns();
        let (mut lower, mut upper) = (vec![0.0; n], vec![0.0; n]);
        let mut start = vec![0.0; n];
        for v in model.variables() {
            let bounds = v.bounds();
            let nodes = if v.role().is_time_varying() {
                0..=n_nodes
            } else {
                0..=0
            };
            for node in nodes {
                let col = layout.column(v.id(), node);
                lower[col] = bounds.lower_or_inf();
                upper[col] = bounds.upper_or_inf();
                let s = times[node] / tf;
                start[col] = match (node, model.initial_value(v.id())) {
                    (0, Some(value)) => bounds.project(value),
                    _ => v.guess_at(s),
                };
            }
        }

        let sign = match model.objective().sense() {
            ObjectiveSense::Minimize => 1.0,
            ObjectiveSense::Maximize => -1.0,
        };
        Ok(Self {
            model,
            constraint_vars: model
                .constraints()
                .iter()
                .map(|c| c.body().variables())
                .collect(),
            term_vars: model
                .objective()
                .terms()
                .iter()
                .map(|t| term_expr(t).variables())
                .collect(),
            layout,
            times,
            dt,
            rows,
            lower,
            upper,
            start,
            sign,
        })
    }

    /// Replace the starting point with `guess`, matched by variable name in
    /// normalized time. Fixed initial values keep precedence at node 0.
    pub fn warm_start(&mut self, guess: &Trajectory) {
        let tf = self.model.tf();
        for v in self.model.variables() {
            let bounds = v.bounds();
            let nodes = if v.role().is_time_varying() {
                0..=self.layout.n_nodes
            } else {
                0..=0
            };
            for node in nodes {
                if node == 0 && self.model.initial_value(v.id()).is_some() {
                    continue;
                }
                if let Some(value) = guess.sample(v.name(), self.times[node] / tf) {
                    if value.is_finite() {
                        self.start[self.layout.column(v.id(), node)] = bounds.project(value);
                    }
                }
            }
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Human-readable name of `row`, e.g. `gap_upper@12`.
    pub fn row_label(&self, row: usize) -> String {
        match self.rows[row] {
            RowSpec::Link { deriv, node, .. } => {
                let name = self.model.variable(deriv).map_or("?", |v| v.name());
                format!("link_{name}@{node}")
            }
            RowSpec::Constraint { index, node, .. } => {
                format!("{}@{node}", self.model.constraints()[index].name())
            }
        }
    }

    fn view<'a>(&'a self, x: &'a [f64], node: usize) -> NodeView<'a> {
        NodeView {
            layout: &self.layout,
            x,
            node,
            time: self.times[node],
        }
    }

    /// Nodes and quadrature weights of an objective term.
    fn term_nodes(&self, term: &ObjectiveTerm) -> Vec<(usize, f64)> {
        let n = self.layout.n_nodes;
        match term {
            ObjectiveTerm::Terminal(_) => vec![(n, 1.0)],
            ObjectiveTerm::Integral(_) => (0..=n)
                .map(|i| {
                    let w = if i == 0 || i == n {
                        0.5 * self.dt
                    } else {
                        self.dt
                    };
                    (i, w)
                })
                .collect(),
        }
    }

    /// Objective at `x` in the model's own sense.
    pub fn model_objective(&self, x: &[f64]) -> f64 {
        let mut total = 0.0;
        for term in self.model.objective().terms() {
            let body = term_expr(term);
            for (node, w) in self.term_nodes(term) {
                total += w * body.eval(&self.view(x, node));
            }
        }
        total
    }

    /// Largest row or bound violation at `x`, in model units.
    pub fn violation(&self, x: &[f64]) -> f64 {
        let mut scratch = Vec::new();
        let residuals: Vec<f64> = (0..self.rows.len())
            .map(|r| {
                scratch.clear();
                self.eval_row(r, x, &mut scratch)
            })
            .collect();
        max_violation(self, &residuals).max(bound_violation(x, &self.lower, &self.upper))
    }

    /// Node values of every model variable.
    pub fn trajectory(&self, x: &[f64]) -> SolverResult<Trajectory> {
        let columns = self
            .model
            .variables()
            .iter()
            .map(|v| {
                (0..=self.layout.n_nodes)
                    .map(|node| x[self.layout.column(v.id(), node)])
                    .collect()
            })
            .collect();
        Trajectory::from_columns(self.model.variable_names(), self.times.clone(), columns)
    }
}

fn term_expr(term: &ObjectiveTerm) -> &Expr {
    match term {
        ObjectiveTerm::Terminal(e) | ObjectiveTerm::Integral(e) => e,
    }
}

impl NlpProblem for TranscribedNlp<'_> {
    fn num_vars(&self) -> usize {
        self.layout.num_columns()
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    fn initial_point(&self) -> Vec<f64> {
        self.start.clone()
    }

    fn row_kind(&self, row: usize) -> RowKind {
        match self.rows[row] {
            RowSpec::Link { .. } => RowKind::Equality,
            RowSpec::Constraint { index, .. } => match self.model.constraints()[index].relation() {
                Relation::Eq => RowKind::Equality,
                Relation::Le | Relation::Ge => RowKind::Inequality,
            },
        }
    }

    fn eval_row(&self, row: usize, x: &[f64], grad: &mut Vec<(usize, f64)>) -> f64 {
        match self.rows[row] {
            RowSpec::Link { base, deriv, node } => {
                let (next, here) = (
                    self.layout.column(base, node + 1),
                    self.layout.column(base, node),
                );
                let d = self.layout.column(deriv, node);
                let inv = 1.0 / self.dt;
                grad.extend([(next, inv), (here, -inv), (d, -1.0)]);
                (x[next] - x[here]) * inv - x[d]
            }
            RowSpec::Constraint {
                index,
                node,
                negate,
            } => {
                let s = if negate { -1.0 } else { 1.0 };
                let body = self.model.constraints()[index].body();
                let dual = body.eval_dual(&self.view(x, node));
                grad.extend(
                    dual.grad
                        .iter()
                        .map(|&(v, d)| (self.layout.column(v, node), s * d)),
                );
                s * dual.value
            }
        }
    }

    fn eval_objective(&self, x: &[f64], grad: &mut Vec<(usize, f64)>) -> f64 {
        let mut total = 0.0;
        for term in self.model.objective().terms() {
            let body = term_expr(term);
            for (node, w) in self.term_nodes(term) {
                let dual = body.eval_dual(&self.view(x, node));
                let k = self.sign * w;
                total += k * dual.value;
                grad.extend(
                    dual.grad
                        .iter()
                        .map(|&(v, d)| (self.layout.column(v, node), k * d)),
                );
            }
        }
        total
    }

    fn row_hessian(&self, row: usize, x: &[f64], weight: f64, hess: &mut Vec<(usize, usize, f64)>) {
        let RowSpec::Constraint {
            index,
            node,
            negate,
        } = self.rows[row]
        else {
            return;
        };
        let vars = &self.constraint_vars[index];
        let body = self.model.constraints()[index].body();
        let second = body.eval_second_order(&self.view(x, node), vars);
        let k = if negate { -weight } else { weight };
        push_dense(&self.layout, vars, node, &second.hess, k, hess);
    }

    fn objective_hessian(&self, x: &[f64], weight: f64, hess: &mut Vec<(usize, usize, f64)>) {
        for (term, vars) in self.model.objective().terms().iter().zip(&self.term_vars) {
            let body = term_expr(term);
            for (node, w) in self.term_nodes(term) {
                let second = body.eval_second_order(&self.view(x, node), vars);
                push_dense(&self.layout, vars, node, &second.hess, weight * self.sign * w, hess);
            }
        }
    }
}

/// Append the non-zero entries of a dense local Hessian as NLP triplets.
fn push_dense(
    layout: &ColumnLayout,
    vars: &[VarId],
    node: usize,
    local: &[f64],
    scale: f64,
    out: &mut Vec<(usize, usize, f64)>,
) {
    let k = vars.len();
    for (a, &va) in vars.iter().enumerate() {
        for (b, &vb) in vars.iter().enumerate() {
            let h = local[a * k + b];
            if h != 0.0 {
                out.push((layout.column(va, node), layout.column(vb, node), scale * h));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hf_model::{Bounds, ModelBuilder, Objective, Role};

    /// `x' = v`, `v ∈ [−1, 1]`, `x(0) = 0`, maximize `x(tf)`.
    fn sprint(tf: f64) -> DynamicModel {
        let mut b = ModelBuilder::new("sprint", tf).unwrap();
        let x = b.declare("x", Role::State, Bounds::free()).unwrap();
        let v = b.link_derivative(x, "v", Bounds::symmetric(1.0)).unwrap();
        let k = b.declare("k", Role::Coefficient, Bounds::free()).unwrap();
        b.add_path("k_pin", Expr::var(k) - 2.0, Relation::Eq).unwrap();
        b.add_path("slow", Expr::var(v) - Expr::var(k), Relation::Le).unwrap();
        b.add_path("floor", Expr::var(x), Relation::Ge).unwrap();
        b.fix_initial(x, 0.0).unwrap();
        b.set_objective(Objective::maximize_terminal(Expr::var(x)));
        b.build().unwrap()
    }

    #[test]
    fn layout_is_node_major_with_coefficients_last() {
        let m = sprint(1.0);
        let layout = ColumnLayout::new(&m, 4);
        let (x, v, k) = (m.var("x").unwrap(), m.var("v").unwrap(), m.var("k").unwrap());
        assert_eq!(layout.num_columns(), 2 * 5 + 1);
        assert_eq!(layout.column(x, 0), 0);
        assert_eq!(layout.column(v, 0), 1);
        assert_eq!(layout.column(x, 3), 6);
        assert_eq!(layout.column(k, 0), 10);
        assert_eq!(layout.column(k, 4), 10);
    }

    #[test]
    fn rows_cover_links_and_scopes() {
        let m = sprint(1.0);
        let nlp = TranscribedNlp::new(&m, 4).unwrap();
        // 4 links + 3 path constraints × 5 nodes + 1 initial condition.
        assert_eq!(nlp.num_rows(), 4 + 15 + 1);
        assert_eq!(nlp.row_label(0), "link_v@0");
        assert_eq!(nlp.row_kind(0), RowKind::Equality);
        let floor = (0..nlp.num_rows())
            .find(|&r| nlp.row_label(r) == "floor@2")
            .unwrap();
        assert_eq!(nlp.row_kind(floor), RowKind::Inequality);
    }

    #[test]
    fn ge_rows_are_negated() {
        let m = sprint(1.0);
        let nlp = TranscribedNlp::new(&m, 2).unwrap();
        let mut x = nlp.initial_point();
        let col = nlp.layout().column(m.var("x").unwrap(), 1);
        x[col] = 0.25;
        let row = (0..nlp.num_rows())
            .find(|&r| nlp.row_label(r) == "floor@1")
            .unwrap();
        let mut grad = Vec::new();
        assert_eq!(nlp.eval_row(row, &x, &mut grad), -0.25);
        assert_eq!(grad, vec![(col, -1.0)]);
    }

    #[test]
    fn link_rows_use_forward_differences() {
        let m = sprint(2.0);
        let nlp = TranscribedNlp::new(&m, 4).unwrap();
        let layout = nlp.layout();
        let (xv, vv) = (m.var("x").unwrap(), m.var("v").unwrap());
        let mut x = vec![0.0; nlp.num_vars()];
        for node in 0..=4 {
            x[layout.column(xv, node)] = (node as f64 * 0.5).powi(2);
            x[layout.column(vv, node)] = node as f64;
        }
        let mut grad = Vec::new();
        // (x[2] - x[1]) / 0.5 - v[1] = (1 - 0.25) / 0.5 - 1
        let r = nlp.eval_row(1, &x, &mut grad);
        assert_relative_eq!(r, 0.5, epsilon = 1e-14);
        assert_eq!(grad.len(), 3);
    }

    #[test]
    fn maximization_is_negated_internally() {
        let m = sprint(1.0);
        let nlp = TranscribedNlp::new(&m, 2).unwrap();
        let mut x = nlp.initial_point();
        let last = nlp.layout().column(m.var("x").unwrap(), 2);
        x[last] = 0.75;
        let mut grad = Vec::new();
        assert_eq!(nlp.eval_objective(&x, &mut grad), -0.75);
        assert_eq!(grad, vec![(last, -1.0)]);
        assert_eq!(nlp.model_objective(&x), 0.75);
    }

    #[test]
    fn integral_terms_use_the_trapezoid_rule() {
        let mut b = ModelBuilder::new("area", 2.0).unwrap();
        let u = b.declare("u", Role::Control, Bounds::free()).unwrap();
        b.set_objective(Objective::minimize_integral(Expr::var(u).square()));
        let m = b.build().unwrap();
        let nlp = TranscribedNlp::new(&m, 2).unwrap();
        // u = 1, 2, 3 on t = 0, 1, 2: 0.5·1 + 4 + 0.5·9
        let x = vec![1.0, 2.0, 3.0];
        assert_relative_eq!(nlp.model_objective(&x), 9.0);
        let mut hess = Vec::new();
        nlp.objective_hessian(&x, 1.0, &mut hess);
        assert_eq!(hess, vec![(0, 0, 1.0), (1, 1, 2.0), (2, 2, 1.0)]);
    }

    #[test]
    fn start_respects_fixed_initial_values_and_bounds() {
        let m = sprint(1.0);
        let nlp = TranscribedNlp::new(&m, 3).unwrap();
        let x0 = nlp.initial_point();
        let layout = nlp.layout();
        assert_eq!(x0[layout.column(m.var("x").unwrap(), 0)], 0.0);
        for (i, (&l, &u)) in nlp.lower_bounds().iter().zip(nlp.upper_bounds()).enumerate() {
            assert!(l <= x0[i] && x0[i] <= u);
        }
        assert_eq!(nlp.violation(&x0), 2.0);
    }

    #[test]
    fn warm_start_maps_normalized_time() {
        let m = sprint(1.0);
        let mut nlp = TranscribedNlp::new(&m, 2).unwrap();
        let guess = Trajectory::from_columns(
            vec!["x".into(), "v".into()],
            vec![0.0, 4.0],
            vec![vec![5.0, 9.0], vec![3.0, 3.0]],
        )
        .unwrap();
        nlp.warm_start(&guess);
        let x0 = nlp.initial_point();
        let layout = nlp.layout();
        let (xv, vv) = (m.var("x").unwrap(), m.var("v").unwrap());
        assert_eq!(x0[layout.column(xv, 0)], 0.0, "fixed initial value wins");
        assert_eq!(x0[layout.column(xv, 1)], 7.0);
        assert_eq!(x0[layout.column(vv, 1)], 1.0, "projected onto bounds");
    }

    #[test]
    fn zero_nodes_is_a_setup_error() {
        let m = sprint(1.0);
        assert!(matches!(
            TranscribedNlp::new(&m, 0),
            Err(SolverError::ProblemSetup { .. })
        ));
    }
}
