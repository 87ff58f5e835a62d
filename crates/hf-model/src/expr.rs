//! Symbolic scalar expressions over model variables and time.
//!
//! Constraints and objectives are stated as `Expr` trees. Transcription
//! evaluates the same tree at every node through an [`EvalContext`], and the
//! solver receives exact first derivatives from [`Expr::eval_dual`]
//! (forward accumulation with sparse gradients).

use hf_core::VarId;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Values of the variables at one time instant.
pub trait EvalContext {
    /// Time at which the expression is evaluated.
    fn time(&self) -> f64;
    /// Value of `var` at that time.
    fn value(&self, var: VarId) -> f64;
}

/// Variable values indexed by declaration order, at a fixed time.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    pub time: f64,
    pub values: &'a [f64],
}

impl EvalContext for Snapshot<'_> {
    fn time(&self) -> f64 {
        self.time
    }

    fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(f64::NAN)
    }
}

/// Elementary functions available inside expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryFn {
    Exp,
    Ln,
    Sinh,
    Sin,
    Cos,
    Tan,
    Erf,
}

impl UnaryFn {
    fn value(self, a: f64) -> f64 {
        match self {
            UnaryFn::Exp => a.exp(),
            UnaryFn::Ln => a.ln(),
            UnaryFn::Sinh => a.sinh(),
            UnaryFn::Sin => a.sin(),
            UnaryFn::Cos => a.cos(),
            UnaryFn::Tan => a.tan(),
            UnaryFn::Erf => statrs::function::erf::erf(a),
        }
    }

    fn derivative(self, a: f64) -> f64 {
        match self {
            UnaryFn::Exp => a.exp(),
            UnaryFn::Ln => 1.0 / a,
            UnaryFn::Sinh => a.cosh(),
            UnaryFn::Sin => a.cos(),
            UnaryFn::Cos => -a.sin(),
            UnaryFn::Tan => {
                let c = a.cos();
                1.0 / (c * c)
            }
            UnaryFn::Erf => std::f64::consts::FRAC_2_SQRT_PI * (-a * a).exp(),
        }
    }

    fn second_derivative(self, a: f64) -> f64 {
        match self {
            UnaryFn::Exp => a.exp(),
            UnaryFn::Ln => -1.0 / (a * a),
            UnaryFn::Sinh => a.sinh(),
            UnaryFn::Sin => -a.sin(),
            UnaryFn::Cos => -a.cos(),
            UnaryFn::Tan => {
                let c = a.cos();
                2.0 * a.tan() / (c * c)
            }
            UnaryFn::Erf => -2.0 * a * std::f64::consts::FRAC_2_SQRT_PI * (-a * a).exp(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            UnaryFn::Exp => "exp",
            UnaryFn::Ln => "ln",
            UnaryFn::Sinh => "sinh",
            UnaryFn::Sin => "sin",
            UnaryFn::Cos => "cos",
            UnaryFn::Tan => "tan",
            UnaryFn::Erf => "erf",
        }
    }
}

/// Scalar expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(f64),
    /// The independent variable `t`.
    Time,
    /// Value of a variable at the evaluation instant.
    Var(VarId),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Powi(Box<Expr>, i32),
    Apply(UnaryFn, Box<Expr>),
}

/// Value together with its gradient, sorted by variable id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub grad: Vec<(VarId, f64)>,
}

impl Dual {
    fn constant(value: f64) -> Self {
        Self {
            value,
            grad: Vec::new(),
        }
    }

    fn chain(self, value: f64, slope: f64) -> Self {
        Self {
            value,
            grad: self.grad.into_iter().map(|(v, d)| (v, slope * d)).collect(),
        }
    }

    /// Partial derivative with respect to `var` (zero if absent).
    pub fn partial(&self, var: VarId) -> f64 {
        self.grad
            .binary_search_by(|(v, _)| v.cmp(&var))
            .map(|i| self.grad[i].1)
            .unwrap_or(0.0)
    }
}

/// Value, gradient and Hessian over a fixed list of local variables.
///
/// `grad[i]` and `hess[i * k + j]` refer to `vars[i]` of the list passed to
/// [`Expr::eval_second_order`]; the Hessian is stored dense and symmetric.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondOrder {
    pub value: f64,
    pub grad: Vec<f64>,
    pub hess: Vec<f64>,
}

impl SecondOrder {
    fn constant(value: f64, k: usize) -> Self {
        Self {
            value,
            grad: vec![0.0; k],
            hess: vec![0.0; k * k],
        }
    }

    /// Apply a scalar function with first and second derivatives `d1`, `d2`.
    fn chain(mut self, value: f64, d1: f64, d2: f64) -> Self {
        let k = self.grad.len();
        for i in 0..k {
            for j in 0..k {
                self.hess[i * k + j] = d1 * self.hess[i * k + j] + d2 * self.grad[i] * self.grad[j];
            }
        }
        for g in &mut self.grad {
            *g *= d1;
        }
        self.value = value;
        self
    }

    fn linear(a: Self, ka: f64, b: Self, kb: f64, value: f64) -> Self {
        Self {
            value,
            grad: a.grad.iter().zip(&b.grad).map(|(x, y)| ka * x + kb * y).collect(),
            hess: a.hess.iter().zip(&b.hess).map(|(x, y)| ka * x + kb * y).collect(),
        }
    }

    fn product(a: Self, b: Self) -> Self {
        let k = a.grad.len();
        let mut hess = vec![0.0; k * k];
        for i in 0..k {
            for j in 0..k {
                hess[i * k + j] = a.hess[i * k + j] * b.value
                    + b.hess[i * k + j] * a.value
                    + a.grad[i] * b.grad[j]
                    + b.grad[i] * a.grad[j];
            }
        }
        Self {
            value: a.value * b.value,
            grad: a
                .grad
                .iter()
                .zip(&b.grad)
                .map(|(ga, gb)| ga * b.value + gb * a.value)
                .collect(),
            hess,
        }
    }
}

/// `ka·a + kb·b` for two sorted sparse gradients.
fn combine(a: &[(VarId, f64)], ka: f64, b: &[(VarId, f64)], kb: f64) -> Vec<(VarId, f64)> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => {
                out.push((a[i].0, ka * a[i].1));
                i += 1;
            }
            Ordering::Greater => {
                out.push((b[j].0, kb * b[j].1));
                j += 1;
            }
            Ordering::Equal => {
                out.push((a[i].0, ka * a[i].1 + kb * b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend(a[i..].iter().map(|&(v, d)| (v, ka * d)));
    out.extend(b[j..].iter().map(|&(v, d)| (v, kb * d)));
    out
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn time() -> Self {
        Expr::Time
    }

    pub fn var(id: VarId) -> Self {
        Expr::Var(id)
    }

    pub fn exp(self) -> Self {
        Expr::Apply(UnaryFn::Exp, Box::new(self))
    }

    pub fn ln(self) -> Self {
        Expr::Apply(UnaryFn::Ln, Box::new(self))
    }

    pub fn sinh(self) -> Self {
        Expr::Apply(UnaryFn::Sinh, Box::new(self))
    }

    pub fn sin(self) -> Self {
        Expr::Apply(UnaryFn::Sin, Box::new(self))
    }

    pub fn cos(self) -> Self {
        Expr::Apply(UnaryFn::Cos, Box::new(self))
    }

    pub fn tan(self) -> Self {
        Expr::Apply(UnaryFn::Tan, Box::new(self))
    }

    pub fn erf(self) -> Self {
        Expr::Apply(UnaryFn::Erf, Box::new(self))
    }

    pub fn powi(self, n: i32) -> Self {
        Expr::Powi(Box::new(self), n)
    }

    pub fn square(self) -> Self {
        self.powi(2)
    }

    /// Evaluate the value only.
    pub fn eval(&self, ctx: &dyn EvalContext) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Time => ctx.time(),
            Expr::Var(id) => ctx.value(*id),
            Expr::Add(a, b) => a.eval(ctx) + b.eval(ctx),
            Expr::Sub(a, b) => a.eval(ctx) - b.eval(ctx),
            Expr::Mul(a, b) => a.eval(ctx) * b.eval(ctx),
            Expr::Div(a, b) => a.eval(ctx) / b.eval(ctx),
            Expr::Neg(a) => -a.eval(ctx),
            Expr::Powi(a, n) => a.eval(ctx).powi(*n),
            Expr::Apply(f, a) => f.value(a.eval(ctx)),
        }
    }

    /// Evaluate the value and the gradient with respect to every variable
    /// the expression references.
    pub fn eval_dual(&self, ctx: &dyn EvalContext) -> Dual {
        match self {
            Expr::Const(c) => Dual::constant(*c),
            Expr::Time => Dual::constant(ctx.time()),
            Expr::Var(id) => Dual {
                value: ctx.value(*id),
                grad: vec![(*id, 1.0)],
            },
            Expr::Add(a, b) => {
                let (a, b) = (a.eval_dual(ctx), b.eval_dual(ctx));
                Dual {
                    value: a.value + b.value,
                    grad: combine(&a.grad, 1.0, &b.grad, 1.0),
                }
            }
            Expr::Sub(a, b) => {
                let (a, b) = (a.eval_dual(ctx), b.eval_dual(ctx));
                Dual {
                    value: a.value - b.value,
                    grad: combine(&a.grad, 1.0, &b.grad, -1.0),
                }
            }
            Expr::Mul(a, b) => {
                let (a, b) = (a.eval_dual(ctx), b.eval_dual(ctx));
                Dual {
                    value: a.value * b.value,
                    grad: combine(&a.grad, b.value, &b.grad, a.value),
                }
            }
            Expr::Div(a, b) => {
                let (a, b) = (a.eval_dual(ctx), b.eval_dual(ctx));
                let q = a.value / b.value;
                Dual {
                    value: q,
                    grad: combine(&a.grad, 1.0 / b.value, &b.grad, -q / b.value),
                }
            }
            Expr::Neg(a) => {
                let a = a.eval_dual(ctx);
                let v = -a.value;
                a.chain(v, -1.0)
            }
            Expr::Powi(a, n) => {
                let a = a.eval_dual(ctx);
                let v = a.value.powi(*n);
                let slope = if *n == 0 {
                    0.0
                } else {
                    f64::from(*n) * a.value.powi(*n - 1)
                };
                a.chain(v, slope)
            }
            Expr::Apply(f, a) => {
                let a = a.eval_dual(ctx);
                let (v, slope) = (f.value(a.value), f.derivative(a.value));
                a.chain(v, slope)
            }
        }
    }

    /// Evaluate value, gradient and Hessian with respect to `vars`.
    ///
    /// `vars` must be sorted (as returned by [`Expr::variables`]); variables
    /// outside the list are treated as constants.
    pub fn eval_second_order(&self, ctx: &dyn EvalContext, vars: &[VarId]) -> SecondOrder {
        let k = vars.len();
        match self {
            Expr::Const(c) => SecondOrder::constant(*c, k),
            Expr::Time => SecondOrder::constant(ctx.time(), k),
            Expr::Var(id) => {
                let mut out = SecondOrder::constant(ctx.value(*id), k);
                if let Ok(i) = vars.binary_search(id) {
                    out.grad[i] = 1.0;
                }
                out
            }
            Expr::Add(a, b) => {
                let (a, b) = (a.eval_second_order(ctx, vars), b.eval_second_order(ctx, vars));
                let v = a.value + b.value;
                SecondOrder::linear(a, 1.0, b, 1.0, v)
            }
            Expr::Sub(a, b) => {
                let (a, b) = (a.eval_second_order(ctx, vars), b.eval_second_order(ctx, vars));
                let v = a.value - b.value;
                SecondOrder::linear(a, 1.0, b, -1.0, v)
            }
            Expr::Mul(a, b) => {
                SecondOrder::product(a.eval_second_order(ctx, vars), b.eval_second_order(ctx, vars))
            }
            Expr::Div(a, b) => {
                let b = b.eval_second_order(ctx, vars);
                let r = 1.0 / b.value;
                let recip = b.chain(r, -r * r, 2.0 * r * r * r);
                SecondOrder::product(a.eval_second_order(ctx, vars), recip)
            }
            Expr::Neg(a) => {
                let a = a.eval_second_order(ctx, vars);
                let v = -a.value;
                a.chain(v, -1.0, 0.0)
            }
            Expr::Powi(a, n) => {
                let a = a.eval_second_order(ctx, vars);
                let x = a.value;
                let nf = f64::from(*n);
                let d1 = if *n == 0 { 0.0 } else { nf * x.powi(*n - 1) };
                let d2 = if *n == 0 || *n == 1 {
                    0.0
                } else {
                    nf * (nf - 1.0) * x.powi(*n - 2)
                };
                a.chain(x.powi(*n), d1, d2)
            }
            Expr::Apply(f, a) => {
                let a = a.eval_second_order(ctx, vars);
                let x = a.value;
                a.chain(f.value(x), f.derivative(x), f.second_derivative(x))
            }
        }
    }

    /// Sorted, de-duplicated variables referenced by the expression.
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_vars(&self, out: &mut Vec<VarId>) {
        match self {
            Expr::Const(_) | Expr::Time => {}
            Expr::Var(id) => out.push(*id),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Expr::Neg(a) | Expr::Powi(a, _) | Expr::Apply(_, a) => a.collect_vars(out),
        }
    }

    /// True when the expression depends on `t`.
    pub fn depends_on_time(&self) -> bool {
        match self {
            Expr::Time => true,
            Expr::Const(_) | Expr::Var(_) => false,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.depends_on_time() || b.depends_on_time()
            }
            Expr::Neg(a) | Expr::Powi(a, _) | Expr::Apply(_, a) => a.depends_on_time(),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<VarId> for Expr {
    fn from(id: VarId) -> Self {
        Expr::Var(id)
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl $trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Box::new(self), Box::new(Expr::Const(rhs)))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Const(self)), Box::new(rhs))
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(rhs.clone()))
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(rhs))
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.clone()))
            }
        }

        impl $trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(Expr::Const(rhs)))
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Const(self)), Box::new(rhs.clone()))
            }
        }
    };
}

binary_op!(Add, add, Add);
binary_op!(Sub, sub, Sub);
binary_op!(Mul, mul, Mul);
binary_op!(Div, div, Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self.clone()))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Time => write!(f, "t"),
            Expr::Var(id) => write!(f, "{id}"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "{a}*{b}"),
            Expr::Div(a, b) => write!(f, "{a}/{b}"),
            Expr::Neg(a) => write!(f, "-{a}"),
            Expr::Powi(a, n) => write!(f, "{a}^{n}"),
            Expr::Apply(func, a) => write!(f, "{}({a})", func.name()),
        }
    }
}
