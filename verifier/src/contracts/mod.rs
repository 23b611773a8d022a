//! Module-wide contract simplification
//!
//! Rewrites every precondition, postcondition and loop invariant with the
//! expression simplifier and reports what it learned. The returned module
//! shares every untouched function with the input; if nothing changed at
//! all, the input `Rc` itself is returned.

use std::rc::Rc;

use crate::ast::{BoundContract, BoundFunction, BoundModule, BoundStmt, IfBranch, StmtKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::simplify::{DEFAULT_MAX_ITERATIONS, ExpressionSimplifier, ObservationKind};

pub struct ContractSimplificationPass {
    sink: DiagnosticSink,
    simplifier: ExpressionSimplifier,
    max_iterations: usize,
}

impl ContractSimplificationPass {
    pub fn new(sink: DiagnosticSink) -> Self {
        Self {
            sink,
            simplifier: ExpressionSimplifier::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn simplify(&self, module: &Rc<BoundModule>) -> Rc<BoundModule> {
        let rewritten: Vec<Option<BoundFunction>> =
            module.functions.iter().map(|f| self.simplify_function(f)).collect();
        if rewritten.iter().all(Option::is_none) {
            tracing::debug!(module = %module.name, "contracts unchanged");
            return Rc::clone(module);
        }

        let functions = rewritten
            .into_iter()
            .zip(&module.functions)
            .map(|(new, old)| new.map_or_else(|| Rc::clone(old), Rc::new))
            .collect();
        Rc::new(BoundModule {
            name: module.name.clone(),
            functions,
        })
    }

    fn simplify_function(&self, function: &BoundFunction) -> Option<BoundFunction> {
        let preconditions = self.simplify_contracts(&function.preconditions);
        let postconditions = self.simplify_contracts(&function.postconditions);
        let body = self.simplify_stmts(&function.body);
        if preconditions.is_none() && postconditions.is_none() && body.is_none() {
            return None;
        }
        tracing::debug!(function = %function.name, "contracts simplified");
        Some(BoundFunction {
            preconditions: preconditions.unwrap_or_else(|| function.preconditions.clone()),
            postconditions: postconditions.unwrap_or_else(|| function.postconditions.clone()),
            body: body.unwrap_or_else(|| function.body.clone()),
            ..function.clone()
        })
    }

    fn simplify_contracts(&self, contracts: &[BoundContract]) -> Option<Vec<BoundContract>> {
        rebuild(contracts, |c| self.simplify_contract(c))
    }

    fn simplify_contract(&self, contract: &BoundContract) -> Option<BoundContract> {
        let result = self
            .simplifier
            .simplify_to_fixed_point(&contract.condition, self.max_iterations);

        for observation in &result.observations {
            let diagnostic = match observation.kind {
                ObservationKind::Tautology => Diagnostic::info(
                    DiagnosticCode::ContractTautology,
                    format!("contract is always true: {}", observation.description),
                    contract.span,
                ),
                ObservationKind::Contradiction => Diagnostic::warning(
                    DiagnosticCode::ContractContradiction,
                    format!("contract can never hold: {}", observation.description),
                    contract.span,
                ),
            };
            self.sink.report(diagnostic);
        }

        if result.observations.is_empty() {
            let diagnostic = match result.expr.as_bool() {
                Some(true) => Some(Diagnostic::info(
                    DiagnosticCode::ContractTautology,
                    format!("contract `{}` is always true", contract.condition),
                    contract.span,
                )),
                Some(false) => Some(Diagnostic::warning(
                    DiagnosticCode::ContractContradiction,
                    format!("contract `{}` can never hold", contract.condition),
                    contract.span,
                )),
                None if result.changed => Some(Diagnostic::info(
                    DiagnosticCode::ContractSimplified,
                    format!("contract `{}` simplifies to `{}`", contract.condition, result.expr),
                    contract.span,
                )),
                None => None,
            };
            if let Some(diagnostic) = diagnostic {
                self.sink.report(diagnostic);
            }
        }

        result.changed.then(|| BoundContract {
            condition: result.expr,
            span: contract.span,
        })
    }

    fn simplify_stmts(&self, stmts: &[BoundStmt]) -> Option<Vec<BoundStmt>> {
        rebuild(stmts, |s| self.simplify_stmt(s))
    }

    /// Only loop invariants are contracts; other statements matter only for
    /// the loops nested inside them.
    fn simplify_stmt(&self, stmt: &BoundStmt) -> Option<BoundStmt> {
        let kind = match &stmt.kind {
            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
                invariants,
            } => {
                let new_invariants = self.simplify_contracts(invariants);
                let new_body = self.simplify_stmts(body);
                if new_invariants.is_none() && new_body.is_none() {
                    return None;
                }
                StmtKind::For {
                    var: var.clone(),
                    start: start.clone(),
                    end: end.clone(),
                    step: step.clone(),
                    body: new_body.unwrap_or_else(|| body.clone()),
                    invariants: new_invariants.unwrap_or_else(|| invariants.clone()),
                }
            }
            StmtKind::While {
                condition,
                body,
                invariants,
            } => {
                let new_invariants = self.simplify_contracts(invariants);
                let new_body = self.simplify_stmts(body);
                if new_invariants.is_none() && new_body.is_none() {
                    return None;
                }
                StmtKind::While {
                    condition: condition.clone(),
                    body: new_body.unwrap_or_else(|| body.clone()),
                    invariants: new_invariants.unwrap_or_else(|| invariants.clone()),
                }
            }
            StmtKind::If { branches, else_body } => {
                let new_branches = rebuild(branches, |b| {
                    self.simplify_stmts(&b.body).map(|body| IfBranch {
                        condition: b.condition.clone(),
                        body,
                    })
                });
                let new_else = else_body.as_ref().and_then(|e| self.simplify_stmts(e));
                if new_branches.is_none() && new_else.is_none() {
                    return None;
                }
                StmtKind::If {
                    branches: new_branches.unwrap_or_else(|| branches.clone()),
                    else_body: new_else.or_else(|| else_body.clone()),
                }
            }
            StmtKind::Block(body) => StmtKind::Block(self.simplify_stmts(body)?),
            StmtKind::Bind { .. } | StmtKind::Return(_) | StmtKind::Call(_) => return None,
        };
        Some(BoundStmt::new(kind, stmt.span))
    }
}

/// Apply `f` to each item; `None` if it changed none of them
fn rebuild<T: Clone>(items: &[T], f: impl Fn(&T) -> Option<T>) -> Option<Vec<T>> {
    let results: Vec<Option<T>> = items.iter().map(f).collect();
    if results.iter().all(Option::is_none) {
        return None;
    }
    Some(
        results
            .into_iter()
            .zip(items)
            .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BoundExpr, Span, Type};
    use crate::diagnostics::Severity;

    fn sp(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    fn x() -> BoundExpr {
        BoundExpr::var("x", Type::Int, sp(0))
    }

    fn p() -> BoundExpr {
        BoundExpr::var("p", Type::Bool, sp(0))
    }

    fn ge0() -> BoundExpr {
        BoundExpr::binary(BinaryOp::Ge, x(), BoundExpr::int(0, sp(0)), sp(0))
    }

    fn with_contract_span(expr: BoundExpr, span: Span) -> BoundExpr {
        BoundExpr { span, ..expr }
    }

    fn module(functions: Vec<BoundFunction>) -> Rc<BoundModule> {
        Rc::new(BoundModule::new("m", functions))
    }

    // ========================================================================
    // Identity
    // ========================================================================

    #[test]
    fn test_unchanged_module_is_same_rc() {
        let m = module(vec![BoundFunction::new("f", sp(0)).with_precondition(ge0())]);
        let sink = DiagnosticSink::new();
        let out = ContractSimplificationPass::new(sink.clone()).simplify(&m);
        assert!(Rc::ptr_eq(&m, &out));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_untouched_functions_are_shared() {
        let changed = BoundFunction::new("a", sp(0)).with_precondition(BoundExpr::binary(
            BinaryOp::And,
            BoundExpr::boolean(true, sp(0)),
            ge0(),
            sp(0),
        ));
        let untouched = BoundFunction::new("b", sp(0)).with_precondition(ge0());
        let m = module(vec![changed, untouched]);

        let sink = DiagnosticSink::new();
        let out = ContractSimplificationPass::new(sink.clone()).simplify(&m);
        assert!(!Rc::ptr_eq(&m, &out));
        assert!(Rc::ptr_eq(&m.functions[1], &out.functions[1]));
        assert_eq!(out.functions[0].preconditions[0].condition.to_string(), "x >= 0");
        assert_eq!(sink.count(DiagnosticCode::ContractSimplified), 1);
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    #[test]
    fn test_self_implication_is_one_tautology() {
        let span = Span::new(20, 30);
        let contract = with_contract_span(BoundExpr::implies(p(), p(), sp(0)), span);
        let m = module(vec![BoundFunction::new("f", sp(0)).with_postcondition(contract)]);

        let sink = DiagnosticSink::new();
        let out = ContractSimplificationPass::new(sink.clone()).simplify(&m);

        assert_eq!(out.functions[0].postconditions[0].condition.as_bool(), Some(true));
        assert_eq!(sink.len(), 1);
        let d = &sink.snapshot()[0];
        assert_eq!(d.code, DiagnosticCode::ContractTautology);
        assert_eq!(d.severity, Severity::Info);
        assert_eq!(d.span, span);
    }

    #[test]
    fn test_contradiction_is_warning() {
        let contract = BoundExpr::binary(BinaryOp::And, p(), BoundExpr::not(p(), sp(0)), sp(0));
        let m = module(vec![BoundFunction::new("f", sp(0)).with_precondition(contract)]);
        let sink = DiagnosticSink::new();
        ContractSimplificationPass::new(sink.clone()).simplify(&m);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].code, DiagnosticCode::ContractContradiction);
        assert_eq!(sink.snapshot()[0].severity, Severity::Warning);
    }

    #[test]
    fn test_folding_to_literal_without_observation() {
        // 1 < 2 folds to true; no tautology rule fired
        let contract = BoundExpr::binary(BinaryOp::Lt, BoundExpr::int(1, sp(0)), BoundExpr::int(2, sp(0)), sp(0));
        let m = module(vec![BoundFunction::new("f", sp(0)).with_precondition(contract)]);
        let sink = DiagnosticSink::new();
        ContractSimplificationPass::new(sink.clone()).simplify(&m);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].code, DiagnosticCode::ContractTautology);
    }

    // ========================================================================
    // Loop invariants
    // ========================================================================

    #[test]
    fn test_nested_loop_invariants_are_rewritten() {
        let invariant = BoundContract::new(BoundExpr::binary(
            BinaryOp::Or,
            ge0(),
            BoundExpr::boolean(false, sp(0)),
            sp(0),
        ));
        let inner = BoundStmt::while_(p(), vec![], vec![invariant], sp(5));
        let outer = BoundStmt::new(
            StmtKind::For {
                var: "i".to_string(),
                start: BoundExpr::int(0, sp(0)),
                end: BoundExpr::int(10, sp(0)),
                step: None,
                body: vec![BoundStmt::if_(p(), vec![inner], None, sp(4))],
                invariants: vec![],
            },
            sp(3),
        );
        let m = module(vec![BoundFunction::new("f", sp(0)).with_body(vec![outer])]);

        let sink = DiagnosticSink::new();
        let out = ContractSimplificationPass::new(sink.clone()).simplify(&m);

        let StmtKind::For { body, .. } = &out.functions[0].body[0].kind else {
            panic!("expected for loop");
        };
        let StmtKind::If { branches, .. } = &body[0].kind else {
            panic!("expected if");
        };
        let StmtKind::While { invariants, .. } = &branches[0].body[0].kind else {
            panic!("expected while loop");
        };
        assert_eq!(invariants[0].condition.to_string(), "x >= 0");
        assert_eq!(sink.count(DiagnosticCode::ContractSimplified), 1);
    }
}
