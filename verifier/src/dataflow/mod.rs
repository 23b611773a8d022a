//! Local dataflow checks: unused bindings and dead stores

use std::collections::{BTreeSet, HashSet};

use crate::ast::{BoundContract, BoundFunction, BoundStmt, Span, StmtKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};

#[derive(Debug, Clone, Copy, Default)]
pub struct DataflowAnalyzer;

impl DataflowAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Report unused locals and dead stores; returns how many were reported
    pub fn analyze(&self, function: &BoundFunction, sink: &DiagnosticSink) -> usize {
        let mut reported = 0;

        let reads = function_reads(function);
        let mut seen = HashSet::new();
        for (name, span) in declarations(&function.body) {
            if name.starts_with('_') || reads.contains(name) || !seen.insert(name) {
                continue;
            }
            sink.report(Diagnostic::warning(
                DiagnosticCode::UnusedVariable,
                format!("variable `{name}` is never read"),
                span,
            ));
            reported += 1;
        }

        reported += dead_stores(&function.body, sink);
        tracing::debug!(function = %function.name, reported, "dataflow checks done");
        reported
    }
}

/// Every variable read anywhere in the function, contracts included
fn function_reads(function: &BoundFunction) -> BTreeSet<String> {
    let mut reads = BTreeSet::new();
    for contract in function.preconditions.iter().chain(&function.postconditions) {
        reads.extend(contract.condition.free_vars());
    }
    collect_reads(&function.body, &mut reads);
    reads
}

fn collect_reads(stmts: &[BoundStmt], reads: &mut BTreeSet<String>) {
    for stmt in stmts {
        for expr in stmt.exprs() {
            reads.extend(expr.free_vars());
        }
        for contract in invariants(stmt) {
            reads.extend(contract.condition.free_vars());
        }
        for nested in stmt.nested() {
            collect_reads(nested, reads);
        }
    }
}

fn invariants(stmt: &BoundStmt) -> &[BoundContract] {
    match &stmt.kind {
        StmtKind::For { invariants, .. } | StmtKind::While { invariants, .. } => invariants,
        _ => &[],
    }
}

/// `let` bindings in statement order
fn declarations(stmts: &[BoundStmt]) -> Vec<(&str, Span)> {
    let mut out = Vec::new();
    for stmt in stmts {
        if let StmtKind::Bind {
            name,
            declaration: true,
            ..
        } = &stmt.kind
        {
            out.push((name.as_str(), stmt.span));
        }
        for nested in stmt.nested() {
            out.extend(declarations(nested));
        }
    }
    out
}

fn reads_var(stmt: &BoundStmt, name: &str) -> bool {
    stmt.exprs().iter().any(|e| e.mentions(name))
        || invariants(stmt).iter().any(|c| c.condition.mentions(name))
        || stmt.nested().iter().any(|body| body.iter().any(|s| reads_var(s, name)))
}

fn stored_var(stmt: &BoundStmt) -> Option<&str> {
    match &stmt.kind {
        StmtKind::Bind {
            name, value: Some(_), ..
        } => Some(name),
        _ => None,
    }
}

/// Stores overwritten later in the same list before any read
fn dead_stores(stmts: &[BoundStmt], sink: &DiagnosticSink) -> usize {
    let mut reported = 0;
    for (i, stmt) in stmts.iter().enumerate() {
        let Some(name) = stored_var(stmt) else {
            continue;
        };
        if name.starts_with('_') {
            continue;
        }
        for later in &stmts[i + 1..] {
            if reads_var(later, name) || matches!(later.kind, StmtKind::Return(_)) {
                break;
            }
            if stored_var(later) == Some(name) {
                sink.report(Diagnostic::info(
                    DiagnosticCode::DeadStore,
                    format!("value assigned to `{name}` is overwritten before it is read"),
                    stmt.span,
                ));
                reported += 1;
                break;
            }
        }
    }
    for stmt in stmts {
        for nested in stmt.nested() {
            reported += dead_stores(nested, sink);
        }
    }
    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BoundExpr, Type};

    fn sp(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    fn x() -> BoundExpr {
        BoundExpr::var("x", Type::Int, sp(0))
    }

    fn int(n: i64) -> BoundExpr {
        BoundExpr::int(n, sp(0))
    }

    fn run(f: &BoundFunction) -> DiagnosticSink {
        let sink = DiagnosticSink::new();
        DataflowAnalyzer::new().analyze(f, &sink);
        sink
    }

    fn func(body: Vec<BoundStmt>) -> BoundFunction {
        BoundFunction::new("f", sp(0)).with_body(body)
    }

    // ========================================================================
    // Unused variables
    // ========================================================================

    #[test]
    fn test_unused_local() {
        let f = func(vec![BoundStmt::let_("t", int(1), sp(3)), BoundStmt::ret(Some(int(0)), sp(9))]);
        let sink = run(&f);
        let found = sink.with_code(DiagnosticCode::UnusedVariable);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span, sp(3));
        assert!(found[0].message.contains("`t`"));
    }

    #[test]
    fn test_read_local_is_used() {
        let f = func(vec![
            BoundStmt::let_("x", int(1), sp(1)),
            BoundStmt::ret(Some(BoundExpr::binary(BinaryOp::Add, x(), int(1), sp(0))), sp(2)),
        ]);
        assert!(run(&f).is_empty());
    }

    #[test]
    fn test_underscore_and_contract_reads_exempt() {
        let f = func(vec![
            BoundStmt::let_("_ignored", int(1), sp(1)),
            BoundStmt::let_("x", int(1), sp(2)),
        ])
        .with_postcondition(BoundExpr::binary(BinaryOp::Ge, x(), int(0), sp(0)));
        assert_eq!(run(&f).count(DiagnosticCode::UnusedVariable), 0);
    }

    #[test]
    fn test_nested_declaration_and_loop_invariant_read() {
        let cond = BoundExpr::var("go", Type::Bool, sp(0));
        let invariant = BoundContract::new(BoundExpr::binary(BinaryOp::Ge, x(), int(0), sp(0)));
        let f = func(vec![
            BoundStmt::let_mut("x", int(0), sp(1)),
            BoundStmt::while_(cond, vec![BoundStmt::let_("inner", int(2), sp(5))], vec![invariant], sp(4)),
        ]);
        let sink = run(&f);
        let unused = sink.with_code(DiagnosticCode::UnusedVariable);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].span, sp(5));
    }

    // ========================================================================
    // Dead stores
    // ========================================================================

    #[test]
    fn test_overwritten_before_read() {
        let f = func(vec![
            BoundStmt::let_mut("x", int(1), sp(1)),
            BoundStmt::assign("x", int(2), sp(2)),
            BoundStmt::ret(Some(x()), sp(3)),
        ]);
        let sink = run(&f);
        let dead = sink.with_code(DiagnosticCode::DeadStore);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].span, sp(1));
    }

    #[test]
    fn test_self_referencing_update_is_a_read() {
        let f = func(vec![
            BoundStmt::let_mut("x", int(1), sp(1)),
            BoundStmt::assign("x", BoundExpr::binary(BinaryOp::Add, x(), int(1), sp(0)), sp(2)),
            BoundStmt::ret(Some(x()), sp(3)),
        ]);
        assert!(run(&f).is_empty());
    }

    #[test]
    fn test_read_in_nested_branch_counts() {
        let cond = BoundExpr::var("c", Type::Bool, sp(0));
        let f = func(vec![
            BoundStmt::let_mut("x", int(1), sp(1)),
            BoundStmt::if_(cond, vec![BoundStmt::ret(Some(x()), sp(6))], None, sp(5)),
            BoundStmt::assign("x", int(2), sp(2)),
            BoundStmt::ret(Some(x()), sp(3)),
        ]);
        assert_eq!(run(&f).count(DiagnosticCode::DeadStore), 0);
    }

    #[test]
    fn test_dead_store_inside_loop_body() {
        let cond = BoundExpr::var("go", Type::Bool, sp(0));
        let body = vec![
            BoundStmt::assign("x", int(1), sp(7)),
            BoundStmt::assign("x", int(2), sp(8)),
        ];
        let f = func(vec![
            BoundStmt::let_mut("x", int(0), sp(1)),
            BoundStmt::while_(cond, body, vec![], sp(4)),
            BoundStmt::ret(Some(x()), sp(3)),
        ]);
        let sink = run(&f);
        let dead = sink.with_code(DiagnosticCode::DeadStore);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].span, sp(7));
    }

    #[test]
    fn test_return_count() {
        let f = func(vec![
            BoundStmt::let_mut("a", int(1), sp(1)),
            BoundStmt::assign("a", int(2), sp(2)),
        ]);
        let sink = DiagnosticSink::new();
        assert_eq!(DataflowAnalyzer::new().analyze(&f, &sink), 2);
        assert_eq!(sink.len(), 2);
    }
}
