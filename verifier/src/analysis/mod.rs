//! Verification analysis pass
//!
//! Runs the enabled analyses over every function of a bound module, in
//! declaration order. Findings go to the diagnostic sink handed over at
//! construction; the pass itself only returns counts.
//!
//! The solver is probed once per [`VerificationAnalysisPass::analyze`]
//! call. If it is missing, solver-backed steps fall back to their plain
//! behavior: division warnings stay, k-induction is skipped.

mod invariants;
mod options;

pub use options::VerificationOptions;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::{BoundFunction, BoundModule};
use crate::bugs::{BugPatternChecker, DivisionByZeroChecker};
use crate::dataflow::DataflowAnalyzer;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::error::Result;
use crate::kinduction::KInductionEngine;
use crate::smt::{SmtSession, SmtSolver, Z3Solver};
use crate::taint::TaintAnalyzer;

use invariants::InvariantChecker;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationAnalysisResult {
    pub functions_analyzed: usize,
    pub dataflow_issues: usize,
    pub bug_patterns_found: usize,
    pub taint_vulnerabilities: usize,
    pub loop_invariants_synthesized: usize,
    pub duration: Duration,
}

impl VerificationAnalysisResult {
    pub fn total_findings(&self) -> usize {
        self.dataflow_issues + self.bug_patterns_found + self.taint_vulnerabilities
    }
}

/// Solver-backed helpers for one `analyze` call; `None` where the solver
/// is disabled or unavailable
struct SolverContext<'s> {
    session: Option<SmtSession<'s>>,
    engine: Option<KInductionEngine<'s>>,
}

pub struct VerificationAnalysisPass {
    sink: DiagnosticSink,
    solver: Option<Box<dyn SmtSolver>>,
}

impl VerificationAnalysisPass {
    pub fn new(sink: DiagnosticSink) -> Self {
        Self { sink, solver: None }
    }

    /// Use this solver instead of running z3 from PATH (or `z3_path`)
    pub fn with_solver(mut self, solver: Box<dyn SmtSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn analyze(&self, module: &BoundModule, options: &VerificationOptions) -> VerificationAnalysisResult {
        let started = Instant::now();

        let fallback;
        let solver: Option<&dyn SmtSolver> = match &self.solver {
            Some(solver) => Some(solver.as_ref()),
            None if options.needs_solver() => {
                fallback = match &options.z3_path {
                    Some(path) => Z3Solver::new().with_path(path.as_str()),
                    None => Z3Solver::new(),
                };
                Some(&fallback)
            }
            None => None,
        };
        let solver = solver.filter(|s| options.needs_solver() && s.is_available());
        if options.needs_solver() && solver.is_none() {
            tracing::info!("smt solver unavailable, continuing without it");
        }

        let context = SolverContext {
            session: solver
                .filter(|_| options.use_z3_verification)
                .map(|s| SmtSession::new(s, options.z3_timeout_ms)),
            engine: solver
                .filter(|_| options.enable_k_induction)
                .map(|s| KInductionEngine::new(s, options.z3_timeout_ms).with_max_k(options.max_k)),
        };

        let mut result = VerificationAnalysisResult::default();
        for function in &module.functions {
            result.functions_analyzed += 1;
            if function.is_empty() {
                continue;
            }
            if let Err(err) = self.analyze_function(function, options, &context, &mut result) {
                tracing::warn!(function = %function.name, error = %err, "analysis failed");
                self.sink.report(Diagnostic::warning(
                    DiagnosticCode::AnalysisFailed,
                    format!("analysis of `{}` stopped early: {err}", function.name),
                    err.span().unwrap_or(function.span),
                ));
            }
        }

        result.duration = started.elapsed();
        tracing::info!(
            module = %module.name,
            functions = result.functions_analyzed,
            findings = result.total_findings(),
            invariants = result.loop_invariants_synthesized,
            "verification analysis done"
        );
        result
    }

    fn analyze_function(
        &self,
        function: &BoundFunction,
        options: &VerificationOptions,
        context: &SolverContext<'_>,
        result: &mut VerificationAnalysisResult,
    ) -> Result<()> {
        let _span = tracing::debug_span!("function", name = %function.name).entered();

        if options.enable_dataflow {
            result.dataflow_issues += DataflowAnalyzer::new().analyze(function, &self.sink);
        }

        if options.enable_bug_patterns {
            let checkers: Vec<Box<dyn BugPatternChecker + '_>> = vec![Box::new(
                DivisionByZeroChecker::new()
                    .with_session(context.session.as_ref())
                    .with_max_iterations(options.simplifier_max_iterations),
            )];
            for checker in &checkers {
                let found = checker.check(function, &self.sink);
                tracing::debug!(checker = checker.name(), found, "bug pattern check");
                result.bug_patterns_found += found;
            }
        }

        if options.enable_taint_analysis {
            let mut analyzer = TaintAnalyzer::new();
            if let Some(cap) = options.taint_max_iterations {
                analyzer = analyzer.with_max_iterations(cap);
            }
            let vulnerabilities = analyzer.analyze(function)?;
            for vulnerability in &vulnerabilities {
                self.sink.report(vulnerability.to_diagnostic());
            }
            result.taint_vulnerabilities += vulnerabilities.len();
        }

        if let Some(engine) = &context.engine {
            result.loop_invariants_synthesized += InvariantChecker::new(engine, &self.sink).check(&function.body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BoundExpr, BoundStmt, Span, Type};
    use crate::smt::testing::ScriptedSolver;
    use crate::smt::{NullSolver, SatResult};

    fn sp(n: usize) -> Span {
        Span::new(n, n + 1)
    }

    fn int(n: i64) -> BoundExpr {
        BoundExpr::int(n, sp(0))
    }

    fn var(name: &str) -> BoundExpr {
        BoundExpr::var(name, Type::Int, sp(0))
    }

    /// `fn div(x, y) { return x / y }` guarded by `requires y != 0`
    fn guarded_division() -> BoundFunction {
        BoundFunction::new("div", sp(0))
            .with_param("x", Type::Int, sp(1))
            .with_param("y", Type::Int, sp(2))
            .with_precondition(BoundExpr::binary(BinaryOp::Ne, var("y"), int(0), sp(0)))
            .with_body(vec![BoundStmt::ret(
                Some(BoundExpr::binary(BinaryOp::Div, var("x"), var("y"), sp(7))),
                sp(6),
            )])
    }

    fn counting() -> BoundFunction {
        BoundFunction::new("count", sp(0)).with_body(vec![
            BoundStmt::let_mut("i", int(0), sp(1)),
            BoundStmt::while_(
                BoundExpr::binary(BinaryOp::Lt, var("i"), int(10), sp(0)),
                vec![BoundStmt::assign(
                    "i",
                    BoundExpr::binary(BinaryOp::Add, var("i"), int(1), sp(0)),
                    sp(3),
                )],
                vec![],
                sp(2),
            ),
            BoundStmt::ret(Some(var("i")), sp(4)),
        ])
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    #[test]
    fn test_empty_module_and_empty_function() {
        let sink = DiagnosticSink::new();
        let pass = VerificationAnalysisPass::new(sink.clone()).with_solver(Box::new(NullSolver));
        let module = BoundModule::new("m", vec![BoundFunction::new("nothing", sp(0))]);
        let result = pass.analyze(&module, &VerificationOptions::thorough());
        assert_eq!(result.functions_analyzed, 1);
        assert_eq!(result.total_findings(), 0);
        assert_eq!(result.loop_invariants_synthesized, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_disabled_analyses_do_not_run() {
        let sink = DiagnosticSink::new();
        let options = VerificationOptions::fast()
            .with_dataflow(false)
            .with_bug_patterns(false)
            .with_taint_analysis(false);
        let module = BoundModule::new("m", vec![guarded_division()]);
        let result = VerificationAnalysisPass::new(sink.clone()).analyze(&module, &options);
        assert_eq!(result.functions_analyzed, 1);
        assert_eq!(result.total_findings(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_fast_profile_never_queries_solver() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![guarded_division()]);
        let result = VerificationAnalysisPass::new(sink.clone())
            .with_solver(Box::new(ScriptedSolver::always(SatResult::Unsat)))
            .analyze(&module, &VerificationOptions::fast());
        // Without the solver the guarded division still warns
        assert_eq!(result.bug_patterns_found, 1);
        assert_eq!(sink.count(DiagnosticCode::DivisionByZero), 1);
    }

    #[test]
    fn test_default_profile_discharges_with_solver() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![guarded_division()]);
        let result = VerificationAnalysisPass::new(sink.clone())
            .with_solver(Box::new(ScriptedSolver::always(SatResult::Unsat)))
            .analyze(&module, &VerificationOptions::default());
        assert_eq!(result.bug_patterns_found, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unavailable_solver_degrades() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![guarded_division(), counting()]);
        let result = VerificationAnalysisPass::new(sink.clone())
            .with_solver(Box::new(NullSolver))
            .analyze(&module, &VerificationOptions::thorough());
        assert_eq!(result.functions_analyzed, 2);
        assert_eq!(result.bug_patterns_found, 1);
        assert_eq!(result.loop_invariants_synthesized, 0);
    }

    // ========================================================================
    // K-induction
    // ========================================================================

    #[test]
    fn test_thorough_synthesizes_invariants() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![counting()]);
        let result = VerificationAnalysisPass::new(sink.clone())
            .with_solver(Box::new(ScriptedSolver::always(SatResult::Unsat)))
            .analyze(&module, &VerificationOptions::thorough());
        assert_eq!(result.loop_invariants_synthesized, 1);
        assert_eq!(sink.count(DiagnosticCode::InvariantSynthesized), 1);
    }

    #[test]
    fn test_default_profile_skips_k_induction() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![counting()]);
        let result = VerificationAnalysisPass::new(sink.clone())
            .with_solver(Box::new(ScriptedSolver::always(SatResult::Unsat)))
            .analyze(&module, &VerificationOptions::default());
        assert_eq!(result.loop_invariants_synthesized, 0);
    }

    // ========================================================================
    // Failures
    // ========================================================================

    /// `while go { v150 = v149; ...; v1 = v0; v0 = input }; db_exec(v150)`
    fn reversed_chain() -> BoundFunction {
        let names: Vec<String> = (0..=150).map(|n| format!("v{n}")).collect();
        let mut body = Vec::new();
        for pair in names.windows(2).rev() {
            body.push(BoundStmt::assign(pair[1].as_str(), BoundExpr::var(pair[0].as_str(), Type::Str, sp(0)), sp(0)));
        }
        body.push(BoundStmt::assign("v0", BoundExpr::var("input", Type::Str, sp(0)), sp(0)));
        let go = BoundExpr::var("go", Type::Bool, sp(0));
        let exec = BoundExpr::call(
            "db_exec",
            vec![BoundExpr::var("v150", Type::Str, sp(0))],
            vec!["db:w".to_string()],
            Type::Unit,
            sp(43),
        );
        BoundFunction::new("chain", sp(40))
            .with_param("input", Type::Str, sp(41))
            .with_effect("db:w")
            .with_effect("net:r")
            .with_body(vec![BoundStmt::while_(go, body, vec![], sp(42)), BoundStmt::call(exec)])
    }

    #[test]
    fn test_long_taint_chain_is_reported() {
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![reversed_chain()]);
        let result = VerificationAnalysisPass::new(sink.clone()).analyze(&module, &VerificationOptions::fast());

        assert_eq!(result.taint_vulnerabilities, 1);
        assert_eq!(sink.count(DiagnosticCode::AnalysisFailed), 0);
        let sql = sink.with_code(DiagnosticCode::SqlInjection);
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].span, sp(43));
    }

    #[test]
    fn test_failing_function_is_reported_and_pass_continues() {
        // A taint cap below the chain length stops propagation early
        let sink = DiagnosticSink::new();
        let module = BoundModule::new("m", vec![reversed_chain(), guarded_division()]);
        let options = VerificationOptions::fast().with_taint_max_iterations(100);
        let result = VerificationAnalysisPass::new(sink.clone()).analyze(&module, &options);

        assert_eq!(result.functions_analyzed, 2);
        assert_eq!(result.taint_vulnerabilities, 0);
        let failed = sink.with_code(DiagnosticCode::AnalysisFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].span, sp(40));
        // The next function was still analyzed
        assert_eq!(sink.count(DiagnosticCode::DivisionByZero), 1);
    }
}
