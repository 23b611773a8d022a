//! Taint analysis over declared effects
//!
//! Sources and sinks come only from effect annotations: the function's own
//! declared effects decide which source and sink kinds are in play, and a
//! call counts as a sink (or source) through the effects attached to its
//! callee. Ordinary calls are never assumed to do I/O.
//!
//! Propagation is a may-analysis with no kills: once a variable is tainted
//! it stays tainted for the rest of the function. Every productive pass
//! taints at least one more bound name, so the fixed point is reached within
//! one pass per distinct bound name plus a final quiet pass.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::ast::{BoundExpr, BoundFunction, BoundStmt, ExprKind, Span, StmtKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::effects::{TaintSink, TaintSource, get_sinks_from_effects, get_sources_from_effects};
use crate::error::{AnalysisError, Result};

/// Tainted data reaching a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaintVulnerability {
    pub sink: TaintSink,
    pub source: TaintSource,
    pub source_variable: String,
    pub source_span: Span,
    pub sink_expression: String,
    pub sink_span: Span,
    pub code: DiagnosticCode,
}

impl TaintVulnerability {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(
            self.code,
            format!(
                "{} from `{}` (declared at {}) reaches {} sink `{}`",
                self.source, self.source_variable, self.source_span, self.sink, self.sink_expression
            ),
            self.sink_span,
        )
    }
}

/// Where a tainted value came from
#[derive(Debug, Clone)]
struct Origin {
    source: TaintSource,
    variable: String,
    span: Span,
}

enum Taint {
    /// Flows from an already tainted variable
    Inherited(Origin),
    /// Produced directly by a source call
    Fresh(TaintSource, String, Span),
}

impl Taint {
    fn into_origin(self, bound_to: Option<(&str, Span)>) -> Origin {
        match self {
            Taint::Inherited(origin) => origin,
            Taint::Fresh(source, callee, span) => match bound_to {
                Some((name, bind_span)) => Origin {
                    source,
                    variable: name.to_string(),
                    span: bind_span,
                },
                None => Origin {
                    source,
                    variable: callee,
                    span,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaintAnalyzer {
    max_iterations: Option<usize>,
}

impl TaintAnalyzer {
    pub fn new() -> Self {
        Self { max_iterations: None }
    }

    /// Stop propagating after `max_iterations` passes even if the body
    /// would need more
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    fn iteration_limit(&self, function: &BoundFunction) -> usize {
        let mut names = HashSet::new();
        collect_bound_names(&function.body, &mut names);
        let needed = names.len() + 1;
        self.max_iterations.map_or(needed, |cap| cap.min(needed))
    }

    pub fn analyze(&self, function: &BoundFunction) -> Result<Vec<TaintVulnerability>> {
        let sources = get_sources_from_effects(&function.effects);
        let sinks = get_sinks_from_effects(&function.effects);
        let Some(&seed) = sources.first() else {
            return Ok(Vec::new());
        };
        if sinks.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = TaintState::default();
        for param in &function.params {
            state.tainted.insert(
                param.name.clone(),
                Origin {
                    source: seed,
                    variable: param.name.clone(),
                    span: param.span,
                },
            );
        }

        let limit = self.iteration_limit(function);
        let mut converged = false;
        for _ in 0..limit {
            if !state.propagate(&function.body) {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(AnalysisError::fixed_point("taint propagation", limit));
        }

        let mut finder = SinkFinder {
            state: &state,
            declared: &sinks,
            found: Vec::new(),
        };
        finder.stmts(&function.body);
        tracing::debug!(function = %function.name, vulnerabilities = finder.found.len(), "taint analysis done");
        Ok(finder.found)
    }
}

fn collect_bound_names<'a>(stmts: &'a [BoundStmt], names: &mut HashSet<&'a str>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Bind { name, .. } => {
                names.insert(name.as_str());
            }
            StmtKind::For { var, .. } => {
                names.insert(var.as_str());
            }
            _ => {}
        }
        for nested in stmt.nested() {
            collect_bound_names(nested, names);
        }
    }
}

#[derive(Default)]
struct TaintState {
    tainted: HashMap<String, Origin>,
}

impl TaintState {
    /// One pass over the body; returns whether any variable became tainted
    fn propagate(&mut self, stmts: &[BoundStmt]) -> bool {
        let mut changed = false;
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Bind {
                    name, value: Some(value), ..
                } => changed |= self.bind(name, value, stmt.span),
                StmtKind::For { var, start, end, .. } => {
                    changed |= self.bind(var, start, stmt.span);
                    changed |= self.bind(var, end, stmt.span);
                }
                _ => {}
            }
            for nested in stmt.nested() {
                changed |= self.propagate(nested);
            }
        }
        changed
    }

    fn bind(&mut self, name: &str, value: &BoundExpr, span: Span) -> bool {
        if self.tainted.contains_key(name) {
            return false;
        }
        match self.taint_of(value) {
            Some(taint) => {
                let origin = taint.into_origin(Some((name, span)));
                self.tainted.insert(name.to_string(), origin);
                true
            }
            None => false,
        }
    }

    fn taint_of(&self, expr: &BoundExpr) -> Option<Taint> {
        match &expr.kind {
            ExprKind::Var(name) => self.tainted.get(name).cloned().map(Taint::Inherited),
            ExprKind::Call { target, args, effects } => {
                if let Some(&source) = get_sources_from_effects(effects).first() {
                    return Some(Taint::Fresh(source, target.clone(), expr.span));
                }
                args.iter().find_map(|arg| self.taint_of(arg))
            }
            _ => expr.children().into_iter().find_map(|child| self.taint_of(child)),
        }
    }
}

struct SinkFinder<'a> {
    state: &'a TaintState,
    declared: &'a [TaintSink],
    found: Vec<TaintVulnerability>,
}

impl SinkFinder<'_> {
    fn stmts(&mut self, stmts: &[BoundStmt]) {
        for stmt in stmts {
            for expr in stmt.exprs() {
                self.expr(expr);
            }
            for nested in stmt.nested() {
                self.stmts(nested);
            }
        }
    }

    fn expr(&mut self, expr: &BoundExpr) {
        if let ExprKind::Call { args, effects, .. } = &expr.kind {
            self.check_call(expr, args, effects);
        }
        for child in expr.children() {
            self.expr(child);
        }
    }

    fn check_call(&mut self, call: &BoundExpr, args: &[BoundExpr], effects: &[String]) {
        let sinks: Vec<TaintSink> = get_sinks_from_effects(effects)
            .into_iter()
            .filter(|sink| self.declared.contains(sink))
            .collect();
        let Some(&sink) = sinks.first() else {
            return;
        };

        for arg in args {
            let Some(taint) = self.state.taint_of(arg) else {
                continue;
            };
            let origin = taint.into_origin(None);
            let duplicate = self
                .found
                .iter()
                .any(|v| v.sink_span == call.span && v.source_variable == origin.variable);
            if duplicate {
                continue;
            }
            self.found.push(TaintVulnerability {
                sink,
                source: origin.source,
                source_variable: origin.variable,
                source_span: origin.span,
                sink_expression: call.to_string(),
                sink_span: call.span,
                code: sink.code(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Type};

    fn sp(start: usize) -> Span {
        Span::new(start, start + 1)
    }

    fn var(name: &str) -> BoundExpr {
        BoundExpr::var(name, Type::Str, sp(0))
    }

    fn call(target: &str, args: Vec<BoundExpr>, effects: &[&str], at: usize) -> BoundExpr {
        BoundExpr::call(
            target,
            args,
            effects.iter().map(|e| e.to_string()).collect(),
            Type::Unit,
            sp(at),
        )
    }

    fn concat(l: BoundExpr, r: BoundExpr) -> BoundExpr {
        BoundExpr::binary(BinaryOp::Add, l, r, sp(0))
    }

    fn handler(effects: &[&str], body: Vec<BoundStmt>) -> BoundFunction {
        let mut f = BoundFunction::new("handler", sp(0))
            .with_param("input", Type::Str, Span::new(12, 17))
            .with_body(body);
        for effect in effects {
            f = f.with_effect(*effect);
        }
        f
    }

    #[test]
    fn test_parameter_concatenated_into_query() {
        let body = vec![
            BoundStmt::let_("q", concat(BoundExpr::string("SELECT * FROM t WHERE id=", sp(0)), var("input")), sp(30)),
            BoundStmt::call(call("db_exec", vec![var("q")], &["db:w"], 60)),
        ];
        let f = handler(&["net:r", "db:w"], body);
        let vulns = TaintAnalyzer::new().analyze(&f).unwrap();

        assert_eq!(vulns.len(), 1);
        let v = &vulns[0];
        assert_eq!(v.sink, TaintSink::SqlQuery);
        assert_eq!(v.source, TaintSource::NetworkInput);
        assert_eq!(v.code, DiagnosticCode::SqlInjection);
        assert_eq!(v.source_variable, "input");
        assert_eq!(v.source_span, Span::new(12, 17));
        assert_eq!(v.sink_span, sp(60));
        assert_eq!(v.sink_expression, "db_exec(q)");
    }

    #[test]
    fn test_no_declared_source_means_no_findings() {
        let body = vec![BoundStmt::call(call("db_exec", vec![var("input")], &["db:w"], 5))];
        let f = handler(&["db:w"], body);
        assert!(TaintAnalyzer::new().analyze(&f).unwrap().is_empty());
    }

    #[test]
    fn test_no_declared_sink_means_no_findings() {
        let body = vec![BoundStmt::call(call("db_exec", vec![var("input")], &["db:w"], 5))];
        let f = handler(&["net:r"], body);
        assert!(TaintAnalyzer::new().analyze(&f).unwrap().is_empty());
    }

    #[test]
    fn test_undeclared_sink_kind_is_ignored() {
        // The function declares a database sink; a shell call is not in play
        let body = vec![BoundStmt::call(call("run", vec![var("input")], &["shell:w"], 5))];
        let f = handler(&["net:r", "db:w"], body);
        assert!(TaintAnalyzer::new().analyze(&f).unwrap().is_empty());
    }

    #[test]
    fn test_source_call_taints_bound_variable() {
        let mut f = BoundFunction::new("cmd", sp(0)).with_body(vec![
            BoundStmt::let_("line", call("read_line", vec![], &["stdin:r"], 3), sp(2)),
            BoundStmt::call(call("system", vec![var("line")], &["process:w"], 40)),
        ]);
        f = f.with_effect("stdin:r").with_effect("process:w");
        let vulns = TaintAnalyzer::new().analyze(&f).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].source, TaintSource::UserInput);
        assert_eq!(vulns[0].source_variable, "line");
        assert_eq!(vulns[0].code, DiagnosticCode::CommandInjection);
    }

    #[test]
    fn test_propagation_reaches_fixed_point_out_of_order() {
        // Inside a loop, `b` is read before it is assigned from the parameter
        let body = vec![BoundStmt::while_(
            BoundExpr::var("go", Type::Bool, sp(0)),
            vec![
                BoundStmt::assign("c", var("b"), sp(1)),
                BoundStmt::assign("b", var("input"), sp(2)),
                BoundStmt::call(call("render", vec![var("c")], &["html:w"], 90)),
            ],
            vec![],
            sp(0),
        )];
        let f = handler(&["net:r", "html:w"], body);
        let vulns = TaintAnalyzer::new().analyze(&f).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].code, DiagnosticCode::CrossSiteScripting);
        assert_eq!(vulns[0].source_variable, "input");

        let err = TaintAnalyzer::new().with_max_iterations(1).analyze(&f).unwrap_err();
        assert!(matches!(err, AnalysisError::FixedPointNotReached { .. }));
    }

    #[test]
    fn test_long_reversed_chain_still_converges() {
        // `v150 = v149; ...; v1 = v0; v0 = input` taints one link per pass
        let names: Vec<String> = (0..=150).map(|n| format!("v{n}")).collect();
        let mut body: Vec<BoundStmt> = names
            .windows(2)
            .rev()
            .map(|pair| BoundStmt::assign(pair[1].as_str(), var(&pair[0]), sp(1)))
            .collect();
        body.push(BoundStmt::assign("v0", var("input"), sp(2)));
        let f = handler(
            &["db:w", "net:r"],
            vec![
                BoundStmt::while_(BoundExpr::var("go", Type::Bool, sp(0)), body, vec![], sp(0)),
                BoundStmt::call(call("db_exec", vec![var("v150")], &["db:w"], 99)),
            ],
        );

        let vulns = TaintAnalyzer::new().analyze(&f).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].code, DiagnosticCode::SqlInjection);
        assert_eq!(vulns[0].source_variable, "input");
        assert_eq!(vulns[0].sink_span, sp(99));

        // An explicit cap below the chain length still gives up
        let err = TaintAnalyzer::new().with_max_iterations(100).analyze(&f).unwrap_err();
        assert!(matches!(err, AnalysisError::FixedPointNotReached { iterations: 100, .. }));
    }

    #[test]
    fn test_duplicate_pairs_reported_once() {
        // Same tainted variable passed twice into one sink call
        let body = vec![BoundStmt::call(call("db_exec", vec![var("input"), var("input")], &["db:w"], 7))];
        let f = handler(&["net:r", "db:w"], body);
        assert_eq!(TaintAnalyzer::new().analyze(&f).unwrap().len(), 1);
    }

    #[test]
    fn test_pure_arithmetic_has_no_findings() {
        let x = BoundExpr::var("x", Type::Int, sp(0));
        let body = vec![BoundStmt::ret(
            Some(BoundExpr::binary(BinaryOp::Mul, x.clone(), BoundExpr::binary(BinaryOp::Add, x, BoundExpr::int(1, sp(0)), sp(0)), sp(0))),
            sp(0),
        )];
        let f = BoundFunction::new("sq", sp(0)).with_param("x", Type::Int, sp(0)).with_body(body);
        assert!(TaintAnalyzer::new().analyze(&f).unwrap().is_empty());
    }

    #[test]
    fn test_vulnerability_diagnostic() {
        let v = TaintVulnerability {
            sink: TaintSink::FilePath,
            source: TaintSource::UserInput,
            source_variable: "name".to_string(),
            source_span: Span::new(1, 5),
            sink_expression: "open(name)".to_string(),
            sink_span: Span::new(20, 30),
            code: DiagnosticCode::PathTraversal,
        };
        let d = v.to_diagnostic();
        assert_eq!(d.code, DiagnosticCode::PathTraversal);
        assert_eq!(d.span, Span::new(20, 30));
        assert!(d.message.contains("`name`"));
    }
}
