//! Error types and reporting

use crate::ast::Span;
use crate::diagnostics::{Diagnostic, Severity};
use thiserror::Error;

/// Result type alias for per-function analyses
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// A fault while analyzing one function.
///
/// Proof obligations are never errors; they are diagnostics. These only
/// describe an analysis that could not run to completion.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{analysis} did not reach a fixed point after {iterations} iterations")]
    FixedPointNotReached {
        analysis: &'static str,
        iterations: usize,
    },

    #[error("unsupported construct at {span}: {message}")]
    Unsupported { message: String, span: Span },

    #[error(transparent)]
    Smt(#[from] SmtError),
}

impl AnalysisError {
    pub fn fixed_point(analysis: &'static str, iterations: usize) -> Self {
        Self::FixedPointNotReached { analysis, iterations }
    }

    pub fn unsupported(message: impl Into<String>, span: Span) -> Self {
        Self::Unsupported {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Unsupported { span, .. } => Some(*span),
            Self::Smt(err) => err.span(),
            Self::FixedPointNotReached { .. } => None,
        }
    }
}

/// Failure to translate a query or talk to the solver.
///
/// Callers degrade to "not proven"; these are only logged.
#[derive(Debug, Error)]
pub enum SmtError {
    #[error("cannot encode expression at {span} in QF_LIA: {message}")]
    Unsupported { message: String, span: Span },

    #[error("solver I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected solver output: {0}")]
    Output(String),
}

impl SmtError {
    pub fn unsupported(message: impl Into<String>, span: Span) -> Self {
        Self::Unsupported {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Unsupported { span, .. } => Some(*span),
            Self::Io(_) | Self::Output(_) => None,
        }
    }
}

/// Error loading `VerificationOptions`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown preset '{0}' (expected fast, default or thorough)")]
    UnknownPreset(String),
}

fn report_kind(severity: Severity) -> ariadne::ReportKind<'static> {
    use ariadne::ReportKind;

    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    }
}

fn build_report<'a>(
    filename: &'a str,
    diagnostic: &Diagnostic,
    color: bool,
) -> ariadne::Report<'static, (&'a str, std::ops::Range<usize>)> {
    use ariadne::{Color, Config, Label, Report};

    let label_color = match diagnostic.severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Info => Color::Blue,
    };
    let range = diagnostic.span.start..diagnostic.span.end;

    Report::build(report_kind(diagnostic.severity), (filename, range.clone()))
        .with_code(diagnostic.code.id())
        .with_message(diagnostic.code.name())
        .with_label(
            Label::new((filename, range))
                .with_message(&diagnostic.message)
                .with_color(label_color),
        )
        .with_config(Config::default().with_color(color))
        .finish()
}

/// Print a diagnostic against its source text with ariadne
pub fn report_diagnostic(filename: &str, source: &str, diagnostic: &Diagnostic) -> std::io::Result<()> {
    use ariadne::Source;

    build_report(filename, diagnostic, true).eprint((filename, Source::from(source)))
}

/// Render a diagnostic to a plain (uncolored) string
pub fn render_diagnostic(filename: &str, source: &str, diagnostic: &Diagnostic) -> std::io::Result<String> {
    use ariadne::Source;

    let mut out = Vec::new();
    build_report(filename, diagnostic, false).write((filename, Source::from(source)), &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;

    #[test]
    fn test_render_diagnostic_includes_code_and_message() {
        let source = "fn f(x: i64, y: i64) -> i64 = x / y;";
        let diagnostic = Diagnostic::new(
            DiagnosticCode::DivisionByZero,
            Severity::Warning,
            "possible division by zero: divisor 'y' is not proven nonzero",
            Span::new(30, 35),
        );
        let rendered = render_diagnostic("f.bmb", source, &diagnostic).unwrap();
        assert!(rendered.contains("CA0001"));
        assert!(rendered.contains("division-by-zero"));
        assert!(rendered.contains("divisor 'y'"));
    }

    #[test]
    fn test_error_messages() {
        let err = AnalysisError::fixed_point("taint", 100);
        assert_eq!(err.to_string(), "taint did not reach a fixed point after 100 iterations");
        assert!(err.span().is_none());

        let err: AnalysisError = SmtError::unsupported("float literal", Span::new(1, 4)).into();
        assert_eq!(err.span(), Some(Span::new(1, 4)));

        let err = ConfigError::UnknownPreset("turbo".to_string());
        assert!(err.to_string().contains("turbo"));
    }
}
