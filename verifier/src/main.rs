//! Contract Analyzer CLI
//!
//! Debug driver over bound modules serialized as JSON.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use contract_analyzer::effects::parse_effect;
use contract_analyzer::error::report_diagnostic;
use contract_analyzer::{
    BoundModule, ContractSimplificationPass, Diagnostic, DiagnosticSink, Severity, VerificationAnalysisPass,
    VerificationOptions,
};

#[derive(Parser)]
#[command(name = "contract-analyzer", version, about = "Contract analysis and verification backend")]
struct Cli {
    /// Log more (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Fast,
    Default,
    Thorough,
}

#[derive(Subcommand)]
enum Command {
    /// Simplify contracts and run the verification analyses
    Analyze {
        /// Bound module (JSON)
        module: PathBuf,
        /// Analysis profile
        #[arg(long, value_enum, default_value = "default")]
        profile: Profile,
        /// TOML options file (overrides --profile)
        #[arg(long)]
        config: Option<PathBuf>,
        /// z3 binary to use
        #[arg(long)]
        z3: Option<String>,
        /// Source text the spans refer to, for annotated reports
        #[arg(long)]
        source: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Simplify contracts and print the rewritten module
    Simplify {
        /// Bound module (JSON)
        module: PathBuf,
    },
    /// Show how effect strings map to taint sources and sinks
    Effects {
        /// Effect strings, e.g. `db:w` or `io:network_read`
        #[arg(required = true)]
        effects: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Analyze {
            module,
            profile,
            config,
            z3,
            source,
            json,
        } => analyze_module(&module, profile, config.as_deref(), z3, source.as_deref(), json),
        Command::Simplify { module } => simplify_module(&module),
        Command::Effects { effects } => {
            show_effects(&effects);
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn load_module(path: &Path) -> Result<Rc<BoundModule>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let module: BoundModule = serde_json::from_str(&text)?;
    Ok(Rc::new(module))
}

/// Returns `Ok(false)` when an error-severity diagnostic was reported
fn analyze_module(
    path: &Path,
    profile: Profile,
    config: Option<&Path>,
    z3: Option<String>,
    source: Option<&Path>,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let module = load_module(path)?;

    let mut options = match config {
        Some(config) => VerificationOptions::from_file(config)?,
        None => match profile {
            Profile::Fast => VerificationOptions::fast(),
            Profile::Default => VerificationOptions::default(),
            Profile::Thorough => VerificationOptions::thorough(),
        },
    };
    if let Some(z3) = z3 {
        options = options.with_z3_path(z3);
    }

    let sink = DiagnosticSink::new();
    let simplified = ContractSimplificationPass::new(sink.clone())
        .with_max_iterations(options.simplifier_max_iterations)
        .simplify(&module);
    let result = VerificationAnalysisPass::new(sink.clone()).analyze(&simplified, &options);
    let diagnostics = sink.snapshot();

    if json {
        let report = serde_json::json!({
            "module": simplified.name,
            "result": result,
            "diagnostics": diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_diagnostics(&diagnostics, source)?;
        println!(
            "{} function(s) analyzed in {:?}: {} dataflow, {} bug pattern(s), {} taint, {} invariant(s) proven",
            result.functions_analyzed,
            result.duration,
            result.dataflow_issues,
            result.bug_patterns_found,
            result.taint_vulnerabilities,
            result.loop_invariants_synthesized,
        );
    }

    Ok(!diagnostics.iter().any(|d| d.severity == Severity::Error))
}

fn print_diagnostics(diagnostics: &[Diagnostic], source: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match source {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let filename = path.display().to_string();
            for diagnostic in diagnostics {
                report_diagnostic(&filename, &text, diagnostic)?;
            }
        }
        None => {
            for diagnostic in diagnostics {
                eprintln!("{diagnostic}");
            }
        }
    }
    Ok(())
}

fn simplify_module(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let module = load_module(path)?;
    let sink = DiagnosticSink::new();
    let simplified = ContractSimplificationPass::new(sink.clone()).simplify(&module);

    for diagnostic in sink.snapshot() {
        eprintln!("{diagnostic}");
    }
    if Rc::ptr_eq(&module, &simplified) {
        eprintln!("no contract changed");
    }
    println!("{}", serde_json::to_string_pretty(simplified.as_ref())?);
    Ok(true)
}

fn show_effects(effects: &[String]) {
    for effect in effects {
        match parse_effect(effect) {
            Some(declaration) => {
                let sink = declaration.sink().map_or("-".to_string(), |s| s.to_string());
                let source = declaration.source().map_or("-".to_string(), |s| s.to_string());
                println!("{effect}: {declaration} (sink: {sink}, source: {source})");
            }
            None => println!("{effect}: not a valid effect"),
        }
    }
}
