//! Verification options and presets

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kinduction::DEFAULT_MAX_K;
use crate::simplify::DEFAULT_MAX_ITERATIONS;
use crate::smt::DEFAULT_TIMEOUT_MS;

/// Which analyses run and how the solver is used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOptions {
    pub enable_dataflow: bool,
    pub enable_bug_patterns: bool,
    pub enable_taint_analysis: bool,
    pub enable_k_induction: bool,
    /// Use the solver to discharge bug-pattern warnings
    pub use_z3_verification: bool,
    /// Per-query solver timeout
    pub z3_timeout_ms: u64,
    pub max_k: usize,
    pub simplifier_max_iterations: usize,
    /// Upper limit on taint propagation passes; unset means as many as the
    /// function's bound names require
    pub taint_max_iterations: Option<usize>,
    /// z3 binary to run instead of the one on PATH
    pub z3_path: Option<String>,
}

impl Default for VerificationOptions {
    /// Fast checks plus solver discharge of bug patterns; no k-induction
    fn default() -> Self {
        Self {
            use_z3_verification: true,
            ..Self::fast()
        }
    }
}

impl VerificationOptions {
    /// Syntactic checks only, no solver
    pub fn fast() -> Self {
        Self {
            enable_dataflow: true,
            enable_bug_patterns: true,
            enable_taint_analysis: true,
            enable_k_induction: false,
            use_z3_verification: false,
            z3_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_k: DEFAULT_MAX_K,
            simplifier_max_iterations: DEFAULT_MAX_ITERATIONS,
            taint_max_iterations: None,
            z3_path: None,
        }
    }

    /// Everything on
    pub fn thorough() -> Self {
        Self {
            enable_k_induction: true,
            use_z3_verification: true,
            ..Self::fast()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::fast()),
            "default" => Ok(Self::default()),
            "thorough" => Ok(Self::thorough()),
            _ => Err(ConfigError::UnknownPreset(name.to_string())),
        }
    }

    /// Whether any enabled analysis wants the solver
    pub fn needs_solver(&self) -> bool {
        self.use_z3_verification || self.enable_k_induction
    }

    /// Parse a TOML config: an optional `preset` plus field overrides.
    ///
    /// ```toml
    /// preset = "thorough"
    /// z3_timeout_ms = 2000
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: OptionsFile = toml::from_str(text)?;
        let base = match file.preset.as_deref() {
            Some(name) => Self::preset(name)?,
            None => Self::default(),
        };
        Ok(file.apply(base))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_dataflow(mut self, enabled: bool) -> Self {
        self.enable_dataflow = enabled;
        self
    }

    pub fn with_bug_patterns(mut self, enabled: bool) -> Self {
        self.enable_bug_patterns = enabled;
        self
    }

    pub fn with_taint_analysis(mut self, enabled: bool) -> Self {
        self.enable_taint_analysis = enabled;
        self
    }

    pub fn with_k_induction(mut self, enabled: bool) -> Self {
        self.enable_k_induction = enabled;
        self
    }

    pub fn with_z3_verification(mut self, enabled: bool) -> Self {
        self.use_z3_verification = enabled;
        self
    }

    pub fn with_z3_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.z3_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k;
        self
    }

    pub fn with_simplifier_max_iterations(mut self, max_iterations: usize) -> Self {
        self.simplifier_max_iterations = max_iterations;
        self
    }

    pub fn with_taint_max_iterations(mut self, max_iterations: usize) -> Self {
        self.taint_max_iterations = Some(max_iterations);
        self
    }

    pub fn with_z3_path(mut self, path: impl Into<String>) -> Self {
        self.z3_path = Some(path.into());
        self
    }
}

/// On-disk form: every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    preset: Option<String>,
    enable_dataflow: Option<bool>,
    enable_bug_patterns: Option<bool>,
    enable_taint_analysis: Option<bool>,
    enable_k_induction: Option<bool>,
    use_z3_verification: Option<bool>,
    z3_timeout_ms: Option<u64>,
    max_k: Option<usize>,
    simplifier_max_iterations: Option<usize>,
    taint_max_iterations: Option<usize>,
    z3_path: Option<String>,
}

impl OptionsFile {
    fn apply(self, mut options: VerificationOptions) -> VerificationOptions {
        if let Some(v) = self.enable_dataflow {
            options.enable_dataflow = v;
        }
        if let Some(v) = self.enable_bug_patterns {
            options.enable_bug_patterns = v;
        }
        if let Some(v) = self.enable_taint_analysis {
            options.enable_taint_analysis = v;
        }
        if let Some(v) = self.enable_k_induction {
            options.enable_k_induction = v;
        }
        if let Some(v) = self.use_z3_verification {
            options.use_z3_verification = v;
        }
        if let Some(v) = self.z3_timeout_ms {
            options.z3_timeout_ms = v;
        }
        if let Some(v) = self.max_k {
            options.max_k = v;
        }
        if let Some(v) = self.simplifier_max_iterations {
            options.simplifier_max_iterations = v;
        }
        if self.taint_max_iterations.is_some() {
            options.taint_max_iterations = self.taint_max_iterations;
        }
        if self.z3_path.is_some() {
            options.z3_path = self.z3_path;
        }
        options
    }
}
