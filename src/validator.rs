//! Pre-flight static checks.
//!
//! Runs before any workspace or process exists, so rejected submissions cost
//! nothing but a scan of the source text.

mod clike;
mod python;

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::Limits;
use crate::language::{LanguageProfile, SyntaxRules};
use crate::workspace::extract_public_type;

use clike::Dialect;

/// Result of validating one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ValidationOutcome {
    fn default() -> Self {
        Self {
            is_valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ValidationOutcome {
    fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate `source` against the rules of `profile`.
pub fn validate(source: &str, profile: &LanguageProfile, limits: &Limits) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    if source.trim().is_empty() {
        outcome.error("Code cannot be empty");
        return outcome;
    }

    if source.len() > limits.max_source_bytes {
        outcome.error(format!(
            "Code is too large: {} bytes (limit {})",
            source.len(),
            limits.max_source_bytes
        ));
        return outcome;
    }

    if source.chars().count() > limits.size_warning_chars {
        outcome.warn("Code is quite long, execution might be slow");
    }

    match profile.syntax {
        SyntaxRules::Python => validate_python(source, &mut outcome),
        SyntaxRules::JavaScript => validate_javascript(source, &mut outcome),
        SyntaxRules::Cpp => validate_cpp(source, &mut outcome),
        SyntaxRules::Java => validate_java(source, &mut outcome),
        SyntaxRules::CSharp => validate_csharp(source, &mut outcome),
        SyntaxRules::Plain => {}
    }

    debug!(
        language = %profile.id,
        valid = outcome.is_valid,
        errors = outcome.errors.len(),
        warnings = outcome.warnings.len(),
        "Validated submission"
    );
    outcome
}

const PYTHON_SENSITIVE_MODULES: &[&str] = &["os", "subprocess", "sys", "shutil"];

fn validate_python(source: &str, outcome: &mut ValidationOutcome) {
    if let Err(message) = python::check_syntax(source) {
        outcome.error(format!("Syntax error: {message}"));
        return;
    }

    let imported = python::imported_modules(source);
    for module in PYTHON_SENSITIVE_MODULES {
        if imported.contains(*module) {
            outcome.warn(format!(
                "Code contains potentially dangerous module: {module}"
            ));
        }
    }
}

/// Shared front half of the C-like validators: lex, then check balance.
/// Returns the source with comments and literals blanked out, or `None`
/// after recording a syntax error.
fn scan_clike(source: &str, dialect: Dialect, outcome: &mut ValidationOutcome) -> Option<String> {
    let scan = clike::scan(source, dialect);
    if let Some(message) = scan.error.or_else(|| clike::check_balance(&scan.code)) {
        outcome.error(format!("Syntax error: {message}"));
        return None;
    }
    Some(scan.code)
}

fn validate_javascript(source: &str, outcome: &mut ValidationOutcome) {
    static REQUIRE: OnceLock<Regex> = OnceLock::new();

    if scan_clike(source, Dialect::JavaScript, outcome).is_none() {
        return;
    }

    let pattern = REQUIRE.get_or_init(|| {
        Regex::new(
            r#"(?:require\s*\(\s*|\bfrom\s+|\bimport\s+)['"](?:node:)?(fs|child_process)(?:/[\w]+)?['"]"#,
        )
        .expect("require pattern is valid")
    });
    let mut seen = Vec::new();
    for caps in pattern.captures_iter(source) {
        let module = &caps[1];
        if !seen.iter().any(|m| m == module) {
            outcome.warn(format!(
                "Code contains potentially dangerous module: {module}"
            ));
            seen.push(module.to_owned());
        }
    }
}

const CPP_SENSITIVE_HEADERS: &[&str] = &["<fstream>", "<filesystem>", "<unistd.h>"];

fn validate_cpp(source: &str, outcome: &mut ValidationOutcome) {
    static MAIN: OnceLock<Regex> = OnceLock::new();
    static INCLUDE: OnceLock<Regex> = OnceLock::new();

    let Some(code) = scan_clike(source, Dialect::Cpp, outcome) else {
        return;
    };

    let main = MAIN.get_or_init(|| Regex::new(r"\bmain\s*\(").expect("main pattern is valid"));
    if !main.is_match(&code) {
        outcome.error("C++ code must contain a main function");
    }

    // Header names are string-like, so match them against the raw source.
    let include = INCLUDE.get_or_init(|| {
        Regex::new(r"(?m)^\s*#\s*include\s*(<[^>]+>)").expect("include pattern is valid")
    });
    for caps in include.captures_iter(source) {
        let header = &caps[1];
        if CPP_SENSITIVE_HEADERS.contains(&header) {
            outcome.warn(format!(
                "Code contains potentially dangerous header: {header}"
            ));
        }
    }
}

const JAVA_SENSITIVE_APIS: &[&str] = &[
    "java.io.File",
    "java.nio.file",
    "ProcessBuilder",
    "Runtime.getRuntime",
];

fn validate_java(source: &str, outcome: &mut ValidationOutcome) {
    static MAIN: OnceLock<Regex> = OnceLock::new();

    let Some(code) = scan_clike(source, Dialect::Java, outcome) else {
        return;
    };

    if extract_public_type(&code).is_none() {
        outcome.error("Java code must contain a public class");
    }

    let main = MAIN.get_or_init(|| {
        Regex::new(r"\b(?:public\s+static|static\s+public)\s+(?:final\s+)?void\s+main\s*\(")
            .expect("main pattern is valid")
    });
    if !main.is_match(&code) {
        outcome.error("Java code must contain a main method");
    }

    for api in JAVA_SENSITIVE_APIS {
        if code.contains(api) {
            outcome.warn(format!("Code uses potentially dangerous API: {api}"));
        }
    }
}

const CSHARP_SENSITIVE_NAMESPACES: &[&str] = &["System.IO", "System.Diagnostics"];

fn validate_csharp(source: &str, outcome: &mut ValidationOutcome) {
    static TYPE: OnceLock<Regex> = OnceLock::new();
    static MAIN: OnceLock<Regex> = OnceLock::new();

    let Some(code) = scan_clike(source, Dialect::CSharp, outcome) else {
        return;
    };

    let type_decl = TYPE.get_or_init(|| {
        Regex::new(r"\b(?:class|struct|record)\s+[A-Za-z_]\w*").expect("type pattern is valid")
    });
    if !type_decl.is_match(&code) {
        outcome.error("C# code must contain a class declaration");
    }

    let main = MAIN.get_or_init(|| {
        Regex::new(r"\bstatic\s+(?:async\s+)?(?:void|int|Task(?:\s*<\s*int\s*>)?)\s+Main\s*\(")
            .expect("main pattern is valid")
    });
    if !main.is_match(&code) {
        outcome.error("C# code must contain a static Main method");
    }

    for namespace in CSHARP_SENSITIVE_NAMESPACES {
        if code.contains(namespace) {
            outcome.warn(format!(
                "Code contains potentially dangerous namespace: {namespace}"
            ));
        }
    }
}
