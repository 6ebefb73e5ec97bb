//! Language registry: toolchain profiles keyed by language id.
//!
//! The built-in table covers the tutorial languages. Config can replace
//! individual fields of a built-in profile or add new languages; the merged
//! registry is read-only for the rest of the process.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SandboxError;

/// How the workspace names the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStemPolicy {
    /// Fixed generated stem (`main`).
    Generated,
    /// Stem must match the public type declared in the source (Java).
    DeclaredType,
}

/// Which pre-flight checks the validator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxRules {
    Python,
    JavaScript,
    Cpp,
    Java,
    CSharp,
    /// Only the language-independent checks.
    Plain,
}

/// Values substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    /// Absolute path of the source file.
    pub source: &'a Path,
    /// Workspace directory.
    pub dir: &'a Path,
    /// Program name: the file stem, also the Java class name.
    pub stem: &'a str,
}

impl TemplateVars<'_> {
    /// Path of a native executable named after the stem.
    pub fn exe(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.stem, std::env::consts::EXE_SUFFIX))
    }
}

/// Whitespace-separated argv template.
///
/// Placeholders `{source}`, `{dir}`, `{stem}` and `{exe}` are substituted per
/// token after splitting, so substituted paths may contain spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Self {
        Self {
            tokens: template.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The unexpanded program token, for logging.
    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Expand into an argv vector.
    pub fn expand(&self, vars: &TemplateVars<'_>) -> Vec<String> {
        let source = vars.source.to_string_lossy();
        let dir = vars.dir.to_string_lossy();
        let exe = vars.exe();
        let exe = exe.to_string_lossy();

        self.tokens
            .iter()
            .map(|token| {
                token
                    .replace("{source}", &source)
                    .replace("{dir}", &dir)
                    .replace("{stem}", vars.stem)
                    .replace("{exe}", &exe)
            })
            .collect()
    }
}

impl From<String> for CommandTemplate {
    fn from(template: String) -> Self {
        Self::parse(&template)
    }
}

impl From<CommandTemplate> for String {
    fn from(template: CommandTemplate) -> Self {
        template.tokens.join(" ")
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Toolchain description for one language.
#[derive(Debug, Clone, Serialize)]
pub struct LanguageProfile {
    pub id: String,
    pub aliases: Vec<String>,
    /// Extension without the leading dot.
    pub source_extension: String,
    /// Absent for interpreted languages.
    pub compile: Option<CommandTemplate>,
    pub run: CommandTemplate,
    pub file_stem: FileStemPolicy,
    pub syntax: SyntaxRules,
}

impl LanguageProfile {
    fn builtin(
        id: &str,
        aliases: &[&str],
        extension: &str,
        compile: Option<&str>,
        run: &str,
        file_stem: FileStemPolicy,
        syntax: SyntaxRules,
    ) -> Self {
        Self {
            id: id.to_owned(),
            aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
            source_extension: extension.to_owned(),
            compile: compile.map(CommandTemplate::parse),
            run: CommandTemplate::parse(run),
            file_stem,
            syntax,
        }
    }

    pub const fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Apply a config override in place.
    fn apply(&mut self, over: &LanguageOverride) {
        if let Some(ext) = &over.extension {
            self.source_extension = normalize_extension(ext);
        }
        if let Some(compile) = &over.compile {
            // An empty compile template turns the language into an interpreted one.
            let template = CommandTemplate::parse(compile);
            self.compile = (!template.is_empty()).then_some(template);
        }
        if let Some(run) = &over.run {
            self.run = CommandTemplate::parse(run);
        }
        if let Some(policy) = over.file_stem {
            self.file_stem = policy;
        }
        if let Some(syntax) = over.syntax {
            self.syntax = syntax;
        }
        for alias in &over.aliases {
            if !self.aliases.contains(alias) {
                self.aliases.push(alias.clone());
            }
        }
    }

    /// Build a brand-new profile from an override, if it is complete enough.
    fn from_override(id: &str, over: &LanguageOverride) -> Option<Self> {
        let extension = over.extension.as_deref()?;
        let run = CommandTemplate::parse(over.run.as_deref()?);
        let compile = over
            .compile
            .as_deref()
            .map(CommandTemplate::parse)
            .filter(|t| !t.is_empty());

        Some(Self {
            id: id.to_owned(),
            aliases: over.aliases.clone(),
            source_extension: normalize_extension(extension),
            compile,
            run,
            file_stem: over.file_stem.unwrap_or(FileStemPolicy::Generated),
            syntax: over.syntax.unwrap_or(SyntaxRules::Plain),
        })
    }
}

/// Per-language overrides as read from configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguageOverride {
    /// Source file extension (with or without the dot).
    #[serde(default)]
    pub extension: Option<String>,

    /// Compile template. Empty string removes the compile step.
    #[serde(default)]
    pub compile: Option<String>,

    /// Run template.
    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub file_stem: Option<FileStemPolicy>,

    #[serde(default)]
    pub syntax: Option<SyntaxRules>,

    /// Extra ids that resolve to this language.
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_owned()
}

/// Read-only table of language profiles.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
    index: HashMap<String, usize>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageRegistry {
    /// The built-in tutorial languages.
    pub fn builtin() -> Self {
        use FileStemPolicy::{DeclaredType, Generated};

        let profiles = vec![
            LanguageProfile::builtin(
                "python",
                &["py", "python3"],
                "py",
                None,
                "python3 {source}",
                Generated,
                SyntaxRules::Python,
            ),
            LanguageProfile::builtin(
                "javascript",
                &["js", "node"],
                "js",
                None,
                "node {source}",
                Generated,
                SyntaxRules::JavaScript,
            ),
            LanguageProfile::builtin(
                "cpp",
                &["c++", "cxx"],
                "cpp",
                Some("g++ -std=c++17 -O2 -o {exe} {source}"),
                "{exe}",
                Generated,
                SyntaxRules::Cpp,
            ),
            LanguageProfile::builtin(
                "java",
                &[],
                "java",
                Some("javac -encoding UTF-8 -d {dir} {source}"),
                "java -cp {dir} {stem}",
                DeclaredType,
                SyntaxRules::Java,
            ),
            LanguageProfile::builtin(
                "csharp",
                &["cs", "c#"],
                "cs",
                Some("mcs -out:{dir}/{stem}.exe {source}"),
                "mono {dir}/{stem}.exe",
                Generated,
                SyntaxRules::CSharp,
            ),
        ];

        Self::from_profiles(profiles)
    }

    /// Built-ins merged with config overrides.
    ///
    /// Overrides for unknown ids add a new language when they carry both
    /// `extension` and `run`; incomplete ones are logged and skipped.
    pub fn with_overrides(overrides: &HashMap<String, LanguageOverride>) -> Self {
        let mut profiles = Self::builtin().profiles;

        let mut ids: Vec<&String> = overrides.keys().collect();
        ids.sort();

        for id in ids {
            let over = &overrides[id];
            let key = id.to_lowercase();
            if let Some(profile) = profiles.iter_mut().find(|p| p.id == key) {
                info!(language = %key, "Applying language override");
                profile.apply(over);
            } else if let Some(profile) = LanguageProfile::from_override(&key, over) {
                info!(language = %key, "Registered custom language");
                profiles.push(profile);
            } else {
                warn!(language = %key, "Skipping custom language: needs both extension and run");
            }
        }

        Self::from_profiles(profiles)
    }

    fn from_profiles(profiles: Vec<LanguageProfile>) -> Self {
        let mut index = HashMap::new();
        for (i, profile) in profiles.iter().enumerate() {
            index.insert(profile.id.to_lowercase(), i);
        }
        // Aliases never shadow a real id.
        for (i, profile) in profiles.iter().enumerate() {
            for alias in &profile.aliases {
                index.entry(alias.to_lowercase()).or_insert(i);
            }
        }
        Self { profiles, index }
    }

    /// Look up the profile for a language id or alias (case-insensitive).
    pub fn profile_for(&self, language_id: &str) -> Result<&LanguageProfile, SandboxError> {
        self.index
            .get(&language_id.trim().to_lowercase())
            .map(|&i| &self.profiles[i])
            .ok_or_else(|| SandboxError::UnsupportedLanguage(language_id.to_owned()))
    }

    /// Profile whose source extension matches `extension` (leading dot optional).
    pub fn profile_for_extension(&self, extension: &str) -> Option<&LanguageProfile> {
        let extension = normalize_extension(extension);
        self.profiles
            .iter()
            .find(|p| p.source_extension.eq_ignore_ascii_case(&extension))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &LanguageProfile> {
        self.profiles.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_languages_present() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.ids(), vec!["python", "javascript", "cpp", "java", "csharp"]);

        let python = registry.profile_for("python").unwrap();
        assert!(!python.is_compiled());
        assert_eq!(python.source_extension, "py");

        let java = registry.profile_for("java").unwrap();
        assert!(java.is_compiled());
        assert_eq!(java.file_stem, FileStemPolicy::DeclaredType);
    }

    #[test]
    fn aliases_and_case_resolve() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.profile_for("PY").unwrap().id, "python");
        assert_eq!(registry.profile_for("node").unwrap().id, "javascript");
        assert_eq!(registry.profile_for("C#").unwrap().id, "csharp");
        assert_eq!(registry.profile_for(" c++ ").unwrap().id, "cpp");
    }

    #[test]
    fn extension_lookup() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.profile_for_extension("py").unwrap().id, "python");
        assert_eq!(registry.profile_for_extension(".CPP").unwrap().id, "cpp");
        assert!(registry.profile_for_extension("cob").is_none());
    }

    #[test]
    fn unknown_language_is_unsupported() {
        let registry = LanguageRegistry::builtin();
        let err = registry.profile_for("cobol").unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage(ref id) if id == "cobol"));
    }

    #[test]
    fn template_expands_per_token() {
        let template = CommandTemplate::parse("java -cp {dir} {stem}");
        let dir = Path::new("/tmp/with space");
        let source = dir.join("Solution.java");
        let vars = TemplateVars {
            source: &source,
            dir,
            stem: "Solution",
        };
        assert_eq!(
            template.expand(&vars),
            vec!["java", "-cp", "/tmp/with space", "Solution"]
        );
    }

    #[test]
    fn template_expands_embedded_placeholders() {
        let template = CommandTemplate::parse("mcs -out:{dir}/{stem}.exe {source}");
        let dir = Path::new("/w");
        let source = dir.join("main.cs");
        let vars = TemplateVars {
            source: &source,
            dir,
            stem: "main",
        };
        assert_eq!(
            template.expand(&vars),
            vec!["mcs", "-out:/w/main.exe", "/w/main.cs"]
        );
    }

    #[test]
    fn override_replaces_fields() {
        let overrides = HashMap::from([(
            "python".to_string(),
            LanguageOverride {
                run: Some("python3.12 -I {source}".into()),
                ..LanguageOverride::default()
            },
        )]);
        let registry = LanguageRegistry::with_overrides(&overrides);
        let python = registry.profile_for("python").unwrap();
        assert_eq!(python.run.to_string(), "python3.12 -I {source}");
        assert_eq!(python.syntax, SyntaxRules::Python);
    }

    #[test]
    fn override_empty_compile_removes_step() {
        let overrides = HashMap::from([(
            "cpp".to_string(),
            LanguageOverride {
                compile: Some(String::new()),
                ..LanguageOverride::default()
            },
        )]);
        let registry = LanguageRegistry::with_overrides(&overrides);
        assert!(!registry.profile_for("cpp").unwrap().is_compiled());
    }

    #[test]
    fn override_adds_new_language() {
        let overrides = HashMap::from([
            (
                "shell".to_string(),
                LanguageOverride {
                    extension: Some(".sh".into()),
                    run: Some("sh {source}".into()),
                    aliases: vec!["sh".into()],
                    ..LanguageOverride::default()
                },
            ),
            (
                "incomplete".to_string(),
                LanguageOverride {
                    run: Some("x {source}".into()),
                    ..LanguageOverride::default()
                },
            ),
        ]);
        let registry = LanguageRegistry::with_overrides(&overrides);

        let shell = registry.profile_for("sh").unwrap();
        assert_eq!(shell.id, "shell");
        assert_eq!(shell.source_extension, "sh");
        assert_eq!(shell.syntax, SyntaxRules::Plain);
        assert!(registry.profile_for("incomplete").is_err());
    }

    #[test]
    fn override_deserializes() {
        let json = r#"{"extension": "rb", "run": "ruby {source}", "syntax": "plain"}"#;
        let over: LanguageOverride = serde_json::from_str(json).unwrap();
        assert_eq!(over.extension.as_deref(), Some("rb"));
        assert_eq!(over.syntax, Some(SyntaxRules::Plain));
        assert!(over.compile.is_none());
    }
}
