//! Dependency-injection framework detection (Dagger, Hilt, Koin)

use super::Chunk;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

pub const DI_COMPONENT: &str = "di_component";
pub const DI_MODULE: &str = "di_module";
pub const DI_PROVIDER: &str = "di_provider";

/// Marker annotations and patterns identifying one framework
struct FrameworkRules {
    name: &'static str,
    annotations: &'static [&'static str],
    patterns: Vec<Regex>,
}

/// DI declarations found in a single file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiAnalysis {
    pub framework: String,
    pub components: Vec<String>,
    pub modules: Vec<String>,
    pub providers: Vec<String>,
    pub injection_points: Vec<String>,
}

/// Detects DI usage and records every framework seen by this instance
pub struct DiAnalyzer {
    frameworks: Vec<FrameworkRules>,
    component: Regex,
    module: Regex,
    provider: Regex,
    injection: Regex,
    koin_module: Regex,
    koin_provider: Regex,
    detected: Mutex<BTreeSet<String>>,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("DI pattern is a valid regex")
}

impl Default for DiAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DiAnalyzer {
    pub fn new() -> Self {
        let frameworks = vec![
            FrameworkRules {
                name: "dagger",
                annotations: &["@Inject", "@Provides", "@Binds", "@Module", "@Component"],
                patterns: vec![compile(r"Dagger[A-Z]\w*Component")],
            },
            FrameworkRules {
                name: "hilt",
                annotations: &["@HiltAndroidApp", "@AndroidEntryPoint", "@HiltViewModel"],
                patterns: vec![compile(r"Hilt[A-Z]\w*")],
            },
            FrameworkRules {
                name: "koin",
                annotations: &[],
                patterns: vec![
                    compile(r"startKoin"),
                    compile(r"module\s*\{"),
                    compile(r"single\s*\{"),
                    compile(r"factory\s*\{"),
                ],
            },
        ];

        Self {
            frameworks,
            component: compile(
                r"@Component(?:\([^)]*\))?\s+(?:interface|abstract\s+class)\s+(\w+)",
            ),
            module: compile(r"@Module(?:\([^)]*\))?\s+(?:class|interface|object|abstract\s+class)\s+(\w+)"),
            provider: compile(r"@Provides\s+(?:fun|def)\s+(\w+)"),
            injection: compile(r"@Inject\s+(?:lateinit\s+var|val|var)\s+(\w+)"),
            koin_module: compile(r"val\s+(\w+)\s*=\s*module\s*\{"),
            koin_provider: compile(r"(?:single|factory)\s*\{[^}]*?\s+(\w+)\s*\("),
            detected: Mutex::new(BTreeSet::new()),
        }
    }

    /// First framework whose annotation or pattern occurs in `content`
    fn detect(&self, content: &str) -> Option<&'static str> {
        self.frameworks
            .iter()
            .find(|rules| {
                rules.annotations.iter().any(|a| content.contains(a))
                    || rules.patterns.iter().any(|p| p.is_match(content))
            })
            .map(|rules| rules.name)
    }

    /// Analyze a file; `None` when no DI framework is used
    pub fn analyze(&self, content: &str) -> Option<DiAnalysis> {
        let framework = self.detect(content)?;

        if let Ok(mut detected) = self.detected.lock() {
            detected.insert(framework.to_string());
        }

        let captures = |re: &Regex| -> Vec<String> {
            re.captures_iter(content)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        };

        let analysis = if framework == "koin" {
            DiAnalysis {
                framework: framework.to_string(),
                modules: captures(&self.koin_module),
                providers: captures(&self.koin_provider),
                ..DiAnalysis::default()
            }
        } else {
            DiAnalysis {
                framework: framework.to_string(),
                components: captures(&self.component),
                modules: captures(&self.module),
                providers: captures(&self.provider),
                injection_points: captures(&self.injection),
            }
        };

        Some(analysis)
    }

    /// DI chunks for a file, tagged with the detected framework
    pub fn chunks(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        let Some(analysis) = self.analyze(content) else {
            return Vec::new();
        };

        let framework = analysis.framework.as_str();
        let tagged = [
            (DI_COMPONENT, &analysis.components),
            (DI_MODULE, &analysis.modules),
            (DI_PROVIDER, &analysis.providers),
        ];

        tagged
            .into_iter()
            .flat_map(|(tag, names)| {
                names.iter().map(move |name| {
                    Chunk::new(tag, file_path, name.as_str()).with_framework(framework)
                })
            })
            .collect()
    }

    /// Frameworks seen so far, sorted
    pub fn detected_frameworks(&self) -> Vec<String> {
        self.detected
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
