//! C4: Classifier / Context Builder — turns a raw prompt plus project
//! context into a `ClassifyInput` the retriever can score against.

mod keywords;

use std::collections::BTreeSet;
use std::path::PathBuf;

pub use keywords::extract_keywords;

/// The closed set of domains the classifier recognizes, plus whatever
/// language tags the project markers surface.
pub const CLOSED_DOMAINS: &[&str] = &[
    "_global", "devops", "web", "mobile", "backend", "data", "security", "test", "docs",
];

/// A detected domain and the classifier's confidence in it.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainScore {
    pub domain: String,
    pub confidence: f32,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Hints {
    pub probable_languages: BTreeSet<String>,
    pub probable_frameworks: BTreeSet<String>,
}

/// Recently touched files and their extensions.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    pub recent_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectRoot {
    pub path: Option<PathBuf>,
    /// Config files observed at the root (e.g. "Cargo.toml", "package.json").
    pub markers: Vec<String>,
}

/// Input to the classifier.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput {
    pub prompt_text: String,
    pub file_context: FileContext,
    pub project_root: ProjectRoot,
    pub history: Vec<String>,
}

impl ClassifyInput {
    #[must_use]
    pub fn from_prompt(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            ..Default::default()
        }
    }
}

/// Result of classification.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub domains: Vec<DomainScore>,
    pub keywords: BTreeSet<String>,
    pub hints: Hints,
}

impl ClassificationResult {
    #[must_use]
    pub fn primary_domain(&self) -> &str {
        self.domains.first().map_or("_global", |d| d.domain.as_str())
    }
}

/// Confidence above which later detectors in the pipeline are skipped.
const EARLY_EXIT_CONFIDENCE: f32 = 0.8;

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("java", "java"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("py", "python"),
    ("go", "go"),
    ("rb", "ruby"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("md", "markdown"),
];

const FRAMEWORK_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "cargo"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("go.mod", "go"),
    ("Gemfile", "ruby"),
    ("Dockerfile", "docker"),
    ("docker-compose.yml", "docker"),
    (".github/workflows", "github-actions"),
];

const MOBILE_KEYWORDS: &[&str] = &["swift", "swiftui", "uikit", "android", "kotlin", "ios", "xcode"];
const WEB_KEYWORDS: &[&str] = &["react", "vue", "dom", "css", "html", "frontend", "browser"];
const BACKEND_KEYWORDS: &[&str] = &["api", "server", "database", "endpoint", "microservice", "grpc"];
const DEVOPS_KEYWORDS: &[&str] = &["docker", "kubernetes", "ci", "deploy", "pipeline", "terraform"];
const DATA_KEYWORDS: &[&str] = &["dataframe", "pandas", "sql", "etl", "pipeline", "model training"];
const SECURITY_KEYWORDS: &[&str] = &["auth", "vulnerability", "exploit", "sanitize", "injection", "cve"];
const TEST_KEYWORDS: &[&str] = &["test", "assert", "mock", "coverage", "fixture"];
const DOCS_KEYWORDS: &[&str] = &["readme", "documentation", "changelog", "docstring"];

/// Classify a prompt + project context into domains, keywords, and hints.
/// A small layered pipeline: fast rule-based detectors first (extensions,
/// config markers), then keyword matchers, with early exit once a
/// detector reaches [`EARLY_EXIT_CONFIDENCE`].
#[must_use]
pub fn classify(input: &ClassifyInput) -> ClassificationResult {
    let keywords = extract_keywords(&input.prompt_text);
    let mut hints = Hints::default();
    let mut domains: Vec<DomainScore> = Vec::new();

    // 1. File-extension detector (language hints).
    for path in &input.file_context.recent_paths {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if let Some((_, lang)) = LANGUAGE_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
                hints.probable_languages.insert((*lang).to_string());
            }
        }
    }

    // 2. Config-marker detector (framework hints).
    for marker in &input.project_root.markers {
        if let Some((_, fw)) = FRAMEWORK_MARKERS.iter().find(|(m, _)| *m == marker.as_str()) {
            hints.probable_frameworks.insert((*fw).to_string());
        }
    }

    if hints.probable_languages.contains("swift") || hints.probable_languages.contains("kotlin") {
        domains.push(domain_score("mobile", 0.85, "language hint"));
    }

    if max_confidence(&domains) < EARLY_EXIT_CONFIDENCE {
        // 3. Keyword matchers across the closed domain set.
        score_keyword_domain(&mut domains, &keywords, "mobile", MOBILE_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "web", WEB_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "backend", BACKEND_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "devops", DEVOPS_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "data", DATA_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "security", SECURITY_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "test", TEST_KEYWORDS);
        score_keyword_domain(&mut domains, &keywords, "docs", DOCS_KEYWORDS);
    }

    // Merge same-domain scores (language hint + keyword match), keep the max.
    let mut merged: std::collections::HashMap<String, DomainScore> = std::collections::HashMap::new();
    for d in domains {
        merged
            .entry(d.domain.clone())
            .and_modify(|existing| {
                if d.confidence > existing.confidence {
                    *existing = d.clone();
                } else {
                    existing.signals.extend(d.signals.clone());
                }
            })
            .or_insert(d);
    }
    let mut domains: Vec<DomainScore> = merged.into_values().collect();
    domains.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));

    if domains.is_empty() {
        domains.push(domain_score("_global", 0.0, "no detector matched"));
    }

    ClassificationResult {
        domains,
        keywords,
        hints,
    }
}

fn domain_score(domain: &str, confidence: f32, signal: &str) -> DomainScore {
    DomainScore {
        domain: domain.to_string(),
        confidence,
        signals: vec![signal.to_string()],
    }
}

fn max_confidence(domains: &[DomainScore]) -> f32 {
    domains.iter().map(|d| d.confidence).fold(0.0, f32::max)
}

fn score_keyword_domain(
    domains: &mut Vec<DomainScore>,
    keywords: &BTreeSet<String>,
    domain: &str,
    vocabulary: &[&str],
) {
    let hits: Vec<String> = vocabulary
        .iter()
        .filter(|kw| keywords.contains(**kw))
        .map(|s| (*s).to_string())
        .collect();
    if hits.is_empty() {
        return;
    }
    let confidence = (hits.len() as f32 / vocabulary.len() as f32 * 2.0).min(1.0);
    domains.push(DomainScore {
        domain: domain.to_string(),
        confidence,
        signals: hits,
    });
}
