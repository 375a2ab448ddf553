//! Origin classification for call-site keys
//!
//! Maps the defining file of a call site to a package namespace and a
//! library tier. Rules are configuration-driven; additional classifiers can
//! be registered at runtime without touching the normalizer.
//!
//! # Example TOML
//! ```toml
//! [[origins]]
//! package = "torch"
//! tier = "compute"
//! namespace = "top"
//! requires = ["site-packages", "dist-packages"]
//! min_cumulative = 0.005
//! keywords = ["forward", "__call__", "conv"]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Library tier of a recognized origin
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The package under study; surfaces first in reports
    Primary,
    /// Heavy numeric/tensor library; only compute-relevant symbols are kept
    Compute,
    /// Supporting library held to a higher cost threshold
    Secondary,
}

/// How much of the path below the package directory becomes namespace
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceStyle {
    /// Every directory segment: `pkg.a.b`
    #[default]
    Full,
    /// First directory segment only: `pkg.a`
    Top,
    /// Package name only: `pkg`
    Flat,
}

/// A configured origin rule keyed by package directory name
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OriginRule {
    /// Package directory name as it appears in the path (e.g. "numpy")
    pub package: String,

    pub tier: Tier,

    #[serde(default)]
    pub namespace: NamespaceStyle,

    /// Path must also contain one of these substrings (empty = no constraint)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Cost floor overriding the global minimum for this origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cumulative: Option<f64>,

    /// Symbol must contain one of these (case-insensitive); empty = any symbol
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Result of classifying one origin path
#[derive(Debug, Clone, PartialEq)]
pub struct OriginMatch<'a> {
    /// Dotted namespace, without the file stem
    pub namespace: String,
    pub tier: Tier,
    pub min_cumulative: Option<f64>,
    pub keywords: &'a [String],
}

impl OriginMatch<'_> {
    /// Check a symbol against the keyword constraint
    pub fn accepts_symbol(&self, symbol: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let symbol = symbol.to_lowercase();
        self.keywords
            .iter()
            .any(|k| symbol.contains(&k.to_lowercase()))
    }
}

/// Strategy that recognizes origins of one library family
pub trait OriginClassifier: fmt::Debug + Send + Sync {
    /// Classify an origin path, returning `None` when it is not recognized
    fn classify<'a>(&'a self, origin: &str) -> Option<OriginMatch<'a>>;
}

impl OriginRule {
    /// Byte offset just past the last `<package>/` path segment, if any
    fn package_end(&self, path: &str) -> Option<usize> {
        let needle = format!("{}/", self.package);
        path.match_indices(&needle)
            .filter(|(idx, _)| *idx == 0 || path.as_bytes()[idx - 1] == b'/')
            .map(|(idx, _)| idx + needle.len())
            .last()
    }

    fn namespace_for(&self, rest: &str) -> String {
        let mut dirs: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        // last segment is the file itself
        dirs.pop();

        let dirs: &[&str] = match self.namespace {
            NamespaceStyle::Full => &dirs,
            NamespaceStyle::Top => &dirs[..dirs.len().min(1)],
            NamespaceStyle::Flat => &[],
        };

        let mut namespace = self.package.clone();
        for dir in dirs {
            namespace.push('.');
            namespace.push_str(dir);
        }
        namespace
    }
}

impl OriginClassifier for OriginRule {
    fn classify<'a>(&'a self, origin: &str) -> Option<OriginMatch<'a>> {
        let path = origin.replace('\\', "/");
        let end = self.package_end(&path)?;

        if !self.requires.is_empty() && !self.requires.iter().any(|r| path.contains(r.as_str())) {
            return None;
        }

        Some(OriginMatch {
            namespace: self.namespace_for(&path[end..]),
            tier: self.tier,
            min_cumulative: self.min_cumulative,
            keywords: &self.keywords,
        })
    }
}

/// Ordered set of origin classifiers; the first match wins
#[derive(Debug, Default)]
pub struct OriginRegistry {
    classifiers: Vec<Box<dyn OriginClassifier>>,
}

impl OriginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured rules, preserving their order
    pub fn from_rules(rules: &[OriginRule]) -> Self {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(Box::new(rule.clone()));
        }
        registry
    }

    /// Append a classifier; it is consulted after all existing ones
    pub fn register(&mut self, classifier: Box<dyn OriginClassifier>) {
        self.classifiers.push(classifier);
    }

    pub fn classify(&self, origin: &str) -> Option<OriginMatch<'_>> {
        self.classifiers.iter().find_map(|c| c.classify(origin))
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }
}

/// File stem of an origin path (`/a/b/train.py` -> `train`)
pub fn file_stem(origin: &str) -> &str {
    let name = file_name(origin);
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Final path component of an origin (`/a/b/train.py` -> `train.py`)
pub fn file_name(origin: &str) -> &str {
    origin.rsplit(['/', '\\']).next().unwrap_or(origin)
}

/// Built-in rule set: the primary package, one tensor library, and a
/// handful of supporting libraries
pub fn default_rules() -> Vec<OriginRule> {
    let secondary = |package: &str| OriginRule {
        package: package.to_string(),
        tier: Tier::Secondary,
        namespace: NamespaceStyle::Flat,
        requires: Vec::new(),
        min_cumulative: Some(0.005),
        keywords: Vec::new(),
    };

    vec![
        OriginRule {
            package: "ultralytics".to_string(),
            tier: Tier::Primary,
            namespace: NamespaceStyle::Full,
            requires: Vec::new(),
            min_cumulative: None,
            keywords: Vec::new(),
        },
        OriginRule {
            package: "torch".to_string(),
            tier: Tier::Compute,
            namespace: NamespaceStyle::Top,
            requires: vec!["site-packages".to_string(), "dist-packages".to_string()],
            min_cumulative: Some(0.005),
            keywords: ["forward", "__call__", "conv", "relu", "pool", "norm", "activation"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
        secondary("numpy"),
        secondary("cv2"),
        secondary("PIL"),
        secondary("torchvision"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "/opt/venv/lib/python3.11/site-packages";

    #[test]
    fn test_primary_full_namespace() {
        let registry = OriginRegistry::from_rules(&default_rules());
        let origin = format!("{SITE}/ultralytics/engine/predictor.py");
        let m = registry.classify(&origin).unwrap();
        assert_eq!(m.tier, Tier::Primary);
        assert_eq!(m.namespace, "ultralytics.engine");
    }

    #[test]
    fn test_primary_top_level_file() {
        let registry = OriginRegistry::from_rules(&default_rules());
        let m = registry.classify(&format!("{SITE}/ultralytics/__init__.py")).unwrap();
        assert_eq!(m.namespace, "ultralytics");
    }

    #[test]
    fn test_compute_requires_site_packages() {
        let registry = OriginRegistry::from_rules(&default_rules());
        assert!(registry.classify("/home/me/src/torch/model.py").is_none());

        let m = registry
            .classify(&format!("{SITE}/torch/nn/modules/conv.py"))
            .unwrap();
        assert_eq!(m.tier, Tier::Compute);
        assert_eq!(m.namespace, "torch.nn");
        assert_eq!(m.min_cumulative, Some(0.005));
    }

    #[test]
    fn test_package_match_is_segment_aware() {
        let registry = OriginRegistry::from_rules(&default_rules());
        let m = registry
            .classify(&format!("{SITE}/torchvision/ops/boxes.py"))
            .unwrap();
        assert_eq!(m.tier, Tier::Secondary);
        assert_eq!(m.namespace, "torchvision");

        assert!(registry.classify("/srv/mynumpyhelpers/util.py").is_none());
    }

    #[test]
    fn test_windows_separators() {
        let registry = OriginRegistry::from_rules(&default_rules());
        let m = registry
            .classify(r"C:\venv\Lib\site-packages\numpy\core\fromnumeric.py")
            .unwrap();
        assert_eq!(m.namespace, "numpy");
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let rules = default_rules();
        let m = rules[1]
            .classify(&format!("{SITE}/torch/nn/modules/module.py"))
            .unwrap();
        assert!(m.accepts_symbol("__call__"));
        assert!(!m.accepts_symbol("_call_impl"));
        assert!(m.accepts_symbol("BatchNorm2d"));
        assert!(!m.accepts_symbol("_apply"));
    }

    #[test]
    fn test_registered_classifier_consulted_last() {
        #[derive(Debug)]
        struct Everything;
        impl OriginClassifier for Everything {
            fn classify<'a>(&'a self, _origin: &str) -> Option<OriginMatch<'a>> {
                Some(OriginMatch {
                    namespace: "app".to_string(),
                    tier: Tier::Secondary,
                    min_cumulative: None,
                    keywords: &[],
                })
            }
        }

        let mut registry = OriginRegistry::from_rules(&default_rules());
        registry.register(Box::new(Everything));
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.classify("/srv/app/main.py").unwrap().namespace, "app");
        assert_eq!(
            registry
                .classify(&format!("{SITE}/cv2/__init__.py"))
                .unwrap()
                .namespace,
            "cv2"
        );
    }

    #[test]
    fn test_file_stem_and_name() {
        assert_eq!(file_stem("/a/b/train.py"), "train");
        assert_eq!(file_name("/a/b/train.py"), "train.py");
        assert_eq!(file_stem("~"), "~");
        assert_eq!(file_stem("<string>"), "<string>");
        assert_eq!(file_stem(r"C:\x\y.py"), "y");
    }
}
