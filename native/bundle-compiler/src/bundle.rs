//! Source bundle model: the files of one component plus its trust level.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CompileError;

/// Namespace used when the entry path does not carry one.
pub const DEFAULT_NAMESPACE: &str = "c";

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLE TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Trust classification of a bundle. Drives the lint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleType {
    #[default]
    Internal,
    Platform,
    ThirdParty,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Internal => "internal",
            BundleType::Platform => "platform",
            BundleType::ThirdParty => "thirdParty",
        }
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleType {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(BundleType::Internal),
            "platform" => Ok(BundleType::Platform),
            "thirdParty" | "third-party" | "thirdparty" => Ok(BundleType::ThirdParty),
            other => Err(CompileError::invalid_bundle(format!(
                "unknown bundle type '{}'",
                other
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLE IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleId {
    pub namespace: String,
    pub name: String,
}

impl BundleId {
    /// `ns/name/file.js` -> `ns:name`, `name/file.js` -> `c:name`,
    /// `file.js` -> `c:file`.
    pub fn from_entry_path(entry_path: &str) -> Self {
        let segments: Vec<&str> = entry_path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [.., namespace, name, _file] => BundleId {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            [name, _file] => BundleId {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: name.to_string(),
            },
            _ => BundleId {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: file_stem(entry_path).to_string(),
            },
        }
    }

    /// Module id used in the emitted `define(...)` call.
    pub fn module_id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Last path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Last path segment without its extension.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Extension without the dot, empty when there is none.
pub fn file_extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx + 1..],
    }
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBundle {
    pub entry_path: String,
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub bundle_type: BundleType,
}

impl SourceBundle {
    /// Build a bundle, normalizing separators. Later duplicates of a path
    /// overwrite earlier ones but keep the first position.
    pub fn new<I, P, S>(
        entry_path: &str,
        sources: I,
        bundle_type: BundleType,
    ) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let entry_path = normalize_path(entry_path);
        if entry_path.trim().is_empty() {
            return Err(CompileError::invalid_bundle("entry path is empty"));
        }

        let mut files = IndexMap::new();
        for (path, text) in sources {
            let path = normalize_path(path.as_ref());
            if path.trim().is_empty() {
                return Err(CompileError::invalid_bundle(
                    "bundle contains a file with an empty path",
                ));
            }
            files.insert(path, text.into());
        }

        if !files.contains_key(&entry_path) {
            return Err(CompileError::invalid_bundle(format!(
                "entry '{}' is not one of the bundle files",
                entry_path
            )));
        }

        Ok(SourceBundle {
            entry_path,
            files,
            bundle_type,
        })
    }

    pub fn id(&self) -> BundleId {
        BundleId::from_entry_path(&self.entry_path)
    }

    pub fn entry_source(&self) -> &str {
        self.files
            .get(&self.entry_path)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_id_from_entry_path() {
        let id = BundleId::from_entry_path("modules/errorInJs/errorInJs.js");
        assert_eq!(id.to_string(), "modules:errorInJs");
        assert_eq!(id.module_id(), "modules/errorInJs");

        let id = BundleId::from_entry_path("src/modules/x/foo/foo.js");
        assert_eq!(id.to_string(), "x:foo");

        assert_eq!(BundleId::from_entry_path("foo/foo.js").to_string(), "c:foo");
        assert_eq!(BundleId::from_entry_path("bar.js").to_string(), "c:bar");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(file_name("x/foo/foo.html"), "foo.html");
        assert_eq!(file_stem("x/foo/foo.html"), "foo");
        assert_eq!(file_extension("x/foo/foo.html"), "html");
        assert_eq!(file_extension("x/foo/.hidden"), "");
        assert_eq!(normalize_path("x\\foo\\foo.js"), "x/foo/foo.js");
    }

    #[test]
    fn test_new_requires_entry() {
        let err = SourceBundle::new(
            "x/foo/foo.js",
            vec![("x/foo/foo.html", "<template></template>")],
            BundleType::Internal,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidBundleError");
        assert!(err.to_string().contains("x/foo/foo.js"));
    }

    #[test]
    fn test_new_rejects_empty_path() {
        let err = SourceBundle::new(
            "x/foo/foo.js",
            vec![("x/foo/foo.js", "export default 1;"), ("", "oops")],
            BundleType::Internal,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidBundleError");
    }

    #[test]
    fn test_new_normalizes_and_collapses_duplicates() {
        let bundle = SourceBundle::new(
            "x\\foo\\foo.js",
            vec![
                ("x\\foo\\foo.js", "first"),
                ("x/foo/foo.html", "<template></template>"),
                ("x/foo/foo.js", "second"),
            ],
            BundleType::Platform,
        )
        .unwrap();
        assert_eq!(bundle.entry_path, "x/foo/foo.js");
        assert_eq!(bundle.files.len(), 2);
        assert_eq!(bundle.entry_source(), "second");
        assert_eq!(bundle.files.keys().next().map(String::as_str), Some("x/foo/foo.js"));
    }

    #[test]
    fn test_bundle_type_parse_and_serde() {
        assert_eq!("thirdParty".parse::<BundleType>().unwrap(), BundleType::ThirdParty);
        assert!("trusted".parse::<BundleType>().is_err());
        assert_eq!(BundleType::default(), BundleType::Internal);
        assert_eq!(
            serde_json::to_string(&BundleType::ThirdParty).unwrap(),
            "\"thirdParty\""
        );
    }
}
