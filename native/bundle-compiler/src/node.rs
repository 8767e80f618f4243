//! Node binding: `compileBundle(entryPath, sources, bundleType?)`.

use napi_derive::napi;
use std::collections::HashMap;

use crate::bundle::BundleType;
use crate::compiler::compile;

/// Compile a bundle and return the `CompileResult` as JSON. Failures reject
/// with `<ErrorKind>: <message>`.
#[napi]
pub fn compile_bundle(
    entry_path: String,
    sources: HashMap<String, String>,
    bundle_type: Option<String>,
) -> napi::Result<serde_json::Value> {
    let bundle_type = match bundle_type.as_deref() {
        Some(t) => t
            .parse::<BundleType>()
            .map_err(|e| napi::Error::from_reason(format!("{}: {}", e.kind(), e)))?,
        None => BundleType::default(),
    };

    // Keep file order stable regardless of the host's map iteration order.
    let mut sources: Vec<(String, String)> = sources.into_iter().collect();
    sources.sort_by(|a, b| a.0.cmp(&b.0));

    let result = compile(&entry_path, sources, bundle_type)
        .map_err(|e| napi::Error::from_reason(format!("{}: {}", e.kind(), e)))?;
    serde_json::to_value(result).map_err(|e| napi::Error::from_reason(e.to_string()))
}
