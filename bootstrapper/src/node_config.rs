use std::path::Path;

use serde_json::{json, Map, Value};

use crate::error::{BootstrapError, BootstrapResult};

const EKG_KEY: &str = "hasEKG";
const PROMETHEUS_KEY: &str = "hasPrometheus";
const PROMETHEUS_HOST: &str = "127.0.0.1";

/// Rewrites the two metrics-port fields of a copied node config in place.
///
/// The edit goes through the parsed document rather than text substitution so
/// the rest of the config survives byte-for-byte at the structural level:
/// parse-patch-reparse differs from the original only in these fields.
pub fn patch_metrics_ports(config_path: &Path, ekg_port: u16, prometheus_port: u16) -> BootstrapResult<()> {
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| patch_error(config_path, format!("read failed: {e}")))?;
    let mut doc: Value =
        serde_json::from_str(&raw).map_err(|e| patch_error(config_path, format!("invalid JSON: {e}")))?;
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| patch_error(config_path, "top level is not an object".into()))?;

    set_metrics_ports(obj, ekg_port, prometheus_port);

    let patched =
        serde_json::to_string_pretty(&doc).map_err(|e| patch_error(config_path, format!("serialize failed: {e}")))?;
    std::fs::write(config_path, patched)
        .map_err(|e| patch_error(config_path, format!("write failed: {e}")))?;
    Ok(())
}

/// Only the two port numbers change. The Prometheus entry is a
/// `[host, port]` pair; the host the template carried stays as-is, with the
/// default host filled in only when the template had no entry at all.
fn set_metrics_ports(obj: &mut Map<String, Value>, ekg_port: u16, prometheus_port: u16) {
    obj.insert(EKG_KEY.into(), json!(ekg_port));
    match obj.get_mut(PROMETHEUS_KEY).and_then(Value::as_array_mut) {
        Some(pair) if pair.len() >= 2 => pair[1] = json!(prometheus_port),
        _ => {
            obj.insert(PROMETHEUS_KEY.into(), json!([PROMETHEUS_HOST, prometheus_port]));
        }
    }
}

fn patch_error(path: &Path, reason: String) -> BootstrapError {
    BootstrapError::ConfigPatch { path: path.to_path_buf(), reason }
}
