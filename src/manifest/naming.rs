//! Deterministic BkApp names.

use crate::constants::BKAPP_NAME_MAX_LEN;
use sha2::{Digest, Sha256};

/// Name of the BkApp of a module.
///
/// The result is a DNS-1123 label of at most 40 characters and depends only on
/// the app code and module name. Underscores, which are legal in app codes but
/// not in labels, become `0us0`; any other character outside `[a-z0-9-]`
/// becomes `-`. Names that do not fit are truncated and get an
/// 8 character hash suffix so two long codes cannot collide.
pub fn generate_bkapp_name(app_code: &str, module_name: &str, is_default_module: bool) -> String {
    let raw = if is_default_module {
        app_code.to_string()
    } else {
        format!("{app_code}-m-{module_name}")
    };
    let name: String = raw
        .to_lowercase()
        .replace('_', "0us0")
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();

    if name.len() <= BKAPP_NAME_MAX_LEN {
        return name;
    }

    let digest = Sha256::digest(name.as_bytes());
    let suffix: String = digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect();
    let keep = BKAPP_NAME_MAX_LEN - suffix.len() - 1;
    let prefix = name[..keep].trim_end_matches('-');
    format!("{prefix}-{suffix}")
}
