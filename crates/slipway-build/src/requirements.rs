//! Requirements manifest normalization and cache keys.
//!
//! Two manifests that differ only in requirement order, comments or blank
//! lines normalize to the same content and therefore share a cache entry.

use crate::digest::sha256_hex;

const OPTION_PREFIXES: &[&str] = &["--", "-c", "-e", "-f", "-i", "-r"];
const EDITABLE: &str = "-e";

/// Normalize requirements content.
///
/// Comments and blank lines are dropped. Option lines keep their relative
/// order and lead the output (`-e target` becomes `target`); the remaining
/// requirements are sorted. Requirements whose package name is in
/// `no_deploy` are removed. The result ends with a newline unless empty.
pub fn normalize_requirements<S: AsRef<str>>(content: &str, no_deploy: &[S]) -> String {
    let mut options = Vec::new();
    let mut requirements = Vec::new();

    for line in content.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        if OPTION_PREFIXES.iter().any(|p| line.starts_with(p)) {
            match line.strip_prefix(EDITABLE) {
                Some(target) => options.push(target.trim().to_owned()),
                None => options.push(line.to_owned()),
            }
            continue;
        }
        let name = package_name(line);
        if no_deploy
            .iter()
            .any(|skip| skip.as_ref().eq_ignore_ascii_case(name))
        {
            tracing::debug!(requirement = line, "dropping requirement provided by runtime");
            continue;
        }
        requirements.push(line.to_owned());
    }

    requirements.sort();
    options.extend(requirements);
    if options.is_empty() {
        return String::new();
    }
    let mut normalized = options.join("\n");
    normalized.push('\n');
    normalized
}

/// Cache directory name for a normalized manifest on `platform`.
pub fn cache_key(normalized: &str, platform: &str) -> String {
    format!("{}_{platform}_slipway", sha256_hex(normalized.as_bytes()))
}

/// `{os}-{arch}` of the running build.
pub fn current_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Drop a `#` comment. A `#` only starts a comment at line start or after
/// whitespace, so URL fragments (`pkg @ https://…#egg=pkg`) survive.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Package name of a requirement line: everything before the first version
/// specifier, extra, marker or URL separator.
fn package_name(requirement: &str) -> &str {
    let end = requirement
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | '@' | ' '))
        .unwrap_or(requirement.len());
    requirement[..end].trim()
}
