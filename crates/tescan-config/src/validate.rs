//! Validation and path normalisation for merged configuration.

use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, ConfigResult, ValidationIssue};
use crate::model::ScannerConfig;

/// Check every invariant and report all failures together.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] listing each failing field.
pub fn validate(config: &ScannerConfig) -> ConfigResult<()> {
    let mut issues = Vec::new();

    if config.appliance_ip.trim().is_empty() {
        issues.push(ValidationIssue {
            field: "appliance_ip",
            reason: "required",
            value: None,
        });
    } else if config.appliance_url().is_err() {
        issues.push(ValidationIssue {
            field: "appliance_ip",
            reason: "not_a_host",
            value: Some(config.appliance_ip.clone()),
        });
    }

    let minimums = [
        ("concurrency", u64::try_from(config.concurrency).unwrap_or(u64::MAX)),
        ("seconds_to_wait", config.seconds_to_wait),
        ("max_retries", u64::from(config.max_retries)),
        ("request_timeout_secs", config.request_timeout_secs),
    ];
    for (field, value) in minimums {
        if value < 1 {
            issues.push(ValidationIssue {
                field,
                reason: "must_be_positive",
                value: Some(value.to_string()),
            });
        }
    }

    for (field, path) in std::iter::once(("input_directory", config.input_directory.as_path()))
        .chain(config.output_roots())
    {
        if path.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                field,
                reason: "empty_path",
                value: None,
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation { issues })
    }
}

/// Expand `~`, `$VAR` and `${VAR}`, then collapse `.` and `..` lexically.
///
/// `lookup` resolves variable names; unknown variables stay verbatim. `~` is
/// resolved through `HOME` (or `USERPROFILE`) via the same lookup.
#[must_use]
pub fn normalize_path<F>(raw: &Path, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let Some(text) = raw.to_str() else {
        return collapse(raw);
    };

    let with_home = match text.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            match lookup("HOME").or_else(|| lookup("USERPROFILE")) {
                Some(home) => format!("{home}{rest}"),
                None => text.to_string(),
            }
        }
        _ => text.to_string(),
    };

    collapse(Path::new(&expand_variables(&with_home, &lookup)))
}

fn expand_variables<F>(text: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find('$') {
        output.push_str(&rest[..index]);
        let after = &rest[index + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => output.push_str(&value),
            _ => output.push_str(&rest[index..index + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    output.push_str(rest);
    output
}

fn collapse(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}
