//! Run targets, quick launches, and variants.

use serde::{Deserialize, Serialize};

/// Where a [`RunTarget`] definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    BuiltIn,
    User,
    Detected,
    Variant,
}

/// Whether a target accepts a free-text prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Promptable,
    Command,
}

/// A launchable tool definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    pub name: String,
    pub kind: TargetKind,
    pub command_template: String,
    pub source: TargetSource,
}

impl RunTarget {
    /// A prompt is required iff the target is promptable; a prompt given to
    /// a command target is a validation error.
    pub fn check_prompt(&self, prompt: Option<&str>) -> Result<(), String> {
        match (self.kind, prompt) {
            (TargetKind::Promptable, None) => {
                Err(format!("target '{}' requires a prompt", self.name))
            }
            (TargetKind::Command, Some(_)) => {
                Err(format!("target '{}' does not accept a prompt", self.name))
            }
            _ => Ok(()),
        }
    }
}

/// A preset pairing of target + optional prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickLaunch {
    pub name: String,
    pub target: String,
    pub prompt: Option<String>,
}

/// A branded wrapper over a base target requiring named secrets at spawn time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub display_name: String,
    pub base_target: String,
    pub required_secret_keys: Vec<String>,
}

impl Variant {
    /// Resolve the secret values for this variant from the process environment,
    /// failing validation if any required key is unset.
    pub fn resolve_secrets(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<(String, String)>, String> {
        let mut resolved = Vec::with_capacity(self.required_secret_keys.len());
        for key in &self.required_secret_keys {
            match lookup(key) {
                Some(value) => resolved.push((key.clone(), value)),
                None => return Err(format!("variant '{}' requires secret '{key}'", self.name)),
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promptable(name: &str) -> RunTarget {
        RunTarget {
            name: name.to_string(),
            kind: TargetKind::Promptable,
            command_template: "{bin} {prompt}".to_string(),
            source: TargetSource::BuiltIn,
        }
    }

    fn command(name: &str) -> RunTarget {
        RunTarget {
            name: name.to_string(),
            kind: TargetKind::Command,
            command_template: "{bin}".to_string(),
            source: TargetSource::BuiltIn,
        }
    }

    #[test]
    fn promptable_target_requires_prompt() {
        assert!(promptable("claude").check_prompt(None).is_err());
        assert!(promptable("claude").check_prompt(Some("hi")).is_ok());
    }

    #[test]
    fn command_target_rejects_prompt() {
        assert!(command("tests").check_prompt(Some("hi")).is_err());
        assert!(command("tests").check_prompt(None).is_ok());
    }

    #[test]
    fn variant_resolves_all_required_secrets() {
        let variant = Variant {
            name: "acme".to_string(),
            display_name: "Acme Claude".to_string(),
            base_target: "claude".to_string(),
            required_secret_keys: vec!["ACME_TOKEN".to_string()],
        };
        let resolved = variant
            .resolve_secrets(|k| (k == "ACME_TOKEN").then(|| "xyz".to_string()))
            .unwrap();
        assert_eq!(resolved, vec![("ACME_TOKEN".to_string(), "xyz".to_string())]);
    }

    #[test]
    fn variant_fails_on_missing_secret() {
        let variant = Variant {
            name: "acme".to_string(),
            display_name: "Acme Claude".to_string(),
            base_target: "claude".to_string(),
            required_secret_keys: vec!["ACME_TOKEN".to_string()],
        };
        assert!(variant.resolve_secrets(|_| None).is_err());
    }
}
