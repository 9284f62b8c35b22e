//! Packaging plan
//!
//! Translates a [`Resolution`] into the ordered steps a packaging tool runs
//! for each variant: stamp the version, shrink, then sign.

use crate::types::{DefaultRules, Resolution, ResolvedManifestMetadata, VariantConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One packaging action for a single variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PackagingStep {
    /// Write version code and name into the manifest.
    StampVersion {
        version_code: u32,
        version_name: String,
    },
    /// Run the shrinker. With no default rules and no rule files the
    /// shrinker falls back to its built-in configuration.
    Shrink {
        default_rules: Option<DefaultRules>,
        rule_files: Vec<String>,
        shrink_resources: bool,
    },
    /// Sign the package with the named identity.
    Sign {
        identity: String,
        key_alias: String,
        store_path: PathBuf,
    },
    /// Produce an unsigned package.
    LeaveUnsigned,
}

impl PackagingStep {
    /// One-line, human-readable description. Never includes secrets.
    pub fn describe(&self) -> String {
        match self {
            PackagingStep::StampVersion {
                version_code,
                version_name,
            } => format!("stamp version {version_name} ({version_code})"),
            PackagingStep::Shrink {
                default_rules,
                rule_files,
                shrink_resources,
            } => {
                let mut rules: Vec<&str> = default_rules.iter().map(|r| r.file_name()).collect();
                rules.extend(rule_files.iter().map(String::as_str));
                let rules = if rules.is_empty() {
                    "built-in defaults".to_string()
                } else {
                    rules.join(", ")
                };
                let resources = if *shrink_resources {
                    " and resources"
                } else {
                    ""
                };
                format!("shrink code{resources} using {rules}")
            }
            PackagingStep::Sign {
                identity,
                key_alias,
                store_path,
            } => format!(
                "sign with '{identity}' (alias {key_alias}, keystore {})",
                store_path.display()
            ),
            PackagingStep::LeaveUnsigned => "leave unsigned".to_string(),
        }
    }
}

/// Steps for a single variant, in execution order.
pub fn plan_variant(
    manifest: Option<&ResolvedManifestMetadata>,
    variant: &VariantConfig,
) -> Vec<PackagingStep> {
    let mut steps = Vec::new();

    if let Some(manifest) = manifest {
        let suffix = variant.version_name_suffix.as_deref().unwrap_or("");
        steps.push(PackagingStep::StampVersion {
            version_code: manifest.version_code,
            version_name: format!("{}{}", manifest.version_name, suffix),
        });
    }

    if variant.minify_enabled {
        steps.push(PackagingStep::Shrink {
            default_rules: variant.default_rules,
            rule_files: variant.shrink_rule_files.clone(),
            shrink_resources: variant.shrink_resources,
        });
    }

    steps.push(match &variant.signing {
        Some(signing) => PackagingStep::Sign {
            identity: signing.name.clone(),
            key_alias: signing.identity.key_alias.clone(),
            store_path: signing.identity.store_path.clone(),
        },
        None => PackagingStep::LeaveUnsigned,
    });

    steps
}

/// Steps for every resolved variant, keyed by variant name.
pub fn plan(resolution: &Resolution) -> BTreeMap<String, Vec<PackagingStep>> {
    resolution
        .variants
        .iter()
        .map(|(name, variant)| {
            (
                name.clone(),
                plan_variant(resolution.manifest.as_ref(), variant),
            )
        })
        .collect()
}
