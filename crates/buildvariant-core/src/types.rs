//! Core types for buildvariant-core.
//!
//! This module defines the types shared by the resolvers and the planner:
//!
//! - [`ResolveError`] - Every way a descriptor can fail to resolve
//! - [`SigningIdentity`] - Keystore credentials used to sign a package
//! - [`PartialVariantConfig`] / [`VariantDefaults`] - Declared variants and their fallbacks
//! - [`VariantConfig`] - A fully resolved variant
//! - [`ManifestDecl`] / [`ProvidedValues`] / [`ResolvedManifestMetadata`] - Manifest metadata
//! - [`BuildDescriptor`] / [`Resolution`] - Whole-descriptor input and output

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Name of Android's built-in debug build type and signing identity.
pub const DEBUG_VARIANT: &str = "debug";

/// Error types produced while resolving a descriptor.
///
/// Errors are collected rather than returned early: one failing variant never
/// prevents the others from resolving. None of the messages include secret
/// values; signing problems name the offending field only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveError {
    /// A declared variant has an empty name.
    #[error("variant declared at position {index} has an empty name")]
    EmptyVariantName { index: usize },

    /// The same variant name was declared more than once.
    ///
    /// None of the duplicated declarations are resolved.
    #[error("variant '{variant}' is declared {count} times; variant names must be unique")]
    DuplicateVariant { variant: String, count: usize },

    /// A release-style (non-debuggable) variant ended up without a signing identity.
    #[error(
        "variant '{variant}' is not debuggable and has no signing identity. Set `signing` on the variant or in [defaults]"
    )]
    MissingSigningIdentity { variant: String },

    /// A variant references a signing identity that was never declared.
    #[error("variant '{variant}' references unknown signing identity '{identity}'")]
    UnknownSigningIdentity { variant: String, identity: String },

    /// A referenced signing identity has an empty field.
    #[error("variant '{variant}' uses signing identity '{identity}' whose {field} is empty")]
    IncompleteSigningIdentity {
        variant: String,
        identity: String,
        field: &'static str,
    },

    /// A referenced signing identity reads a password from an unset
    /// environment variable.
    #[error(
        "variant '{variant}' uses signing identity '{identity}' whose {field} references unset environment variable {var}"
    )]
    UnresolvedSecret {
        variant: String,
        identity: String,
        field: &'static str,
        var: String,
    },

    /// A variant asks for bundled shrinker rules that do not exist.
    #[error(
        "variant '{variant}' requests unknown default rules '{rules}'. Expected one of: proguard-android.txt, proguard-android-optimize.txt"
    )]
    UnknownDefaultRules { variant: String, rules: String },

    /// Resource shrinking was enabled without code shrinking.
    #[error("variant '{variant}' enables shrink_resources without minify_enabled")]
    ShrinkResourcesWithoutMinify { variant: String },

    /// A manifest field is neither in the descriptor nor provided by the caller.
    #[error("manifest field `{field}` is not set in the descriptor and was not provided")]
    MissingManifestField { field: &'static str },

    /// The application ID is not a valid Java-style package name.
    #[error("application id '{application_id}' is invalid: {reason}")]
    InvalidApplicationId {
        application_id: String,
        reason: &'static str,
    },

    /// `min_sdk` is above `target_sdk`.
    #[error("min_sdk {min_sdk} is greater than target_sdk {target_sdk}")]
    InvalidSdkRange { min_sdk: u32, target_sdk: u32 },

    /// `target_sdk` is above `compile_sdk`.
    #[error("target_sdk {target_sdk} is greater than compile_sdk {compile_sdk}")]
    TargetAboveCompileSdk { target_sdk: u32, compile_sdk: u32 },

    /// `version_code` is zero.
    #[error("version_code must be positive, got {version_code}")]
    InvalidVersionCode { version_code: u32 },
}

impl ResolveError {
    /// Returns the variant this error concerns, if it is variant-specific.
    pub fn variant(&self) -> Option<&str> {
        match self {
            ResolveError::DuplicateVariant { variant, .. }
            | ResolveError::MissingSigningIdentity { variant }
            | ResolveError::UnknownSigningIdentity { variant, .. }
            | ResolveError::IncompleteSigningIdentity { variant, .. }
            | ResolveError::UnresolvedSecret { variant, .. }
            | ResolveError::UnknownDefaultRules { variant, .. }
            | ResolveError::ShrinkResourcesWithoutMinify { variant } => Some(variant),
            _ => None,
        }
    }
}

/// Keystore credentials used to sign a package.
///
/// The resolver checks that every field is non-empty; it never touches the
/// keystore file itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningIdentity {
    pub store_path: PathBuf,
    pub store_password: SecretString,
    pub key_alias: String,
    pub key_password: SecretString,
}

impl SigningIdentity {
    /// Android's debug keystore identity, stored at `store_path`.
    pub fn android_debug(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            store_password: SecretString::new("android"),
            key_alias: "androiddebugkey".to_string(),
            key_password: SecretString::new("android"),
        }
    }

    /// Returns the names of all empty fields, in declaration order.
    ///
    /// Passwords that reference an unset variable are reported by
    /// [`SigningIdentity::unresolved_secrets`] instead.
    pub fn empty_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.store_path.as_os_str().is_empty() {
            fields.push("store_path");
        }
        if self.store_password.is_empty() && self.store_password.unresolved_var().is_none() {
            fields.push("store_password");
        }
        if self.key_alias.is_empty() {
            fields.push("key_alias");
        }
        if self.key_password.is_empty() && self.key_password.unresolved_var().is_none() {
            fields.push("key_password");
        }
        fields
    }

    /// Returns `(field, variable)` for every password whose environment
    /// variable was unset.
    pub fn unresolved_secrets(&self) -> Vec<(&'static str, &str)> {
        [
            ("store_password", &self.store_password),
            ("key_password", &self.key_password),
        ]
        .into_iter()
        .filter_map(|(field, secret)| secret.unresolved_var().map(|var| (field, var)))
        .collect()
    }
}

/// Rule files bundled with the shrinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefaultRules {
    #[serde(rename = "proguard-android.txt")]
    Android,
    #[serde(rename = "proguard-android-optimize.txt")]
    AndroidOptimize,
}

impl DefaultRules {
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "proguard-android.txt" => Some(DefaultRules::Android),
            "proguard-android-optimize.txt" => Some(DefaultRules::AndroidOptimize),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            DefaultRules::Android => "proguard-android.txt",
            DefaultRules::AndroidOptimize => "proguard-android-optimize.txt",
        }
    }
}

/// A variant as declared in the descriptor. Absent fields fall back to
/// [`VariantDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialVariantConfig {
    /// Variant name (e.g., "release"). Must be unique and non-empty.
    pub name: String,

    /// Name of the signing identity to use.
    pub signing: Option<String>,

    /// Whether code shrinking runs for this variant.
    pub minify_enabled: Option<bool>,

    /// Whether unused resources are removed. Requires `minify_enabled`.
    pub shrink_resources: Option<bool>,

    /// Whether the package is debuggable. Non-debuggable variants must be signed.
    pub debuggable: Option<bool>,

    /// Bundled rule file applied before `shrink_rule_files`.
    pub default_rules: Option<String>,

    /// Project rule files, in application order.
    pub shrink_rule_files: Option<Vec<String>>,

    /// Appended to the manifest version name (e.g., "-debug").
    pub version_name_suffix: Option<String>,
}

impl PartialVariantConfig {
    /// Creates a declaration with only a name; every other field falls back.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Fallback values for fields a variant leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantDefaults {
    pub signing: Option<String>,
    pub minify_enabled: bool,
    pub shrink_resources: bool,
    pub debuggable: bool,
    pub default_rules: Option<String>,
    pub shrink_rule_files: Vec<String>,
}

/// A signing identity attached to a resolved variant, with the name it was
/// declared under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSigning {
    pub name: String,
    #[serde(flatten)]
    pub identity: SigningIdentity,
}

/// A fully resolved variant. Every field is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantConfig {
    pub name: String,
    pub signing: Option<ResolvedSigning>,
    pub minify_enabled: bool,
    pub shrink_resources: bool,
    pub debuggable: bool,
    pub default_rules: Option<DefaultRules>,
    pub shrink_rule_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name_suffix: Option<String>,
}

/// Manifest metadata as declared in the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDecl {
    pub application_id: Option<String>,

    /// Code namespace. Defaults to the application ID.
    pub namespace: Option<String>,

    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,

    /// Defaults to `target_sdk`.
    pub compile_sdk: Option<u32>,

    pub version_code: Option<u32>,
    pub version_name: Option<String>,
    pub ndk_version: Option<String>,

    /// Java source/target compatibility and JVM target. Defaults to "11".
    pub java_version: Option<String>,
}

/// Values supplied by the SDK tool driving the build.
///
/// They fill manifest fields the descriptor leaves unset. Descriptor values
/// always win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvidedValues {
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    pub compile_sdk: Option<u32>,
    pub version_code: Option<u32>,
    pub version_name: Option<String>,
}

/// Manifest metadata with every required field resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedManifestMetadata {
    pub application_id: String,
    pub namespace: String,
    pub min_sdk: u32,
    pub target_sdk: u32,
    pub compile_sdk: u32,
    pub version_code: u32,
    pub version_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndk_version: Option<String>,
    pub java_version: String,
}

/// A complete packaging descriptor, ready to resolve.
#[derive(Debug, Clone, Default)]
pub struct BuildDescriptor {
    pub manifest: ManifestDecl,
    pub defaults: VariantDefaults,
    pub signing: BTreeMap<String, SigningIdentity>,
    pub variants: Vec<PartialVariantConfig>,
}

/// Result of resolving a whole descriptor.
///
/// Successes and failures are reported side by side. Maps are ordered by
/// name so that serializing the same resolution twice is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub manifest: Option<ResolvedManifestMetadata>,
    pub variants: BTreeMap<String, VariantConfig>,
    pub errors: Vec<ResolveError>,
}

impl Resolution {
    /// True when the manifest and every declared variant resolved.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_file_names() {
        for rules in [DefaultRules::Android, DefaultRules::AndroidOptimize] {
            assert_eq!(DefaultRules::from_file_name(rules.file_name()), Some(rules));
        }
        assert_eq!(DefaultRules::from_file_name("proguard-rules.pro"), None);
    }

    #[test]
    fn test_empty_fields_lists_every_gap() {
        let identity = SigningIdentity {
            store_path: PathBuf::new(),
            store_password: SecretString::new("x"),
            key_alias: String::new(),
            key_password: SecretString::new("y"),
        };
        assert_eq!(identity.empty_fields(), vec!["store_path", "key_alias"]);
        assert!(SigningIdentity::android_debug("debug.keystore")
            .empty_fields()
            .is_empty());
    }

    #[test]
    fn test_unresolved_secrets_are_not_empty_fields() {
        let identity = SigningIdentity {
            store_password: SecretString::missing_env("KEYSTORE_PASSWORD"),
            ..SigningIdentity::android_debug("upload.jks")
        };
        assert!(identity.empty_fields().is_empty());
        assert_eq!(
            identity.unresolved_secrets(),
            vec![("store_password", "KEYSTORE_PASSWORD")]
        );
    }

    #[test]
    fn test_misspelled_fields_are_rejected() {
        let err = serde_json::from_str::<PartialVariantConfig>(
            r#"{"name": "release", "minify_enable": true}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("minify_enable"));

        assert!(serde_json::from_str::<VariantDefaults>(r#"{"debugable": true}"#).is_err());
        assert!(serde_json::from_str::<VariantDefaults>(r#"{"debuggable": true}"#).is_ok());
    }

    #[test]
    fn test_error_messages_name_the_variant() {
        let err = ResolveError::MissingSigningIdentity {
            variant: "release".into(),
        };
        assert_eq!(err.variant(), Some("release"));
        assert!(err.to_string().contains("'release'"));

        let err = ResolveError::InvalidSdkRange {
            min_sdk: 30,
            target_sdk: 23,
        };
        assert_eq!(err.variant(), None);
        assert_eq!(err.to_string(), "min_sdk 30 is greater than target_sdk 23");
    }

    #[test]
    fn test_errors_serialize_with_kind_tag() {
        let err = ResolveError::DuplicateVariant {
            variant: "release".into(),
            count: 2,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "duplicate_variant");
        assert_eq!(json["variant"], "release");
        assert_eq!(json["count"], 2);
    }
}
