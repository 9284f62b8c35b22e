//! Variant resolution
//!
//! Turns declared variants into fully populated [`VariantConfig`]s. Each
//! variant resolves all-or-nothing, and failures are collected next to the
//! successes instead of aborting the whole descriptor.

use crate::manifest::resolve_manifest;
use crate::types::{
    BuildDescriptor, DEBUG_VARIANT, DefaultRules, PartialVariantConfig, ProvidedValues,
    Resolution, ResolveError, ResolvedSigning, SigningIdentity, VariantConfig, VariantDefaults,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Named signing identities available to variants.
#[derive(Debug, Clone, Default)]
pub struct SigningCatalog {
    identities: BTreeMap<String, SigningIdentity>,
}

impl SigningCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identity, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        identity: SigningIdentity,
    ) -> Option<SigningIdentity> {
        self.identities.insert(name.into(), identity)
    }

    /// Registers Android's debug identity under `debug`, unless an identity
    /// with that name is already declared.
    pub fn with_debug_identity(mut self, keystore: &Path) -> Self {
        self.identities
            .entry(DEBUG_VARIANT.to_string())
            .or_insert_with(|| SigningIdentity::android_debug(keystore));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SigningIdentity> {
        self.identities.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identities.keys().map(String::as_str)
    }
}

impl FromIterator<(String, SigningIdentity)> for SigningCatalog {
    fn from_iter<I: IntoIterator<Item = (String, SigningIdentity)>>(iter: I) -> Self {
        Self {
            identities: iter.into_iter().collect(),
        }
    }
}

/// Output of [`resolve`]: resolved variants and per-variant failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantResolution {
    pub variants: BTreeMap<String, VariantConfig>,
    pub errors: Vec<ResolveError>,
}

/// Resolves every declared variant against `defaults` and `catalog`.
///
/// Declarations are taken as an ordered list so that duplicates are visible.
/// A duplicated name yields a single [`ResolveError::DuplicateVariant`] and
/// no resolved entry; every other variant still resolves.
pub fn resolve(
    declared: &[PartialVariantConfig],
    defaults: &VariantDefaults,
    catalog: &SigningCatalog,
) -> VariantResolution {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for variant in declared {
        *counts.entry(variant.name.as_str()).or_default() += 1;
    }

    let mut resolution = VariantResolution::default();
    for (index, variant) in declared.iter().enumerate() {
        if variant.name.trim().is_empty() {
            resolution
                .errors
                .push(ResolveError::EmptyVariantName { index });
            continue;
        }

        let count = counts[variant.name.as_str()];
        if count > 1 {
            let first = declared[..index].iter().all(|v| v.name != variant.name);
            if first {
                resolution.errors.push(ResolveError::DuplicateVariant {
                    variant: variant.name.clone(),
                    count,
                });
            }
            continue;
        }

        match resolve_variant(variant, defaults, catalog) {
            Ok(config) => {
                resolution.variants.insert(config.name.clone(), config);
            }
            Err(errors) => resolution.errors.extend(errors),
        }
    }

    resolution
}

/// Resolves one variant. Either every field is populated or the variant's
/// errors are returned.
pub fn resolve_variant(
    declared: &PartialVariantConfig,
    defaults: &VariantDefaults,
    catalog: &SigningCatalog,
) -> Result<VariantConfig, Vec<ResolveError>> {
    let name = declared.name.clone();
    let mut errors = Vec::new();

    // Android's built-in debug build type is debuggable unless told otherwise.
    let debuggable = declared
        .debuggable
        .unwrap_or_else(|| name == DEBUG_VARIANT || defaults.debuggable);
    let minify_enabled = declared.minify_enabled.unwrap_or(defaults.minify_enabled);
    let shrink_resources = declared
        .shrink_resources
        .unwrap_or(defaults.shrink_resources);
    if shrink_resources && !minify_enabled {
        errors.push(ResolveError::ShrinkResourcesWithoutMinify {
            variant: name.clone(),
        });
    }

    let default_rules = match declared
        .default_rules
        .as_deref()
        .or(defaults.default_rules.as_deref())
    {
        Some(rules) => match DefaultRules::from_file_name(rules) {
            Some(parsed) => Some(parsed),
            None => {
                errors.push(ResolveError::UnknownDefaultRules {
                    variant: name.clone(),
                    rules: rules.to_string(),
                });
                None
            }
        },
        None => None,
    };

    let signing = match declared.signing.as_deref().or(defaults.signing.as_deref()) {
        Some(identity_name) => match catalog.get(identity_name) {
            Some(identity) => {
                for field in identity.empty_fields() {
                    errors.push(ResolveError::IncompleteSigningIdentity {
                        variant: name.clone(),
                        identity: identity_name.to_string(),
                        field,
                    });
                }
                for (field, var) in identity.unresolved_secrets() {
                    errors.push(ResolveError::UnresolvedSecret {
                        variant: name.clone(),
                        identity: identity_name.to_string(),
                        field,
                        var: var.to_string(),
                    });
                }
                Some(ResolvedSigning {
                    name: identity_name.to_string(),
                    identity: identity.clone(),
                })
            }
            None => {
                errors.push(ResolveError::UnknownSigningIdentity {
                    variant: name.clone(),
                    identity: identity_name.to_string(),
                });
                None
            }
        },
        None if !debuggable => {
            errors.push(ResolveError::MissingSigningIdentity {
                variant: name.clone(),
            });
            None
        }
        None => None,
    };

    if !errors.is_empty() {
        debug!(variant = %name, errors = errors.len(), "variant failed to resolve");
        return Err(errors);
    }

    let shrink_rule_files = declared
        .shrink_rule_files
        .clone()
        .unwrap_or_else(|| defaults.shrink_rule_files.clone());

    debug!(
        variant = %name,
        debuggable,
        minify_enabled,
        shrink_resources,
        signing = signing.as_ref().map(|s| s.name.as_str()).unwrap_or("none"),
        "resolved variant"
    );

    Ok(VariantConfig {
        name,
        signing,
        minify_enabled,
        shrink_resources,
        debuggable,
        default_rules,
        shrink_rule_files,
        version_name_suffix: declared.version_name_suffix.clone(),
    })
}

/// Resolves a whole descriptor: manifest metadata and every variant.
///
/// `provided` carries the values the SDK tool supplies (target SDK, version
/// code and name). `debug_keystore` is where Android's debug keystore lives;
/// it backs the built-in `debug` signing identity.
pub fn resolve_build(
    descriptor: &BuildDescriptor,
    provided: &ProvidedValues,
    debug_keystore: &Path,
) -> Resolution {
    let mut errors = Vec::new();

    let manifest = match resolve_manifest(&descriptor.manifest, provided) {
        Ok(manifest) => Some(manifest),
        Err(manifest_errors) => {
            errors.extend(manifest_errors);
            None
        }
    };

    let catalog: SigningCatalog = descriptor
        .signing
        .iter()
        .map(|(name, identity)| (name.clone(), identity.clone()))
        .collect();
    let catalog = catalog.with_debug_identity(debug_keystore);

    let variants = resolve(&descriptor.variants, &descriptor.defaults, &catalog);
    errors.extend(variants.errors);

    info!(
        resolved = variants.variants.len(),
        failed = errors.len(),
        "descriptor resolved"
    );

    Resolution {
        manifest,
        variants: variants.variants,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretString;
    use crate::types::ManifestDecl;
    use std::path::PathBuf;

    fn upload_identity() -> SigningIdentity {
        SigningIdentity {
            store_path: PathBuf::from("upload-keystore.jks"),
            store_password: SecretString::new("boomverse@123"),
            key_alias: "upload".into(),
            key_password: SecretString::new("boomverse@123"),
        }
    }

    fn catalog() -> SigningCatalog {
        let mut catalog = SigningCatalog::new();
        catalog.insert("release", upload_identity());
        catalog.with_debug_identity(Path::new("/home/dev/.android/debug.keystore"))
    }

    fn release() -> PartialVariantConfig {
        PartialVariantConfig {
            signing: Some("release".into()),
            minify_enabled: Some(true),
            default_rules: Some("proguard-android-optimize.txt".into()),
            shrink_rule_files: Some(vec!["proguard-rules.pro".into()]),
            ..PartialVariantConfig::named("release")
        }
    }

    fn debug() -> PartialVariantConfig {
        PartialVariantConfig {
            signing: Some("debug".into()),
            minify_enabled: Some(false),
            ..PartialVariantConfig::named("debug")
        }
    }

    #[test]
    fn test_one_entry_per_declared_name() {
        let declared = vec![release(), debug(), PartialVariantConfig::named("staging")];
        let defaults = VariantDefaults {
            signing: Some("release".into()),
            ..VariantDefaults::default()
        };
        let result = resolve(&declared, &defaults, &catalog());
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            result.variants.keys().collect::<Vec<_>>(),
            vec!["debug", "release", "staging"]
        );
    }

    #[test]
    fn test_release_variant_resolves_fully() {
        let result = resolve(&[release()], &VariantDefaults::default(), &catalog());
        let config = &result.variants["release"];
        assert!(config.minify_enabled);
        assert!(!config.debuggable);
        assert_eq!(config.default_rules, Some(DefaultRules::AndroidOptimize));
        assert_eq!(config.shrink_rule_files, vec!["proguard-rules.pro"]);
        let signing = config.signing.as_ref().unwrap();
        assert_eq!(signing.name, "release");
        assert_eq!(signing.identity.key_alias, "upload");
    }

    #[test]
    fn test_default_signing_identity_used_unchanged() {
        let defaults = VariantDefaults {
            signing: Some("release".into()),
            ..VariantDefaults::default()
        };
        let result = resolve(
            &[PartialVariantConfig::named("beta")],
            &defaults,
            &catalog(),
        );
        let signing = result.variants["beta"].signing.as_ref().unwrap();
        assert_eq!(signing.identity, upload_identity());
    }

    #[test]
    fn test_minify_without_rule_files_resolves_empty() {
        let declared = PartialVariantConfig {
            minify_enabled: Some(true),
            signing: Some("release".into()),
            ..PartialVariantConfig::named("release")
        };
        let result = resolve(&[declared], &VariantDefaults::default(), &catalog());
        let config = &result.variants["release"];
        assert!(config.minify_enabled);
        assert!(config.shrink_rule_files.is_empty());
        assert_eq!(config.default_rules, None);
    }

    #[test]
    fn test_duplicate_names_produce_no_entries() {
        let result = resolve(
            &[release(), release()],
            &VariantDefaults::default(),
            &catalog(),
        );
        assert!(result.variants.is_empty());
        assert_eq!(
            result.errors,
            vec![ResolveError::DuplicateVariant {
                variant: "release".into(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_duplicates_do_not_block_other_variants() {
        let result = resolve(
            &[release(), debug(), release()],
            &VariantDefaults::default(),
            &catalog(),
        );
        assert_eq!(result.variants.len(), 1);
        assert!(result.variants.contains_key("debug"));
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_release_without_signing_fails_others_resolve() {
        let unsigned = PartialVariantConfig {
            minify_enabled: Some(true),
            ..PartialVariantConfig::named("release")
        };
        let result = resolve(&[unsigned, debug()], &VariantDefaults::default(), &catalog());
        assert_eq!(
            result.errors,
            vec![ResolveError::MissingSigningIdentity {
                variant: "release".into()
            }]
        );
        assert!(result.variants.contains_key("debug"));
        assert!(!result.variants.contains_key("release"));
    }

    #[test]
    fn test_debug_variant_may_stay_unsigned() {
        let result = resolve(
            &[PartialVariantConfig::named("debug")],
            &VariantDefaults::default(),
            &catalog(),
        );
        let config = &result.variants["debug"];
        assert!(config.debuggable);
        assert!(config.signing.is_none());
    }

    #[test]
    fn test_builtin_debug_identity() {
        let result = resolve(&[debug()], &VariantDefaults::default(), &catalog());
        let signing = result.variants["debug"].signing.as_ref().unwrap();
        assert_eq!(signing.identity.key_alias, "androiddebugkey");
        assert_eq!(
            signing.identity.store_path,
            PathBuf::from("/home/dev/.android/debug.keystore")
        );
    }

    #[test]
    fn test_declared_debug_identity_is_not_replaced() {
        let mut catalog = SigningCatalog::new();
        catalog.insert("debug", upload_identity());
        let catalog = catalog.with_debug_identity(Path::new("ignored.keystore"));
        assert_eq!(catalog.get("debug"), Some(&upload_identity()));
    }

    #[test]
    fn test_unknown_and_incomplete_identities() {
        let mut catalog = catalog();
        catalog.insert(
            "broken",
            SigningIdentity {
                key_password: SecretString::new(""),
                ..upload_identity()
            },
        );
        let unknown = PartialVariantConfig {
            signing: Some("play".into()),
            ..PartialVariantConfig::named("release")
        };
        let broken = PartialVariantConfig {
            signing: Some("broken".into()),
            ..PartialVariantConfig::named("beta")
        };
        let result = resolve(&[unknown, broken], &VariantDefaults::default(), &catalog);
        assert!(result.variants.is_empty());
        assert_eq!(
            result.errors,
            vec![
                ResolveError::UnknownSigningIdentity {
                    variant: "release".into(),
                    identity: "play".into()
                },
                ResolveError::IncompleteSigningIdentity {
                    variant: "beta".into(),
                    identity: "broken".into(),
                    field: "key_password"
                },
            ]
        );
    }

    #[test]
    fn test_unset_secret_fails_only_its_users() {
        let mut catalog = catalog();
        catalog.insert(
            "release",
            SigningIdentity {
                store_password: SecretString::missing_env("KEYSTORE_PASSWORD"),
                ..upload_identity()
            },
        );
        let result = resolve(&[release(), debug()], &VariantDefaults::default(), &catalog);
        assert!(result.variants.contains_key("debug"));
        assert!(!result.variants.contains_key("release"));
        assert_eq!(
            result.errors,
            vec![ResolveError::UnresolvedSecret {
                variant: "release".into(),
                identity: "release".into(),
                field: "store_password",
                var: "KEYSTORE_PASSWORD".into(),
            }]
        );
    }

    #[test]
    fn test_rule_validation() {
        let bad_rules = PartialVariantConfig {
            default_rules: Some("proguard-custom.txt".into()),
            ..debug()
        };
        let shrink_only = PartialVariantConfig {
            shrink_resources: Some(true),
            ..PartialVariantConfig::named("qa")
        };
        let defaults = VariantDefaults {
            debuggable: true,
            ..VariantDefaults::default()
        };
        let result = resolve(&[bad_rules, shrink_only], &defaults, &catalog());
        assert!(result.variants.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(
            result.errors[0],
            ResolveError::UnknownDefaultRules { .. }
        ));
        assert!(matches!(
            result.errors[1],
            ResolveError::ShrinkResourcesWithoutMinify { .. }
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = resolve(
            &[PartialVariantConfig::named(""), debug()],
            &VariantDefaults::default(),
            &catalog(),
        );
        assert_eq!(result.errors, vec![ResolveError::EmptyVariantName { index: 0 }]);
        assert_eq!(result.variants.len(), 1);
    }

    fn descriptor() -> BuildDescriptor {
        BuildDescriptor {
            manifest: ManifestDecl {
                application_id: Some("com.ext.boomverse".into()),
                min_sdk: Some(23),
                ..ManifestDecl::default()
            },
            defaults: VariantDefaults::default(),
            signing: [("release".to_string(), upload_identity())].into(),
            variants: vec![release(), debug()],
        }
    }

    fn provided(target_sdk: u32) -> ProvidedValues {
        ProvidedValues {
            target_sdk: Some(target_sdk),
            version_code: Some(1),
            version_name: Some("1.0.0".into()),
            ..ProvidedValues::default()
        }
    }

    #[test]
    fn test_resolve_build_succeeds() {
        let resolution = resolve_build(
            &descriptor(),
            &provided(34),
            Path::new("debug.keystore"),
        );
        assert!(resolution.is_success(), "{:?}", resolution.errors);
        assert_eq!(resolution.manifest.as_ref().unwrap().target_sdk, 34);
        assert_eq!(resolution.variants.len(), 2);
    }

    #[test]
    fn test_manifest_failure_keeps_variants() {
        let mut descriptor = descriptor();
        descriptor.manifest.min_sdk = Some(30);
        let resolution = resolve_build(&descriptor, &provided(23), Path::new("debug.keystore"));
        assert!(!resolution.is_success());
        assert!(resolution.manifest.is_none());
        assert_eq!(resolution.variants.len(), 2);
        assert_eq!(
            resolution.errors,
            vec![ResolveError::InvalidSdkRange {
                min_sdk: 30,
                target_sdk: 23
            }]
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let first = resolve_build(&descriptor(), &provided(34), Path::new("debug.keystore"));
        let second = resolve_build(&descriptor(), &provided(34), Path::new("debug.keystore"));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_serialized_resolution_hides_passwords() {
        let resolution = resolve_build(&descriptor(), &provided(34), Path::new("debug.keystore"));
        let json = serde_json::to_string(&resolution).unwrap();
        assert!(!json.contains("boomverse@123"));
        assert!(!json.contains("\"android\""));
        assert!(json.contains("<redacted>"));
    }
}
