//! Descriptor file support for buildvariant.
//!
//! This module loads `buildvariant.toml` (or `buildvariant.yaml`) packaging
//! descriptors and converts them into the [`BuildDescriptor`] the resolver
//! consumes.
//!
//! ## Descriptor Location
//!
//! Without an explicit `--config` path the descriptor is searched for in:
//! 1. Current working directory
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Descriptor
//!
//! ```toml
//! application_id = "com.example.app"
//! min_sdk = 23
//!
//! [signing.release]
//! store_path = "upload-keystore.jks"
//! store_password = "${KEYSTORE_PASSWORD}"
//! key_alias = "upload"
//! key_password = "${KEY_PASSWORD}"
//!
//! [[variants]]
//! name = "release"
//! signing = "release"
//! minify_enabled = true
//! shrink_rule_files = ["proguard-rules.pro"]
//! ```
//!
//! ## Secrets
//!
//! Password fields written as `${NAME}` are read from environment variable
//! `NAME` at load time. Anything else is taken literally. An unset variable
//! is not a load error; it fails only the variants that sign with it.
//!
//! Password values are never echoed in parse errors: they must be quoted
//! strings, and TOML errors are reported without the offending source line.

use anyhow::{Context, Result, anyhow, bail};
use buildvariant_core::{
    BuildDescriptor, ManifestDecl, PartialVariantConfig, SecretString, SigningIdentity,
    VariantDefaults,
};
use serde::de::{self, Deserializer, IgnoredAny, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The default descriptor file name.
pub const CONFIG_FILE_NAME: &str = "buildvariant.toml";

/// Every file name discovery looks for, in order of preference.
pub const CONFIG_FILE_NAMES: &[&str] = &[CONFIG_FILE_NAME, "buildvariant.yaml", "buildvariant.yml"];

/// Root structure of a descriptor file.
///
/// Manifest fields live at the top level; variants, defaults and signing
/// identities live in their own sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DescriptorFile {
    /// Application ID, SDK levels and version values.
    #[serde(flatten)]
    pub manifest: ManifestDecl,

    /// Fallback values for fields a variant leaves unset.
    pub defaults: VariantDefaults,

    /// Signing identities, keyed by the name variants reference them with.
    pub signing: BTreeMap<String, SigningEntry>,

    /// Declared variants, in declaration order.
    pub variants: Vec<PartialVariantConfig>,

    /// Top-level keys no section claimed; reported as warnings on load.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

/// A signing identity as written in the descriptor.
///
/// Missing fields load as empty and are reported when a variant uses the
/// identity.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningEntry {
    pub store_path: PathBuf,
    #[serde(deserialize_with = "password")]
    pub store_password: String,
    pub key_alias: String,
    #[serde(deserialize_with = "password")]
    pub key_password: String,
}

const PASSWORD_NOT_A_STRING: &str = "passwords must be quoted strings";

/// Accepts only strings; the error for any other value never includes it.
fn password<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct PasswordVisitor;

    impl<'de> Visitor<'de> for PasswordVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a quoted string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_bool<E: de::Error>(self, _: bool) -> Result<String, E> {
            Err(E::custom(PASSWORD_NOT_A_STRING))
        }

        fn visit_i64<E: de::Error>(self, _: i64) -> Result<String, E> {
            Err(E::custom(PASSWORD_NOT_A_STRING))
        }

        fn visit_u64<E: de::Error>(self, _: u64) -> Result<String, E> {
            Err(E::custom(PASSWORD_NOT_A_STRING))
        }

        fn visit_f64<E: de::Error>(self, _: f64) -> Result<String, E> {
            Err(E::custom(PASSWORD_NOT_A_STRING))
        }
    }

    deserializer.deserialize_any(PasswordVisitor)
}

// Hand-written so raw passwords never reach a log line.
impl std::fmt::Debug for SigningEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningEntry")
            .field("store_path", &self.store_path)
            .field("key_alias", &self.key_alias)
            .finish_non_exhaustive()
    }
}

impl DescriptorFile {
    /// Loads a descriptor from the specified file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read descriptor file: {:?}", path))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let descriptor: DescriptorFile = if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse descriptor file: {:?}", path))?
        } else {
            parse_toml(&contents)
                .with_context(|| format!("Failed to parse descriptor file: {:?}", path))?
        };

        for key in descriptor.unknown.keys() {
            warn!(path = %path.display(), key = %key, "ignoring unknown descriptor key");
        }
        debug!(
            path = %path.display(),
            variants = descriptor.variants.len(),
            signing = descriptor.signing.len(),
            "loaded descriptor"
        );
        Ok(descriptor)
    }

    /// Attempts to find and load a descriptor from the current directory or
    /// any parent directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((descriptor, path)))` - Found and loaded descriptor with its path
    /// * `Ok(None)` - No descriptor found
    /// * `Err` - If a descriptor was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load a descriptor starting from `start_dir`.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            for name in CONFIG_FILE_NAMES {
                let config_path = current.join(name);
                if config_path.is_file() {
                    let descriptor = Self::load_from_file(&config_path)?;
                    return Ok(Some((descriptor, config_path)));
                }
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Converts the file into a [`BuildDescriptor`], expanding `${NAME}`
    /// secrets from the process environment.
    pub fn into_descriptor(self) -> Result<BuildDescriptor> {
        self.into_descriptor_with(|name| env::var(name).ok())
    }

    /// Like [`DescriptorFile::into_descriptor`], with an explicit variable lookup.
    pub fn into_descriptor_with<F>(self, lookup: F) -> Result<BuildDescriptor>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut signing = BTreeMap::new();
        for (name, entry) in self.signing {
            let store_password = expand_secret(&entry.store_password, &lookup)
                .with_context(|| format!("resolving store_password of signing identity '{name}'"))?;
            let key_password = expand_secret(&entry.key_password, &lookup)
                .with_context(|| format!("resolving key_password of signing identity '{name}'"))?;
            signing.insert(
                name,
                SigningIdentity {
                    store_path: entry.store_path,
                    store_password,
                    key_alias: entry.key_alias,
                    key_password,
                },
            );
        }

        Ok(BuildDescriptor {
            manifest: self.manifest,
            defaults: self.defaults,
            signing,
            variants: self.variants,
        })
    }

    /// Generates a starter descriptor as a formatted TOML string.
    ///
    /// The output mirrors a typical Flutter Android app: a signed, minified
    /// `release` variant and a `debug` variant using the debug keystore.
    pub fn generate_starter_toml(application_id: &str) -> String {
        format!(
            r#"# buildvariant descriptor
# Declares manifest metadata, signing identities and build variants.
# Values left out here can be supplied on the command line
# (--target-sdk, --compile-sdk, --version-code, --version-name).

# Application ID (also used as the namespace unless `namespace` is set)
application_id = "{application_id}"

# Minimum Android SDK version
min_sdk = 23

# target_sdk = 34
# compile_sdk = 34
# version_code = 1
# version_name = "1.0.0"
# ndk_version = "27.0.12077973"

# Java source/target compatibility (default: 11)
java_version = "11"

[defaults]
minify_enabled = false

# Passwords written as "${{NAME}}" are read from the environment
# (a .env file in the working directory is loaded first).
[signing.release]
store_path = "upload-keystore.jks"
store_password = "${{KEYSTORE_PASSWORD}}"
key_alias = "upload"
key_password = "${{KEY_PASSWORD}}"

[[variants]]
name = "release"
signing = "release"
minify_enabled = true
default_rules = "proguard-android-optimize.txt"
shrink_rule_files = ["proguard-rules.pro"]

# The built-in "debug" identity uses the Android debug keystore.
[[variants]]
name = "debug"
signing = "debug"
minify_enabled = false
"#,
            application_id = application_id,
        )
    }
}

/// Parses TOML, reporting errors by message and position only.
///
/// The parser's own rendering quotes the offending source line, which may be
/// a password.
fn parse_toml(contents: &str) -> Result<DescriptorFile> {
    toml::from_str(contents).map_err(|err| {
        let message = err.message().trim_end();
        match err.span() {
            Some(span) => {
                let (line, column) = line_column(contents, span.start);
                anyhow!("{message} at line {line}, column {column}")
            }
            None => anyhow!("{message}"),
        }
    })
}

/// One-based line and column of byte `offset`.
fn line_column(contents: &str, offset: usize) -> (usize, usize) {
    let before = &contents[..offset.min(contents.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Expands a `${NAME}` reference through `lookup`; other values are inline
/// secrets. An unset variable yields an unresolved secret.
pub fn expand_secret<F>(raw: &str, lookup: F) -> Result<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(var) = raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        if var.is_empty() {
            bail!("empty environment variable reference");
        }
        return Ok(match lookup(var) {
            Some(value) => SecretString::from_env(var, value),
            None => {
                debug!(var, "secret references unset environment variable");
                SecretString::missing_env(var)
            }
        });
    }
    Ok(SecretString::new(raw))
}
