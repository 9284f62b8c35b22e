//! Build-variant resolution for Android packaging descriptors
//!
//! `buildvariant-core` turns a declarative packaging descriptor (application
//! ID, SDK levels, signing identities and per-variant shrinking options) into
//! a fully resolved configuration per build variant, and from there into the
//! packaging steps a build tool runs.
//!
//! Everything here is a pure function of its inputs: no filesystem, network
//! or environment access. Values the surrounding SDK tool supplies (target
//! SDK, version code and name) are passed in as [`ProvidedValues`].
//!
//! # Example
//!
//! ```
//! use buildvariant_core::{
//!     BuildDescriptor, ManifestDecl, PartialVariantConfig, ProvidedValues, resolve_build,
//! };
//! use std::path::Path;
//!
//! let descriptor = BuildDescriptor {
//!     manifest: ManifestDecl {
//!         application_id: Some("com.example.app".into()),
//!         min_sdk: Some(23),
//!         ..ManifestDecl::default()
//!     },
//!     variants: vec![PartialVariantConfig {
//!         signing: Some("debug".into()),
//!         ..PartialVariantConfig::named("debug")
//!     }],
//!     ..BuildDescriptor::default()
//! };
//! let provided = ProvidedValues {
//!     target_sdk: Some(34),
//!     version_code: Some(1),
//!     version_name: Some("1.0.0".into()),
//!     ..ProvidedValues::default()
//! };
//!
//! let resolution = resolve_build(&descriptor, &provided, Path::new("debug.keystore"));
//! assert!(resolution.is_success());
//! assert!(resolution.variants["debug"].debuggable);
//! ```
//!
//! # Modules
//!
//! - [`resolver`] - Variant resolution and the whole-descriptor entry point
//! - [`manifest`] - Manifest metadata resolution and validation
//! - [`plan`] - Packaging steps derived from a resolution
//! - [`secret`] - Redacting wrapper for passwords
//! - [`types`] - Shared data model and [`ResolveError`]

pub mod manifest;
pub mod plan;
pub mod resolver;
pub mod secret;
pub mod types;

pub use manifest::{resolve_manifest, validate_application_id};
pub use plan::{PackagingStep, plan, plan_variant};
pub use resolver::{SigningCatalog, VariantResolution, resolve, resolve_build, resolve_variant};
pub use secret::{SecretSource, SecretString};
pub use types::{
    BuildDescriptor, DEBUG_VARIANT, DefaultRules, ManifestDecl, PartialVariantConfig,
    ProvidedValues, Resolution, ResolveError, ResolvedManifestMetadata, ResolvedSigning,
    SigningIdentity, VariantConfig, VariantDefaults,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
