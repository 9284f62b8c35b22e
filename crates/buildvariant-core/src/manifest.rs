//! Manifest metadata resolution
//!
//! Merges the descriptor's manifest fields with values provided by the SDK
//! tool and validates the result.

use crate::types::{ManifestDecl, ProvidedValues, ResolveError, ResolvedManifestMetadata};
use tracing::debug;

/// Java version used when the descriptor does not set one.
pub const DEFAULT_JAVA_VERSION: &str = "11";

/// Resolves manifest metadata.
///
/// Descriptor values take precedence over `provided`. All problems are
/// collected; a missing field suppresses only the checks that depend on it.
pub fn resolve_manifest(
    decl: &ManifestDecl,
    provided: &ProvidedValues,
) -> Result<ResolvedManifestMetadata, Vec<ResolveError>> {
    let mut errors = Vec::new();

    let application_id = required(decl.application_id.clone(), "application_id", &mut errors);
    if let Some(id) = &application_id
        && let Err(reason) = validate_application_id(id)
    {
        errors.push(ResolveError::InvalidApplicationId {
            application_id: id.clone(),
            reason,
        });
    }

    let min_sdk = required(decl.min_sdk.or(provided.min_sdk), "min_sdk", &mut errors);
    let target_sdk = required(
        decl.target_sdk.or(provided.target_sdk),
        "target_sdk",
        &mut errors,
    );
    let compile_sdk = decl
        .compile_sdk
        .or(provided.compile_sdk)
        .or(target_sdk);
    let version_code = required(
        decl.version_code.or(provided.version_code),
        "version_code",
        &mut errors,
    );
    let version_name = required(
        decl.version_name
            .clone()
            .or_else(|| provided.version_name.clone()),
        "version_name",
        &mut errors,
    );

    if let (Some(min_sdk), Some(target_sdk)) = (min_sdk, target_sdk)
        && min_sdk > target_sdk
    {
        errors.push(ResolveError::InvalidSdkRange {
            min_sdk,
            target_sdk,
        });
    }
    if let (Some(target_sdk), Some(compile_sdk)) = (target_sdk, compile_sdk)
        && target_sdk > compile_sdk
    {
        errors.push(ResolveError::TargetAboveCompileSdk {
            target_sdk,
            compile_sdk,
        });
    }
    if version_code == Some(0) {
        errors.push(ResolveError::InvalidVersionCode { version_code: 0 });
    }

    match (
        application_id,
        min_sdk,
        target_sdk,
        compile_sdk,
        version_code,
        version_name,
    ) {
        (
            Some(application_id),
            Some(min_sdk),
            Some(target_sdk),
            Some(compile_sdk),
            Some(version_code),
            Some(version_name),
        ) if errors.is_empty() => {
            let namespace = decl
                .namespace
                .clone()
                .unwrap_or_else(|| application_id.clone());
            debug!(
                application_id = %application_id,
                min_sdk,
                target_sdk,
                compile_sdk,
                version_code,
                "resolved manifest metadata"
            );
            Ok(ResolvedManifestMetadata {
                application_id,
                namespace,
                min_sdk,
                target_sdk,
                compile_sdk,
                version_code,
                version_name,
                ndk_version: decl.ndk_version.clone(),
                java_version: decl
                    .java_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_JAVA_VERSION.to_string()),
            })
        }
        _ => Err(errors),
    }
}

fn required<T>(value: Option<T>, field: &'static str, errors: &mut Vec<ResolveError>) -> Option<T> {
    if value.is_none() {
        errors.push(ResolveError::MissingManifestField { field });
    }
    value
}

/// Checks that `id` is a dotted package name such as `com.example.app`.
///
/// Every segment must start with an ASCII letter and contain only ASCII
/// letters, digits or underscores; at least two segments are required.
pub fn validate_application_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("must not be empty");
    }
    let segments: Vec<&str> = id.split('.').collect();
    if segments.len() < 2 {
        return Err("must contain at least two dot-separated segments");
    }
    for segment in segments {
        let mut chars = segment.chars();
        match chars.next() {
            None => return Err("segments must not be empty"),
            Some(c) if !c.is_ascii_alphabetic() => {
                return Err("each segment must start with a letter");
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("segments may only contain letters, digits and underscores");
        }
    }
    Ok(())
}
