//! Project manifest validation
//!
//! Checks what can be decided from the manifest alone: names, reference
//! syntax and the variant hierarchy. Graph-level rules (layer cycles,
//! dangling references, cross-variant direction) are enforced when the
//! manifest is lowered into a layer graph.

use crate::manifest::{BundleDecl, LibrarySetDecl, ProjectManifest, VariantDecl};
use std::collections::HashSet;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid project name format
    InvalidProjectName(String),
    /// Empty or malformed version
    InvalidVersion(String),
    /// Invalid variant, layer, library set or bundle name
    InvalidName { kind: &'static str, name: String },
    /// Variant parent is not declared
    UnknownParent { variant: String, parent: String },
    /// Variant parent chain loops
    ParentCycle(String),
    /// Reference is not `name` or `variant:name`
    InvalidReference { context: String, reference: String },
    /// Invalid bundle specification
    InvalidBundle { name: String, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidProjectName(name) => {
                write!(f, "Invalid project name: {}", name)
            }
            ValidationError::InvalidVersion(version) => {
                write!(f, "Invalid version: {}", version)
            }
            ValidationError::InvalidName { kind, name } => {
                write!(f, "Invalid {} name: '{}'", kind, name)
            }
            ValidationError::UnknownParent { variant, parent } => {
                write!(f, "Variant '{}' has unknown parent '{}'", variant, parent)
            }
            ValidationError::ParentCycle(cycle) => {
                write!(f, "Variant parent cycle: {}", cycle)
            }
            ValidationError::InvalidReference { context, reference } => {
                write!(f, "Invalid reference '{}' in {}", reference, context)
            }
            ValidationError::InvalidBundle { name, reason } => {
                write!(f, "Invalid bundle '{}': {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Project manifest validator
pub struct Validator;

impl Validator {
    /// Validate a project manifest, collecting every problem
    pub fn validate(manifest: &ProjectManifest) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_project_name(&manifest.project.name) {
            errors.push(e);
        }
        if manifest.project.version.trim().is_empty()
            || manifest.project.version.chars().any(char::is_whitespace)
        {
            errors.push(ValidationError::InvalidVersion(
                manifest.project.version.clone(),
            ));
        }

        errors.extend(Self::validate_variant_hierarchy(manifest));

        for (variant_name, variant) in &manifest.variants {
            errors.extend(Self::validate_variant(variant_name, variant));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate project name format
    pub fn validate_project_name(name: &str) -> Result<(), ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::InvalidProjectName(
                "Project name cannot be empty".to_string(),
            ));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::InvalidProjectName(format!(
                "'{}' contains invalid characters (only letters, digits, -, _, . allowed)",
                name
            )));
        }

        if name.starts_with(['-', '.']) {
            return Err(ValidationError::InvalidProjectName(format!(
                "'{}' cannot start with - or .",
                name
            )));
        }

        Ok(())
    }

    /// A declared name must be non-empty and free of reference separators
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains([':', '/', '\\'])
            && !name.chars().any(char::is_whitespace)
    }

    /// A reference is `name` or `variant:name`
    pub fn is_valid_reference(reference: &str) -> bool {
        match reference.split_once(':') {
            Some((variant, name)) => Self::is_valid_name(variant) && Self::is_valid_name(name),
            None => Self::is_valid_name(reference),
        }
    }

    fn validate_variant_hierarchy(manifest: &ProjectManifest) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (name, variant) in &manifest.variants {
            if !Self::is_valid_name(name) {
                errors.push(ValidationError::InvalidName {
                    kind: "variant",
                    name: name.clone(),
                });
            }
            if let Some(parent) = &variant.parent {
                if !manifest.variants.contains_key(parent) {
                    errors.push(ValidationError::UnknownParent {
                        variant: name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        // Walk each parent chain; revisiting a variant means the chain loops
        let mut reported: HashSet<String> = HashSet::new();
        for start in manifest.variants.keys() {
            let mut chain = vec![start.clone()];
            let mut current = start.as_str();
            while let Some(parent) = manifest
                .variants
                .get(current)
                .and_then(|v| v.parent.as_deref())
            {
                if let Some(pos) = chain.iter().position(|v| v == parent) {
                    let mut cycle: Vec<String> = chain[pos..].to_vec();
                    cycle.push(parent.to_string());
                    let mut key: Vec<String> = chain[pos..].to_vec();
                    key.sort();
                    if reported.insert(key.join(",")) {
                        errors.push(ValidationError::ParentCycle(cycle.join(" -> ")));
                    }
                    break;
                }
                chain.push(parent.to_string());
                current = parent;
            }
        }

        errors
    }

    fn validate_variant(variant_name: &str, variant: &VariantDecl) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut check_refs = |context: String, refs: &[String]| {
            for reference in refs {
                if !Self::is_valid_reference(reference) {
                    errors.push(ValidationError::InvalidReference {
                        context: context.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        };

        for (name, layer) in &variant.layers {
            let context = format!("layer '{}:{}'", variant_name, name);
            check_refs(context.clone(), &layer.outputs);
            check_refs(context.clone(), &layer.runtime_outputs);
            check_refs(context.clone(), &layer.libraries);
            check_refs(context, &layer.runtime_libraries);
        }

        for (name, set) in &variant.libraries {
            let context = format!("library set '{}:{}'", variant_name, name);
            check_refs(context.clone(), &set.extends);
            if let Some(derive) = &set.derive {
                check_refs(context.clone(), std::slice::from_ref(&derive.from));
                check_refs(context, &derive.provided);
            }
        }

        for (name, bundle) in &variant.bundles {
            let context = format!("bundle '{}:{}'", variant_name, name);
            let layer_refs: Vec<String> =
                bundle.layers.iter().map(|l| l.layer().to_string()).collect();
            check_refs(context.clone(), &layer_refs);
            check_refs(context.clone(), &bundle.shade);
            check_refs(context.clone(), &bundle.exclude_libraries);
            check_refs(context.clone(), &bundle.inline);
            let nested: Vec<String> = bundle.nest.iter().map(|n| n.bundle.clone()).collect();
            check_refs(context.clone(), &nested);
            if let Some(from) = &bundle.manifest_from {
                check_refs(context.clone(), std::slice::from_ref(from));
            }
            if let Some(index) = &bundle.dependency_index {
                for sets in index.sections.values() {
                    check_refs(context.clone(), sets);
                }
                check_refs(context, &index.exclude);
            }
        }

        for (kind, names) in [
            ("layer", variant.layers.keys().collect::<Vec<_>>()),
            ("library set", variant.libraries.keys().collect()),
            ("bundle", variant.bundles.keys().collect()),
        ] {
            for name in names {
                if !Self::is_valid_name(name) {
                    errors.push(ValidationError::InvalidName {
                        kind,
                        name: format!("{}:{}", variant_name, name),
                    });
                }
            }
        }

        for (name, set) in &variant.libraries {
            errors.extend(Self::validate_library_set(variant_name, name, set));
        }

        for (name, bundle) in &variant.bundles {
            errors.extend(Self::validate_bundle(variant_name, name, bundle));
        }

        errors
    }

    fn validate_library_set(
        variant_name: &str,
        name: &str,
        set: &LibrarySetDecl,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if set.derive.is_some() && (!set.artifacts.is_empty() || !set.extends.is_empty()) {
            errors.push(ValidationError::InvalidReference {
                context: format!("library set '{}:{}'", variant_name, name),
                reference: "derive cannot be combined with artifacts or extends".to_string(),
            });
        }
        errors
    }

    fn validate_bundle(variant_name: &str, name: &str, bundle: &BundleDecl) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let full_name = format!("{}:{}", variant_name, name);

        let bad = |errors: &mut Vec<ValidationError>, reason: String| {
            errors.push(ValidationError::InvalidBundle {
                name: full_name.clone(),
                reason,
            });
        };

        if let Some(file_name) = &bundle.file_name {
            if file_name.is_empty() || file_name.contains(['/', '\\']) {
                bad(&mut errors, format!("file_name '{}' must be a plain file name", file_name));
            }
        }
        if let Some(classifier) = &bundle.classifier {
            if !Self::is_valid_name(classifier) {
                bad(&mut errors, format!("classifier '{}' is not a valid name", classifier));
            }
        }

        for source in &bundle.layers {
            if let Some(prefix) = source.prefix() {
                if !is_relative_archive_path(prefix) {
                    bad(&mut errors, format!("layer prefix '{}' must be a relative path", prefix));
                }
            }
        }
        for nest in &bundle.nest {
            if !nest.into.is_empty() && !is_relative_archive_path(&nest.into) {
                bad(&mut errors, format!("nest directory '{}' must be a relative path", nest.into));
            }
        }
        for rename in &bundle.rename {
            if rename.pattern.is_empty() {
                bad(&mut errors, "rename pattern cannot be empty".to_string());
            }
        }
        if let Some(index) = &bundle.dependency_index {
            if !is_relative_archive_path(&index.path) || index.path.ends_with('/') {
                bad(&mut errors, format!("dependency index path '{}' must be a relative file path", index.path));
            }
            if index.sections.is_empty() {
                bad(&mut errors, "dependency index needs at least one section".to_string());
            }
        }

        errors
    }
}

/// Archive paths are `/`-separated, relative and never climb out of the root
fn is_relative_archive_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path.split('/').all(|segment| segment != "..")
}
