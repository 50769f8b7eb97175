// Schema registry assembly from serialized FileDescriptorSet files.

use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use prost_reflect::DescriptorPool;

use crate::CliError;

/// Decode every set in `paths` into one pool, in order.
///
/// Sets may share files (a common import in each); identical duplicates are
/// accepted, conflicting ones are not.
pub fn load(paths: &[PathBuf]) -> Result<DescriptorPool, CliError> {
    let mut pool = DescriptorPool::new();
    for path in paths {
        let bytes = fs::read(path).map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))?;
        pool.decode_file_descriptor_set(bytes.as_slice())
            .map_err(|e| {
                CliError::descriptor(format!("{}: {}", path.display(), e))
                    .with_hint("descriptor sets are made with `protoc --include_imports -o <file>`")
            })?;
        debug!("loaded descriptor set {}", path.display());
    }
    info!(
        "registry: {} files, {} message types",
        pool.files().count(),
        pool.all_messages().count()
    );
    Ok(pool)
}

/// Message type names in the registry, sorted, without synthesized map
/// entry types. `prefix` narrows to names starting with it.
pub fn message_names(pool: &DescriptorPool, prefix: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = pool
        .all_messages()
        .filter(|m| !m.is_map_entry())
        .map(|m| m.full_name().to_string())
        .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
        .collect();
    names.sort();
    names
}
