use crate::consts::MACHINE_BOILERPLATE_REGEX;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;

/// Human-readable description of a machine configuration file.
///
/// Taken from the `#@DESCRIPTION:` header comment, falling back to `#@NAME:`,
/// with the usual "Machine configuration for the ..." lead-in removed.
pub fn machine_description(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
    Ok(describe(&String::from_utf8_lossy(&bytes)))
}

fn describe(content: &str) -> String {
    let mut description = String::new();
    for line in content.lines() {
        if let Some(name) = line.strip_prefix("#@NAME:") {
            description = name.trim().to_string();
        }
        if let Some(desc) = line.strip_prefix("#@DESCRIPTION:") {
            description = MACHINE_BOILERPLATE_REGEX.replace(desc.trim(), "").trim().to_string();
            break;
        }
    }
    description
}
