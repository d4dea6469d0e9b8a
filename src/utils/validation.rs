use anyhow::{Result, anyhow};
use std::fmt;
use std::path::{Component, Path};

#[derive(Debug)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A stored name must be exactly one normal path component so it can never
/// resolve outside the upload directory.
pub fn validate_stored_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_NAME",
            message: "File name cannot be empty".to_string(),
        }));
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(anyhow!(ValidationError {
            code: "INVALID_NAME",
            message: "File name cannot contain path separators".to_string(),
        }));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(anyhow!(ValidationError {
                code: "INVALID_NAME",
                message: format!("'{}' is not a plain file name", name),
            }));
        }
    }

    if name.ends_with(".part") {
        return Err(anyhow!(ValidationError {
            code: "INVALID_NAME",
            message: "Incomplete uploads cannot be read".to_string(),
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_names() {
        assert!(validate_stored_name("9f86d081884c7d659a2feaa0c55ad015").is_ok());
        assert!(validate_stored_name("clip.mp4").is_ok());
    }

    #[test]
    fn rejects_traversal_and_empty() {
        for bad in ["", ".", "..", "../secret", "a/b", "a\\b", "/etc/passwd", "x.part"] {
            assert!(validate_stored_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
