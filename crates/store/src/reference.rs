use crate::ReferenceError;

/// Durable pointer to stored content, as published in catalog items.
///
/// The relay never invents references; it only resolves paths that parse to
/// the publication shape `{dataset}/{filename}` (two or more non-empty
/// segments, no dot-segments, a conservative character set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
}

impl ObjectReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ObjectReference {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a published asset path into a reference against `bucket`.
    pub fn parse(bucket: &str, path: &str) -> Result<Self, ReferenceError> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(ReferenceError::Invalid("empty path"));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() < 2 {
            return Err(ReferenceError::Invalid("expected dataset/filename"));
        }

        for segment in &segments {
            if segment.is_empty() {
                return Err(ReferenceError::Invalid("empty path segment"));
            }
            if *segment == "." || *segment == ".." {
                return Err(ReferenceError::Invalid("dot segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'))
            {
                return Err(ReferenceError::Invalid("unexpected character"));
            }
        }

        Ok(ObjectReference {
            bucket: bucket.to_string(),
            key: segments.join("/"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_published_shape() {
        let reference = ObjectReference::parse(
            "landsat",
            "landsat_ot_c2_l1/LC08_L1TP_192025_20240305_02_T1.tar",
        )
        .unwrap();
        assert_eq!(reference.bucket, "landsat");
        assert_eq!(
            reference.key,
            "landsat_ot_c2_l1/LC08_L1TP_192025_20240305_02_T1.tar"
        );
    }

    #[test]
    fn strips_leading_slash() {
        let reference = ObjectReference::parse("landsat", "/dataset/file.tar").unwrap();
        assert_eq!(reference.key, "dataset/file.tar");
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "",
            "/",
            "file.tar",
            "dataset//file.tar",
            "dataset/../secrets",
            "dataset/./file",
            "dataset/fi le.tar",
            "dataset/file.tar?x=1",
            "dataset\\file.tar",
        ] {
            assert!(
                ObjectReference::parse("landsat", path).is_err(),
                "path {path:?} should be rejected"
            );
        }
    }
}
