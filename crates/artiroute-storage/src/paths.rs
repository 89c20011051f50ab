//! Canonical artifact paths.
//!
//! Every (category, backend) pair has exactly one configured root. An artifact
//! lives at `root/<file name>` on each backend, where the file name is a bare
//! basename. Paths are always forward-slash and lexically cleaned so the same
//! string is valid locally, over SFTP and on the cloud netdisk.

use artiroute_core::{ArtifactCategory, ArtifactPaths, StorageBackend, StorageRoots};

use crate::error::{StorageError, StorageResult};

/// Parse a free-text category into [`ArtifactCategory`].
pub fn normalize_category(input: &str) -> StorageResult<ArtifactCategory> {
    ArtifactCategory::from_label(input)
        .ok_or_else(|| StorageError::InvalidCategory(input.trim().to_string()))
}

/// Parse a free-text backend into [`StorageBackend`].
pub fn normalize_backend(input: &str) -> StorageResult<StorageBackend> {
    StorageBackend::from_label(input)
        .ok_or_else(|| StorageError::InvalidBackend(input.trim().to_string()))
}

/// Reduce a caller-supplied name to a safe basename.
///
/// Both `/` and `\` are treated as separators. Names that reduce to nothing,
/// `.` or `..` are rejected.
pub fn normalize_artifact_file_name(file_name: &str) -> StorageResult<String> {
    let trimmed = file_name.trim();
    let without_trailing = trimmed.trim_end_matches(['/', '\\']);
    let name = without_trailing
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::EmptyFileName(file_name.to_string()));
    }
    Ok(name.to_string())
}

/// Best-effort file name for a record that may only carry a legacy full path.
pub fn derive_file_name(file_name: &str, legacy_path: &str) -> Option<String> {
    if let Ok(name) = normalize_artifact_file_name(file_name) {
        return Some(name);
    }
    normalize_artifact_file_name(legacy_path).ok()
}

/// Replace everything except Unicode alphanumerics, `-`, `_` and `.` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c == '_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension of a basename including the dot. A bare trailing `.` is no extension.
fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => &name[idx..],
        _ => "",
    }
}

/// Deterministic stored name for an upload.
///
/// The base is the trimmed desired name, or the original stem when blank. After
/// sanitizing, the original extension is appended unless the base already ends
/// with it (ASCII case-insensitive). Same-named re-uploads map to the same name.
pub fn generate_stored_file_name(
    desired_base_name: &str,
    original_file_name: &str,
) -> StorageResult<String> {
    let original = normalize_artifact_file_name(original_file_name).map_err(|_| {
        StorageError::InvalidUploadFile(format!(
            "original file name {:?} has no usable basename",
            original_file_name
        ))
    })?;

    let ext = file_extension(&original);
    let desired = desired_base_name.trim();
    let base = if desired.is_empty() {
        &original[..original.len() - ext.len()]
    } else {
        desired
    };
    let base = sanitize_file_name(base);

    if ext.is_empty() || ends_with_ignore_ascii_case(&base, ext) {
        return Ok(base);
    }
    Ok(format!("{}{}", base, ext))
}

fn ends_with_ignore_ascii_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value.is_char_boundary(value.len() - suffix.len())
        && value[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Lexically clean a forward-slash path: collapse separators, drop `.`, resolve
/// `..` against preceding segments. `..` above the root of an absolute path is dropped.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Normalize a remote (netdisk or SFTP) path: backslashes become `/`, the path
/// is made absolute and cleaned. The root itself is rejected.
pub fn normalize_remote_path(path: &str) -> StorageResult<String> {
    let trimmed = path.trim().replace('\\', "/");
    if trimmed.is_empty() {
        return Err(StorageError::InvalidRemotePath(path.to_string()));
    }
    let absolute = if trimmed.starts_with('/') {
        trimmed
    } else {
        format!("/{}", trimmed)
    };
    let cleaned = clean_path(&absolute);
    if cleaned == "/" || cleaned == "." {
        return Err(StorageError::InvalidRemotePath(path.to_string()));
    }
    Ok(cleaned)
}

/// Last segment of a forward-slash path.
pub(crate) fn remote_base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent directory of a forward-slash path, `None` for top-level entries.
pub(crate) fn remote_parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

/// Maps (category, backend, file name) to canonical paths.
#[derive(Debug, Clone)]
pub struct ArtifactPathResolver {
    roots: StorageRoots,
}

impl ArtifactPathResolver {
    pub fn new(roots: StorageRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Configured root for the pair. An empty root is a misconfigured backend.
    pub fn resolve_root(
        &self,
        category: ArtifactCategory,
        backend: StorageBackend,
    ) -> StorageResult<&str> {
        let root = self.roots.root(category, backend);
        if root.is_empty() {
            return Err(StorageError::InvalidBackend(format!(
                "{} has no configured {} root",
                backend, category
            )));
        }
        Ok(root)
    }

    pub fn build_path(
        &self,
        category: ArtifactCategory,
        backend: StorageBackend,
        file_name: &str,
    ) -> StorageResult<String> {
        let root = self.resolve_root(category, backend)?;
        let name = normalize_artifact_file_name(file_name)?;
        let root = root.replace('\\', "/");
        Ok(clean_path(&format!("{}/{}", root, name)))
    }

    pub fn build_all_paths(
        &self,
        category: ArtifactCategory,
        file_name: &str,
    ) -> StorageResult<ArtifactPaths> {
        Ok(ArtifactPaths {
            backend: self.build_path(category, StorageBackend::Backend, file_name)?,
            cloud_netdisk: self.build_path(category, StorageBackend::CloudNetdisk, file_name)?,
            other_remote: self.build_path(category, StorageBackend::OtherRemote, file_name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ArtifactPathResolver {
        ArtifactPathResolver::new(StorageRoots {
            backend_weights: "/data/backend/weights".to_string(),
            backend_datasets: "/data/backend/datasets/".to_string(),
            cloud_weights: "/netdisk/weights".to_string(),
            cloud_datasets: "/netdisk/datasets".to_string(),
            other_weights: "/project/weights".to_string(),
            other_datasets: "/project/datasets".to_string(),
        })
    }

    #[test]
    fn normalize_category_rejects_unknown() {
        assert_eq!(normalize_category("Models").unwrap(), ArtifactCategory::Weights);
        assert!(matches!(
            normalize_category("images"),
            Err(StorageError::InvalidCategory(_))
        ));
    }

    #[test]
    fn normalize_backend_rejects_unknown() {
        assert_eq!(normalize_backend(" pan.baidu ").unwrap(), StorageBackend::CloudNetdisk);
        assert!(matches!(
            normalize_backend("s3"),
            Err(StorageError::InvalidBackend(_))
        ));
    }

    #[test]
    fn file_name_is_reduced_to_basename() {
        assert_eq!(normalize_artifact_file_name(" demo.pt ").unwrap(), "demo.pt");
        assert_eq!(normalize_artifact_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(normalize_artifact_file_name("C:\\models\\demo.pt").unwrap(), "demo.pt");
        assert_eq!(normalize_artifact_file_name("weights/").unwrap(), "weights");
        for bad in ["", "   ", ".", "..", "/", "a/.."] {
            assert!(
                matches!(normalize_artifact_file_name(bad), Err(StorageError::EmptyFileName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn derive_file_name_falls_back_to_legacy_path() {
        assert_eq!(derive_file_name("demo.pt", "/x/y.pt").as_deref(), Some("demo.pt"));
        assert_eq!(derive_file_name("", "C:\\x\\y.pt").as_deref(), Some("y.pt"));
        assert_eq!(derive_file_name("", ""), None);
    }

    #[test]
    fn sanitize_keeps_unicode_and_trims_separators() {
        assert_eq!(sanitize_file_name("my model v2"), "my_model_v2");
        assert_eq!(sanitize_file_name("模型-权重"), "模型-权重");
        assert_eq!(sanitize_file_name("__.hidden._"), "hidden");
        assert_eq!(sanitize_file_name("$$$"), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn stored_name_keeps_desired_base_and_original_extension() {
        assert_eq!(
            generate_stored_file_name("yolov7_HRW_4.2k", "origin.pt").unwrap(),
            "yolov7_HRW_4.2k.pt"
        );
        assert_eq!(
            generate_stored_file_name("", "yolo26n_v6.0.onnx").unwrap(),
            "yolo26n_v6.0.onnx"
        );
    }

    #[test]
    fn stored_name_edge_cases() {
        assert_eq!(generate_stored_file_name("best.PT", "x.pt").unwrap(), "best.PT");
        assert_eq!(generate_stored_file_name("  ", "archive").unwrap(), "archive");
        assert_eq!(generate_stored_file_name("run 1", "data.").unwrap(), "run_1");
        assert_eq!(generate_stored_file_name("", ".pt").unwrap(), "file.pt");
        assert_eq!(generate_stored_file_name("a/b", "x.zip").unwrap(), "a_b.zip");
        assert!(matches!(
            generate_stored_file_name("name", " / "),
            Err(StorageError::InvalidUploadFile(_))
        ));
    }

    #[test]
    fn stored_name_is_deterministic() {
        let first = generate_stored_file_name("resnet", "upload.bin").unwrap();
        let second = generate_stored_file_name("resnet", "upload.bin").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn clean_path_matches_lexical_rules() {
        assert_eq!(clean_path("/a//b/./c/../d"), "/a/b/d");
        assert_eq!(clean_path("/../a"), "/a");
        assert_eq!(clean_path("../a/../../b"), "../../b");
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn remote_path_normalization() {
        assert_eq!(normalize_remote_path("apps\\weights\\").unwrap(), "/apps/weights");
        assert_eq!(normalize_remote_path(" /a/./b ").unwrap(), "/a/b");
        for bad in ["", "/", "\\", "/a/..", "  "] {
            assert!(
                matches!(normalize_remote_path(bad), Err(StorageError::InvalidRemotePath(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn remote_parent_and_base_name() {
        assert_eq!(remote_parent("/a/b/c.pt"), Some("/a/b"));
        assert_eq!(remote_parent("/c.pt"), None);
        assert_eq!(remote_base_name("/a/b/c.pt"), "c.pt");
    }

    #[test]
    fn build_path_joins_and_cleans() {
        let resolver = resolver();
        assert_eq!(
            resolver
                .build_path(ArtifactCategory::Datasets, StorageBackend::Backend, "train.zip")
                .unwrap(),
            "/data/backend/datasets/train.zip"
        );
        assert!(matches!(
            resolver.build_path(ArtifactCategory::Weights, StorageBackend::Backend, ".."),
            Err(StorageError::EmptyFileName(_))
        ));
    }

    #[test]
    fn build_path_is_injective_in_file_name() {
        let resolver = resolver();
        let a = resolver
            .build_path(ArtifactCategory::Weights, StorageBackend::OtherRemote, "a.pt")
            .unwrap();
        let b = resolver
            .build_path(ArtifactCategory::Weights, StorageBackend::OtherRemote, "b.pt")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(
            a,
            resolver
                .build_path(ArtifactCategory::Weights, StorageBackend::OtherRemote, "a.pt")
                .unwrap()
        );
    }

    #[test]
    fn build_all_paths_covers_every_backend() {
        let paths = resolver()
            .build_all_paths(ArtifactCategory::Weights, "demo.pt")
            .unwrap();
        assert_eq!(paths.backend, "/data/backend/weights/demo.pt");
        assert_eq!(paths.cloud_netdisk, "/netdisk/weights/demo.pt");
        assert_eq!(paths.other_remote, "/project/weights/demo.pt");
    }

    #[test]
    fn empty_root_is_invalid_backend() {
        let resolver = ArtifactPathResolver::new(StorageRoots {
            cloud_weights: "  ".to_string(),
            ..StorageRoots::default()
        });
        assert!(matches!(
            resolver.build_all_paths(ArtifactCategory::Weights, "demo.pt"),
            Err(StorageError::InvalidBackend(_))
        ));
    }
}
