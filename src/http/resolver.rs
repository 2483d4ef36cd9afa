//! Maps request paths onto files below the served root.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;

use crate::http::mime;
use crate::http::request::Request;

/// "others may read" permission bit.
const WORLD_READABLE: u32 = 0o004;

/// A file found under the root, loaded and ready to send.
#[derive(Debug, Clone)]
pub struct StaticFile {
    pub path: PathBuf,
    pub contents: Bytes,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    FileRequest(StaticFile),
    NoResource,
    ForbiddenRequest,
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    index: String,
}

impl Resolver {
    /// `root` must be an existing directory; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>, index: impl Into<String>) -> io::Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }

        Ok(Self {
            root,
            index: index.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, request: &Request) -> Resolution {
        self.resolve_path(request.resource_path())
    }

    pub fn resolve_path(&self, path: &str) -> Resolution {
        let Some(relative) = path.strip_prefix('/') else {
            return Resolution::ForbiddenRequest;
        };

        let mut candidate = self.root.clone();
        for segment in relative.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Resolution::ForbiddenRequest,
                s if s.contains('\0') => return Resolution::ForbiddenRequest,
                s => candidate.push(s),
            }
        }

        let mut metadata = match fs::metadata(&candidate) {
            Ok(m) => m,
            Err(e) => return classify_missing(e, Resolution::NoResource),
        };

        if metadata.is_dir() {
            candidate.push(&self.index);
            metadata = match fs::metadata(&candidate) {
                Ok(m) if m.is_file() => m,
                Ok(_) => return Resolution::ForbiddenRequest,
                // A directory without an index is not listed.
                Err(e) => return classify_missing(e, Resolution::ForbiddenRequest),
            };
        }

        if !metadata.is_file() {
            return Resolution::ForbiddenRequest;
        }

        match fs::canonicalize(&candidate) {
            Ok(real) if self.is_inside_root(&real) => {}
            Ok(_) => return Resolution::ForbiddenRequest,
            Err(e) => return Resolution::InternalError(e.to_string()),
        }

        if metadata.permissions().mode() & WORLD_READABLE == 0 {
            return Resolution::ForbiddenRequest;
        }

        match fs::read(&candidate) {
            Ok(contents) => Resolution::FileRequest(StaticFile {
                content_type: mime::from_path(&candidate),
                contents: Bytes::from(contents),
                path: candidate,
            }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Resolution::ForbiddenRequest,
            Err(e) => Resolution::InternalError(e.to_string()),
        }
    }

    fn is_inside_root(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && !path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
    }
}

fn classify_missing(err: io::Error, missing: Resolution) -> Resolution {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => missing,
        io::ErrorKind::PermissionDenied => Resolution::ForbiddenRequest,
        _ => Resolution::InternalError(err.to_string()),
    }
}
