//! Email signatures: project file, mail-client signatures, inline images.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};

use crate::records::read_text_file;

lazy_static! {
    static ref IMAGE_SOURCE: Regex =
        Regex::new(r#"src=["']([^"']+)["']"#).expect("valid image source regex");
}

const SIGNATURE_EXTENSIONS: [&str; 2] = ["htm", "html"];

#[derive(Debug, Clone, Default)]
pub struct SignatureOptions {
    /// Append the project signature file. Takes precedence over everything else.
    pub use_project: bool,
    pub project_file: PathBuf,
    /// Mail-client signature to use by name.
    pub name: Option<String>,
    /// Fall back to the client's default signature.
    pub use_system: bool,
    /// Attach signature images and reference them by content id.
    pub embed_images: bool,
    /// Mail-client signatures directory.
    pub signatures_dir: PathBuf,
}

/// Which signature applies, by precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureChoice {
    Project(PathBuf),
    Named(String),
    SystemDefault,
    None,
}

/// A loaded signature and where its resources live.
#[derive(Debug, Clone)]
pub struct Signature {
    pub html: String,
    /// Directory the signature file lives in.
    pub dir: PathBuf,
    /// Signature name; images sit in `<dir>/<name>_files/`.
    pub name: String,
}

/// An image referenced by a signature and found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// The `src` value as written in the HTML.
    pub source: String,
    pub path: PathBuf,
    pub content_id: String,
}

impl SignatureOptions {
    pub fn choice(&self) -> SignatureChoice {
        if self.use_project {
            SignatureChoice::Project(self.project_file.clone())
        } else if let Some(name) = self.name.as_ref().filter(|n| !n.is_empty()) {
            SignatureChoice::Named(name.clone())
        } else if self.use_system {
            SignatureChoice::SystemDefault
        } else {
            SignatureChoice::None
        }
    }

    /// Load the signature selected by [`SignatureOptions::choice`].
    ///
    /// Unreadable or missing files yield `None`; the next choice is not tried.
    pub fn load(&self) -> Option<Signature> {
        self.load_with_default(None)
    }

    /// Same as [`SignatureOptions::load`], with the name the mail client
    /// reports as its default signature. Without one, or when that file is
    /// missing, the first signature file of the directory is used.
    pub fn load_with_default(&self, default_name: Option<&str>) -> Option<Signature> {
        match self.choice() {
            SignatureChoice::Project(path) => load_file(&path),
            SignatureChoice::Named(name) => load_named(&self.signatures_dir, &name),
            SignatureChoice::SystemDefault => default_name
                .filter(|name| !name.is_empty())
                .and_then(|name| load_named(&self.signatures_dir, name))
                .or_else(|| default_signature(&self.signatures_dir).and_then(|path| load_file(&path))),
            SignatureChoice::None => None,
        }
    }

    /// The project signature only, as appended by direct SMTP.
    pub fn load_project(&self) -> Option<String> {
        if !self.use_project {
            return None;
        }
        load_file(&self.project_file).map(|signature| signature.html)
    }
}

fn load_file(path: &Path) -> Option<Signature> {
    if !path.is_file() {
        log::debug!("Signature file not found: {}", path.display());
        return None;
    }

    match read_text_file(path) {
        Ok(html) => Some(Signature {
            html,
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }),
        Err(e) => {
            log::warn!("Failed to read signature {}: {}", path.display(), e);
            None
        }
    }
}

fn load_named(dir: &Path, name: &str) -> Option<Signature> {
    SIGNATURE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|path| path.is_file())
        .and_then(|path| load_file(&path))
}

fn signature_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// First `.htm` signature of the directory, else the first `.html` one.
pub fn default_signature(dir: &Path) -> Option<PathBuf> {
    SIGNATURE_EXTENSIONS
        .iter()
        .find_map(|ext| signature_files(dir, ext).into_iter().next())
}

/// Sorted, de-duplicated names of the signatures in `dir`.
pub fn list_signatures(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = SIGNATURE_EXTENSIONS
        .iter()
        .flat_map(|ext| signature_files(dir, ext))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names.dedup();
    names
}

impl Signature {
    /// Images referenced by `src="…"` that exist next to the signature.
    ///
    /// Lookup is `<dir>/<name>_files/<file name>` first, then `<dir>/<src>`.
    /// Nothing is returned when the `_files` directory does not exist.
    pub fn images(&self) -> Vec<InlineImage> {
        let base = self.dir.join(format!("{}_files", self.name));
        if !base.is_dir() {
            return Vec::new();
        }

        let mut images: Vec<InlineImage> = Vec::new();
        for captures in IMAGE_SOURCE.captures_iter(&self.html) {
            let source = &captures[1];
            if images.iter().any(|image| image.source == source) {
                continue;
            }

            let Some(file_name) = Path::new(source).file_name() else {
                continue;
            };
            let candidates = [base.join(file_name), self.dir.join(source)];
            if let Some(path) = candidates.into_iter().find(|p| p.is_file()) {
                let content_id = path
                    .file_name()
                    .map(|n| n.to_string_lossy().replace('.', "_"))
                    .unwrap_or_default();
                images.push(InlineImage {
                    source: source.to_string(),
                    path,
                    content_id,
                });
            }
        }
        images
    }
}

/// Point every `src` attribute of `html` that names an attached image to its
/// `cid:` reference. Other sources are left as written.
pub fn rewrite_image_sources(html: &str, attached: &[InlineImage]) -> String {
    IMAGE_SOURCE
        .replace_all(html, |captures: &Captures| {
            match attached.iter().find(|image| image.source == captures[1]) {
                Some(image) => format!("src=\"cid:{}\"", image.content_id),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}
