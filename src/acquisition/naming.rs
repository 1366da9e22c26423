//! Sequential file naming for persisted frames.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::acquisition::common::error::{CameraError, Result};

/// File name used inside an output directory when no template is given.
pub const DEFAULT_FILE_NAME: &str = "frame_%04d.tif";

/// A path with one printf-style integer placeholder (`%d`, `%4d`, `%04d`).
///
/// `%%` stands for a literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = || CameraError::InvalidTemplate(template.to_string());

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholder: Option<(usize, bool)> = None;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let out = if placeholder.is_some() { &mut suffix } else { &mut prefix };
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }
            if placeholder.is_some() {
                return Err(invalid());
            }

            let zero_pad = chars.peek() == Some(&'0');
            if zero_pad {
                chars.next();
            }
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            if chars.next() != Some('d') {
                return Err(invalid());
            }
            let width = if digits.is_empty() {
                0
            } else {
                digits.parse().map_err(|_| invalid())?
            };
            placeholder = Some((width, zero_pad));
        }

        let (width, zero_pad) = placeholder.ok_or_else(invalid)?;
        Ok(Self {
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    pub fn render(&self, image_number: u64) -> PathBuf {
        let number = if self.zero_pad {
            format!("{:0width$}", image_number, width = self.width)
        } else {
            format!("{:width$}", image_number, width = self.width)
        };
        PathBuf::from(format!("{}{}{}", self.prefix, number, self.suffix))
    }

    /// The directory part of the template, if any.
    pub fn parent_dir(&self) -> Option<PathBuf> {
        Path::new(&self.prefix)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

impl FromStr for PathTemplate {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Creates `dir` if needed and returns the default frame template inside it.
///
/// Only the last path component is created; a missing parent is a
/// [`CameraError::File`] error, as is an existing non-directory.
pub fn prepare_output_dir(dir: impl AsRef<Path>) -> Result<PathTemplate> {
    let dir = dir.as_ref();
    match std::fs::create_dir(dir) {
        Ok(()) => debug!("Created output directory {}", dir.display()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {}
        Err(e) => return Err(CameraError::File(format!("{}: {}", dir.display(), e))),
    }

    let template = dir.join(DEFAULT_FILE_NAME);
    PathTemplate::parse(&template.to_string_lossy())
}
