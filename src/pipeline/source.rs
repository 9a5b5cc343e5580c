//! Input discovery and the feeder that turns sources into raw messages.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BinderError, MessageError, Result};
use crate::parser::eml::read_eml;
use crate::parser::mbox::{looks_like_mbox, MboxParser};

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSource {
    /// A single RFC 5322 message.
    Eml(PathBuf),
    /// An MBOX archive of many messages.
    Mbox(PathBuf),
}

impl MessageSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Eml(p) | Self::Mbox(p) => p,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Eml(_) => "eml",
            Self::Mbox(_) => "mbox",
        }
    }

    /// Number of messages the source holds.
    pub fn count_messages(&self, max_message_size: usize) -> Result<u64> {
        match self {
            Self::Eml(_) => Ok(1),
            Self::Mbox(path) => MboxParser::new(path)?
                .with_max_message_size(max_message_size)
                .parse(&mut |_, _| true, None),
        }
    }
}

/// A raw message ready for submission, or the reason it could not be read.
#[derive(Debug)]
pub struct Intake {
    /// `name.eml`, or `archive.mbox@<offset>`.
    pub label: String,
    pub raw: std::result::Result<Vec<u8>, MessageError>,
}

/// Expand CLI inputs into an ordered list of sources.
///
/// Directories are scanned one level deep for `.eml` and `.mbox` files,
/// sorted by file name. A file is an EML when it has the `.eml` extension,
/// and an archive when it has the `.mbox` extension or starts with an MBOX
/// separator line.
pub fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<MessageSource>> {
    let mut sources = Vec::new();
    for input in inputs {
        let metadata = std::fs::metadata(input).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BinderError::FileNotFound(input.clone())
            } else {
                BinderError::io(input, e)
            }
        })?;

        if metadata.is_dir() {
            sources.extend(scan_directory(input)?);
        } else if has_extension(input, "eml") {
            sources.push(MessageSource::Eml(input.clone()));
        } else if has_extension(input, "mbox") || looks_like_mbox(input)? {
            sources.push(MessageSource::Mbox(input.clone()));
        } else {
            return Err(BinderError::InvalidInput {
                path: input.clone(),
                reason: "expected an .eml file, an MBOX archive, or a directory".into(),
            });
        }
    }
    info!(sources = sources.len(), "Discovered inputs");
    Ok(sources)
}

fn scan_directory(dir: &Path) -> Result<Vec<MessageSource>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| BinderError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let found: Vec<MessageSource> = entries
        .into_iter()
        .filter_map(|path| {
            if has_extension(&path, "eml") {
                Some(MessageSource::Eml(path))
            } else if has_extension(&path, "mbox") {
                Some(MessageSource::Mbox(path))
            } else {
                None
            }
        })
        .collect();
    if found.is_empty() {
        warn!(dir = %dir.display(), "No .eml or .mbox files found");
    }
    Ok(found)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read every source in order and hand each message to `submit`.
///
/// Unreadable files become failed intakes; only a failing `submit` stops
/// the feed. Returns the number of intakes submitted.
pub fn feed(
    sources: &[MessageSource],
    max_message_size: usize,
    submit: &mut dyn FnMut(Intake) -> Result<()>,
) -> Result<u64> {
    let mut count = 0u64;
    for source in sources {
        let label = file_label(source.path());
        match source {
            MessageSource::Eml(path) => {
                submit(Intake {
                    raw: read_eml(path, max_message_size),
                    label,
                })?;
                count += 1;
            }
            MessageSource::Mbox(path) => {
                let parser = match MboxParser::new(path) {
                    Ok(p) => p.with_max_message_size(max_message_size),
                    Err(e) => {
                        submit(Intake {
                            label,
                            raw: Err(MessageError::Unreadable(e.to_string())),
                        })?;
                        count += 1;
                        continue;
                    }
                };

                let mut submit_error = None;
                let read = parser.parse(
                    &mut |offset, raw| {
                        let intake = Intake {
                            label: format!("{label}@{offset}"),
                            raw: Ok(raw.to_vec()),
                        };
                        match submit(intake) {
                            Ok(()) => true,
                            Err(e) => {
                                submit_error = Some(e);
                                false
                            }
                        }
                    },
                    None,
                );
                if let Some(e) = submit_error {
                    return Err(e);
                }
                match read {
                    Ok(n) => {
                        debug!(archive = %label, messages = n, "Archive read");
                        count += n;
                    }
                    Err(e) => {
                        warn!(archive = %label, error = %e, "Archive read failed part-way");
                        submit(Intake {
                            label: format!("{label}@error"),
                            raw: Err(MessageError::Unreadable(e.to_string())),
                        })?;
                        count += 1;
                    }
                }
            }
        }
    }
    Ok(count)
}
