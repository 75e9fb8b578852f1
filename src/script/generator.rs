use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::map::Segment;

pub const DEFAULT_DECODER: &str = "ptxed";

const INTERPRETER: &str = "#!/bin/sh";
const CONTINUATION: &str = " \\";
const SHELL_SAFE: &str = "/._-+:,=@%";

/// Names everything a run produces from the user's short name.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub name: String,
    pub decoder: String,
}

impl GeneratorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decoder: DEFAULT_DECODER.to_string(),
        }
    }

    pub fn with_decoder(mut self, decoder: impl Into<String>) -> Self {
        self.decoder = decoder.into();
        self
    }

    pub fn staging_dir(&self) -> String {
        format!("obj_{}", self.name)
    }

    pub fn script_name(&self) -> String {
        format!("decode_{}.sh", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInstruction {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// A rendered decoder invocation, one entry per output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeScript {
    lines: Vec<String>,
}

impl DecodeScript {
    /// Argument lines that hand a raw image to the decoder.
    pub fn raw_args(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.trim_start())
            .filter(|line| line.starts_with("--raw "))
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DecodeScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DecodePlan {
    pub script: DecodeScript,
    pub copies: Vec<CopyInstruction>,
}

/// Segments worth handing to the decoder: executable and mapped from a file.
pub fn retained(segments: &[Segment]) -> impl Iterator<Item = &Segment> {
    segments.iter().filter(|seg| {
        if !seg.is_file_backed() {
            // FIXME: pseudo mappings such as [vdso] hold code too, but there is no file to copy.
            debug!(segment = %seg, kind = %seg.kind(), "dropping segment without a copyable file");
            return false;
        }
        if !seg.is_executable() {
            debug!(segment = %seg, "dropping non-executable segment");
            return false;
        }
        true
    })
}

/// Where a segment's backing file lands under the staging directory.
///
/// The full backing path is appended to the staging name, so the source
/// directory layout is mirrored beneath it.
pub fn destination_for(staging_dir: &str, segment: &Segment) -> PathBuf {
    PathBuf::from(format!("{}{}", staging_dir, segment.backing_path))
}

/// Quotes a word for `sh` unless it is made only of characters the shell
/// leaves alone.
fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || SHELL_SAFE.contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

pub fn generate(config: &GeneratorConfig, segments: &[Segment], trace_file: &Path) -> DecodePlan {
    let staging_dir = config.staging_dir();
    let mut lines = vec![
        INTERPRETER.to_string(),
        String::new(),
        format!("{}{}", config.decoder, CONTINUATION),
    ];
    let mut copies = Vec::new();
    let mut seen = HashSet::new();
    let mut raw = 0;

    for seg in retained(segments) {
        raw += 1;
        let destination = destination_for(&staging_dir, seg);
        let raw_source = format!(
            "{}:0x{}:0x{}",
            destination.display(),
            seg.file_offset,
            seg.start_address
        );
        lines.push(format!("\t--raw {}{}", shell_quote(&raw_source), CONTINUATION));

        if seen.insert(destination.clone()) {
            copies.push(CopyInstruction {
                source: PathBuf::from(&seg.backing_path),
                destination,
            });
        }
    }

    lines.push(format!("\t--pt {}", shell_quote(&trace_file.to_string_lossy())));
    debug!(raw, copies = copies.len(), "rendered decode script");

    DecodePlan {
        script: DecodeScript { lines },
        copies,
    }
}
