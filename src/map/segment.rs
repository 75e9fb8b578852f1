use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Fields in a record without a backing path.
pub const FIELDS_ANONYMOUS: usize = 5;
/// Fields in a record with a backing path.
pub const FIELDS_WITH_PATH: usize = 6;

const RANGE_DELIMITER: char = '-';
const PATH_ROOT: char = '/';
const DELETED_SUFFIX: &str = " (deleted)";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error(
        "wrong number of fields (found {0}, expected {min} or {max})",
        min = FIELDS_ANONYMOUS,
        max = FIELDS_WITH_PATH
    )]
    FieldCount(usize),
    #[error("address range field malformed: {0}")]
    AddressRange(String),
}

/// Raw permission flags, e.g. `r-xp`.
///
/// The token is kept as written. Nothing here rejects an odd flag string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions(String);

impl Permissions {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn executable(&self) -> bool {
        self.0.contains('x')
    }
}

impl From<&str> for Permissions {
    fn from(s: &str) -> Self {
        Permissions(s.to_string())
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a segment is mapped from, judged by its path column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind<'a> {
    // Absolute path to a file on disk
    File(&'a Path),

    // File unlinked after it was mapped; the path no longer names it
    Deleted(&'a Path),

    // Kernel-provided or otherwise unnamed regions: [vdso], [stack], [heap] ...
    Pseudo(&'a str),

    // No path at all
    Anonymous,
}

impl fmt::Display for MappingKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::File(path) => write!(f, "{}", path.display()),
            MappingKind::Deleted(path) => write!(f, "{}{}", path.display(), DELETED_SUFFIX),
            MappingKind::Pseudo(name) => write!(f, "{}", name),
            MappingKind::Anonymous => write!(f, "[anonymous]"),
        }
    }
}

/// One line of a process memory map.
///
/// Every column is kept as the text token it was read from; addresses and the
/// offset are hex strings without a `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start_address: String,
    pub end_address: String,
    pub permissions: Permissions,
    pub file_offset: String,
    pub device_id: String,
    pub inode: String,
    pub backing_path: String,
}

impl Segment {
    pub fn kind(&self) -> MappingKind<'_> {
        match self.backing_path.as_str() {
            "" => MappingKind::Anonymous,
            path if path.starts_with(PATH_ROOT) => match path.strip_suffix(DELETED_SUFFIX) {
                Some(unlinked) => MappingKind::Deleted(Path::new(unlinked)),
                None => MappingKind::File(Path::new(path)),
            },
            name => MappingKind::Pseudo(name),
        }
    }

    /// True when the backing file can still be found at its path.
    pub fn is_file_backed(&self) -> bool {
        matches!(self.kind(), MappingKind::File(_))
    }

    pub fn is_executable(&self) -> bool {
        self.permissions.executable()
    }
}

impl FromStr for Segment {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        // Format: "start-end perms offset dev inode [pathname]"
        // Example: "7f2a1b3c4000-7f2a1b5c4000 r-xp 00001000 08:01 1234567 /usr/lib/libc.so.6"
        let fields = split_fields(line);
        if fields.len() != FIELDS_ANONYMOUS && fields.len() != FIELDS_WITH_PATH {
            return Err(RecordError::FieldCount(fields.len()));
        }

        let (start_address, end_address) = split_address_range(fields[0])?;
        let (perms, file_offset, device_id, inode) = (fields[1], fields[2], fields[3], fields[4]);
        let backing_path = fields.get(FIELDS_ANONYMOUS).copied().unwrap_or("");

        Ok(Segment {
            start_address: start_address.to_string(),
            end_address: end_address.to_string(),
            permissions: Permissions::from(perms),
            file_offset: file_offset.to_string(),
            device_id: device_id.to_string(),
            inode: inode.to_string(),
            backing_path: backing_path.to_string(),
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {} {} {} {}",
            self.start_address,
            self.end_address,
            self.permissions,
            self.file_offset,
            self.device_id,
            self.inode,
        )?;
        if !self.backing_path.is_empty() {
            write!(f, " {}", self.backing_path)?;
        }
        Ok(())
    }
}

/// Splits a record on runs of whitespace into at most six fields.
///
/// The sixth field is the rest of the line, so a path with embedded spaces
/// (`/lib/x.so (deleted)`) survives intact.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(FIELDS_WITH_PATH);
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if fields.len() == FIELDS_WITH_PATH - 1 {
            fields.push(rest.trim_end());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    fields
}

fn split_address_range(s: &str) -> Result<(&str, &str), RecordError> {
    let mut tokens = s.split(RANGE_DELIMITER);
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(start), Some(end), None) => Ok((start, end)),
        _ => Err(RecordError::AddressRange(s.to_string())),
    }
}
