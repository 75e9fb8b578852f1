use std::io::{self, BufRead};

use thiserror::Error;
use tracing::{debug, trace};

use crate::map::segment::{RecordError, Segment};

#[derive(Debug, Error)]
pub enum MapParseError {
    #[error("parse error in map file, line {line}: {source}")]
    MalformedRecord { line: usize, source: RecordError },
    #[error("failed to read map file at line {line}: {source}")]
    Io { line: usize, source: io::Error },
}

impl MapParseError {
    /// 1-based line the failure was found on.
    pub fn line(&self) -> usize {
        match self {
            MapParseError::MalformedRecord { line, .. } | MapParseError::Io { line, .. } => *line,
        }
    }
}

/// Reads a whole memory map, one `Segment` per record, in file order.
///
/// The first bad line aborts the parse; nothing after it is read. Lines holding
/// only whitespace are skipped but still counted.
pub fn parse_map<R: BufRead>(reader: R) -> Result<Vec<Segment>, MapParseError> {
    let mut segments = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let num = idx + 1;
        let line = line.map_err(|source| MapParseError::Io { line: num, source })?;

        if line.trim().is_empty() {
            trace!(line = num, "skipping blank line");
            continue;
        }

        let segment = line
            .parse::<Segment>()
            .map_err(|source| MapParseError::MalformedRecord { line: num, source })?;
        segments.push(segment);
    }

    debug!(count = segments.len(), "parsed memory map");
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEMO_MAP: &str = "\
00400000-00401000 r-xp 00000000 08:01 1234 /bin/app
00600000-00601000 rw-p 00000000 00:00 0
7f1000000000-7f1000010000 r--p 00000000 08:01 5678 [vdso]
";

    #[test]
    fn keeps_line_order() {
        let segments = parse_map(DEMO_MAP.as_bytes()).unwrap();

        let starts: Vec<_> = segments.iter().map(|s| s.start_address.as_str()).collect();
        assert_eq!(starts, ["00400000", "00600000", "7f1000000000"]);
        assert_eq!(segments[1].backing_path, "");
        assert_eq!(segments[2].backing_path, "[vdso]");
    }

    #[test]
    fn empty_input_gives_no_segments() {
        assert!(parse_map("".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn blank_lines_are_skipped_but_counted() {
        let map = "00400000-00401000 r-xp 0 08:01 1 /bin/app\n\n   \nbroken\n";
        let err = parse_map(map.as_bytes()).unwrap_err();

        assert_eq!(err.line(), 4);
    }

    #[test]
    fn first_error_aborts_with_line_number() {
        let map = "\
00400000-00401000 r-xp 00000000 08:01 1234 /bin/app
00600000 rw-p 00000000 00:00 0
not even close
";
        let err = parse_map(map.as_bytes()).unwrap_err();

        assert_eq!(err.line(), 2);
        assert!(matches!(
            err,
            MapParseError::MalformedRecord {
                source: RecordError::AddressRange(_),
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "parse error in map file, line 2: address range field malformed: 00600000"
        );
    }

    #[test]
    fn wrong_field_count_names_the_line() {
        let map = "00400000-00401000 r-xp\n";
        let err = parse_map(map.as_bytes()).unwrap_err();

        assert_eq!(err.line(), 1);
        assert!(err.to_string().contains("wrong number of fields"));
    }

    #[test]
    fn invalid_utf8_is_an_io_error() {
        let map: &[u8] = b"00400000-00401000 r-xp 0 08:01 1 /bin/app\n\xff\xfe\n";
        let err = parse_map(map).unwrap_err();

        assert!(matches!(err, MapParseError::Io { line: 2, .. }));
    }

    fn record() -> impl Strategy<Value = (String, String)> {
        (
            "[0-9a-f]{1,12}",
            "[0-9a-f]{1,12}",
            "[r-][w-][x-][ps]",
            "[0-9a-f]{8}",
            "[0-9]{1,7}",
            prop_oneof![Just(String::new()), "/[a-z]{1,8}(/[a-z.]{1,8}){0,3}"],
        )
            .prop_map(|(start, end, perms, offset, inode, path)| {
                let line = format!("{start}-{end} {perms} {offset} 08:01 {inode} {path}");
                (line, path)
            })
    }

    proptest! {
        #[test]
        fn one_segment_per_line(records in prop::collection::vec(record(), 0..32)) {
            let text: String = records.iter().map(|(line, _)| format!("{line}\n")).collect();
            let segments = parse_map(text.as_bytes()).unwrap();

            prop_assert_eq!(segments.len(), records.len());
            for (segment, (_, path)) in segments.iter().zip(&records) {
                prop_assert_eq!(&segment.backing_path, path);
            }
        }

        #[test]
        fn bad_range_rejects_whole_file(
            good in prop::collection::vec(record(), 0..8),
            bad_range in "[0-9a-f]{1,8}(-[0-9a-f]{1,8}){2,3}|[0-9a-f]{1,8}",
        ) {
            let mut text: String = good.iter().map(|(line, _)| format!("{line}\n")).collect();
            text.push_str(&format!("{bad_range} r-xp 00000000 08:01 1 /bin/app\n"));

            let err = parse_map(text.as_bytes()).unwrap_err();
            prop_assert_eq!(err.line(), good.len() + 1);
        }
    }
}
