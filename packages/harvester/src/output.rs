//! Output segment management: OAI-PMH envelopes, reopen-by-truncation
//! and rotation naming.
//!
//! Each segment is logically one XML document. While a harvest is
//! mid-run the current segment is open (opening tags only); whenever
//! the process is not actively harvesting, every segment on disk is
//! sealed and parses as standalone XML. Resuming strips the closing
//! tags back off by scanning a bounded trailing window, so a sealed
//! segment can always be continued.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::TAIL_SCAN_WINDOW;
use crate::error::Result;
use crate::protocol::Verb;

/// Opening envelope tags for a verb.
pub fn open_tag(verb: Verb) -> &'static str {
    match verb {
        Verb::ListRecords => "<OAI-PMH>\n<ListRecords>\n",
        Verb::ListIdentifiers => "<OAI-PMH>\n<ListIdentifiers>\n",
        _ => "<OAI-PMH>\n",
    }
}

/// Closing envelope tags for a verb.
pub fn close_tag(verb: Verb) -> &'static str {
    match verb {
        Verb::ListRecords => "</ListRecords>\n</OAI-PMH>\n",
        Verb::ListIdentifiers => "</ListIdentifiers>\n</OAI-PMH>\n",
        _ => "</OAI-PMH>\n",
    }
}

/// Path of a rotation segment.
///
/// Segment 1 keeps the base name; segment n>1 gets a `_part{n}` suffix
/// before the extension.
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use oai_harvester::output::segment_path;
///
/// assert_eq!(segment_path(Path::new("out/harvest"), ".xml", 1), PathBuf::from("out/harvest.xml"));
/// assert_eq!(segment_path(Path::new("out/harvest"), ".xml", 3), PathBuf::from("out/harvest_part3.xml"));
/// ```
pub fn segment_path(base: &Path, ext: &str, index: u32) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    if index > 1 {
        os.push(format!("_part{index}"));
    }
    os.push(ext);
    PathBuf::from(os)
}

/// Ensure a segment is open for append.
///
/// An absent or empty file gets the opening tags. An existing file has
/// its trailing `min(8192, len)` bytes scanned for the closing-tag
/// sequence; if found, the file is truncated there so appends continue
/// inside an open, syntactically incomplete document.
pub fn ensure_open(path: &Path, verb: Verb) -> Result<()> {
    let len = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if len == 0 {
        fs::write(path, open_tag(verb))?;
        return Ok(());
    }

    let tail_len = TAIL_SCAN_WINDOW.min(len);
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::End(-(tail_len as i64)))?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail)?;

    if let Some(idx) = find_last(&tail, close_tag(verb).as_bytes()) {
        file.set_len(len - tail_len + idx as u64)?;
        tracing::info!(path = %path.display(), "stripped closing tags to resume open segment");
    }
    Ok(())
}

/// Append one harvested element followed by a newline.
pub fn append_element(path: &Path, xml: &str) -> Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(xml.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Seal a segment by appending the closing envelope tags.
pub fn seal(path: &Path, verb: Verb) -> Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(close_tag(verb).as_bytes())?;
    Ok(())
}

/// Last occurrence of `needle` in `haystack`.
fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_segment_path_naming() {
        let base = Path::new("harvest");
        assert_eq!(segment_path(base, ".xml", 1), PathBuf::from("harvest.xml"));
        assert_eq!(segment_path(base, ".xml", 2), PathBuf::from("harvest_part2.xml"));
        assert_eq!(segment_path(base, ".xml", 10), PathBuf::from("harvest_part10.xml"));
    }

    #[test]
    fn test_ensure_open_creates_with_opening_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        ensure_open(&path, Verb::ListRecords).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<OAI-PMH>\n<ListRecords>\n"
        );
    }

    #[test]
    fn test_ensure_open_empty_file_gets_opening_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");
        fs::write(&path, "").unwrap();

        ensure_open(&path, Verb::ListIdentifiers).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<OAI-PMH>\n<ListIdentifiers>\n"
        );
    }

    #[test]
    fn test_ensure_open_strips_closing_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        ensure_open(&path, Verb::ListRecords).unwrap();
        append_element(&path, "<record>1</record>").unwrap();
        seal(&path, Verb::ListRecords).unwrap();

        // Reopening makes the document appendable again
        ensure_open(&path, Verb::ListRecords).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<OAI-PMH>\n<ListRecords>\n<record>1</record>\n"
        );
    }

    #[test]
    fn test_ensure_open_leaves_unsealed_file_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        ensure_open(&path, Verb::ListRecords).unwrap();
        append_element(&path, "<record>1</record>").unwrap();
        let before = fs::read_to_string(&path).unwrap();

        ensure_open(&path, Verb::ListRecords).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_sealed_segment_is_well_formed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        ensure_open(&path, Verb::ListRecords).unwrap();
        append_element(&path, "<record><header/></record>").unwrap();
        append_element(&path, "<record><header/></record>").unwrap();
        seal(&path, Verb::ListRecords).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let doc = roxmltree::Document::parse(&content).unwrap();
        assert_eq!(doc.root_element().tag_name().name(), "OAI-PMH");
        let records = doc
            .descendants()
            .filter(|n| n.has_tag_name("record"))
            .count();
        assert_eq!(records, 2);
    }

    #[test]
    fn test_seal_reopen_seal_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        ensure_open(&path, Verb::ListIdentifiers).unwrap();
        append_element(&path, "<header>1</header>").unwrap();
        seal(&path, Verb::ListIdentifiers).unwrap();

        ensure_open(&path, Verb::ListIdentifiers).unwrap();
        append_element(&path, "<header>2</header>").unwrap();
        seal(&path, Verb::ListIdentifiers).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(roxmltree::Document::parse(&content).is_ok());
        assert_eq!(content.matches("<header>").count(), 2);
        assert_eq!(content.matches("</ListIdentifiers>").count(), 1);
    }

    #[test]
    fn test_ensure_open_scans_only_tail_window() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");

        // A sealed file whose closing tags sit inside the tail window
        // even though the file is much larger than the window
        ensure_open(&path, Verb::ListRecords).unwrap();
        let big = format!("<record>{}</record>", "x".repeat(3 * TAIL_SCAN_WINDOW as usize));
        append_element(&path, &big).unwrap();
        seal(&path, Verb::ListRecords).unwrap();

        ensure_open(&path, Verb::ListRecords).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("</OAI-PMH>"));
        assert!(content.ends_with("</record>\n"));
    }

    #[test]
    fn test_find_last() {
        assert_eq!(find_last(b"abcabc", b"abc"), Some(3));
        assert_eq!(find_last(b"abc", b"abcd"), None);
        assert_eq!(find_last(b"abc", b""), None);
        assert_eq!(find_last(b"xyz", b"abc"), None);
    }
}
