//! ComicInfo.xml sidecar extraction.
//!
//! The sidecar may live anywhere inside the archive and is matched by
//! case-insensitive file name. A missing, empty, or malformed sidecar
//! yields an empty record rather than an error. `<Series>` is never read
//! from this source: series grouping is filesystem-driven.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::archive::ComicArchive;

/// Sidecar file name, matched case-insensitively.
pub const SIDECAR_NAME: &str = "comicinfo.xml";

/// Metadata parsed from ComicInfo.xml (all optional).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicInfo {
    pub title: Option<String>,
    pub issue_number: Option<i64>,
    pub publisher: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub web: Option<String>,
    pub language_iso: Option<String>,
    pub genre: Option<String>,
}

impl ComicInfo {
    /// True when no field was extracted.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Locate the sidecar entry in an archive's name listing.
pub fn find_sidecar(names: &[String]) -> Option<&str> {
    names.iter().map(String::as_str).find(|name| {
        Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(SIDECAR_NAME))
    })
}

/// Read and parse the sidecar from an already opened archive.
pub fn read_from_archive(archive: &mut dyn ComicArchive) -> ComicInfo {
    let names = match archive.entry_names() {
        Ok(names) => names,
        Err(err) => {
            debug!("sidecar listing failed: {err}");
            return ComicInfo::default();
        }
    };

    let Some(entry) = find_sidecar(&names).map(str::to_owned) else {
        return ComicInfo::default();
    };

    match archive.read_entry(&entry) {
        Ok(bytes) => parse(&bytes),
        Err(err) => {
            debug!("sidecar read failed for {entry}: {err}");
            ComicInfo::default()
        }
    }
}

/// Parse ComicInfo.xml bytes. Malformed XML yields an empty record;
/// integer fields that fail to parse are omitted, never defaulted.
pub fn parse(xml: &[u8]) -> ComicInfo {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut info = ComicInfo::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current_tag = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    current_tag = String::from_utf8_lossy(e.local_name().as_ref())
                        .to_ascii_lowercase();
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current_tag.clear();
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(e)) if depth == 2 && !current_tag.is_empty() => {
                if let Ok(text) = e.unescape() {
                    set_field(&mut info, &current_tag, text.trim());
                }
                // First text segment wins for this element.
                current_tag.clear();
            }
            Ok(Event::CData(e)) if depth == 2 && !current_tag.is_empty() => {
                let text = String::from_utf8_lossy(&e).into_owned();
                set_field(&mut info, &current_tag, text.trim());
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => return ComicInfo::default(),
            _ => {}
        }
        buf.clear();
    }

    info
}

// Fixed tag vocabulary; "series" is deliberately not part of it.
fn set_field(info: &mut ComicInfo, tag: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    match tag {
        "title" => info.title = Some(text.to_string()),
        "issue" => info.issue_number = parse_int(text).or(info.issue_number),
        "publisher" => info.publisher = Some(text.to_string()),
        "year" => info.year = parse_int(text).or(info.year),
        "month" => info.month = parse_int(text).or(info.month),
        "writer" => info.writer = Some(text.to_string()),
        "penciller" => info.penciller = Some(text.to_string()),
        "summary" => info.summary = Some(text.to_string()),
        "notes" => info.notes = Some(text.to_string()),
        "web" => info.web = Some(text.to_string()),
        "languageiso" => info.language_iso = Some(text.to_string()),
        "genre" => info.genre = Some(text.to_string()),
        _ => {}
    }
}

fn parse_int(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_sidecar() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<ComicInfo>
  <Title>The Night Gwen Stacy Died</Title>
  <Series>The Amazing Spider-Man</Series>
  <Number>121</Number>
  <Issue>121</Issue>
  <Publisher>Marvel</Publisher>
  <Year>1973</Year>
  <Month>6</Month>
  <Writer>Gerry Conway</Writer>
  <Penciller>Gil Kane</Penciller>
  <Summary>Goblin strikes.</Summary>
  <Web>https://example.com/asm-121</Web>
  <LanguageISO>en</LanguageISO>
  <Genre>Superhero</Genre>
</ComicInfo>"#;

        let info = parse(xml);
        assert_eq!(info.title.as_deref(), Some("The Night Gwen Stacy Died"));
        assert_eq!(info.issue_number, Some(121));
        assert_eq!(info.publisher.as_deref(), Some("Marvel"));
        assert_eq!(info.year, Some(1973));
        assert_eq!(info.month, Some(6));
        assert_eq!(info.writer.as_deref(), Some("Gerry Conway"));
        assert_eq!(info.language_iso.as_deref(), Some("en"));
    }

    #[test]
    fn unparsable_integer_is_absent() {
        let xml = br#"<ComicInfo>
  <Issue>one-twenty-one</Issue>
  <Year>1973</Year>
</ComicInfo>"#;

        let info = parse(xml);
        assert_eq!(info.issue_number, None);
        assert_eq!(info.year, Some(1973));
    }

    #[test]
    fn malformed_xml_yields_empty_record() {
        // Mismatched end tag: the whole document is rejected, including
        // fields already seen.
        let info = parse(b"<ComicInfo><Title>broken</Wrong></ComicInfo>");
        assert!(info.is_empty());

        let info = parse(b"not xml at all");
        assert!(info.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_record() {
        assert!(parse(b"").is_empty());
        assert!(parse(b"<ComicInfo></ComicInfo>").is_empty());
    }

    #[test]
    fn tags_match_case_insensitively() {
        let info = parse(b"<comicinfo><TITLE>Upper</TITLE></comicinfo>");
        assert_eq!(info.title.as_deref(), Some("Upper"));
    }

    #[test]
    fn nested_elements_are_ignored() {
        let xml = br#"<ComicInfo>
  <Pages><Page Image="0"/></Pages>
  <Title>Kept</Title>
</ComicInfo>"#;

        let info = parse(xml);
        assert_eq!(info.title.as_deref(), Some("Kept"));
    }

    #[test]
    fn sidecar_found_anywhere_case_insensitively() {
        let names = vec![
            "001.jpg".to_string(),
            "extras/COMICINFO.XML".to_string(),
        ];
        assert_eq!(find_sidecar(&names), Some("extras/COMICINFO.XML"));

        let none = vec!["001.jpg".to_string()];
        assert_eq!(find_sidecar(&none), None);
    }
}
