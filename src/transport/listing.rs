//! Parser for the Azure-style blob container listing served by the HDA site:
//!
//! ```xml
//! <EnumerationResults>
//!   <Blobs>
//!     <Blob><Name>2023-24/file.zip</Name><Url>https://...</Url></Blob>
//!   </Blobs>
//! </EnumerationResults>
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Name,
    Url,
}

pub fn parse_blob_listing(xml: &str) -> Result<Vec<BlobEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<BlobEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"Blob" => current = Some(BlobEntry::default()),
                b"Name" if current.is_some() => field = Some(Field::Name),
                b"Url" if current.is_some() => field = Some(Field::Url),
                _ => field = None,
            },
            Ok(Event::Text(text)) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    let value = text
                        .unescape()
                        .map_err(|err| Error::Corrupt(format!("blob listing: {err}")))?
                        .into_owned();
                    match field {
                        Field::Name => entry.name.push_str(&value),
                        Field::Url => entry.url.get_or_insert_with(String::new).push_str(&value),
                    }
                }
            }
            Ok(Event::End(end)) => {
                if end.name().as_ref() == b"Blob" {
                    if let Some(entry) = current.take() {
                        if !entry.name.is_empty() {
                            entries.push(entry);
                        }
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(Error::Corrupt(format!(
                    "blob listing at byte {}: {err}",
                    reader.buffer_position()
                )))
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ContainerName="https://example.blob.core.windows.net/hda">
  <Prefix/>
  <Blobs>
    <Blob>
      <Name>2022-23/Transparency_22-23_P13.zip</Name>
      <Url>https://example.blob.core.windows.net/hda/2022-23/Transparency_22-23_P13.zip</Url>
      <Properties><Content-Length>1024</Content-Length></Properties>
    </Blob>
    <Blob>
      <Name>2023-24/Transparency_23-24_P01 &amp; P02.zip</Name>
    </Blob>
  </Blobs>
  <NextMarker/>
</EnumerationResults>"#;

    #[test]
    fn parses_names_and_urls() {
        let entries = parse_blob_listing(LISTING).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "2022-23/Transparency_22-23_P13.zip");
        assert!(entries[0]
            .url
            .as_deref()
            .expect("url")
            .ends_with("Transparency_22-23_P13.zip"));
        assert_eq!(entries[1].name, "2023-24/Transparency_23-24_P01 & P02.zip");
        assert_eq!(entries[1].url, None);
    }

    #[test]
    fn empty_container_lists_nothing() {
        let entries =
            parse_blob_listing("<EnumerationResults><Blobs/></EnumerationResults>").expect("parse");
        assert!(entries.is_empty());
    }

    #[test]
    fn malformed_listing_is_an_error() {
        assert!(parse_blob_listing("<EnumerationResults><Blobs></Blob>").is_err());
    }
}
