use mapharvest_core::{EnrichedRecord, Error, ListingRef, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A record that can be appended to an output sheet.
pub trait Row: Serialize {
    const HEADERS: &'static [&'static str];

    fn link(&self) -> &str;
}

impl Row for ListingRef {
    const HEADERS: &'static [&'static str] = &["name", "link", "keyword", "city"];

    fn link(&self) -> &str {
        &self.link
    }
}

impl Row for EnrichedRecord {
    const HEADERS: &'static [&'static str] =
        &["name", "phone", "website", "link", "keyword", "city"];

    fn link(&self) -> &str {
        &self.link
    }
}

/// Append-only CSV sheet keyed by link.
///
/// The header is written only when the file is empty. Links already present
/// in the file are loaded on open and never written twice.
pub struct CsvSink<R: Row> {
    path: PathBuf,
    writer: csv::Writer<File>,
    links: HashSet<String>,
    _row: std::marker::PhantomData<R>,
}

impl<R: Row> CsvSink<R> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let links = existing_links(&path)?;

        let mut file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let len = file.metadata()?.len();
        if len > 0 && !ends_with_newline(&mut file, len)? {
            // A crash mid-row left a partial line; start the next row cleanly.
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if len == 0 {
            writer.write_record(R::HEADERS)?;
            writer.flush()?;
        }

        debug!(path = %path.display(), existing = links.len(), "Opened output sheet");
        Ok(Self {
            path,
            writer,
            links,
            _row: std::marker::PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    /// Number of distinct links in the sheet.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Append and flush `row`. Returns `false` without writing when the link
    /// is already in the sheet.
    pub fn append(&mut self, row: &R) -> Result<bool> {
        if self.links.contains(row.link()) {
            return Ok(false);
        }
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.links.insert(row.link().to_string());
        Ok(true)
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Links already written to `path`, read from the `link` column (or the
/// older `googlemaps_link` column).
fn existing_links(path: &Path) -> Result<HashSet<String>> {
    let mut links = HashSet::new();
    if !path.exists() {
        return Ok(links);
    }

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h == "link")
        .or_else(|| headers.iter().position(|h| h == "googlemaps_link"));
    let Some(column) = column else {
        if headers.is_empty() {
            return Ok(links);
        }
        return Err(Error::Storage(format!(
            "{} has no link column",
            path.display()
        )));
    };

    for record in rdr.records() {
        match record {
            Ok(record) => {
                if let Some(link) = record.get(column) {
                    if !link.is_empty() {
                        links.insert(link.to_string());
                    }
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed row"),
        }
    }
    Ok(links)
}

/// Read every listing from a harvest sheet in file order. A missing file
/// reads as empty; malformed rows are skipped.
pub fn read_listings(path: &Path) -> Result<Vec<ListingRef>> {
    if !path.exists() {
        warn!(path = %path.display(), "Harvest file not found, nothing to enrich");
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_path(path)?;
    let mut listings = Vec::new();
    for row in rdr.deserialize::<ListingRef>() {
        match row {
            Ok(listing) if !listing.link.is_empty() => listings.push(listing),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed harvest row"),
        }
    }
    Ok(listings)
}

/// Data rows in a sheet, excluding the header. Missing file counts as zero.
pub fn count_rows(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(rdr.records().filter(|r| r.is_ok()).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn listing(name: &str, link: &str) -> ListingRef {
        ListingRef {
            name: name.to_string(),
            link: link.to_string(),
            keyword: "yarn".to_string(),
            location: "Surat".to_string(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");

        {
            let mut sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
            assert!(sink.append(&listing("Acme", "https://x/1")).unwrap());
        }
        {
            let mut sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
            assert!(sink.contains("https://x/1"));
            assert!(sink.append(&listing("Beta", "https://x/2")).unwrap());
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "name,link,keyword,city\nAcme,https://x/1,yarn,Surat\nBeta,https://x/2,yarn,Surat\n"
        );
        assert_eq!(count_rows(&path).unwrap(), 2);
    }

    #[test]
    fn test_existing_link_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");

        let mut sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
        assert!(sink.append(&listing("Acme", "https://x/1")).unwrap());
        drop(sink);

        let mut sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
        assert!(!sink.append(&listing("Acme again", "https://x/1")).unwrap());
        assert_eq!(sink.len(), 1);
        assert_eq!(count_rows(&path).unwrap(), 1);
    }

    #[test]
    fn test_enriched_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leads.csv");

        let mut sink: CsvSink<EnrichedRecord> = CsvSink::open(&path).unwrap();
        let record = EnrichedRecord::from_listing(
            &listing("Acme", "https://x/1"),
            "9876543210".to_string(),
            None,
        );
        sink.append(&record).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "name,phone,website,link,keyword,city\nAcme,9876543210,,https://x/1,yarn,Surat\n"
        );
    }

    #[test]
    fn test_partial_trailing_row_is_terminated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        std::fs::write(&path, "name,link,keyword,city\nAcme,https://x/1,yarn,Surat\nBro").unwrap();

        let mut sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
        sink.append(&listing("Beta", "https://x/2")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("Bro\nBeta,https://x/2,yarn,Surat\n"));
    }

    #[test]
    fn test_read_listings_accepts_legacy_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        std::fs::write(
            &path,
            "name,googlemaps_link,keyword,city\nAcme,https://x/1,yarn,Surat\nNoLink,,yarn,Surat\n",
        )
        .unwrap();

        let listings = read_listings(&path).unwrap();
        assert_eq!(listings, vec![listing("Acme", "https://x/1")]);

        let sink: CsvSink<ListingRef> = CsvSink::open(&path).unwrap();
        assert!(sink.contains("https://x/1"));
    }

    #[test]
    fn test_missing_harvest_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_listings(&dir.path().join("none.csv")).unwrap().is_empty());
        assert_eq!(count_rows(&dir.path().join("none.csv")).unwrap(), 0);
    }
}
