//! Reads the volume recorded in a packaged chapter's ComicInfo.xml

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use super::traits::VolumeReader;
use crate::error::{Error, Result};
use crate::types::Content;

const COMIC_INFO: &str = "ComicInfo.xml";

/// The part of ComicInfo.xml the planner cares about
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "ComicInfo")]
struct ComicInfo {
    #[serde(rename = "Volume", default)]
    volume: Option<String>,
}

/// [`VolumeReader`] for `.cbz` archives
///
/// Returns the trimmed `<Volume>` element, or an empty string when the archive
/// has no ComicInfo.xml or the element is missing.
#[derive(Clone, Debug, Default)]
pub struct ComicInfoVolumeReader;

#[async_trait]
impl VolumeReader for ComicInfoVolumeReader {
    async fn read_embedded_volume(&self, content: &Content) -> Result<String> {
        let path = content.path.clone();
        tokio::task::spawn_blocking(move || read_volume_blocking(&path))
            .await
            .map_err(|e| Error::Other(format!("volume reader task failed: {}", e)))?
    }
}

fn read_volume_blocking(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let is_comic_info = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(COMIC_INFO));
        if !is_comic_info {
            continue;
        }

        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        return extract_volume(&xml);
    }

    Ok(String::new())
}

fn extract_volume(xml: &str) -> Result<String> {
    let info: ComicInfo = quick_xml::de::from_str(xml)?;
    Ok(info
        .volume
        .map(|v| v.trim().to_string())
        .unwrap_or_default())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_cbz(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (entry, body) in entries {
            zip.start_file(*entry, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn content(path: PathBuf) -> Content {
        Content {
            name: path.file_name().unwrap().to_string_lossy().into_owned(),
            path,
            ..Default::default()
        }
    }

    #[test]
    fn extracts_trimmed_volume() {
        let xml = "<ComicInfo>\n  <Series>X</Series>\n  <Volume> 3 </Volume>\n</ComicInfo>";
        assert_eq!(extract_volume(xml).unwrap(), "3");
        assert_eq!(extract_volume("<ComicInfo></ComicInfo>").unwrap(), "");
    }

    #[test]
    fn ignores_commented_volume_and_decodes_entities() {
        let xml = "<?xml version=\"1.0\"?>\n<ComicInfo>\n  <!-- <Volume>9</Volume> -->\n  <Series>Tom &amp; Jerry</Series>\n</ComicInfo>";
        assert_eq!(extract_volume(xml).unwrap(), "");

        let xml = "<ComicInfo><Volume>1 &amp; 2</Volume></ComicInfo>";
        assert_eq!(extract_volume(xml).unwrap(), "1 & 2");
    }

    #[test]
    fn malformed_comic_info_is_an_error() {
        let result = extract_volume("<ComicInfo><Volume>2</Series></ComicInfo>");
        assert!(matches!(result, Err(Error::Xml(_))));
    }

    #[tokio::test]
    async fn reads_volume_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cbz(
            dir.path(),
            "Title Ch. 0001.cbz",
            &[
                ("page 0001.jpg", "img"),
                ("comicinfo.xml", "<ComicInfo><Volume>2</Volume></ComicInfo>"),
            ],
        );

        let volume = ComicInfoVolumeReader
            .read_embedded_volume(&content(path))
            .await
            .unwrap();
        assert_eq!(volume, "2");
    }

    #[tokio::test]
    async fn archive_without_comic_info_has_no_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cbz(dir.path(), "Title Ch. 0001.cbz", &[("page 0001.jpg", "img")]);

        let volume = ComicInfoVolumeReader
            .read_embedded_volume(&content(path))
            .await
            .unwrap();
        assert_eq!(volume, "");
    }

    #[tokio::test]
    async fn unreadable_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cbz");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let result = ComicInfoVolumeReader.read_embedded_volume(&content(path)).await;
        assert!(matches!(result, Err(Error::Archive(_))));
    }
}
