use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// A DOCX zip container held fully in memory.
///
/// Entries keep their original order, compression method and timestamps so that a
/// package written back with no replacements is equivalent to the one read.
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
}

struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    last_modified: zip::DateTime,
    unix_mode: Option<u32>,
    is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        let mut zip = ZipArchive::new(f)
            .with_context(|| format!("not a docx package: {}", path.display()))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        let pkg = Self { entries };
        pkg.check_layout()
            .with_context(|| format!("invalid docx: {}", path.display()))?;
        Ok(pkg)
    }

    fn check_layout(&self) -> anyhow::Result<()> {
        for required in [CONTENT_TYPES_PART, MAIN_DOCUMENT_PART] {
            if self.part(required).is_none() {
                return Err(anyhow!("missing package part {required}"));
            }
        }
        Ok(())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .map(|e| e.data.as_slice())
    }

    pub fn main_document(&self) -> anyhow::Result<&[u8]> {
        self.part(MAIN_DOCUMENT_PART)
            .with_context(|| format!("missing {MAIN_DOCUMENT_PART}"))
    }

    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let f = File::create(output_path)
            .with_context(|| format!("create output docx: {}", output_path.display()))?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let data = replacements
                .get(&ent.name)
                .map(Vec::as_slice)
                .unwrap_or(ent.data.as_slice());
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::{DocxPackage, MAIN_DOCUMENT_PART};

    /// Writes a minimal DOCX whose main part is `document_xml`.
    pub(crate) fn write_test_docx(path: &Path, document_xml: &str) {
        let f = std::fs::File::create(path).expect("create docx");
        let mut z = ZipWriter::new(f);
        let opts = SimpleFileOptions::default();
        z.start_file("[Content_Types].xml", opts).expect("start");
        z.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .expect("write");
        z.start_file(MAIN_DOCUMENT_PART, opts).expect("start");
        z.write_all(document_xml.as_bytes()).expect("write");
        z.finish().expect("finish");
    }

    #[test]
    fn rejects_zip_without_main_part() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.docx");
        let f = std::fs::File::create(&path).expect("create");
        let mut z = ZipWriter::new(f);
        z.start_file("hello.txt", SimpleFileOptions::default()).expect("start");
        z.write_all(b"hi").expect("write");
        z.finish().expect("finish");

        assert!(DocxPackage::read(&path).is_err());
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("garbage.docx");
        std::fs::write(&path, b"definitely not a zip").expect("write");
        assert!(DocxPackage::read(&path).is_err());
    }

    #[test]
    fn replacement_only_touches_named_part() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.docx");
        write_test_docx(&input, "<w:document/>");

        let pkg = DocxPackage::read(&input).expect("read");
        let mut repl = std::collections::HashMap::new();
        repl.insert(MAIN_DOCUMENT_PART.to_string(), b"<w:document></w:document>".to_vec());
        pkg.write_with_replacements(&output, &repl).expect("write");

        let out = DocxPackage::read(&output).expect("read back");
        assert_eq!(
            out.main_document().expect("main"),
            b"<w:document></w:document>"
        );
        assert_eq!(
            out.part("[Content_Types].xml"),
            pkg.part("[Content_Types].xml")
        );
    }
}
