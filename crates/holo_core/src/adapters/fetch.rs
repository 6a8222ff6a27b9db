//! Input retrieval: download or copy the study, then unpack it.
//!
//! Endpoints may be `http(s)://` URLs, `file://` URLs or plain paths.
//! Archives are recognised by extension, falling back to magic bytes:
//! - `.zip`
//! - `.tar.gz` / `.tgz`
//! - `.tar`
//!
//! Anything else is copied into the input directory unchanged, so a bare
//! `.nii.gz` or `.glb` works as an endpoint too.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;

use super::error::{AdapterError, AdapterResult};
use super::InputFetcher;
use crate::logging::JobLogger;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
    Plain,
}

/// Default [`InputFetcher`] for URL and filesystem endpoints.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    timeout: Duration,
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ArchiveFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for the whole HTTP download.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn download(&self, url: &str, target: &Path) -> AdapterResult<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let mut response = client.get(url).send()?;

        if !response.status().is_success() {
            return Err(AdapterError::Download {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let mut file =
            File::create(target).map_err(|e| AdapterError::io("create download file", e))?;
        let bytes = response.copy_to(&mut file)?;
        tracing::debug!("Downloaded {} bytes from {}", bytes, url);
        Ok(())
    }
}

impl InputFetcher for ArchiveFetcher {
    fn fetch_and_unpack(
        &self,
        endpoint: &str,
        dest: &Path,
        logger: &JobLogger,
    ) -> AdapterResult<()> {
        let endpoint = endpoint.trim();

        if is_remote(endpoint) {
            let name = remote_file_name(endpoint);
            let staging = dest
                .parent()
                .unwrap_or(dest)
                .join(format!(".download-{}", name));

            logger.info(&format!("Downloading {}", endpoint));
            let result = self
                .download(endpoint, &staging)
                .and_then(|_| unpack(&staging, &name, dest, logger));
            fs::remove_file(&staging).ok();
            return result;
        }

        let source = local_path(endpoint);
        if !source.exists() {
            return Err(AdapterError::FileNotFound(source));
        }

        if source.is_dir() {
            logger.info(&format!("Copying directory {}", source.display()));
            return copy_dir(&source, dest);
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        unpack(&source, &name, dest, logger)
    }
}

fn is_remote(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_path(endpoint: &str) -> PathBuf {
    PathBuf::from(endpoint.strip_prefix("file://").unwrap_or(endpoint))
}

/// Last path segment of a URL without query or fragment.
fn remote_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let name = without_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("input");
    name.to_string()
}

fn detect_kind(name: &str, path: &Path) -> AdapterResult<ArchiveKind> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        return Ok(ArchiveKind::Zip);
    }
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Ok(ArchiveKind::TarGz);
    }
    if lower.ends_with(".tar") {
        return Ok(ArchiveKind::Tar);
    }
    // A single gzip-compressed volume is copied, not unpacked.
    if lower.ends_with(".gz") || lower.contains('.') {
        return Ok(ArchiveKind::Plain);
    }

    let mut magic = [0u8; 4];
    let read = File::open(path)
        .and_then(|mut f| f.read(&mut magic))
        .map_err(|e| AdapterError::io("read archive header", e))?;

    Ok(match &magic[..read] {
        [b'P', b'K', 0x03, 0x04] => ArchiveKind::Zip,
        [0x1f, 0x8b, ..] => ArchiveKind::TarGz,
        _ => ArchiveKind::Plain,
    })
}

fn unpack(archive: &Path, name: &str, dest: &Path, logger: &JobLogger) -> AdapterResult<()> {
    let kind = detect_kind(name, archive)?;
    let archive_err = |message: String| AdapterError::Archive {
        path: archive.to_path_buf(),
        message,
    };

    match kind {
        ArchiveKind::Zip => {
            logger.info(&format!("Unpacking zip archive {}", name));
            let file = File::open(archive).map_err(|e| AdapterError::io("open archive", e))?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;
            zip.extract(dest).map_err(|e| archive_err(e.to_string()))?;
        }
        ArchiveKind::TarGz => {
            logger.info(&format!("Unpacking tar.gz archive {}", name));
            let file = File::open(archive).map_err(|e| AdapterError::io("open archive", e))?;
            tar::Archive::new(GzDecoder::new(file))
                .unpack(dest)
                .map_err(|e| archive_err(e.to_string()))?;
        }
        ArchiveKind::Tar => {
            logger.info(&format!("Unpacking tar archive {}", name));
            let file = File::open(archive).map_err(|e| AdapterError::io("open archive", e))?;
            tar::Archive::new(file)
                .unpack(dest)
                .map_err(|e| archive_err(e.to_string()))?;
        }
        ArchiveKind::Plain => {
            let target = dest.join(if name.is_empty() { "input" } else { name });
            logger.info(&format!("Copying {} into input directory", name));
            fs::copy(archive, &target).map_err(|e| AdapterError::io("copy input", e))?;
        }
    }

    Ok(())
}

fn copy_dir(source: &Path, dest: &Path) -> AdapterResult<()> {
    let entries = fs::read_dir(source).map_err(|e| AdapterError::io("read input directory", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AdapterError::io("read input directory", e))?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        if path.is_dir() {
            fs::create_dir_all(&target).map_err(|e| AdapterError::io("create directory", e))?;
            copy_dir(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|e| AdapterError::io("copy input", e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    fn logger(dir: &Path) -> JobLogger {
        JobLogger::new("fetch-test", dir.join("logs"), LogConfig::default(), None).unwrap()
    }

    fn zip_bytes() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("study/scan.nii", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"volume bytes").unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn write_zip(path: &Path) {
        fs::write(path, zip_bytes()).unwrap();
    }

    /// One-shot HTTP server returning `body`; yields the request line.
    fn serve_once(body: Vec<u8>) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });
        (base, handle)
    }

    #[test]
    fn unpacks_zip_from_plain_path() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("study.zip");
        write_zip(&archive);
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        ArchiveFetcher::new()
            .fetch_and_unpack(archive.to_str().unwrap(), &dest, &logger(dir.path()))
            .unwrap();

        let unpacked = fs::read(dest.join("study").join("scan.nii")).unwrap();
        assert_eq!(unpacked, b"volume bytes");
    }

    #[test]
    fn unpacks_tar_gz_from_file_url() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("study.tgz");
        {
            let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"nifti";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "scan.nii", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let endpoint = format!("file://{}", archive.display());
        ArchiveFetcher::new()
            .fetch_and_unpack(&endpoint, &dest, &logger(dir.path()))
            .unwrap();

        assert_eq!(fs::read(dest.join("scan.nii")).unwrap(), b"nifti");
    }

    #[test]
    fn plain_file_is_copied() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("model.glb");
        fs::write(&source, b"glTF").unwrap();
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        ArchiveFetcher::new()
            .fetch_and_unpack(source.to_str().unwrap(), &dest, &logger(dir.path()))
            .unwrap();

        assert!(dest.join("model.glb").is_file());
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let err = ArchiveFetcher::new()
            .fetch_and_unpack("/does/not/exist.zip", &dest, &logger(dir.path()))
            .unwrap_err();
        assert!(matches!(err, AdapterError::FileNotFound(_)));
    }

    #[test]
    fn corrupt_zip_is_archive_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let err = ArchiveFetcher::new()
            .fetch_and_unpack(archive.to_str().unwrap(), &dest, &logger(dir.path()))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Archive { .. }));
    }

    #[test]
    fn downloads_and_unpacks_remote_zip() {
        let dir = tempdir().unwrap();
        let job_dir = dir.path().join("job-42");
        let dest = job_dir.join("input");
        fs::create_dir_all(&dest).unwrap();
        let (base, server) = serve_once(zip_bytes());

        ArchiveFetcher::new()
            .with_timeout(Duration::from_secs(10))
            .fetch_and_unpack(
                &format!("{}/studies/study.zip?token=abc", base),
                &dest,
                &logger(dir.path()),
            )
            .unwrap();

        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /studies/study.zip?token=abc"));
        assert_eq!(
            fs::read(dest.join("study").join("scan.nii")).unwrap(),
            b"volume bytes"
        );
        assert!(!job_dir.join(".download-study.zip").exists());
        let leftovers: Vec<_> = fs::read_dir(&job_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".download-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unreachable_host_is_network_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let err = ArchiveFetcher::new()
            .with_timeout(Duration::from_secs(5))
            .fetch_and_unpack("http://127.0.0.1:1/study.zip", &dest, &logger(dir.path()))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Network(_)));
        assert!(!dir.path().join(".download-study.zip").exists());
    }

    #[test]
    fn remote_names_strip_query() {
        assert_eq!(
            remote_file_name("https://host/a/study.zip?token=1"),
            "study.zip"
        );
        assert_eq!(remote_file_name("https://host/"), "input");
    }
}
