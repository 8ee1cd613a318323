use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use tempfile::TempDir;
use walkdir::WalkDir;

// Each test binary uses a different subset of these helpers.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub fixtures: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        let fixtures = temp_dir.path().join("fixtures");
        fs::create_dir_all(&fixtures).expect("Failed to create fixtures dir");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_appkeeper"));

        Self {
            _temp_dir: temp_dir,
            data_dir,
            fixtures,
            bin_path,
        }
    }

    pub fn config(&self) -> appkeeper::Config {
        appkeeper::Config::with_data_root(&self.data_dir)
    }

    pub fn app_dir(&self, name: &str) -> PathBuf {
        self.config().app_dir(name)
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("APPKEEPER_DATA", &self.data_dir);
        cmd.env("APPKEEPER_RUN_SETUP", "false");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// The archive with a single `common-root/` directory on top.
    pub fn common_root_zip(&self) -> PathBuf {
        let path = self.fixtures.join("install-test.zip");
        write_zip(&path, &COMMON_ROOT_ENTRIES);
        path
    }

    pub fn common_root_tar_gz(&self) -> PathBuf {
        let path = self.fixtures.join("install-test.tar.gz");
        write_tar_gz(&path, &common_root_tar_items());
        path
    }

    pub fn common_root_tar_xz(&self) -> PathBuf {
        let path = self.fixtures.join("install-test.tar.xz");
        write_tar_xz(&path, &common_root_tar_items());
        path
    }

    pub fn flat_zip(&self) -> PathBuf {
        let path = self.fixtures.join("install-test-flat.zip");
        write_zip(&path, &[("file1.txt", "one"), ("file2.txt", "two")]);
        path
    }
}

#[allow(dead_code)]
pub const COMMON_ROOT_ENTRIES: [(&str, &str); 7] = [
    ("common-root/", ""),
    ("common-root/dir1/", ""),
    ("common-root/dir1/dir1.txt", "dir1"),
    ("common-root/dir1/file.txt", "file in dir1"),
    ("common-root/dir2/", ""),
    ("common-root/dir2/dir2.txt", "dir2"),
    ("common-root/dir2/file.txt", "file in dir2"),
];

/// Writes a zip archive. Names ending in `/` become directories.
#[allow(dead_code)]
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).expect("Failed to create zip");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).expect("Failed to add directory");
        } else {
            zip.start_file(*name, options).expect("Failed to start file");
            zip.write_all(content.as_bytes()).expect("Failed to write file");
        }
    }
    zip.finish().expect("Failed to finish zip");
}

#[allow(dead_code)]
pub enum TarItem<'a> {
    Dir(&'a str),
    File(&'a str, &'a str),
    Symlink(&'a str, &'a str),
}

#[allow(dead_code)]
pub fn common_root_tar_items() -> Vec<TarItem<'static>> {
    COMMON_ROOT_ENTRIES
        .iter()
        .map(|&(name, content)| {
            if name.ends_with('/') {
                TarItem::Dir(name)
            } else {
                TarItem::File(name, content)
            }
        })
        .collect()
}

/// Builds an uncompressed tar. Names are written raw, so entries like
/// `../x` that the tar crate refuses to add are possible.
#[allow(dead_code)]
pub fn tar_bytes(items: &[TarItem]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for item in items {
        let mut header = tar::Header::new_gnu();
        let (name, body) = match item {
            TarItem::Dir(name) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                (*name, &b""[..])
            }
            TarItem::File(name, content) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                (*name, content.as_bytes())
            }
            TarItem::Symlink(name, points_to) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_link_name(points_to).expect("Failed to set link name");
                (*name, &b""[..])
            }
        };
        let slot = &mut header.as_gnu_mut().expect("GNU header").name;
        slot[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(body.len() as u64);
        header.set_cksum();
        builder.append(&header, body).expect("Failed to append tar entry");
    }
    builder.into_inner().expect("Failed to finish tar")
}

#[allow(dead_code)]
pub fn write_tar_gz(path: &Path, items: &[TarItem]) {
    let file = fs::File::create(path).expect("Failed to create tar.gz");
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(&tar_bytes(items)).expect("Failed to write tar.gz");
    encoder.finish().expect("Failed to finish tar.gz");
}

#[allow(dead_code)]
pub fn write_tar_xz(path: &Path, items: &[TarItem]) {
    let file = fs::File::create(path).expect("Failed to create tar.xz");
    let mut encoder = xz2::write::XzEncoder::new(file, 6);
    encoder.write_all(&tar_bytes(items)).expect("Failed to write tar.xz");
    encoder.finish().expect("Failed to finish tar.xz");
}

/// Relative paths of every file under `root`, skipping `.git`.
#[allow(dead_code)]
pub fn list_files(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .expect("walk stays below root")
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[allow(dead_code)]
pub fn set_of(files: &[&str]) -> BTreeSet<String> {
    files.iter().map(|f| f.to_string()).collect()
}

/// Serves fixed files over HTTP on localhost until the test process exits.
#[allow(dead_code)]
pub struct FixtureServer {
    pub base_url: String,
}

#[allow(dead_code)]
impl FixtureServer {
    pub fn start(files: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fixture server");
        let addr = listener.local_addr().expect("Fixture server has no address");

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Ok(reader_stream) = stream.try_clone() else { continue };
                let mut reader = BufReader::new(reader_stream);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header.trim().is_empty() => break,
                        Ok(_) => {}
                    }
                }

                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .split('?')
                    .next()
                    .unwrap_or("")
                    .trim_start_matches('/')
                    .to_string();
                let (status, body) = match files.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"not found".to_vec()),
                };

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        Self {
            base_url: format!("http://{}/", addr),
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}",
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
