//! Conversion of RTF and DOCX sources into PDF.
//!
//! The packager only relies on the [`DocumentConverter`] contract: a source path goes in and the
//! path of a PDF inside the given output directory comes out, or the call fails. The production
//! implementation drives a headless office suite.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ConversionError;
use crate::model::DocumentFormat;

/// Interval between checks on a running conversion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Converts word-processor documents into PDF.
///
/// Calls block until the PDF is written or the conversion failed. Converting the same source
/// twice into the same directory yields the same path.
pub trait DocumentConverter {
    /// Converts `source` and returns the path of the produced PDF inside `output_dir`.
    fn convert_to_pdf(&self, source: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError>;
}

/// Converter running `soffice --headless --convert-to pdf` (or a compatible command).
#[derive(Clone, Debug)]
pub struct OfficeConverter {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl OfficeConverter {
    /// Creates a converter from a command line such as `soffice` or
    /// `flatpak run org.libreoffice.LibreOffice`.
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "soffice".to_string());
        Self {
            program,
            leading_args: words.collect(),
            timeout,
        }
    }

    /// Executable that is spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn expected_output(source: &Path, output_dir: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        output_dir.join(format!("{stem}.pdf"))
    }
}

/// Reads the child's stderr to the end so a chatty converter never blocks on a full pipe.
fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        pipe.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    })
}

fn collect_stderr(drain: Option<JoinHandle<io::Result<String>>>) -> io::Result<String> {
    match drain {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "stderr reader panicked"))?,
        None => Ok(String::new()),
    }
}

impl DocumentConverter for OfficeConverter {
    fn convert_to_pdf(&self, source: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        let io_error = |source_err| ConversionError::Io {
            path: source.to_path_buf(),
            source: source_err,
        };

        if DocumentFormat::from_path(source) == Some(DocumentFormat::Pdf) {
            return Err(ConversionError::NotConvertible(source.to_path_buf()));
        }
        if !source.is_file() {
            return Err(ConversionError::Failed {
                path: source.to_path_buf(),
                message: "source file is missing".to_string(),
            });
        }
        fs::create_dir_all(output_dir).map_err(io_error)?;

        let expected = Self::expected_output(source, output_dir);
        if expected.exists() {
            fs::remove_file(&expected).map_err(io_error)?;
        }

        log::debug!("converting {} with {}", source.display(), self.program);
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(output_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ConversionError::Unavailable {
                program: self.program.clone(),
                source: err,
            })?;
        let drain = child.stderr.take().map(drain_stderr);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(io_error)? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                // The child may already have exited between the checks.
                if let Err(err) = child.kill() {
                    log::debug!("failed to kill converter: {err}");
                }
                if let Err(err) = child.wait() {
                    log::debug!("failed to reap converter: {err}");
                }
                // Descendants may still hold the pipe; the reader finishes on its own.
                drop(drain);
                return Err(ConversionError::Timeout {
                    path: source.to_path_buf(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = collect_stderr(drain).map_err(io_error)?;

        if !status.success() {
            let message = match stderr.trim() {
                "" => format!("converter exited with {status}"),
                text => text.to_string(),
            };
            return Err(ConversionError::Failed {
                path: source.to_path_buf(),
                message,
            });
        }
        if !expected.is_file() {
            return Err(ConversionError::MissingOutput {
                path: source.to_path_buf(),
                expected,
            });
        }

        log::debug!("converted {} to {}", source.display(), expected.display());
        Ok(expected)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::{DocumentConverter, OfficeConverter};
    use crate::error::ConversionError;

    fn script_converter(dir: &Path, body: &str, timeout: Duration) -> OfficeConverter {
        let script = dir.join("fake-office.sh");
        fs::write(&script, body).expect("write script");
        OfficeConverter::new(&format!("sh {}", script.display()), timeout)
    }

    fn source(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("t_14_1.rtf");
        fs::write(&path, br"{\rtf1 x}").expect("write source");
        path
    }

    #[test]
    fn returns_pdf_written_to_output_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let converter = script_converter(
            dir.path(),
            "name=$(basename \"$6\")\nprintf '%%PDF-1.4' > \"$5/${name%.*}.pdf\"\n",
            Duration::from_secs(10),
        );
        let out = dir.path().join("out");

        let pdf = converter
            .convert_to_pdf(&source(dir.path()), &out)
            .expect("convert");
        assert_eq!(pdf, out.join("t_14_1.pdf"));
        assert!(pdf.is_file());

        let again = converter
            .convert_to_pdf(&source(dir.path()), &out)
            .expect("convert again");
        assert_eq!(again, pdf);
    }

    #[test]
    fn reports_missing_program_as_unavailable() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let converter = OfficeConverter::new("tlf-no-such-office-suite", Duration::from_secs(1));
        let err = converter
            .convert_to_pdf(&source(dir.path()), dir.path())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ConversionError::Unavailable { .. }));
    }

    #[test]
    fn reports_failures_and_missing_output() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let failing = script_converter(
            dir.path(),
            "echo 'source file could not be loaded' >&2\nexit 3\n",
            Duration::from_secs(10),
        );
        match failing.convert_to_pdf(&source(dir.path()), dir.path()) {
            Err(ConversionError::Failed { message, .. }) => {
                assert_eq!(message, "source file could not be loaded")
            }
            other => panic!("unexpected result {other:?}"),
        }

        let silent = script_converter(dir.path(), "exit 0\n", Duration::from_secs(10));
        assert!(matches!(
            silent.convert_to_pdf(&source(dir.path()), dir.path()),
            Err(ConversionError::MissingOutput { .. })
        ));
    }

    #[test]
    fn kills_conversions_exceeding_timeout() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let slow = script_converter(dir.path(), "sleep 5\n", Duration::from_millis(300));
        let err = slow
            .convert_to_pdf(&source(dir.path()), dir.path())
            .unwrap_err();
        match &err {
            ConversionError::Timeout { timeout, .. } => {
                assert_eq!(*timeout, Duration::from_millis(300))
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().ends_with("timed out after 300ms"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn survives_converters_flooding_stderr() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let chatty = script_converter(
            dir.path(),
            "head -c 200000 /dev/zero | tr '\\0' 'x' >&2\n\
             name=$(basename \"$6\")\nprintf '%%PDF-1.4' > \"$5/${name%.*}.pdf\"\n",
            Duration::from_secs(20),
        );
        let out = dir.path().join("out");

        let pdf = chatty
            .convert_to_pdf(&source(dir.path()), &out)
            .expect("convert despite noisy stderr");
        assert_eq!(pdf, out.join("t_14_1.pdf"));
    }

    #[test]
    fn refuses_pdf_sources() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let pdf = dir.path().join("f_14_2.pdf");
        fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let converter = script_converter(dir.path(), "exit 0\n", Duration::from_secs(10));

        match converter.convert_to_pdf(&pdf, dir.path()) {
            Err(ConversionError::NotConvertible(path)) => assert_eq!(path, pdf),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
