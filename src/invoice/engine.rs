//! External document conversion.
//!
//! Writes the filled template into a fresh temporary directory, runs the
//! converter as a child process and reads back the produced PDF. The
//! directory is removed when the conversion returns, successful or not.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use tempfile::TempDir;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::ConverterConfig;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] io::Error),
    #[error("failed to write converter input: {0}")]
    WriteSource(#[source] io::Error),
    #[error("failed to launch converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("converter exited with status {code}: {stderr}")]
    Exit { code: i32, stderr: String },
    #[error("converted PDF not found in {0}")]
    MissingOutput(String),
    #[error("failed to read converted PDF: {0}")]
    ReadPdf(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    /// LibreOffice in headless mode; templates are flat OpenDocument text.
    Soffice,
    /// Typst CLI; templates are Typst source.
    Typst,
}

impl ConverterKind {
    pub fn source_extension(&self) -> &'static str {
        match self {
            ConverterKind::Soffice => "fodt",
            ConverterKind::Typst => "typ",
        }
    }
}

impl FromStr for ConverterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "soffice" | "libreoffice" => Ok(ConverterKind::Soffice),
            "typst" => Ok(ConverterKind::Typst),
            other => Err(format!("unknown converter '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionEngine {
    kind: ConverterKind,
    program: String,
    scratch_dir: Option<PathBuf>,
}

impl ConversionEngine {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            kind: config.kind,
            program: config.program.clone(),
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    pub fn kind(&self) -> ConverterKind {
        self.kind
    }

    fn scratch(&self) -> Result<TempDir, ConversionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("invoice-");
        let dir = match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        };
        dir.map_err(ConversionError::TempDir)
    }

    /// Convert a filled template source into PDF bytes.
    pub async fn convert(&self, source: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let temp_dir = self.scratch()?;
        let stem = format!("invoice-{}", Uuid::new_v4());
        let input = temp_dir
            .path()
            .join(format!("{}.{}", stem, self.kind.source_extension()));

        fs::write(&input, source)
            .await
            .map_err(ConversionError::WriteSource)?;

        let output = match self.kind {
            ConverterKind::Soffice => self.run_soffice(temp_dir.path(), &input, &stem).await?,
            ConverterKind::Typst => self.run_typst(temp_dir.path(), &input, &stem).await?,
        };

        let pdf = fs::read(&output).await.map_err(ConversionError::ReadPdf)?;
        log::info!("Converted invoice template with {} ({} bytes)", self.program, pdf.len());
        Ok(pdf)
    }

    async fn run_soffice(
        &self,
        workdir: &Path,
        input: &Path,
        stem: &str,
    ) -> Result<PathBuf, ConversionError> {
        // A private profile lets conversions run side by side.
        let profile = format!("-env:UserInstallation=file://{}", workdir.join("profile").display());

        let mut command = Command::new(&self.program);
        command
            .arg(profile)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(workdir)
            .arg(input);
        self.run(command).await?;

        locate_output(workdir, stem).await
    }

    async fn run_typst(
        &self,
        workdir: &Path,
        input: &Path,
        stem: &str,
    ) -> Result<PathBuf, ConversionError> {
        let output = workdir.join(format!("{stem}.pdf"));

        let mut command = Command::new(&self.program);
        command
            .arg("compile")
            .arg(input)
            .arg(&output)
            .current_dir(workdir);
        self.run(command).await?;

        Ok(output)
    }

    async fn run(&self, mut command: Command) -> Result<(), ConversionError> {
        let result = command
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            let code = result.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            log::error!("Conversion failed with status {}: {}", code, stderr);
            return Err(ConversionError::Exit { code, stderr });
        }

        Ok(())
    }
}

/// LibreOffice names its output after the input stem, but versions differ in
/// how they treat unusual names, so fall back to scanning the directory.
async fn locate_output(dir: &Path, stem: &str) -> Result<PathBuf, ConversionError> {
    let expected = dir.join(format!("{stem}.pdf"));
    if fs::try_exists(&expected).await.unwrap_or(false) {
        return Ok(expected);
    }

    let missing = || ConversionError::MissingOutput(dir.display().to_string());
    let mut entries = fs::read_dir(dir).await.map_err(|_| missing())?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(stem) && name.ends_with(".pdf") {
            return Ok(entry.path());
        }
    }

    Err(missing())
}
