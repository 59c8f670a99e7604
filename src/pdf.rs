use crate::browser::{BrowserError, BrowserGuard, BrowserHandle, Engine, NetworkIdle, PageHandle, PdfOptions};
use crate::request::{ConversionRequest, RequestError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Invalid print parameter: {0}")]
    RequestError(#[from] RequestError),
    #[error("Browser Error: {0}")]
    BrowserError(#[from] BrowserError),
    #[error("Renderer returned something that is not a PDF ({0} bytes)")]
    NotAPdf(usize),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PdfError>;

/// Renders `request.html` to `request.path` with a fresh browser from `engine`.
///
/// The browser work is blocking, so it runs on tokio's blocking pool.
pub async fn generate<E>(engine: E, request: ConversionRequest, idle: NetworkIdle) -> Result<PathBuf>
where
    E: Engine + Send + 'static,
{
    tokio::task::spawn_blocking(move || generate_blocking(&engine, &request, &idle)).await?
}

pub fn generate_blocking<E: Engine>(engine: &E, request: &ConversionRequest, idle: &NetworkIdle) -> Result<PathBuf> {
    let options = PdfOptions::try_from(request)?;
    log::debug!("Print options: {:?}", options);

    log::info!("Launching browser");
    let browser = BrowserGuard::new(engine.launch()?);

    let pdf = render(&browser, &request.html, &options, idle)?;

    browser.close()?;
    log::info!("Browser closed");

    write_pdf(&request.path, &pdf)?;
    log::info!("Wrote {} bytes to {}", pdf.len(), request.path.display());

    Ok(request.path.clone())
}

fn render<B: BrowserHandle>(browser: &BrowserGuard<B>, html: &str, options: &PdfOptions, idle: &NetworkIdle) -> Result<Vec<u8>> {
    let page = browser.new_page()?;

    log::info!("Loading {} bytes of HTML", html.len());
    page.set_content(html, idle)?;

    log::info!("Rendering PDF");
    let pdf = page.pdf(options)?;

    if !pdf.starts_with(PDF_SIGNATURE) {
        return Err(PdfError::NotAPdf(pdf.len()));
    }

    Ok(pdf)
}

/// Replaces `path` in one rename so readers never see a half written file.
fn write_pdf(path: &Path, pdf: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = output_file(directory)?;
    // an overwritten target keeps its mode, as with a plain in-place write
    if let Ok(existing) = std::fs::metadata(path) {
        file.as_file().set_permissions(existing.permissions())?;
    }
    file.write_all(pdf)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Temp file created with mode 0o666 so the umask applies, like `std::fs::write`.
#[cfg(unix)]
fn output_file(directory: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(directory)
}

#[cfg(not(unix))]
fn output_file(directory: &Path) -> std::io::Result<NamedTempFile> {
    NamedTempFile::new_in(directory)
}
