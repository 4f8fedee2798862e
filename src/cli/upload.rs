use crate::models::FileDescriptor;
use crate::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Register brief files with the session
pub fn run(project_root: &Path, files: &[PathBuf]) -> Result<()> {
    let descriptors = files
        .iter()
        .map(|path| describe_file(path))
        .collect::<Result<Vec<_>>>()?;

    let mut controller = super::open_session(project_root)?;
    controller.upload_files(descriptors.clone())?;

    for file in &descriptors {
        println!("   ✓ {} ({}, {} bytes)", file.name, file.mime_type, file.size);
    }
    println!("Next: {}", "briefflow generate".cyan());
    Ok(())
}

/// Accept the parsed brief so motivations can be generated
pub fn confirm_brief(project_root: &Path) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    controller.confirm_brief()?;

    if let Some(brief) = &controller.state().brief_data {
        println!("{}", "✅ Brief confirmed".green());
        println!("   Objective: {}", brief.objective);
        if !brief.target_audience.is_empty() {
            println!("   Audience:  {}", brief.target_audience);
        }
    }
    Ok(())
}

/// Leading bytes handed to content sniffing
const SNIFF_LEN: u64 = 8192;

/// Build a descriptor from a file on disk; content sniffing wins over extension
pub fn describe_file(path: &Path) -> Result<FileDescriptor> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut head = Vec::new();
    fs::File::open(path)
        .and_then(|file| file.take(SNIFF_LEN).read_to_end(&mut head))
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(FileDescriptor::new(
        name,
        metadata.len(),
        detect_mime(&head, path),
    ))
}

fn detect_mime(bytes: &[u8], path: &Path) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
    .to_string()
}
