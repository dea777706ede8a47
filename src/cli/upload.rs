use std::io::Read;
use std::path::Path;

use base64::Engine;
use colored::Colorize;

use crate::cli::open_ledger;
use crate::error::{LedgerError, Result};
use crate::models::{UploadRequest, UploadResponse};

/// Encode a local file the way the web client does and submit it.
pub fn run(file: &str, plan: &str, name: Option<&str>, json: bool) -> Result<()> {
    let path = Path::new(file);
    let bytes = std::fs::read(path)?;
    let file_name = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string()),
    };
    let request = UploadRequest {
        file_name,
        base64_content: base64::engine::general_purpose::STANDARD.encode(bytes),
        plan_identifier: plan.to_string(),
    };

    let response = open_ledger()?.upload(&request);
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    report(response)
}

fn report(response: UploadResponse) -> Result<()> {
    match (response.success, response.message, response.error) {
        (true, Some(message), _) => {
            println!("{}", message.green());
            Ok(())
        }
        (true, None, _) => Ok(()),
        (false, _, error) => Err(LedgerError::Other(
            error.unwrap_or_else(|| "Upload failed".to_string()),
        )),
    }
}

/// Read one JSON upload request from a file or stdin and print the JSON response.
pub fn request(input: Option<&str>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let response = match serde_json::from_str::<UploadRequest>(&raw) {
        Ok(request) => open_ledger()?.upload(&request),
        Err(e) => UploadResponse::failed(format!("Invalid upload request: {e}")),
    };
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
