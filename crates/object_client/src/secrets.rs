//! Vendor credentials read from on-disk secret files.
//!
//! Each record is loaded exactly once per process from a fixed directory
//! mounted by the deployment (`/amazon-secret`, `/google-secret`,
//! `/microsoft-secret`); there is no rotation or reload.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;

use crate::ObjectResult;

const AMAZON_SECRET_DIR: &str = "/amazon-secret";
const GOOGLE_SECRET_DIR: &str = "/google-secret";
const MICROSOFT_SECRET_DIR: &str = "/microsoft-secret";

static AMAZON: OnceLock<AmazonCredentials> = OnceLock::new();
static GOOGLE: OnceLock<GoogleCredentials> = OnceLock::new();
static MICROSOFT: OnceLock<MicrosoftCredentials> = OnceLock::new();

fn read_secret(dir: &Path, name: &str) -> ObjectResult<String> {
    let path = dir.join(name);
    let value = std::fs::read_to_string(&path)
        .with_context(|| format!("reading secret file {}", path.display()))?;
    Ok(value.trim_end().to_string())
}

#[derive(Debug, Clone)]
pub struct AmazonCredentials {
    pub bucket: String,
    pub id: String,
    pub secret: String,
    pub token: String,
    pub region: String,
}

impl AmazonCredentials {
    pub fn read_from(dir: &Path) -> ObjectResult<Self> {
        Ok(AmazonCredentials {
            bucket: read_secret(dir, "bucket")?,
            id: read_secret(dir, "id")?,
            secret: read_secret(dir, "secret")?,
            token: read_secret(dir, "token")?,
            region: read_secret(dir, "region")?,
        })
    }

    /// Process-wide credentials from `/amazon-secret`, loaded on first use.
    pub fn load() -> ObjectResult<&'static Self> {
        if let Some(creds) = AMAZON.get() {
            return Ok(creds);
        }
        let creds = Self::read_from(Path::new(AMAZON_SECRET_DIR))?;
        Ok(AMAZON.get_or_init(|| creds))
    }
}

#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub bucket: String,
}

impl GoogleCredentials {
    pub fn read_from(dir: &Path) -> ObjectResult<Self> {
        Ok(GoogleCredentials {
            bucket: read_secret(dir, "bucket")?,
        })
    }

    /// Process-wide credentials from `/google-secret`, loaded on first use.
    pub fn load() -> ObjectResult<&'static Self> {
        if let Some(creds) = GOOGLE.get() {
            return Ok(creds);
        }
        let creds = Self::read_from(Path::new(GOOGLE_SECRET_DIR))?;
        Ok(GOOGLE.get_or_init(|| creds))
    }
}

#[derive(Debug, Clone)]
pub struct MicrosoftCredentials {
    pub container: String,
    pub id: String,
    pub secret: String,
}

impl MicrosoftCredentials {
    pub fn read_from(dir: &Path) -> ObjectResult<Self> {
        Ok(MicrosoftCredentials {
            container: read_secret(dir, "container")?,
            id: read_secret(dir, "id")?,
            secret: read_secret(dir, "secret")?,
        })
    }

    /// Process-wide credentials from `/microsoft-secret`, loaded on first use.
    pub fn load() -> ObjectResult<&'static Self> {
        if let Some(creds) = MICROSOFT.get() {
            return Ok(creds);
        }
        let creds = Self::read_from(Path::new(MICROSOFT_SECRET_DIR))?;
        Ok(MICROSOFT.get_or_init(|| creds))
    }
}
