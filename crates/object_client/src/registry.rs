//! Backend registry: constructs an [`ObjectClient`] from a backend name.

use std::path::Path;
use std::sync::Arc;

use crate::backends::local::LocalClient;
use crate::secrets::{AmazonCredentials, GoogleCredentials, MicrosoftCredentials};
use crate::{AmazonClient, GoogleClient, MicrosoftClient, ObjectClient, ObjectError, ObjectResult};

/// Recognized backends. `local_root` is only used by the `local` backend;
/// cloud vendors take their credentials from the process-wide secret files.
pub fn new_client(backend: &str, local_root: &Path) -> ObjectResult<Arc<dyn ObjectClient>> {
    match backend {
        "amazon" => Ok(Arc::new(AmazonClient::new(AmazonCredentials::load()?)?)),
        "google" => Ok(Arc::new(GoogleClient::new(GoogleCredentials::load()?)?)),
        "microsoft" => Ok(Arc::new(MicrosoftClient::new(
            MicrosoftCredentials::load()?,
        )?)),
        "local" => Ok(Arc::new(LocalClient::new(local_root))),
        other => Err(ObjectError::UnsupportedBackend {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_constructs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(new_client("local", dir.path()).is_ok());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = new_client("ftp", dir.path()).unwrap_err();
        assert!(matches!(err, ObjectError::UnsupportedBackend { .. }));
    }
}
