use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;

use super::{validate_key, DocumentStore, Namespace, RepositoryError};

const EXTENSION: &str = ".json";

/// One pretty-printed JSON file per document under `<root>/<namespace>/`.
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        for namespace in Namespace::ALL {
            fs::create_dir_all(root.join(namespace.as_str())).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.root.join(namespace.as_str()).join(format!("{}{EXTENSION}", encode_key(key)))
    }
}

#[async_trait::async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, RepositoryError> {
        validate_key(key)?;
        let path = self.path_for(namespace, key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let document = serde_json::from_str(&raw).map_err(|error| {
            RepositoryError::Decode(format!("{}: {error}", path.display()))
        })?;
        Ok(Some(document))
    }

    async fn put(
        &self,
        namespace: Namespace,
        key: &str,
        document: &Value,
    ) -> Result<(), RepositoryError> {
        validate_key(key)?;
        let path = self.path_for(namespace, key);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(document)?;

        fs::write(&staging, body).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, RepositoryError> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(namespace, key)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn keys(&self, namespace: Namespace) -> Result<Vec<String>, RepositoryError> {
        let mut entries = fs::read_dir(self.root.join(namespace.as_str())).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(EXTENSION) {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9@+._-]` so keys map to flat file names.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'@' | b'+' | b'.' | b'_' | b'-' => {
                encoded.push(char::from(byte));
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = stem.get(index + 1..index + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            decoded.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(decoded).ok()
}
