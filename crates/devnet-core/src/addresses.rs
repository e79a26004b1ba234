//! Contract address lookup in artifacts produced by a running devnet.
//!
//! A query is `<artifact>:<contract>`:
//! - `.a.b` reads the path `addresses.a.b`
//! - `name` returns the first value stored under key `name` anywhere
//! - an empty contract returns the whole document
//!
//! Each artifact is downloaded once per call, and the first `.json` file in
//! it is the document queried.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use devnet_engine::{Enclave, Engine};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::enclave::EnclaveManager;
use crate::error::{DevnetError, Result};

const QUERY_DELIMITER: char = ':';
const ADDRESSES_KEY: &str = "addresses";

/// A parsed `<artifact>:<contract>` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressQuery {
    pub artifact: String,
    pub contract: String,
}

impl FromStr for AddressQuery {
    type Err = DevnetError;

    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.split(QUERY_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(artifact), Some(contract), None) => Ok(Self {
                artifact: artifact.to_string(),
                contract: contract.to_string(),
            }),
            _ => Err(DevnetError::InvalidQuery(raw.to_string())),
        }
    }
}

/// Answer to one query, in request order.
#[derive(Debug)]
pub struct AddressAnswer {
    pub query: String,
    pub result: Result<String>,
}

/// Look `contract` up in `document`.
pub fn lookup<'a>(document: &'a Value, contract: &str) -> Option<&'a Value> {
    if contract.is_empty() {
        return Some(document);
    }
    if let Some(path) = contract.strip_prefix('.') {
        let root = document.get(ADDRESSES_KEY)?;
        return path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(root, |value, segment| match value {
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                other => other.get(segment),
            });
    }
    dig(document, contract)
}

/// First value under `key` in a depth-first walk, in document order.
fn dig<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| dig(child, key))),
        Value::Array(items) => items.iter().find_map(|child| dig(child, key)),
        _ => None,
    }
}

/// Strings print bare, everything else as pretty JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Read the first `.json` file directly inside `dir`.
pub fn read_json_artifact(dir: &Path, artifact: &str) -> Result<Value> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();
    let path = entries
        .into_iter()
        .next()
        .ok_or_else(|| DevnetError::NoJsonFile(artifact.to_string()))?;
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn fetch_document(enclave: &dyn Enclave, artifact: &str) -> Result<Value> {
    let cache = tempfile::Builder::new().prefix(".devnet_cache").tempdir()?;
    let dest = cache.path().join(artifact);
    tokio::fs::create_dir_all(&dest).await?;
    enclave.download_files(artifact, &dest).await?;
    read_json_artifact(&dest, artifact)
}

/// Answer every query against the devnet `devnet_name`.
///
/// Fails as a whole only when the devnet isn't running; per-query failures
/// are reported in the returned answers.
#[instrument(skip(engine, queries))]
pub async fn get_addresses(
    engine: Arc<dyn Engine>,
    devnet_name: &str,
    queries: &[String],
) -> Result<Vec<AddressAnswer>> {
    let enclave = EnclaveManager::new(engine).get(devnet_name).await?;
    let mut documents: HashMap<String, std::result::Result<Value, String>> = HashMap::new();
    let mut answers = Vec::with_capacity(queries.len());

    for raw in queries {
        let result = match raw.parse::<AddressQuery>() {
            Ok(query) => {
                if !documents.contains_key(&query.artifact) {
                    debug!(artifact = %query.artifact, "downloading artifact");
                    let document = fetch_document(enclave.as_ref(), &query.artifact)
                        .await
                        .map_err(|e| e.to_string());
                    documents.insert(query.artifact.clone(), document);
                }
                match documents.get(&query.artifact) {
                    Some(Ok(document)) => lookup(document, &query.contract)
                        .map(render)
                        .ok_or_else(|| DevnetError::AddressNotFound {
                            artifact: query.artifact.clone(),
                            query: query.contract.clone(),
                        }),
                    Some(Err(reason)) => Err(DevnetError::ArtifactUnavailable {
                        artifact: query.artifact.clone(),
                        reason: reason.clone(),
                    }),
                    None => Err(DevnetError::NoJsonFile(query.artifact.clone())),
                }
            }
            Err(err) => Err(err),
        };
        answers.push(AddressAnswer {
            query: raw.clone(),
            result,
        });
    }
    Ok(answers)
}
