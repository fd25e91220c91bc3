//! Contract artifact resolution
//!
//! The orchestrator never reaches into a build tree by relative path. It asks
//! an [`ArtifactSource`] for "ABI + bytecode of contract X" and builds the
//! creation code from that.
//!
//! Two sources ship with the crate:
//!
//! - [`ArtifactDirectory`] reads Hardhat (`artifacts/contracts/X.sol/X.json`)
//!   and Foundry (`out/X.sol/X.json`) build output
//! - [`InMemoryArtifacts`] holds artifacts registered at runtime

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DeployError, Result};

/// Compiled contract: ABI and creation bytecode
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    pub fn new(contract_name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode,
        }
    }

    /// Creation code: bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// Arguments are type-checked against the artifact's constructor.
    pub fn deploy_code(&self, args: &[DynSolValue]) -> Result<Bytes> {
        if self.bytecode.is_empty() {
            return Err(DeployError::artifact(
                &self.contract_name,
                "artifact has no creation bytecode (abstract contract or interface?)",
            ));
        }

        let mut code = self.bytecode.to_vec();
        match &self.abi.constructor {
            Some(constructor) => {
                let encoded = constructor.abi_encode_input(args).map_err(|e| {
                    DeployError::artifact(
                        &self.contract_name,
                        format!("constructor arguments do not match ABI: {}", e),
                    )
                })?;
                code.extend_from_slice(&encoded);
            }
            None if args.is_empty() => {}
            None => {
                return Err(DeployError::artifact(
                    &self.contract_name,
                    format!(
                        "contract has no constructor but {} argument(s) were supplied",
                        args.len()
                    ),
                ));
            }
        }

        Ok(code.into())
    }
}

/// Anything that can hand out compiled contracts by name
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, contract_name: &str) -> Result<ContractArtifact>;
}

/// Artifact JSON as written by Hardhat or Foundry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: BytecodeField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    /// Hardhat: `"bytecode": "0x6080..."`
    Hex(Bytes),
    /// Foundry: `"bytecode": { "object": "0x6080...", ... }`
    Object { object: Bytes },
}

impl BytecodeField {
    fn into_bytes(self) -> Bytes {
        match self {
            BytecodeField::Hex(bytes) => bytes,
            BytecodeField::Object { object } => object,
        }
    }
}

/// Reads artifacts from a build output directory.
///
/// `artifact("RootToken")` tries `<root>/RootToken.json` first, then searches
/// the tree for `RootToken.sol/RootToken.json`.
#[derive(Debug, Clone)]
pub struct ArtifactDirectory {
    root: PathBuf,
}

impl ArtifactDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the JSON file for `contract_name`
    pub fn find(&self, contract_name: &str) -> Result<PathBuf> {
        if !self.root.is_dir() {
            return Err(DeployError::artifact(
                contract_name,
                format!("artifact directory not found: {}", self.root.display()),
            ));
        }

        let flat = self.root.join(format!("{}.json", contract_name));
        if flat.is_file() {
            return Ok(flat);
        }

        let file_name = format!("{}.json", contract_name);
        let dir_name = format!("{}.sol", contract_name);
        find_nested(&self.root, &dir_name, &file_name)
            .map_err(|e| DeployError::artifact(contract_name, e))?
            .ok_or_else(|| {
                DeployError::artifact(
                    contract_name,
                    format!(
                        "no {}/{} under {}",
                        dir_name,
                        file_name,
                        self.root.display()
                    ),
                )
            })
    }
}

impl ArtifactSource for ArtifactDirectory {
    fn artifact(&self, contract_name: &str) -> Result<ContractArtifact> {
        let path = self.find(contract_name)?;
        debug!(contract = contract_name, path = %path.display(), "Loading artifact");

        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::artifact(contract_name, format!("{}: {}", path.display(), e))
        })?;
        let file: ArtifactFile = serde_json::from_str(&content).map_err(|e| {
            DeployError::artifact(contract_name, format!("{}: {}", path.display(), e))
        })?;

        if let Some(name) = &file.contract_name {
            if name != contract_name {
                return Err(DeployError::artifact(
                    contract_name,
                    format!("{} declares contract '{}'", path.display(), name),
                ));
            }
        }

        Ok(ContractArtifact::new(
            contract_name,
            file.abi,
            file.bytecode.into_bytes(),
        ))
    }
}

/// How many directory levels below the root are searched
const MAX_SEARCH_DEPTH: usize = 6;

/// Directories never holding build output
const SKIPPED_DIRS: &[&str] = &["node_modules"];

/// Depth-first search for `<dir_name>/<file_name>` below `root`
fn find_nested(root: &Path, dir_name: &str, file_name: &str) -> std::io::Result<Option<PathBuf>> {
    search(root, dir_name, file_name, MAX_SEARCH_DEPTH)
}

fn search(
    root: &Path,
    dir_name: &str,
    file_name: &str,
    depth: usize,
) -> std::io::Result<Option<PathBuf>> {
    if depth == 0 {
        return Ok(None);
    }

    let mut entries: Vec<_> = std::fs::read_dir(root)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && !is_skipped(path))
        .collect();
    // Stable order so duplicate names resolve the same way on every run
    entries.sort();

    for dir in entries {
        if dir.file_name().and_then(|n| n.to_str()) == Some(dir_name) {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        if let Some(found) = search(&dir, dir_name, file_name, depth - 1)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

fn is_skipped(dir: &Path) -> bool {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || SKIPPED_DIRS.contains(&name),
        None => true,
    }
}

/// Artifacts registered in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<String, ContractArtifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn with(mut self, artifact: ContractArtifact) -> Self {
        self.insert(artifact);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn artifact(&self, contract_name: &str) -> Result<ContractArtifact> {
        self.artifacts
            .get(contract_name)
            .cloned()
            .ok_or_else(|| DeployError::artifact(contract_name, "not registered"))
    }
}
