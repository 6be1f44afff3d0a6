//! Compiled contract artifacts and ABI encoding.
//!
//! Truffle and Hardhat artifacts carry the creation bytecode as a hex string,
//! Foundry nests it under `bytecode.object`. Both shapes are accepted.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::DeployError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        }
    }
}

/// ABI and creation bytecode of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Load `<dir>/<name>.json`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{name}.json"));
        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read artifact {}", path.display()))?;
        Self::from_json(name, &content)
            .context(format!("Failed to parse artifact {}", path.display()))
    }

    /// Parse an artifact from its JSON representation.
    pub fn from_json(name: &str, content: &str) -> Result<Self> {
        let raw: RawArtifact =
            serde_json::from_str(content).context("Artifact is not valid JSON")?;

        let bytecode_hex = raw.bytecode.as_hex().trim_start_matches("0x");
        if bytecode_hex.is_empty() {
            anyhow::bail!("Artifact '{name}' has no creation bytecode (interface or abstract contract?)");
        }
        if bytecode_hex.contains("__") {
            anyhow::bail!("Artifact '{name}' contains unlinked library references");
        }

        let bytecode = hex::decode(bytecode_hex)
            .context(format!("Artifact '{name}' has malformed bytecode"))?;

        if let Some(contract_name) = raw.contract_name.as_deref() {
            if contract_name != name {
                tracing::debug!(artifact = name, contract_name, "Artifact file name differs from contract name");
            }
        }

        Ok(Self {
            name: name.to_string(),
            abi: raw.abi,
            bytecode: bytecode.into(),
        })
    }

    /// Number of constructor parameters. Zero when no constructor is declared.
    pub fn constructor_arity(&self) -> usize {
        self.abi.constructor().map_or(0, |c| c.inputs.len())
    }

    /// Whether a method named `method` accepts `arity` arguments.
    pub fn has_method(&self, method: &str, arity: usize) -> bool {
        self.abi
            .function(method)
            .is_some_and(|overloads| overloads.iter().any(|f| f.inputs.len() == arity))
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn encode_deployment(&self, args: &[String]) -> Result<Bytes> {
        let expected = self.constructor_arity();
        if expected != args.len() {
            return Err(DeployError::ArityMismatch {
                artifact: self.name.clone(),
                expected,
                actual: args.len(),
            }
            .into());
        }

        let mut init_code = self.bytecode.to_vec();
        if let Some(constructor) = self.abi.constructor() {
            let values = coerce_args(&constructor.inputs, args)
                .context(format!("Invalid constructor arguments for '{}'", self.name))?;
            let encoded = constructor
                .abi_encode_input(&values)
                .context(format!("Failed to encode constructor arguments for '{}'", self.name))?;
            init_code.extend_from_slice(&encoded);
        }

        Ok(init_code.into())
    }

    /// Selector followed by the ABI-encoded arguments of `method`.
    pub fn encode_call(&self, method: &str, args: &[String]) -> Result<Bytes> {
        let function = self
            .abi
            .function(method)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .ok_or_else(|| DeployError::UnknownMethod {
                artifact: self.name.clone(),
                method: method.to_string(),
                arity: args.len(),
            })?;

        let values = coerce_args(&function.inputs, args)
            .context(format!("Invalid arguments for '{}.{}'", self.name, method))?;
        let calldata = function
            .abi_encode_input(&values)
            .context(format!("Failed to encode call to '{}.{}'", self.name, method))?;

        Ok(calldata.into())
    }
}

fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .context(format!("Unsupported parameter type '{}'", param.ty))?;
            ty.coerce_str(arg)
                .context(format!("Cannot use '{arg}' as {} '{}'", param.ty, param.name))
        })
        .collect()
}

/// Lazily loaded artifacts, keyed by artifact name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
    cache: BTreeMap<String, ContractArtifact>,
}

impl ArtifactStore {
    /// A store reading `<dir>/<name>.json` on first use.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: BTreeMap::new(),
        }
    }

    /// A store holding only the artifacts inserted into it.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with(mut self, artifact: ContractArtifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.cache.insert(artifact.name.clone(), artifact);
    }

    pub fn get(&mut self, name: &str) -> Result<&ContractArtifact> {
        if !self.cache.contains_key(name) {
            let dir = self
                .dir
                .as_deref()
                .context(format!("Artifact '{name}' is not available"))?;
            let artifact = ContractArtifact::load(dir, name)?;
            tracing::debug!(artifact = name, bytecode_len = artifact.bytecode.len(), "Artifact loaded");
            self.cache.insert(name.to_string(), artifact);
        }

        self.cache
            .get(name)
            .context(format!("Artifact '{name}' is not available"))
    }
}
