//! Role-access policy: which document collections each role may read.
//!
//! The mapping is resolved once at startup — from a JSON file when one is
//! configured, otherwise from the built-in table — and shared by reference
//! for the life of the process. Lookups for unknown roles return an empty
//! set, so an unrecognized role can never retrieve anything.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{PolicyConfig, POLICY_PATH_ENV};

/// Role name to ordered list of allowed collection tags.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    roles: HashMap<String, Vec<String>>,
}

impl RolePolicy {
    /// The built-in default table.
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 7] = [
            ("Finance", &["finance_docs", "general_docs"]),
            ("Marketing", &["marketing_docs", "general_docs"]),
            ("HR", &["hr_docs", "general_docs"]),
            ("Engineering", &["engineering_docs", "general_docs"]),
            (
                "Management",
                &["management_docs", "employee_docs", "general_docs"],
            ),
            (
                "C_Level",
                &[
                    "finance_docs",
                    "marketing_docs",
                    "hr_docs",
                    "engineering_docs",
                    "c_level_docs",
                    "general_docs",
                ],
            ),
            ("Employee", &["general_docs"]),
        ];

        let mut roles = HashMap::new();
        for (role, collections) in table {
            roles.insert(
                role.to_string(),
                collections.iter().map(|s| s.to_string()).collect(),
            );
        }
        Self { roles }
    }

    /// Load the mapping from a JSON file shaped
    /// `{"RoleName": ["tag_a", "tag_b"], ...}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file: {}", path.display()))?;
        let roles: HashMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse policy file: {}", path.display()))?;
        Ok(Self { roles })
    }

    /// Collections the role may access, in configured order. Unknown roles
    /// get an empty slice (fail-closed).
    pub fn allowed_collections(&self, role: &str) -> &[String] {
        self.roles
            .get(role)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_allowed(&self, role: &str, collection: &str) -> bool {
        self.allowed_collections(role)
            .iter()
            .any(|c| c == collection)
    }
}

/// Resolve the policy once at startup: `[policy].path` from the config,
/// then the `ROLEGATE_POLICY_PATH` environment variable, then the built-in
/// table. An absent file falls back to the built-in table; a present but
/// unparseable file is a startup error.
pub fn load_policy(config: &PolicyConfig) -> Result<RolePolicy> {
    let path = config
        .path
        .clone()
        .or_else(|| std::env::var(POLICY_PATH_ENV).ok().map(PathBuf::from));

    match path {
        Some(path) if path.exists() => {
            let policy = RolePolicy::from_file(&path)?;
            tracing::info!(path = %path.display(), "loaded role policy");
            Ok(policy)
        }
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "policy file not found, using built-in default table"
            );
            Ok(RolePolicy::builtin())
        }
        None => Ok(RolePolicy::builtin()),
    }
}
