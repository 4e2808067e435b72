#![forbid(unsafe_code)]

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Violated preconditions abort the caller.
    Strict,
    /// Violated preconditions are recorded and the offending mutation is skipped.
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
}

/// A programming error in calling code: the engine was handed input that its
/// contract forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("precondition violated in {subject}: {detail}")]
pub struct PreconditionViolation {
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub violation: PreconditionViolation,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedger {
    records: Vec<ViolationRecord>,
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ViolationRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
}

impl RuntimePolicy {
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
        }
    }

    #[must_use]
    pub const fn hardened() -> Self {
        Self {
            mode: RuntimeMode::Hardened,
        }
    }

    /// Strict in builds with debug assertions, hardened otherwise.
    #[must_use]
    pub const fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::strict()
        } else {
            Self::hardened()
        }
    }

    /// Check a precondition.
    ///
    /// Returns [`DecisionAction::Allow`] when `holds`. Otherwise a strict
    /// policy panics, and a hardened policy appends a record to `ledger` and
    /// returns [`DecisionAction::Reject`]; the caller must then skip the
    /// mutation the precondition guards.
    pub fn enforce(
        &self,
        holds: bool,
        subject: &str,
        detail: impl FnOnce() -> String,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        if holds {
            return DecisionAction::Allow;
        }
        let violation = self.violation(subject, detail());
        ledger.push(ViolationRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action: DecisionAction::Reject,
            violation,
        });
        DecisionAction::Reject
    }

    /// [`RuntimePolicy::enforce`] for call sites that own no ledger.
    pub fn enforce_untracked(
        &self,
        holds: bool,
        subject: &str,
        detail: impl FnOnce() -> String,
    ) -> DecisionAction {
        if holds {
            return DecisionAction::Allow;
        }
        let _ = self.violation(subject, detail());
        DecisionAction::Reject
    }

    fn violation(&self, subject: &str, detail: String) -> PreconditionViolation {
        let violation = PreconditionViolation {
            subject: subject.to_owned(),
            detail,
        };
        if matches!(self.mode, RuntimeMode::Strict) {
            panic!("{violation}");
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            subject = %violation.subject,
            detail = %violation.detail,
            "precondition violated; continuing in hardened mode"
        );
        violation
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::for_build()
    }
}

static GLOBAL_POLICY: OnceLock<RuntimePolicy> = OnceLock::new();

/// Install the process-wide policy. Only the first install takes effect;
/// returns `false` when a policy was already in place.
pub fn install_global_policy(policy: RuntimePolicy) -> bool {
    GLOBAL_POLICY.set(policy).is_ok()
}

/// The installed process-wide policy, or [`RuntimePolicy::for_build`].
#[must_use]
pub fn global_policy() -> RuntimePolicy {
    GLOBAL_POLICY
        .get()
        .copied()
        .unwrap_or_else(RuntimePolicy::for_build)
}

const MAX_COLOR_CACHE_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Overrides the build-derived policy mode when set.
    pub mode: Option<RuntimeMode>,
    /// Number of distinct fill rules a render pass is expected to register.
    pub color_cache_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: None,
            color_cache_capacity: 16,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.color_cache_capacity > MAX_COLOR_CACHE_CAPACITY {
            return Err(ConfigError::Invalid(
                "color_cache_capacity exceeds 1048576",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn policy(&self) -> RuntimePolicy {
        match self.mode {
            Some(mode) => RuntimePolicy { mode },
            None => global_policy(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, DecisionAction, EvidenceLedger, RuntimeConfig, RuntimeMode, RuntimePolicy,
    };

    #[test]
    fn satisfied_precondition_is_allowed_without_a_record() {
        let mut ledger = EvidenceLedger::new();
        let action = RuntimePolicy::strict().enforce(
            true,
            "cache.register",
            || unreachable!("detail is only built on violation"),
            &mut ledger,
        );
        assert_eq!(action, DecisionAction::Allow);
        assert!(ledger.is_empty());
    }

    #[test]
    #[should_panic(expected = "precondition violated in role_wildcard.from_roles")]
    fn strict_mode_panics_on_violation() {
        let mut ledger = EvidenceLedger::new();
        RuntimePolicy::strict().enforce(
            false,
            "role_wildcard.from_roles",
            || "roles must be non-empty".to_owned(),
            &mut ledger,
        );
    }

    #[test]
    fn hardened_mode_records_and_rejects() {
        let mut ledger = EvidenceLedger::new();
        let action = RuntimePolicy::hardened().enforce(
            false,
            "cache.register",
            || "duplicate key".to_owned(),
            &mut ledger,
        );
        assert_eq!(action, DecisionAction::Reject);
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].mode, RuntimeMode::Hardened);
        assert_eq!(ledger.records()[0].violation.detail, "duplicate key");
    }

    #[test]
    fn config_parses_partial_json_with_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{"mode":"hardened"}"#).expect("config");
        assert_eq!(config.mode, Some(RuntimeMode::Hardened));
        assert_eq!(config.color_cache_capacity, 16);
        assert_eq!(config.policy(), RuntimePolicy::hardened());
    }

    #[test]
    fn config_rejects_oversized_cache_capacity() {
        let err = RuntimeConfig::from_json_str(r#"{"color_cache_capacity":4294967296}"#)
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn explicit_mode_overrides_build_default() {
        let config = RuntimeConfig::default().with_mode(RuntimeMode::Strict);
        assert_eq!(config.policy(), RuntimePolicy::strict());
    }
}
