//! Validator
//!
//! Runs the ordered rule list against an entity and derives its status.
//!
//! # Status Derivation
//! - `Rejected`: any blocking issue the policy marks unrecoverable
//! - `NeedsReview`: blocking issues exist, all fixable by synthesis/image steps
//! - `Ready`: no blocking issues
//!
//! Deterministic and side-effect free: the same entity always yields the same
//! result, which is what makes re-validation after edits idempotent.
//!
//! # Severity Policy
//! Which codes block, and which blocking codes are unrecoverable, is
//! configuration (`[validation.severity]`). Defaults:
//!
//! | Class | Codes |
//! |---|---|
//! | unrecoverable | `missing_content`, `missing_category` |
//! | blocking | `missing_title`, `empty_localized_title`, `title_too_long`, `placeholder_title` |
//! | warning | everything else |

pub mod rules;

pub use rules::{RuleContext, ValidationRule};

use crate::config::ValidationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::knowledge::KnowledgeTables;
use crate::types::{
    EntityStatus, IssueCode, NormalizedEntity, Severity, ValidationIssue, ValidationResult,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// How an issue code affects status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueClass {
    Warning,
    /// Blocking, fixable by synthesis or image steps
    Blocking,
    /// Blocking, not fixable automatically
    Unrecoverable,
}

impl std::str::FromStr for IssueClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" => Ok(Self::Warning),
            "blocking" => Ok(Self::Blocking),
            "unrecoverable" => Ok(Self::Unrecoverable),
            other => Err(format!("unknown severity class: {}", other)),
        }
    }
}

/// Issue code → class
#[derive(Debug, Clone)]
pub struct SeverityPolicy {
    classes: BTreeMap<IssueCode, IssueClass>,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        let mut classes: BTreeMap<IssueCode, IssueClass> = IssueCode::ALL
            .iter()
            .map(|code| (*code, IssueClass::Warning))
            .collect();
        for code in [IssueCode::MissingContent, IssueCode::MissingCategory] {
            classes.insert(code, IssueClass::Unrecoverable);
        }
        for code in [
            IssueCode::MissingTitle,
            IssueCode::EmptyLocalizedTitle,
            IssueCode::TitleTooLong,
            IssueCode::PlaceholderTitle,
        ] {
            classes.insert(code, IssueClass::Blocking);
        }
        Self { classes }
    }
}

impl SeverityPolicy {
    /// Defaults overridden by `[validation.severity]`
    pub fn from_config(config: &ValidationConfig) -> PipelineResult<Self> {
        let mut policy = Self::default();
        for (code, class) in &config.severity {
            let code: IssueCode = code.parse().map_err(PipelineError::InvalidInput)?;
            let class: IssueClass = class.parse().map_err(PipelineError::InvalidInput)?;
            policy.classes.insert(code, class);
        }
        Ok(policy)
    }

    pub fn classify(&self, code: IssueCode) -> IssueClass {
        self.classes
            .get(&code)
            .copied()
            .unwrap_or(IssueClass::Warning)
    }
}

/// Status implied by an issue list
pub fn derive_status(issues: &[ValidationIssue]) -> EntityStatus {
    let mut blocking = issues.iter().filter(|i| i.severity == Severity::Blocking).peekable();
    if blocking.peek().is_none() {
        return EntityStatus::Ready;
    }
    if blocking.any(|i| i.unrecoverable) {
        EntityStatus::Rejected
    } else {
        EntityStatus::NeedsReview
    }
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
    policy: SeverityPolicy,
    bounds: ValidationConfig,
    tables: Arc<KnowledgeTables>,
}

impl Validator {
    /// Default rule list with the configured policy and bounds
    pub fn new(config: &ValidationConfig, tables: Arc<KnowledgeTables>) -> PipelineResult<Self> {
        Ok(Self {
            rules: rules::default_rules(),
            policy: SeverityPolicy::from_config(config)?,
            bounds: config.clone(),
            tables,
        })
    }

    pub fn policy(&self) -> &SeverityPolicy {
        &self.policy
    }

    /// Run every rule and derive status
    pub fn validate(&self, entity: &NormalizedEntity) -> ValidationResult {
        let ctx = RuleContext {
            bounds: &self.bounds,
            tables: &self.tables,
        };

        let mut issues = Vec::new();
        let mut confidence_sum = 0.0;

        for rule in &self.rules {
            let outcome = rule.check(entity, &ctx);
            confidence_sum += outcome.confidence;

            for finding in outcome.findings {
                let class = self.policy.classify(finding.code);
                issues.push(ValidationIssue {
                    field: finding.field.to_string(),
                    severity: match class {
                        IssueClass::Warning => Severity::Warning,
                        IssueClass::Blocking | IssueClass::Unrecoverable => Severity::Blocking,
                    },
                    code: finding.code,
                    message: finding.message,
                    rule: rule.name().to_string(),
                    unrecoverable: class == IssueClass::Unrecoverable,
                });
            }
        }

        let confidence = if self.rules.is_empty() {
            1.0
        } else {
            confidence_sum / self.rules.len() as f64
        };
        let status = derive_status(&issues);

        debug!(
            entity_id = %entity.id,
            status = %status,
            issue_count = issues.len(),
            confidence,
            "Validation complete"
        );

        ValidationResult {
            status,
            issues,
            confidence,
        }
    }

    /// Blocking issues on any of `fields`
    ///
    /// Used to check a variant on its own merits: only the fields it sets count.
    pub fn blocking_issues_on(
        &self,
        entity: &NormalizedEntity,
        fields: &[&str],
    ) -> Vec<ValidationIssue> {
        self.validate(entity)
            .issues
            .into_iter()
            .filter(|i| i.severity == Severity::Blocking && fields.contains(&i.field.as_str()))
            .collect()
    }
}
