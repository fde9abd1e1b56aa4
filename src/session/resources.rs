// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lit resources, abilities, and their recap namespace mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource families a session can be granted abilities over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LitResourcePrefix {
    #[serde(rename = "lit-accesscontrolcondition")]
    AccessControlCondition,
    #[serde(rename = "lit-pkp")]
    Pkp,
    #[serde(rename = "lit-ratelimitincrease")]
    RateLimitIncrease,
    #[serde(rename = "lit-litaction")]
    LitAction,
}

impl LitResourcePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessControlCondition => "lit-accesscontrolcondition",
            Self::Pkp => "lit-pkp",
            Self::RateLimitIncrease => "lit-ratelimitincrease",
            Self::LitAction => "lit-litaction",
        }
    }
}

impl FromStr for LitResourcePrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lit-accesscontrolcondition" => Ok(Self::AccessControlCondition),
            "lit-pkp" => Ok(Self::Pkp),
            "lit-ratelimitincrease" => Ok(Self::RateLimitIncrease),
            "lit-litaction" => Ok(Self::LitAction),
            other => Err(format!("unknown resource prefix: {other}")),
        }
    }
}

impl fmt::Display for LitResourcePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abilities a session may exercise on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LitAbility {
    #[serde(rename = "access-control-condition-decryption")]
    AccessControlConditionDecryption,
    #[serde(rename = "access-control-condition-signing")]
    AccessControlConditionSigning,
    #[serde(rename = "pkp-signing")]
    PkpSigning,
    #[serde(rename = "rate-limit-increase-auth")]
    RateLimitIncreaseAuth,
    #[serde(rename = "lit-action-execution")]
    LitActionExecution,
}

impl LitAbility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessControlConditionDecryption => "access-control-condition-decryption",
            Self::AccessControlConditionSigning => "access-control-condition-signing",
            Self::PkpSigning => "pkp-signing",
            Self::RateLimitIncreaseAuth => "rate-limit-increase-auth",
            Self::LitActionExecution => "lit-action-execution",
        }
    }

    /// `(namespace, ability)` pair used in recap attenuations.
    pub fn recap_namespace_and_ability(&self) -> (&'static str, &'static str) {
        match self {
            Self::AccessControlConditionDecryption => ("Threshold", "Decryption"),
            Self::AccessControlConditionSigning => ("Threshold", "Signing"),
            Self::PkpSigning => ("Threshold", "Signing"),
            Self::RateLimitIncreaseAuth => ("Auth", "Auth"),
            Self::LitActionExecution => ("Threshold", "Execution"),
        }
    }
}

impl fmt::Display for LitAbility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prefixed resource identifier, e.g. `lit-pkp://<token id>`.
///
/// The identifier `*` stands for every resource under the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LitResource {
    pub resource: String,
    pub resource_prefix: LitResourcePrefix,
}

impl LitResource {
    pub fn new(resource_prefix: LitResourcePrefix, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_prefix,
        }
    }

    pub fn access_control_condition(resource: impl Into<String>) -> Self {
        Self::new(LitResourcePrefix::AccessControlCondition, resource)
    }

    pub fn pkp(token_id: impl Into<String>) -> Self {
        Self::new(LitResourcePrefix::Pkp, token_id)
    }

    /// Rate-limit (capacity credit) resource; `None` grants every token.
    pub fn rate_limit_increase(token_id: Option<&str>) -> Self {
        Self::new(LitResourcePrefix::RateLimitIncrease, token_id.unwrap_or("*"))
    }

    pub fn lit_action(ipfs_id: impl Into<String>) -> Self {
        Self::new(LitResourcePrefix::LitAction, ipfs_id)
    }

    /// `{prefix}://{resource}`
    pub fn resource_key(&self) -> String {
        format!("{}://{}", self.resource_prefix, self.resource)
    }

    /// `{prefix}://*`
    pub fn wildcard_key(&self) -> String {
        format!("{}://*", self.resource_prefix)
    }

    /// Whether `ability` applies to this resource family.
    pub fn is_valid_ability(&self, ability: LitAbility) -> bool {
        matches!(
            (self.resource_prefix, ability),
            (
                LitResourcePrefix::AccessControlCondition,
                LitAbility::AccessControlConditionDecryption
                    | LitAbility::AccessControlConditionSigning
            ) | (LitResourcePrefix::Pkp, LitAbility::PkpSigning)
                | (
                    LitResourcePrefix::RateLimitIncrease,
                    LitAbility::RateLimitIncreaseAuth
                )
                | (LitResourcePrefix::LitAction, LitAbility::LitActionExecution)
        )
    }
}

impl fmt::Display for LitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.resource_prefix, self.resource)
    }
}

impl FromStr for LitResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, resource) = s
            .split_once("://")
            .ok_or_else(|| format!("resource key has no scheme: {s}"))?;
        if resource.is_empty() {
            return Err(format!("resource key has no identifier: {s}"));
        }
        Ok(Self::new(prefix.parse()?, resource))
    }
}

/// A requested `(resource, ability)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAbilityRequest {
    pub resource: LitResource,
    pub ability: LitAbility,
}

impl ResourceAbilityRequest {
    pub fn new(resource: LitResource, ability: LitAbility) -> Self {
        Self { resource, ability }
    }
}
