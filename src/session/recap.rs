// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ReCap (EIP-5573) capability objects.
//!
//! Attenuations map a resource key to `"{namespace}/{ability}"` entries, each
//! carrying a list of restriction objects. The object travels inside a SIWE
//! message as a `urn:recap:<base64url(json)>` resource, with a matching
//! human-readable sentence appended to the statement.

use std::collections::BTreeMap;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resources::{LitAbility, LitResource};
use super::siwe::SiweMessage;
use crate::error::{ClientError, ClientResult};

/// URN prefix of encoded capability objects.
pub const RECAP_URN_PREFIX: &str = "urn:recap:";

const ANY_ABILITY: &str = "*/*";

const STATEMENT_PREFIX: &str =
    "I further authorize the stated URI to perform the following actions on my behalf:";

/// resource key -> `"ns/ability"` -> restrictions
pub type Attenuations = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecapCapabilityObject {
    #[serde(rename = "att", default)]
    attenuations: Attenuations,
    #[serde(rename = "prf", default)]
    proofs: Vec<String>,
}

impl RecapCapabilityObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attenuations(&self) -> &Attenuations {
        &self.attenuations
    }

    pub fn proofs(&self) -> &[String] {
        &self.proofs
    }

    pub fn is_empty(&self) -> bool {
        self.attenuations.is_empty()
    }

    pub fn add_proof(&mut self, proof: impl Into<String>) {
        self.proofs.push(proof.into());
    }

    /// Grant `namespace/ability` on `resource_key` with an optional restriction.
    pub fn add_attenuation(
        &mut self,
        resource_key: &str,
        namespace: &str,
        ability: &str,
        restriction: Option<Map<String, Value>>,
    ) {
        self.attenuations
            .entry(resource_key.to_string())
            .or_default()
            .entry(format!("{namespace}/{ability}"))
            .or_default()
            .push(Value::Object(restriction.unwrap_or_default()));
    }

    /// Grant every ability on `resource`.
    pub fn add_all_capabilities_for_resource(&mut self, resource: &LitResource) {
        self.attenuations
            .entry(resource.resource_key())
            .or_default()
            .entry(ANY_ABILITY.to_string())
            .or_default()
            .push(Value::Object(Map::new()));
    }

    /// Grant a Lit ability, rejecting abilities foreign to the resource family.
    pub fn add_capability_for_resource(
        &mut self,
        resource: &LitResource,
        ability: LitAbility,
        restriction: Option<Map<String, Value>>,
    ) -> ClientResult<()> {
        if !resource.is_valid_ability(ability) {
            return Err(ClientError::invalid_argument(format!(
                "the ability {ability} is not applicable to the resource {resource}"
            )));
        }

        let (namespace, recap_ability) = ability.recap_namespace_and_ability();
        self.add_attenuation(&resource.resource_key(), namespace, recap_ability, restriction);
        Ok(())
    }

    /// Whether `ability` on `resource` is granted.
    ///
    /// The `{prefix}://*` wildcard key is consulted before the exact key; an
    /// entry of `*/*` grants every ability.
    pub fn verify_capabilities_for_resource(
        &self,
        resource: &LitResource,
        ability: LitAbility,
    ) -> bool {
        if !resource.is_valid_ability(ability) {
            return false;
        }

        let (namespace, recap_ability) = ability.recap_namespace_and_ability();
        let wanted = format!("{namespace}/{recap_ability}");

        [resource.wildcard_key(), resource.resource_key()]
            .iter()
            .filter_map(|key| self.attenuations.get(key))
            .any(|abilities| {
                abilities.contains_key(ANY_ABILITY) || abilities.contains_key(&wanted)
            })
    }

    /// `urn:recap:<base64url(json)>`
    pub fn encode_as_siwe_resource(&self) -> ClientResult<String> {
        // BTreeMap keys serialize in sorted order
        let json = serde_json::to_vec(self)
            .map_err(|e| ClientError::unknown(format!("failed to encode recap: {e}")))?;
        Ok(format!("{RECAP_URN_PREFIX}{}", Base64UrlUnpadded::encode_string(&json)))
    }

    /// Parse a `urn:recap:` resource (padded or unpadded base64url).
    pub fn decode(resource: &str) -> ClientResult<Self> {
        let encoded = resource.strip_prefix(RECAP_URN_PREFIX).ok_or_else(|| {
            ClientError::invalid_argument(format!("not a recap resource: {resource}"))
        })?;
        let bytes = Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('='))
            .map_err(|e| ClientError::invalid_argument(format!("invalid recap encoding: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::invalid_argument(format!("invalid recap payload: {e}")))
    }

    /// Human-readable sentence describing the grants.
    pub fn statement(&self) -> String {
        let mut statement = STATEMENT_PREFIX.to_string();
        let mut section = 1;

        for (resource, abilities) in &self.attenuations {
            let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for key in abilities.keys() {
                let (namespace, name) = key.split_once('/').unwrap_or((key.as_str(), ""));
                by_namespace.entry(namespace).or_default().push(name);
            }

            for (namespace, mut names) in by_namespace {
                names.sort_unstable();
                let names = names
                    .iter()
                    .map(|name| format!("'{name}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                statement.push_str(&format!(
                    " ({section}) '{namespace}': {names} for '{resource}'."
                ));
                section += 1;
            }
        }

        statement
    }

    /// Append the statement and the encoded resource to a SIWE message.
    pub fn add_to_siwe(&self, siwe: &mut SiweMessage) -> ClientResult<()> {
        let recap_statement = self.statement();
        siwe.statement = Some(match siwe.statement.take() {
            Some(existing) if existing.ends_with(&recap_statement) => existing,
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {recap_statement}", existing.trim_end())
            }
            _ => recap_statement,
        });
        let urn = self.encode_as_siwe_resource()?;
        if !siwe.resources.contains(&urn) {
            siwe.resources.push(urn);
        }
        Ok(())
    }

    /// First recap resource embedded in a SIWE message.
    pub fn find_in_siwe(siwe: &SiweMessage) -> Option<&str> {
        siwe.resources
            .iter()
            .map(String::as_str)
            .find(|r| r.starts_with(RECAP_URN_PREFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkp_signing_recap() -> RecapCapabilityObject {
        let mut recap = RecapCapabilityObject::new();
        recap
            .add_capability_for_resource(&LitResource::pkp("*"), LitAbility::PkpSigning, None)
            .unwrap();
        recap
    }

    #[test]
    fn wildcard_grant_covers_specific_resource() {
        let recap = pkp_signing_recap();
        assert!(recap.verify_capabilities_for_resource(
            &LitResource::pkp("42"),
            LitAbility::PkpSigning
        ));
        assert!(!recap.verify_capabilities_for_resource(
            &LitResource::lit_action("*"),
            LitAbility::LitActionExecution
        ));
    }

    #[test]
    fn exact_grant_does_not_cover_other_ids() {
        let mut recap = RecapCapabilityObject::new();
        recap
            .add_capability_for_resource(&LitResource::pkp("1"), LitAbility::PkpSigning, None)
            .unwrap();
        let signing = LitAbility::PkpSigning;
        assert!(recap.verify_capabilities_for_resource(&LitResource::pkp("1"), signing));
        assert!(!recap.verify_capabilities_for_resource(&LitResource::pkp("2"), signing));
    }

    #[test]
    fn any_ability_entry_grants_everything_valid() {
        let mut recap = RecapCapabilityObject::new();
        recap.add_all_capabilities_for_resource(&LitResource::access_control_condition("*"));
        let resource = LitResource::access_control_condition("abc");
        assert!(recap.verify_capabilities_for_resource(
            &resource,
            LitAbility::AccessControlConditionDecryption
        ));
        assert!(recap.verify_capabilities_for_resource(
            &resource,
            LitAbility::AccessControlConditionSigning
        ));
        assert!(!recap.verify_capabilities_for_resource(&resource, LitAbility::PkpSigning));
    }

    #[test]
    fn foreign_ability_is_rejected_on_add() {
        let mut recap = RecapCapabilityObject::new();
        let err = recap
            .add_capability_for_resource(
                &LitResource::pkp("*"),
                LitAbility::LitActionExecution,
                None,
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_argument_exception");
        assert!(recap.is_empty());
    }

    #[test]
    fn urn_decodes_to_same_grants() {
        let mut recap = pkp_signing_recap();
        recap.add_proof("bafyproof");
        let urn = recap.encode_as_siwe_resource().unwrap();
        assert!(urn.starts_with(RECAP_URN_PREFIX));

        let decoded = RecapCapabilityObject::decode(&urn).unwrap();
        assert_eq!(decoded, recap);
        assert_eq!(decoded.proofs(), ["bafyproof".to_string()]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(RecapCapabilityObject::decode("urn:other:abc").is_err());
        assert!(RecapCapabilityObject::decode("urn:recap:!!!").is_err());
        let not_json = format!("urn:recap:{}", Base64UrlUnpadded::encode_string(b"nope"));
        assert!(RecapCapabilityObject::decode(&not_json).is_err());
    }

    #[test]
    fn add_to_siwe_appends_statement_once() {
        let recap = pkp_signing_recap();
        let mut siwe = SiweMessage::new("example.com", "0xabc", "lit:session:k", 1, "0xnonce");
        siwe.statement = Some("Hello.".into());

        recap.add_to_siwe(&mut siwe).unwrap();
        recap.add_to_siwe(&mut siwe).unwrap();
        assert_eq!(siwe.resources, vec![recap.encode_as_siwe_resource().unwrap()]);
        assert_eq!(
            siwe.statement.as_deref(),
            Some(format!("Hello. {}", recap.statement()).as_str())
        );
        assert_eq!(
            RecapCapabilityObject::find_in_siwe(&siwe),
            Some(siwe.resources[0].as_str())
        );
    }

    #[test]
    fn statement_lists_sections_in_order() {
        let mut recap = pkp_signing_recap();
        recap
            .add_capability_for_resource(
                &LitResource::lit_action("*"),
                LitAbility::LitActionExecution,
                None,
            )
            .unwrap();

        assert_eq!(
            recap.statement(),
            "I further authorize the stated URI to perform the following actions on my behalf: \
             (1) 'Threshold': 'Execution' for 'lit-litaction://*'. \
             (2) 'Threshold': 'Signing' for 'lit-pkp://*'."
        );
    }
}
