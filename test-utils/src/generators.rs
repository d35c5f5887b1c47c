//! Proptest generators for connector inputs.

use azure_kms::algorithm::SignatureAlgorithm;
use azure_kms::cloud::Cloud;
use proptest::prelude::*;

/// Generate vault names: lowercase, digits and inner dashes, 3 to 24 chars.
pub fn vault_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{1,22}[a-z0-9]"
}

/// Generate key names: letters, digits and dashes.
pub fn key_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9-]{0,31}"
}

/// Generate key versions in the 32 hex digit form Key Vault uses.
pub fn key_version_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{32}"
}

/// Every environment alias with the cloud it names.
pub const ENVIRONMENT_ALIASES: &[(&str, Cloud)] = &[
    ("", Cloud::Public),
    ("public", Cloud::Public),
    ("AzureCloud", Cloud::Public),
    ("AzurePublicCloud", Cloud::Public),
    ("usgov", Cloud::UsGovernment),
    ("AzureUSGovernment", Cloud::UsGovernment),
    ("AzureUSGovernmentCloud", Cloud::UsGovernment),
    ("china", Cloud::China),
    ("AzureChinaCloud", Cloud::China),
    ("german", Cloud::Germany),
    ("germany", Cloud::Germany),
    ("AzureGermanCloud", Cloud::Germany),
];

/// Generate an environment alias in random letter case, with its cloud.
pub fn environment_alias_strategy() -> impl Strategy<Value = (String, Cloud)> {
    proptest::sample::select(ENVIRONMENT_ALIASES).prop_flat_map(|(alias, cloud)| {
        proptest::collection::vec(any::<bool>(), alias.len()).prop_map(move |upper| {
            let mixed: String = alias
                .chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                .collect();
            (mixed, cloud)
        })
    })
}

/// Generate names that are not environment aliases.
pub fn unknown_environment_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3,12}".prop_filter("must not be an alias", |name| {
        !ENVIRONMENT_ALIASES
            .iter()
            .any(|(alias, _)| alias.eq_ignore_ascii_case(name))
    })
}

/// Generate RSA sizes Key Vault accepts, 0 for the default.
pub fn rsa_bits_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(2048u32), Just(3072u32), Just(4096u32)]
}

/// Generate RSA sizes Key Vault rejects.
pub fn invalid_rsa_bits_strategy() -> impl Strategy<Value = u32> {
    any::<u32>().prop_filter("must not be a supported size", |bits| {
        !matches!(bits, 0 | 2048 | 3072 | 4096)
    })
}

/// Generate signature algorithms with a Key Vault key type.
pub fn supported_algorithm_strategy() -> impl Strategy<Value = SignatureAlgorithm> {
    proptest::sample::select(vec![
        SignatureAlgorithm::Unspecified,
        SignatureAlgorithm::Sha256WithRsa,
        SignatureAlgorithm::Sha384WithRsa,
        SignatureAlgorithm::Sha512WithRsa,
        SignatureAlgorithm::Sha256WithRsaPss,
        SignatureAlgorithm::Sha384WithRsaPss,
        SignatureAlgorithm::Sha512WithRsaPss,
        SignatureAlgorithm::EcdsaWithSha256,
        SignatureAlgorithm::EcdsaWithSha384,
        SignatureAlgorithm::EcdsaWithSha512,
    ])
}

/// Generate `hsm` option values with the flag they stand for.
pub fn hsm_value_strategy() -> impl Strategy<Value = (String, bool)> {
    prop_oneof![
        proptest::sample::select(vec!["true", "TRUE", "1", "yes", "On"]).prop_map(|v| (v.to_string(), true)),
        proptest::sample::select(vec!["false", "0", "no", "off", "maybe"]).prop_map(|v| (v.to_string(), false)),
    ]
}
