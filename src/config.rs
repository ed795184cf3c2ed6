//! Bridge configuration.

use serde::Deserialize;

/// Capacity of the fixed buffer used when extracting strings from the engine
/// (property names in `get_all_keys`, `to_string` results).
///
/// One byte is reserved for the terminator, so at most `MAX_STRING_LEN - 1`
/// bytes of UTF-8 survive. Longer strings are truncated at the last complete
/// character that fits; truncation is silent.
pub const MAX_STRING_LEN: usize = 512;

/// Names of the well-known properties and objects the bridge talks to.
///
/// Defaults match the names the script-side runtime installs. Embedders can
/// load overrides from their own config files:
///
/// ```ignore
/// let config: BridgeConfig = serde_json::from_str(r#"{ "keep_alive_object": "__jsb" }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Property mirroring the bound native pointer's address (debugging aid).
    pub native_ptr_property: String,

    /// Global object exposing the script-side keep-alive registry.
    pub keep_alive_object: String,

    /// Function on the keep-alive object registering an owner -> dependency edge.
    pub register_native_ref: String,

    /// Function on the keep-alive object removing an owner -> dependency edge.
    pub unregister_native_ref: String,

    /// Class whose wrappers hold an extra intrinsic reference by design and
    /// are released explicitly during cleanup.
    pub private_data_class: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            native_ptr_property: "__native_ptr__".to_string(),
            keep_alive_object: "jsb".to_string(),
            register_native_ref: "registerNativeRef".to_string(),
            unregister_native_ref: "unregisterNativeRef".to_string(),
            private_data_class: "__PrivateData".to_string(),
        }
    }
}
