//! Embedded binary assets and the worker-side bridge to host storage.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// A decoded `<binary>` payload.
///
/// Built once per binary element and moved to the host; the converter
/// keeps no copy after delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryAsset {
    /// Value of the element's `id` attribute (e.g. `cover.jpg`).
    pub name: String,
    pub data: Vec<u8>,
}

/// Worker-side view of host-owned asset storage.
///
/// `resolve_asset_path` is the one synchronous hop back to the host: the
/// converter blocks until it returns. Implementations that forward to
/// another thread must make sure the responder never waits on the
/// converter. `deliver_asset` must not block.
pub trait AssetBridge {
    /// Returns the local path under which the host will expose `name`.
    fn resolve_asset_path(&mut self, name: &str) -> String;

    /// Hands a decoded payload to the host.
    fn deliver_asset(&mut self, asset: BinaryAsset);
}

impl<B: AssetBridge + ?Sized> AssetBridge for &mut B {
    fn resolve_asset_path(&mut self, name: &str) -> String {
        (**self).resolve_asset_path(name)
    }

    fn deliver_asset(&mut self, asset: BinaryAsset) {
        (**self).deliver_asset(asset)
    }
}

/// A bridge that resolves every asset to its own name and drops payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardAssets;

impl AssetBridge for DiscardAssets {
    fn resolve_asset_path(&mut self, name: &str) -> String {
        name.to_string()
    }

    fn deliver_asset(&mut self, _asset: BinaryAsset) {}
}

/// FB2 producers are loose about padding and line breaks.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a base64 payload, ignoring embedded whitespace.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        resolved: usize,
        delivered: Vec<String>,
    }

    impl AssetBridge for Counting {
        fn resolve_asset_path(&mut self, name: &str) -> String {
            self.resolved += 1;
            format!("files/{name}")
        }

        fn deliver_asset(&mut self, asset: BinaryAsset) {
            self.delivered.push(asset.name);
        }
    }

    fn use_bridge(mut bridge: impl AssetBridge) -> String {
        bridge.deliver_asset(BinaryAsset {
            name: "a.png".to_string(),
            data: vec![1, 2, 3],
        });
        bridge.resolve_asset_path("a.png")
    }

    #[test]
    fn test_borrowed_bridge_forwards() {
        let mut counting = Counting::default();
        assert_eq!(use_bridge(&mut counting), "files/a.png");
        assert_eq!(use_bridge(&mut counting), "files/a.png");
        assert_eq!(counting.resolved, 2);
        assert_eq!(counting.delivered, ["a.png", "a.png"]);
    }

    #[test]
    fn test_discard_assets() {
        assert_eq!(use_bridge(DiscardAssets), "a.png");
    }

    #[test]
    fn test_decode_with_line_breaks() {
        let data = decode_payload("aGVs\n  bG8g\r\nd29y\tbGQ=\n").unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_decode_without_padding() {
        assert_eq!(decode_payload("aGk").unwrap(), b"hi");
        assert_eq!(decode_payload("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_payload("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payload("not*base64!").is_err());
    }
}
