//! One-shot conversion on the calling thread.

use crate::asset::AssetBridge;
use crate::error::Result;
use crate::handler::Transducer;
use crate::load::CancelFlag;
use crate::source::decode_source;
use crate::tokenize::feed;
use crate::writer::ConvertOptions;

/// Convert FB2 bytes to an XHTML document.
///
/// Images are resolved and binaries delivered through `bridge` while the
/// document is being parsed.
///
/// ```
/// use fb2html::{ConvertOptions, DiscardAssets, convert};
///
/// let fb2 = br#"<FictionBook><body><section><p>Hi</p></section></body></FictionBook>"#;
/// let html = convert(fb2, DiscardAssets, &ConvertOptions::compact()).unwrap();
/// assert!(html.contains("<p>Hi</p>"));
/// ```
pub fn convert<B: AssetBridge>(
    bytes: &[u8],
    bridge: B,
    options: &ConvertOptions,
) -> Result<String> {
    convert_with_cancel(bytes, bridge, options, None)
}

/// [`convert`], stopping at the next start or end tag once `cancel` is set.
pub fn convert_with_cancel<B: AssetBridge>(
    bytes: &[u8],
    bridge: B,
    options: &ConvertOptions,
    cancel: Option<CancelFlag>,
) -> Result<String> {
    let text = decode_source(bytes)?;
    let mut transducer = Transducer::new(bridge, options);
    if let Some(flag) = cancel {
        transducer = transducer.with_cancel(flag);
    }
    feed(&text, &mut transducer)?;
    transducer.finish()
}
