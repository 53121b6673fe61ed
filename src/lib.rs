//! # fb2html
//!
//! A streaming converter from FictionBook 2 (FB2) to XHTML.
//!
//! The source is tokenized with `quick-xml` and every element is handled by
//! one of a small set of handlers kept on a stack: metadata blocks become
//! classed `<div>`s, body text becomes `<div>`/`<p>`/inline markup, footnote
//! sections are tagged, `<image>` references are resolved through the host
//! and embedded `<binary>` payloads are decoded and handed to the host.
//!
//! ## Quick Start
//!
//! ```
//! use fb2html::{BinaryAsset, AssetBridge, ConvertOptions, convert};
//!
//! #[derive(Default)]
//! struct Collect(Vec<BinaryAsset>);
//!
//! impl AssetBridge for Collect {
//!     fn resolve_asset_path(&mut self, name: &str) -> String {
//!         format!("files/{name}")
//!     }
//!     fn deliver_asset(&mut self, asset: BinaryAsset) {
//!         self.0.push(asset);
//!     }
//! }
//!
//! let fb2 = br##"<FictionBook>
//!   <body><section><p>Hello</p><image l:href="#pic.png"/></section></body>
//!   <binary id="pic.png" content-type="image/png">iVBORw0K</binary>
//! </FictionBook>"##;
//!
//! let mut assets = Collect::default();
//! let html = convert(fb2, &mut assets, &ConvertOptions::default()).unwrap();
//! assert!(html.contains(r#"src="files/pic.png""#));
//! assert_eq!(assets.0[0].name, "pic.png");
//! ```
//!
//! ## Background loading
//!
//! [`LoadHandle`] and [`Loader`] run the conversion on a worker thread and
//! report back through a [`Host`] implementation that the caller pumps on
//! its own thread.

pub mod asset;
pub mod convert;
pub mod error;
pub mod handler;
pub mod keyword;
pub mod load;
pub mod source;
pub mod store;
pub mod tokenize;
pub mod writer;

pub use asset::{AssetBridge, BinaryAsset, DiscardAssets};
pub use convert::{convert, convert_with_cancel};
pub use error::{Error, Result};
pub use handler::{Attributes, Transducer};
pub use load::{CancelFlag, Host, HostEvent, LoadHandle, LoadStatus, Loader};
pub use store::AssetDir;
pub use writer::{ConvertOptions, HtmlWriter};
