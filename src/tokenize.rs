//! Feeds quick-xml events into a [`Transducer`].

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::asset::AssetBridge;
use crate::error::{Error, Result};
use crate::handler::{Attributes, Transducer};

/// Tokenize `xml` and dispatch every event to `transducer`.
///
/// Stops at the first error; the transducer is then in its failed state.
pub fn feed<B: AssetBridge>(xml: &str, transducer: &mut Transducer<B>) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = attributes(&e).map_err(|err| transducer.on_error(err))?;
                transducer.on_start(&name, &attrs)?;
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = attributes(&e).map_err(|err| transducer.on_error(err))?;
                transducer.on_start(&name, &attrs)?;
                transducer.on_end(&name)?;
            }
            Ok(Event::End(e)) => {
                let qname = e.name();
                let name = String::from_utf8_lossy(qname.as_ref());
                transducer.on_end(&name)?;
            }
            Ok(Event::Text(e)) => {
                transducer.on_text(&String::from_utf8_lossy(e.as_ref()))?;
            }
            Ok(Event::CData(e)) => {
                transducer.on_text(&String::from_utf8_lossy(e.as_ref()))?;
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                let Some(resolved) = resolve_entity(&entity) else {
                    return Err(transducer.on_error(Error::Malformed(format!(
                        "unknown entity &{entity};"
                    ))));
                };
                transducer.on_text(&resolved)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(transducer.on_error(e)),
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    Ok(())
}

fn attributes(start: &BytesStart<'_>) -> Result<Attributes> {
    let mut attrs = Attributes::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(quick_xml::Error::from)?;
        attrs.push(name, value.into_owned());
    }
    Ok(attrs)
}

/// Resolve a predefined or numeric character reference.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::DiscardAssets;
    use crate::writer::ConvertOptions;

    fn run(xml: &str) -> Result<String> {
        let mut transducer = Transducer::new(DiscardAssets, &ConvertOptions::compact());
        feed(xml, &mut transducer)?;
        transducer.finish()
    }

    #[test]
    fn test_end_tags_match_by_local_name() {
        let xml = r#"<fb:FictionBook xmlns:fb="urn:fb"><fb:body><fb:p>x</fb:p></fb:body></fb:FictionBook>"#;
        let out = run(xml).unwrap();
        assert!(out.contains("<p>x</p>"), "{out}");
    }

    #[test]
    fn test_mismatched_end_tag_fails() {
        assert!(run("<FictionBook><body><p>x</body></p></FictionBook>").is_err());
    }

    #[test]
    fn test_unknown_entity_fails() {
        assert!(matches!(
            run("<FictionBook><body><p>&nbsp;</p></body></FictionBook>"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#x416").as_deref(), Some("Ж"));
        assert_eq!(resolve_entity("#xD800"), None);
        assert_eq!(resolve_entity("nbsp"), None);
    }
}
