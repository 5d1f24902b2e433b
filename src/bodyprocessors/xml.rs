//! XML bodies.
//!
//! The document is checked for well-formedness; text nodes are stored in
//! `XML:/*` and attribute values in `XML://@*`.

use crate::variables::{CollectionStore, VariableName};
use quick_xml::events::Event;
use quick_xml::Reader;

const TEXT_KEY: &str = "/*";
const ATTRIBUTE_KEY: &str = "//@*";

pub(super) fn process(body: &[u8], store: &mut CollectionStore) -> Result<(), String> {
    let text = std::str::from_utf8(body).map_err(|e| format!("xml: {}", e))?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut texts = Vec::new();
    let mut attributes = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("xml: {} at byte {}", e, reader.buffer_position()))?;
        match event {
            Event::Start(e) | Event::Empty(e) if depth == 0 && seen_root => {
                return Err(format!("xml: second root element <{}>", String::from_utf8_lossy(e.name().as_ref())));
            }
            Event::Start(e) => {
                collect_attributes(&e, &mut attributes)?;
                depth += 1;
                seen_root = true;
            }
            Event::Empty(e) => {
                collect_attributes(&e, &mut attributes)?;
                seen_root = true;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(e) => {
                let value = e.unescape().map_err(|e| format!("xml: {}", e))?;
                texts.push(value.into_owned());
            }
            Event::CData(e) => texts.push(String::from_utf8_lossy(&e.into_inner()).into_owned()),
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err("xml: no root element".to_string());
    }
    if depth != 0 {
        return Err("xml: unexpected end of document".to_string());
    }

    let xml = store.collection_mut(VariableName::Xml);
    for value in texts {
        xml.add(TEXT_KEY, value);
    }
    for value in attributes {
        xml.add(ATTRIBUTE_KEY, value);
    }
    Ok(())
}

fn collect_attributes(
    element: &quick_xml::events::BytesStart<'_>,
    out: &mut Vec<String>,
) -> Result<(), String> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| format!("xml: {}", e))?;
        let value = attribute.unescape_value().map_err(|e| format!("xml: {}", e))?;
        out.push(value.into_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::KeySelector;

    fn values(store: &CollectionStore, key: &str) -> Vec<String> {
        store
            .get(VariableName::Xml, &KeySelector::Literal(key.to_string()), &[])
            .into_iter()
            .map(|(_, v)| v.to_string())
            .collect()
    }

    #[test]
    fn test_text_and_attributes() {
        let mut store = CollectionStore::new();
        process(
            br#"<?xml version="1.0"?><order id="7"><item sku="a&amp;b">one &lt;two&gt;</item><note><![CDATA[raw <x>]]></note><empty flag="1"/></order>"#,
            &mut store,
        )
        .unwrap();
        assert_eq!(values(&store, "/*"), vec!["one <two>", "raw <x>"]);
        assert_eq!(values(&store, "//@*"), vec!["7", "a&b", "1"]);
    }

    #[test]
    fn test_malformed() {
        let mut store = CollectionStore::new();
        assert!(process(b"<a><b></a>", &mut store).is_err());
        assert!(process(b"<a><b>", &mut store).is_err());
        assert!(process(b"just text", &mut store).is_err());
        assert!(store.collection(VariableName::Xml).is_none());
    }
}
