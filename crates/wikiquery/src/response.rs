//! Parse API responses into a small XML document tree.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::params::Row;
use crate::types::{WikiError, WikiResult};

/// A parsed response. An empty body yields a document without a root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlDocument {
    pub root: Option<XmlElement>,
}

/// One element with its attributes, child elements and text content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlDocument {
    /// Parse a response body.
    ///
    /// Empty or whitespace-only bodies are a valid empty document; anything
    /// that is not well-formed XML is a protocol error.
    pub fn parse(body: &str) -> WikiResult<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut reader = Reader::from_str(body);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(WikiError::protocol("multiple root elements", body));
                    }
                    stack.push(element_from(&e, body)?);
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from(&e, body)?;
                    attach(&mut stack, &mut root, element, body)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| WikiError::protocol("unexpected closing tag", body))?;
                    attach(&mut stack, &mut root, element, body)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| WikiError::protocol(format!("bad text content: {e}"), body))?;
                    // indentation between elements
                    if text.trim().is_empty() {
                        continue;
                    }
                    push_text(&mut stack, &text, body)?;
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    push_text(&mut stack, &text, body)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(WikiError::protocol(
                        format!("malformed XML at byte {}: {e}", reader.buffer_position()),
                        body,
                    ));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(WikiError::protocol(
                format!("unclosed element <{}>", open.name),
                body,
            ));
        }
        if root.is_none() {
            return Err(WikiError::protocol("no root element", body));
        }

        Ok(Self { root })
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Find an element by its path of names, starting with the root's name.
    pub fn find(&self, path: &[&str]) -> Option<&XmlElement> {
        let root = self.root.as_ref()?;
        let (first, rest) = path.split_first()?;
        if root.name != *first {
            return None;
        }
        rest.iter().try_fold(root, |element, name| element.child(name))
    }

    /// Fail with [`WikiError::Api`] if the response is an API error.
    pub fn check_api_error(&self) -> WikiResult<()> {
        match self.find(&["api", "error"]) {
            Some(error) => {
                let code = error.attribute("code").unwrap_or_default().to_string();
                let info = error.attribute("info").unwrap_or_default().to_string();
                tracing::warn!(%code, %info, "API returned an error");
                Err(WikiError::Api { code, info })
            }
            None => Ok(()),
        }
    }
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// The only child element. Zero or several children is a protocol error.
    pub fn single_child(&self) -> WikiResult<&XmlElement> {
        match self.children.as_slice() {
            [only] => Ok(only),
            children => Err(WikiError::Protocol {
                message: format!(
                    "expected exactly one element under <{}>, found {}",
                    self.name,
                    children.len()
                ),
                excerpt: self.to_string().chars().take(200).collect(),
            }),
        }
    }

    /// Attributes as a row, with text content under `*`.
    pub fn to_row(&self) -> Row {
        let mut row: Row = self.attributes.iter().cloned().collect();
        if !self.text.is_empty() {
            row.insert("*".to_string(), self.text.clone());
        }
        row
    }
}

impl std::fmt::Display for XmlElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {k}=\"{}\"", escape(v.as_str()))?;
        }
        if self.children.is_empty() && self.text.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">{}", escape(self.text.as_str()))?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn element_from(start: &BytesStart<'_>, body: &str) -> WikiResult<XmlElement> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| WikiError::protocol(format!("bad attribute: {e}"), body))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| WikiError::protocol(format!("bad attribute value: {e}"), body))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    body: &str,
) -> WikiResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(WikiError::protocol("multiple root elements", body));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str, body: &str) -> WikiResult<()> {
    match stack.last_mut() {
        Some(element) => element.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => return Err(WikiError::protocol("text outside the root element", body)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    const CATEGORY_MEMBERS: &str = r#"<?xml version="1.0"?>
<api>
  <query>
    <categorymembers>
      <cm ns="0" title="Alpha &amp; Omega" />
      <cm ns="14" title="Category:Beta" />
    </categorymembers>
  </query>
</api>"#;

    #[test]
    fn test_empty_body_is_empty_document() {
        assert!(XmlDocument::parse("").unwrap().is_empty());
        assert!(XmlDocument::parse("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body_is_protocol_error() {
        let err = XmlDocument::parse("<notxml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(err, WikiError::Protocol { ref excerpt, .. } if excerpt == "<notxml"));

        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("<a>").is_err());
        assert!(XmlDocument::parse("<a/><b/>").is_err());
        assert!(XmlDocument::parse("plain text").is_err());
    }

    #[test]
    fn test_parse_rows() {
        let doc = XmlDocument::parse(CATEGORY_MEMBERS).unwrap();
        let list = doc.find(&["api", "query", "categorymembers"]).unwrap();
        assert_eq!(list.children.len(), 2);

        let row = list.children[0].to_row();
        assert_eq!(row.get("title").map(String::as_str), Some("Alpha & Omega"));
        assert_eq!(row.get("ns").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_text_content_goes_under_star() {
        let doc = XmlDocument::parse(r#"<api><rev size="3">abc</rev></api>"#).unwrap();
        let row = doc.find(&["api", "rev"]).unwrap().to_row();
        assert_eq!(row.get("*").map(String::as_str), Some("abc"));
        assert_eq!(row.get("size").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_text_content_keeps_surrounding_whitespace() {
        let doc = XmlDocument::parse("<api>\n  <rev>  line one\n\n</rev>\n</api>").unwrap();
        let rev = doc.find(&["api", "rev"]).unwrap();
        assert_eq!(rev.to_row().get("*").map(String::as_str), Some("  line one\n\n"));

        let api = doc.root.as_ref().unwrap();
        assert!(api.text.is_empty());
        assert!(!api.to_row().contains_key("*"));
    }

    #[test]
    fn test_single_child() {
        let doc = XmlDocument::parse(r#"<api><query><userinfo id="1" name="Ann"/></query></api>"#).unwrap();
        let query = doc.find(&["api", "query"]).unwrap();
        assert_eq!(query.single_child().unwrap().name, "userinfo");

        let doc = XmlDocument::parse(r#"<api><query><a/><b/></query></api>"#).unwrap();
        let err = doc.find(&["api", "query"]).unwrap().single_child().unwrap_err();
        assert!(err.to_string().contains("found 2"), "{err}");

        let doc = XmlDocument::parse(r#"<api><query/></api>"#).unwrap();
        assert!(doc.find(&["api", "query"]).unwrap().single_child().is_err());
    }

    #[test]
    fn test_api_error() {
        let doc = XmlDocument::parse(
            r#"<api><error code="maxlag" info="Waiting for a database server: 7 seconds lagged"/></api>"#,
        )
        .unwrap();
        let err = doc.check_api_error().unwrap_err();
        assert!(matches!(err, WikiError::Api { ref code, .. } if code == "maxlag"));
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let ok = XmlDocument::parse(CATEGORY_MEMBERS).unwrap();
        assert!(ok.check_api_error().is_ok());
    }

    #[test]
    fn test_display_round_trips_structure() {
        let doc = XmlDocument::parse(r#"<api><p t="a&quot;b">x</p></api>"#).unwrap();
        let root = doc.root.as_ref().unwrap();
        assert_eq!(root.to_string(), r#"<api><p t="a&quot;b">x</p></api>"#);
    }
}
