//! A minimal DOM-like element tree: the loader's input type.
//!
//! spec.md §1 scopes actual XML I/O out of this crate ("Treat XML reading
//! as an external collaborator that yields a DOM-like element tree to the
//! loader"). [`Element`] is that collaborator's output shape - a tag name,
//! its attributes, an ordered list of children, and at most one direct
//! text node (spec.md §4.1: "The operand's `text` is the element's direct
//! text node (at most one such node)"). Nothing in this module parses
//! XML; a real front end would build `Element` trees from a document and
//! hand them to [`crate::loader::load_reference`].

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: HashMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// First child with the given tag name, if any.
    #[must_use]
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag name, in document order.
    pub fn children(&self, tag: &str) -> impl Iterator<Item = &Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Trimmed direct text content, if any and non-empty.
    #[must_use]
    pub fn text_trimmed(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[test]
fn test_element_builders_and_lookup() {
    let el = Element::new("entry")
        .with_attr("lock", "1")
        .with_child(Element::new("syntax").with_child(Element::new("mnem").with_text("PUSH")))
        .with_child(Element::new("syntax").with_child(Element::new("mnem").with_text("PUSHW")));

    assert_eq!(el.attr("lock"), Some("1"));
    assert_eq!(el.children("syntax").count(), 2);
    assert_eq!(
        el.child("syntax")
            .and_then(|s| s.child("mnem"))
            .and_then(Element::text_trimmed),
        Some("PUSH")
    );
}
