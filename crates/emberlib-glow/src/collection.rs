//! Element collection: the decoded top level of a provider response.
//!
//! A collection holds the top-level elements of one parsed message, keyed
//! by (identifier, path). Lookups walk one level into each element's
//! children -- a single GetDirectory returns exactly one level, so deeper
//! paths require further requests.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use emberlib_core::{Element, Error, Result};

/// The decoded top level of one provider response.
///
/// Insertion order is preserved, which keeps the serialised view stable.
#[derive(Debug, Clone, Default)]
pub struct ElementCollection {
    elements: Vec<Element>,
}

impl ElementCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Top-level elements in insertion order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Insert a top-level element. An element with the same identifier and
    /// path replaces the earlier one.
    pub fn insert(&mut self, element: Element) {
        let key = (element.identifier().to_string(), element.path().to_string());
        if let Some(existing) = self
            .elements
            .iter_mut()
            .find(|e| e.identifier() == key.0 && e.path() == key.1)
        {
            *existing = element;
        } else {
            self.elements.push(element);
        }
    }

    /// Find an element by dotted-decimal path.
    ///
    /// Matches top-level elements exactly, then each top-level element's
    /// immediate children through the joined `parent.child` path.
    pub fn find_by_path(&self, path: &str) -> Result<&Element> {
        for element in &self.elements {
            if element.path() == path {
                return Ok(element);
            }
            for child in element.children() {
                if format!("{}.{}", element.path(), child.path()) == path {
                    return Ok(child);
                }
            }
        }
        Err(Error::ElementNotFound(path.to_string()))
    }

    /// Find an element by identifier. Returns the element together with
    /// its absolute dotted path.
    pub fn find_by_id(&self, id: &str) -> Result<(&Element, String)> {
        for element in &self.elements {
            if element.identifier() == id {
                return Ok((element, element.path().to_string()));
            }
            for child in element.children() {
                if child.identifier() == id {
                    return Ok((child, format!("{}.{}", element.path(), child.path())));
                }
            }
        }
        Err(Error::ElementNotFound(id.to_string()))
    }

    /// Render the collection as a JSON value: a map keyed by top-level
    /// path, each value the element's kind-specific view.
    pub fn serialise(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("collection serialisation is infallible")
    }
}

impl Serialize for ElementCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.elements.len()))?;
        for element in &self.elements {
            map.serialize_entry(element.path(), element)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberlib_core::{ElementKind, Node, Parameter, Value};

    fn sample_collection() -> ElementCollection {
        let mut collection = ElementCollection::new();
        collection.insert(Element::QualifiedNode(Node {
            path: "1".into(),
            identifier: "PatchBay".into(),
            is_online: true,
            children: vec![
                Element::Node(Node {
                    path: "2".into(),
                    identifier: "Inputs".into(),
                    ..Node::default()
                }),
                Element::Parameter(Parameter {
                    path: "3".into(),
                    identifier: "gain".into(),
                    value: Some(Value::Integer(12)),
                    value_type: Some(1),
                    ..Parameter::default()
                }),
            ],
            ..Node::default()
        }));
        collection
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    #[test]
    fn find_by_path_top_level() {
        let collection = sample_collection();
        let element = collection.find_by_path("1").unwrap();
        assert_eq!(element.identifier(), "PatchBay");
    }

    #[test]
    fn find_by_path_child_through_joined_path() {
        let collection = sample_collection();
        let element = collection.find_by_path("1.3").unwrap();
        assert_eq!(element.identifier(), "gain");
    }

    #[test]
    fn find_by_path_miss() {
        let collection = sample_collection();
        let err = collection.find_by_path("9.9").unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(_)));
        assert_eq!(err.to_string(), "element not found: 9.9");
    }

    #[test]
    fn find_by_path_does_not_recurse_past_children() {
        let mut collection = ElementCollection::new();
        collection.insert(Element::QualifiedNode(Node {
            path: "1".into(),
            children: vec![Element::Node(Node {
                path: "2".into(),
                children: vec![Element::Node(Node {
                    path: "3".into(),
                    ..Node::default()
                })],
                ..Node::default()
            })],
            ..Node::default()
        }));
        assert!(collection.find_by_path("1.2").is_ok());
        // Grandchildren need their own request.
        assert!(collection.find_by_path("1.2.3").is_err());
    }

    #[test]
    fn find_by_id_returns_absolute_path() {
        let collection = sample_collection();
        let (element, path) = collection.find_by_id("Inputs").unwrap();
        assert_eq!(element.kind(), ElementKind::Node);
        assert_eq!(path, "1.2");

        let (_, path) = collection.find_by_id("PatchBay").unwrap();
        assert_eq!(path, "1");
    }

    #[test]
    fn find_by_id_miss() {
        let collection = sample_collection();
        assert!(collection.find_by_id("nope").is_err());
    }

    // ---------------------------------------------------------------
    // Insertion
    // ---------------------------------------------------------------

    #[test]
    fn insert_replaces_same_key() {
        let mut collection = sample_collection();
        collection.insert(Element::QualifiedNode(Node {
            path: "1".into(),
            identifier: "PatchBay".into(),
            is_online: false,
            ..Node::default()
        }));
        assert_eq!(collection.len(), 1);
        match collection.find_by_path("1").unwrap() {
            Element::QualifiedNode(node) => assert!(!node.is_online),
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn insert_keeps_distinct_keys() {
        let mut collection = sample_collection();
        collection.insert(Element::QualifiedNode(Node {
            path: "2".into(),
            identifier: "Other".into(),
            ..Node::default()
        }));
        assert_eq!(collection.len(), 2);
    }

    // ---------------------------------------------------------------
    // Serialisation
    // ---------------------------------------------------------------

    #[test]
    fn serialise_keys_by_path() {
        let json = sample_collection().serialise();
        let entry = &json["1"];
        assert_eq!(entry["element_type"], "qualified_node");
        assert_eq!(entry["identifier"], "PatchBay");
        assert_eq!(entry["is_online"], true);
        assert_eq!(entry["children"][1]["value"], 12);
    }

    #[test]
    fn serialise_round_trips_through_text() {
        let text = serde_json::to_string(&sample_collection()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["1"]["children"][0]["identifier"], "Inputs");
    }
}
