//! PDF Page Tree Parser
//!
//! Flattens the page tree (ISO 32000-1 Section 7.7.3) into an ordered list of
//! leaf pages. Intermediate `Pages` nodes may carry `Resources`, `MediaBox`,
//! `CropBox` and `Rotate`; a leaf inherits the value of its nearest ancestor
//! for each of these unless it defines the key itself.
//!
//! The walk is iterative with an explicit stack, so deeply nested or
//! maliciously cyclic trees cannot overflow the call stack or loop forever.

use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::reader::PdfReader;
use super::{ParseError, ParseResult};
use std::collections::HashSet;

/// Page attributes that may be defined on an ancestor `Pages` node
pub const INHERITABLE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A node of the page tree
#[derive(Debug, Clone, PartialEq)]
pub enum PageNode {
    /// Intermediate node with its children in order
    Pages { kids: Vec<ObjectId> },
    /// Leaf page
    Page,
}

impl PageNode {
    /// Classify a node dictionary.
    ///
    /// `/Type` decides when present; untyped nodes with a `/Kids` array are
    /// treated as intermediate nodes.
    pub fn classify(
        id: ObjectId,
        dict: &PdfDictionary,
        reader: &mut PdfReader,
    ) -> ParseResult<Self> {
        let is_pages = match dict.get_type() {
            Some("Pages") => true,
            Some("Page") => false,
            Some(other) => {
                return Err(ParseError::InvalidPageTree(format!(
                    "node {id} has /Type /{other}"
                )))
            }
            None => dict.contains_key("Kids"),
        };

        if !is_pages {
            return Ok(PageNode::Page);
        }

        let kids = match dict.get("Kids") {
            Some(kids) => reader.resolve(kids)?,
            None => {
                return Err(ParseError::InvalidPageTree(format!(
                    "Pages node {id} has no /Kids"
                )))
            }
        };
        let kids = kids.as_array().ok_or_else(|| {
            ParseError::InvalidPageTree(format!("/Kids of {id} is not an array"))
        })?;

        let kids = kids
            .0
            .iter()
            .map(|kid| {
                kid.as_reference().ok_or_else(|| {
                    ParseError::InvalidPageTree(format!("/Kids of {id} contains a direct object"))
                })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(PageNode::Pages { kids })
    }
}

/// Inheritable attributes collected on the way down the tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedAttributes {
    pub resources: Option<PdfObject>,
    pub media_box: Option<PdfObject>,
    pub crop_box: Option<PdfObject>,
    pub rotate: Option<PdfObject>,
}

impl InheritedAttributes {
    /// Attributes as seen by the children of `node`: its own values override
    fn descend(&self, node: &PdfDictionary) -> Self {
        let pick = |key: &str, inherited: &Option<PdfObject>| {
            node.get(key).cloned().or_else(|| inherited.clone())
        };
        Self {
            resources: pick("Resources", &self.resources),
            media_box: pick("MediaBox", &self.media_box),
            crop_box: pick("CropBox", &self.crop_box),
            rotate: pick("Rotate", &self.rotate),
        }
    }

    /// Value for one of [`INHERITABLE_KEYS`]
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        match key {
            "Resources" => self.resources.as_ref(),
            "MediaBox" => self.media_box.as_ref(),
            "CropBox" => self.crop_box.as_ref(),
            "Rotate" => self.rotate.as_ref(),
            _ => None,
        }
    }
}

/// A leaf page with the attributes it inherits.
///
/// `dict` is the page dictionary exactly as stored in the file; `inherited`
/// holds the effective value of every inheritable key (the page's own value
/// when it has one, otherwise the nearest ancestor's).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Reference to the page object in the source file
    pub obj_ref: ObjectId,
    /// Page dictionary as stored
    pub dict: PdfDictionary,
    /// Effective inheritable attributes
    pub inherited: InheritedAttributes,
}

impl ParsedPage {
    /// MediaBox as numbers, when it is a direct array of four numbers
    pub fn media_box(&self) -> Option<[f64; 4]> {
        let array = self.inherited.media_box.as_ref()?.as_array()?;
        if array.len() != 4 {
            return None;
        }
        let mut values = [0.0; 4];
        for (slot, item) in values.iter_mut().zip(&array.0) {
            *slot = item.as_real()?;
        }
        Some(values)
    }

    /// Rotation in degrees, 0 when absent or indirect
    pub fn rotation(&self) -> i64 {
        self.inherited
            .rotate
            .as_ref()
            .and_then(|r| r.as_integer())
            .unwrap_or(0)
    }

    /// Whether the page carries an `/Annots` entry
    pub fn has_annotations(&self) -> bool {
        self.dict.contains_key("Annots")
    }
}

/// Ordered leaf pages of a document
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    pages: Vec<ParsedPage>,
}

impl PageTree {
    /// Walk the tree rooted at the catalog's `/Pages`
    pub fn load(reader: &mut PdfReader) -> ParseResult<Self> {
        let root = match reader.catalog()?.get("Pages") {
            Some(PdfObject::Reference(id)) => *id,
            Some(_) => {
                return Err(ParseError::InvalidPageTree(
                    "catalog /Pages is not an indirect reference".to_string(),
                ))
            }
            None => {
                return Err(ParseError::InvalidPageTree(
                    "catalog has no /Pages entry".to_string(),
                ))
            }
        };

        // A tree can never have more nodes than the file has objects
        let node_limit = reader.object_count().max(1);
        let mut visited: HashSet<u32> = HashSet::new();
        let mut stack = vec![(root, InheritedAttributes::default())];
        let mut pages = Vec::new();
        let mut declared_count = None;

        while let Some((id, inherited)) = stack.pop() {
            if !visited.insert(id.number()) {
                return Err(ParseError::InvalidPageTree(format!(
                    "node {id} is reachable twice (cycle or shared node)"
                )));
            }
            if visited.len() > node_limit {
                return Err(ParseError::InvalidPageTree(format!(
                    "more than {node_limit} nodes visited"
                )));
            }

            let dict = match reader.get_object(id)? {
                PdfObject::Dictionary(dict) => dict.clone(),
                _ => {
                    return Err(ParseError::InvalidPageTree(format!(
                        "node {id} is not a dictionary"
                    )))
                }
            };

            let inherited = inherited.descend(&dict);

            match PageNode::classify(id, &dict, reader)? {
                PageNode::Pages { kids } => {
                    if id == root {
                        declared_count = dict.get("Count").and_then(|c| c.as_integer());
                    }
                    for kid in kids.into_iter().rev() {
                        stack.push((kid, inherited.clone()));
                    }
                }
                PageNode::Page if id == root => {
                    return Err(ParseError::InvalidPageTree(format!(
                        "catalog /Pages {id} is a leaf page"
                    )))
                }
                PageNode::Page => pages.push(ParsedPage {
                    obj_ref: id,
                    dict,
                    inherited,
                }),
            }
        }

        if let Some(count) = declared_count {
            if count != pages.len() as i64 {
                if !reader.options().lenient_syntax {
                    return Err(ParseError::InvalidPageTree(format!(
                        "/Count is {count} but the tree has {} pages",
                        pages.len()
                    )));
                }
                tracing::warn!(
                    declared = count,
                    found = pages.len(),
                    "page tree /Count is wrong, using the pages found"
                );
            }
        }

        tracing::debug!(pages = pages.len(), nodes = visited.len(), "walked page tree");
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page at a 0-based index
    pub fn get(&self, index: usize) -> Option<&ParsedPage> {
        self.pages.get(index)
    }

    pub fn pages(&self) -> &[ParsedPage] {
        &self.pages
    }
}
