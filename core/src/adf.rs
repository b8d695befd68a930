//! Conversion from editor HTML to the tracker's structured document format
//! (ADF).
//!
//! The converter walks the parsed markup tree and dispatches on node type:
//! paragraphs, inline marks, lists, headings, links, line breaks and images.
//! Embedded images are de-duplicated (first occurrence wins) and a trailing
//! section lists the unique image-host URLs so they stay reachable from the
//! issue even when inline rendering is unavailable.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;

use crate::html;
use crate::html::Element;
use crate::html::Node;

#[expect(clippy::unwrap_used)]
static IMAGE_HOST_URLS: LazyLock<regex::Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"https?://(?:i\.)?imgur\.com/[a-zA-Z0-9]+\.(?:png|jpe?g|gif|webp)")
        .case_insensitive(true)
        .build()
        .unwrap()
});

const IMAGE_SECTION_SEPARATOR: &str = "─────────────────────────────";

/// A node in an ADF document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<AdfNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<AdfMark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
}

/// A text mark (strong, em, link, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfMark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
}

impl AdfMark {
    pub fn simple(mark_type: &str) -> Self {
        Self {
            mark_type: mark_type.to_string(),
            attrs: None,
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            mark_type: "link".to_string(),
            attrs: Some(serde_json::json!({ "href": href })),
        }
    }
}

impl AdfNode {
    fn bare(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            version: None,
            content: None,
            text: None,
            marks: None,
            attrs: None,
        }
    }

    pub fn doc(content: Vec<AdfNode>) -> Self {
        Self {
            version: Some(1),
            content: Some(content),
            ..Self::bare("doc")
        }
    }

    /// Single-paragraph document for descriptions that carry no markup.
    pub fn plain_doc(text: &str) -> Self {
        Self::doc(vec![Self::paragraph(vec![Self::text(text)])])
    }

    pub fn paragraph(content: Vec<AdfNode>) -> Self {
        Self {
            content: Some(content),
            ..Self::bare("paragraph")
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::bare("text")
        }
    }

    pub fn marked_text(text: &str, marks: Vec<AdfMark>) -> Self {
        Self {
            text: Some(text.to_string()),
            marks: Some(marks),
            ..Self::bare("text")
        }
    }

    pub fn hard_break() -> Self {
        Self::bare("hardBreak")
    }

    pub fn heading(level: u32, content: Vec<AdfNode>) -> Self {
        Self {
            attrs: Some(serde_json::json!({ "level": level })),
            content: Some(content),
            ..Self::bare("heading")
        }
    }

    pub fn list(ordered: bool, items: Vec<AdfNode>) -> Self {
        let node_type = if ordered { "orderedList" } else { "bulletList" };
        Self {
            content: Some(items),
            ..Self::bare(node_type)
        }
    }

    pub fn list_item(content: Vec<AdfNode>) -> Self {
        Self {
            content: Some(content),
            ..Self::bare("listItem")
        }
    }

    fn is_text(&self) -> bool {
        self.node_type == "text"
    }

    fn is_paragraph(&self) -> bool {
        self.node_type == "paragraph"
    }
}

/// Every `<img src>` in the fragment, in document order.
pub fn extract_image_urls(input: &str) -> Vec<String> {
    let mut urls = Vec::new();
    collect_image_urls(&html::parse(input), &mut urls);
    urls
}

fn collect_image_urls(nodes: &[Node], urls: &mut Vec<String>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.tag == "img"
                && let Some(src) = el.attr("src")
            {
                urls.push(src.to_string());
            }
            collect_image_urls(&el.children, urls);
        }
    }
}

/// Unique image-host URLs in the raw fragment, attribute or free text, in
/// first-seen order.
pub fn imgur_urls(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMAGE_HOST_URLS
        .find_iter(input)
        .map(|m| m.as_str().to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Convert an editor HTML fragment to an ADF document. Never fails: anything
/// unrecognized degrades to plain text or disappears.
pub fn html_to_adf(input: &str) -> AdfNode {
    let mut nodes = html::parse(input);

    // Repeated screenshots are common (paste + explicit upload); keep only the
    // first occurrence of each source.
    let mut seen = HashSet::new();
    drop_duplicate_images(&mut nodes, &mut seen);

    let mut content: Vec<AdfNode> = nodes.iter().filter_map(process_node).collect();

    if content.is_empty() {
        content.push(AdfNode::paragraph(Vec::new()));
    }

    let hosted = imgur_urls(input);
    if !hosted.is_empty() {
        content.push(AdfNode::paragraph(Vec::new()));
        content.push(AdfNode::paragraph(vec![AdfNode::text(
            IMAGE_SECTION_SEPARATOR,
        )]));
        content.push(AdfNode::paragraph(vec![AdfNode::marked_text(
            &format!("📎 Imágenes adjuntas ({}):", hosted.len()),
            vec![AdfMark::simple("strong")],
        )]));
        let items = hosted
            .iter()
            .map(|url| {
                AdfNode::list_item(vec![AdfNode::paragraph(vec![AdfNode::marked_text(
                    url,
                    vec![AdfMark::link(url)],
                )])])
            })
            .collect();
        content.push(AdfNode::list(true, items));
    }

    AdfNode::doc(content)
}

fn drop_duplicate_images(nodes: &mut Vec<Node>, seen: &mut HashSet<String>) {
    nodes.retain(|node| match node {
        Node::Element(el) if el.tag == "img" => match el.attr("src") {
            Some(src) => seen.insert(src.to_string()),
            None => true,
        },
        _ => true,
    });
    for node in nodes {
        if let Node::Element(el) = node {
            drop_duplicate_images(&mut el.children, seen);
        }
    }
}

fn process_node(node: &Node) -> Option<AdfNode> {
    match node {
        Node::Text(text) => {
            if text.trim().is_empty() {
                None
            } else {
                Some(AdfNode::text(text))
            }
        }
        Node::Element(el) => process_element(el),
    }
}

fn process_element(el: &Element) -> Option<AdfNode> {
    match el.tag.as_str() {
        "br" => Some(AdfNode::hard_break()),
        "img" => process_image(el),
        "p" => Some(AdfNode::paragraph(inline_content(&el.children))),
        "strong" | "b" => marked(el, AdfMark::simple("strong")),
        "em" | "i" => marked(el, AdfMark::simple("em")),
        "u" => marked(el, AdfMark::simple("underline")),
        "ul" => process_list(el, false),
        "ol" => process_list(el, true),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = el.text();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let level = el.tag[1..].parse::<u32>().unwrap_or(1).min(6);
            Some(AdfNode::heading(level, vec![AdfNode::text(text)]))
        }
        "a" => {
            let href = el.attr("href")?;
            let text = el.text();
            let text = text.trim();
            let label = if text.is_empty() { href } else { text };
            Some(AdfNode::marked_text(label, vec![AdfMark::link(href)]))
        }
        _ => {
            // Unknown containers are transparent: a paragraph of whatever the
            // children produce, or nothing.
            let children = inline_content(&el.children);
            if children.is_empty() {
                None
            } else {
                Some(AdfNode::paragraph(children))
            }
        }
    }
}

fn process_image(el: &Element) -> Option<AdfNode> {
    let src = el.attr("src")?;
    let alt = el.attr("alt").unwrap_or("");

    if src.starts_with("data:") {
        // Inline data URLs are attached as files elsewhere; leave a pointer in
        // the document instead of megabytes of base64.
        let label = if alt.is_empty() { "imagen adjunta" } else { alt };
        return Some(AdfNode::paragraph(vec![AdfNode::marked_text(
            &format!("📎 {label} (ver imágenes adjuntas en la sección de attachments)"),
            vec![AdfMark::simple("strong")],
        )]));
    }

    let label = if alt.is_empty() { "Imagen" } else { alt };
    Some(AdfNode::paragraph(vec![
        AdfNode::marked_text(&format!("🖼️ {label}: "), vec![AdfMark::simple("strong")]),
        AdfNode::marked_text(src, vec![AdfMark::link(src), AdfMark::simple("code")]),
    ]))
}

/// Process children for a paragraph-like container, flattening any paragraphs
/// produced by nested block elements into the parent's inline run.
fn inline_content(children: &[Node]) -> Vec<AdfNode> {
    let mut out = Vec::new();
    for child in children {
        let Some(node) = process_node(child) else {
            continue;
        };
        if node.is_paragraph() {
            if let Some(inner) = node.content {
                out.extend(inner);
            }
        } else {
            out.push(node);
        }
    }
    out
}

fn marked(el: &Element, mark: AdfMark) -> Option<AdfNode> {
    let text = el.text();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(AdfNode::marked_text(text, vec![mark]))
}

fn process_list(el: &Element, ordered: bool) -> Option<AdfNode> {
    let mut items = Vec::new();
    collect_list_items(&el.children, &mut items);

    let list_items: Vec<AdfNode> = items
        .iter()
        .map(|li| inline_content(&li.children))
        .filter(|content| !content.is_empty())
        .map(|content| AdfNode::list_item(vec![AdfNode::paragraph(content)]))
        .collect();

    if list_items.is_empty() {
        None
    } else {
        Some(AdfNode::list(ordered, list_items))
    }
}

fn collect_list_items<'a>(nodes: &'a [Node], items: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.tag == "li" {
                items.push(el);
            }
            collect_list_items(&el.children, items);
        }
    }
}
