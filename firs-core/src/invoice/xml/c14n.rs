//! XML canonicalization (W3C Canonical XML 1.0 and Exclusive XML
//! Canonicalization 1.0, both without comments) on top of libxml2.
use super::constants::{C14N_10, EXC_C14N};
use libxml::parser::Parser;
use libxml::tree::c14n::{CanonicalizationMode, CanonicalizationOptions};
use libxml::tree::{Document, Node};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum C14nError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("failed to canonicalize {0}")]
    Canonicalize(&'static str),
    #[error("unsupported canonicalization algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Parse `xml` into a libxml document for canonicalization.
pub fn load_document(xml: &str) -> Result<Document, C14nError> {
    Parser::default()
        .parse_string(xml)
        .map_err(|e| C14nError::Parse(format!("{e:?}")))
}

/// A canonical serialization of an XML document or subtree.
pub trait Canonicalizer {
    /// Algorithm URI advertised in `CanonicalizationMethod`/`Transform`.
    fn algorithm(&self) -> &'static str;

    fn options(&self) -> CanonicalizationOptions;

    /// Canonicalize a whole document.
    fn canonicalize_document(&self, doc: &Document) -> Result<String, C14nError> {
        doc.canonicalize(self.options(), None)
            .map_err(|_| C14nError::Canonicalize("document"))
    }

    /// Canonicalize `node` and its descendants as a document subset, so
    /// namespaces in scope from its ancestors are taken into account.
    fn canonicalize_node(&self, node: &mut Node) -> Result<String, C14nError> {
        node.canonicalize(self.options())
            .map_err(|_| C14nError::Canonicalize("element"))
    }
}

/// Exclusive XML Canonicalization 1.0, without comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExclusiveC14n;

/// Canonical XML 1.0 (inclusive), without comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InclusiveC14n;

impl Canonicalizer for ExclusiveC14n {
    fn algorithm(&self) -> &'static str {
        EXC_C14N
    }

    fn options(&self) -> CanonicalizationOptions {
        CanonicalizationOptions {
            mode: CanonicalizationMode::ExclusiveCanonical1_0,
            inclusive_ns_prefixes: vec![],
            with_comments: false,
        }
    }
}

impl Canonicalizer for InclusiveC14n {
    fn algorithm(&self) -> &'static str {
        C14N_10
    }

    fn options(&self) -> CanonicalizationOptions {
        CanonicalizationOptions {
            mode: CanonicalizationMode::Canonical1_0,
            inclusive_ns_prefixes: vec![],
            with_comments: false,
        }
    }
}

/// Canonicalization method selectable by configuration.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use firs_core::invoice::xml::c14n::C14nMethod;
///
/// let method = C14nMethod::from_str("inclusive")?;
/// assert_eq!(method, C14nMethod::Inclusive);
/// # Ok::<(), firs_core::invoice::xml::c14n::C14nError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum C14nMethod {
    #[default]
    Exclusive,
    Inclusive,
}

impl C14nMethod {
    /// Look up a method by its algorithm URI.
    pub fn from_algorithm(uri: &str) -> Result<Self, C14nError> {
        match uri.trim() {
            EXC_C14N => Ok(C14nMethod::Exclusive),
            C14N_10 => Ok(C14nMethod::Inclusive),
            other => Err(C14nError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            C14nMethod::Exclusive => "exclusive",
            C14nMethod::Inclusive => "inclusive",
        }
    }

    /// Canonicalize the text of a whole document.
    pub fn canonicalize_str(&self, xml: &str) -> Result<String, C14nError> {
        self.canonicalize_document(&load_document(xml)?)
    }
}

impl FromStr for C14nMethod {
    type Err = C14nError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "exclusive" | "exc-c14n" => Ok(C14nMethod::Exclusive),
            "inclusive" | "c14n" => Ok(C14nMethod::Inclusive),
            _ => Err(C14nError::UnsupportedAlgorithm(value.to_string())),
        }
    }
}

impl fmt::Display for C14nMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Canonicalizer for C14nMethod {
    fn algorithm(&self) -> &'static str {
        match self {
            C14nMethod::Exclusive => ExclusiveC14n.algorithm(),
            C14nMethod::Inclusive => InclusiveC14n.algorithm(),
        }
    }

    fn options(&self) -> CanonicalizationOptions {
        match self {
            C14nMethod::Exclusive => ExclusiveC14n.options(),
            C14nMethod::Inclusive => InclusiveC14n.options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(node: &Node, name: &str) -> Option<Node> {
        if node.get_name() == name {
            return Some(node.clone());
        }
        node.get_child_elements()
            .iter()
            .find_map(|child| first_element(child, name))
    }

    // W3C Canonical XML 1.0, example 3.3 (without the DTD default attribute)
    #[test]
    fn start_and_end_tags_example() {
        let xml = r#"<doc>
   <e1   />
   <e2   ></e2>
   <e3   name = "elem3"   id="elem3"   />
   <e4   name="elem4"   id="elem4"   ></e4>
   <e5 a:attr="out" b:attr="sorted" attr2="all" attr="I'm"
      xmlns:b="http://www.ietf.org"
      xmlns:a="http://www.w3.org"
      xmlns="http://example.org"/>
   <e6 xmlns="" xmlns:a="http://www.w3.org">
      <e7 xmlns="http://www.ietf.org">
         <e8 xmlns="" xmlns:a="http://www.w3.org">
            <e9 xmlns="" xmlns:a="http://www.ietf.org"/>
         </e8>
      </e7>
   </e6>
</doc>"#;
        let expected = r#"<doc>
   <e1></e1>
   <e2></e2>
   <e3 id="elem3" name="elem3"></e3>
   <e4 id="elem4" name="elem4"></e4>
   <e5 xmlns="http://example.org" xmlns:a="http://www.w3.org" xmlns:b="http://www.ietf.org" attr="I'm" attr2="all" b:attr="sorted" a:attr="out"></e5>
   <e6 xmlns:a="http://www.w3.org">
      <e7 xmlns="http://www.ietf.org">
         <e8 xmlns="">
            <e9 xmlns:a="http://www.ietf.org"></e9>
         </e8>
      </e7>
   </e6>
</doc>"#;
        assert_eq!(C14nMethod::Inclusive.canonicalize_str(xml).expect("c14n"), expected);
    }

    // W3C Exclusive XML Canonicalization 1.0, section 2.2
    #[test]
    fn exclusive_subset_example() {
        let xml = r#"<n0:local xmlns:n0="foo:bar" xmlns:n3="ftp://example.org"><n1:elem2 xmlns:n1="http://example.net" xml:lang="en"><n3:stuff xmlns:n3="ftp://example.org"/></n1:elem2></n0:local>"#;
        let doc = load_document(xml).expect("parse");
        let root = doc.get_root_element().expect("root");
        let mut elem2 = first_element(&root, "elem2").expect("elem2");

        assert_eq!(
            ExclusiveC14n.canonicalize_node(&mut elem2).expect("exc"),
            r#"<n1:elem2 xmlns:n1="http://example.net" xml:lang="en"><n3:stuff xmlns:n3="ftp://example.org"></n3:stuff></n1:elem2>"#
        );
        assert_eq!(
            InclusiveC14n.canonicalize_node(&mut elem2).expect("inc"),
            r#"<n1:elem2 xmlns:n0="foo:bar" xmlns:n1="http://example.net" xmlns:n3="ftp://example.org" xml:lang="en"><n3:stuff></n3:stuff></n1:elem2>"#
        );
    }

    #[test]
    fn drops_declaration_and_comments() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- head -->\n<a><!-- c --><b/></a>";
        assert_eq!(C14nMethod::Exclusive.canonicalize_str(xml).expect("c14n"), "<a><b></b></a>");
    }

    #[test]
    fn exclusive_omits_unused_namespaces() {
        let xml = r#"<r xmlns="urn:default" xmlns:unused="urn:u" xmlns:cbc="urn:cbc"><cbc:ID>1</cbc:ID></r>"#;
        assert_eq!(
            C14nMethod::Exclusive.canonicalize_str(xml).expect("exc"),
            r#"<r xmlns="urn:default"><cbc:ID xmlns:cbc="urn:cbc">1</cbc:ID></r>"#
        );
        assert_eq!(
            C14nMethod::Inclusive.canonicalize_str(xml).expect("inc"),
            r#"<r xmlns="urn:default" xmlns:cbc="urn:cbc" xmlns:unused="urn:u"><cbc:ID>1</cbc:ID></r>"#
        );
    }

    #[test]
    fn escapes_text_and_attributes() {
        let xml = "<a v=\"&quot;&lt;&gt;&#x9;&#xA;\">&amp; &lt; &gt; \"'</a>";
        assert_eq!(
            C14nMethod::Exclusive.canonicalize_str(xml).expect("c14n"),
            "<a v=\"&quot;&lt;>&#x9;&#xA;\">&amp; &lt; &gt; \"'</a>"
        );
    }

    #[test]
    fn method_lookup_by_name_and_uri() {
        assert_eq!(C14nMethod::default(), C14nMethod::Exclusive);
        assert_eq!(
            C14nMethod::from_algorithm(EXC_C14N),
            Ok(C14nMethod::Exclusive)
        );
        assert_eq!(C14nMethod::from_algorithm(C14N_10), Ok(C14nMethod::Inclusive));
        assert!("bogus".parse::<C14nMethod>().is_err());
        assert_eq!(C14nMethod::Inclusive.algorithm(), C14N_10);
    }
}
