pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub(crate) const C14N_10: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub(crate) const ENVELOPED_SIGNATURE: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub(crate) const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub(crate) const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

pub(crate) const SIGNATURE_TEMPLATE: &str =
    include_str!("../../../assets/templates/signature.xml");

/// Default invoice template shipped with the crate.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../../assets/templates/invoice.xml");
