//! Enveloped XML-DSig signing and verification of rendered invoices.
use crate::invoice::xml::c14n::{C14nError, C14nMethod, Canonicalizer, load_document};
use crate::invoice::xml::constants::{
    DS_NS, ENVELOPED_SIGNATURE, RSA_SHA256, SHA256, SIGNATURE_TEMPLATE,
};
use crate::invoice::xml::parse::{RootClose, root_close};
use crate::invoice::xml::{XmlError, parse_document};
use base64ct::{Base64, Encoding};
use libxml::tree::{Document, Node};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use x509_cert::{
    Certificate,
    der::{DecodePem, Encode},
};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error("invalid private key: {0}")]
    Key(String),
    #[error("invalid certificate: {0}")]
    Certificate(String),
    #[error("certificate public key does not match the signing key")]
    CertificateMismatch,
    #[error("missing Invoice root element")]
    MissingRoot,
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    C14n(#[from] C14nError),
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid public key: {0}")]
    Key(String),
    #[error("document root is not an Invoice element")]
    NotAnInvoice,
    #[error("invoice carries no enveloped ds:Signature")]
    MissingSignature,
    #[error("signature is missing {0}")]
    MissingElement(&'static str),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid reference: {0}")]
    InvalidReference(&'static str),
    #[error("base64 value in {0} is malformed")]
    InvalidBase64(&'static str),
    #[error("digest value does not match the document")]
    DigestMismatch,
    #[error("signature value does not verify")]
    BadSignature,
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    C14n(#[from] C14nError),
}

/// Produces signature values over canonical `SignedInfo` bytes.
pub trait SignatureMethod: Send + Sync {
    /// Algorithm URI written to `SignatureMethod`.
    fn algorithm(&self) -> &'static str;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError>;

    /// The matching public half, for verifying what this method signed.
    fn signature_check(&self) -> Box<dyn SignatureCheck>;
}

/// Checks signature values produced by a [`SignatureMethod`].
pub trait SignatureCheck: Send + Sync {
    fn algorithm(&self) -> &'static str;

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), VerificationError>;
}

/// RSASSA-PKCS1-v1_5 with SHA-256.
#[derive(Debug, Clone)]
pub struct RsaSha256Key {
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
}

impl RsaSha256Key {
    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let private_key = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| SigningError::Key(format!("PKCS#1 parse error: {e:?}")))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| SigningError::Key(format!("PKCS#8 parse error: {e:?}")))?
        };
        Ok(Self::from_private_key(private_key))
    }

    pub fn from_der(der: &[u8]) -> Result<Self, SigningError> {
        let private_key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| SigningError::Key(format!("PKCS#8 parse error: {e:?}")))?;
        Ok(Self::from_private_key(private_key))
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key,
        }
    }

    pub fn public_key(&self) -> RsaSha256PublicKey {
        RsaSha256PublicKey::from_key(self.public_key.clone())
    }
}

impl SignatureMethod for RsaSha256Key {
    fn algorithm(&self) -> &'static str {
        RSA_SHA256
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        let signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| SigningError::SigningError(format!("RSA signing failed: {e:?}")))?;
        Ok(signature.to_vec())
    }

    fn signature_check(&self) -> Box<dyn SignatureCheck> {
        Box::new(self.public_key())
    }
}

#[derive(Debug, Clone)]
pub struct RsaSha256PublicKey {
    key: RsaPublicKey,
    verifying_key: VerifyingKey<Sha256>,
}

impl RsaSha256PublicKey {
    fn from_key(key: RsaPublicKey) -> Self {
        let verifying_key = VerifyingKey::<Sha256>::new(key.clone());
        Self { key, verifying_key }
    }

    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, VerificationError> {
        let key = if pem.contains("BEGIN RSA PUBLIC KEY") {
            RsaPublicKey::from_pkcs1_pem(pem)
                .map_err(|e| VerificationError::Key(format!("PKCS#1 parse error: {e:?}")))?
        } else {
            RsaPublicKey::from_public_key_pem(pem)
                .map_err(|e| VerificationError::Key(format!("SPKI parse error: {e:?}")))?
        };
        Ok(Self::from_key(key))
    }

    pub fn from_certificate_pem(pem: &str) -> Result<Self, VerificationError> {
        let cert = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| VerificationError::Key(format!("Certificate parse error: {e:?}")))?;
        certificate_public_key(&cert)
            .map(Self::from_key)
            .map_err(VerificationError::Key)
    }
}

impl SignatureCheck for RsaSha256PublicKey {
    fn algorithm(&self) -> &'static str {
        RSA_SHA256
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), VerificationError> {
        let signature =
            Signature::try_from(signature).map_err(|_| VerificationError::BadSignature)?;
        self.verifying_key
            .verify(data, &signature)
            .map_err(|_| VerificationError::BadSignature)
    }
}

impl PartialEq for RsaSha256PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

fn certificate_public_key(cert: &Certificate) -> Result<RsaPublicKey, String> {
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| format!("SPKI encoding error: {e:?}"))?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| format!("certificate key is not RSA: {e:?}"))
}

/// Signs rendered invoices with an enveloped XML signature.
pub struct InvoiceSigner {
    method: Box<dyn SignatureMethod>,
    certificate: Option<Certificate>,
    certificate_b64: Option<String>,
    c14n: C14nMethod,
}

impl InvoiceSigner {
    pub fn new(method: impl SignatureMethod + 'static) -> Self {
        Self {
            method: Box::new(method),
            certificate: None,
            certificate_b64: None,
            c14n: C14nMethod::default(),
        }
    }

    pub fn from_pem(private_key_pem: &str) -> Result<Self, SigningError> {
        Ok(Self::new(RsaSha256Key::from_pem(private_key_pem)?))
    }

    /// Like [`InvoiceSigner::from_pem`], embedding `cert_pem` in `KeyInfo`.
    /// The certificate must carry the signing key's public half.
    pub fn from_pem_with_certificate(
        private_key_pem: &str,
        cert_pem: &str,
    ) -> Result<Self, SigningError> {
        let key = RsaSha256Key::from_pem(private_key_pem)?;
        let cert = Certificate::from_pem(cert_pem.as_bytes())
            .map_err(|e| SigningError::Certificate(format!("Certificate parse error: {e:?}")))?;
        let cert_key = certificate_public_key(&cert).map_err(SigningError::Certificate)?;
        if cert_key != key.public_key {
            return Err(SigningError::CertificateMismatch);
        }
        let der = cert
            .to_der()
            .map_err(|e| SigningError::Certificate(format!("Certificate DER encoding error: {e:?}")))?;
        let mut signer = Self::new(key);
        signer.certificate_b64 = Some(Base64::encode_string(&der));
        signer.certificate = Some(cert);
        Ok(signer)
    }

    pub fn with_c14n(mut self, c14n: C14nMethod) -> Self {
        self.c14n = c14n;
        self
    }

    pub fn c14n(&self) -> C14nMethod {
        self.c14n
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// A verifier for documents produced by this signer.
    pub fn verifier(&self) -> InvoiceVerifier {
        InvoiceVerifier {
            check: self.method.signature_check(),
        }
    }

    /// Append a `ds:Signature` as the last child of the `Invoice` root.
    ///
    /// The input text is kept byte for byte; the signature subtree is
    /// spliced in just before the root end tag.
    pub fn sign_xml(&self, xml: &str) -> Result<String, SigningError> {
        let parsed = parse_document(xml)?;
        if parsed.root().local_name() != "Invoice" {
            return Err(SigningError::MissingRoot);
        }

        let digest_value = digest_document(&load_document(xml)?, self.c14n)?;
        let unsigned = splice_before_root_end(xml, &self.fill_template(&digest_value, ""))?;

        // SignedInfo is canonicalized in place so inherited namespaces count
        let unsigned_doc = load_document(&unsigned)?;
        let mut signed_info = enveloped_signature(&unsigned_doc)
            .and_then(|signature| ds_child(&signature, "SignedInfo"))
            .ok_or_else(|| {
                SigningError::SigningError("signature template lacks SignedInfo".into())
            })?;
        let canonical = self.c14n.canonicalize_node(&mut signed_info)?;
        let signature_value = Base64::encode_string(&self.method.sign(canonical.as_bytes())?);

        let signature = self.fill_template(&digest_value, &signature_value);
        let signed = splice_before_root_end(xml, &signature)?;
        debug!(c14n = %self.c14n, digest = %digest_value, "signed invoice");
        Ok(signed)
    }

    fn fill_template(&self, digest_value: &str, signature_value: &str) -> String {
        let x509 = self
            .certificate_b64
            .as_deref()
            .map(|b64| format!("<X509Certificate>{b64}</X509Certificate>"))
            .unwrap_or_default();
        SIGNATURE_TEMPLATE
            .trim()
            .replace("{c14n}", self.c14n.algorithm())
            .replace("{signature_method}", self.method.algorithm())
            .replace("{digest_value}", digest_value)
            .replace("{signature_value}", signature_value)
            .replace("{x509_certificate}", &x509)
    }
}

fn splice_before_root_end(xml: &str, fragment: &str) -> Result<String, SigningError> {
    let (root_name, close) = root_close(xml)?;
    let mut out = String::with_capacity(xml.len() + fragment.len() + root_name.len() + 3);
    match close {
        RootClose::EndTag { start } => {
            out.push_str(&xml[..start]);
            out.push_str(fragment);
            out.push_str(&xml[start..]);
        }
        RootClose::SelfClosing { start, end } => {
            out.push_str(&xml[..start]);
            out.push('>');
            out.push_str(fragment);
            out.push_str("</");
            out.push_str(&root_name);
            out.push('>');
            out.push_str(&xml[end..]);
        }
    }
    Ok(out)
}

/// Checks enveloped signatures produced by [`InvoiceSigner`].
pub struct InvoiceVerifier {
    check: Box<dyn SignatureCheck>,
}

impl InvoiceVerifier {
    pub fn new(check: impl SignatureCheck + 'static) -> Self {
        Self {
            check: Box::new(check),
        }
    }

    pub fn from_public_key_pem(pem: &str) -> Result<Self, VerificationError> {
        Ok(Self::new(RsaSha256PublicKey::from_pem(pem)?))
    }

    pub fn verify(&self, xml: &str) -> Result<(), VerificationError> {
        let parsed = parse_document(xml)?;
        if parsed.root().local_name() != "Invoice" {
            return Err(VerificationError::NotAnInvoice);
        }
        let doc = load_document(xml)?;
        let mut signature = enveloped_signature(&doc).ok_or(VerificationError::MissingSignature)?;

        let mut signed_info = ds_child(&signature, "SignedInfo")
            .ok_or(VerificationError::MissingElement("SignedInfo"))?;
        let c14n_uri = algorithm_of(&signed_info, "CanonicalizationMethod")?;
        let c14n = C14nMethod::from_algorithm(&c14n_uri)
            .map_err(|_| VerificationError::UnsupportedAlgorithm(c14n_uri.clone()))?;
        let method_uri = algorithm_of(&signed_info, "SignatureMethod")?;
        if method_uri != self.check.algorithm() {
            return Err(VerificationError::UnsupportedAlgorithm(method_uri));
        }

        let references = ds_children(&signed_info, "Reference");
        let reference = match references.as_slice() {
            [reference] => reference,
            [] => return Err(VerificationError::MissingElement("Reference")),
            _ => {
                return Err(VerificationError::InvalidReference(
                    "expected exactly one Reference",
                ));
            }
        };
        if reference.get_attribute("URI").as_deref() != Some("") {
            return Err(VerificationError::InvalidReference(
                "Reference must cover the whole document",
            ));
        }
        let digest_c14n = reference_transforms(reference)?;
        let digest_method = algorithm_of(reference, "DigestMethod")?;
        if digest_method != SHA256 {
            return Err(VerificationError::UnsupportedAlgorithm(digest_method));
        }
        let expected_digest = compact(
            &ds_child(reference, "DigestValue")
                .ok_or(VerificationError::MissingElement("DigestValue"))?
                .get_content(),
        );
        let signature_value = Base64::decode_vec(&compact(
            &ds_child(&signature, "SignatureValue")
                .ok_or(VerificationError::MissingElement("SignatureValue"))?
                .get_content(),
        ))
        .map_err(|_| VerificationError::InvalidBase64("SignatureValue"))?;

        let canonical_signed_info = c14n.canonicalize_node(&mut signed_info)?;
        // enveloped-signature transform
        signature.unlink();
        if digest_document(&doc, digest_c14n)? != expected_digest {
            return Err(VerificationError::DigestMismatch);
        }

        self.check
            .verify(canonical_signed_info.as_bytes(), &signature_value)?;
        debug!(c14n = %c14n, "verified invoice signature");
        Ok(())
    }
}

/// Base64 SHA-256 digest of the canonical document with any enveloped
/// signature removed; equals the `DigestValue` a signer writes for it.
pub fn digest_base64(xml: &str, c14n: C14nMethod) -> Result<String, SigningError> {
    parse_document(xml)?;
    let doc = load_document(xml)?;
    if let Some(mut signature) = enveloped_signature(&doc) {
        signature.unlink();
    }
    Ok(digest_document(&doc, c14n)?)
}

fn digest_document(doc: &Document, c14n: C14nMethod) -> Result<String, C14nError> {
    let canonical = c14n.canonicalize_document(doc)?;
    Ok(Base64::encode_string(&Sha256::digest(canonical.as_bytes())))
}

fn is_ds(node: &Node, local_name: &str) -> bool {
    node.get_name() == local_name
        && node.get_namespace().map(|ns| ns.get_href()).as_deref() == Some(DS_NS)
}

fn ds_children(parent: &Node, local_name: &str) -> Vec<Node> {
    parent
        .get_child_elements()
        .into_iter()
        .filter(|child| is_ds(child, local_name))
        .collect()
}

fn ds_child(parent: &Node, local_name: &str) -> Option<Node> {
    parent
        .get_child_elements()
        .into_iter()
        .find(|child| is_ds(child, local_name))
}

/// Last `ds:Signature` child of the document root.
fn enveloped_signature(doc: &Document) -> Option<Node> {
    doc.get_root_element()?
        .get_child_elements()
        .into_iter()
        .rev()
        .find(|child| is_ds(child, "Signature"))
}

/// Canonicalization applied to the reference after the enveloped transform.
fn reference_transforms(reference: &Node) -> Result<C14nMethod, VerificationError> {
    let mut enveloped = false;
    // octet conversion of a node-set defaults to inclusive c14n
    let mut c14n = C14nMethod::Inclusive;
    if let Some(transforms) = ds_child(reference, "Transforms") {
        for transform in ds_children(&transforms, "Transform") {
            let algorithm = transform
                .get_attribute("Algorithm")
                .ok_or(VerificationError::MissingElement("Transform Algorithm"))?;
            if algorithm == ENVELOPED_SIGNATURE {
                enveloped = true;
            } else {
                c14n = C14nMethod::from_algorithm(&algorithm)
                    .map_err(|_| VerificationError::UnsupportedAlgorithm(algorithm.clone()))?;
            }
        }
    }
    if !enveloped {
        return Err(VerificationError::InvalidReference(
            "missing enveloped-signature transform",
        ));
    }
    Ok(c14n)
}

fn algorithm_of(parent: &Node, child: &'static str) -> Result<String, VerificationError> {
    ds_child(parent, child)
        .ok_or(VerificationError::MissingElement(child))?
        .get_attribute("Algorithm")
        .ok_or(VerificationError::MissingElement(child))
}

fn compact(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
