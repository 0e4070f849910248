use std::fmt::Display;
use std::net::IpAddr;

use x509_cert::der::asn1::{
    BmpString, Ia5StringRef, ObjectIdentifier, PrintableStringRef, TeletexStringRef,
    Utf8StringRef,
};
use x509_cert::der::{Any, Choice, Decode, DecodeValue, Encode};
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, ExtensionReq};

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");
const SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");

const PEM_TAGS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("PEM block not found: {0}")]
    Pem(#[from] pem::PemError),
    #[error("unexpected PEM block {0:?}, expected CERTIFICATE REQUEST")]
    BlockType(String),
    #[error("malformed certificate request: {0}")]
    Der(#[from] x509_cert::der::Error),
    #[error("IP address SAN has invalid length {0}")]
    IpAddress(usize),
}

/// Read-only view of the fields of a PKCS#10 request that classification needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRequest {
    pub common_name: Option<String>,
    pub organizations: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
}

impl ParsedRequest {
    pub fn has_sans(&self) -> bool {
        !self.dns_names.is_empty()
            || !self.ip_addresses.is_empty()
            || !self.email_addresses.is_empty()
    }
}

/// Parses the first PEM block of `pem_bytes` as a certificate request.
pub fn parse_request(pem_bytes: &[u8]) -> Result<ParsedRequest, ParseError> {
    let block = pem::parse(pem_bytes)?;
    if !PEM_TAGS.contains(&block.tag()) {
        return Err(ParseError::BlockType(block.tag().to_string()));
    }
    let request = CertReq::from_der(block.contents())?;

    let mut parsed = ParsedRequest::default();
    read_subject(&request.info.subject, &mut parsed);

    for attribute in request.info.attributes.iter() {
        if attribute.oid != EXTENSION_REQUEST {
            continue;
        }
        for value in attribute.values.iter() {
            let extensions = ExtensionReq::from_der(&value.to_der()?)?;
            for extension in extensions.0.iter() {
                if extension.extn_id == SUBJECT_ALT_NAME {
                    let sans = SubjectAltName::from_der(extension.extn_value.as_bytes())?;
                    read_sans(&sans, &mut parsed)?;
                }
            }
        }
    }

    Ok(parsed)
}

fn read_subject(subject: &Name, parsed: &mut ParsedRequest) {
    for rdn in subject.0.iter() {
        for attribute in rdn.0.iter() {
            let Some(value) = directory_string(&attribute.value) else {
                continue;
            };
            if attribute.oid == COMMON_NAME {
                parsed.common_name = Some(value);
            } else if attribute.oid == ORGANIZATION {
                parsed.organizations.push(value);
            }
        }
    }
}

/// Text of any string type a subject attribute may be encoded as.
fn directory_string(value: &Any) -> Option<String> {
    decode_text::<Utf8StringRef<'_>>(value)
        .or_else(|| decode_text::<PrintableStringRef<'_>>(value))
        .or_else(|| decode_text::<TeletexStringRef<'_>>(value))
        .or_else(|| decode_text::<Ia5StringRef<'_>>(value))
        .or_else(|| decode_text::<BmpString>(value))
}

fn decode_text<'a, T>(value: &'a Any) -> Option<String>
where
    T: Choice<'a> + DecodeValue<'a> + Display,
{
    value.decode_as::<T>().ok().map(|text| text.to_string())
}

fn read_sans(sans: &SubjectAltName, parsed: &mut ParsedRequest) -> Result<(), ParseError> {
    for name in sans.0.iter() {
        match name {
            GeneralName::DnsName(dns) => parsed.dns_names.push(dns.to_string()),
            GeneralName::Rfc822Name(email) => parsed.email_addresses.push(email.to_string()),
            GeneralName::IpAddress(octets) => {
                let bytes = octets.as_bytes();
                let ip = if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
                    IpAddr::from(v4)
                } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
                    IpAddr::from(v6)
                } else {
                    return Err(ParseError::IpAddress(bytes.len()));
                };
                parsed.ip_addresses.push(ip);
            }
            _ => {}
        }
    }
    Ok(())
}
