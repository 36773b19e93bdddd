//! Structural check of the parse service's response.
//!
//! The payload is never partially trusted: the first violation rejects the
//! whole thing. A value that passes is re-tagged as [`CertificateBundle`]
//! without copying or rewriting any field.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ValidationError;

const OBJECT_FIELDS: &[&str] = &["subject", "issuer", "subjectAlternativeNames"];

const STRING_FIELDS: &[&str] = &[
    "notBefore",
    "notAfter",
    "serialNumber",
    "signatureAlgorithm",
    "publicKeyAlgorithm",
    "signature",
    "fingerprintSHA1",
    "fingerprintSHA256",
    "subjectKeyId",
    "authorityKeyId",
    "modulus",
    "algorithm",
];

const NUMBER_FIELDS: &[&str] = &["version", "exponent", "bitLength"];

const BOOLEAN_FIELDS: &[&str] = &["isCA"];

const NULLABLE_ARRAY_FIELDS: &[&str] = &[
    "keyUsage",
    "extKeyUsage",
    "ocspServers",
    "crlDistributionPoints",
    "policyOids",
];

/// Validated, immutable certificate chain. Index 0 is the leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CertificateBundle(Value);

pub fn validate(value: Value) -> Result<CertificateBundle, ValidationError> {
    let certificates = value
        .get("certificates")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MalformedEnvelope)?;

    for (index, cert) in certificates.iter().enumerate() {
        check_record(index, cert)?;
    }

    Ok(CertificateBundle(value))
}

fn check_record(index: usize, cert: &Value) -> Result<(), ValidationError> {
    let record = cert.as_object().ok_or(ValidationError::NotAnObject(index))?;

    let wrong = |field: &'static str, expected: &'static str| ValidationError::WrongType {
        index,
        field,
        expected,
    };

    for &field in OBJECT_FIELDS {
        if !record.get(field).is_some_and(Value::is_object) {
            return Err(wrong(field, "object"));
        }
    }
    for &field in STRING_FIELDS {
        if !record.get(field).is_some_and(Value::is_string) {
            return Err(wrong(field, "string"));
        }
    }
    for &field in NUMBER_FIELDS {
        if !record.get(field).is_some_and(Value::is_number) {
            return Err(wrong(field, "number"));
        }
    }
    for &field in BOOLEAN_FIELDS {
        if !record.get(field).is_some_and(Value::is_boolean) {
            return Err(wrong(field, "boolean"));
        }
    }
    for &field in NULLABLE_ARRAY_FIELDS {
        match record.get(field) {
            None | Some(Value::Null) | Some(Value::Array(_)) => {}
            Some(_) => return Err(wrong(field, "array|null")),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRole {
    Leaf,
    Intermediate,
    Root,
}

impl ChainRole {
    /// Position-based; the chain order itself is not verified.
    pub fn at(index: usize, len: usize) -> Self {
        if index == 0 {
            ChainRole::Leaf
        } else if index + 1 == len {
            ChainRole::Root
        } else {
            ChainRole::Intermediate
        }
    }
}

impl CertificateBundle {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn records(&self) -> &[Value] {
        self.0
            .get("certificates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// `format` as reported by the service, when present.
    pub fn format(&self) -> Option<&str> {
        self.0.get("format").and_then(Value::as_str)
    }

    pub fn certificates(&self) -> impl Iterator<Item = CertificateRecord<'_>> {
        let len = self.len();
        self.records()
            .iter()
            .enumerate()
            .filter_map(move |(index, value)| {
                value.as_object().map(|fields| CertificateRecord {
                    index,
                    role: ChainRole::at(index, len),
                    fields,
                })
            })
    }
}

/// Read-only view of one validated record.
#[derive(Debug, Clone, Copy)]
pub struct CertificateRecord<'a> {
    pub index: usize,
    pub role: ChainRole,
    fields: &'a Map<String, Value>,
}

impl<'a> CertificateRecord<'a> {
    fn str_field(&self, key: &str) -> &'a str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    fn object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.fields.get(key).and_then(Value::as_object)
    }

    pub fn subject(&self) -> DistinguishedName<'a> {
        DistinguishedName(self.object("subject"))
    }

    pub fn issuer(&self) -> DistinguishedName<'a> {
        DistinguishedName(self.object("issuer"))
    }

    pub fn subject_alt_names(&self) -> AltNames<'a> {
        AltNames(self.object("subjectAlternativeNames"))
    }

    pub fn not_before(&self) -> &'a str {
        self.str_field("notBefore")
    }

    pub fn not_after(&self) -> &'a str {
        self.str_field("notAfter")
    }

    pub fn serial_number(&self) -> &'a str {
        self.str_field("serialNumber")
    }

    pub fn signature_algorithm(&self) -> &'a str {
        self.str_field("signatureAlgorithm")
    }

    pub fn fingerprint_sha256(&self) -> &'a str {
        self.str_field("fingerprintSHA256")
    }

    pub fn pem_public_key(&self) -> Option<&'a str> {
        self.fields.get("pemPublicKey").and_then(Value::as_str)
    }

    pub fn is_ca(&self) -> bool {
        self.fields
            .get("isCA")
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }

    pub fn version(&self) -> Option<i64> {
        self.fields.get("version").and_then(Value::as_i64)
    }

    pub fn key_usage(&self) -> Vec<&'a str> {
        string_list(self.fields.get("keyUsage"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistinguishedName<'a>(Option<&'a Map<String, Value>>);

impl<'a> DistinguishedName<'a> {
    fn field(&self, key: &str) -> Option<&'a Value> {
        self.0.and_then(|fields| fields.get(key))
    }

    pub fn common_name(&self) -> Option<&'a str> {
        self.field("commonName")
            .and_then(Value::as_str)
            .filter(|cn| !cn.is_empty())
    }

    pub fn organization(&self) -> Vec<&'a str> {
        string_list(self.field("organization"))
    }

    pub fn organizational_unit(&self) -> Vec<&'a str> {
        string_list(self.field("organizationalUnit"))
    }

    pub fn country(&self) -> Vec<&'a str> {
        string_list(self.field("country"))
    }

    pub fn locality(&self) -> Vec<&'a str> {
        string_list(self.field("locality"))
    }

    pub fn province(&self) -> Vec<&'a str> {
        string_list(self.field("province"))
    }

    pub fn additional_names(&self) -> Vec<&'a str> {
        string_list(self.field("additionalNames"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AltNames<'a>(Option<&'a Map<String, Value>>);

impl<'a> AltNames<'a> {
    fn field(&self, key: &str) -> Option<&'a Value> {
        self.0.and_then(|fields| fields.get(key))
    }

    pub fn dns_names(&self) -> Vec<&'a str> {
        string_list(self.field("dnsNames"))
    }

    pub fn ip_addresses(&self) -> Vec<&'a str> {
        string_list(self.field("ipAddresses"))
    }

    pub fn email_addresses(&self) -> Vec<&'a str> {
        string_list(self.field("emailAddresses"))
    }

    pub fn uris(&self) -> Vec<&'a str> {
        string_list(self.field("uris"))
    }
}

fn string_list(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn record(cn: &str) -> Value {
        json!({
            "index": 0,
            "subject": { "commonName": cn, "organization": ["Example Org"], "additionalNames": ["2.5.4.3=example"] },
            "issuer": { "commonName": "Example CA" },
            "subjectAlternativeNames": { "dnsNames": ["example.com", "www.example.com"], "ipAddresses": null },
            "notBefore": "2024-01-01 00:00:00 +0000 UTC",
            "notAfter": "2025-01-01 00:00:00 +0000 UTC",
            "serialNumber": "1234",
            "signatureAlgorithm": "SHA256-RSA",
            "publicKeyAlgorithm": "RSA",
            "pemPublicKey": "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----\n",
            "signature": "ab",
            "fingerprintSHA1": "00",
            "fingerprintSHA256": "11",
            "subjectKeyId": "22",
            "authorityKeyId": "33",
            "modulus": "c0ffee",
            "exponent": 65537,
            "bitLength": 2048,
            "algorithm": "RSA",
            "version": 3,
            "isCA": false,
            "keyUsage": ["DigitalSignature"],
            "extKeyUsage": null
        })
    }

    pub(crate) fn envelope(records: Vec<Value>) -> Value {
        json!({ "status": "ok", "format": "pem", "certificates": records })
    }

    #[test]
    fn accepts_well_formed_chain_without_rewriting() {
        let value = envelope(vec![record("leaf"), record("mid"), record("root")]);
        let bundle = validate(value.clone()).unwrap();
        assert_eq!(bundle.as_value(), &value);
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.format(), Some("pem"));

        let roles: Vec<_> = bundle.certificates().map(|c| c.role).collect();
        assert_eq!(
            roles,
            [ChainRole::Leaf, ChainRole::Intermediate, ChainRole::Root]
        );
    }

    #[test]
    fn record_views_expose_names() {
        let bundle = validate(envelope(vec![record("leaf.example.com")])).unwrap();
        let cert = bundle.certificates().next().unwrap();
        assert_eq!(cert.role, ChainRole::Leaf);
        assert_eq!(cert.subject().common_name(), Some("leaf.example.com"));
        assert_eq!(cert.subject().organization(), ["Example Org"]);
        assert_eq!(cert.issuer().common_name(), Some("Example CA"));
        assert_eq!(
            cert.subject_alt_names().dns_names(),
            ["example.com", "www.example.com"]
        );
        assert!(cert.subject_alt_names().ip_addresses().is_empty());
        assert_eq!(cert.key_usage(), ["DigitalSignature"]);
        assert_eq!(cert.version(), Some(3));
        assert!(!cert.is_ca());
        assert_eq!(cert.serial_number(), "1234");
        assert_eq!(cert.signature_algorithm(), "SHA256-RSA");
        assert_eq!(cert.fingerprint_sha256(), "11");
        assert_eq!(
            cert.pem_public_key(),
            Some("-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----\n")
        );
        assert_eq!(cert.subject().additional_names(), ["2.5.4.3=example"]);
        assert!(cert.subject().country().is_empty());
        assert!(cert.issuer().organization().is_empty());
    }

    #[test]
    fn optional_views_read_what_is_present() {
        let mut leaf = record("leaf");
        leaf["subject"] = json!({
            "commonName": "leaf",
            "organizationalUnit": ["Ops", "Web"],
            "country": ["DE"],
            "locality": ["Berlin"],
            "province": ["BE"]
        });
        leaf["subjectAlternativeNames"] = json!({
            "emailAddresses": ["ops@example.com"],
            "uris": ["https://example.com/", 7]
        });
        leaf["pemPublicKey"] = Value::Null;
        let bundle = validate(envelope(vec![leaf])).unwrap();
        let cert = bundle.certificates().next().unwrap();

        let subject = cert.subject();
        assert_eq!(subject.organizational_unit(), ["Ops", "Web"]);
        assert_eq!(subject.country(), ["DE"]);
        assert_eq!(subject.locality(), ["Berlin"]);
        assert_eq!(subject.province(), ["BE"]);
        assert!(subject.additional_names().is_empty());

        let sans = cert.subject_alt_names();
        assert_eq!(sans.email_addresses(), ["ops@example.com"]);
        assert_eq!(sans.uris(), ["https://example.com/"]);
        assert!(sans.dns_names().is_empty());
        assert_eq!(cert.pem_public_key(), None);
    }

    #[test]
    fn envelope_must_carry_certificates_array() {
        for value in [json!(null), json!([]), json!({}), json!({ "certificates": {} })] {
            assert_eq!(validate(value), Err(ValidationError::MalformedEnvelope));
        }
    }

    #[test]
    fn empty_chain_is_accepted() {
        let bundle = validate(json!({ "certificates": [] })).unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn subject_string_is_rejected() {
        let mut bad = record("leaf");
        bad["subject"] = json!("not-an-object");
        assert_eq!(
            validate(envelope(vec![bad])),
            Err(ValidationError::WrongType {
                index: 0,
                field: "subject",
                expected: "object"
            })
        );
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert_eq!(
            validate(envelope(vec![record("a"), json!(42)])),
            Err(ValidationError::NotAnObject(1))
        );
    }

    #[test]
    fn any_single_bad_field_voids_the_bundle() {
        let required: Vec<(&'static str, &'static str)> = OBJECT_FIELDS
            .iter()
            .map(|f| (*f, "object"))
            .chain(STRING_FIELDS.iter().map(|f| (*f, "string")))
            .chain(NUMBER_FIELDS.iter().map(|f| (*f, "number")))
            .chain(BOOLEAN_FIELDS.iter().map(|f| (*f, "boolean")))
            .collect();

        for (field, expected) in required {
            for index in 0..3 {
                let mut records = vec![record("a"), record("b"), record("c")];
                records[index].as_object_mut().unwrap().remove(field);
                assert_eq!(
                    validate(envelope(records)),
                    Err(ValidationError::WrongType {
                        index,
                        field,
                        expected
                    })
                );
            }
        }
    }

    #[test]
    fn nullable_arrays_accept_absent_null_or_array() {
        let mut cert = record("a");
        let fields = cert.as_object_mut().unwrap();
        fields.remove("ocspServers");
        fields.insert("crlDistributionPoints".into(), Value::Null);
        fields.insert("policyOids".into(), json!(["2.23.140.1.2.1"]));
        assert!(validate(envelope(vec![cert])).is_ok());

        let mut bad = record("a");
        bad["extKeyUsage"] = json!("ServerAuth");
        assert_eq!(
            validate(envelope(vec![bad])),
            Err(ValidationError::WrongType {
                index: 0,
                field: "extKeyUsage",
                expected: "array|null"
            })
        );
    }

    #[test]
    fn numbers_must_be_numbers() {
        let mut bad = record("a");
        bad["bitLength"] = json!("2048");
        let err = validate(envelope(vec![bad])).unwrap_err();
        assert_eq!(err.path(), "certificates[0].bitLength");
    }
}
