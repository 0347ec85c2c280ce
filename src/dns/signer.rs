use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use openssl::bn::BigNum;
use openssl::pkey::Private;
use openssl::rsa::Rsa;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use trust_dns_client::op::Message;
use trust_dns_client::rr::dnssec::KeyPair;
use trust_dns_client::rr::{DNSClass, Name, RData, Record, RecordType};
use trust_dns_proto::rr::dnssec::rdata::{DNSSECRData, SIG};
use trust_dns_proto::rr::dnssec::{tbs, Algorithm};

/// Half-width of the SIG(0) validity window. Inception is backdated and
/// expiration advanced by this much, giving a ten-minute window centered on
/// signing time so moderate clock skew between us and the DNS server does
/// not invalidate updates.
const SIG_VALIDITY_SECS: u32 = 300;

/// Signs outgoing DNS messages with an RFC 2931 SIG(0) record.
///
/// A signer is loaded from a BIND-style key pair on disk: the `.private`
/// file carries the RSA components, the sibling `.key` file the public KEY
/// record whose owner name, algorithm and key tag identify the signature to
/// the server. Both the key material and the derived metadata are immutable,
/// so one signer is safely shared by every caller.
pub struct Signer {
    name: Name,
    algorithm: Algorithm,
    key_tag: u16,
    key: KeyPair<Private>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("key_tag", &self.key_tag)
            .finish()
    }
}

impl Signer {
    /// Load a signer from `keypath`, which must end in `.private` and have a
    /// `.key` sibling with the same stem. Any missing file, parse failure,
    /// or unsupported algorithm is reported as [`Error::WrongKeyPath`].
    pub fn from_key_path(keypath: &Path) -> Result<Self, Error> {
        let path = keypath.to_string_lossy();
        if !path.ends_with(".private") {
            return Err(Error::WrongKeyPath(format!(
                "path '{path}' does not end in .private"
            )));
        }
        let pubkey_path = PathBuf::from(format!("{}key", path.trim_end_matches("private")));

        let key_record = read_key_record(&pubkey_path)?;
        let (private_algorithm, rsa) = read_private_key(keypath)?;
        if private_algorithm != key_record.algorithm_number {
            return Err(Error::WrongKeyPath(format!(
                "algorithm mismatch between '{}' ({}) and '{}' ({})",
                path,
                private_algorithm,
                pubkey_path.display(),
                key_record.algorithm_number
            )));
        }

        let algorithm = algorithm_from_number(key_record.algorithm_number)?;
        let key_tag = key_record.key_tag();
        let key = KeyPair::from_rsa(rsa)
            .map_err(|err| Error::WrongKeyPath(format!("can not use private key: {err}")))?;

        Ok(Signer {
            name: key_record.name,
            algorithm,
            key_tag,
            key,
        })
    }

    /// Owner name of the KEY record; the SIG(0) signer name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    /// Return the wire bytes of `message` with a SIG(0) record appended to
    /// its additional section. The signature covers the whole message and is
    /// valid from `now − 300s` to `now + 300s`.
    pub fn sign(&self, mut message: Message) -> Result<Vec<u8>, Error> {
        let now = unix_time()?;
        let sig = SIG::new(
            RecordType::ZERO,
            self.algorithm,
            0,
            0,
            now + SIG_VALIDITY_SECS,
            now.wrapping_sub(SIG_VALIDITY_SECS),
            self.key_tag,
            self.name.clone(),
            Vec::new(),
        );

        let tbs = tbs::message_tbs(&message, &sig)
            .map_err(|err| Error::Signing(err.to_string()))?;
        let signature = self
            .key
            .sign(self.algorithm, &tbs)
            .map_err(|err| Error::Signing(err.to_string()))?;

        let sig = SIG::new(
            RecordType::ZERO,
            self.algorithm,
            0,
            0,
            now + SIG_VALIDITY_SECS,
            now.wrapping_sub(SIG_VALIDITY_SECS),
            self.key_tag,
            self.name.clone(),
            signature,
        );
        let mut record = Record::from_rdata(Name::root(), 0, RData::DNSSEC(DNSSECRData::SIG(sig)));
        record.set_dns_class(DNSClass::ANY);
        message.add_sig0(record);

        message
            .to_vec()
            .map_err(|err| Error::BadMessage(err.to_string()))
    }
}

fn unix_time() -> Result<u32, Error> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .map_err(|err| Error::Signing(err.to_string()))
}

fn algorithm_from_number(number: u8) -> Result<Algorithm, Error> {
    match number {
        5 => Ok(Algorithm::RSASHA1),
        7 => Ok(Algorithm::RSASHA1NSEC3SHA1),
        8 => Ok(Algorithm::RSASHA256),
        10 => Ok(Algorithm::RSASHA512),
        other => Err(Error::WrongKeyPath(format!(
            "unsupported key algorithm {other}"
        ))),
    }
}

/// The public KEY record as read from a BIND `.key` zone file.
struct KeyRecord {
    name: Name,
    flags: u16,
    protocol: u8,
    algorithm_number: u8,
    public_key: Vec<u8>,
}

impl KeyRecord {
    /// RFC 4034 appendix B over the KEY RDATA.
    fn key_tag(&self) -> u16 {
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        rdata.extend_from_slice(&self.flags.to_be_bytes());
        rdata.push(self.protocol);
        rdata.push(self.algorithm_number);
        rdata.extend_from_slice(&self.public_key);

        let mut acc: u32 = 0;
        for (i, byte) in rdata.iter().enumerate() {
            acc += if i & 1 == 1 {
                u32::from(*byte)
            } else {
                u32::from(*byte) << 8
            };
        }
        acc += (acc >> 16) & 0xFFFF;
        (acc & 0xFFFF) as u16
    }
}

fn read_key_record(path: &Path) -> Result<KeyRecord, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| Error::WrongKeyPath(format!("can not open public key file: {err}")))?;
    parse_key_record(&contents)
        .ok_or_else(|| Error::WrongKeyPath(format!("can not parse public key: {}", path.display())))
}

/// Parse a zone-format KEY line: `<owner> [ttl] [IN] KEY <flags> <protocol>
/// <algorithm> <base64...>`. Comment lines start with `;`.
fn parse_key_record(contents: &str) -> Option<KeyRecord> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let pos = tokens.iter().position(|t| t.eq_ignore_ascii_case("KEY"))?;
        if pos == 0 || tokens.len() < pos + 4 {
            return None;
        }
        let name = Name::from_str(tokens[0]).ok()?;
        let flags: u16 = tokens[pos + 1].parse().ok()?;
        let protocol: u8 = tokens[pos + 2].parse().ok()?;
        let algorithm_number: u8 = tokens[pos + 3].parse().ok()?;
        let public_key = BASE64.decode(tokens[pos + 4..].concat()).ok()?;
        return Some(KeyRecord {
            name,
            flags,
            protocol,
            algorithm_number,
            public_key,
        });
    }
    None
}

fn read_private_key(path: &Path) -> Result<(u8, Rsa<Private>), Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| Error::WrongKeyPath(format!("can not open private key file: {err}")))?;
    parse_private_key(&contents)
}

/// Parse a BIND v1.2/v1.3 private key file into its RSA components.
fn parse_private_key(contents: &str) -> Result<(u8, Rsa<Private>), Error> {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    let algorithm = fields
        .get("Algorithm")
        .and_then(|value| value.split_whitespace().next())
        .and_then(|number| number.parse::<u8>().ok())
        .ok_or_else(|| Error::WrongKeyPath("missing or malformed Algorithm field".to_string()))?;

    let n = bignum_field(&fields, "Modulus")?;
    let e = bignum_field(&fields, "PublicExponent")?;
    let d = bignum_field(&fields, "PrivateExponent")?;
    let p = bignum_field(&fields, "Prime1")?;
    let q = bignum_field(&fields, "Prime2")?;
    let dmp1 = bignum_field(&fields, "Exponent1")?;
    let dmq1 = bignum_field(&fields, "Exponent2")?;
    let iqmp = bignum_field(&fields, "Coefficient")?;

    let rsa = Rsa::from_private_components(n, e, d, p, q, dmp1, dmq1, iqmp)
        .map_err(|err| Error::WrongKeyPath(format!("can not assemble RSA key: {err}")))?;
    Ok((algorithm, rsa))
}

fn bignum_field(fields: &HashMap<&str, &str>, name: &str) -> Result<BigNum, Error> {
    let raw = fields
        .get(name)
        .ok_or_else(|| Error::WrongKeyPath(format!("missing {name} field")))?;
    let bytes = BASE64
        .decode(raw)
        .map_err(|err| Error::WrongKeyPath(format!("bad base64 in {name} field: {err}")))?;
    BigNum::from_slice(&bytes)
        .map_err(|err| Error::WrongKeyPath(format!("bad {name} value: {err}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::sign::Verifier;
    use std::io::Write;
    use trust_dns_client::op::{MessageType, OpCode, Query};

    /// Write a BIND-style key pair for `example.com.` under `dir` and return
    /// the `.private` path.
    pub(crate) fn write_test_keypair(dir: &Path) -> PathBuf {
        let rsa = Rsa::generate(2048).unwrap();

        let b64 = |bn: &openssl::bn::BigNumRef| BASE64.encode(bn.to_vec());
        let private = format!(
            "Private-key-format: v1.3\n\
             Algorithm: 8 (RSASHA256)\n\
             Modulus: {}\n\
             PublicExponent: {}\n\
             PrivateExponent: {}\n\
             Prime1: {}\n\
             Prime2: {}\n\
             Exponent1: {}\n\
             Exponent2: {}\n\
             Coefficient: {}\n",
            b64(rsa.n()),
            b64(rsa.e()),
            b64(rsa.d()),
            b64(rsa.p().unwrap()),
            b64(rsa.q().unwrap()),
            b64(rsa.dmp1().unwrap()),
            b64(rsa.dmq1().unwrap()),
            b64(rsa.iqmp().unwrap()),
        );

        // RFC 3110 public key: exponent length, exponent, modulus.
        let exponent = rsa.e().to_vec();
        let mut public_key = Vec::new();
        public_key.push(exponent.len() as u8);
        public_key.extend_from_slice(&exponent);
        public_key.extend_from_slice(&rsa.n().to_vec());
        let public = format!("example.com. IN KEY 512 3 8 {}\n", BASE64.encode(&public_key));

        let private_path = dir.join("Kexample.com.+008+01234.private");
        let public_path = dir.join("Kexample.com.+008+01234.key");
        std::fs::File::create(&private_path)
            .unwrap()
            .write_all(private.as_bytes())
            .unwrap();
        std::fs::File::create(&public_path)
            .unwrap()
            .write_all(public.as_bytes())
            .unwrap();
        private_path
    }

    fn update_message() -> Message {
        let mut message = Message::new();
        message
            .set_id(0x2F2F)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update);
        let mut zone = Query::new();
        zone.set_name(Name::from_str("example.com.").unwrap())
            .set_query_type(RecordType::SOA)
            .set_query_class(DNSClass::IN);
        message.add_query(zone);
        message
    }

    #[test]
    fn loads_keypair_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let keypath = write_test_keypair(dir.path());

        let signer = Signer::from_key_path(&keypath).unwrap();
        assert_eq!(signer.name(), &Name::from_str("example.com.").unwrap());
        assert_eq!(signer.algorithm(), Algorithm::RSASHA256);
    }

    #[test]
    fn rejects_path_without_private_suffix() {
        let err = Signer::from_key_path(Path::new("/tmp/dns.key")).unwrap_err();
        assert_eq!(err.code(), "dns_wrong_key_path");
    }

    #[test]
    fn rejects_missing_public_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let keypath = write_test_keypair(dir.path());
        std::fs::remove_file(dir.path().join("Kexample.com.+008+01234.key")).unwrap();

        let err = Signer::from_key_path(&keypath).unwrap_err();
        assert_eq!(err.code(), "dns_wrong_key_path");
    }

    #[test]
    fn signed_message_carries_centered_sig0_window() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Signer::from_key_path(&write_test_keypair(dir.path())).unwrap();

        let wire = signer.sign(update_message()).unwrap();
        let parsed = Message::from_vec(&wire).unwrap();

        let sig0 = parsed.sig0();
        assert_eq!(sig0.len(), 1);
        assert_eq!(sig0[0].name(), &Name::root());
        assert_eq!(sig0[0].dns_class(), DNSClass::ANY);
        let Some(RData::DNSSEC(DNSSECRData::SIG(sig))) = sig0[0].data() else {
            panic!("additional record is not a SIG(0)");
        };

        let now = unix_time().unwrap();
        assert_eq!(sig.sig_expiration() - sig.sig_inception(), 600);
        assert!(sig.sig_inception() <= now && now <= sig.sig_expiration());
        assert_eq!(sig.signer_name(), &Name::from_str("example.com.").unwrap());
        assert_eq!(sig.key_tag(), signer.key_tag());
        assert_eq!(sig.algorithm(), Algorithm::RSASHA256);
    }

    #[test]
    fn signature_verifies_against_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let keypath = write_test_keypair(dir.path());
        let signer = Signer::from_key_path(&keypath).unwrap();
        let (_, rsa) = read_private_key(&keypath).unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();

        let message = update_message();
        let wire = signer.sign(message.clone()).unwrap();
        let parsed = Message::from_vec(&wire).unwrap();
        let Some(RData::DNSSEC(DNSSECRData::SIG(sig))) = parsed.sig0()[0].data() else {
            panic!("additional record is not a SIG(0)");
        };

        // Rebuild the to-be-signed bytes from the transmitted SIG fields and
        // the unsigned message, then check the RSA signature against them.
        let template = SIG::new(
            RecordType::ZERO,
            sig.algorithm(),
            0,
            0,
            sig.sig_expiration(),
            sig.sig_inception(),
            sig.key_tag(),
            sig.signer_name().clone(),
            Vec::new(),
        );
        let tbs = tbs::message_tbs(&message, &template).unwrap();

        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey).unwrap();
        verifier.update(tbs.as_ref()).unwrap();
        assert!(verifier.verify(sig.sig()).unwrap());
    }
}
