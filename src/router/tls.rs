//! TLS labeling tables
//!
//! Maps protocol-version and cipher-suite identifiers to the names used in
//! `tls_version.<name>.count` and `tls_cipher.<name>.count`. Identifiers not
//! listed here produce no label at all.

/// Negotiated TLS parameters of one connection
///
/// Transports that terminate TLS insert this into the request extensions so
/// the instrumentation wrapper can label the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlsInfo {
    /// Protocol version as sent on the wire (0x0303 = TLS 1.2)
    pub version: u16,
    /// IANA cipher suite identifier
    pub cipher_suite: u16,
}

impl TlsInfo {
    pub const fn new(version: u16, cipher_suite: u16) -> Self {
        Self {
            version,
            cipher_suite,
        }
    }

    pub fn version_name(&self) -> Option<&'static str> {
        version_name(self.version)
    }

    pub fn cipher_suite_name(&self) -> Option<&'static str> {
        cipher_suite_name(self.cipher_suite)
    }
}

pub const VERSION_SSL30: u16 = 0x0300;
pub const VERSION_TLS10: u16 = 0x0301;
pub const VERSION_TLS11: u16 = 0x0302;
pub const VERSION_TLS12: u16 = 0x0303;
pub const VERSION_TLS13: u16 = 0x0304;

/// Label for a protocol version
pub fn version_name(version: u16) -> Option<&'static str> {
    match version {
        VERSION_SSL30 => Some("VersionSSL30"),
        VERSION_TLS10 => Some("VersionTLS10"),
        VERSION_TLS11 => Some("VersionTLS11"),
        VERSION_TLS12 => Some("VersionTLS12"),
        VERSION_TLS13 => Some("VersionTLS13"),
        _ => None,
    }
}

/// Label for a cipher suite
pub fn cipher_suite_name(id: u16) -> Option<&'static str> {
    let name = match id {
        // TLS 1.0 - 1.2
        0x0005 => "TLS_RSA_WITH_RC4_128_SHA",
        0x000a => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        0x002f => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        0x003c => "TLS_RSA_WITH_AES_128_CBC_SHA256",
        0x009c => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009d => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0xc007 => "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA",
        0xc009 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
        0xc00a => "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
        0xc011 => "TLS_ECDHE_RSA_WITH_RC4_128_SHA",
        0xc012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0xc013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xc014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0xc023 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256",
        0xc027 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256",
        0xc02b => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xc02c => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xc02f => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xc030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xcca8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xcca9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        // TLS 1.3
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        // signalling value
        0x5600 => "TLS_FALLBACK_SCSV",
        _ => return None,
    };
    Some(name)
}
