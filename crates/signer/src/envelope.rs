//! Clear-signed text envelope.
//!
//! ```text
//! -----BEGIN DEPOT SIGNED MESSAGE-----
//! <payload lines>
//! -----BEGIN DEPOT SIGNATURE-----
//! <signer>:<base64 ed25519 signature>
//! -----END DEPOT SIGNATURE-----
//! ```
//!
//! The signature covers [`signing_input`], which binds the signer label to
//! the payload.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const MESSAGE_BEGIN: &str = "-----BEGIN DEPOT SIGNED MESSAGE-----";
pub const SIGNATURE_BEGIN: &str = "-----BEGIN DEPOT SIGNATURE-----";
pub const SIGNATURE_END: &str = "-----END DEPOT SIGNATURE-----";

/// A parsed, not yet verified, signed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedMessage {
    pub signer: String,
    pub payload: String,
    pub signature: [u8; 64],
}

/// Bytes covered by the signature.
pub fn signing_input(signer: &str, payload: &str) -> Vec<u8> {
    let mut input = Vec::with_capacity(signer.len() + 1 + payload.len());
    input.extend_from_slice(signer.as_bytes());
    input.push(b'\n');
    input.extend_from_slice(payload.as_bytes());
    input
}

impl SignedMessage {
    /// Parse an armored message. Tolerates CRLF line endings and
    /// surrounding whitespace.
    pub fn parse(armored: &str) -> SignerResult<Self> {
        let normalized = armored.replace("\r\n", "\n");
        let mut lines = normalized.trim().lines();

        if lines.next().map(str::trim_end) != Some(MESSAGE_BEGIN) {
            return Err(SignerError::MalformedMessage(
                "missing message header".to_string(),
            ));
        }

        let mut payload_lines = Vec::new();
        let mut found_signature = false;
        for line in lines.by_ref() {
            if line.trim_end() == SIGNATURE_BEGIN {
                found_signature = true;
                break;
            }
            payload_lines.push(line);
        }
        if !found_signature {
            return Err(SignerError::MalformedMessage(
                "missing signature block".to_string(),
            ));
        }

        let signature_line = lines
            .next()
            .ok_or_else(|| SignerError::MalformedMessage("empty signature block".to_string()))?
            .trim();
        if lines.next().map(str::trim_end) != Some(SIGNATURE_END) {
            return Err(SignerError::MalformedMessage(
                "missing signature trailer".to_string(),
            ));
        }

        let (signer, sig_b64) = signature_line.rsplit_once(':').ok_or_else(|| {
            SignerError::InvalidSignature("expected 'signer:base64' line".to_string())
        })?;
        if signer.is_empty() {
            return Err(SignerError::InvalidSignature("empty signer".to_string()));
        }
        let sig_bytes = STANDARD
            .decode(sig_b64)
            .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;
        let signature: [u8; 64] = sig_bytes.try_into().map_err(|b: Vec<u8>| {
            SignerError::InvalidSignature(format!("expected 64 bytes, got {}", b.len()))
        })?;

        Ok(Self {
            signer: signer.to_string(),
            payload: payload_lines.join("\n"),
            signature,
        })
    }

    /// Render the armored text form.
    pub fn armor(&self) -> String {
        format!(
            "{MESSAGE_BEGIN}\n{}\n{SIGNATURE_BEGIN}\n{}:{}\n{SIGNATURE_END}\n",
            self.payload,
            self.signer,
            STANDARD.encode(self.signature)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SignedMessage {
        SignedMessage {
            signer: "alice".to_string(),
            payload: "line one\nline two".to_string(),
            signature: [9u8; 64],
        }
    }

    #[test]
    fn test_parse_armored() {
        let msg = sample();
        let parsed = SignedMessage::parse(&msg.armor()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_parse_tolerates_crlf() {
        let armored = sample().armor().replace('\n', "\r\n");
        assert_eq!(SignedMessage::parse(&armored).unwrap().payload, "line one\nline two");
    }

    #[test]
    fn test_parse_rejects_missing_parts() {
        assert!(SignedMessage::parse("hello").is_err());
        let no_trailer = format!("{MESSAGE_BEGIN}\nhi\n{SIGNATURE_BEGIN}\nalice:AAAA\n");
        assert!(SignedMessage::parse(&no_trailer).is_err());
        let bad_sig = format!("{MESSAGE_BEGIN}\nhi\n{SIGNATURE_BEGIN}\nalice:AAAA\n{SIGNATURE_END}");
        assert!(matches!(
            SignedMessage::parse(&bad_sig),
            Err(SignerError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_signer_may_contain_colons() {
        let mut msg = sample();
        msg.signer = "host:alice".to_string();
        assert_eq!(SignedMessage::parse(&msg.armor()).unwrap().signer, "host:alice");
    }
}
